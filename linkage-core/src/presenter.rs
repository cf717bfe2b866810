use indexmap::IndexMap;
use log::{debug, trace};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::{Adapter, AdapterChoice, AdapterError, AdapterRegistry, Related};
use crate::document::{
    Attributes, Document, Linkage, Links, PrimaryData, Relationship, Resource, ResourceIdentifier,
};

/// Error type for presentation.
#[derive(Debug, thiserror::Error)]
pub enum PresentError {
    #[error("related `{kind}` object under `{key}` has no id")]
    MissingIdentifier { kind: String, key: String },
    #[error("relationship `{key}` of `{kind}` targets `{target}`, which has no presenter")]
    UndeclaredRelationshipTarget {
        kind: String,
        key: String,
        target: String,
    },
    #[error("no presenter registered for `{0}`")]
    UnknownPresenter(String),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// A link as returned by a presenter hook.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkSource {
    Url(String),
    Object(Links),
}

impl From<&str> for LinkSource {
    fn from(url: &str) -> Self {
        LinkSource::Url(url.to_string())
    }
}

impl From<String> for LinkSource {
    fn from(url: String) -> Self {
        LinkSource::Url(url)
    }
}

impl From<Links> for LinkSource {
    fn from(links: Links) -> Self {
        LinkSource::Object(links)
    }
}

impl LinkSource {
    /// Normalizes to a link object: a bare URL becomes `{self: url}`, an
    /// object that already names `self` or `related` passes through.
    pub fn into_links(self) -> Links {
        match self {
            LinkSource::Object(links) if links.contains_key("self") || links.contains_key("related") => {
                links
            }
            LinkSource::Object(links) => Links::from([(
                "self".to_string(),
                Value::Object(links.into_iter().collect()),
            )]),
            LinkSource::Url(url) => Links::from([("self".to_string(), Value::String(url))]),
        }
    }
}

type SelfLinksHook<T> = Box<dyn Fn(&T) -> Option<LinkSource> + Send + Sync>;
type LinksHook<T> = Box<dyn Fn(&T) -> IndexMap<String, LinkSource> + Send + Sync>;

/// How one resource type is rendered.
pub struct Presenter<T: ?Sized> {
    kind: String,
    relationships: IndexMap<String, String>,
    fields: Option<Vec<String>>,
    self_links: Option<SelfLinksHook<T>>,
    links: Option<LinksHook<T>>,
}

impl<T: ?Sized> Presenter<T> {
    pub fn new(kind: impl Into<String>) -> Self {
        Presenter {
            kind: kind.into(),
            relationships: IndexMap::new(),
            fields: None,
            self_links: None,
            links: None,
        }
    }

    /// Declares relationship `key`, rendered by the presenter registered for `target`.
    pub fn relationship(mut self, key: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationships.insert(key.into(), target.into());
        self
    }

    /// Restricts attributes to the given names.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Resource-level links for an instance.
    pub fn self_links<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> Option<LinkSource> + Send + Sync + 'static,
    {
        self.self_links = Some(Box::new(hook));
        self
    }

    /// Relationship links for an instance, keyed by relationship name.
    pub fn links<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> IndexMap<String, LinkSource> + Send + Sync + 'static,
    {
        self.links = Some(Box::new(hook));
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl<T: ?Sized> std::fmt::Debug for Presenter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Presenter")
            .field("kind", &self.kind)
            .field("relationships", &self.relationships)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// What to render: nothing, one instance, or a collection.
pub enum Subject<'a, T: ?Sized> {
    Null,
    One(&'a T),
    Many(Vec<&'a T>),
}

impl<'a> Subject<'a, Value> {
    /// Classifies plain JSON: `null` renders nothing, arrays are collections.
    pub fn from_value(value: &'a Value) -> Self {
        match value {
            Value::Null => Subject::Null,
            Value::Array(items) => Subject::Many(items.iter().collect()),
            other => Subject::One(other),
        }
    }
}

/// Options for one render call.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub meta: Option<Value>,
    pub links: Option<Links>,
    /// Render into `included` instead of `data`.
    pub include: bool,
}

/// Presenter factory configuration.
pub struct PresenterConfig<T: ?Sized> {
    pub adapter: AdapterChoice<T>,
}

impl<T: ?Sized> Default for PresenterConfig<T> {
    fn default() -> Self {
        PresenterConfig {
            adapter: AdapterChoice::default(),
        }
    }
}

/// A set of presenters sharing one adapter, keyed by resource type.
pub struct Presenters<T: ?Sized> {
    adapter: Arc<dyn Adapter<T>>,
    presenters: HashMap<String, Presenter<T>>,
}

impl<T: ?Sized> Presenters<T> {
    /// Builds an empty set using the adapter the config selects from `registry`.
    pub fn new(config: PresenterConfig<T>, registry: &AdapterRegistry<T>) -> Result<Self, PresentError> {
        Ok(Self::with_adapter(registry.resolve(&config.adapter)?))
    }

    pub fn with_adapter(adapter: Arc<dyn Adapter<T>>) -> Self {
        Presenters {
            adapter,
            presenters: HashMap::new(),
        }
    }

    /// Registers a presenter under its resource type, replacing any previous one.
    pub fn register(&mut self, presenter: Presenter<T>) -> &mut Self {
        self.presenters.insert(presenter.kind.clone(), presenter);
        self
    }

    pub fn get(&self, kind: &str) -> Result<&Presenter<T>, PresentError> {
        self.presenters
            .get(kind)
            .ok_or_else(|| PresentError::UnknownPresenter(kind.to_string()))
    }

    /// Starts an empty document scope.
    pub fn scope(&self) -> Scope<'_, T> {
        Scope {
            presenters: self,
            document: Document::default(),
        }
    }

    /// Renders into a fresh scope and returns the finished document.
    pub fn render(
        &self,
        kind: &str,
        subject: Subject<'_, T>,
        options: &RenderOptions,
    ) -> Result<Document, PresentError> {
        let mut scope = self.scope();
        scope.to_json(kind, subject, options)?;
        Ok(scope.into_document())
    }

    fn target(&self, presenter: &Presenter<T>, key: &str, target: &str) -> Result<&Presenter<T>, PresentError> {
        self.presenters
            .get(target)
            .ok_or_else(|| PresentError::UndeclaredRelationshipTarget {
                kind: presenter.kind.clone(),
                key: key.to_string(),
                target: target.to_string(),
            })
    }
}

/// A document under construction, extended by successive renders.
///
/// Resources are deduplicated across the whole scope: an instance already
/// present in `included` or `data` is neither added again nor descended into,
/// which is what makes cyclic object graphs terminate.
pub struct Scope<'p, T: ?Sized> {
    presenters: &'p Presenters<T>,
    document: Document,
}

impl<'p, T: ?Sized> Scope<'p, T> {
    /// Renders `subject` with the presenter for `kind` into this scope.
    pub fn to_json(
        &mut self,
        kind: &str,
        subject: Subject<'_, T>,
        options: &RenderOptions,
    ) -> Result<&Document, PresentError> {
        if let Some(meta) = &options.meta {
            self.document.meta = Some(meta.clone());
        }
        if let Some(links) = &options.links {
            self.document.links = Some(links.clone());
        }

        let presenters = self.presenters;
        let presenter = presenters.get(kind)?;
        match subject {
            Subject::Null => {}
            Subject::One(instance) => self.present(presenter, instance, options.include)?,
            Subject::Many(instances) => {
                if !options.include && self.document.data.is_none() {
                    self.document.data = Some(PrimaryData::Many(Vec::new()));
                }
                for instance in instances {
                    self.present(presenter, instance, options.include)?;
                }
            }
        }
        debug!(
            "rendered `{}`: {} included so far",
            kind,
            self.document.included.len()
        );
        Ok(&self.document)
    }

    /// Alias of [`Scope::to_json`].
    pub fn render(
        &mut self,
        kind: &str,
        subject: Subject<'_, T>,
        options: &RenderOptions,
    ) -> Result<&Document, PresentError> {
        self.to_json(kind, subject, options)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    fn present(&mut self, presenter: &'p Presenter<T>, instance: &T, include: bool) -> Result<(), PresentError> {
        let adapter = &*self.presenters.adapter;
        let resource = Resource {
            id: adapter.id(instance)?,
            kind: Some(presenter.kind.clone()),
            attributes: self.attributes(presenter, instance),
            relationships: self.relationships(presenter, instance)?,
            links: presenter
                .self_links
                .as_ref()
                .and_then(|hook| hook(instance))
                .map(LinkSource::into_links),
            meta: None,
        };

        let added = if include {
            self.add_included(resource)
        } else {
            self.add_primary(resource)
        };
        if added {
            self.include_relationships(presenter, instance)?;
        } else {
            trace!("`{}` already in scope, not descending", presenter.kind);
        }
        Ok(())
    }

    fn add_included(&mut self, resource: Resource) -> bool {
        let present = self
            .document
            .included
            .iter()
            .chain(self.document.primary())
            .any(|r| r.id == resource.id && r.kind == resource.kind);
        if !present {
            self.document.included.push(resource);
        }
        !present
    }

    fn add_primary(&mut self, resource: Resource) -> bool {
        match self.document.data.take() {
            None => {
                self.document.data = Some(PrimaryData::One(Box::new(resource)));
                true
            }
            Some(PrimaryData::Many(mut resources)) => {
                let present = resources.iter().any(|r| r.id == resource.id);
                if !present {
                    resources.push(resource);
                }
                self.document.data = Some(PrimaryData::Many(resources));
                !present
            }
            Some(PrimaryData::One(existing)) => {
                if existing.id == resource.id {
                    self.document.data = Some(PrimaryData::One(existing));
                    false
                } else {
                    self.document.data = Some(PrimaryData::Many(vec![*existing, resource]));
                    true
                }
            }
        }
    }

    fn attributes(&self, presenter: &Presenter<T>, instance: &T) -> Attributes {
        let mut attributes = self.presenters.adapter.attributes(instance);
        attributes.shift_remove("id");
        for key in presenter.relationships.keys() {
            attributes.shift_remove(key);
        }
        if let Some(fields) = &presenter.fields {
            attributes.retain(|key, _| fields.iter().any(|field| field == key));
        }
        attributes
    }

    fn relationships(
        &self,
        presenter: &Presenter<T>,
        instance: &T,
    ) -> Result<IndexMap<String, Relationship>, PresentError> {
        let adapter = &*self.presenters.adapter;
        let mut links = presenter
            .links
            .as_ref()
            .map(|hook| hook(instance))
            .unwrap_or_default();

        let mut relationships = IndexMap::new();
        for (key, target) in &presenter.relationships {
            let target_kind = &self.presenters.target(presenter, key, target)?.kind;
            let identify = |related: &T| -> Result<ResourceIdentifier, PresentError> {
                let id = adapter.id(related)?.ok_or_else(|| PresentError::MissingIdentifier {
                    kind: target_kind.clone(),
                    key: key.clone(),
                })?;
                Ok(ResourceIdentifier::new(target_kind.clone(), id))
            };

            let link = links.shift_remove(key).map(LinkSource::into_links);
            let relationship = match adapter.related(instance, key) {
                Some(Related::Many(items)) => Relationship {
                    data: Some(Some(Linkage::Many(
                        items.into_iter().map(identify).collect::<Result<_, _>>()?,
                    ))),
                    links: link,
                    meta: None,
                },
                Some(Related::One(item)) => Relationship {
                    data: Some(Some(Linkage::One(identify(item)?))),
                    links: link,
                    meta: None,
                },
                None => Relationship {
                    data: if link.is_some() { None } else { Some(None) },
                    links: link,
                    meta: None,
                },
            };
            relationships.insert(key.clone(), relationship);
        }
        Ok(relationships)
    }

    fn include_relationships(&mut self, presenter: &'p Presenter<T>, instance: &T) -> Result<(), PresentError> {
        let presenters = self.presenters;
        for (key, target) in &presenter.relationships {
            let target = presenters.target(presenter, key, target)?;
            match presenters.adapter.related(instance, key) {
                Some(Related::One(related)) => self.present(target, related, true)?,
                Some(Related::Many(items)) => {
                    for related in items {
                        self.present(target, related, true)?;
                    }
                }
                None => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::PlainAdapter;
    use serde_json::json;

    fn presenters() -> Presenters<Value> {
        Presenters::new(PresenterConfig::default(), &AdapterRegistry::<Value>::new()).unwrap()
    }

    fn render(presenters: &Presenters<Value>, kind: &str, value: &Value) -> Value {
        let doc = presenters
            .render(kind, Subject::from_value(value), &RenderOptions::default())
            .unwrap();
        serde_json::to_value(doc).unwrap()
    }

    #[test]
    fn self_links_from_hook() {
        let mut presenters = presenters();
        presenters.register(
            Presenter::new("cars")
                .self_links(|car: &Value| Some(format!("/cars/{}", car["id"]).into())),
        );

        let doc = render(&presenters, "cars", &json!({ "id": 3 }));
        assert_eq!(doc["data"]["links"]["self"], json!("/cars/3"));
        assert_eq!(doc["data"]["id"], json!("3"));
        assert_eq!(doc["data"]["type"], json!("cars"));
    }

    #[test]
    fn attributes_exclude_id_and_relationships() {
        let mut presenters = presenters();
        presenters
            .register(Presenter::new("cars").relationship("owner", "people"))
            .register(Presenter::new("people"));

        let doc = render(
            &presenters,
            "cars",
            &json!({ "id": 1, "model": "T", "owner": { "id": 2, "name": "Henry" } }),
        );
        assert_eq!(doc["data"]["attributes"], json!({ "model": "T" }));
        assert_eq!(
            doc["data"]["relationships"]["owner"],
            json!({ "data": { "id": "2", "type": "people" } })
        );
        assert_eq!(
            doc["included"],
            json!([{ "id": "2", "type": "people", "attributes": { "name": "Henry" } }])
        );
    }

    #[test]
    fn field_whitelist() {
        let mut presenters = presenters();
        presenters.register(Presenter::new("cars").fields(["model"]));

        let doc = render(
            &presenters,
            "cars",
            &json!({ "id": 1, "model": "T", "secret": "vin" }),
        );
        assert_eq!(doc["data"]["attributes"], json!({ "model": "T" }));
    }

    #[test]
    fn relationship_shapes() {
        let mut presenters = presenters();
        presenters
            .register(
                Presenter::new("cars")
                    .relationship("owner", "people")
                    .relationship("wheels", "wheels")
                    .relationship("garage", "garages")
                    .links(|_car: &Value| {
                        IndexMap::from([(
                            "garage".to_string(),
                            LinkSource::from("/cars/1/garage"),
                        )])
                    }),
            )
            .register(Presenter::new("people"))
            .register(Presenter::new("wheels"))
            .register(Presenter::new("garages"));

        let doc = render(
            &presenters,
            "cars",
            &json!({ "id": 1, "owner": null, "wheels": [{ "id": 1 }, { "id": 2 }] }),
        );
        let relationships = &doc["data"]["relationships"];
        assert_eq!(relationships["owner"], json!({ "data": null }));
        assert_eq!(
            relationships["wheels"]["data"],
            json!([{ "id": "1", "type": "wheels" }, { "id": "2", "type": "wheels" }])
        );
        assert_eq!(
            relationships["garage"],
            json!({ "links": { "self": "/cars/1/garage" } })
        );
        assert_eq!(doc["included"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn cyclic_graph_is_deduplicated() {
        let mut presenters = presenters();
        presenters
            .register(Presenter::new("a").relationship("b", "b"))
            .register(Presenter::new("b").relationship("a", "a"));

        // A -> B -> A, expressed by value: the second A is structurally a copy.
        let a = json!({ "id": 1, "b": { "id": 2, "a": { "id": 1, "b": { "id": 2 } } } });
        let doc = render(&presenters, "a", &a);

        assert_eq!(doc["data"]["id"], json!("1"));
        assert_eq!(
            doc["included"],
            json!([{
                "id": "2", "type": "b",
                "relationships": { "a": { "data": { "id": "1", "type": "a" } } }
            }])
        );
    }

    #[test]
    fn converging_edges_include_once() {
        let mut presenters = presenters();
        presenters
            .register(
                Presenter::new("posts")
                    .relationship("author", "people")
                    .relationship("editor", "people"),
            )
            .register(Presenter::new("people"));

        let posts = json!([
            { "id": 1, "author": { "id": 9 }, "editor": { "id": 9 } },
            { "id": 2, "author": { "id": 9 } },
            { "id": 1 }
        ]);
        let doc = render(&presenters, "posts", &posts);

        assert_eq!(doc["data"].as_array().unwrap().len(), 2);
        assert_eq!(doc["included"], json!([{ "id": "9", "type": "people" }]));
    }

    #[test]
    fn included_skips_resources_already_in_data() {
        let mut presenters = presenters();
        presenters.register(Presenter::new("people").relationship("friend", "people"));

        let people = json!([
            { "id": 1 },
            { "id": 2, "friend": { "id": 1 } }
        ]);
        let doc = render(&presenters, "people", &people);
        assert_eq!(doc["data"].as_array().unwrap().len(), 2);
        assert!(doc.get("included").is_none());
    }

    #[test]
    fn related_without_id_fails() {
        let mut presenters = presenters();
        presenters
            .register(Presenter::new("cars").relationship("owner", "people"))
            .register(Presenter::new("people"));

        let value = json!({ "id": 1, "owner": { "name": "nobody" } });
        let err = presenters
            .render("cars", Subject::from_value(&value), &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(err, PresentError::MissingIdentifier { ref kind, .. } if kind == "people"));
    }

    #[test]
    fn undeclared_target_fails() {
        let mut presenters = presenters();
        presenters.register(Presenter::new("cars").relationship("owner", "people"));

        let value = json!({ "id": 1 });
        let err = presenters
            .render("cars", Subject::from_value(&value), &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(err, PresentError::UndeclaredRelationshipTarget { ref target, .. } if target == "people"));

        let err = presenters
            .render("boats", Subject::Null, &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(err, PresentError::UnknownPresenter(_)));
    }

    #[test]
    fn null_subject_keeps_scope() {
        let mut presenters = presenters();
        presenters.register(Presenter::new("cars"));

        let options = RenderOptions {
            meta: Some(json!({ "total": 0 })),
            links: Some(Links::from([("self".to_string(), json!("/cars"))])),
            include: false,
        };
        let doc = presenters.render("cars", Subject::Null, &options).unwrap();
        assert_eq!(
            serde_json::to_value(doc).unwrap(),
            json!({ "data": null, "links": { "self": "/cars" }, "meta": { "total": 0 } })
        );
    }

    #[test]
    fn scope_is_extended_across_renders() {
        let mut presenters: Presenters<Value> = Presenters::with_adapter(Arc::new(PlainAdapter));
        presenters.register(Presenter::new("cars"));

        let first = json!({ "id": 1 });
        let second = json!({ "id": 2 });
        let again = json!({ "id": 1 });
        let mut scope = presenters.scope();
        let options = RenderOptions::default();
        scope.render("cars", Subject::One(&first), &options).unwrap();
        scope.render("cars", Subject::One(&again), &options).unwrap();
        assert!(!scope.document().data.as_ref().unwrap().is_collection());

        scope.render("cars", Subject::One(&second), &options).unwrap();
        let doc = scope.into_document();
        assert_eq!(doc.primary().count(), 2);
    }

    #[test]
    fn include_only_collection_leaves_data_unset() {
        let mut presenters = presenters();
        presenters.register(Presenter::new("tags"));

        let tags = json!([{ "id": 1 }, { "id": 2 }]);
        let options = RenderOptions {
            include: true,
            ..RenderOptions::default()
        };
        let doc = presenters
            .render("tags", Subject::from_value(&tags), &options)
            .unwrap();
        assert!(doc.data.is_none());
        assert_eq!(doc.included.len(), 2);

        let empty = json!([]);
        let doc = presenters
            .render("tags", Subject::from_value(&empty), &RenderOptions::default())
            .unwrap();
        assert_eq!(serde_json::to_value(doc).unwrap(), json!({ "data": [] }));
    }

    #[test]
    fn link_normalization() {
        assert_eq!(
            LinkSource::from("/a").into_links(),
            Links::from([("self".to_string(), json!("/a"))])
        );
        let related = Links::from([("related".to_string(), json!("/a/b"))]);
        assert_eq!(LinkSource::from(related.clone()).into_links(), related);
        let other = Links::from([("href".to_string(), json!("/x"))]);
        assert_eq!(
            LinkSource::from(other).into_links()["self"],
            json!({ "href": "/x" })
        );
    }
}
