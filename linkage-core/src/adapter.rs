//! Uniform access to heterogeneous source objects.
//!
//! The presenter never inspects source objects directly; it asks an
//! [`Adapter`] for attributes, related objects and identifiers. Two shapes
//! ship with the crate:
//! - plain keyed maps (`serde_json::Value`), read by [`PlainAdapter`]
//! - getter-style objects implementing [`Entity`], read by either
//!   [`PlainAdapter`] (identifier from an `id` property) or
//!   [`EntityAdapter`] (identifier from declared primary-key metadata)
//!
//! Adapters are looked up by name through an explicit [`AdapterRegistry`].

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::document::Attributes;

/// Registry name of [`PlainAdapter`].
pub const DEFAULT_ADAPTER: &str = "default";
/// Registry name of [`EntityAdapter`].
pub const ENTITY_ADAPTER: &str = "entity";

/// Error type for adapter operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    #[error("expected exactly one primary key, found {count}")]
    UnsupportedKeyShape { count: usize },
    #[error("no adapter registered under `{0}`")]
    UnknownAdapter(String),
}

/// A related value fetched from a source object.
pub enum Related<'a, T: ?Sized> {
    One(&'a T),
    Many(Vec<&'a T>),
}

impl<T: ?Sized> Related<'_, T> {
    pub fn is_collection(&self) -> bool {
        matches!(self, Related::Many(_))
    }
}

/// Reads attributes and identifiers from source objects of type `T`.
pub trait Adapter<T: ?Sized>: Send + Sync {
    /// All plain attributes of the instance.
    fn attributes(&self, instance: &T) -> Attributes;

    /// One plain attribute of the instance.
    fn attribute(&self, instance: &T, key: &str) -> Option<Value>;

    /// The object or collection stored under `key`, if any.
    fn related<'a>(&self, instance: &'a T, key: &str) -> Option<Related<'a, T>>;

    /// The instance identifier, stringified. `Ok(None)` when it has none.
    fn id(&self, instance: &T) -> Result<Option<String>, AdapterError>;
}

/// A property read through an [`Entity`] getter.
pub enum Property<'a> {
    Value(Value),
    One(&'a DynEntity),
    Many(Vec<&'a DynEntity>),
}

impl<'a> Property<'a> {
    /// Serializes a plain field. Values that cannot be represented become `null`.
    pub fn value<T: Serialize + ?Sized>(value: &T) -> Self {
        Property::Value(serde_json::to_value(value).unwrap_or(Value::Null))
    }

    pub fn one<E: Entity + 'static>(entity: &'a E) -> Self {
        Property::One(entity)
    }

    pub fn many<E, I>(entities: I) -> Self
    where
        E: Entity + 'static,
        I: IntoIterator<Item = &'a E>,
    {
        Property::Many(
            entities
                .into_iter()
                .map(|entity| {
                    let entity: &'a DynEntity = entity;
                    entity
                })
                .collect(),
        )
    }
}

/// A source object exposing its data through a getter method.
///
/// Usually derived with `#[derive(Entity)]`; mark the identifying field with
/// `#[entity(primary_key)]` and related objects with `#[entity(relation)]`.
pub trait Entity {
    /// Reads one property.
    fn get(&self, key: &str) -> Option<Property<'_>>;

    /// Reads every plain (non-relation) property.
    fn attributes(&self) -> Attributes;

    /// Names of the fields declared as primary keys.
    fn primary_keys(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Entity trait object as stored and rendered by adapters and presenters.
pub type DynEntity = dyn Entity + 'static;

/// Converts an identifier value to its string form.
fn stringify_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Treats the instance as a plain keyed map.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainAdapter;

impl Adapter<Value> for PlainAdapter {
    fn attributes(&self, instance: &Value) -> Attributes {
        match instance {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => Attributes::new(),
        }
    }

    fn attribute(&self, instance: &Value, key: &str) -> Option<Value> {
        instance.get(key).cloned()
    }

    fn related<'a>(&self, instance: &'a Value, key: &str) -> Option<Related<'a, Value>> {
        match instance.get(key)? {
            Value::Null => None,
            Value::Array(items) => Some(Related::Many(items.iter().collect())),
            other => Some(Related::One(other)),
        }
    }

    fn id(&self, instance: &Value) -> Result<Option<String>, AdapterError> {
        Ok(instance.get("id").and_then(stringify_id))
    }
}

impl Adapter<DynEntity> for PlainAdapter {
    fn attributes(&self, instance: &DynEntity) -> Attributes {
        instance.attributes()
    }

    fn attribute(&self, instance: &DynEntity, key: &str) -> Option<Value> {
        match instance.get(key)? {
            Property::Value(value) => Some(value),
            Property::One(_) | Property::Many(_) => None,
        }
    }

    fn related<'a>(&self, instance: &'a DynEntity, key: &str) -> Option<Related<'a, DynEntity>> {
        match instance.get(key)? {
            Property::One(entity) => Some(Related::One(entity)),
            Property::Many(entities) => Some(Related::Many(entities)),
            Property::Value(_) => None,
        }
    }

    fn id(&self, instance: &DynEntity) -> Result<Option<String>, AdapterError> {
        Ok(Adapter::<DynEntity>::attribute(self, instance, "id")
            .as_ref()
            .and_then(stringify_id))
    }
}

/// Reads entities through their getter and resolves the identifier from the
/// single declared primary key. Composite keys are unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityAdapter;

impl Adapter<DynEntity> for EntityAdapter {
    fn attributes(&self, instance: &DynEntity) -> Attributes {
        PlainAdapter.attributes(instance)
    }

    fn attribute(&self, instance: &DynEntity, key: &str) -> Option<Value> {
        PlainAdapter.attribute(instance, key)
    }

    fn related<'a>(&self, instance: &'a DynEntity, key: &str) -> Option<Related<'a, DynEntity>> {
        PlainAdapter.related(instance, key)
    }

    fn id(&self, instance: &DynEntity) -> Result<Option<String>, AdapterError> {
        let [key] = instance.primary_keys() else {
            return Err(AdapterError::UnsupportedKeyShape {
                count: instance.primary_keys().len(),
            });
        };
        Ok(PlainAdapter
            .attribute(instance, key)
            .as_ref()
            .and_then(stringify_id))
    }
}

/// Selects the adapter a set of presenters uses.
pub enum AdapterChoice<T: ?Sized> {
    Named(String),
    Custom(Arc<dyn Adapter<T>>),
}

impl<T: ?Sized> AdapterChoice<T> {
    pub fn named(name: impl Into<String>) -> Self {
        AdapterChoice::Named(name.into())
    }
}

impl<T: ?Sized> Default for AdapterChoice<T> {
    fn default() -> Self {
        AdapterChoice::Named(DEFAULT_ADAPTER.to_string())
    }
}

impl<T: ?Sized> Clone for AdapterChoice<T> {
    fn clone(&self) -> Self {
        match self {
            AdapterChoice::Named(name) => AdapterChoice::Named(name.clone()),
            AdapterChoice::Custom(adapter) => AdapterChoice::Custom(Arc::clone(adapter)),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for AdapterChoice<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterChoice::Named(name) => f.debug_tuple("Named").field(name).finish(),
            AdapterChoice::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Name → adapter lookup for one source type.
pub struct AdapterRegistry<T: ?Sized> {
    adapters: HashMap<String, Arc<dyn Adapter<T>>>,
}

impl<T: ?Sized> AdapterRegistry<T> {
    /// Creates a registry with nothing registered.
    pub fn empty() -> Self {
        AdapterRegistry {
            adapters: HashMap::new(),
        }
    }

    /// Registers (or replaces) an adapter under `name`.
    pub fn register(&mut self, name: impl Into<String>, adapter: Arc<dyn Adapter<T>>) -> &mut Self {
        self.adapters.insert(name.into(), adapter);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Adapter<T>>, AdapterError> {
        self.adapters
            .get(name)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownAdapter(name.to_string()))
    }

    pub fn resolve(&self, choice: &AdapterChoice<T>) -> Result<Arc<dyn Adapter<T>>, AdapterError> {
        match choice {
            AdapterChoice::Named(name) => self.get(name),
            AdapterChoice::Custom(adapter) => Ok(Arc::clone(adapter)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }
}

impl AdapterRegistry<Value> {
    /// Registry for plain JSON sources: `"default"`.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_ADAPTER, Arc::new(PlainAdapter));
        registry
    }
}

impl AdapterRegistry<DynEntity> {
    /// Registry for entity sources: `"default"` and `"entity"`.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry
            .register(DEFAULT_ADAPTER, Arc::new(PlainAdapter))
            .register(ENTITY_ADAPTER, Arc::new(EntityAdapter));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Tag {
        label: String,
    }

    impl Entity for Tag {
        fn get(&self, key: &str) -> Option<Property<'_>> {
            match key {
                "label" => Some(Property::Value(json!(self.label))),
                _ => None,
            }
        }

        fn attributes(&self) -> Attributes {
            Attributes::from([("label".to_string(), json!(self.label))])
        }

        fn primary_keys(&self) -> &'static [&'static str] {
            &["label"]
        }
    }

    struct Post {
        id: u32,
        title: String,
        tags: Vec<Tag>,
    }

    impl Entity for Post {
        fn get(&self, key: &str) -> Option<Property<'_>> {
            match key {
                "id" => Some(Property::Value(json!(self.id))),
                "title" => Some(Property::Value(json!(self.title))),
                "tags" => Some(Property::many(&self.tags)),
                _ => None,
            }
        }

        fn attributes(&self) -> Attributes {
            Attributes::from([
                ("id".to_string(), json!(self.id)),
                ("title".to_string(), json!(self.title)),
            ])
        }

        fn primary_keys(&self) -> &'static [&'static str] {
            &["id", "title"]
        }
    }

    fn post() -> Post {
        Post {
            id: 7,
            title: "Hello".into(),
            tags: vec![Tag { label: "rust".into() }],
        }
    }

    #[test]
    fn plain_adapter_reads_maps() {
        let value = json!({ "id": 3, "name": "car", "owner": { "id": "1" }, "wheels": [{}, {}], "gone": null });
        let adapter = PlainAdapter;

        assert_eq!(adapter.id(&value).unwrap().as_deref(), Some("3"));
        assert_eq!(adapter.attribute(&value, "name"), Some(json!("car")));
        assert_eq!(adapter.attributes(&value).len(), 5);
        assert!(matches!(adapter.related(&value, "owner"), Some(Related::One(_))));
        assert!(matches!(
            adapter.related(&value, "wheels"),
            Some(Related::Many(ref items)) if items.len() == 2
        ));
        assert!(adapter.related(&value, "gone").is_none());
        assert!(adapter.related(&value, "missing").is_none());
    }

    #[test]
    fn plain_adapter_without_id() {
        assert_eq!(PlainAdapter.id(&json!({ "name": "x" })).unwrap(), None);
        assert_eq!(PlainAdapter.id(&json!("scalar")).unwrap(), None);
    }

    #[test]
    fn plain_adapter_reads_entity_id_property() {
        let p = post();
        let entity: &DynEntity = &p;
        assert_eq!(PlainAdapter.id(entity).unwrap().as_deref(), Some("7"));
        assert!(matches!(
            PlainAdapter.related(entity, "tags"),
            Some(Related::Many(ref tags)) if tags.len() == 1
        ));
        assert!(PlainAdapter.related(entity, "title").is_none());
    }

    #[test]
    fn entity_adapter_rejects_composite_key() {
        let p = post();
        let entity: &DynEntity = &p;
        let err = EntityAdapter.id(entity).unwrap_err();
        assert_eq!(err, AdapterError::UnsupportedKeyShape { count: 2 });
    }

    #[test]
    fn entity_adapter_uses_declared_key() {
        let tag = Tag {
            label: "rust".into(),
        };
        let entity: &DynEntity = &tag;
        assert_eq!(EntityAdapter.id(entity).unwrap().as_deref(), Some("rust"));
    }

    #[test]
    fn registry_lookup() {
        let registry = AdapterRegistry::<DynEntity>::new();
        assert!(registry.contains(DEFAULT_ADAPTER));
        assert!(registry.resolve(&AdapterChoice::named(ENTITY_ADAPTER)).is_ok());
        assert_eq!(
            registry.get("sequel").err(),
            Some(AdapterError::UnknownAdapter("sequel".into()))
        );

        let json_registry = AdapterRegistry::<Value>::new();
        assert!(!json_registry.contains(ENTITY_ADAPTER));
        let custom: AdapterChoice<Value> = AdapterChoice::Custom(Arc::new(PlainAdapter));
        assert!(AdapterRegistry::<Value>::empty().resolve(&custom).is_ok());
    }
}
