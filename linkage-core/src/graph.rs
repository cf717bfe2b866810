use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::document::Links;

/// Index of a node inside the [`Graph`] it was allocated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Relationship-level `links`/`meta` carried alongside a resolved model.
///
/// These never appear among a model's ordinary fields so they cannot clash
/// with the target's own attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    pub links: Option<Links>,
    pub meta: Option<Value>,
}

impl Annotations {
    pub fn is_empty(&self) -> bool {
        self.links.is_none() && self.meta.is_none()
    }
}

/// One keyed entry of a model.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A plain attribute value.
    Value(Value),
    /// A to-one relationship resolved to a model.
    One(NodeId),
    /// A to-many relationship. Identifiers that did not resolve keep their
    /// slot as `None`. The annotations belong to the collection.
    Many {
        models: Vec<Option<NodeId>>,
        annotations: Annotations,
    },
    /// A relationship with links or meta but no linkage.
    Placeholder(Annotations),
}

/// A materialized model: attributes, resolved relationships and side channels.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub(crate) kind: String,
    pub(crate) id: String,
    pub(crate) fields: IndexMap<String, Field>,
    pub(crate) links: Option<Links>,
    pub(crate) meta: Option<Value>,
    pub(crate) relationship: Annotations,
}

/// Arena holding every model built by one read of the store.
///
/// Models refer to each other by [`NodeId`], so cyclic relationship graphs
/// need no reference cycles and identity is simply index equality.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Graph { nodes: Vec::new() }
    }

    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Returns a handle to the model at `id`, if it belongs to this graph.
    pub fn model(&self, id: NodeId) -> Option<ModelRef<'_>> {
        (id.0 < self.nodes.len()).then_some(ModelRef { graph: self, node: id })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

/// Borrowed handle to a model inside a [`Graph`].
///
/// Two handles are equal only when they point at the same node of the same
/// graph, which is how shared and cyclic references are observed.
#[derive(Clone, Copy)]
pub struct ModelRef<'g> {
    graph: &'g Graph,
    node: NodeId,
}

impl<'g> ModelRef<'g> {
    fn data(&self) -> &'g Node {
        self.graph.node(self.node)
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn id(&self) -> &'g str {
        &self.data().id
    }

    /// The hidden type tag.
    pub fn kind(&self) -> &'g str {
        &self.data().kind
    }

    pub fn get(&self, key: &str) -> Option<&'g Field> {
        self.data().fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data().fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'g str> {
        self.data().fields.keys().map(String::as_str)
    }

    /// Returns a plain attribute value. Relationship fields yield `None`.
    pub fn attr(&self, key: &str) -> Option<&'g Value> {
        match self.get(key)? {
            Field::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Follows a to-one relationship.
    pub fn one(&self, key: &str) -> Option<ModelRef<'g>> {
        match self.get(key)? {
            Field::One(target) => Some(self.at(*target)),
            _ => None,
        }
    }

    /// Follows a to-many relationship, one entry per identifier on the wire.
    /// Unresolved identifiers yield `None`. Missing or to-one keys yield an empty list.
    pub fn many(&self, key: &str) -> Vec<Option<ModelRef<'g>>> {
        match self.get(key) {
            Some(Field::Many { models, .. }) => models
                .iter()
                .map(|slot| slot.map(|id| self.at(id)))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Resource-level links.
    pub fn links(&self) -> Option<&'g Links> {
        self.data().links.as_ref()
    }

    /// Resource-level meta.
    pub fn meta(&self) -> Option<&'g Value> {
        self.data().meta.as_ref()
    }

    /// Links of the relationship this model was last reached through.
    pub fn relationship_links(&self) -> Option<&'g Links> {
        self.data().relationship.links.as_ref()
    }

    /// Meta of the relationship this model was last reached through.
    pub fn relationship_meta(&self) -> Option<&'g Value> {
        self.data().relationship.meta.as_ref()
    }

    /// Annotations stored on a to-many or placeholder field.
    pub fn field_annotations(&self, key: &str) -> Option<&'g Annotations> {
        match self.get(key)? {
            Field::Many { annotations, .. } | Field::Placeholder(annotations) => Some(annotations),
            _ => None,
        }
    }

    /// Renders the model as JSON.
    ///
    /// A model already being rendered higher up the current path is emitted
    /// as its `{id, type}` identifier, so cycles terminate.
    pub fn to_value(&self) -> Value {
        let mut path = HashSet::new();
        self.render(&mut path)
    }

    fn at(&self, node: NodeId) -> ModelRef<'g> {
        ModelRef {
            graph: self.graph,
            node,
        }
    }

    fn render(&self, path: &mut HashSet<NodeId>) -> Value {
        let node = self.data();
        if !path.insert(self.node) {
            let mut identifier = Map::new();
            identifier.insert("id".to_string(), Value::String(node.id.clone()));
            identifier.insert("type".to_string(), Value::String(node.kind.clone()));
            return Value::Object(identifier);
        }

        let mut out = Map::new();
        for (key, field) in &node.fields {
            let value = match field {
                Field::Value(value) => value.clone(),
                Field::One(target) => self.at(*target).render(path),
                Field::Many { models, .. } => Value::Array(
                    models
                        .iter()
                        .map(|slot| slot.map_or(Value::Null, |id| self.at(id).render(path)))
                        .collect(),
                ),
                Field::Placeholder(_) => Value::Object(Map::new()),
            };
            out.insert(key.clone(), value);
        }
        out.insert("id".to_string(), Value::String(node.id.clone()));
        out.insert("type".to_string(), Value::String(node.kind.clone()));
        if let Some(links) = &node.links {
            out.insert("links".to_string(), links_value(links));
        }
        if let Some(meta) = &node.meta {
            out.insert("meta".to_string(), meta.clone());
        }

        path.remove(&self.node);
        Value::Object(out)
    }
}

impl PartialEq for ModelRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.graph, other.graph) && self.node == other.node
    }
}

impl Eq for ModelRef<'_> {}

impl std::fmt::Debug for ModelRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRef")
            .field("kind", &self.kind())
            .field("id", &self.id())
            .field("node", &self.node)
            .finish()
    }
}

fn links_value(links: &Links) -> Value {
    Value::Object(links.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// Models returned by one store read, together with the graph that owns them.
#[derive(Debug)]
pub struct Materialized {
    graph: Graph,
    roots: Vec<NodeId>,
    collection: bool,
}

impl Materialized {
    pub(crate) fn new(graph: Graph, roots: Vec<NodeId>, collection: bool) -> Self {
        Materialized {
            graph,
            roots,
            collection,
        }
    }

    /// The first (for single-resource reads, the only) model.
    pub fn first(&self) -> Option<ModelRef<'_>> {
        self.roots.first().and_then(|id| self.graph.model(*id))
    }

    pub fn models(&self) -> impl Iterator<Item = ModelRef<'_>> {
        self.roots.iter().filter_map(|id| self.graph.model(*id))
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// True when the read produced a collection rather than a single model.
    pub fn is_collection(&self) -> bool {
        self.collection
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Renders the result as JSON: `null`, one object, or an array.
    pub fn to_value(&self) -> Value {
        if self.collection {
            Value::Array(self.models().map(|m| m.to_value()).collect())
        } else {
            self.first().map_or(Value::Null, |m| m.to_value())
        }
    }
}
