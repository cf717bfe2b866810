use indexmap::IndexMap;
use log::{debug, trace, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::document::{Document, Linkage, PrimaryData, Resource};
use crate::graph::{Annotations, Field, Graph, Materialized, Node, NodeId};
use crate::schema::{ParseAdapter, Schema, SchemaAdapter, SchemaError};

/// Records grouped by type, then by id, in ingestion order.
type Records = IndexMap<String, IndexMap<String, Resource>>;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("resource of type `{kind}` has no id")]
    MissingIdentifier { kind: String },
    #[error("resource `{id}` has no type")]
    MissingType { id: String },
    #[error("validation failed for {kind}/{id}: {source}")]
    Validation {
        kind: String,
        id: String,
        #[source]
        source: SchemaError,
    },
}

/// A validation failure recorded in non-strict mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub error: String,
}

/// Store configuration.
#[derive(Clone)]
pub struct StoreConfig {
    /// Wire type → canonical type.
    pub types: HashMap<String, String>,
    /// Canonical type → schema run on every ingested resource of that type.
    pub schemas: HashMap<String, Arc<dyn Schema>>,
    pub schema_adapter: Arc<dyn SchemaAdapter>,
    /// Fail the whole sync on the first invalid resource instead of
    /// collecting errors.
    pub strict: bool,
}

impl StoreConfig {
    pub fn new() -> Self {
        StoreConfig {
            types: HashMap::new(),
            schemas: HashMap::new(),
            schema_adapter: Arc::new(ParseAdapter),
            strict: false,
        }
    }

    pub fn with_type(mut self, wire: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.types.insert(wire.into(), canonical.into());
        self
    }

    pub fn with_schema(mut self, kind: impl Into<String>, schema: impl Schema + 'static) -> Self {
        self.schemas.insert(kind.into(), Arc::new(schema));
        self
    }

    pub fn with_schema_adapter(mut self, adapter: impl SchemaAdapter + 'static) -> Self {
        self.schema_adapter = Arc::new(adapter);
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("types", &self.types)
            .field("schemas", &self.schemas.keys().collect::<Vec<_>>())
            .field("strict", &self.strict)
            .finish()
    }
}

/// Normalizes wire documents into records and materializes model graphs.
///
/// Records are the verbatim ingested resources, upserted by `(type, id)`.
/// Every read builds a fresh [`Graph`]; within one read each `(type, id)`
/// appears exactly once, so shared and cyclic relationships resolve to the
/// same model.
#[derive(Debug, Default)]
pub struct Store {
    config: StoreConfig,
    records: Records,
    validation_errors: Vec<ValidationError>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Store {
            config,
            records: Records::new(),
            validation_errors: Vec::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Ingests a document and returns the models for its primary data.
    pub fn sync(&mut self, document: Document) -> Result<Materialized, StoreError> {
        self.ingest(document, None)
    }

    /// Like [`Store::sync`], but returns only primary models of `kind`, in
    /// document order, as a collection.
    pub fn sync_only(&mut self, document: Document, kind: &str) -> Result<Materialized, StoreError> {
        self.ingest(document, Some(kind))
    }

    /// Returns the model for a stored record, or `None` if there is none.
    pub fn find(&self, kind: &str, id: &str) -> Option<Materialized> {
        let mut materializer = Materializer::new(&self.records, &self.config.types);
        let node = materializer.resolve(kind, id)?;
        Some(Materialized::new(materializer.into_graph(), vec![node], false))
    }

    /// Returns every stored model of `kind`, in stored order.
    pub fn find_all(&self, kind: &str) -> Materialized {
        let kind = canonical(&self.config.types, kind);
        let mut materializer = Materializer::new(&self.records, &self.config.types);
        let roots = self
            .records
            .get(kind)
            .map(|ids| {
                ids.keys()
                    .filter_map(|id| materializer.resolve(kind, id))
                    .collect()
            })
            .unwrap_or_default();
        Materialized::new(materializer.into_graph(), roots, true)
    }

    /// Removes one record, or every record of `kind` when `id` is `None`.
    pub fn remove(&mut self, kind: &str, id: Option<&str>) {
        let kind = canonical(&self.config.types, kind).to_string();
        match id {
            Some(id) => {
                if let Some(ids) = self.records.get_mut(&kind) {
                    ids.shift_remove(id);
                }
            }
            None => {
                self.records.shift_remove(&kind);
            }
        }
    }

    /// Clears all records and recorded validation errors.
    pub fn reset(&mut self) {
        self.records.clear();
        self.validation_errors.clear();
    }

    /// Validation failures recorded by the last sync in non-strict mode.
    pub fn validation_errors(&self) -> &[ValidationError] {
        &self.validation_errors
    }

    /// The stored record for `(kind, id)`, exactly as ingested.
    pub fn record(&self, kind: &str, id: &str) -> Option<&Resource> {
        let kind = canonical(&self.config.types, kind);
        self.records.get(kind)?.get(id)
    }

    /// Total number of stored records.
    pub fn len(&self) -> usize {
        self.records.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ingest(&mut self, document: Document, only: Option<&str>) -> Result<Materialized, StoreError> {
        self.validation_errors.clear();

        let Document { data, included, .. } = document;
        let collection = matches!(data, Some(PrimaryData::Many(_))) || only.is_some();
        let primary = match data {
            None => Vec::new(),
            Some(PrimaryData::One(resource)) => vec![*resource],
            Some(PrimaryData::Many(resources)) => resources,
        };

        // Each resource is validated against the records written so far,
        // before the next one is written.
        let included_count = included.len();
        let mut ingested = Vec::with_capacity(included_count + primary.len());
        let mut transformed = Vec::new();
        for resource in included.into_iter().chain(primary) {
            let (kind, id) = self.upsert(resource)?;
            if let Some(data) = self.validate(&kind, &id)? {
                transformed.push((kind.clone(), id.clone(), data));
            }
            ingested.push((kind, id));
        }
        debug!(
            "synced {} included and {} primary resources",
            included_count,
            ingested.len() - included_count
        );

        let mut materializer = Materializer::new(&self.records, &self.config.types);
        for (kind, id, data) in transformed {
            if let Some(node) = materializer.resolve(&kind, &id) {
                materializer.apply(node, data);
            }
        }

        let only = only.map(|kind| canonical(&self.config.types, kind));
        let roots = ingested[included_count..]
            .iter()
            .filter(|(kind, _)| only.is_none_or(|wanted| wanted == kind))
            .filter_map(|(kind, id)| materializer.resolve(kind, id))
            .collect();

        Ok(Materialized::new(materializer.into_graph(), roots, collection))
    }

    /// Validates the freshly written record `(kind, id)` if its type has a
    /// schema. Returns the schema output when it passed.
    fn validate(&mut self, kind: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let Some(schema) = self.config.schemas.get(kind) else {
            return Ok(None);
        };
        let mut materializer = Materializer::new(&self.records, &self.config.types);
        let Some(data) = materializer
            .resolve(kind, id)
            .and_then(|node| materializer.graph.model(node))
            .map(|model| model.to_value())
        else {
            return Ok(None);
        };

        let validation = self
            .config
            .schema_adapter
            .validate(schema.as_ref(), &data, self.config.strict)
            .map_err(|source| StoreError::Validation {
                kind: kind.to_string(),
                id: id.to_string(),
                source,
            })?;

        if validation.valid {
            return Ok(Some(validation.data));
        }
        let error = validation.error.unwrap_or_else(|| "invalid".to_string());
        warn!("validation failed for {}/{}: {}", kind, id, error);
        self.validation_errors.push(ValidationError {
            kind: kind.to_string(),
            id: id.to_string(),
            error,
        });
        Ok(None)
    }

    /// Replaces any record with the same `(type, id)`, returning the key.
    fn upsert(&mut self, resource: Resource) -> Result<(String, String), StoreError> {
        let Some(id) = resource.id.clone() else {
            return Err(StoreError::MissingIdentifier {
                kind: resource.kind.clone().unwrap_or_default(),
            });
        };
        let Some(wire_kind) = resource.kind.as_deref() else {
            return Err(StoreError::MissingType { id });
        };
        let kind = canonical(&self.config.types, wire_kind).to_string();

        let ids = self.records.entry(kind.clone()).or_default();
        ids.shift_remove(&id);
        ids.insert(id.clone(), resource);
        Ok((kind, id))
    }
}

fn canonical<'a>(types: &'a HashMap<String, String>, kind: &'a str) -> &'a str {
    types.get(kind).map(String::as_str).unwrap_or(kind)
}

/// Builds models from records for one read, memoizing by `(type, id)`.
///
/// A model is registered in the cache before its relationships are resolved,
/// so a relationship leading back to a model under construction resolves to
/// that same node instead of recursing.
struct Materializer<'s> {
    records: &'s Records,
    types: &'s HashMap<String, String>,
    graph: Graph,
    cache: HashMap<String, HashMap<String, NodeId>>,
}

impl<'s> Materializer<'s> {
    fn new(records: &'s Records, types: &'s HashMap<String, String>) -> Self {
        Materializer {
            records,
            types,
            graph: Graph::new(),
            cache: HashMap::new(),
        }
    }

    fn into_graph(self) -> Graph {
        self.graph
    }

    fn resolve(&mut self, kind: &str, id: &str) -> Option<NodeId> {
        let types = self.types;
        let kind = canonical(types, kind);
        if let Some(node) = self.cache.get(kind).and_then(|ids| ids.get(id)) {
            trace!("model cache hit for {}/{}", kind, id);
            return Some(*node);
        }

        let records = self.records;
        let record = records.get(kind)?.get(id)?;
        Some(self.build(kind, id, record))
    }

    fn build(&mut self, kind: &str, id: &str, record: &'s Resource) -> NodeId {
        let mut fields: IndexMap<String, Field> = record
            .attributes
            .iter()
            .map(|(key, value)| (key.clone(), Field::Value(value.clone())))
            .collect();

        // An attribute named `meta` moves under `attributes.meta` so it is not
        // confused with the resource-level meta. An object-valued `attributes`
        // attribute absorbs it.
        if let Some(Field::Value(meta)) = fields.shift_remove("meta") {
            match fields.get_mut("attributes") {
                Some(Field::Value(Value::Object(existing))) => {
                    existing.insert("meta".to_string(), meta);
                }
                _ => {
                    let mut wrapper = Map::new();
                    wrapper.insert("meta".to_string(), meta);
                    fields.insert("attributes".to_string(), Field::Value(Value::Object(wrapper)));
                }
            }
        }

        let node = self.graph.insert(Node {
            kind: kind.to_string(),
            id: id.to_string(),
            fields,
            links: record.links.clone(),
            meta: record.meta.clone(),
            relationship: Annotations::default(),
        });
        self.cache
            .entry(kind.to_string())
            .or_default()
            .insert(id.to_string(), node);

        for (key, relationship) in &record.relationships {
            let annotations = Annotations {
                links: relationship.links.clone(),
                meta: relationship.meta.clone(),
            };
            let field = match &relationship.data {
                Some(None) if relationship.links.is_none() => continue,
                None if annotations.is_empty() => continue,
                Some(Some(Linkage::Many(identifiers))) => Field::Many {
                    models: identifiers
                        .iter()
                        .map(|target| self.resolve(&target.kind, &target.id))
                        .collect(),
                    annotations,
                },
                Some(Some(Linkage::One(target))) => match self.resolve(&target.kind, &target.id) {
                    Some(target) => {
                        self.graph.node_mut(target).relationship = annotations;
                        Field::One(target)
                    }
                    None => Field::Value(Value::Null),
                },
                Some(None) | None => Field::Placeholder(annotations),
            };
            self.graph.node_mut(node).fields.insert(key.clone(), field);
        }

        match record.attributes.get("type") {
            None | Some(Value::Null) => {}
            Some(Value::String(tag)) => self.graph.node_mut(node).kind = tag.clone(),
            Some(other) => self.graph.node_mut(node).kind = other.to_string(),
        }

        node
    }

    /// Writes schema output back onto plain attribute fields.
    fn apply(&mut self, node: NodeId, data: Value) {
        let Value::Object(parsed) = data else {
            return;
        };
        let fields = &mut self.graph.node_mut(node).fields;
        for (key, value) in parsed {
            match fields.get_mut(&key) {
                Some(Field::Value(slot)) => *slot = value,
                Some(_) => {}
                None if matches!(key.as_str(), "id" | "type" | "links" | "meta") => {}
                None => {
                    fields.insert(key, Field::Value(value));
                }
            }
        }
    }
}
