use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::serde_helpers::{double_option, lenient_id};

/// Ordered attribute map of a resource or model.
pub type Attributes = IndexMap<String, Value>;

/// Ordered link map (`self`, `related`, or any other link name).
pub type Links = IndexMap<String, Value>;

/// A top-level wire document.
///
/// `data` always serializes, as `null` when unset; `included` is omitted
/// when empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub data: Option<PrimaryData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Document {
    /// Parses a document from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encodes the document as compact JSON text.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Iterates over the primary resources, whether `data` holds one or many.
    pub fn primary(&self) -> impl Iterator<Item = &Resource> {
        let slice: &[Resource] = match &self.data {
            None => &[],
            Some(PrimaryData::One(resource)) => std::slice::from_ref(&**resource),
            Some(PrimaryData::Many(resources)) => resources,
        };
        slice.iter()
    }
}

/// Primary document data: a single resource or a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    Many(Vec<Resource>),
    One(Box<Resource>),
}

impl PrimaryData {
    pub fn is_collection(&self) -> bool {
        matches!(self, PrimaryData::Many(_))
    }
}

/// A typed, identified unit of wire data.
///
/// `id` and `kind` are optional on the wire so that their absence can be
/// reported as a structural error instead of a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "lenient_id::option"
    )]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub relationships: IndexMap<String, Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Resource {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Resource {
            id: Some(id.into()),
            kind: Some(kind.into()),
            ..Resource::default()
        }
    }

    /// Returns the `(id, type)` identifier when both are present.
    pub fn identifier(&self) -> Option<ResourceIdentifier> {
        match (&self.id, &self.kind) {
            (Some(id), Some(kind)) => Some(ResourceIdentifier::new(kind.clone(), id.clone())),
            _ => None,
        }
    }
}

/// A named edge from one resource to zero, one or many others.
///
/// `data` is `None` when the key was absent on the wire and `Some(None)`
/// when it was an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub data: Option<Option<Linkage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Relationship {
    /// Returns the linkage if `data` is present and not `null`.
    pub fn linkage(&self) -> Option<&Linkage> {
        self.data.as_ref().and_then(Option::as_ref)
    }
}

/// Resource linkage carried by a relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    Many(Vec<ResourceIdentifier>),
    One(ResourceIdentifier),
}

/// The `(id, type)` pair referencing a resource without its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(with = "lenient_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResourceIdentifier {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        ResourceIdentifier {
            id: id.into(),
            kind: kind.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_single_resource_document() {
        let doc: Document = serde_json::from_value(json!({
            "data": {
                "type": "events",
                "id": "1",
                "attributes": { "name": "Demo" },
                "relationships": {
                    "venue": { "data": { "type": "venues", "id": 4 } },
                    "sponsor": { "data": null },
                    "talks": { "links": { "related": "/events/1/talks" } }
                }
            }
        }))
        .unwrap();

        let resource = doc.primary().next().unwrap();
        assert_eq!(resource.id.as_deref(), Some("1"));
        assert_eq!(resource.kind.as_deref(), Some("events"));
        assert_eq!(resource.attributes["name"], json!("Demo"));

        let venue = &resource.relationships["venue"];
        assert_eq!(
            venue.linkage(),
            Some(&Linkage::One(ResourceIdentifier::new("venues", "4")))
        );
        assert_eq!(resource.relationships["sponsor"].data, Some(None));
        assert_eq!(resource.relationships["talks"].data, None);
        assert!(!doc.data.as_ref().unwrap().is_collection());
    }

    #[test]
    fn parse_collection_with_included() {
        let doc = Document::from_json_str(
            r#"{
                "data": [{ "type": "a", "id": "1" }, { "type": "a", "id": "2" }],
                "included": [{ "type": "b", "id": "9" }],
                "meta": { "total": 2 }
            }"#,
        )
        .unwrap();

        assert_eq!(doc.primary().count(), 2);
        assert_eq!(doc.included.len(), 1);
        assert_eq!(doc.meta, Some(json!({ "total": 2 })));
    }

    #[test]
    fn missing_id_is_representable() {
        let doc: Document =
            serde_json::from_value(json!({ "data": { "type": "events" } })).unwrap();
        let resource = doc.primary().next().unwrap();
        assert!(resource.id.is_none());
        assert!(resource.identifier().is_none());
    }

    #[test]
    fn empty_document_serializes_null_data() {
        let doc = Document::default();
        assert_eq!(serde_json::to_value(&doc).unwrap(), json!({ "data": null }));
    }

    #[test]
    fn relationship_null_data_round_trips_as_null() {
        let rel = Relationship {
            data: Some(None),
            ..Relationship::default()
        };
        assert_eq!(serde_json::to_value(&rel).unwrap(), json!({ "data": null }));
    }
}
