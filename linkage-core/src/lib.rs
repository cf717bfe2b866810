//! Linkage reads and writes JSON:API-style documents.
//!
//! Core concepts:
//! - **Document**: The wire format, `data` plus `included` resources with typed relationships
//! - **Store**: Normalized in-memory records, keyed by type and id
//! - **Model**: A materialized record whose relationships are resolved to other models,
//!   held in a [`Graph`] so shared and cyclic references keep their identity
//! - **Presenter**: Turns application objects into a document, deduplicating `included`
//! - **Adapter**: Uniform read access to application objects of one shape
//!
//! # Example
//!
//! ```
//! use linkage_core::{Document, Store};
//!
//! let document = Document::from_json_str(r#"{
//!     "data": { "type": "events", "id": "1", "attributes": { "name": "Launch" } }
//! }"#).unwrap();
//!
//! let mut store = Store::new();
//! let events = store.sync(document).unwrap();
//! let event = events.first().unwrap();
//! assert_eq!(event.attr("name").unwrap(), "Launch");
//! assert_eq!(event.kind(), "events");
//! ```

extern crate self as linkage_core;

mod adapter;
mod document;
mod graph;
mod presenter;
mod schema;
pub mod serde_helpers;
mod store;

pub use adapter::{
    Adapter, AdapterChoice, AdapterError, AdapterRegistry, DynEntity, Entity, EntityAdapter,
    PlainAdapter, Property, Related, DEFAULT_ADAPTER, ENTITY_ADAPTER,
};
pub use document::{
    Attributes, Document, Linkage, Links, PrimaryData, Relationship, Resource, ResourceIdentifier,
};
pub use graph::{Annotations, Field, Graph, Materialized, ModelRef, NodeId};
pub use presenter::{
    LinkSource, PresentError, Presenter, PresenterConfig, Presenters, RenderOptions, Scope, Subject,
};
pub use schema::{ParseAdapter, SafeParse, Schema, SchemaAdapter, SchemaError, Validation};
pub use store::{Store, StoreConfig, StoreError, ValidationError};

#[cfg(feature = "derive")]
pub use linkage_derive::Entity;
