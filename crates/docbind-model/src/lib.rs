//! Metadata-driven data binding for semi-structured documents.
//!
//! This crate binds trees of typed [`Element`]s and [`Attribute`]s to a
//! separately declared schema. The schema is built through creators on a
//! [`MetadataRegistry`] and frozen into immutable [`Schema`] snapshots, from
//! which [`ElementMetadata`] and [`AttributeMetadata`] are bound per
//! (parent, key, [`MetadataContext`]).
//!
//! # Overview
//!
//! - [`QName`], [`ElementKey`], [`AttributeKey`]: identities of schema items
//! - [`MetadataRegistry`], [`ElementCreator`], [`AttributeCreator`]: declaration
//! - [`ElementMetadata`], [`AttributeMetadata`]: bound, immutable descriptions
//! - [`Element`]: a document node, iterated in declared-then-undeclared order
//! - [`Path`] and [`path_adapter`]: values and elements projected from
//!   elsewhere in the tree
//! - [`MetadataValidator`], [`ValidationContext`]: validation during
//!   [`Element::resolve`]
//!
//! # Example
//!
//! ```rust
//! use docbind_model::{AttributeKey, Element, ElementKey, MetadataRegistry, QName};
//!
//! let registry = MetadataRegistry::new();
//! let entry = ElementKey::container(QName::local("entry"));
//! let id = AttributeKey::string(QName::local("id"));
//! registry.build(&entry).add_attribute(&id).set_required(true);
//!
//! let metadata = registry.bind_element(&entry).unwrap();
//! let element = metadata.create_element().unwrap();
//! let err = element.resolve(&metadata).unwrap_err();
//! assert_eq!(err.errors().len(), 1);
//!
//! element.set_attribute_value(&id, "urn:1").unwrap();
//! assert!(element.resolve(&metadata).is_ok());
//! ```

pub mod adaptation;
pub mod attribute;
pub mod context;
pub mod creator;
pub mod datatype;
pub mod element;
pub mod error;
pub mod factory;
pub mod key;
pub mod metadata;
pub mod path;
pub mod path_adapter;
pub mod qname;
pub mod registry;
pub mod schema;
pub mod transform;
pub mod validation;
pub mod virtual_value;

// Re-export main types
pub use adaptation::AdaptationRegistry;
pub use attribute::Attribute;
pub use context::{AltFormat, MetadataContext, Version, VersionParseError};
pub use creator::{AttributeCreator, ElementCreator};
pub use datatype::{Datatype, Value, convert_str};
pub use element::{Element, ElementVisitor};
pub use error::{
    ContentCreationError, ContentValidationError, ElementError, ParseError, PathError,
    SchemaError, VisitorStopped,
};
pub use factory::ElementFactory;
pub use key::{AttributeKey, ElementKey, ElementType, MetadataKey};
pub use metadata::{AttributeMetadata, Cardinality, ElementMetadata};
pub use path::{Path, PathBuilder};
pub use path_adapter::{ElementAdapter, ValueAdapter};
pub use qname::{Namespace, QName};
pub use registry::{ElementDefinition, MetadataRegistry};
pub use schema::Schema;
pub use transform::TransformKey;
pub use validation::{
    ElementValidator, InstancePath, MetadataValidator, PathSegment, ValidationContext,
    ValidationError, ValidationErrorKind,
};
pub use virtual_value::{MultipleVirtualElement, SingleVirtualElement, VirtualElement, VirtualValue};
