//! XML reading and writing for docbind element trees.
//!
//! This crate connects [`docbind_model`] to XML through [`quick-xml`]. The
//! parser looks every attribute and child up in the bound metadata and feeds
//! raw values through its parse hooks; the writer walks the tree in
//! declared-then-undeclared order and emits the declared names.
//!
//! # Overview
//!
//! - [`parse`]: XML text into a tree bound to an [`ElementMetadata`]
//! - [`parse_unbound`]: XML text into an unbound tree of undeclared content
//! - [`to_string`], [`to_string_pretty`], [`write`]: a tree back to XML
//!
//! # Example
//!
//! ```rust
//! use docbind_model::{ElementKey, MetadataRegistry, QName};
//!
//! let registry = MetadataRegistry::new();
//! let entry = ElementKey::container(QName::local("entry"));
//! let title = ElementKey::string(QName::local("title"));
//! registry.build(&entry).add_element(&title).set_required(true);
//! let metadata = registry.bind_element(&entry).unwrap();
//!
//! let element = docbind_xml::parse("<entry><title>Hi</title></entry>", &metadata).unwrap();
//! let resolved = element.resolve(&metadata).unwrap();
//! assert_eq!(
//!     docbind_xml::to_string(&resolved).unwrap(),
//!     "<entry><title>Hi</title></entry>"
//! );
//! ```
//!
//! [`ElementMetadata`]: docbind_model::ElementMetadata

pub mod error;
pub mod parser;
pub mod writer;

// Re-export main types
pub use error::{Error, Result};
pub use parser::{parse, parse_unbound};
pub use writer::{to_string, to_string_pretty, write};
