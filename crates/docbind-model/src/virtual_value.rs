//! Virtual values and elements: content that is logically owned by one
//! element but physically generated from, and parsed into, somewhere else.

use crate::datatype::Value;
use crate::element::Element;
use crate::error::ParseError;
use crate::metadata::ElementMetadata;
use crate::path_adapter::ElementAdapter;
use std::fmt;
use std::sync::Arc;

/// Generates and parses the value of an attribute or element text.
///
/// `metadata` is the metadata of `element`, the element owning the value.
pub trait VirtualValue: Send + Sync {
    fn generate(&self, element: &Element, metadata: &ElementMetadata) -> Option<Value>;

    fn parse(
        &self,
        element: &Element,
        metadata: &ElementMetadata,
        value: Value,
    ) -> Result<(), ParseError>;
}

/// Generates and parses a single-valued virtual child element.
pub trait SingleVirtualElement: Send + Sync {
    fn generate_single(
        &self,
        parent: &Element,
        parent_metadata: &ElementMetadata,
        metadata: &ElementMetadata,
    ) -> Option<Element>;

    fn parse_single(
        &self,
        parent: &Element,
        parent_metadata: &ElementMetadata,
        element: Element,
        metadata: &ElementMetadata,
    ) -> Result<(), ParseError>;
}

/// Generates and parses a repeating virtual child element.
pub trait MultipleVirtualElement: Send + Sync {
    fn generate_multiple(
        &self,
        parent: &Element,
        parent_metadata: &ElementMetadata,
        metadata: &ElementMetadata,
    ) -> Vec<Element>;

    fn parse_multiple(
        &self,
        parent: &Element,
        parent_metadata: &ElementMetadata,
        elements: Vec<Element>,
        metadata: &ElementMetadata,
    ) -> Result<(), ParseError>;
}

/// The virtual-element configuration of an element declaration.
#[derive(Clone)]
pub enum VirtualElement {
    Single(Arc<dyn SingleVirtualElement>),
    Multiple(Arc<dyn MultipleVirtualElement>),
    /// Sourced from a path; serves both the single and repeating forms.
    Path(Arc<ElementAdapter>),
}

impl VirtualElement {
    pub fn as_single(&self) -> Option<Arc<dyn SingleVirtualElement>> {
        match self {
            VirtualElement::Single(v) => Some(v.clone()),
            VirtualElement::Path(adapter) => Some(adapter.clone()),
            VirtualElement::Multiple(_) => None,
        }
    }

    pub fn as_multiple(&self) -> Option<Arc<dyn MultipleVirtualElement>> {
        match self {
            VirtualElement::Multiple(v) => Some(v.clone()),
            VirtualElement::Path(adapter) => Some(adapter.clone()),
            VirtualElement::Single(_) => None,
        }
    }
}

impl fmt::Debug for VirtualElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VirtualElement::Single(_) => f.write_str("VirtualElement::Single"),
            VirtualElement::Multiple(_) => f.write_str("VirtualElement::Multiple"),
            VirtualElement::Path(adapter) => write!(f, "VirtualElement::Path({})", adapter.path()),
        }
    }
}
