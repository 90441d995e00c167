//! Error types.
//!
//! Schema-authoring mistakes ([`SchemaError`], [`PathError`]) are programmer
//! errors reported at the call that caused them. Content errors
//! ([`ParseError`], [`ContentCreationError`], [`ElementError`]) are expected
//! and recoverable. Validation problems are accumulated in a
//! [`ValidationContext`](crate::validation::ValidationContext) and only
//! surface as one [`ContentValidationError`] at the root of a resolve.

use crate::datatype::Datatype;
use crate::key::{ElementType, MetadataKey};
use crate::qname::QName;
use crate::validation::ValidationContext;
use thiserror::Error;

/// Errors in schema declarations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    /// `replace_attribute` / `replace_element` for a key never declared.
    #[error("cannot replace {key}: no declaration exists for it on {parent}")]
    ReplaceUndeclared { parent: QName, key: MetadataKey },

    /// A whitelist named a key that is not declared on the element.
    #[error("whitelist on {parent} names undeclared {key}")]
    WhitelistUndeclared { parent: QName, key: MetadataKey },

    /// A path used for parsing crosses more than one repeating element.
    #[error("path {path} contains more than one repeating element (second at {key})")]
    MultipleRepeatingSteps { path: String, key: QName },

    /// Move target path is empty or does not end in the expected key kind.
    #[error("invalid move path {path}: {reason}")]
    InvalidMovePath { path: String, reason: String },

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Errors building or resolving a [`Path`](crate::path::Path).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PathError {
    #[error("no element matching {id} is declared on {parent}")]
    NoSuchElement { parent: QName, id: QName },

    #[error("no attribute matching {id} is declared on {parent}")]
    NoSuchAttribute { parent: QName, id: QName },

    #[error("cannot add step {id}: path already ends in attribute {attribute}")]
    AfterAttribute { attribute: QName, id: QName },
}

/// A failure to construct an element of a given type.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("cannot create element of type {target} for {id}: {message}")]
pub struct ContentCreationError {
    pub target: ElementType,
    pub id: QName,
    pub message: String,
}

impl ContentCreationError {
    pub fn new(target: ElementType, id: QName, message: impl Into<String>) -> Self {
        Self {
            target,
            id,
            message: message.into(),
        }
    }
}

/// Errors mutating or reading an element tree.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ElementError {
    #[error("element {0} is locked")]
    Locked(QName),

    #[error("value for {id} must be {expected}, got {got}")]
    InvalidValue {
        id: QName,
        expected: Datatype,
        got: Datatype,
    },

    #[error("element {0} does not allow text content")]
    ContentNotAllowed(QName),

    #[error("element {0} is repeating; use the multi-valued accessors")]
    Repeating(QName),

    #[error("{count} children named {id} remain but only one is allowed")]
    CardinalityViolation { id: QName, count: usize },

    #[error("cannot adapt {id} from {from} to {to}")]
    IncompatibleAdaptation {
        id: QName,
        from: ElementType,
        to: ElementType,
    },

    #[error(transparent)]
    Creation(#[from] ContentCreationError),
}

/// Errors turning raw input into typed content.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("invalid {datatype} value '{value}'")]
    InvalidValue { value: String, datatype: Datatype },

    #[error("text content '{value}' is not allowed")]
    ContentNotAllowed { value: String },

    #[error("{id} cannot appear more than once")]
    DuplicateElement { id: QName },

    #[error(transparent)]
    Element(#[from] ElementError),

    #[error(transparent)]
    Creation(#[from] ContentCreationError),

    #[error(transparent)]
    Path(#[from] PathError),

    /// Schema-authoring errors found while parsing; not recoverable.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Raised by [`Element::resolve`](crate::element::Element::resolve) when the
/// tree has one or more validation errors.
#[derive(Debug, Error)]
#[error("invalid content: {} validation error(s)", .context.errors().len())]
pub struct ContentValidationError {
    pub context: ValidationContext,
}

impl ContentValidationError {
    pub fn errors(&self) -> &[crate::validation::ValidationError] {
        self.context.errors()
    }
}

/// Returned by an [`ElementVisitor`](crate::element::ElementVisitor) to stop
/// a traversal early.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("visitor stopped: {0}")]
pub struct VisitorStopped(pub String);
