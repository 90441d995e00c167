//! Validation of bound element trees.
//!
//! Validators never stop a traversal: every problem is recorded in a
//! [`ValidationContext`] so a single resolve reports all of them.

use crate::datatype::Datatype;
use crate::element::Element;
use crate::metadata::ElementMetadata;
use crate::qname::QName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured validation error kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ValidationErrorKind {
    /// Element has text but its datatype is void.
    UnexpectedContent,

    /// Element requires text but has none.
    MissingContent { datatype: String },

    /// A required attribute is absent.
    MissingAttribute { attribute: String },

    /// A required child element is absent.
    MissingElement { element: String },

    /// Raised by a custom validator.
    Custom { code: String, message: String },
}

impl ValidationErrorKind {
    /// Stable machine-readable code.
    pub fn error_code(&self) -> &str {
        match self {
            ValidationErrorKind::UnexpectedContent => "B-1-01",
            ValidationErrorKind::MissingContent { .. } => "B-1-02",
            ValidationErrorKind::MissingAttribute { .. } => "B-1-03",
            ValidationErrorKind::MissingElement { .. } => "B-1-04",
            ValidationErrorKind::Custom { code, .. } => code,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ValidationErrorKind::UnexpectedContent => {
                "Text content is not allowed on this element".to_string()
            }
            ValidationErrorKind::MissingContent { datatype } => {
                format!("Missing required {} text content", datatype)
            }
            ValidationErrorKind::MissingAttribute { attribute } => {
                format!("Missing required attribute '{}'", attribute)
            }
            ValidationErrorKind::MissingElement { element } => {
                format!("Missing required element '{}'", element)
            }
            ValidationErrorKind::Custom { message, .. } => message.clone(),
        }
    }
}

/// One step of an [`InstancePath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Element(QName),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Element(id) => write!(f, "{}", id),
            PathSegment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// Location of an element in the instance tree, from the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstancePath {
    segments: Vec<PathSegment>,
}

impl InstancePath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    pub fn pop(&mut self) {
        self.segments.pop();
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                PathSegment::Element(_) => write!(f, "/{}", segment)?,
                PathSegment::Index(_) => write!(f, "{}", segment)?,
            }
        }
        Ok(())
    }
}

/// A validation failure on one element.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    /// Id of the offending element.
    pub element: QName,
    pub instance_path: InstancePath,
}

impl ValidationError {
    pub fn error_code(&self) -> &str {
        self.kind.error_code()
    }

    pub fn message(&self) -> String {
        self.kind.message()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at {}",
            self.error_code(),
            self.message(),
            self.instance_path
        )
    }
}

/// Accumulates validation errors during a traversal.
#[derive(Debug, Default)]
pub struct ValidationContext {
    instance_path: InstancePath,
    errors: Vec<ValidationError>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error against `element` at the current instance path.
    pub fn add_error(&mut self, element: &Element, kind: ValidationErrorKind) {
        self.errors.push(ValidationError {
            kind,
            element: element.id().clone(),
            instance_path: self.instance_path.clone(),
        });
    }

    /// Execute a function with extra instance path segments pushed.
    pub fn with_instance_path<F, R>(&mut self, segments: Vec<PathSegment>, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        let depth = segments.len();
        for segment in segments {
            self.instance_path.push(segment);
        }
        let result = f(self);
        for _ in 0..depth {
            self.instance_path.pop();
        }
        result
    }

    pub fn instance_path(&self) -> &InstancePath {
        &self.instance_path
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }
}

/// Validates one element against its bound metadata.
pub trait ElementValidator: fmt::Debug + Send + Sync {
    fn validate(&self, vc: &mut ValidationContext, element: &Element, metadata: &ElementMetadata);
}

/// The default validator: checks text content against the datatype and the
/// presence of required attributes and children. All checks run; none
/// short-circuits another.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataValidator;

impl ElementValidator for MetadataValidator {
    fn validate(&self, vc: &mut ValidationContext, element: &Element, metadata: &ElementMetadata) {
        self.validate_content(vc, element, metadata);
        self.validate_attributes(vc, element, metadata);
        self.validate_elements(vc, element, metadata);
    }
}

impl MetadataValidator {
    fn validate_content(
        &self,
        vc: &mut ValidationContext,
        element: &Element,
        metadata: &ElementMetadata,
    ) {
        let datatype = metadata.key().datatype();
        if datatype == Datatype::Void {
            if element.has_text_value() {
                vc.add_error(element, ValidationErrorKind::UnexpectedContent);
            }
        } else if metadata.is_content_required()
            && metadata.generate_value(element, metadata).is_none()
        {
            vc.add_error(
                element,
                ValidationErrorKind::MissingContent {
                    datatype: datatype.to_string(),
                },
            );
        }
    }

    fn validate_attributes(
        &self,
        vc: &mut ValidationContext,
        element: &Element,
        metadata: &ElementMetadata,
    ) {
        for key in metadata.attributes() {
            if key.is_undeclared_marker() {
                continue;
            }
            let Some(attribute) = metadata.bind_attribute(key) else {
                continue;
            };
            if attribute.is_required() && attribute.generate_value(element, metadata).is_none() {
                vc.add_error(
                    element,
                    ValidationErrorKind::MissingAttribute {
                        attribute: attribute.name().to_string(),
                    },
                );
            }
        }
    }

    fn validate_elements(
        &self,
        vc: &mut ValidationContext,
        element: &Element,
        metadata: &ElementMetadata,
    ) {
        for key in metadata.elements() {
            if key.is_undeclared_marker() {
                continue;
            }
            let Some(child) = metadata.bind_element(key) else {
                continue;
            };
            if !child.is_required() {
                continue;
            }
            let present = if let Some(virt) = child.single_virtual_element() {
                virt.generate_single(element, metadata, &child).is_some()
            } else if let Some(virt) = child.multiple_virtual_element() {
                !virt.generate_multiple(element, metadata, &child).is_empty()
            } else if key.id().is_wildcard() {
                element
                    .element_iterator_with(None)
                    .any(|c| key.id().matches(c.id()))
            } else {
                element.has_element(key.id())
            };
            if !present {
                vc.add_error(
                    element,
                    ValidationErrorKind::MissingElement {
                        element: child.name().to_string(),
                    },
                );
            }
        }
    }
}
