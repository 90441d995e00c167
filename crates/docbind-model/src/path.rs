//! Paths of metadata keys from a root element.
//!
//! A relative path is just a list of steps. An absolute path is bound to a
//! root's metadata: every step has been checked against the schema and the
//! path remembers the declared key and bound metadata at each point.

use crate::error::PathError;
use crate::key::{AttributeKey, ElementKey, MetadataKey};
use crate::metadata::{AttributeMetadata, ElementMetadata};
use std::fmt;

/// An immutable sequence of element steps, optionally ending in one
/// attribute step.
#[derive(Clone)]
pub struct Path {
    root: Option<ElementMetadata>,
    steps: Vec<MetadataKey>,
    /// Bound metadata of each element step; empty for relative paths.
    element_metadata: Vec<ElementMetadata>,
    attribute_metadata: Option<AttributeMetadata>,
}

impl Path {
    /// The empty relative path.
    pub fn empty() -> Path {
        Path {
            root: None,
            steps: Vec::new(),
            element_metadata: Vec::new(),
            attribute_metadata: None,
        }
    }

    pub fn builder() -> PathBuilder {
        PathBuilder::new(None)
    }

    pub fn builder_from_root(root: &ElementMetadata) -> PathBuilder {
        PathBuilder::new(Some(root.clone()))
    }

    /// A relative path of `steps`.
    pub fn of(steps: impl IntoIterator<Item = MetadataKey>) -> Result<Path, PathError> {
        steps
            .into_iter()
            .try_fold(Path::builder(), PathBuilder::add_step)
            .map(PathBuilder::build)
    }

    /// An absolute path of `steps` from `root`.
    pub fn to(
        root: &ElementMetadata,
        steps: impl IntoIterator<Item = MetadataKey>,
    ) -> Result<Path, PathError> {
        steps
            .into_iter()
            .try_fold(Path::builder_from_root(root), PathBuilder::add_step)
            .map(PathBuilder::build)
    }

    /// Rebind this path's steps against `root`, re-validating each one.
    pub fn to_absolute(&self, root: &ElementMetadata) -> Result<Path, PathError> {
        Path::to(root, self.steps.iter().cloned())
    }

    /// The same steps without a root.
    pub fn to_relative(&self) -> Path {
        Path {
            root: None,
            steps: self.steps.clone(),
            element_metadata: Vec::new(),
            attribute_metadata: None,
        }
    }

    pub fn root(&self) -> Option<&ElementMetadata> {
        self.root.as_ref()
    }

    pub fn is_absolute(&self) -> bool {
        self.root.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[MetadataKey] {
        &self.steps
    }

    pub fn selects_attribute(&self) -> bool {
        matches!(self.steps.last(), Some(MetadataKey::Attribute(_)))
    }

    pub fn selects_element(&self) -> bool {
        !self.selects_attribute()
    }

    pub fn selected_key(&self) -> Option<&MetadataKey> {
        self.steps.last()
    }

    pub fn selected_element_key(&self) -> Option<&ElementKey> {
        self.steps.last().and_then(MetadataKey::as_element)
    }

    pub fn selected_attribute_key(&self) -> Option<&AttributeKey> {
        self.steps.last().and_then(MetadataKey::as_attribute)
    }

    /// Key of the element owning the selected step, if it is not the root.
    pub fn parent_key(&self) -> Option<&ElementKey> {
        let n = self.steps.len();
        if n < 2 {
            return None;
        }
        self.steps[n - 2].as_element()
    }

    /// Metadata of the selected element: the root for an empty path, the
    /// last element step otherwise, or the owner of the selected attribute.
    pub fn selected_element(&self) -> Option<&ElementMetadata> {
        self.element_metadata.last().or(self.root.as_ref())
    }

    pub fn selected_attribute(&self) -> Option<&AttributeMetadata> {
        self.attribute_metadata.as_ref()
    }

    /// Bound metadata of the element steps, in order.
    pub fn element_metadata(&self) -> &[ElementMetadata] {
        &self.element_metadata
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.steps == other.steps
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return f.write_str(".");
        }
        let rendered: Vec<String> = self.steps.iter().map(|s| s.to_string()).collect();
        f.write_str(&rendered.join("/"))
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Some(root) => write!(f, "Path({} from {})", self, root.key().id()),
            None => write!(f, "Path({})", self),
        }
    }
}

/// Builds a [`Path`] step by step.
pub struct PathBuilder {
    root: Option<ElementMetadata>,
    steps: Vec<MetadataKey>,
    element_metadata: Vec<ElementMetadata>,
    attribute_metadata: Option<AttributeMetadata>,
}

impl PathBuilder {
    fn new(root: Option<ElementMetadata>) -> Self {
        Self {
            root,
            steps: Vec::new(),
            element_metadata: Vec::new(),
            attribute_metadata: None,
        }
    }

    fn selected(&self) -> Option<&ElementMetadata> {
        self.element_metadata.last().or(self.root.as_ref())
    }

    /// Append a step. On a bound builder the step must match a declared
    /// child or attribute of the currently selected element, and the
    /// declared key is stored in place of `key`.
    pub fn add_step(mut self, key: MetadataKey) -> Result<Self, PathError> {
        if let Some(MetadataKey::Attribute(last)) = self.steps.last() {
            return Err(PathError::AfterAttribute {
                attribute: last.id().clone(),
                id: key.id().clone(),
            });
        }
        let Some(selected) = self.selected().cloned() else {
            self.steps.push(key);
            return Ok(self);
        };
        match key {
            MetadataKey::Element(key) => {
                let no_such = || PathError::NoSuchElement {
                    parent: selected.key().id().clone(),
                    id: key.id().clone(),
                };
                let declared = selected.find_element(key.id()).ok_or_else(no_such)?;
                let child = selected.bind_element(&declared).ok_or_else(no_such)?;
                self.steps.push(MetadataKey::Element(declared));
                self.element_metadata.push(child);
            }
            MetadataKey::Attribute(key) => {
                let no_such = || PathError::NoSuchAttribute {
                    parent: selected.key().id().clone(),
                    id: key.id().clone(),
                };
                let declared = selected.find_attribute(key.id()).ok_or_else(no_such)?;
                let attribute = selected.bind_attribute(&declared).ok_or_else(no_such)?;
                self.steps.push(MetadataKey::Attribute(declared));
                self.attribute_metadata = Some(attribute);
            }
        }
        Ok(self)
    }

    pub fn add_element(self, key: &ElementKey) -> Result<Self, PathError> {
        self.add_step(MetadataKey::Element(key.clone()))
    }

    pub fn add_attribute(self, key: &AttributeKey) -> Result<Self, PathError> {
        self.add_step(MetadataKey::Attribute(key.clone()))
    }

    pub fn build(self) -> Path {
        Path {
            root: self.root,
            steps: self.steps,
            element_metadata: self.element_metadata,
            attribute_metadata: self.attribute_metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qname::QName;

    #[test]
    fn test_relative_display() {
        let path = Path::of([
            MetadataKey::from(ElementKey::container(QName::local("author"))),
            MetadataKey::from(AttributeKey::string(QName::local("href"))),
        ])
        .unwrap();
        assert_eq!(path.to_string(), "author/@href");
        assert!(path.selects_attribute());
        assert_eq!(Path::empty().to_string(), ".");
    }

    #[test]
    fn test_attribute_is_terminal() {
        let err = Path::builder()
            .add_attribute(&AttributeKey::string(QName::local("a")))
            .unwrap()
            .add_element(&ElementKey::string(QName::local("b")))
            .err()
            .unwrap();
        assert!(matches!(err, PathError::AfterAttribute { .. }));
    }

    #[test]
    fn test_parent_key() {
        let author = ElementKey::container(QName::local("author"));
        let name = ElementKey::string(QName::local("name"));
        let path = Path::of([author.clone().into(), name.clone().into()]).unwrap();
        assert_eq!(path.parent_key(), Some(&author));
        assert_eq!(path.selected_element_key(), Some(&name));
        assert!(!path.is_absolute());
    }
}
