//! Metadata keys: the typed identities of attributes and elements.
//!
//! Equality is exact. [`MetadataKey::matches`] is the schema-compatibility
//! predicate used when selecting which declarations apply to a request: the
//! receiver may use wildcards in its id and may declare a supertype of the
//! other key's datatype and element type.

use crate::datatype::Datatype;
use crate::qname::QName;
use once_cell::sync::Lazy;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Local name of the undeclared-marker keys.
pub const UNDECLARED_MARKER: &str = "**UNDECLARED**";

struct TypeInfo {
    name: Arc<str>,
    parent: Option<ElementType>,
    depth: usize,
}

/// The implementation type of an element, forming a single-inheritance
/// hierarchy rooted at [`ElementType::element`].
///
/// Type names must be unique within a registry.
#[derive(Clone)]
pub struct ElementType(Arc<TypeInfo>);

static ELEMENT_TYPE: Lazy<ElementType> = Lazy::new(|| {
    ElementType(Arc::new(TypeInfo {
        name: Arc::from("Element"),
        parent: None,
        depth: 0,
    }))
});

impl ElementType {
    /// The root of the type hierarchy.
    pub fn element() -> ElementType {
        ELEMENT_TYPE.clone()
    }

    /// Declare a subtype of `self`.
    pub fn subtype(&self, name: impl Into<Arc<str>>) -> ElementType {
        ElementType(Arc::new(TypeInfo {
            name: name.into(),
            parent: Some(self.clone()),
            depth: self.0.depth + 1,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<&ElementType> {
        self.0.parent.as_ref()
    }

    /// True if `other` is `self` or one of its subtypes.
    pub fn is_assignable_from(&self, other: &ElementType) -> bool {
        let mut current = Some(other);
        while let Some(ty) = current {
            if ty == self {
                return true;
            }
            current = ty.parent();
        }
        false
    }
}

impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.depth == other.0.depth && self.0.name == other.0.name)
    }
}

impl Eq for ElementType {}

impl Hash for ElementType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
        self.0.depth.hash(state);
    }
}

impl PartialOrd for ElementType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Supertypes sort before their subtypes, so declarations for a more
/// specific type are composed after (and win over) generic ones.
impl Ord for ElementType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .depth
            .cmp(&other.0.depth)
            .then_with(|| self.0.name.cmp(&other.0.name))
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// Key of an attribute: id plus value datatype.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AttributeKey {
    id: QName,
    datatype: Datatype,
}

impl AttributeKey {
    pub fn of(id: QName, datatype: Datatype) -> Self {
        Self { id, datatype }
    }

    /// A string-valued attribute key.
    pub fn string(id: QName) -> Self {
        Self::of(id, Datatype::String)
    }

    /// Placeholder key marking where undeclared attributes iterate.
    pub fn undeclared_marker() -> Self {
        Self::of(QName::local(UNDECLARED_MARKER), Datatype::Void)
    }

    pub fn is_undeclared_marker(&self) -> bool {
        self.datatype == Datatype::Void && self.id == QName::local(UNDECLARED_MARKER)
    }

    pub fn id(&self) -> &QName {
        &self.id
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    pub fn matches(&self, other: &AttributeKey) -> bool {
        self.id.matches(&other.id) && self.datatype.is_assignable_from(other.datatype)
    }

    /// The same key with a different id.
    pub fn with_id(&self, id: QName) -> Self {
        Self::of(id, self.datatype)
    }
}

impl PartialOrd for AttributeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AttributeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.datatype.cmp(&other.datatype))
    }
}

impl fmt::Debug for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}<{}>", self.id, self.datatype)
    }
}

/// Key of an element: id, text datatype and implementation type.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ElementKey {
    id: QName,
    datatype: Datatype,
    element_type: ElementType,
}

impl ElementKey {
    pub fn of(id: QName, datatype: Datatype, element_type: ElementType) -> Self {
        Self {
            id,
            datatype,
            element_type,
        }
    }

    /// A generic element with string content.
    pub fn string(id: QName) -> Self {
        Self::of(id, Datatype::String, ElementType::element())
    }

    /// A generic element with no text content.
    pub fn container(id: QName) -> Self {
        Self::of(id, Datatype::Void, ElementType::element())
    }

    /// Placeholder key marking where undeclared children iterate.
    pub fn undeclared_marker() -> Self {
        Self::container(QName::local(UNDECLARED_MARKER))
    }

    pub fn is_undeclared_marker(&self) -> bool {
        self.datatype == Datatype::Void && self.id == QName::local(UNDECLARED_MARKER)
    }

    pub fn id(&self) -> &QName {
        &self.id
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    pub fn element_type(&self) -> &ElementType {
        &self.element_type
    }

    pub fn matches(&self, other: &ElementKey) -> bool {
        self.id.matches(&other.id)
            && self.datatype.is_assignable_from(other.datatype)
            && self.element_type.is_assignable_from(&other.element_type)
    }

    /// The same key with a different id.
    pub fn with_id(&self, id: QName) -> Self {
        Self::of(id, self.datatype, self.element_type.clone())
    }

    /// The same key with a different implementation type.
    pub fn with_element_type(&self, element_type: ElementType) -> Self {
        Self::of(self.id.clone(), self.datatype, element_type)
    }
}

impl PartialOrd for ElementKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ElementKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.datatype.cmp(&other.datatype))
            .then_with(|| self.element_type.cmp(&other.element_type))
    }
}

impl fmt::Debug for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}<{}, {}>",
            self.id, self.datatype, self.element_type
        )
    }
}

/// Either kind of key. Attribute keys always sort before element keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetadataKey {
    Attribute(AttributeKey),
    Element(ElementKey),
}

impl MetadataKey {
    pub fn id(&self) -> &QName {
        match self {
            MetadataKey::Attribute(key) => key.id(),
            MetadataKey::Element(key) => key.id(),
        }
    }

    pub fn datatype(&self) -> Datatype {
        match self {
            MetadataKey::Attribute(key) => key.datatype(),
            MetadataKey::Element(key) => key.datatype(),
        }
    }

    /// Keys of different kinds never match.
    pub fn matches(&self, other: &MetadataKey) -> bool {
        match (self, other) {
            (MetadataKey::Attribute(a), MetadataKey::Attribute(b)) => a.matches(b),
            (MetadataKey::Element(a), MetadataKey::Element(b)) => a.matches(b),
            _ => false,
        }
    }

    pub fn as_element(&self) -> Option<&ElementKey> {
        match self {
            MetadataKey::Element(key) => Some(key),
            MetadataKey::Attribute(_) => None,
        }
    }

    pub fn as_attribute(&self) -> Option<&AttributeKey> {
        match self {
            MetadataKey::Attribute(key) => Some(key),
            MetadataKey::Element(_) => None,
        }
    }
}

impl From<AttributeKey> for MetadataKey {
    fn from(key: AttributeKey) -> Self {
        MetadataKey::Attribute(key)
    }
}

impl From<ElementKey> for MetadataKey {
    fn from(key: ElementKey) -> Self {
        MetadataKey::Element(key)
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataKey::Attribute(key) => write!(f, "@{}", key.id()),
            MetadataKey::Element(key) => write!(f, "{}", key.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qname::Namespace;

    fn atom(local: &str) -> QName {
        QName::new(Namespace::new("atom", "http://www.w3.org/2005/Atom"), local)
    }

    #[test]
    fn test_element_type_hierarchy() {
        let base = ElementType::element();
        let entry = base.subtype("Entry");
        let event = entry.subtype("EventEntry");
        assert!(base.is_assignable_from(&event));
        assert!(entry.is_assignable_from(&event));
        assert!(!event.is_assignable_from(&entry));
        assert!(base < entry && entry < event);
    }

    #[test]
    fn test_key_matches_covariantly() {
        let entry_type = ElementType::element().subtype("Entry");
        let generic = ElementKey::of(QName::any(), Datatype::Any, ElementType::element());
        let entry = ElementKey::of(atom("entry"), Datatype::Void, entry_type);
        assert!(generic.matches(&entry));
        assert!(!entry.matches(&generic));
        assert_ne!(generic, entry);
    }

    #[test]
    fn test_attribute_key_matches_datatype() {
        let any = AttributeKey::of(QName::local("term"), Datatype::Any);
        let string = AttributeKey::string(QName::local("term"));
        assert!(any.matches(&string));
        assert!(!string.matches(&any));
    }

    #[test]
    fn test_kinds_never_match_and_sort_apart() {
        let attr: MetadataKey = AttributeKey::string(atom("z")).into();
        let elem: MetadataKey = ElementKey::string(atom("a")).into();
        assert!(!attr.matches(&elem));

        let mut keys = vec![
            elem.clone(),
            MetadataKey::from(AttributeKey::string(atom("b"))),
            attr.clone(),
            MetadataKey::from(ElementKey::string(atom("0"))),
        ];
        keys.sort();
        let again = {
            let mut copy = keys.clone();
            copy.sort();
            copy
        };
        assert_eq!(keys, again);
        assert!(keys[0].as_attribute().is_some());
        assert!(keys[1].as_attribute().is_some());
        assert!(keys[2].as_element().is_some());
        assert!(keys[3].as_element().is_some());
    }

    #[test]
    fn test_undeclared_markers() {
        assert!(ElementKey::undeclared_marker().is_undeclared_marker());
        assert!(AttributeKey::undeclared_marker().is_undeclared_marker());
        assert!(!ElementKey::string(QName::local(UNDECLARED_MARKER)).is_undeclared_marker());
    }
}
