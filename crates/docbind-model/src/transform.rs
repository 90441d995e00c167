//! Transforms: immutable, optional-field override layers of metadata.
//!
//! Every declaration made through a creator lands in one transform keyed by
//! a [`TransformKey`]. Binding metadata gathers the transforms whose keys
//! match the request, sorts them, and composes them: present fields of later
//! transforms overwrite earlier ones, and the attribute/element maps merge
//! key by key according to each entry's [`EntryAction`].

use crate::context::MetadataContext;
use crate::key::{AttributeKey, ElementKey, MetadataKey};
use crate::metadata::Cardinality;
use crate::path::Path;
use crate::qname::QName;
use crate::validation::ElementValidator;
use crate::virtual_value::{VirtualElement, VirtualValue};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Identity of one declaration layer: the element it applies under (if
/// any), the key it describes, and the context it applies in (if any).
///
/// Ordering puts unrestricted layers first so restricted ones override
/// them: parent (absent first), then key, then context (absent first).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransformKey {
    parent: Option<ElementKey>,
    key: MetadataKey,
    context: Option<MetadataContext>,
}

impl TransformKey {
    pub fn new(
        parent: Option<ElementKey>,
        key: impl Into<MetadataKey>,
        context: Option<MetadataContext>,
    ) -> Self {
        Self {
            parent,
            key: key.into(),
            context,
        }
    }

    pub fn parent(&self) -> Option<&ElementKey> {
        self.parent.as_ref()
    }

    pub fn key(&self) -> &MetadataKey {
        &self.key
    }

    pub fn context(&self) -> Option<&MetadataContext> {
        self.context.as_ref()
    }

    /// The unrestricted layer for the same key.
    pub fn base(&self) -> TransformKey {
        TransformKey::new(None, self.key.clone(), None)
    }

    /// True if this layer applies to a bind request for `request`.
    pub fn matches(&self, request: &TransformKey) -> bool {
        let parent_ok = match (&self.parent, &request.parent) {
            (None, _) => true,
            (Some(mine), Some(theirs)) => mine.matches(theirs),
            (Some(_), None) => false,
        };
        let context_ok = match &self.context {
            None => true,
            Some(mine) => mine.matches(request.context.as_ref()),
        };
        parent_ok && context_ok && self.key.matches(&request.key)
    }
}

/// How a map entry merges into the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryAction {
    /// Remove any earlier entry, then append.
    Add,
    /// Overwrite in place, keeping the earlier position.
    Replace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeEntry {
    pub key: AttributeKey,
    pub action: EntryAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementEntry {
    pub key: ElementKey,
    pub action: EntryAction,
}

/// Fields shared by attribute and element transforms.
#[derive(Clone, Default)]
pub struct Transform {
    pub(crate) name: Option<QName>,
    pub(crate) required: Option<bool>,
    pub(crate) visible: Option<bool>,
    pub(crate) virtual_value: Option<Arc<dyn VirtualValue>>,
    pub(crate) source: Option<TransformKey>,
    pub(crate) path: Option<Path>,
    pub(crate) moved: bool,
}

impl Transform {
    pub fn name(&self) -> Option<&QName> {
        self.name.as_ref()
    }

    pub fn required(&self) -> Option<bool> {
        self.required
    }

    pub fn visible(&self) -> Option<bool> {
        self.visible
    }

    pub fn source(&self) -> Option<&TransformKey> {
        self.source.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    pub fn is_moved(&self) -> bool {
        self.moved
    }

    pub fn has_virtual_value(&self) -> bool {
        self.virtual_value.is_some()
    }

    fn overlay(&mut self, layer: &Transform) {
        if layer.name.is_some() {
            self.name = layer.name.clone();
        }
        if layer.required.is_some() {
            self.required = layer.required;
        }
        if layer.visible.is_some() {
            self.visible = layer.visible;
        }
        if layer.virtual_value.is_some() {
            self.virtual_value = layer.virtual_value.clone();
        }
        if layer.source.is_some() {
            self.source = layer.source.clone();
        }
        if layer.path.is_some() {
            self.path = layer.path.clone();
        }
        self.moved |= layer.moved;
    }

    /// Merge in the transform this one was moved from. Requiredness is never
    /// inherited, and the result has no source of its own.
    fn with_source(&self, source: &Transform) -> Transform {
        Transform {
            name: self.name.clone().or_else(|| source.name.clone()),
            required: self.required,
            visible: self.visible.or(source.visible),
            virtual_value: self
                .virtual_value
                .clone()
                .or_else(|| source.virtual_value.clone()),
            source: None,
            path: self.path.clone(),
            moved: self.moved,
        }
    }

    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.required.is_none()
            && self.visible.is_none()
            && self.virtual_value.is_none()
            && self.source.is_none()
            && self.path.is_none()
            && !self.moved
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("visible", &self.visible)
            .field("virtual_value", &self.virtual_value.is_some())
            .field("source", &self.source)
            .field("path", &self.path)
            .field("moved", &self.moved)
            .finish()
    }
}

/// Override layer for an attribute.
#[derive(Clone, Debug, Default)]
pub struct AttributeTransform {
    pub(crate) base: Transform,
}

impl AttributeTransform {
    pub fn common(&self) -> &Transform {
        &self.base
    }

    /// Compose layers in order; later present fields win.
    pub fn compose<'a>(layers: impl IntoIterator<Item = &'a AttributeTransform>) -> Self {
        let mut composite = AttributeTransform::default();
        for layer in layers {
            composite.base.overlay(&layer.base);
        }
        composite
    }

    pub fn merge_source(&self, source: &AttributeTransform) -> Self {
        AttributeTransform {
            base: self.base.with_source(&source.base),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }
}

/// Override layer for an element.
#[derive(Clone, Default)]
pub struct ElementTransform {
    pub(crate) base: Transform,
    pub(crate) cardinality: Option<Cardinality>,
    pub(crate) content_required: Option<bool>,
    pub(crate) validator: Option<Arc<dyn ElementValidator>>,
    pub(crate) properties: Option<serde_json::Value>,
    pub(crate) virtual_element: Option<VirtualElement>,
    pub(crate) flattened: bool,
    pub(crate) attributes: IndexMap<QName, AttributeEntry>,
    pub(crate) elements: IndexMap<QName, ElementEntry>,
    pub(crate) adaptations: IndexMap<String, ElementKey>,
}

impl ElementTransform {
    pub fn common(&self) -> &Transform {
        &self.base
    }

    pub fn cardinality(&self) -> Option<Cardinality> {
        self.cardinality
    }

    pub fn content_required(&self) -> Option<bool> {
        self.content_required
    }

    pub fn is_flattened(&self) -> bool {
        self.flattened
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeKey> {
        self.attributes.values().map(|e| &e.key)
    }

    pub fn elements(&self) -> impl Iterator<Item = &ElementKey> {
        self.elements.values().map(|e| &e.key)
    }

    pub fn adaptations(&self) -> &IndexMap<String, ElementKey> {
        &self.adaptations
    }

    /// Compose layers declared for `key` in order.
    ///
    /// Adaptations survive only if their element type is a strict subtype
    /// of `key`'s element type.
    pub fn compose<'a>(
        key: &ElementKey,
        layers: impl IntoIterator<Item = &'a ElementTransform>,
    ) -> Self {
        let mut composite = ElementTransform::default();
        for layer in layers {
            composite.base.overlay(&layer.base);
            if layer.cardinality.is_some() {
                composite.cardinality = layer.cardinality;
            }
            if layer.content_required.is_some() {
                composite.content_required = layer.content_required;
            }
            if layer.validator.is_some() {
                composite.validator = layer.validator.clone();
            }
            if layer.properties.is_some() {
                composite.properties = layer.properties.clone();
            }
            if layer.virtual_element.is_some() {
                composite.virtual_element = layer.virtual_element.clone();
            }
            composite.flattened |= layer.flattened;

            for (id, entry) in &layer.attributes {
                if entry.action == EntryAction::Add {
                    composite.attributes.shift_remove(id);
                }
                composite.attributes.insert(id.clone(), entry.clone());
            }
            for (id, entry) in &layer.elements {
                if entry.action == EntryAction::Add {
                    composite.elements.shift_remove(id);
                }
                composite.elements.insert(id.clone(), entry.clone());
            }
            for (kind, adaptor) in &layer.adaptations {
                if is_valid_adaptation(key, adaptor) {
                    composite.adaptations.insert(kind.clone(), adaptor.clone());
                }
            }
        }
        composite
    }

    /// Merge in the transform this one was moved from.
    ///
    /// Entries declared on the source come first, followed by entries of
    /// `self` the source does not have.
    pub fn merge_source(&self, source: &ElementTransform) -> Self {
        let mut attributes = source.attributes.clone();
        for (id, entry) in &self.attributes {
            attributes.entry(id.clone()).or_insert_with(|| entry.clone());
        }
        let mut elements = source.elements.clone();
        for (id, entry) in &self.elements {
            elements.entry(id.clone()).or_insert_with(|| entry.clone());
        }
        let mut adaptations = source.adaptations.clone();
        for (kind, adaptor) in &self.adaptations {
            adaptations
                .entry(kind.clone())
                .or_insert_with(|| adaptor.clone());
        }
        ElementTransform {
            base: self.base.with_source(&source.base),
            cardinality: self.cardinality.or(source.cardinality),
            content_required: self.content_required,
            validator: self.validator.clone().or_else(|| source.validator.clone()),
            properties: self.properties.clone().or_else(|| source.properties.clone()),
            virtual_element: self
                .virtual_element
                .clone()
                .or_else(|| source.virtual_element.clone()),
            flattened: self.flattened || source.flattened,
            attributes,
            elements,
            adaptations,
        }
    }
}

fn is_valid_adaptation(key: &ElementKey, adaptor: &ElementKey) -> bool {
    key.element_type() != adaptor.element_type()
        && key.element_type().is_assignable_from(adaptor.element_type())
}

impl fmt::Debug for ElementTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementTransform")
            .field("base", &self.base)
            .field("cardinality", &self.cardinality)
            .field("content_required", &self.content_required)
            .field("validator", &self.validator)
            .field("properties", &self.properties)
            .field("virtual_element", &self.virtual_element)
            .field("flattened", &self.flattened)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("elements", &self.elements.keys().collect::<Vec<_>>())
            .field("adaptations", &self.adaptations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::Datatype;
    use crate::key::ElementType;

    fn attr(local: &str) -> AttributeKey {
        AttributeKey::string(QName::local(local))
    }

    fn with_attrs(entries: &[(&str, EntryAction)]) -> ElementTransform {
        let mut t = ElementTransform::default();
        for (local, action) in entries {
            t.attributes.insert(
                QName::local(local),
                AttributeEntry {
                    key: attr(local),
                    action: *action,
                },
            );
        }
        t
    }

    fn ids(t: &ElementTransform) -> Vec<String> {
        t.attributes().map(|k| k.id().to_string()).collect()
    }

    #[test]
    fn test_later_scalar_wins() {
        let mut t1 = AttributeTransform::default();
        t1.base.required = Some(true);
        t1.base.name = Some(QName::local("first"));
        let mut t2 = AttributeTransform::default();
        t2.base.required = Some(false);
        let composite = AttributeTransform::compose([&t1, &t2]);
        assert_eq!(composite.base.required, Some(false));
        assert_eq!(composite.base.name, Some(QName::local("first")));
    }

    #[test]
    fn test_add_repushes_to_tail() {
        let t1 = with_attrs(&[("a", EntryAction::Add), ("b", EntryAction::Add)]);
        let t2 = with_attrs(&[("c", EntryAction::Add), ("a", EntryAction::Add)]);
        let key = ElementKey::container(QName::local("e"));
        let composite = ElementTransform::compose(&key, [&t1, &t2]);
        assert_eq!(ids(&composite), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_replace_keeps_position() {
        let t1 = with_attrs(&[("a", EntryAction::Add), ("b", EntryAction::Add)]);
        let mut t2 = ElementTransform::default();
        t2.attributes.insert(
            QName::local("a"),
            AttributeEntry {
                key: AttributeKey::of(QName::local("a"), Datatype::Integer),
                action: EntryAction::Replace,
            },
        );
        let key = ElementKey::container(QName::local("e"));
        let composite = ElementTransform::compose(&key, [&t1, &t2]);
        assert_eq!(ids(&composite), vec!["a", "b"]);
        assert_eq!(
            composite.attributes[0].key.datatype(),
            Datatype::Integer
        );
    }

    #[test]
    fn test_invalid_adaptations_are_dropped() {
        let entry_type = ElementType::element().subtype("Entry");
        let event_type = entry_type.subtype("Event");
        let other_type = ElementType::element().subtype("Other");
        let key = ElementKey::of(QName::local("entry"), Datatype::Void, entry_type.clone());

        let mut t = ElementTransform::default();
        t.adaptations
            .insert("event".into(), key.with_element_type(event_type));
        t.adaptations.insert("same".into(), key.clone());
        t.adaptations
            .insert("other".into(), key.with_element_type(other_type));

        let composite = ElementTransform::compose(&key, [&t]);
        assert_eq!(
            composite.adaptations.keys().collect::<Vec<_>>(),
            vec!["event"]
        );
    }

    #[test]
    fn test_source_merge_drops_required_and_source() {
        let mut source = ElementTransform::default();
        source.base.required = Some(true);
        source.base.visible = Some(false);
        source.base.name = Some(QName::local("orig"));
        source.cardinality = Some(Cardinality::Multiple);

        let mut primary = ElementTransform::default();
        primary.base.source = Some(TransformKey::new(
            None,
            ElementKey::string(QName::local("orig")),
            None,
        ));

        let merged = primary.merge_source(&source);
        assert_eq!(merged.base.required, None);
        assert_eq!(merged.base.visible, Some(false));
        assert_eq!(merged.base.name, Some(QName::local("orig")));
        assert_eq!(merged.cardinality, Some(Cardinality::Multiple));
        assert!(merged.base.source.is_none());
    }

    #[test]
    fn test_transform_key_matching_and_order() {
        let entry = ElementKey::container(QName::local("entry"));
        let title = ElementKey::string(QName::local("title"));
        let rss = MetadataContext::for_alt_format(crate::context::AltFormat::rss());

        let base = TransformKey::new(None, title.clone(), None);
        let under_entry = TransformKey::new(Some(entry.clone()), title.clone(), None);
        let in_rss = TransformKey::new(None, title.clone(), Some(rss.clone()));
        let request = TransformKey::new(Some(entry.clone()), title.clone(), Some(rss.clone()));

        assert!(base.matches(&request));
        assert!(under_entry.matches(&request));
        assert!(in_rss.matches(&request));
        assert!(!under_entry.matches(&TransformKey::new(None, title.clone(), None)));
        assert!(!in_rss.matches(&base));

        let mut keys = vec![under_entry.clone(), in_rss.clone(), base.clone()];
        keys.sort();
        assert_eq!(keys, vec![base, in_rss, under_entry]);
    }
}
