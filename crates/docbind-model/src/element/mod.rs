//! Element trees.
//!
//! An [`Element`] is a view: a key and an optional metadata binding over
//! shared storage. Cloning an element, or adapting it to a narrower type,
//! yields another view over the same attributes, children and text, so
//! changes through one view are visible through all of them. Elements are
//! single-threaded (`!Send`); metadata is shared freely across threads.

mod iter;
mod resolve;
mod visit;

pub use visit::ElementVisitor;

use crate::attribute::Attribute;
use crate::context::MetadataContext;
use crate::datatype::Value;
use crate::error::{ElementError, ParseError};
use crate::factory::create_element;
use crate::key::{AttributeKey, ElementKey, ElementType};
use crate::metadata::{Cardinality, ElementMetadata};
use crate::qname::QName;
use crate::schema::Schema;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Children stored under one id.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Children {
    Single(Element),
    Multiple(Vec<Element>),
    Set(Vec<Element>),
}

impl Children {
    fn as_slice(&self) -> &[Element] {
        match self {
            Children::Single(e) => std::slice::from_ref(e),
            Children::Multiple(v) | Children::Set(v) => v,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [Element] {
        match self {
            Children::Single(e) => std::slice::from_mut(e),
            Children::Multiple(v) | Children::Set(v) => v,
        }
    }

    fn push(&mut self, child: Element, collection: Cardinality) {
        match self {
            Children::Multiple(v) => v.push(child),
            Children::Set(v) => {
                if !v.contains(&child) {
                    v.push(child);
                }
            }
            Children::Single(existing) => {
                let existing = existing.clone();
                *self = if collection == Cardinality::Set {
                    let mut set = vec![existing];
                    if !set.contains(&child) {
                        set.push(child);
                    }
                    Children::Set(set)
                } else {
                    Children::Multiple(vec![existing, child])
                };
            }
        }
    }

    /// Reshape to `cardinality`. Returns false if the entry is now empty
    /// and should be dropped.
    fn conform(&mut self, cardinality: Cardinality, id: &QName) -> Result<bool, ElementError> {
        match (cardinality, &*self) {
            (Cardinality::Single, Children::Multiple(v) | Children::Set(v)) => match v.len() {
                0 => return Ok(false),
                1 => *self = Children::Single(v[0].clone()),
                count => {
                    return Err(ElementError::CardinalityViolation {
                        id: id.clone(),
                        count,
                    });
                }
            },
            (Cardinality::Multiple, Children::Single(e)) => {
                *self = Children::Multiple(vec![e.clone()]);
            }
            (Cardinality::Multiple, Children::Set(v)) => *self = Children::Multiple(v.clone()),
            (Cardinality::Set, Children::Single(e)) => *self = Children::Set(vec![e.clone()]),
            (Cardinality::Set, Children::Multiple(v)) => {
                let mut set: Vec<Element> = Vec::with_capacity(v.len());
                for e in v {
                    if !set.contains(e) {
                        set.push(e.clone());
                    }
                }
                *self = Children::Set(set);
            }
            _ => {}
        }
        Ok(true)
    }
}

#[derive(Default)]
pub(crate) struct ElementState {
    attributes: IndexMap<QName, Attribute>,
    elements: IndexMap<QName, Children>,
    value: Option<Value>,
    locked: bool,
}

impl PartialEq for ElementState {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
            && self.attributes == other.attributes
            && self.elements == other.elements
    }
}

/// A node of a document tree.
#[derive(Clone)]
pub struct Element {
    key: ElementKey,
    metadata: Option<ElementMetadata>,
    state: Rc<RefCell<ElementState>>,
}

impl Element {
    /// An empty, unbound element.
    pub fn new(key: ElementKey) -> Self {
        Self {
            key,
            metadata: None,
            state: Rc::new(RefCell::new(ElementState::default())),
        }
    }

    /// A new view with `key` over `source`'s storage.
    pub fn share(key: ElementKey, source: &Element) -> Self {
        Self {
            key,
            metadata: None,
            state: source.state.clone(),
        }
    }

    pub fn key(&self) -> &ElementKey {
        &self.key
    }

    pub fn id(&self) -> &QName {
        self.key.id()
    }

    pub fn element_type(&self) -> &ElementType {
        self.key.element_type()
    }

    pub fn metadata(&self) -> Option<&ElementMetadata> {
        self.metadata.as_ref()
    }

    pub fn context(&self) -> Option<&MetadataContext> {
        self.metadata.as_ref().and_then(|m| m.context())
    }

    /// True if both views share storage.
    pub fn same_storage(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    fn same_view(&self, other: &Element) -> bool {
        self.same_storage(other) && self.key == other.key
    }

    fn schema(&self) -> Option<&Schema> {
        self.metadata.as_ref().map(|m| m.schema().as_ref())
    }

    pub(crate) fn attach_metadata(&mut self, metadata: ElementMetadata) {
        self.metadata = Some(metadata);
    }

    /// Bind this element to `metadata`, re-binding every attribute and
    /// child. Child collections are reshaped to their new cardinality; a
    /// collection that must become single-valued while holding two or more
    /// children is an error.
    pub fn set_metadata(&mut self, metadata: Option<ElementMetadata>) -> Result<(), ElementError> {
        {
            let mut state = self.state.borrow_mut();
            for attribute in state.attributes.values_mut() {
                let bound = metadata
                    .as_ref()
                    .and_then(|m| m.bind_attribute(attribute.key()));
                attribute.bind(bound);
            }
            let ids: Vec<QName> = state.elements.keys().cloned().collect();
            for id in ids {
                let Some(slot) = state.elements.get_mut(&id) else {
                    continue;
                };
                let mut cardinality = None;
                for child in slot.as_mut_slice() {
                    let child_metadata = metadata.as_ref().and_then(|m| m.bind_element(child.key()));
                    if cardinality.is_none() {
                        cardinality = child_metadata.as_ref().map(ElementMetadata::cardinality);
                    }
                    child.set_metadata(child_metadata)?;
                }
                if let Some(cardinality) = cardinality
                    && !slot.conform(cardinality, &id)?
                {
                    state.elements.shift_remove(&id);
                }
            }
        }
        self.metadata = metadata;
        Ok(())
    }

    /// Re-bind this element's metadata position under `context`.
    pub fn bind_context(&mut self, context: Option<&MetadataContext>) -> Result<(), ElementError> {
        let metadata = self.metadata.as_ref().and_then(|m| m.bind(context));
        self.set_metadata(metadata)
    }

    /// Freeze this element and all of its descendants.
    pub fn lock(&self) {
        let children: Vec<Element> = {
            let mut state = self.state.borrow_mut();
            state.locked = true;
            state
                .elements
                .values()
                .flat_map(|c| c.as_slice().iter().cloned())
                .collect()
        };
        for child in children {
            child.lock();
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.borrow().locked
    }

    fn check_unlocked(&self) -> Result<(), ElementError> {
        if self.state.borrow().locked {
            return Err(ElementError::Locked(self.id().clone()));
        }
        Ok(())
    }

    pub fn text_value(&self) -> Option<Value> {
        self.state.borrow().value.clone()
    }

    pub fn has_text_value(&self) -> bool {
        self.state.borrow().value.is_some()
    }

    /// Set the text. Void elements take no text, and the value must be an
    /// instance of the key's datatype.
    pub fn set_text_value(&self, value: impl Into<Value>) -> Result<(), ElementError> {
        self.check_unlocked()?;
        let value = value.into();
        let datatype = self.key.datatype();
        if datatype == crate::datatype::Datatype::Void {
            return Err(ElementError::ContentNotAllowed(self.id().clone()));
        }
        if !datatype.accepts(&value) {
            return Err(ElementError::InvalidValue {
                id: self.id().clone(),
                expected: datatype,
                got: value.datatype(),
            });
        }
        self.state.borrow_mut().value = Some(value);
        Ok(())
    }

    pub fn clear_text_value(&self) -> Result<(), ElementError> {
        self.check_unlocked()?;
        self.state.borrow_mut().value = None;
        Ok(())
    }

    pub fn attribute_count(&self) -> usize {
        self.state.borrow().attributes.len()
    }

    pub fn has_attribute(&self, id: &QName) -> bool {
        self.state.borrow().attributes.contains_key(id)
    }

    pub fn attribute(&self, id: &QName) -> Option<Attribute> {
        self.state.borrow().attributes.get(id).cloned()
    }

    pub fn attribute_value(&self, id: &QName) -> Option<Value> {
        self.state
            .borrow()
            .attributes
            .get(id)
            .map(|a| a.value().clone())
    }

    /// The stored value of `key`, converted to its datatype.
    pub fn typed_attribute_value(&self, key: &AttributeKey) -> Result<Option<Value>, ParseError> {
        self.attribute_value(key.id())
            .map(|v| v.convert(key.datatype()))
            .transpose()
    }

    /// Store an attribute, binding it to this element's metadata.
    pub fn set_attribute_value(
        &self,
        key: &AttributeKey,
        value: impl Into<Value>,
    ) -> Result<(), ElementError> {
        let attribute = Attribute::new(key.clone(), value)?;
        self.add_attribute(attribute)
    }

    /// Store an attribute the schema does not declare.
    pub fn set_undeclared_attribute(
        &self,
        id: QName,
        value: impl Into<String>,
    ) -> Result<(), ElementError> {
        self.set_attribute_value(&AttributeKey::string(id), value.into())
    }

    pub fn add_attribute(&self, attribute: Attribute) -> Result<(), ElementError> {
        self.check_unlocked()?;
        let bound = self
            .metadata
            .as_ref()
            .and_then(|m| m.bind_attribute(attribute.key()));
        let attribute = attribute.bound(bound);
        self.state
            .borrow_mut()
            .attributes
            .insert(attribute.id().clone(), attribute);
        Ok(())
    }

    pub fn remove_attribute(&self, id: &QName) -> Result<Option<Attribute>, ElementError> {
        self.check_unlocked()?;
        Ok(self.state.borrow_mut().attributes.shift_remove(id))
    }

    /// Total number of child elements.
    pub fn element_count(&self) -> usize {
        self.state
            .borrow()
            .elements
            .values()
            .map(|c| c.as_slice().len())
            .sum()
    }

    pub fn has_element(&self, id: &QName) -> bool {
        self.state.borrow().elements.contains_key(id)
    }

    /// The single child stored under `id`. Fails if the child is stored as
    /// a collection.
    pub fn element(&self, id: &QName) -> Result<Option<Element>, ElementError> {
        match self.state.borrow().elements.get(id) {
            None => Ok(None),
            Some(Children::Single(e)) => Ok(Some(e.clone())),
            Some(_) => Err(ElementError::Repeating(id.clone())),
        }
    }

    /// The single child for `key`, adapted to the key's type if needed.
    pub fn element_by_key(&self, key: &ElementKey) -> Result<Option<Element>, ElementError> {
        let Some(child) = self.element(key.id())? else {
            return Ok(None);
        };
        if key.element_type().is_assignable_from(child.element_type()) {
            return Ok(Some(child));
        }
        child.adapt(&key.with_id(child.id().clone())).map(Some)
    }

    /// Every child stored under `id`. A `ns:*` id collects every child in
    /// that namespace.
    pub fn elements(&self, id: &QName) -> Vec<Element> {
        let state = self.state.borrow();
        if id.is_wildcard() {
            return state
                .elements
                .iter()
                .filter(|(child_id, _)| id.matches(child_id))
                .flat_map(|(_, c)| c.as_slice().iter().cloned())
                .collect();
        }
        state
            .elements
            .get(id)
            .map(|c| c.as_slice().to_vec())
            .unwrap_or_default()
    }

    /// Children under `key`'s id whose type is `key`'s type or a subtype.
    pub fn elements_by_key(&self, key: &ElementKey) -> Vec<Element> {
        self.elements(key.id())
            .into_iter()
            .filter(|e| key.element_type().is_assignable_from(e.element_type()))
            .collect()
    }

    /// Add a child under its own key.
    pub fn add_element(&self, child: Element) -> Result<(), ElementError> {
        let key = child.key().clone();
        self.add_element_as(&key, child)
    }

    /// Add a child under `key`.
    ///
    /// The child is re-keyed if needed (keeping a more specific type it
    /// already has) and bound to this element's metadata. A child declared
    /// single-valued replaces any previous one; repeating children are
    /// appended. Undeclared children become a list once a second one
    /// arrives.
    pub fn add_element_as(&self, key: &ElementKey, child: Element) -> Result<(), ElementError> {
        self.check_unlocked()?;
        let key = if key.element_type() != child.element_type()
            && key.element_type().is_assignable_from(child.element_type())
        {
            key.with_element_type(child.element_type().clone())
        } else {
            key.clone()
        };
        let mut child = if child.key() == &key {
            child
        } else {
            create_element(&key, Some(&child), self.schema())?
        };
        let child_metadata = self.metadata.as_ref().and_then(|m| m.bind_element(&key));
        let cardinality = child_metadata.as_ref().map(ElementMetadata::cardinality);
        if child.metadata != child_metadata {
            child.set_metadata(child_metadata)?;
        }

        let mut state = self.state.borrow_mut();
        let id = key.id().clone();
        if cardinality == Some(Cardinality::Single) {
            state.elements.insert(id, Children::Single(child));
            return Ok(());
        }
        let collection = cardinality.unwrap_or(Cardinality::Multiple);
        match state.elements.get_mut(&id) {
            Some(slot) => slot.push(child, collection),
            None => {
                let slot = match cardinality {
                    None => Children::Single(child),
                    Some(Cardinality::Set) => Children::Set(vec![child]),
                    Some(_) => Children::Multiple(vec![child]),
                };
                state.elements.insert(id, slot);
            }
        }
        Ok(())
    }

    /// Replace every child under `key`'s id with `child`, or remove them.
    pub fn set_element(&self, key: &ElementKey, child: Option<Element>) -> Result<(), ElementError> {
        self.remove_element(key.id())?;
        match child {
            Some(child) => self.add_element_as(key, child),
            None => Ok(()),
        }
    }

    /// Remove every child under `id`. Returns true if any was removed.
    pub fn remove_element(&self, id: &QName) -> Result<bool, ElementError> {
        self.check_unlocked()?;
        Ok(self.state.borrow_mut().elements.shift_remove(id).is_some())
    }

    /// Remove one child, matched by identity rather than equality.
    pub fn remove_element_instance(&self, child: &Element) -> Result<bool, ElementError> {
        self.check_unlocked()?;
        let mut state = self.state.borrow_mut();
        let id = child.id();
        let Some(slot) = state.elements.get_mut(id) else {
            return Ok(false);
        };
        let (removed, now_empty) = match slot {
            Children::Single(e) => (e.same_storage(child), true),
            Children::Multiple(v) | Children::Set(v) => {
                let before = v.len();
                v.retain(|e| !e.same_storage(child));
                (v.len() != before, v.is_empty())
            }
        };
        if removed && now_empty {
            state.elements.shift_remove(id);
        }
        Ok(removed)
    }

    /// Replace `old` (matched by identity) with `new` in the same position.
    pub fn replace_element(&self, old: &Element, new: Element) -> Result<bool, ElementError> {
        self.check_unlocked()?;
        let mut state = self.state.borrow_mut();
        let Some(slot) = state.elements.get_mut(old.id()) else {
            return Ok(false);
        };
        for existing in slot.as_mut_slice() {
            if existing.same_storage(old) {
                *existing = new;
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn clear_elements(&self) -> Result<(), ElementError> {
        self.check_unlocked()?;
        self.state.borrow_mut().elements.clear();
        Ok(())
    }

    /// A view of this element as `key`'s type, sharing storage.
    pub fn adapt(&self, key: &ElementKey) -> Result<Element, ElementError> {
        if key == self.key() {
            return Ok(self.clone());
        }
        if !self.element_type().is_assignable_from(key.element_type()) {
            return Err(ElementError::IncompatibleAdaptation {
                id: self.id().clone(),
                from: self.element_type().clone(),
                to: key.element_type().clone(),
            });
        }
        let mut adapted = create_element(key, Some(self), self.schema())?;
        let metadata = self
            .metadata
            .as_ref()
            .and_then(|m| m.schema().bind_element(m.parent(), key, m.context()));
        if let Some(metadata) = metadata {
            adapted.attach_metadata(metadata);
        }
        Ok(adapted)
    }

    /// Adapt to the subtype registered for `kind`, if any.
    pub fn adapt_kind(&self, kind: &str) -> Result<Option<Element>, ElementError> {
        let Some(key) = self.metadata.as_ref().and_then(|m| m.adapt(kind)) else {
            return Ok(None);
        };
        self.adapt(&key.with_id(self.id().clone())).map(Some)
    }
}

/// Structural equality of content; metadata bindings are ignored.
impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        if self.id() != other.id() {
            return false;
        }
        if self.same_storage(other) {
            return true;
        }
        *self.state.borrow() == *other.state.borrow()
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Element");
        d.field("key", &self.key);
        match self.state.try_borrow() {
            Ok(state) => {
                let attributes: Vec<(String, &Value)> = state
                    .attributes
                    .values()
                    .map(|a| (a.id().to_string(), a.value()))
                    .collect();
                d.field("value", &state.value)
                    .field("attributes", &attributes)
                    .field("elements", &state.elements);
            }
            Err(_) => {
                d.field("state", &"<borrowed>");
            }
        }
        d.finish()
    }
}
