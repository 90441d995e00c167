//! Bound metadata: the effective, immutable description of one attribute or
//! element in one (parent, key, context) position of a [`Schema`].
//!
//! Handles are cheap to clone. Two handles are equal when they share the
//! same bound data, which holds for repeated binds of the same position in
//! the same schema snapshot.

use crate::adaptation::AdaptationRegistry;
use crate::context::MetadataContext;
use crate::datatype::Value;
use crate::element::Element;
use crate::error::{ContentCreationError, ParseError};
use crate::key::{AttributeKey, ElementKey};
use crate::qname::{Namespace, QName};
use crate::schema::Schema;
use crate::validation::{ElementValidator, ValidationContext};
use crate::virtual_value::{MultipleVirtualElement, SingleVirtualElement, VirtualElement, VirtualValue};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// How many instances of a child may appear under one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    Single,
    /// Ordered, duplicates allowed.
    Multiple,
    /// De-duplicated by element equality.
    Set,
}

/// Fields common to attribute and element metadata.
pub(crate) struct CommonData {
    pub(crate) parent: Option<ElementKey>,
    pub(crate) context: Option<MetadataContext>,
    pub(crate) name: QName,
    pub(crate) required: bool,
    pub(crate) visible: bool,
    pub(crate) virtual_value: Option<Arc<dyn VirtualValue>>,
}

pub(crate) struct AttributeData {
    pub(crate) key: AttributeKey,
    pub(crate) common: CommonData,
}

pub(crate) struct ElementData {
    pub(crate) key: ElementKey,
    /// Key whose declarations children are bound under.
    pub(crate) source_key: ElementKey,
    pub(crate) common: CommonData,
    pub(crate) cardinality: Cardinality,
    pub(crate) content_required: bool,
    pub(crate) validator: Arc<dyn ElementValidator>,
    pub(crate) properties: Option<serde_json::Value>,
    pub(crate) virtual_element: Option<VirtualElement>,
    pub(crate) flattened: bool,
    pub(crate) attributes: IndexMap<QName, AttributeKey>,
    pub(crate) renamed_attributes: IndexMap<QName, AttributeKey>,
    pub(crate) elements: IndexMap<QName, ElementKey>,
    pub(crate) renamed_elements: IndexMap<QName, ElementKey>,
    pub(crate) adaptations: Option<AdaptationRegistry>,
}

/// Bound metadata of an attribute.
#[derive(Clone)]
pub struct AttributeMetadata {
    schema: Arc<Schema>,
    data: Arc<AttributeData>,
}

impl AttributeMetadata {
    pub(crate) fn new(schema: Arc<Schema>, data: Arc<AttributeData>) -> Self {
        Self { schema, data }
    }

    pub fn key(&self) -> &AttributeKey {
        &self.data.key
    }

    pub fn parent(&self) -> Option<&ElementKey> {
        self.data.common.parent.as_ref()
    }

    pub fn context(&self) -> Option<&MetadataContext> {
        self.data.common.context.as_ref()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The name used on the wire; the key id unless renamed.
    pub fn name(&self) -> &QName {
        &self.data.common.name
    }

    pub fn is_required(&self) -> bool {
        self.data.common.required
    }

    pub fn is_visible(&self) -> bool {
        self.data.common.visible
    }

    pub fn has_virtual_value(&self) -> bool {
        self.data.common.virtual_value.is_some()
    }

    /// The value of this attribute on `element`: generated by the virtual
    /// value if one is configured, the stored value otherwise.
    pub fn generate_value(&self, element: &Element, metadata: &ElementMetadata) -> Option<Value> {
        match &self.data.common.virtual_value {
            Some(virt) => virt.generate(element, metadata),
            None => element.attribute_value(self.key().id()),
        }
    }

    /// Store `value` as this attribute of `element`, converting it to the
    /// declared datatype.
    pub fn parse_value(
        &self,
        element: &Element,
        metadata: &ElementMetadata,
        value: Value,
    ) -> Result<(), ParseError> {
        if let Some(virt) = &self.data.common.virtual_value {
            return virt.parse(element, metadata, value);
        }
        let value = value.convert(self.key().datatype())?;
        element.set_attribute_value(self.key(), value)?;
        Ok(())
    }
}

impl PartialEq for AttributeMetadata {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for AttributeMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeMetadata")
            .field("key", &self.data.key)
            .field("parent", &self.data.common.parent)
            .field("context", &self.data.common.context)
            .finish()
    }
}

/// Bound metadata of an element.
#[derive(Clone)]
pub struct ElementMetadata {
    schema: Arc<Schema>,
    data: Arc<ElementData>,
}

impl ElementMetadata {
    pub(crate) fn new(schema: Arc<Schema>, data: Arc<ElementData>) -> Self {
        Self { schema, data }
    }

    pub fn key(&self) -> &ElementKey {
        &self.data.key
    }

    pub fn parent(&self) -> Option<&ElementKey> {
        self.data.common.parent.as_ref()
    }

    pub fn context(&self) -> Option<&MetadataContext> {
        self.data.common.context.as_ref()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn name(&self) -> &QName {
        &self.data.common.name
    }

    pub fn is_required(&self) -> bool {
        self.data.common.required
    }

    pub fn is_visible(&self) -> bool {
        self.data.common.visible
    }

    pub fn cardinality(&self) -> Cardinality {
        self.data.cardinality
    }

    pub fn is_content_required(&self) -> bool {
        self.data.content_required
    }

    pub fn is_flattened(&self) -> bool {
        self.data.flattened
    }

    pub fn properties(&self) -> Option<&serde_json::Value> {
        self.data.properties.as_ref()
    }

    pub fn validator(&self) -> &Arc<dyn ElementValidator> {
        &self.data.validator
    }

    /// Run the bound validator against `element`.
    pub fn validate(&self, vc: &mut ValidationContext, element: &Element) {
        self.data.validator.validate(vc, element, self);
    }

    /// Re-bind the same position under a different context.
    pub fn bind(&self, context: Option<&MetadataContext>) -> Option<ElementMetadata> {
        self.schema
            .bind_element(self.parent(), self.key(), context)
    }

    /// Declared attribute keys in declaration order, including any
    /// undeclared marker.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeKey> {
        self.data.attributes.values()
    }

    /// Declared child keys in declaration order, including any undeclared
    /// marker.
    pub fn elements(&self) -> impl Iterator<Item = &ElementKey> {
        self.data.elements.values()
    }

    pub fn bind_attribute(&self, key: &AttributeKey) -> Option<AttributeMetadata> {
        self.schema
            .bind_attribute(&self.data.source_key, key, self.context())
    }

    pub fn bind_element(&self, key: &ElementKey) -> Option<ElementMetadata> {
        self.schema
            .bind_element(Some(&self.data.source_key), key, self.context())
    }

    /// Resolve a wire name to a declared attribute key.
    ///
    /// Renamed declarations win, then an exact id, then wildcard
    /// declarations (which yield a key carrying `id`), then the adaptation
    /// union.
    pub fn find_attribute(&self, id: &QName) -> Option<AttributeKey> {
        if let Some(key) = self.data.renamed_attributes.get(id) {
            return Some(key.clone());
        }
        if let Some(key) = self.data.attributes.get(id) {
            return Some(key.clone());
        }
        if let Some(key) = self
            .data
            .attributes
            .values()
            .find(|k| k.id().is_wildcard() && k.id().matches(id))
        {
            return Some(key.with_id(id.clone()));
        }
        self.data
            .adaptations
            .as_ref()
            .and_then(|a| a.find_attribute(id))
    }

    /// Resolve a wire name to a declared child key. Same lookup order as
    /// [`find_attribute`](Self::find_attribute).
    pub fn find_element(&self, id: &QName) -> Option<ElementKey> {
        if let Some(key) = self.data.renamed_elements.get(id) {
            return Some(key.clone());
        }
        if let Some(key) = self.data.elements.get(id) {
            return Some(key.clone());
        }
        if let Some(key) = self
            .data
            .elements
            .values()
            .find(|k| k.id().is_wildcard() && k.id().matches(id))
        {
            return Some(key.with_id(id.clone()));
        }
        self.data
            .adaptations
            .as_ref()
            .and_then(|a| a.find_element(id))
    }

    pub fn is_declared_attribute(&self, id: &QName) -> bool {
        self.find_attribute(id).is_some()
    }

    pub fn is_declared_element(&self, id: &QName) -> bool {
        self.find_element(id).is_some()
    }

    pub(crate) fn declares_attribute_id(&self, id: &QName) -> bool {
        self.data.attributes.contains_key(id)
    }

    pub(crate) fn declares_element_id(&self, id: &QName) -> bool {
        self.data.elements.contains_key(id)
    }

    /// True if `id` has a place in the declared attribute order.
    pub(crate) fn orders_attribute(&self, id: &QName) -> bool {
        self.data.attributes.contains_key(id)
            || self
                .data
                .attributes
                .keys()
                .any(|k| k.is_wildcard() && k.matches(id))
    }

    /// True if `id` has a place in the declared child order.
    pub(crate) fn orders_element(&self, id: &QName) -> bool {
        self.data.elements.contains_key(id)
            || self
                .data
                .elements
                .keys()
                .any(|k| k.is_wildcard() && k.matches(id))
    }

    /// The adapted key registered for `kind`, if any.
    pub fn adapt(&self, kind: &str) -> Option<ElementKey> {
        self.data
            .adaptations
            .as_ref()
            .and_then(|a| a.adaptation(kind))
            .cloned()
    }

    pub fn adaptations(&self) -> Option<&AdaptationRegistry> {
        self.data.adaptations.as_ref()
    }

    pub fn has_virtual_value(&self) -> bool {
        self.data.common.virtual_value.is_some()
    }

    /// Generator for a single-valued virtual element; only available for
    /// `Single` cardinality.
    pub fn single_virtual_element(&self) -> Option<Arc<dyn SingleVirtualElement>> {
        if self.data.cardinality != Cardinality::Single {
            return None;
        }
        self.data.virtual_element.as_ref()?.as_single()
    }

    /// Generator for a repeating virtual element; only available for
    /// `Multiple` and `Set` cardinality.
    pub fn multiple_virtual_element(&self) -> Option<Arc<dyn MultipleVirtualElement>> {
        if self.data.cardinality == Cardinality::Single {
            return None;
        }
        self.data.virtual_element.as_ref()?.as_multiple()
    }

    /// The text value of `element`: generated by the virtual value if one
    /// is configured, the stored text otherwise.
    pub fn generate_value(&self, element: &Element, metadata: &ElementMetadata) -> Option<Value> {
        match &self.data.common.virtual_value {
            Some(virt) => virt.generate(element, metadata),
            None => element.text_value(),
        }
    }

    /// Store `value` as the text of `element`, converting it to the
    /// declared datatype.
    pub fn parse_value(
        &self,
        element: &Element,
        metadata: &ElementMetadata,
        value: Value,
    ) -> Result<(), ParseError> {
        if let Some(virt) = &self.data.common.virtual_value {
            return virt.parse(element, metadata, value);
        }
        let value = value.convert(self.key().datatype())?;
        element.set_text_value(value)?;
        Ok(())
    }

    /// Create an empty element bound to this metadata.
    pub fn create_element(&self) -> Result<Element, ContentCreationError> {
        let mut element = self.schema.create_element(self.key(), None)?;
        element.attach_metadata(self.clone());
        Ok(element)
    }

    /// Namespace of the element's wire name.
    pub fn default_namespace(&self) -> Option<&Namespace> {
        self.name().namespace()
    }

    /// Every namespace used by this element, its attributes and its
    /// declared descendants, in discovery order.
    pub fn referenced_namespaces(&self) -> Vec<Namespace> {
        let mut found = IndexSet::new();
        let mut visited = HashSet::new();
        self.collect_namespaces(&mut found, &mut visited);
        found.into_iter().collect()
    }

    fn collect_namespaces(&self, found: &mut IndexSet<Namespace>, visited: &mut HashSet<ElementKey>) {
        if !visited.insert(self.key().clone()) {
            return;
        }
        if let Some(ns) = self.name().namespace() {
            found.insert(ns.clone());
        }
        for key in self.attributes() {
            if key.is_undeclared_marker() {
                continue;
            }
            let name = self
                .bind_attribute(key)
                .map(|a| a.name().clone())
                .unwrap_or_else(|| key.id().clone());
            if let Some(ns) = name.namespace() {
                found.insert(ns.clone());
            }
        }
        for key in self.elements() {
            if key.is_undeclared_marker() {
                continue;
            }
            match self.bind_element(key) {
                Some(child) => child.collect_namespaces(found, visited),
                None => {
                    if let Some(ns) = key.id().namespace() {
                        found.insert(ns.clone());
                    }
                }
            }
        }
    }
}

impl PartialEq for ElementMetadata {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for ElementMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementMetadata")
            .field("key", &self.data.key)
            .field("parent", &self.data.common.parent)
            .field("context", &self.data.common.context)
            .field("cardinality", &self.data.cardinality)
            .finish()
    }
}
