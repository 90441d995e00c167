//! Immutable schema snapshots.
//!
//! A [`Schema`] is a frozen copy of every declaration in a
//! [`MetadataRegistry`](crate::registry::MetadataRegistry) at the moment it
//! was built. Binding composes the applicable transforms for a
//! (parent, key, context) request and memoizes the result, so repeated binds
//! return the same metadata handle.

use crate::adaptation::AdaptationRegistry;
use crate::context::MetadataContext;
use crate::datatype::Datatype;
use crate::element::Element;
use crate::error::ContentCreationError;
use crate::factory::ElementFactory;
use crate::key::{AttributeKey, ElementKey, ElementType, MetadataKey};
use crate::metadata::{
    AttributeData, AttributeMetadata, CommonData, ElementData, ElementMetadata,
};
use crate::path::Path;
use crate::transform::{AttributeTransform, ElementTransform, Transform, TransformKey};
use crate::validation::MetadataValidator;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

pub struct Schema {
    attributes: BTreeMap<TransformKey, AttributeTransform>,
    elements: BTreeMap<TransformKey, ElementTransform>,
    factories: HashMap<ElementType, ElementFactory>,
    attribute_cache: RwLock<HashMap<TransformKey, Option<Arc<AttributeData>>>>,
    element_cache: RwLock<HashMap<TransformKey, Option<Arc<ElementData>>>>,
}

impl Schema {
    pub(crate) fn new(
        attributes: BTreeMap<TransformKey, AttributeTransform>,
        elements: BTreeMap<TransformKey, ElementTransform>,
        factories: HashMap<ElementType, ElementFactory>,
    ) -> Self {
        Self {
            attributes,
            elements,
            factories,
            attribute_cache: RwLock::new(HashMap::new()),
            element_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Number of element declaration layers.
    pub fn element_layer_count(&self) -> usize {
        self.elements.len()
    }

    /// Number of attribute declaration layers.
    pub fn attribute_layer_count(&self) -> usize {
        self.attributes.len()
    }

    /// True if any layer declares exactly `key` without parent or context.
    pub fn is_registered(&self, key: &ElementKey) -> bool {
        self.elements
            .contains_key(&TransformKey::new(None, key.clone(), None))
    }

    /// Compose every element layer that applies to the request, merging in
    /// the source layer of a moved declaration. `None` if nothing applies.
    pub fn element_transform(
        &self,
        parent: Option<&ElementKey>,
        key: &ElementKey,
        context: Option<&MetadataContext>,
    ) -> Option<ElementTransform> {
        self.element_transform_from(parent, key, context, &mut HashSet::new())
    }

    /// A source chain that leads back to a request already on `seen` stops
    /// there, and the repeated request contributes nothing.
    fn element_transform_from(
        &self,
        parent: Option<&ElementKey>,
        key: &ElementKey,
        context: Option<&MetadataContext>,
        seen: &mut HashSet<TransformKey>,
    ) -> Option<ElementTransform> {
        let request = TransformKey::new(parent.cloned(), key.clone(), context.cloned());
        if !seen.insert(request.clone()) {
            trace!(key = ?key, "move source cycle");
            return None;
        }
        let layers: Vec<&ElementTransform> = self
            .elements
            .iter()
            .filter(|(tk, _)| tk.matches(&request))
            .map(|(_, t)| t)
            .collect();
        if layers.is_empty() {
            return None;
        }
        let composite = ElementTransform::compose(key, layers);
        let Some(source) = composite.base.source.clone() else {
            return Some(composite);
        };
        let source_transform = source
            .key()
            .as_element()
            .and_then(|src| self.element_transform_from(source.parent(), src, context, seen));
        Some(match source_transform {
            Some(src) => composite.merge_source(&src),
            None => composite,
        })
    }

    /// Compose every attribute layer that applies to the request.
    pub fn attribute_transform(
        &self,
        parent: &ElementKey,
        key: &AttributeKey,
        context: Option<&MetadataContext>,
    ) -> Option<AttributeTransform> {
        self.attribute_transform_from(parent, key, context, &mut HashSet::new())
    }

    fn attribute_transform_from(
        &self,
        parent: &ElementKey,
        key: &AttributeKey,
        context: Option<&MetadataContext>,
        seen: &mut HashSet<TransformKey>,
    ) -> Option<AttributeTransform> {
        let request = TransformKey::new(Some(parent.clone()), key.clone(), context.cloned());
        if !seen.insert(request.clone()) {
            trace!(key = ?key, "move source cycle");
            return None;
        }
        let layers: Vec<&AttributeTransform> = self
            .attributes
            .iter()
            .filter(|(tk, _)| tk.matches(&request))
            .map(|(_, t)| t)
            .collect();
        if layers.is_empty() {
            return None;
        }
        let composite = AttributeTransform::compose(layers);
        let Some(source) = composite.base.source.clone() else {
            return Some(composite);
        };
        let source_transform = match (source.key(), source.parent()) {
            (MetadataKey::Attribute(src), Some(src_parent)) => {
                self.attribute_transform_from(src_parent, src, context, seen)
            }
            _ => None,
        };
        Some(match source_transform {
            Some(src) => composite.merge_source(&src),
            None => composite,
        })
    }

    /// Transform layer of any kind, used while walking paths.
    fn common_transform(
        &self,
        parent: &ElementKey,
        key: &MetadataKey,
        context: Option<&MetadataContext>,
    ) -> Option<Transform> {
        match key {
            MetadataKey::Attribute(key) => self
                .attribute_transform(parent, key, context)
                .map(|t| t.base),
            MetadataKey::Element(key) => self
                .element_transform(Some(parent), key, context)
                .map(|t| t.base),
        }
    }

    /// Bind the metadata of `key` under `parent` in `context`.
    pub fn bind_element(
        self: &Arc<Self>,
        parent: Option<&ElementKey>,
        key: &ElementKey,
        context: Option<&MetadataContext>,
    ) -> Option<ElementMetadata> {
        let request = TransformKey::new(parent.cloned(), key.clone(), context.cloned());
        if let Some(cached) = self.element_cache.read().get(&request) {
            return cached
                .clone()
                .map(|data| ElementMetadata::new(self.clone(), data));
        }
        trace!(key = ?key, parent = ?parent, "binding element metadata");
        let data = self
            .build_element_data(parent, key, context)
            .map(Arc::new);
        let data = self
            .element_cache
            .write()
            .entry(request)
            .or_insert(data)
            .clone();
        data.map(|data| ElementMetadata::new(self.clone(), data))
    }

    /// Bind the metadata of attribute `key` on `parent` in `context`.
    pub fn bind_attribute(
        self: &Arc<Self>,
        parent: &ElementKey,
        key: &AttributeKey,
        context: Option<&MetadataContext>,
    ) -> Option<AttributeMetadata> {
        let request = TransformKey::new(Some(parent.clone()), key.clone(), context.cloned());
        if let Some(cached) = self.attribute_cache.read().get(&request) {
            return cached
                .clone()
                .map(|data| AttributeMetadata::new(self.clone(), data));
        }
        trace!(key = ?key, parent = ?parent, "binding attribute metadata");
        let data = self
            .attribute_transform(parent, key, context)
            .map(|transform| {
                Arc::new(AttributeData {
                    key: key.clone(),
                    common: self.common_data(Some(parent), key.id(), &transform.base, context),
                })
            });
        let data = self
            .attribute_cache
            .write()
            .entry(request)
            .or_insert(data)
            .clone();
        data.map(|data| AttributeMetadata::new(self.clone(), data))
    }

    fn build_element_data(
        &self,
        parent: Option<&ElementKey>,
        key: &ElementKey,
        context: Option<&MetadataContext>,
    ) -> Option<ElementData> {
        let transform = self.element_transform(parent, key, context)?;
        let source_key = transform
            .base
            .source
            .as_ref()
            .and_then(|s| s.key().as_element().cloned())
            .unwrap_or_else(|| key.clone());

        let attributes: IndexMap<_, _> = transform
            .attributes
            .iter()
            .map(|(id, entry)| (id.clone(), entry.key.clone()))
            .collect();
        let elements: IndexMap<_, _> = transform
            .elements
            .iter()
            .map(|(id, entry)| (id.clone(), entry.key.clone()))
            .collect();

        let mut renamed_attributes = IndexMap::new();
        for attribute in attributes.values() {
            if let Some(name) = self
                .attribute_transform(&source_key, attribute, context)
                .and_then(|t| t.base.name)
                && &name != attribute.id()
            {
                renamed_attributes.insert(name, attribute.clone());
            }
        }
        let mut renamed_elements = IndexMap::new();
        for element in elements.values() {
            if let Some(name) = self
                .element_transform(Some(&source_key), element, context)
                .and_then(|t| t.base.name)
                && &name != element.id()
            {
                renamed_elements.insert(name, element.clone());
            }
        }

        let adaptations = (!transform.adaptations.is_empty())
            .then(|| AdaptationRegistry::build(self, key, &transform, context));

        Some(ElementData {
            key: key.clone(),
            source_key,
            common: self.common_data(parent, key.id(), &transform.base, context),
            cardinality: transform.cardinality.unwrap_or_default(),
            content_required: transform
                .content_required
                .unwrap_or(key.datatype() != Datatype::Void),
            validator: transform
                .validator
                .clone()
                .unwrap_or_else(|| Arc::new(MetadataValidator)),
            properties: transform.properties.clone(),
            virtual_element: transform.virtual_element.clone(),
            flattened: transform.flattened,
            attributes,
            renamed_attributes,
            elements,
            renamed_elements,
            adaptations,
        })
    }

    fn common_data(
        &self,
        parent: Option<&ElementKey>,
        id: &crate::qname::QName,
        transform: &Transform,
        context: Option<&MetadataContext>,
    ) -> CommonData {
        let mut visible = transform.visible.unwrap_or(true) && !transform.moved;
        if visible
            && let (Some(path), Some(parent)) = (&transform.path, parent)
        {
            visible = self.path_visible(parent, path, context);
        }
        CommonData {
            parent: parent.cloned(),
            context: context.cloned(),
            name: transform.name.clone().unwrap_or_else(|| id.clone()),
            required: transform.required.unwrap_or(false),
            visible,
            virtual_value: transform.virtual_value.clone(),
        }
    }

    /// False if any step of `path`, walked from `owner`, is explicitly
    /// hidden.
    fn path_visible(
        &self,
        owner: &ElementKey,
        path: &Path,
        context: Option<&MetadataContext>,
    ) -> bool {
        let mut parent = owner.clone();
        for step in path.steps() {
            let hidden = self
                .common_transform(&parent, step, context)
                .is_some_and(|t| t.visible == Some(false));
            if hidden {
                return false;
            }
            if let MetadataKey::Element(key) = step {
                parent = key.clone();
            }
        }
        true
    }

    pub(crate) fn factory(&self, element_type: &ElementType) -> Option<&ElementFactory> {
        self.factories.get(element_type)
    }

    /// Construct an element for `key`, sharing `source`'s storage if given.
    pub fn create_element(
        &self,
        key: &ElementKey,
        source: Option<&Element>,
    ) -> Result<Element, ContentCreationError> {
        crate::factory::create_element(key, source, Some(self))
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("elements", &self.elements.keys().collect::<Vec<_>>())
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .finish()
    }
}
