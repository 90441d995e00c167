//! Creators: the builder API for declaring metadata.
//!
//! A creator is a handle on one declaration layer of a
//! [`MetadataRegistry`]. Every setter takes the registry lock, edits the
//! layer and invalidates the published snapshot, so creators can be used
//! from any thread and the next bind sees the change. Setters return the
//! creator so calls chain.

use crate::context::MetadataContext;
use crate::error::SchemaError;
use crate::key::{AttributeKey, ElementKey, MetadataKey};
use crate::metadata::Cardinality;
use crate::path::Path;
use crate::path_adapter::{ElementAdapter, ValueAdapter};
use crate::qname::QName;
use crate::registry::MetadataRegistry;
use crate::transform::{AttributeEntry, ElementEntry, EntryAction, TransformKey};
use crate::validation::ElementValidator;
use crate::virtual_value::{
    MultipleVirtualElement, SingleVirtualElement, VirtualElement, VirtualValue,
};
use indexmap::IndexSet;
use std::sync::Arc;

/// Declares the metadata of one attribute.
#[derive(Clone, Debug)]
pub struct AttributeCreator {
    registry: MetadataRegistry,
    tk: TransformKey,
}

impl AttributeCreator {
    pub(crate) fn new(registry: MetadataRegistry, tk: TransformKey) -> Self {
        Self { registry, tk }
    }

    pub fn transform_key(&self) -> &TransformKey {
        &self.tk
    }

    fn update(&self, f: impl FnOnce(&mut crate::transform::Transform)) -> &Self {
        self.registry
            .declare(|state| f(&mut state.attribute_layer(&self.tk).base));
        self
    }

    /// Name used on the wire, if it differs from the id.
    pub fn set_name(&self, name: QName) -> &Self {
        self.update(|t| t.name = Some(name))
    }

    pub fn set_required(&self, required: bool) -> &Self {
        self.update(|t| t.required = Some(required))
    }

    pub fn set_visible(&self, visible: bool) -> &Self {
        self.update(|t| t.visible = Some(visible))
    }

    pub fn set_virtual_value(&self, virtual_value: Arc<dyn VirtualValue>) -> &Self {
        self.update(|t| t.virtual_value = Some(virtual_value))
    }
}

/// Declares the metadata of one element.
#[derive(Clone, Debug)]
pub struct ElementCreator {
    registry: MetadataRegistry,
    tk: TransformKey,
    key: ElementKey,
}

impl ElementCreator {
    pub(crate) fn new(registry: MetadataRegistry, tk: TransformKey, key: ElementKey) -> Self {
        Self { registry, tk, key }
    }

    pub fn key(&self) -> &ElementKey {
        &self.key
    }

    pub fn transform_key(&self) -> &TransformKey {
        &self.tk
    }

    fn context(&self) -> Option<MetadataContext> {
        self.tk.context().cloned()
    }

    fn update(&self, f: impl FnOnce(&mut crate::transform::ElementTransform)) -> &Self {
        self.registry
            .declare(|state| f(&mut state.element_layer(&self.tk).transform));
        self
    }

    pub fn set_name(&self, name: QName) -> &Self {
        self.update(|t| t.base.name = Some(name))
    }

    pub fn set_required(&self, required: bool) -> &Self {
        self.update(|t| t.base.required = Some(required))
    }

    pub fn set_visible(&self, visible: bool) -> &Self {
        self.update(|t| t.base.visible = Some(visible))
    }

    /// Virtual text content.
    pub fn set_virtual_value(&self, virtual_value: Arc<dyn VirtualValue>) -> &Self {
        self.update(|t| t.base.virtual_value = Some(virtual_value))
    }

    pub fn set_cardinality(&self, cardinality: Cardinality) -> &Self {
        self.update(|t| t.cardinality = Some(cardinality))
    }

    pub fn set_content_required(&self, content_required: bool) -> &Self {
        self.update(|t| t.content_required = Some(content_required))
    }

    pub fn set_validator(&self, validator: Arc<dyn ElementValidator>) -> &Self {
        self.update(|t| t.validator = Some(validator))
    }

    pub fn set_properties(&self, properties: serde_json::Value) -> &Self {
        self.update(|t| t.properties = Some(properties))
    }

    pub fn set_single_virtual_element(&self, virtual_element: Arc<dyn SingleVirtualElement>) -> &Self {
        self.update(|t| t.virtual_element = Some(VirtualElement::Single(virtual_element)))
    }

    pub fn set_multiple_virtual_element(
        &self,
        virtual_element: Arc<dyn MultipleVirtualElement>,
    ) -> &Self {
        self.update(|t| t.virtual_element = Some(VirtualElement::Multiple(virtual_element)))
    }

    /// Serialize this element's children in place of the element itself.
    pub fn flatten(&self) -> &Self {
        self.update(|t| t.flattened = true)
    }

    fn attribute_tk(&self, key: &AttributeKey) -> TransformKey {
        TransformKey::new(Some(self.key.clone()), key.clone(), self.context())
    }

    fn element_tk(&self, key: &ElementKey) -> TransformKey {
        TransformKey::new(Some(self.key.clone()), key.clone(), self.context())
    }

    fn put_attribute(&self, key: &AttributeKey, action: EntryAction) -> AttributeCreator {
        let tk = self.attribute_tk(key);
        self.registry.declare(|state| {
            let attributes = &mut state.element_layer(&self.tk).transform.attributes;
            if action == EntryAction::Add {
                attributes.shift_remove(key.id());
            }
            attributes.insert(
                key.id().clone(),
                AttributeEntry {
                    key: key.clone(),
                    action,
                },
            );
            state.attribute_layer(&tk);
        });
        AttributeCreator::new(self.registry.clone(), tk)
    }

    fn put_element(&self, key: &ElementKey, action: EntryAction) -> ElementCreator {
        let tk = self.element_tk(key);
        self.registry.declare(|state| {
            let elements = &mut state.element_layer(&self.tk).transform.elements;
            if action == EntryAction::Add {
                elements.shift_remove(key.id());
            }
            elements.insert(
                key.id().clone(),
                ElementEntry {
                    key: key.clone(),
                    action,
                },
            );
            if !key.is_undeclared_marker() {
                state.element_layer(&tk.base());
                state.element_layer(&tk);
            }
        });
        ElementCreator::new(self.registry.clone(), tk, key.clone())
    }

    /// Declare attribute `key`, moving it to the end of the declaration
    /// order if it was declared before.
    pub fn add_attribute(&self, key: &AttributeKey) -> AttributeCreator {
        self.put_attribute(key, EntryAction::Add)
    }

    /// Re-declare attribute `key` in its existing position.
    pub fn replace_attribute(&self, key: &AttributeKey) -> Result<AttributeCreator, SchemaError> {
        if !self.declared_ids().0.contains(key.id()) {
            return Err(SchemaError::ReplaceUndeclared {
                parent: self.key.id().clone(),
                key: key.clone().into(),
            });
        }
        Ok(self.put_attribute(key, EntryAction::Replace))
    }

    /// Declare child element `key`, moving it to the end of the
    /// declaration order if it was declared before.
    pub fn add_element(&self, key: &ElementKey) -> ElementCreator {
        self.put_element(key, EntryAction::Add)
    }

    /// Re-declare child element `key` in its existing position.
    pub fn replace_element(&self, key: &ElementKey) -> Result<ElementCreator, SchemaError> {
        if !self.declared_ids().1.contains(key.id()) {
            return Err(SchemaError::ReplaceUndeclared {
                parent: self.key.id().clone(),
                key: key.clone().into(),
            });
        }
        Ok(self.put_element(key, EntryAction::Replace))
    }

    /// Iterate undeclared attributes at this point of the declared order.
    pub fn add_undeclared_attribute_marker(&self) -> &Self {
        self.put_attribute(&AttributeKey::undeclared_marker(), EntryAction::Add);
        self
    }

    /// Iterate undeclared children at this point of the declared order.
    pub fn add_undeclared_element_marker(&self) -> &Self {
        self.put_element(&ElementKey::undeclared_marker(), EntryAction::Add);
        self
    }

    /// Adapt to `adaptor` when an instance carries `kind`. Ignored unless
    /// `adaptor`'s type is a strict subtype of this element's type.
    pub fn add_adaptation(&self, kind: impl Into<String>, adaptor: &ElementKey) -> &Self {
        let kind = kind.into();
        self.registry.declare(|state| {
            state
                .element_layer(&self.tk)
                .transform
                .adaptations
                .insert(kind, adaptor.clone());
            state.element_layer(&TransformKey::new(None, adaptor.clone(), None));
        });
        self
    }

    /// Hide every declared attribute except `keys`, including attributes
    /// declared later. Repeated calls widen the whitelist.
    pub fn whitelist_attributes(
        &self,
        keys: impl IntoIterator<Item = AttributeKey>,
    ) -> Result<&Self, SchemaError> {
        let keys: IndexSet<AttributeKey> = keys.into_iter().collect();
        let (declared, _) = self.declared_ids();
        if let Some(missing) = keys.iter().find(|k| !declared.contains(k.id())) {
            return Err(SchemaError::WhitelistUndeclared {
                parent: self.key.id().clone(),
                key: missing.clone().into(),
            });
        }
        self.registry.declare(|state| {
            state
                .element_layer(&self.tk)
                .attribute_whitelist
                .get_or_insert_with(IndexSet::new)
                .extend(keys);
        });
        Ok(self)
    }

    /// Hide every declared child except `keys`, including children declared
    /// later. Repeated calls widen the whitelist.
    pub fn whitelist_elements(
        &self,
        keys: impl IntoIterator<Item = ElementKey>,
    ) -> Result<&Self, SchemaError> {
        let keys: IndexSet<ElementKey> = keys.into_iter().collect();
        let (_, declared) = self.declared_ids();
        if let Some(missing) = keys.iter().find(|k| !declared.contains(k.id())) {
            return Err(SchemaError::WhitelistUndeclared {
                parent: self.key.id().clone(),
                key: missing.clone().into(),
            });
        }
        self.registry.declare(|state| {
            state
                .element_layer(&self.tk)
                .element_whitelist
                .get_or_insert_with(IndexSet::new)
                .extend(keys);
        });
        Ok(self)
    }

    /// Hide the named children.
    pub fn blacklist_elements(&self, keys: impl IntoIterator<Item = ElementKey>) -> &Self {
        for key in keys {
            self.put_child_visibility(&key);
        }
        self
    }

    fn put_child_visibility(&self, key: &ElementKey) {
        let tk = self.element_tk(key);
        self.registry.declare(|state| {
            state.element_layer(&tk).transform.base.visible = Some(false);
        });
    }

    /// Declare attribute `key` on this element with its value stored at the
    /// end of the relative `path`. The declaration at the path's end is
    /// hidden from its physical location and lends its name and visibility
    /// to `key`, but never its requiredness.
    pub fn move_attribute(
        &self,
        key: &AttributeKey,
        path: &Path,
    ) -> Result<AttributeCreator, SchemaError> {
        let source = self.move_source(path)?;
        let path = path.to_relative();
        let tk = self.attribute_tk(key);
        self.registry.declare(|state| {
            state.element_layer(&self.tk).transform.attributes.insert(
                key.id().clone(),
                AttributeEntry {
                    key: key.clone(),
                    action: EntryAction::Replace,
                },
            );
            let moved = state.attribute_layer(&tk);
            moved.base.path = Some(path.clone());
            moved.base.virtual_value = Some(Arc::new(ValueAdapter::new(path)));
            moved.base.source = Some(source.clone());
            mark_moved(state, &source);
        });
        Ok(AttributeCreator::new(self.registry.clone(), tk))
    }

    /// Declare child `key` on this element, physically stored at the end of
    /// the relative `path`, which must select an element.
    pub fn move_element(&self, key: &ElementKey, path: &Path) -> Result<ElementCreator, SchemaError> {
        if !path.selects_element() {
            return Err(SchemaError::InvalidMovePath {
                path: path.to_string(),
                reason: "an element can only be moved from an element".to_string(),
            });
        }
        let source = self.move_source(path)?;
        let path = path.to_relative();
        let tk = self.element_tk(key);
        self.registry.declare(|state| {
            state.element_layer(&self.tk).transform.elements.insert(
                key.id().clone(),
                ElementEntry {
                    key: key.clone(),
                    action: EntryAction::Replace,
                },
            );
            state.element_layer(&tk.base());
            let moved = &mut state.element_layer(&tk).transform;
            moved.base.path = Some(path.clone());
            moved.base.source = Some(source.clone());
            moved.virtual_element = Some(VirtualElement::Path(Arc::new(ElementAdapter::new(path))));
            mark_moved(state, &source);
        });
        Ok(ElementCreator::new(self.registry.clone(), tk, key.clone()))
    }

    /// Layer of the declaration selected by `path`, relative to this
    /// element.
    fn move_source(&self, path: &Path) -> Result<TransformKey, SchemaError> {
        let Some(selected) = path.selected_key() else {
            return Err(SchemaError::InvalidMovePath {
                path: path.to_string(),
                reason: "path is empty".to_string(),
            });
        };
        let owner = path.parent_key().unwrap_or(&self.key);
        Ok(TransformKey::new(
            Some(owner.clone()),
            selected.clone(),
            self.context(),
        ))
    }

    /// Ids of the attributes and children declared so far for this layer.
    fn declared_ids(&self) -> (IndexSet<QName>, IndexSet<QName>) {
        self.registry.inspect(|state| {
            let Some(composite) = state.composite(&self.tk) else {
                return (IndexSet::new(), IndexSet::new());
            };
            (
                composite.attributes().map(|k| k.id().clone()).collect(),
                composite.elements().map(|k| k.id().clone()).collect(),
            )
        })
    }
}

fn mark_moved(state: &mut crate::registry::RegistryState, source: &TransformKey) {
    match source.key() {
        MetadataKey::Attribute(_) => state.attribute_layer(source).base.moved = true,
        MetadataKey::Element(_) => state.element_layer(source).transform.base.moved = true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::Datatype;

    fn entry() -> ElementKey {
        ElementKey::container(QName::local("entry"))
    }

    fn attr(local: &str) -> AttributeKey {
        AttributeKey::string(QName::local(local))
    }

    #[test]
    fn test_add_reorders_and_replace_keeps_position() {
        let registry = MetadataRegistry::new();
        let creator = registry.build(&entry());
        creator.add_attribute(&attr("a"));
        creator.add_attribute(&attr("b"));
        creator.add_attribute(&attr("c"));
        creator
            .replace_attribute(&attr("a"))
            .unwrap()
            .set_required(true);

        let ids = |registry: &MetadataRegistry| -> Vec<String> {
            registry
                .bind_element(&entry())
                .unwrap()
                .attributes()
                .map(|k| k.id().to_string())
                .collect()
        };
        assert_eq!(ids(&registry), vec!["a", "b", "c"]);

        let context = MetadataContext::for_projection("full");
        registry
            .build_in(None, &entry(), Some(&context))
            .add_attribute(&attr("a"));
        let full = registry
            .bind_element_in(None, &entry(), Some(&context))
            .unwrap();
        let full_ids: Vec<String> = full.attributes().map(|k| k.id().to_string()).collect();
        assert_eq!(full_ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_add_again_moves_to_end_of_same_layer() {
        let registry = MetadataRegistry::new();
        let creator = registry.build(&entry());
        for name in ["a", "b", "c", "a"] {
            creator.add_attribute(&attr(name));
            creator.add_element(&ElementKey::string(QName::local(name)));
        }

        let metadata = registry.bind_element(&entry()).unwrap();
        let attributes: Vec<String> = metadata.attributes().map(|k| k.id().to_string()).collect();
        assert_eq!(attributes, vec!["b", "c", "a"]);
        let elements: Vec<String> = metadata.elements().map(|k| k.id().to_string()).collect();
        assert_eq!(elements, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_replace_requires_declaration() {
        let registry = MetadataRegistry::new();
        let creator = registry.build(&entry());
        let err = creator.replace_attribute(&attr("missing")).unwrap_err();
        assert!(matches!(err, SchemaError::ReplaceUndeclared { .. }));
        let err = creator
            .replace_element(&ElementKey::string(QName::local("title")))
            .unwrap_err();
        assert!(matches!(err, SchemaError::ReplaceUndeclared { .. }));
    }

    #[test]
    fn test_whitelist_hides_other_declarations() {
        let registry = MetadataRegistry::new();
        let creator = registry.build(&entry());
        creator.add_attribute(&attr("keep"));
        creator.add_attribute(&attr("drop"));
        assert!(matches!(
            creator.whitelist_attributes([attr("nope")]),
            Err(SchemaError::WhitelistUndeclared { .. })
        ));
        creator.whitelist_attributes([attr("keep")]).unwrap();
        // Declared after the whitelist, still hidden.
        creator.add_attribute(&AttributeKey::of(QName::local("late"), Datatype::Integer));

        let metadata = registry.bind_element(&entry()).unwrap();
        let visible: Vec<String> = metadata
            .attributes()
            .filter(|k| metadata.bind_attribute(k).unwrap().is_visible())
            .map(|k| k.id().to_string())
            .collect();
        assert_eq!(visible, vec!["keep"]);
    }

    #[test]
    fn test_repeated_whitelists_accumulate() {
        let registry = MetadataRegistry::new();
        let title = ElementKey::string(QName::local("title"));
        let summary = ElementKey::string(QName::local("summary"));
        let content = ElementKey::string(QName::local("content"));
        let creator = registry.build(&entry());
        for name in ["one", "two", "three"] {
            creator.add_attribute(&attr(name));
        }
        creator.add_element(&title);
        creator.add_element(&summary);
        creator.add_element(&content);
        creator.whitelist_attributes([attr("one")]).unwrap();
        creator.whitelist_attributes([attr("two")]).unwrap();
        creator.whitelist_elements([title.clone()]).unwrap();
        creator.whitelist_elements([content.clone()]).unwrap();

        let metadata = registry.bind_element(&entry()).unwrap();
        let visible: Vec<String> = metadata
            .attributes()
            .filter(|k| metadata.bind_attribute(k).unwrap().is_visible())
            .map(|k| k.id().to_string())
            .collect();
        assert_eq!(visible, vec!["one", "two"]);
        assert!(metadata.bind_element(&title).unwrap().is_visible());
        assert!(!metadata.bind_element(&summary).unwrap().is_visible());
        assert!(metadata.bind_element(&content).unwrap().is_visible());
    }

    #[test]
    fn test_blacklist_hides_children() {
        let registry = MetadataRegistry::new();
        let title = ElementKey::string(QName::local("title"));
        let summary = ElementKey::string(QName::local("summary"));
        let creator = registry.build(&entry());
        creator.add_element(&title);
        creator.add_element(&summary);
        creator.blacklist_elements([summary.clone()]);

        let metadata = registry.bind_element(&entry()).unwrap();
        assert!(metadata.bind_element(&title).unwrap().is_visible());
        assert!(!metadata.bind_element(&summary).unwrap().is_visible());
    }

    #[test]
    fn test_move_requires_non_empty_path() {
        let registry = MetadataRegistry::new();
        let creator = registry.build(&entry());
        let err = creator.move_attribute(&attr("x"), &Path::empty()).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidMovePath { .. }));
        let to_attribute = Path::of([attr("y").into()]).unwrap();
        let err = creator
            .move_element(&ElementKey::string(QName::local("x")), &to_attribute)
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidMovePath { .. }));
    }
}
