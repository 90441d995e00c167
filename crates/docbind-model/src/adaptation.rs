//! Unions of the attributes and children contributed by an element's
//! adaptations.
//!
//! When parsing an element whose final type is not known yet, anything an
//! adaptation declares should still parse as declared data. The union is
//! best-effort: adaptations authored independently may disagree about a
//! name, and such names are dropped from the union with a warning so they
//! parse as undeclared and get corrected when the element is narrowed.

use crate::context::MetadataContext;
use crate::key::{AttributeKey, ElementKey};
use crate::qname::QName;
use crate::schema::Schema;
use crate::transform::ElementTransform;
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{error, warn};

/// The adaptations of one element and the union of what they declare
/// beyond the base element.
#[derive(Debug, Clone, Default)]
pub struct AdaptationRegistry {
    adaptations: IndexMap<String, ElementKey>,
    attributes: IndexMap<QName, AttributeKey>,
    elements: IndexMap<QName, ElementKey>,
}

impl AdaptationRegistry {
    /// Build the union for `base`, whose composed declaration is `transform`.
    pub(crate) fn build(
        schema: &Schema,
        base: &ElementKey,
        transform: &ElementTransform,
        context: Option<&MetadataContext>,
    ) -> Self {
        let mut union = UnionBuilder::default();
        for (kind, adaptor) in transform.adaptations() {
            let Some(adaptor_transform) = schema.element_transform(None, adaptor, context) else {
                error!(
                    kind = %kind,
                    adaptor = ?adaptor,
                    base = ?base,
                    "adaptation has no declared metadata; skipping"
                );
                continue;
            };
            for key in adaptor_transform.attributes() {
                if !transform.attributes.contains_key(key.id()) {
                    union.add_attribute(kind, key);
                }
            }
            for key in adaptor_transform.elements() {
                if !transform.elements.contains_key(key.id()) {
                    union.add_element(kind, key);
                }
            }
        }
        AdaptationRegistry {
            adaptations: transform.adaptations().clone(),
            attributes: union.attributes,
            elements: union.elements,
        }
    }

    pub fn adaptation(&self, kind: &str) -> Option<&ElementKey> {
        self.adaptations.get(kind)
    }

    pub fn adaptations(&self) -> &IndexMap<String, ElementKey> {
        &self.adaptations
    }

    pub fn find_attribute(&self, id: &QName) -> Option<AttributeKey> {
        self.attributes.get(id).cloned()
    }

    pub fn find_element(&self, id: &QName) -> Option<ElementKey> {
        self.elements.get(id).cloned()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeKey> {
        self.attributes.values()
    }

    pub fn elements(&self) -> impl Iterator<Item = &ElementKey> {
        self.elements.values()
    }
}

#[derive(Default)]
struct UnionBuilder {
    attributes: IndexMap<QName, AttributeKey>,
    elements: IndexMap<QName, ElementKey>,
    invalid_attributes: HashSet<QName>,
    invalid_elements: HashSet<QName>,
}

impl UnionBuilder {
    fn add_attribute(&mut self, kind: &str, key: &AttributeKey) {
        let id = key.id();
        if self.invalid_attributes.contains(id) {
            return;
        }
        match self.attributes.get(id) {
            None => {
                self.attributes.insert(id.clone(), key.clone());
            }
            Some(existing) if existing.datatype() == key.datatype() => {}
            Some(existing) => {
                warn!(
                    kind = %kind,
                    attribute = %id,
                    existing = %existing.datatype(),
                    incoming = %key.datatype(),
                    "incompatible attribute datatypes across adaptations"
                );
                self.attributes.shift_remove(id);
                self.invalid_attributes.insert(id.clone());
            }
        }
    }

    fn add_element(&mut self, kind: &str, key: &ElementKey) {
        let id = key.id();
        if self.invalid_elements.contains(id) {
            return;
        }
        let Some(existing) = self.elements.get(id) else {
            self.elements.insert(id.clone(), key.clone());
            return;
        };
        if existing.datatype() != key.datatype() {
            warn!(
                kind = %kind,
                element = %id,
                existing = %existing.datatype(),
                incoming = %key.datatype(),
                "incompatible element datatypes across adaptations"
            );
            self.elements.shift_remove(id);
            self.invalid_elements.insert(id.clone());
        } else if existing.element_type().is_assignable_from(key.element_type()) {
            // Keep the supertype already present.
        } else if key.element_type().is_assignable_from(existing.element_type()) {
            self.elements.insert(id.clone(), key.clone());
        } else {
            warn!(
                kind = %kind,
                element = %id,
                existing = %existing.element_type(),
                incoming = %key.element_type(),
                "incomparable element types across adaptations"
            );
            self.elements.shift_remove(id);
            self.invalid_elements.insert(id.clone());
        }
    }
}
