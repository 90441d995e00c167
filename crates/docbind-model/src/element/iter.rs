//! Declared-then-undeclared iteration.
//!
//! With metadata, attributes and children come out in declaration order
//! first (hidden declarations skipped, virtual ones generated), then every
//! stored item the metadata does not declare, in insertion order. An
//! undeclared marker in the declarations moves the undeclared block to the
//! marker's position. Without metadata, stored items come out in insertion
//! order.

use super::Element;
use crate::attribute::Attribute;
use crate::metadata::ElementMetadata;
use crate::qname::QName;
use indexmap::IndexMap;

impl Element {
    /// Attributes in iteration order under this element's own metadata.
    pub fn attribute_iterator(&self) -> std::vec::IntoIter<Attribute> {
        self.attribute_iterator_with(self.metadata.as_ref())
    }

    pub fn attribute_iterator_with(
        &self,
        metadata: Option<&ElementMetadata>,
    ) -> std::vec::IntoIter<Attribute> {
        ordered_attributes(self, metadata).into_iter()
    }

    /// Children in iteration order under this element's own metadata.
    pub fn element_iterator(&self) -> std::vec::IntoIter<Element> {
        self.element_iterator_with(self.metadata.as_ref())
    }

    pub fn element_iterator_with(
        &self,
        metadata: Option<&ElementMetadata>,
    ) -> std::vec::IntoIter<Element> {
        ordered_elements(self, metadata).into_iter()
    }
}

fn ordered_attributes(element: &Element, metadata: Option<&ElementMetadata>) -> Vec<Attribute> {
    let stored: IndexMap<QName, Attribute> = element.state.borrow().attributes.clone();
    let Some(metadata) = metadata else {
        return stored.into_values().collect();
    };

    let mut out = Vec::with_capacity(stored.len());
    let mut undeclared_done = false;
    let undeclared = |out: &mut Vec<Attribute>| {
        out.extend(
            stored
                .values()
                .filter(|a| !metadata.orders_attribute(a.id()))
                .cloned(),
        );
    };

    for key in metadata.attributes() {
        if key.is_undeclared_marker() {
            if !undeclared_done {
                undeclared(&mut out);
                undeclared_done = true;
            }
            continue;
        }
        if key.id().is_wildcard() {
            out.extend(
                stored
                    .values()
                    .filter(|a| key.id().matches(a.id()) && !metadata.declares_attribute_id(a.id()))
                    .cloned(),
            );
            continue;
        }
        let Some(attribute_metadata) = metadata.bind_attribute(key) else {
            out.extend(stored.get(key.id()).cloned());
            continue;
        };
        if !attribute_metadata.is_visible() {
            continue;
        }
        if let Some(value) = attribute_metadata.generate_value(element, metadata) {
            out.push(Attribute::generated(key.clone(), attribute_metadata, value));
        }
    }
    if !undeclared_done {
        undeclared(&mut out);
    }
    out
}

fn ordered_elements(element: &Element, metadata: Option<&ElementMetadata>) -> Vec<Element> {
    let stored: IndexMap<QName, Vec<Element>> = element
        .state
        .borrow()
        .elements
        .iter()
        .map(|(id, children)| (id.clone(), children.as_slice().to_vec()))
        .collect();
    let Some(metadata) = metadata else {
        return stored.into_values().flatten().collect();
    };

    let mut out = Vec::new();
    let mut undeclared_done = false;
    let undeclared = |out: &mut Vec<Element>| {
        for (id, children) in &stored {
            if !metadata.orders_element(id) {
                out.extend(children.iter().cloned());
            }
        }
    };

    for key in metadata.elements() {
        if key.is_undeclared_marker() {
            if !undeclared_done {
                undeclared(&mut out);
                undeclared_done = true;
            }
            continue;
        }
        if key.id().is_wildcard() {
            for (id, children) in &stored {
                if key.id().matches(id) && !metadata.declares_element_id(id) {
                    out.extend(children.iter().cloned());
                }
            }
            continue;
        }
        if let Some(child_metadata) = metadata.bind_element(key) {
            if !child_metadata.is_visible() {
                continue;
            }
            if let Some(virt) = child_metadata.single_virtual_element() {
                out.extend(virt.generate_single(element, metadata, &child_metadata));
                continue;
            }
            if let Some(virt) = child_metadata.multiple_virtual_element() {
                out.extend(virt.generate_multiple(element, metadata, &child_metadata));
                continue;
            }
        }
        if let Some(children) = stored.get(key.id()) {
            out.extend(children.iter().cloned());
        }
    }
    if !undeclared_done {
        undeclared(&mut out);
    }
    out
}
