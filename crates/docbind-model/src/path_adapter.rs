//! Bridges [`Path`]s to live element trees.
//!
//! The walkers locate (or create) the elements along a path. The adapters
//! wrap a relative path as a virtual value or virtual element, so a value
//! declared on one element is physically read from and written to the
//! path's terminus.
//!
//! A path may cross at most one repeating element. Past that step the walk
//! fans out into one branch per instance; a second repeating step is a
//! schema-authoring error.

use crate::datatype::Value;
use crate::element::Element;
use crate::error::{ElementError, ParseError, SchemaError};
use crate::key::{ElementKey, MetadataKey};
use crate::metadata::{Cardinality, ElementMetadata};
use crate::path::Path;
use crate::virtual_value::{MultipleVirtualElement, SingleVirtualElement, VirtualValue};
use tracing::warn;

/// Element steps of `path` paired with their bound metadata, if absolute.
fn element_steps(path: &Path) -> Vec<(&ElementKey, Option<&ElementMetadata>)> {
    let bound = path.element_metadata();
    path.steps()
        .iter()
        .filter_map(MetadataKey::as_element)
        .enumerate()
        .map(|(i, key)| (key, bound.get(i)))
        .collect()
}

fn is_repeating(metadata: Option<&ElementMetadata>) -> bool {
    metadata.is_some_and(|m| m.cardinality() != Cardinality::Single)
}

/// Index of the single repeating element step, if any.
fn repeating_step(path: &Path) -> Result<Option<usize>, SchemaError> {
    let mut found = None;
    for (i, (key, metadata)) in element_steps(path).into_iter().enumerate() {
        if is_repeating(metadata) {
            if found.is_some() {
                return Err(SchemaError::MultipleRepeatingSteps {
                    path: path.to_string(),
                    key: key.id().clone(),
                });
            }
            found = Some(i);
        }
    }
    Ok(found)
}

fn walk_existing(
    element: &Element,
    steps: &[(&ElementKey, Option<&ElementMetadata>)],
) -> Result<Option<Element>, ElementError> {
    let mut current = element.clone();
    for (key, _) in steps {
        match current.element(key.id())? {
            Some(child) => current = child,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

fn get_or_create_child(
    parent: &Element,
    key: &ElementKey,
    metadata: Option<&ElementMetadata>,
) -> Result<Element, ParseError> {
    if let Some(existing) = parent.element(key.id())? {
        return Ok(existing);
    }
    create_child(parent, key, metadata)
}

fn create_child(
    parent: &Element,
    key: &ElementKey,
    metadata: Option<&ElementMetadata>,
) -> Result<Element, ParseError> {
    let child = match metadata {
        Some(metadata) => metadata.create_element()?,
        None => Element::new(key.clone()),
    };
    parent.add_element_as(key, child.clone())?;
    // The stored view may have been re-keyed or rebound on the way in.
    Ok(parent.elements(key.id()).pop().unwrap_or(child))
}

fn walk_creating(
    element: &Element,
    steps: &[(&ElementKey, Option<&ElementMetadata>)],
) -> Result<Element, ParseError> {
    let mut current = element.clone();
    for (key, metadata) in steps {
        current = get_or_create_child(&current, key, *metadata)?;
    }
    Ok(current)
}

/// Number of leading element steps that lead to the selected element's
/// parent.
fn parent_len(path: &Path) -> usize {
    let count = element_steps(path).len();
    if path.selects_element() {
        count.saturating_sub(1)
    } else {
        count
    }
}

/// The element owning the selected step, or `None` if a hop is missing.
/// Fails if a hop is repeating.
pub fn parent_element(element: &Element, path: &Path) -> Result<Option<Element>, ElementError> {
    let steps = element_steps(path);
    walk_existing(element, &steps[..parent_len(path)])
}

/// The selected element (or the owner of the selected attribute), or
/// `None` if a hop is missing. Fails if a hop is repeating.
pub fn final_element(element: &Element, path: &Path) -> Result<Option<Element>, ElementError> {
    walk_existing(element, &element_steps(path))
}

/// Every instance of the selected element, fanning out across the single
/// repeating step the path may contain.
pub fn final_elements(element: &Element, path: &Path) -> Result<Vec<Element>, ParseError> {
    repeating_step(path)?;
    let mut current = vec![element.clone()];
    for (key, _) in element_steps(path) {
        let mut next = Vec::new();
        for e in &current {
            next.extend(e.elements(key.id()));
        }
        current = next;
    }
    Ok(current)
}

/// Like [`parent_element`], creating missing hops.
pub fn create_parent_element(element: &Element, path: &Path) -> Result<Element, ParseError> {
    let steps = element_steps(path);
    walk_creating(element, &steps[..parent_len(path)])
}

/// Like [`final_element`], creating missing hops.
pub fn create_final_element(element: &Element, path: &Path) -> Result<Element, ParseError> {
    walk_creating(element, &element_steps(path))
}

/// Create one parent chain per item when the path repeats before its last
/// step, or one shared parent otherwise.
pub fn create_parent_elements(
    element: &Element,
    path: &Path,
    count: usize,
) -> Result<Vec<Element>, ParseError> {
    let steps = element_steps(path);
    let parents = &steps[..parent_len(path)];
    match repeating_step(path)? {
        Some(r) if r < parents.len() => {
            let shared = walk_creating(element, &parents[..r])?;
            let (key, metadata) = parents[r];
            (0..count)
                .map(|_| {
                    let item = create_child(&shared, key, metadata)?;
                    walk_creating(&item, &parents[r + 1..])
                })
                .collect()
        }
        _ => {
            let parent = walk_creating(element, parents)?;
            Ok(vec![parent; count])
        }
    }
}

/// A view of `element` carrying `target`'s id, keeping its own type.
fn rekey(element: Element, target: &ElementKey) -> Element {
    if element.id() == target.id() {
        return element;
    }
    let key = element.key().with_id(target.id().clone());
    Element::share(key, &element)
}

/// A rekeyed view bound to the virtual declaration it is generated for.
fn present(element: Element, metadata: &ElementMetadata) -> Element {
    let mut view = rekey(element, metadata.key());
    view.attach_metadata(metadata.clone());
    view
}

/// A value read from and written to the terminus of a relative path: an
/// attribute if the path selects one, element text otherwise.
#[derive(Debug, Clone)]
pub struct ValueAdapter {
    path: Path,
}

impl ValueAdapter {
    pub fn new(path: Path) -> Self {
        Self {
            path: path.to_relative(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VirtualValue for ValueAdapter {
    fn generate(&self, element: &Element, metadata: &ElementMetadata) -> Option<Value> {
        let path = match self.path.to_absolute(metadata) {
            Ok(path) => path,
            Err(err) => {
                warn!(path = %self.path, error = %err, "virtual value path does not resolve");
                return None;
            }
        };
        let owner = final_element(element, &path).ok()??;
        match path.selected_attribute_key() {
            Some(attribute) => owner.attribute_value(attribute.id()),
            None => owner.text_value(),
        }
    }

    fn parse(
        &self,
        element: &Element,
        metadata: &ElementMetadata,
        value: Value,
    ) -> Result<(), ParseError> {
        let path = self.path.to_absolute(metadata)?;
        let owner = create_final_element(element, &path)?;
        match path.selected_attribute_key() {
            Some(attribute) => {
                let value = value.convert(attribute.datatype())?;
                owner.set_attribute_value(attribute, value)?;
            }
            None => {
                let value = value.convert(owner.key().datatype())?;
                owner.set_text_value(value)?;
            }
        }
        Ok(())
    }
}

/// A child element physically stored at the terminus of a relative path.
#[derive(Debug, Clone)]
pub struct ElementAdapter {
    path: Path,
}

impl ElementAdapter {
    pub fn new(path: Path) -> Self {
        Self {
            path: path.to_relative(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, parent_metadata: &ElementMetadata) -> Option<Path> {
        match self.path.to_absolute(parent_metadata) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(path = %self.path, error = %err, "virtual element path does not resolve");
                None
            }
        }
    }
}

impl SingleVirtualElement for ElementAdapter {
    fn generate_single(
        &self,
        parent: &Element,
        parent_metadata: &ElementMetadata,
        metadata: &ElementMetadata,
    ) -> Option<Element> {
        let path = self.resolve(parent_metadata)?;
        let found = final_element(parent, &path).ok()??;
        Some(present(found, metadata))
    }

    fn parse_single(
        &self,
        parent: &Element,
        parent_metadata: &ElementMetadata,
        element: Element,
        _metadata: &ElementMetadata,
    ) -> Result<(), ParseError> {
        let path = self.path.to_absolute(parent_metadata)?;
        let Some(target) = path.selected_element_key() else {
            return Ok(());
        };
        let owner = create_parent_element(parent, &path)?;
        owner.add_element_as(target, rekey(element, target))?;
        Ok(())
    }
}

impl MultipleVirtualElement for ElementAdapter {
    fn generate_multiple(
        &self,
        parent: &Element,
        parent_metadata: &ElementMetadata,
        metadata: &ElementMetadata,
    ) -> Vec<Element> {
        let Some(path) = self.resolve(parent_metadata) else {
            return Vec::new();
        };
        match final_elements(parent, &path) {
            Ok(found) => found.into_iter().map(|e| present(e, metadata)).collect(),
            Err(err) => {
                warn!(path = %self.path, error = %err, "cannot generate virtual elements");
                Vec::new()
            }
        }
    }

    fn parse_multiple(
        &self,
        parent: &Element,
        parent_metadata: &ElementMetadata,
        elements: Vec<Element>,
        _metadata: &ElementMetadata,
    ) -> Result<(), ParseError> {
        let path = self.path.to_absolute(parent_metadata)?;
        let Some(target) = path.selected_element_key() else {
            return Ok(());
        };
        let steps = element_steps(&path);
        let target_repeats = steps.last().is_some_and(|(_, m)| is_repeating(*m));
        if repeating_step(&path)?.is_none() && elements.len() > 1 {
            return Err(ParseError::DuplicateElement {
                id: target.id().clone(),
            });
        }
        let owners = if target_repeats {
            let owner = create_parent_element(parent, &path)?;
            vec![owner; elements.len()]
        } else {
            create_parent_elements(parent, &path, elements.len())?
        };
        for (owner, element) in owners.iter().zip(elements) {
            owner.add_element_as(target, rekey(element, target))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qname::QName;

    #[test]
    fn test_relative_walks_without_metadata() {
        let root = Element::new(ElementKey::container(QName::local("entry")));
        let author = ElementKey::container(QName::local("author"));
        let name = ElementKey::string(QName::local("name"));
        let path = Path::of([author.clone().into(), name.clone().into()]).unwrap();

        assert!(final_element(&root, &path).unwrap().is_none());
        let created = create_final_element(&root, &path).unwrap();
        created.set_text_value("Ada").unwrap();

        let found = final_element(&root, &path).unwrap().unwrap();
        assert_eq!(found.text_value(), Some(Value::from("Ada")));
        let parent = parent_element(&root, &path).unwrap().unwrap();
        assert_eq!(parent.id(), author.id());
    }

    #[test]
    fn test_repeating_hop_fails_single_walk() {
        let root = Element::new(ElementKey::container(QName::local("feed")));
        let entry = ElementKey::container(QName::local("entry"));
        root.add_element(Element::new(entry.clone())).unwrap();
        root.add_element(Element::new(entry.clone())).unwrap();
        let path = Path::of([entry.into()]).unwrap();
        assert!(matches!(
            final_element(&root, &path),
            Err(ElementError::Repeating(_))
        ));
        assert_eq!(final_elements(&root, &path).unwrap().len(), 2);
    }
}
