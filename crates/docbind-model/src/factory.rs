//! Element construction.
//!
//! Element implementation types are plain [`ElementType`] tags, so
//! constructing "an element of type T" means building a view with a key of
//! that type. A factory registered for a type can customize this (seed
//! defaults, refuse sources it cannot adapt); without one a generic view is
//! built.

use crate::element::Element;
use crate::error::ContentCreationError;
use crate::key::ElementKey;
use crate::schema::Schema;
use std::sync::Arc;

/// Builds an element for `key`, optionally as a view over `source`'s
/// storage.
pub type ElementFactory = Arc<
    dyn Fn(&ElementKey, Option<&Element>) -> Result<Element, ContentCreationError> + Send + Sync,
>;

pub(crate) fn create_element(
    key: &ElementKey,
    source: Option<&Element>,
    schema: Option<&Schema>,
) -> Result<Element, ContentCreationError> {
    if let Some(source) = source
        && source.key() == key
    {
        return Ok(source.clone());
    }
    let Some(factory) = schema.and_then(|s| s.factory(key.element_type())) else {
        return Ok(match source {
            Some(source) => Element::share(key.clone(), source),
            None => Element::new(key.clone()),
        });
    };
    let element = factory(key, source)?;
    if element.key().element_type() != key.element_type() {
        return Err(ContentCreationError::new(
            key.element_type().clone(),
            key.id().clone(),
            format!(
                "factory produced an element of type {}",
                element.key().element_type()
            ),
        ));
    }
    Ok(element)
}
