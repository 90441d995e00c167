//! Resolution: narrowing to the declared type, then validating, depth first.

use super::Element;
use crate::error::ContentValidationError;
use crate::metadata::ElementMetadata;
use crate::qname::QName;
use crate::validation::{PathSegment, ValidationContext};
use std::collections::HashMap;
use tracing::error;

impl Element {
    /// Narrow and validate this tree against `metadata`.
    ///
    /// Every validation error in the tree is collected before failing, so
    /// the returned error lists all of them. Narrowing is applied element by
    /// element; a failure leaves earlier replacements in place.
    pub fn resolve(&self, metadata: &ElementMetadata) -> Result<Element, ContentValidationError> {
        let mut vc = ValidationContext::new();
        let resolved = vc.with_instance_path(vec![PathSegment::Element(self.id().clone())], |vc| {
            self.resolve_with(Some(metadata), vc)
        });
        if vc.has_errors() {
            return Err(ContentValidationError { context: vc });
        }
        Ok(resolved)
    }

    /// Resolve into an existing validation context. Returns the element to
    /// use in place of `self`, which is a narrowed view if the metadata
    /// declares a more specific type.
    pub fn resolve_with(
        &self,
        metadata: Option<&ElementMetadata>,
        vc: &mut ValidationContext,
    ) -> Element {
        let Some(metadata) = metadata else {
            return self.clone();
        };
        let mut narrowed = self.narrow(metadata);
        narrowed.metadata = Some(metadata.clone());

        metadata.validate(vc, &narrowed);

        let children: Vec<Element> = narrowed.element_iterator_with(None).collect();
        let mut totals: HashMap<QName, usize> = HashMap::new();
        for child in &children {
            *totals.entry(child.id().clone()).or_default() += 1;
        }
        let mut seen: HashMap<QName, usize> = HashMap::new();
        for child in children {
            let index = seen.entry(child.id().clone()).or_default();
            let mut segments = vec![PathSegment::Element(child.id().clone())];
            if totals.get(child.id()).copied().unwrap_or(0) > 1 {
                segments.push(PathSegment::Index(*index));
            }
            *index += 1;

            let child_metadata = metadata.bind_element(child.key());
            let resolved = vc.with_instance_path(segments, |vc| {
                child.resolve_with(child_metadata.as_ref(), vc)
            });
            if !resolved.same_view(&child)
                && let Err(err) = narrowed.replace_element(&child, resolved)
            {
                error!(element = %child.id(), error = %err, "cannot splice resolved element");
            }
        }
        narrowed
    }

    /// A view of this element as the metadata's declared type, or this
    /// element unchanged if it already is one or cannot become one.
    fn narrow(&self, metadata: &ElementMetadata) -> Element {
        let target = metadata.key().element_type();
        if target.is_assignable_from(self.element_type()) {
            return self.clone();
        }
        if !self.element_type().is_assignable_from(target) {
            error!(
                element = %self.id(),
                from = %self.element_type(),
                to = %target,
                "cannot narrow element to an unrelated type"
            );
            return self.clone();
        }
        let key = metadata.key().with_id(self.id().clone());
        match metadata.schema().create_element(&key, Some(self)) {
            Ok(narrowed) => narrowed,
            Err(err) => {
                error!(element = %self.id(), error = %err, "narrowing failed");
                self.clone()
            }
        }
    }
}
