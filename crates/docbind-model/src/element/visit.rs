use super::Element;
use crate::error::VisitorStopped;
use crate::metadata::ElementMetadata;

/// Depth-first visitor over an element tree.
pub trait ElementVisitor {
    /// Called before the children of `element`. Return `false` to skip
    /// them.
    fn visit(
        &mut self,
        parent: Option<&Element>,
        element: &Element,
        metadata: Option<&ElementMetadata>,
    ) -> Result<bool, VisitorStopped>;

    /// Called after the children of `element`.
    fn visit_complete(
        &mut self,
        _parent: Option<&Element>,
        _element: &Element,
        _metadata: Option<&ElementMetadata>,
    ) -> Result<(), VisitorStopped> {
        Ok(())
    }
}

impl Element {
    /// Walk this tree in iteration order, binding each child's metadata
    /// from its parent's.
    pub fn visit(
        &self,
        visitor: &mut dyn ElementVisitor,
        metadata: Option<&ElementMetadata>,
    ) -> Result<(), VisitorStopped> {
        self.visit_from(None, visitor, metadata)
    }

    fn visit_from(
        &self,
        parent: Option<&Element>,
        visitor: &mut dyn ElementVisitor,
        metadata: Option<&ElementMetadata>,
    ) -> Result<(), VisitorStopped> {
        if visitor.visit(parent, self, metadata)? {
            for child in self.element_iterator_with(metadata) {
                let child_metadata = metadata.and_then(|m| m.bind_element(child.key()));
                child.visit_from(Some(self), visitor, child_metadata.as_ref())?;
            }
        }
        visitor.visit_complete(parent, self, metadata)
    }
}
