//! The mutable metadata registry.
//!
//! A [`MetadataRegistry`] collects declarations made through creators and
//! publishes them as immutable [`Schema`] snapshots. All declaration goes
//! through one mutex; every declaration clears the published snapshot, and
//! the next reader rebuilds it under the same mutex. Readers holding an
//! older snapshot keep using it unaffected.
//!
//! A registry handle is cheap to clone and every clone refers to the same
//! declarations. Use [`MetadataRegistry::copy`] for an independent copy.

use crate::context::MetadataContext;
use crate::creator::{AttributeCreator, ElementCreator};
use crate::element::Element;
use crate::error::ContentCreationError;
use crate::factory::ElementFactory;
use crate::key::{AttributeKey, ElementKey, ElementType, MetadataKey};
use crate::metadata::ElementMetadata;
use crate::schema::Schema;
use crate::transform::{AttributeTransform, ElementTransform, TransformKey};
use arc_swap::ArcSwapOption;
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A type that knows how to declare its own metadata.
///
/// Registering a definition twice on the same registry is a no-op.
pub trait ElementDefinition: 'static {
    /// The key elements of this type are declared under.
    fn key() -> ElementKey;

    /// Declare the metadata for [`Self::key`] and anything it depends on.
    fn register_metadata(registry: &MetadataRegistry);
}

/// One element declaration layer plus its whitelists, which are applied
/// when a snapshot is built so they also cover later declarations.
#[derive(Clone, Debug, Default)]
pub(crate) struct ElementLayer {
    pub(crate) transform: ElementTransform,
    pub(crate) attribute_whitelist: Option<IndexSet<AttributeKey>>,
    pub(crate) element_whitelist: Option<IndexSet<ElementKey>>,
}

#[derive(Clone, Default)]
pub(crate) struct RegistryState {
    pub(crate) attributes: BTreeMap<TransformKey, AttributeTransform>,
    pub(crate) elements: BTreeMap<TransformKey, ElementLayer>,
    factories: HashMap<ElementType, ElementFactory>,
    definitions: HashSet<TypeId>,
}

impl RegistryState {
    /// The element layer at `tk`, created empty if missing.
    pub(crate) fn element_layer(&mut self, tk: &TransformKey) -> &mut ElementLayer {
        self.elements.entry(tk.clone()).or_default()
    }

    pub(crate) fn attribute_layer(&mut self, tk: &TransformKey) -> &mut AttributeTransform {
        self.attributes.entry(tk.clone()).or_default()
    }

    /// Composite of every element layer applying to `tk`, as declared so
    /// far.
    pub(crate) fn composite(&self, tk: &TransformKey) -> Option<ElementTransform> {
        let key = tk.key().as_element()?;
        let layers: Vec<&ElementTransform> = self
            .elements
            .iter()
            .filter(|(layer, _)| layer.matches(tk))
            .map(|(_, layer)| &layer.transform)
            .collect();
        if layers.is_empty() {
            return None;
        }
        Some(ElementTransform::compose(key, layers))
    }

    fn build_schema(&self) -> Schema {
        let mut attributes = self.attributes.clone();
        let mut elements: BTreeMap<TransformKey, ElementTransform> = self
            .elements
            .iter()
            .map(|(tk, layer)| (tk.clone(), layer.transform.clone()))
            .collect();

        for (tk, layer) in &self.elements {
            if layer.attribute_whitelist.is_none() && layer.element_whitelist.is_none() {
                continue;
            }
            let (Some(owner), Some(composite)) = (tk.key().as_element(), self.composite(tk))
            else {
                continue;
            };
            if let Some(whitelist) = &layer.attribute_whitelist {
                for attribute in composite.attributes() {
                    if attribute.is_undeclared_marker()
                        || whitelist.iter().any(|w| w.id() == attribute.id())
                    {
                        continue;
                    }
                    let hidden = TransformKey::new(
                        Some(owner.clone()),
                        attribute.clone(),
                        tk.context().cloned(),
                    );
                    attributes.entry(hidden).or_default().base.visible = Some(false);
                }
            }
            if let Some(whitelist) = &layer.element_whitelist {
                for element in composite.elements() {
                    if element.is_undeclared_marker()
                        || whitelist.iter().any(|w| w.id() == element.id())
                    {
                        continue;
                    }
                    let hidden = TransformKey::new(
                        Some(owner.clone()),
                        element.clone(),
                        tk.context().cloned(),
                    );
                    elements.entry(hidden).or_default().base.visible = Some(false);
                }
            }
        }

        Schema::new(attributes, elements, self.factories.clone())
    }
}

struct RegistryShared {
    state: Mutex<RegistryState>,
    schema: ArcSwapOption<Schema>,
}

/// Registry of metadata declarations.
#[derive(Clone)]
pub struct MetadataRegistry {
    shared: Arc<RegistryShared>,
}

impl Default for MetadataRegistry {
    fn default() -> Self {
        Self::from_state(RegistryState::default())
    }
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_state(state: RegistryState) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                state: Mutex::new(state),
                schema: ArcSwapOption::empty(),
            }),
        }
    }

    /// Run a declaration under the registry lock and invalidate the
    /// published snapshot.
    pub(crate) fn declare<R>(&self, f: impl FnOnce(&mut RegistryState) -> R) -> R {
        let mut state = self.shared.state.lock();
        let result = f(&mut state);
        self.shared.schema.store(None);
        result
    }

    /// Read the declarations under the registry lock.
    pub(crate) fn inspect<R>(&self, f: impl FnOnce(&RegistryState) -> R) -> R {
        f(&self.shared.state.lock())
    }

    /// Creator for the unrestricted declaration of `key`.
    pub fn build(&self, key: &ElementKey) -> ElementCreator {
        self.build_in(None, key, None)
    }

    /// Creator for `key` restricted to a parent and/or context. The
    /// unrestricted declaration is created too, so the key is registered.
    pub fn build_in(
        &self,
        parent: Option<&ElementKey>,
        key: &ElementKey,
        context: Option<&MetadataContext>,
    ) -> ElementCreator {
        let tk = TransformKey::new(parent.cloned(), key.clone(), context.cloned());
        self.declare(|state| {
            state.element_layer(&tk.base());
            state.element_layer(&tk);
        });
        ElementCreator::new(self.clone(), tk, key.clone())
    }

    /// Creator for attribute `key` on `parent`.
    pub fn build_attribute(&self, parent: &ElementKey, key: &AttributeKey) -> AttributeCreator {
        self.build_attribute_in(parent, key, None)
    }

    pub fn build_attribute_in(
        &self,
        parent: &ElementKey,
        key: &AttributeKey,
        context: Option<&MetadataContext>,
    ) -> AttributeCreator {
        let tk = TransformKey::new(Some(parent.clone()), key.clone(), context.cloned());
        self.declare(|state| {
            state.attribute_layer(&tk);
        });
        AttributeCreator::new(self.clone(), tk)
    }

    /// Declare the metadata of `T` unless it already is.
    pub fn register<T: ElementDefinition>(&self) -> &Self {
        let first = self
            .shared
            .state
            .lock()
            .definitions
            .insert(TypeId::of::<T>());
        if first {
            debug!(key = %T::key().id(), "registering element definition");
            T::register_metadata(self);
        }
        self
    }

    /// Install the factory used to construct elements of `element_type`.
    pub fn register_factory<F>(&self, element_type: ElementType, factory: F) -> &Self
    where
        F: Fn(&ElementKey, Option<&Element>) -> Result<Element, ContentCreationError>
            + Send
            + Sync
            + 'static,
    {
        let factory: ElementFactory = Arc::new(factory);
        self.declare(|state| {
            state.factories.insert(element_type, factory);
        });
        self
    }

    /// True if `key` has an unrestricted declaration.
    pub fn is_registered(&self, key: &ElementKey) -> bool {
        self.inspect(|state| {
            state
                .elements
                .contains_key(&TransformKey::new(None, key.clone(), None))
        })
    }

    /// An independent registry holding the same declarations.
    pub fn copy(&self) -> MetadataRegistry {
        Self::from_state(self.inspect(RegistryState::clone))
    }

    /// Fold `other`'s declarations into this registry. Where both declare
    /// the same layer, `other`'s present fields win.
    pub fn merge(&self, other: &MetadataRegistry) -> &Self {
        if Arc::ptr_eq(&self.shared, &other.shared) {
            return self;
        }
        let theirs = other.inspect(RegistryState::clone);
        self.declare(|state| {
            for (tk, layer) in theirs.attributes {
                let merged = match state.attributes.get(&tk) {
                    Some(mine) => AttributeTransform::compose([mine, &layer]),
                    None => layer,
                };
                state.attributes.insert(tk, merged);
            }
            for (tk, layer) in theirs.elements {
                let merged = match (state.elements.get(&tk), tk.key()) {
                    (Some(mine), MetadataKey::Element(key)) => ElementLayer {
                        transform: ElementTransform::compose(
                            key,
                            [&mine.transform, &layer.transform],
                        ),
                        attribute_whitelist: layer
                            .attribute_whitelist
                            .or_else(|| mine.attribute_whitelist.clone()),
                        element_whitelist: layer
                            .element_whitelist
                            .or_else(|| mine.element_whitelist.clone()),
                    },
                    _ => layer,
                };
                state.elements.insert(tk, merged);
            }
            state.factories.extend(theirs.factories);
            state.definitions.extend(theirs.definitions);
        });
        self
    }

    /// The current snapshot, rebuilding it if declarations changed since
    /// the last one was published.
    pub fn schema(&self) -> Arc<Schema> {
        if let Some(schema) = self.shared.schema.load_full() {
            return schema;
        }
        let state = self.shared.state.lock();
        if let Some(schema) = self.shared.schema.load_full() {
            return schema;
        }
        let schema = Arc::new(state.build_schema());
        debug!(
            elements = schema.element_layer_count(),
            attributes = schema.attribute_layer_count(),
            "rebuilt metadata snapshot"
        );
        self.shared.schema.store(Some(schema.clone()));
        schema
    }

    /// Bind the unrestricted metadata of a root element.
    pub fn bind_element(&self, key: &ElementKey) -> Option<ElementMetadata> {
        self.schema().bind_element(None, key, None)
    }

    /// Bind the metadata of `key` under `parent` in `context`.
    pub fn bind_element_in(
        &self,
        parent: Option<&ElementKey>,
        key: &ElementKey,
        context: Option<&MetadataContext>,
    ) -> Option<ElementMetadata> {
        self.schema().bind_element(parent, key, context)
    }
}

impl fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (elements, attributes) =
            self.inspect(|state| (state.elements.len(), state.attributes.len()));
        f.debug_struct("MetadataRegistry")
            .field("elements", &elements)
            .field("attributes", &attributes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::Datatype;
    use crate::qname::QName;

    fn entry() -> ElementKey {
        ElementKey::container(QName::local("entry"))
    }

    #[test]
    fn test_snapshot_is_reused_until_declaration() {
        let registry = MetadataRegistry::new();
        registry.build(&entry());
        let first = registry.schema();
        assert!(Arc::ptr_eq(&first, &registry.schema()));

        registry
            .build(&entry())
            .add_attribute(&AttributeKey::string(QName::local("id")));
        let second = registry.schema();
        assert!(!Arc::ptr_eq(&first, &second));
        // The old snapshot is unaffected.
        let old = first.bind_element(None, &entry(), None).unwrap();
        assert_eq!(old.attributes().count(), 0);
        let new = second.bind_element(None, &entry(), None).unwrap();
        assert_eq!(new.attributes().count(), 1);
    }

    #[test]
    fn test_copy_is_independent() {
        let registry = MetadataRegistry::new();
        registry.build(&entry()).set_required(true);
        let copy = registry.copy();
        copy.build(&entry()).set_required(false);

        assert!(registry.bind_element(&entry()).unwrap().is_required());
        assert!(!copy.bind_element(&entry()).unwrap().is_required());
    }

    #[test]
    fn test_merge_later_wins() {
        let base = MetadataRegistry::new();
        base.build(&entry()).set_required(true);
        base.build(&entry())
            .add_attribute(&AttributeKey::string(QName::local("id")));

        let overlay = MetadataRegistry::new();
        overlay.build(&entry()).set_required(false);
        overlay
            .build(&entry())
            .add_attribute(&AttributeKey::of(QName::local("rank"), Datatype::Integer));

        base.merge(&overlay);
        let metadata = base.bind_element(&entry()).unwrap();
        assert!(!metadata.is_required());
        let ids: Vec<String> = metadata.attributes().map(|k| k.id().to_string()).collect();
        assert_eq!(ids, vec!["id", "rank"]);
    }

    struct Feed;

    impl ElementDefinition for Feed {
        fn key() -> ElementKey {
            ElementKey::container(QName::local("feed"))
        }

        fn register_metadata(registry: &MetadataRegistry) {
            registry
                .build(&Self::key())
                .add_element(&entry())
                .set_cardinality(crate::metadata::Cardinality::Multiple);
        }
    }

    #[test]
    fn test_register_definition_once() {
        let registry = MetadataRegistry::new();
        registry.register::<Feed>().register::<Feed>();
        assert!(registry.is_registered(&Feed::key()));
        assert!(registry.is_registered(&entry()));
        let metadata = registry.bind_element(&Feed::key()).unwrap();
        assert_eq!(metadata.elements().count(), 1);
    }
}
