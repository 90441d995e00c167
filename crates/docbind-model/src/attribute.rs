//! Attribute values stored on elements.

use crate::context::MetadataContext;
use crate::datatype::Value;
use crate::error::ElementError;
use crate::key::AttributeKey;
use crate::metadata::AttributeMetadata;
use crate::qname::QName;

/// A typed attribute value with its current metadata binding.
#[derive(Clone, Debug)]
pub struct Attribute {
    key: AttributeKey,
    metadata: Option<AttributeMetadata>,
    value: Value,
}

impl Attribute {
    /// An unbound attribute. The value must be an instance of the key's
    /// datatype.
    pub fn new(key: AttributeKey, value: impl Into<Value>) -> Result<Self, ElementError> {
        let value = value.into();
        if !key.datatype().accepts(&value) {
            return Err(ElementError::InvalidValue {
                id: key.id().clone(),
                expected: key.datatype(),
                got: value.datatype(),
            });
        }
        Ok(Self {
            key,
            metadata: None,
            value,
        })
    }

    /// An attribute produced during iteration, possibly by a virtual value.
    pub(crate) fn generated(key: AttributeKey, metadata: AttributeMetadata, value: Value) -> Self {
        Self {
            key,
            metadata: Some(metadata),
            value,
        }
    }

    pub fn key(&self) -> &AttributeKey {
        &self.key
    }

    pub fn id(&self) -> &QName {
        self.key.id()
    }

    /// Wire name: the bound name if renamed, the id otherwise.
    pub fn name(&self) -> &QName {
        self.metadata.as_ref().map_or(self.key.id(), |m| m.name())
    }

    pub fn metadata(&self) -> Option<&AttributeMetadata> {
        self.metadata.as_ref()
    }

    pub fn context(&self) -> Option<&MetadataContext> {
        self.metadata.as_ref().and_then(|m| m.context())
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn bind(&mut self, metadata: Option<AttributeMetadata>) {
        self.metadata = metadata;
    }

    pub(crate) fn bound(mut self, metadata: Option<AttributeMetadata>) -> Self {
        self.metadata = metadata;
        self
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.value == other.value
    }
}
