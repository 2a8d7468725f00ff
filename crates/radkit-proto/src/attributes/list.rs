use super::attribute::{Attribute, AttributeError};
use crate::dictionary::{AttributeDef, Dictionary};
use tracing::warn;

/// An ordered attribute collection. Insertion order is the wire order.
///
/// Lists produced by [`AttributeList::decode`] are frozen and reject all
/// mutation; packets received off the wire stay as they arrived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeList {
    items: Vec<Attribute>,
    frozen: bool,
}

impl AttributeList {
    pub fn new() -> AttributeList {
        AttributeList::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Append an attribute. Duplicates are allowed; RADIUS order matters.
    pub fn push(&mut self, attribute: Attribute) -> Result<(), AttributeError> {
        if self.frozen {
            return Err(AttributeError::Frozen);
        }
        self.items.push(attribute);
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.items.iter()
    }

    /// First attribute matching the descriptor, by identity key.
    pub fn get(&self, def: &AttributeDef) -> Option<&Attribute> {
        self.items.iter().find(|attr| **attr.def() == *def)
    }

    /// All attributes matching the descriptor, in insertion order.
    pub fn get_all<'a>(&'a self, def: &'a AttributeDef) -> impl Iterator<Item = &'a Attribute> {
        self.items.iter().filter(move |attr| **attr.def() == *def)
    }

    pub fn has(&self, def: &AttributeDef) -> bool {
        self.get(def).is_some()
    }

    /// Serialize all attributes in insertion order.
    pub fn encode_into(
        &self,
        buf: &mut Vec<u8>,
        secret: &[u8],
        authenticator: &[u8; 16],
    ) -> Result<(), AttributeError> {
        for attribute in &self.items {
            attribute.encode_into(buf, secret, authenticator)?;
        }
        Ok(())
    }

    /// Parse a TLV stream until the buffer is exhausted, returning a frozen
    /// list. An ill-framed tail of fewer than 2 bytes is discarded with a
    /// warning; a declared attribute length outside the remaining buffer is
    /// an error.
    pub fn decode(
        dict: &Dictionary,
        data: &[u8],
        secret: &[u8],
        authenticator: &[u8; 16],
    ) -> Result<AttributeList, AttributeError> {
        let mut items = Vec::new();
        let mut offset = 0;

        while data.len() - offset >= 2 {
            let declared = data[offset + 1] as usize;
            if declared < 2 || offset + declared > data.len() {
                return Err(AttributeError::LengthMismatch {
                    declared,
                    actual: data.len() - offset,
                });
            }
            let attribute =
                Attribute::decode(dict, &data[offset..offset + declared], secret, authenticator)?;
            items.push(attribute);
            offset += declared;
        }

        if offset < data.len() {
            warn!(
                trailing = data.len() - offset,
                "discarding ill-framed attribute stream tail"
            );
        }

        Ok(AttributeList {
            items,
            frozen: true,
        })
    }
}

impl<'a> IntoIterator for &'a AttributeList {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<Attribute> for AttributeList {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> AttributeList {
        AttributeList {
            items: iter.into_iter().collect(),
            frozen: false,
        }
    }
}
