use super::DictionaryError;

/// An enterprise registered in the dictionary.
///
/// `type_size` and `length_size` are the widths of the vendor-type and
/// vendor-length fields inside this vendor's VSA payloads. The RFC 2865
/// default is one byte each; a `format=T,L` tag on the `VENDOR` directive
/// overrides them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vendor {
    name: String,
    id: u32,
    type_size: u8,
    length_size: u8,
}

impl Vendor {
    pub const DEFAULT_TYPE_SIZE: u8 = 1;
    pub const DEFAULT_LENGTH_SIZE: u8 = 1;

    pub fn new(name: impl Into<String>, id: u32) -> Vendor {
        Vendor {
            name: name.into(),
            id,
            type_size: Self::DEFAULT_TYPE_SIZE,
            length_size: Self::DEFAULT_LENGTH_SIZE,
        }
    }

    pub fn with_format(
        name: impl Into<String>,
        id: u32,
        type_size: u8,
        length_size: u8,
    ) -> Result<Vendor, DictionaryError> {
        if !matches!(type_size, 1 | 2 | 4) {
            return Err(DictionaryError::InvalidVendorFormat {
                vendor: id,
                field: "type",
                size: type_size,
            });
        }
        if !matches!(length_size, 0 | 1 | 2) {
            return Err(DictionaryError::InvalidVendorFormat {
                vendor: id,
                field: "length",
                size: length_size,
            });
        }
        Ok(Vendor {
            name: name.into(),
            id,
            type_size,
            length_size,
        })
    }

    /// Placeholder for a vendor id seen on the wire but absent from the
    /// loaded dictionaries.
    pub(crate) fn synthesized(id: u32) -> Vendor {
        Vendor::new(format!("Vendor{id}"), id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn type_size(&self) -> u8 {
        self.type_size
    }

    pub fn length_size(&self) -> u8 {
        self.length_size
    }
}
