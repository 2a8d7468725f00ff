use crate::auth::{self, CryptoError};
use crate::dictionary::{AttributeDef, Dictionary, DictionaryError};
use crate::standard;
use super::value::{Value, ValueError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttributeError {
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("attribute data truncated: {0} bytes")]
    Truncated(usize),
    #[error("declared attribute length {declared} does not match {actual} available bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("vendor-specific body too short: {got} bytes, need at least {need}")]
    VsaTooShort { got: usize, need: usize },
    #[error("vendor sub-attribute length {0} is inconsistent with its payload")]
    BadVsaLength(usize),
    #[error("unsupported encryption scheme {0}")]
    UnsupportedEncryption(u32),
    #[error("encoded attribute would be {0} bytes, exceeding 255")]
    Oversize(usize),
    #[error("attribute list is frozen")]
    Frozen,
}

/// A dictionary descriptor paired with a decoded value. Immutable.
///
/// ```text
///  0                   1                   2
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Type      |    Length     |  Value ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Vendor-specific attributes carry the RFC 2865 §5.26 sub-header inside
/// the value field, framed with the vendor's declared field widths.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    def: Arc<AttributeDef>,
    value: Value,
}

impl Attribute {
    /// Pair a descriptor with a value, enforcing that the value's kind is
    /// the descriptor's codec.
    pub fn new(def: Arc<AttributeDef>, value: Value) -> Result<Attribute, AttributeError> {
        if value.kind() != def.codec() {
            return Err(ValueError::KindMismatch {
                expected: def.codec(),
                got: value.kind(),
            }
            .into());
        }
        Ok(Attribute { def, value })
    }

    /// Resolve the descriptor by name and pair it with `value`.
    pub fn by_name(
        dict: &Dictionary,
        name: &str,
        value: Value,
    ) -> Result<Attribute, AttributeError> {
        Attribute::new(dict.attribute_by_name(name)?, value)
    }

    /// Resolve the descriptor by wire id and pair it with `value`.
    pub fn by_id(dict: &Dictionary, id: u8, value: Value) -> Result<Attribute, AttributeError> {
        Attribute::new(dict.attribute(id)?, value)
    }

    /// Decode raw bytes through the descriptor's codec.
    pub fn from_bytes(def: Arc<AttributeDef>, data: &[u8]) -> Result<Attribute, AttributeError> {
        let value = def.codec().decode(data)?;
        Ok(Attribute { def, value })
    }

    pub fn def(&self) -> &Arc<AttributeDef> {
        &self.def
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Serialize onto `buf`. `secret` and `authenticator` key the
    /// User-Password transform for descriptors flagged `encrypt=1`.
    pub fn encode_into(
        &self,
        buf: &mut Vec<u8>,
        secret: &[u8],
        authenticator: &[u8; 16],
    ) -> Result<(), AttributeError> {
        let mut data = Vec::with_capacity(self.value.wire_len());
        self.value.encode_into(&mut data);

        match self.def.encrypt_scheme() {
            None => {}
            Some(1) => data = auth::encrypt_user_password(&data, secret, authenticator)?,
            Some(scheme) => return Err(AttributeError::UnsupportedEncryption(scheme)),
        }

        match self.def.vendor() {
            None => {
                let total = 2 + data.len();
                if total > 255 {
                    return Err(AttributeError::Oversize(total));
                }
                buf.push(self.def.id());
                buf.push(total as u8);
                buf.extend_from_slice(&data);
            }
            Some(vendor) => {
                let type_size = vendor.type_size() as usize;
                let length_size = vendor.length_size() as usize;
                let total = 2 + 4 + type_size + length_size + data.len();
                if total > 255 {
                    return Err(AttributeError::Oversize(total));
                }

                buf.push(standard::VENDOR_SPECIFIC);
                buf.push(total as u8);
                buf.extend_from_slice(&vendor.id().to_be_bytes());

                let sub_id = self.def.sub_id().unwrap_or(0);
                buf.extend_from_slice(&sub_id.to_be_bytes()[4 - type_size..]);

                if length_size > 0 {
                    let sub_length = (type_size + length_size + data.len()).min(255) as u32;
                    buf.extend_from_slice(&sub_length.to_be_bytes()[4 - length_size..]);
                }
                buf.extend_from_slice(&data);
            }
        }
        Ok(())
    }

    /// Parse one attribute from an exact TLV slice (`data[1]` must equal
    /// `data.len()`). Vendor-specific payloads are unwrapped through the
    /// vendor's field widths; only the first sub-attribute is taken and any
    /// trailing bytes are ignored.
    pub fn decode(
        dict: &Dictionary,
        data: &[u8],
        secret: &[u8],
        authenticator: &[u8; 16],
    ) -> Result<Attribute, AttributeError> {
        if data.len() < 2 {
            return Err(AttributeError::Truncated(data.len()));
        }
        let id = data[0];
        let declared = data[1] as usize;
        if declared != data.len() {
            return Err(AttributeError::LengthMismatch {
                declared,
                actual: data.len(),
            });
        }
        let body = &data[2..];

        let (def, payload) = if id == standard::VENDOR_SPECIFIC {
            Self::unwrap_vsa(dict, body)?
        } else {
            (dict.attribute(id)?, body)
        };

        let value = match def.encrypt_scheme() {
            None => def.codec().decode(payload)?,
            Some(1) => {
                let plain = auth::decrypt_user_password(payload, secret, authenticator)?;
                def.codec().decode(&plain)?
            }
            Some(scheme) => return Err(AttributeError::UnsupportedEncryption(scheme)),
        };

        Ok(Attribute { def, value })
    }

    fn unwrap_vsa<'a>(
        dict: &Dictionary,
        body: &'a [u8],
    ) -> Result<(Arc<AttributeDef>, &'a [u8]), AttributeError> {
        if body.len() < 4 {
            return Err(AttributeError::VsaTooShort {
                got: body.len(),
                need: 4,
            });
        }
        let vendor_id = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let vendor = dict.vendor(vendor_id);
        let type_size = vendor.type_size() as usize;
        let length_size = vendor.length_size() as usize;

        let need = 4 + type_size + length_size;
        if body.len() < need {
            return Err(AttributeError::VsaTooShort {
                got: body.len(),
                need,
            });
        }

        let sub_id = be_uint(&body[4..4 + type_size]);
        let rest = &body[4 + type_size..];

        let payload = if length_size == 0 {
            rest
        } else {
            // the sub-length counts the sub-header itself
            let sub_length = be_uint(&rest[..length_size]) as usize;
            let after_length = &rest[length_size..];
            let payload_len = sub_length
                .checked_sub(type_size + length_size)
                .ok_or(AttributeError::BadVsaLength(sub_length))?;
            if payload_len > after_length.len() {
                return Err(AttributeError::BadVsaLength(sub_length));
            }
            &after_length[..payload_len]
        };

        Ok((dict.vsa(vendor_id, sub_id), payload))
    }
}

fn be_uint(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(number) = self.value.as_u32() {
            if let Some(name) = self.def.values().name_of(number) {
                return write!(f, "{}: {} ({})", self.def.name(), name, number);
            }
        }
        write!(f, "{}: {}", self.def.name(), self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_AUTH: [u8; 16] = [0u8; 16];

    fn encode(attr: &Attribute) -> Vec<u8> {
        let mut buf = Vec::new();
        attr.encode_into(&mut buf, b"secret", &NO_AUTH).unwrap();
        buf
    }

    #[test]
    fn test_user_name_wire_layout() {
        let dict = Dictionary::standard();
        let attr = Attribute::by_name(&dict, "User-Name", Value::text("alice").unwrap()).unwrap();
        assert_eq!(encode(&attr), [0x01, 0x07, b'a', b'l', b'i', b'c', b'e']);
    }

    #[test]
    fn test_framed_protocol_wire_layout() {
        let dict = Dictionary::standard();
        let attr =
            Attribute::by_name(&dict, "Framed-Protocol", Value::Integer(1)).unwrap();
        assert_eq!(encode(&attr), [0x07, 0x06, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_framed_ip_address_wire_layout() {
        let dict = Dictionary::standard();
        let attr = Attribute::by_name(
            &dict,
            "Framed-IP-Address",
            Value::ipv4("10.0.0.1").unwrap(),
        )
        .unwrap();
        assert_eq!(encode(&attr), [0x08, 0x06, 0x0a, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let dict = Dictionary::standard();
        assert!(Attribute::by_name(&dict, "User-Name", Value::Integer(1)).is_err());
        assert!(Attribute::by_name(&dict, "Framed-Protocol", Value::text("ppp").unwrap()).is_err());
    }

    #[test]
    fn test_round_trip_through_decode() {
        let dict = Dictionary::standard();
        let attr = Attribute::by_name(&dict, "User-Name", Value::text("bob").unwrap()).unwrap();
        let wire = encode(&attr);
        let back = Attribute::decode(&dict, &wire, b"secret", &NO_AUTH).unwrap();
        assert_eq!(back.def().name(), "User-Name");
        assert_eq!(back.value().as_text(), Some("bob"));
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let dict = Dictionary::standard();
        assert!(Attribute::decode(&dict, &[1, 7, b'a'], b"s", &NO_AUTH).is_err());
        assert!(Attribute::decode(&dict, &[1], b"s", &NO_AUTH).is_err());
    }

    #[test]
    fn test_vsa_decode_cisco() {
        let dict = Dictionary::standard();
        let wire = [
            26, 12, 0, 0, 0, 9, 1, 6, b'x', b'y', b'z', b'w',
        ];
        let attr = Attribute::decode(&dict, &wire, b"s", &NO_AUTH).unwrap();
        assert!(attr.def().name().starts_with("Cisco-"));
        assert_eq!(attr.def().sub_id(), Some(1));
        assert_eq!(attr.value().as_text(), Some("xyzw"));
    }

    #[test]
    fn test_vsa_encode_round_trip() {
        let dict = Dictionary::standard();
        let def = dict.vsa(9, 1);
        let attr = Attribute::new(def, Value::text("ip:inacl#1=deny").unwrap()).unwrap();

        let wire = encode(&attr);
        assert_eq!(wire[0], 26);
        assert_eq!(wire[1] as usize, wire.len());
        assert_eq!(&wire[2..6], &[0, 0, 0, 9]);
        assert_eq!(wire[6], 1); // vendor type
        assert_eq!(wire[7] as usize, wire.len() - 6); // vendor length spans the sub-header

        let back = Attribute::decode(&dict, &wire, b"s", &NO_AUTH).unwrap();
        assert_eq!(back, attr);
    }

    #[test]
    fn test_vsa_length_size_zero() {
        let dict = Dictionary::new();
        dict.load_str(
            "VENDOR USR 429 format=4,0\n\
             BEGIN-VENDOR USR\n\
             ATTRIBUTE USR-Event-Id 0x0030 integer\n\
             END-VENDOR\n",
            "test",
        )
        .unwrap();

        let attr = Attribute::new(dict.vsa(429, 0x30), Value::Integer(6)).unwrap();
        let wire = encode(&attr);
        // id, len, vendor id (4), vendor type (4), no vendor length, value (4)
        assert_eq!(wire.len(), 14);
        assert_eq!(&wire[6..10], &[0, 0, 0, 0x30]);

        let back = Attribute::decode(&dict, &wire, b"s", &NO_AUTH).unwrap();
        assert_eq!(back.value().as_u32(), Some(6));
    }

    #[test]
    fn test_vsa_trailing_sub_attributes_ignored() {
        let dict = Dictionary::standard();
        // Cisco sub-attr "ab" followed by a second sub-attr that is ignored
        let wire = [26, 14, 0, 0, 0, 9, 1, 4, b'a', b'b', 2, 4, b'c', b'd'];
        let attr = Attribute::decode(&dict, &wire, b"s", &NO_AUTH).unwrap();
        assert_eq!(attr.value().as_text(), Some("ab"));
    }

    #[test]
    fn test_vsa_decode_rejects_short_body() {
        let dict = Dictionary::standard();
        // body shorter than vendor id + type + length
        assert!(Attribute::decode(&dict, &[26, 7, 0, 0, 0, 9, 1], b"s", &NO_AUTH).is_err());
        assert!(Attribute::decode(&dict, &[26, 5, 0, 0, 9], b"s", &NO_AUTH).is_err());
    }

    #[test]
    fn test_vsa_decode_rejects_bad_sub_length() {
        let dict = Dictionary::standard();
        // sub-length 1 < sub-header width
        assert!(Attribute::decode(&dict, &[26, 9, 0, 0, 0, 9, 1, 1, b'x'], b"s", &NO_AUTH).is_err());
        // sub-length runs past the payload
        assert!(
            Attribute::decode(&dict, &[26, 9, 0, 0, 0, 9, 1, 200, b'x'], b"s", &NO_AUTH).is_err()
        );
    }

    #[test]
    fn test_encrypted_password_round_trip() {
        let dict = Dictionary::standard();
        let authenticator = [0u8; 16];
        let attr =
            Attribute::by_name(&dict, "User-Password", Value::text("mypass").unwrap()).unwrap();

        let mut wire = Vec::new();
        attr.encode_into(&mut wire, b"secret", &authenticator).unwrap();
        assert_eq!(wire[0], 2);
        assert_eq!(wire[1], 18); // header + one 16-byte cipher block
        assert_ne!(&wire[2..8], b"mypass");

        let back = Attribute::decode(&dict, &wire, b"secret", &authenticator).unwrap();
        assert_eq!(back.value().as_text(), Some("mypass"));
    }

    #[test]
    fn test_unsupported_encryption_scheme_fails() {
        let dict = Dictionary::new();
        dict.load_str("ATTRIBUTE Tunnel-Password 69 string encrypt=2\n", "test")
            .unwrap();
        let attr =
            Attribute::by_name(&dict, "Tunnel-Password", Value::text("pw").unwrap()).unwrap();

        let mut buf = Vec::new();
        assert!(matches!(
            attr.encode_into(&mut buf, b"s", &NO_AUTH),
            Err(AttributeError::UnsupportedEncryption(2))
        ));
        assert!(matches!(
            Attribute::decode(&dict, &[69, 4, 1, 2], b"s", &NO_AUTH),
            Err(AttributeError::UnsupportedEncryption(2))
        ));
    }

    #[test]
    fn test_unknown_attribute_decodes_as_octets() {
        let dict = Dictionary::standard();
        let attr = Attribute::decode(&dict, &[240, 4, 1, 2], b"s", &NO_AUTH).unwrap();
        assert_eq!(attr.def().name(), "Unknown-Attribute-240");
        assert_eq!(attr.value().as_octets(), Some(&[1u8, 2][..]));
    }

    #[test]
    fn test_display_with_enum_table() {
        let dict = Dictionary::standard();
        let known = Attribute::by_name(&dict, "Service-Type", Value::Integer(2)).unwrap();
        assert_eq!(known.to_string(), "Service-Type: Framed-User (2)");
        let unknown = Attribute::by_name(&dict, "Service-Type", Value::Integer(999)).unwrap();
        assert_eq!(unknown.to_string(), "Service-Type: 999");
    }
}
