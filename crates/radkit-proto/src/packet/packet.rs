use super::Code;
use crate::attributes::{Attribute, AttributeError, AttributeList};
use crate::auth;
use crate::dictionary::{AttributeDef, Dictionary};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("packet too short: {0} bytes")]
    Truncated(usize),
    #[error("invalid packet length field: {0}")]
    InvalidLength(usize),
    #[error("unknown packet code: {0}")]
    InvalidCode(u8),
    #[error("packet too large: {0} bytes")]
    TooLarge(usize),
    #[error("received packets are frozen")]
    Frozen,
    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

/// A RADIUS packet, RFC 2865 §3.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Code      |  Identifier   |            Length             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// |                         Authenticator                         |
/// |                                                               |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Attributes ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-
/// ```
///
/// Packets built for sending are mutable until encoded; packets produced
/// by [`Packet::decode`] are frozen, and their code, authenticator, and
/// attribute list cannot change.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    code: Code,
    identifier: u8,
    authenticator: [u8; 16],
    attributes: AttributeList,
    frozen: bool,
}

impl Packet {
    /// Minimum packet size: 1 code + 1 identifier + 2 length + 16 authenticator.
    pub const MIN_SIZE: usize = 20;
    /// Maximum packet size per RFC 2865.
    pub const MAX_SIZE: usize = 4096;

    /// A new outbound request with a freshly generated random authenticator.
    pub fn new(code: Code, identifier: u8) -> Packet {
        Packet::with_authenticator(code, identifier, auth::generate_request_authenticator())
    }

    pub fn with_authenticator(code: Code, identifier: u8, authenticator: [u8; 16]) -> Packet {
        Packet {
            code,
            identifier,
            authenticator,
            attributes: AttributeList::new(),
            frozen: false,
        }
    }

    /// A mutable response template for this packet: same identifier, same
    /// authenticator (the request authenticator keys the response MD5),
    /// empty attribute list.
    pub fn reply(&self, code: Code) -> Packet {
        Packet::with_authenticator(code, self.identifier, self.authenticator)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn identifier(&self) -> u8 {
        self.identifier
    }

    pub fn authenticator(&self) -> &[u8; 16] {
        &self.authenticator
    }

    pub fn attributes(&self) -> &AttributeList {
        &self.attributes
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn set_code(&mut self, code: Code) -> Result<(), PacketError> {
        if self.frozen {
            return Err(PacketError::Frozen);
        }
        self.code = code;
        Ok(())
    }

    /// Replace the authenticator. The bytes are copied in, so the caller's
    /// array stays independent of the packet.
    pub fn set_authenticator(&mut self, authenticator: [u8; 16]) -> Result<(), PacketError> {
        if self.frozen {
            return Err(PacketError::Frozen);
        }
        self.authenticator = authenticator;
        Ok(())
    }

    pub fn add(&mut self, attribute: Attribute) -> Result<(), PacketError> {
        if self.frozen {
            return Err(PacketError::Frozen);
        }
        self.attributes.push(attribute)?;
        Ok(())
    }

    pub fn has(&self, def: &AttributeDef) -> bool {
        self.attributes.has(def)
    }

    /// First attribute with this descriptor.
    pub fn get(&self, def: &AttributeDef) -> Option<&Attribute> {
        self.attributes.get(def)
    }

    /// All attributes with this descriptor, in insertion order.
    pub fn get_all<'a>(&'a self, def: &'a AttributeDef) -> impl Iterator<Item = &'a Attribute> {
        self.attributes.get_all(def)
    }

    /// Encode to wire bytes.
    ///
    /// For a response (`is_response`), the authenticator field of the
    /// encoded packet is replaced with the RFC 2865 §3 Response
    /// Authenticator, computed over the header carrying the request
    /// authenticator, the attribute stream, and the secret.
    pub fn encode(&self, secret: &[u8], is_response: bool) -> Result<Vec<u8>, PacketError> {
        let mut buf = Vec::with_capacity(256);
        buf.push(self.code.as_u8());
        buf.push(self.identifier);
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&self.authenticator);

        self.attributes
            .encode_into(&mut buf, secret, &self.authenticator)?;

        let total = buf.len();
        if total > Self::MAX_SIZE {
            return Err(PacketError::TooLarge(total));
        }
        buf[2..4].copy_from_slice(&(total as u16).to_be_bytes());

        if is_response {
            let mut ctx = md5::Context::new();
            ctx.consume(&buf);
            ctx.consume(secret);
            let digest = ctx.compute();
            buf[4..20].copy_from_slice(&digest.0);
        }

        Ok(buf)
    }

    /// Decode a datagram into a frozen packet.
    ///
    /// The request authenticator is not verified here; response
    /// verification belongs to the client engine, and request
    /// authenticators are random by definition.
    pub fn decode(dict: &Dictionary, data: &[u8], secret: &[u8]) -> Result<Packet, PacketError> {
        if data.len() < Self::MIN_SIZE {
            return Err(PacketError::Truncated(data.len()));
        }
        let declared = u16::from_be_bytes([data[2], data[3]]) as usize;
        if declared < Self::MIN_SIZE || declared > data.len() {
            return Err(PacketError::InvalidLength(declared));
        }
        let code = Code::from_u8(data[0]).ok_or(PacketError::InvalidCode(data[0]))?;
        let identifier = data[1];

        let mut authenticator = [0u8; 16];
        authenticator.copy_from_slice(&data[4..20]);

        let attributes =
            AttributeList::decode(dict, &data[20..declared], secret, &authenticator)?;

        Ok(Packet {
            code,
            identifier,
            authenticator,
            attributes,
            frozen: true,
        })
    }
}
