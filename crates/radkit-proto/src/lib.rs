//! RADIUS Protocol Core
//!
//! This crate implements the RADIUS protocol as defined in RFC 2865 and
//! RFC 2866: dictionary-driven attribute metadata, typed attribute values,
//! packet encoding/decoding, and the MD5 authenticator and User-Password
//! schemes. Vendor-Specific Attributes are supported with per-vendor
//! field widths.
//!
//! # Example
//!
//! ```rust
//! use radkit_proto::{Attribute, Code, Dictionary, Packet, Value};
//!
//! let dict = Dictionary::standard();
//!
//! // Build an Access-Request
//! let mut packet = Packet::new(Code::AccessRequest, 1);
//! packet.add(Attribute::by_name(&dict, "User-Name", Value::text("alice")?)?)?;
//! packet.add(Attribute::by_name(&dict, "User-Password", Value::text("secret")?)?)?;
//!
//! // Encode to bytes; User-Password is obfuscated under the shared
//! // secret and the packet's request authenticator.
//! let wire = packet.encode(b"sharedsecret", false)?;
//!
//! // And back
//! let decoded = Packet::decode(&dict, &wire, b"sharedsecret")?;
//! assert_eq!(decoded.code(), Code::AccessRequest);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod attributes;
pub mod auth;
pub mod dictionary;
pub mod packet;
pub mod standard;

pub use attributes::{Attribute, AttributeError, AttributeList, Value, ValueError, ValueKind};
pub use dictionary::{AttributeDef, Dictionary, DictionaryError, Vendor};
pub use packet::{Code, Packet, PacketError};
