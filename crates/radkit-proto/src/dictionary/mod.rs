//! FreeRADIUS-style dictionary loading and attribute metadata registry.
//!
//! A [`Dictionary`] maps numeric ids, case-insensitive names, and
//! `(vendor, sub-id)` pairs to interned attribute descriptors. Lookups are
//! idempotent: the same input always resolves to the same [`AttributeDef`],
//! including descriptors synthesized on first sight of an unknown id.

mod parser;
mod vendor;

pub use vendor::Vendor;

use crate::attributes::ValueKind;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Dictionary text shipped with the crate; parsed by [`Dictionary::standard`].
const STANDARD_DICTIONARY: &str = include_str!("../../dicts/standard");

/// On-disk home of the shipped dictionary files, used as the fallback root
/// for relative `load` paths.
pub const DEFAULT_DICT_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/dicts");

#[derive(thiserror::Error, Debug)]
pub enum DictionaryError {
    #[error("attribute id {0} is out of range (1..=255)")]
    IdOutOfRange(u32),
    #[error("no attribute named {0:?} in dictionary")]
    UnknownName(String),
    #[error("no vendor named {0:?} in dictionary")]
    UnknownVendor(String),
    #[error("vendor {vendor}: {field} field width {size} is not supported")]
    InvalidVendorFormat {
        vendor: u32,
        field: &'static str,
        size: u8,
    },
    #[error("{trace}: {message}")]
    Parse { trace: String, message: String },
    #[error("failed to read dictionary {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Enumerated names for a numeric attribute, from `VALUE` directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumValues {
    by_value: BTreeMap<u32, String>,
    by_name: HashMap<String, u32>,
}

impl EnumValues {
    fn insert(&mut self, name: String, value: u32) {
        self.by_name.insert(name.clone(), value);
        self.by_value.insert(value, name);
    }

    pub fn name_of(&self, value: u32) -> Option<&str> {
        self.by_value.get(&value).map(String::as_str)
    }

    pub fn value_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_value.is_empty()
    }
}

/// An attribute descriptor. Immutable once published by the registry.
///
/// For vendor-specific attributes `id` is always 26, `sub_id` is the
/// vendor-type field, and `sub_kind` carries the real codec (the outer
/// `kind` being [`ValueKind::Vsa`]).
#[derive(Debug, Clone)]
pub struct AttributeDef {
    name: String,
    id: u8,
    sub_id: Option<u32>,
    vendor: Option<Arc<Vendor>>,
    kind: ValueKind,
    sub_kind: Option<ValueKind>,
    flags: HashMap<String, u32>,
    values: EnumValues,
}

impl AttributeDef {
    fn standard(name: String, id: u8, kind: ValueKind, flags: HashMap<String, u32>) -> Self {
        AttributeDef {
            name,
            id,
            sub_id: None,
            vendor: None,
            kind,
            sub_kind: None,
            flags,
            values: EnumValues::default(),
        }
    }

    fn vendor_specific(
        name: String,
        sub_id: u32,
        vendor: Arc<Vendor>,
        sub_kind: ValueKind,
        flags: HashMap<String, u32>,
    ) -> Self {
        AttributeDef {
            name,
            id: crate::standard::VENDOR_SPECIFIC,
            sub_id: Some(sub_id),
            vendor: Some(vendor),
            kind: ValueKind::Vsa,
            sub_kind: Some(sub_kind),
            flags,
            values: EnumValues::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The on-wire type code (26 for every vendor-specific attribute).
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn sub_id(&self) -> Option<u32> {
        self.sub_id
    }

    pub fn vendor(&self) -> Option<&Arc<Vendor>> {
        self.vendor.as_ref()
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// The codec values of this attribute actually use: the sub-type for a
    /// VSA, the declared type otherwise.
    pub fn codec(&self) -> ValueKind {
        self.sub_kind.unwrap_or(self.kind)
    }

    pub fn flag(&self, name: &str) -> Option<u32> {
        self.flags.get(name).copied()
    }

    /// The `encrypt` flag, when present. Scheme 1 is RFC 2865 §5.2
    /// User-Password obfuscation; every other scheme is rejected by the
    /// codec layer.
    pub fn encrypt_scheme(&self) -> Option<u32> {
        self.flag("encrypt")
    }

    pub fn values(&self) -> &EnumValues {
        &self.values
    }

    fn is_numeric(&self) -> bool {
        matches!(
            self.codec(),
            ValueKind::Byte | ValueKind::Short | ValueKind::Integer | ValueKind::Date
        )
    }

    /// Identity key: `(vendor id, wire id, sub id)`. The registry interns
    /// descriptors, so pointer equality also holds for repeated lookups,
    /// but the key is what [`PartialEq`] compares.
    pub fn key(&self) -> (u32, u8, Option<u32>) {
        (
            self.vendor.as_ref().map(|v| v.id()).unwrap_or(0),
            self.id,
            self.sub_id,
        )
    }
}

impl PartialEq for AttributeDef {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for AttributeDef {}

#[derive(Default)]
struct Registry {
    by_id: HashMap<u8, Arc<AttributeDef>>,
    by_name: HashMap<String, Arc<AttributeDef>>,
    vsa: HashMap<(u32, u32), Arc<AttributeDef>>,
    vendors_by_id: HashMap<u32, Arc<Vendor>>,
    vendors_by_name: HashMap<String, Arc<Vendor>>,
}

impl Registry {
    fn file_attribute(&mut self, def: AttributeDef) {
        let def = Arc::new(def);
        self.by_name.insert(def.name().to_lowercase(), def.clone());
        match (def.vendor(), def.sub_id()) {
            (Some(vendor), Some(sub_id)) => {
                self.vsa.insert((vendor.id(), sub_id), def);
            }
            _ => {
                self.by_id.insert(def.id(), def);
            }
        }
    }
}

/// The attribute metadata registry.
///
/// Handles are cheap to share behind an `Arc`; the interior lock only sees
/// writes when a dictionary file loads or an unknown id is synthesized.
pub struct Dictionary {
    inner: RwLock<Registry>,
}

impl Default for Dictionary {
    fn default() -> Self {
        Dictionary::new()
    }
}

impl Dictionary {
    /// An empty registry. Every id resolves to a synthesized
    /// `Unknown-Attribute-<id>` descriptor until dictionaries are loaded.
    pub fn new() -> Dictionary {
        Dictionary {
            inner: RwLock::new(Registry::default()),
        }
    }

    /// A registry pre-loaded with the shipped RFC 2865/2866 dictionary.
    pub fn standard() -> Dictionary {
        let dict = Dictionary::new();
        dict.load_str(STANDARD_DICTIONARY, "builtin:standard")
            .expect("shipped dictionary must parse");
        dict
    }

    /// Load a dictionary file, following `$INCLUDE` directives.
    ///
    /// An absolute path is used verbatim. A relative path is tried as given
    /// first and then under the crate's shipped `dicts/` directory.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<(), DictionaryError> {
        parser::load_file(self, path.as_ref())
    }

    /// Parse dictionary text that does not live on disk. `origin` labels
    /// parse errors; `$INCLUDE` paths resolve under the shipped `dicts/`
    /// directory.
    pub fn load_str(&self, text: &str, origin: &str) -> Result<(), DictionaryError> {
        parser::load_text(self, text, origin)
    }

    /// Resolve an attribute descriptor by wire id.
    ///
    /// Id 0 is reserved and out of range. An unregistered id in 1..=255
    /// synthesizes (and interns) an `Unknown-Attribute-<id>` descriptor of
    /// type octets, so repeated lookups return the same instance.
    pub fn attribute(&self, id: u8) -> Result<Arc<AttributeDef>, DictionaryError> {
        if id == 0 {
            return Err(DictionaryError::IdOutOfRange(0));
        }
        if let Some(def) = self.inner.read().unwrap().by_id.get(&id) {
            return Ok(def.clone());
        }
        let mut registry = self.inner.write().unwrap();
        if let Some(def) = registry.by_id.get(&id) {
            return Ok(def.clone());
        }
        let def = AttributeDef::standard(
            format!("Unknown-Attribute-{id}"),
            id,
            ValueKind::Octets,
            HashMap::new(),
        );
        registry.file_attribute(def);
        Ok(registry.by_id[&id].clone())
    }

    /// Resolve an attribute descriptor by name, case-insensitively.
    /// Unknown names fail; names are never synthesized.
    pub fn attribute_by_name(&self, name: &str) -> Result<Arc<AttributeDef>, DictionaryError> {
        self.inner
            .read()
            .unwrap()
            .by_name
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| DictionaryError::UnknownName(name.to_string()))
    }

    /// Resolve a vendor by Enterprise id, synthesizing a `Vendor<id>`
    /// placeholder with default field widths for unknown ids.
    pub fn vendor(&self, id: u32) -> Arc<Vendor> {
        if let Some(vendor) = self.inner.read().unwrap().vendors_by_id.get(&id) {
            return vendor.clone();
        }
        let mut registry = self.inner.write().unwrap();
        if let Some(vendor) = registry.vendors_by_id.get(&id) {
            return vendor.clone();
        }
        let vendor = Arc::new(Vendor::synthesized(id));
        registry.vendors_by_id.insert(id, vendor.clone());
        registry
            .vendors_by_name
            .insert(vendor.name().to_lowercase(), vendor.clone());
        vendor
    }

    pub fn vendor_by_name(&self, name: &str) -> Result<Arc<Vendor>, DictionaryError> {
        self.inner
            .read()
            .unwrap()
            .vendors_by_name
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| DictionaryError::UnknownVendor(name.to_string()))
    }

    /// Resolve a vendor-specific descriptor, synthesizing
    /// `<Vendor>-Unknown-Attribute-<sub_id>` (octets) for unknown pairs.
    pub fn vsa(&self, vendor_id: u32, sub_id: u32) -> Arc<AttributeDef> {
        if let Some(def) = self.inner.read().unwrap().vsa.get(&(vendor_id, sub_id)) {
            return def.clone();
        }
        let vendor = self.vendor(vendor_id);
        let mut registry = self.inner.write().unwrap();
        if let Some(def) = registry.vsa.get(&(vendor_id, sub_id)) {
            return def.clone();
        }
        let def = AttributeDef::vendor_specific(
            format!("{}-Unknown-Attribute-{sub_id}", vendor.name()),
            sub_id,
            vendor,
            ValueKind::Octets,
            HashMap::new(),
        );
        registry.file_attribute(def);
        registry.vsa[&(vendor_id, sub_id)].clone()
    }

    // --- registration, used by the parser ---

    pub(crate) fn register_standard_attribute(
        &self,
        name: String,
        id: u32,
        kind: ValueKind,
        flags: HashMap<String, u32>,
    ) -> Result<(), String> {
        if id == 0 || id > 255 {
            return Err(format!("attribute id {id} is out of range (1..=255)"));
        }
        let def = AttributeDef::standard(name, id as u8, kind, flags);
        self.inner.write().unwrap().file_attribute(def);
        Ok(())
    }

    pub(crate) fn register_vendor_attribute(
        &self,
        name: String,
        sub_id: u32,
        vendor: Arc<Vendor>,
        sub_kind: ValueKind,
        flags: HashMap<String, u32>,
    ) {
        let def = AttributeDef::vendor_specific(name, sub_id, vendor, sub_kind, flags);
        self.inner.write().unwrap().file_attribute(def);
    }

    pub(crate) fn register_vendor(&self, vendor: Vendor) -> Result<(), String> {
        let mut registry = self.inner.write().unwrap();
        if registry.vendors_by_id.contains_key(&vendor.id()) {
            return Err(format!("duplicate vendor id {}", vendor.id()));
        }
        let vendor = Arc::new(vendor);
        registry.vendors_by_id.insert(vendor.id(), vendor.clone());
        registry
            .vendors_by_name
            .insert(vendor.name().to_lowercase(), vendor);
        Ok(())
    }

    /// Attach a `VALUE` enum entry to a previously declared attribute.
    /// The descriptor is republished so interned handles stay consistent.
    pub(crate) fn attach_value(
        &self,
        attr_name: &str,
        value_name: String,
        value: u32,
    ) -> Result<(), String> {
        let mut registry = self.inner.write().unwrap();
        let def = registry
            .by_name
            .get(&attr_name.to_lowercase())
            .cloned()
            .ok_or_else(|| format!("VALUE for unknown attribute {attr_name:?}"))?;
        if !def.is_numeric() {
            return Err(format!(
                "VALUE for non-numeric attribute {attr_name:?} ({})",
                def.codec()
            ));
        }
        let mut updated = (*def).clone();
        updated.values.insert(value_name, value);
        registry.file_attribute(updated);
        Ok(())
    }
}

impl std::fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.inner.read().unwrap();
        f.debug_struct("Dictionary")
            .field("attributes", &registry.by_name.len())
            .field("vendors", &registry.vendors_by_id.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_dictionary_loads() {
        let dict = Dictionary::standard();
        let user_name = dict.attribute_by_name("User-Name").unwrap();
        assert_eq!(user_name.id(), 1);
        assert_eq!(user_name.codec(), ValueKind::Text);

        let password = dict.attribute_by_name("user-password").unwrap();
        assert_eq!(password.encrypt_scheme(), Some(1));
    }

    #[test]
    fn test_lookup_idempotence() {
        let dict = Dictionary::standard();
        let a = dict.attribute(1).unwrap();
        let b = dict.attribute(1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let by_name = dict.attribute_by_name("User-Name").unwrap();
        assert!(Arc::ptr_eq(&a, &by_name));
    }

    #[test]
    fn test_unknown_attribute_synthesis() {
        let dict = Dictionary::new();
        let a = dict.attribute(242).unwrap();
        assert_eq!(a.name(), "Unknown-Attribute-242");
        assert_eq!(a.codec(), ValueKind::Octets);
        let b = dict.attribute(242).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        // synthesized descriptors are also reachable by name
        let c = dict.attribute_by_name("unknown-attribute-242").unwrap();
        assert!(Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_id_zero_out_of_range() {
        let dict = Dictionary::new();
        assert!(matches!(
            dict.attribute(0),
            Err(DictionaryError::IdOutOfRange(0))
        ));
    }

    #[test]
    fn test_unknown_name_fails() {
        let dict = Dictionary::standard();
        assert!(matches!(
            dict.attribute_by_name("No-Such-Attribute"),
            Err(DictionaryError::UnknownName(_))
        ));
    }

    #[test]
    fn test_vendor_synthesis_idempotent() {
        let dict = Dictionary::new();
        let a = dict.vendor(4242);
        let b = dict.vendor(4242);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "Vendor4242");
        assert_eq!(a.type_size(), 1);
        assert_eq!(a.length_size(), 1);
    }

    #[test]
    fn test_vsa_synthesis() {
        let dict = Dictionary::new();
        let def = dict.vsa(4242, 7);
        assert_eq!(def.name(), "Vendor4242-Unknown-Attribute-7");
        assert_eq!(def.id(), 26);
        assert_eq!(def.sub_id(), Some(7));
        assert_eq!(def.codec(), ValueKind::Octets);
        assert!(Arc::ptr_eq(&def, &dict.vsa(4242, 7)));
    }

    #[test]
    fn test_vsa_lookup_from_standard() {
        let dict = Dictionary::standard();
        let def = dict.vsa(9, 1);
        assert!(def.name().starts_with("Cisco-"));
        assert_eq!(def.codec(), ValueKind::Text);
    }

    #[test]
    fn test_key_equality_across_registries() {
        let a = Dictionary::standard().attribute(1).unwrap();
        let b = Dictionary::standard().attribute(1).unwrap();
        // distinct interned instances, same identity key
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(*a, *b);
    }

    #[test]
    fn test_enum_values_attached() {
        let dict = Dictionary::standard();
        let service_type = dict.attribute_by_name("Service-Type").unwrap();
        assert_eq!(service_type.values().name_of(1), Some("Login-User"));
        assert_eq!(service_type.values().value_of("Framed-User"), Some(2));
    }
}
