//! Line parser for FreeRADIUS 3.x-style dictionary files.
//!
//! Recognized directives: `ATTRIBUTE`, `VALUE`, `VENDOR`,
//! `BEGIN-VENDOR`/`END-VENDOR`, `$INCLUDE`. Anything else is skipped so
//! newer dictionary files still load. Errors carry the full `file:line`
//! include trace.

use super::{DictionaryError, Dictionary, Vendor, DEFAULT_DICT_DIR};
use crate::attributes::ValueKind;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Include recursion bound. Deep enough for any real dictionary tree;
/// include cycles hit it instead of the stack.
const MAX_INCLUDE_DEPTH: usize = 32;

struct Frame {
    path: String,
    line: usize,
}

/// `BEGIN-VENDOR` scope, shared across `$INCLUDE` boundaries.
struct ParseState {
    scope: Option<Arc<Vendor>>,
}

pub(super) fn load_file(dict: &Dictionary, path: &Path) -> Result<(), DictionaryError> {
    let mut frames = Vec::new();
    let mut state = ParseState { scope: None };
    load_nested(dict, path, &mut frames, &mut state)
}

pub(super) fn load_text(dict: &Dictionary, text: &str, origin: &str) -> Result<(), DictionaryError> {
    let mut frames = Vec::new();
    let mut state = ParseState { scope: None };
    parse(
        dict,
        text,
        origin,
        Path::new(DEFAULT_DICT_DIR),
        &mut frames,
        &mut state,
    )
}

fn load_nested(
    dict: &Dictionary,
    path: &Path,
    frames: &mut Vec<Frame>,
    state: &mut ParseState,
) -> Result<(), DictionaryError> {
    let (text, actual) = read_dictionary(path)?;
    let display_path = actual.display().to_string();
    let dir = actual
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    parse(dict, &text, &display_path, &dir, frames, state)
}

/// Open a dictionary file. Relative paths that are not directly openable
/// fall back to the crate's shipped `dicts/` directory; absolute paths are
/// used verbatim.
fn read_dictionary(path: &Path) -> Result<(String, PathBuf), DictionaryError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok((text, path.to_path_buf())),
        Err(source) => {
            if !path.is_absolute() {
                let fallback = Path::new(DEFAULT_DICT_DIR).join(path);
                if let Ok(text) = fs::read_to_string(&fallback) {
                    return Ok((text, fallback));
                }
            }
            Err(DictionaryError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

fn parse(
    dict: &Dictionary,
    text: &str,
    display_path: &str,
    dir: &Path,
    frames: &mut Vec<Frame>,
    state: &mut ParseState,
) -> Result<(), DictionaryError> {
    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();

        if fields[0] == "$INCLUDE" {
            if fields.len() != 2 {
                return Err(parse_error(display_path, lineno, frames, "$INCLUDE takes one path"));
            }
            if frames.len() + 1 > MAX_INCLUDE_DEPTH {
                return Err(parse_error(
                    display_path,
                    lineno,
                    frames,
                    format!("include depth exceeds {MAX_INCLUDE_DEPTH} (include cycle?)"),
                ));
            }
            let target = dir.join(fields[1]);
            frames.push(Frame {
                path: display_path.to_string(),
                line: lineno,
            });
            let nested = load_nested(dict, &target, frames, state);
            frames.pop();
            nested?;
            continue;
        }

        let result = match fields[0] {
            "ATTRIBUTE" => attribute_directive(dict, &fields, state),
            "VALUE" => value_directive(dict, &fields),
            "VENDOR" => vendor_directive(dict, &fields),
            "BEGIN-VENDOR" => begin_vendor_directive(dict, &fields, state),
            "END-VENDOR" => end_vendor_directive(state),
            other => {
                debug!(directive = other, file = %display_path, line = lineno, "skipping unknown dictionary directive");
                Ok(())
            }
        };
        if let Err(message) = result {
            return Err(parse_error(display_path, lineno, frames, message));
        }
    }
    Ok(())
}

fn parse_error(
    display_path: &str,
    line: usize,
    frames: &[Frame],
    message: impl Into<String>,
) -> DictionaryError {
    let mut trace = format!("{display_path}:{line}");
    for frame in frames.iter().rev() {
        trace.push_str(&format!(" (included from {}:{})", frame.path, frame.line));
    }
    DictionaryError::Parse {
        trace,
        message: message.into(),
    }
}

fn attribute_directive(
    dict: &Dictionary,
    fields: &[&str],
    state: &ParseState,
) -> Result<(), String> {
    if fields.len() < 4 {
        return Err("ATTRIBUTE needs a name, an id, and a type".to_string());
    }
    let name = fields[1].to_string();
    let id = parse_int(fields[2]).ok_or_else(|| format!("bad attribute id {:?}", fields[2]))?;
    let kind = ValueKind::from_dictionary_tag(fields[3]);
    let flags = parse_flags(fields.get(4).copied());
    match &state.scope {
        Some(vendor) => {
            dict.register_vendor_attribute(name, id, vendor.clone(), kind, flags);
            Ok(())
        }
        None => dict.register_standard_attribute(name, id, kind, flags),
    }
}

fn value_directive(dict: &Dictionary, fields: &[&str]) -> Result<(), String> {
    if fields.len() < 4 {
        return Err("VALUE needs an attribute name, a value name, and a number".to_string());
    }
    let value =
        parse_int(fields[3]).ok_or_else(|| format!("bad VALUE number {:?}", fields[3]))?;
    dict.attach_value(fields[1], fields[2].to_string(), value)
}

fn vendor_directive(dict: &Dictionary, fields: &[&str]) -> Result<(), String> {
    if fields.len() < 3 {
        return Err("VENDOR needs a name and an id".to_string());
    }
    let id = parse_int(fields[2]).ok_or_else(|| format!("bad vendor id {:?}", fields[2]))?;
    let vendor = match fields.get(3).and_then(|f| f.strip_prefix("format=")) {
        Some(format) => {
            let mut sizes = format.split(',');
            let type_size = sizes
                .next()
                .and_then(parse_int)
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| format!("bad vendor format {format:?}"))?;
            let length_size = sizes
                .next()
                .and_then(parse_int)
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| format!("bad vendor format {format:?}"))?;
            Vendor::with_format(fields[1], id, type_size, length_size).map_err(|e| e.to_string())?
        }
        None => Vendor::new(fields[1], id),
    };
    dict.register_vendor(vendor)
}

fn begin_vendor_directive(
    dict: &Dictionary,
    fields: &[&str],
    state: &mut ParseState,
) -> Result<(), String> {
    if fields.len() < 2 {
        return Err("BEGIN-VENDOR needs a vendor name".to_string());
    }
    let vendor = dict
        .vendor_by_name(fields[1])
        .map_err(|_| format!("BEGIN-VENDOR for unknown vendor {:?}", fields[1]))?;
    state.scope = Some(vendor);
    Ok(())
}

fn end_vendor_directive(state: &mut ParseState) -> Result<(), String> {
    if state.scope.take().is_none() {
        return Err("END-VENDOR without matching BEGIN-VENDOR".to_string());
    }
    Ok(())
}

fn parse_int(s: &str) -> Option<u32> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn parse_flags(field: Option<&str>) -> HashMap<String, u32> {
    let mut flags = HashMap::new();
    if let Some(field) = field {
        for item in field.split(',') {
            if item.is_empty() {
                continue;
            }
            match item.split_once('=') {
                Some((key, value)) => {
                    // unknown or malformed flags are tolerated for
                    // forward compatibility; only integer values register
                    if let Some(value) = parse_int(value) {
                        flags.insert(key.to_string(), value);
                    }
                }
                None => {
                    flags.insert(item.to_string(), 1);
                }
            }
        }
    }
    flags
}
