//! A deliberately narrow parser for the restricted subset of Python literals
//! produced by the NumPy header writer.
//!
//! This is not a general-purpose Python parser. Keys must be known up front
//! and must not appear anywhere else in the input; values run from one key to
//! the next. Whitespace and trailing commas are tolerated because NumPy's
//! writer emits both.

use std::collections::HashMap;

use crate::error::PatchError;

/// Parses the string representation of a Python dict, extracting the values
/// for `keys`.
///
/// Fails with `MissingKey` if any expected key is absent. Keys not listed in
/// `keys` are never discovered.
pub(crate) fn parse_dict(
    input: &str,
    keys: &[&str],
) -> Result<HashMap<String, String>, PatchError> {
    let input = input.trim();
    let interior = input
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| PatchError::BadHeader(format!("not a Python dict: {:?}", input)))?;

    let mut positions = Vec::with_capacity(keys.len());
    for &key in keys {
        let quoted = format!("'{}'", key);
        match interior.find(&quoted) {
            Some(pos) => positions.push((pos, key)),
            None => return Err(PatchError::MissingKey(key.to_owned())),
        }
    }
    positions.sort_unstable();

    let mut map = HashMap::with_capacity(keys.len());
    for (i, &(begin, key)) in positions.iter().enumerate() {
        let end = positions
            .get(i + 1)
            .map(|&(pos, _)| pos)
            .unwrap_or_else(|| interior.len());
        let mut entry = interior[begin..end].trim();
        if let Some(stripped) = entry.strip_suffix(',') {
            entry = stripped.trim_end();
        }
        let sep = entry.find(':').ok_or_else(|| {
            PatchError::BadHeader(format!("no value for key '{}': {:?}", key, entry))
        })?;
        map.insert(key.to_owned(), entry[sep + 1..].trim().to_owned());
    }

    Ok(map)
}

/// Parses the string representation of a Python boolean.
pub(crate) fn parse_bool(input: &str) -> Result<bool, PatchError> {
    match input {
        "True" => Ok(true),
        "False" => Ok(false),
        _ => Err(PatchError::BadHeader(format!(
            "not a Python boolean: {:?}",
            input
        ))),
    }
}

/// Parses the string representation of a Python str, returning its interior.
pub(crate) fn parse_str(input: &str) -> Result<&str, PatchError> {
    if input.len() >= 2 {
        if let Some(interior) = input.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            return Ok(interior);
        }
    }
    Err(PatchError::BadHeader(format!(
        "not a Python string: {:?}",
        input
    )))
}

/// Parses the string representation of a Python tuple into its items.
///
/// Items are trimmed; empty items (the trailing comma of a 1-tuple) are
/// dropped.
pub(crate) fn parse_tuple(input: &str) -> Result<Vec<&str>, PatchError> {
    let input = input.trim();
    let interior = input
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| PatchError::BadHeader(format!("not a Python tuple: {:?}", input)))?;

    Ok(interior
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect())
}
