///
/// Binary codec for engine buffers.
///
/// - 32-bit word buffers: the full-text extension's `matchinfo()` output is
///   an array of unsigned 32-bit integers in the machine's native byte
///   order. `decode_words` rejects buffers that are not a whole number of
///   words; layout validation happens in the caller, which knows how many
///   words to expect.
/// - Index strings: the virtual table planner hands an opaque string from
///   `best_index` to `filter`. We store the consumed parameter names joined
///   by commas, which is why identifiers may not contain commas.
///

use crate::error::{ExtError, ExtResult};

pub const WORD_SIZE: usize = 4;

pub fn decode_words(buf: &[u8]) -> ExtResult<Vec<u32>> {
    if buf.len() % WORD_SIZE != 0 {
        return Err(ExtError::Validation(format!(
            "buffer length {} is not a multiple of {}",
            buf.len(),
            WORD_SIZE
        )));
    }
    Ok(buf
        .chunks_exact(WORD_SIZE)
        .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub fn encode_words(words: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * WORD_SIZE);
    for w in words {
        out.extend_from_slice(&w.to_ne_bytes());
    }
    out
}

pub fn encode_index_names<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| n.as_ref())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn decode_index_names(idx_str: &str) -> Vec<String> {
    if idx_str.is_empty() {
        return Vec::new();
    }
    idx_str.split(',').map(str::to_string).collect()
}

/// Column and parameter names end up in generated DDL and in index strings.
pub fn validate_identifier(name: &str) -> ExtResult<()> {
    if name.is_empty() {
        return Err(ExtError::Validation("identifier must not be empty".to_string()));
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    let starts_ok = name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !valid || !starts_ok {
        return Err(ExtError::Validation(format!("invalid identifier '{}'", name)));
    }
    Ok(())
}
