//! Aggregate state for `bloomfilter(key [, size])`.
//!
//! The filter is built lazily on the first step, sized by that step's
//! optional size argument or the configured default. Later size arguments
//! are ignored since a filter never changes capacity.

use tessera_core::{ExtResult, SqlValue};

use crate::filter::BloomFilter;

#[derive(Debug)]
pub struct BloomSession {
    filter: Option<BloomFilter>,
    default_size: usize,
}

impl BloomSession {
    pub fn new(default_size: usize) -> Self {
        Self {
            filter: None,
            default_size,
        }
    }

    pub fn step(&mut self, value: &SqlValue, size: Option<usize>) -> ExtResult<()> {
        if self.filter.is_none() {
            self.filter = Some(BloomFilter::new(size.unwrap_or(self.default_size))?);
        }
        if let (Some(filter), Some(key)) = (self.filter.as_mut(), value.key_bytes()) {
            filter.add(&key);
        }
        Ok(())
    }

    /// Serialized filter, or `None` when no row was ever stepped.
    pub fn finalize(self) -> Option<Vec<u8>> {
        self.filter.map(|f| f.to_buffer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_stepped_is_none() {
        assert!(BloomSession::new(1024).finalize().is_none());
    }

    #[test]
    fn test_lazy_construction_uses_first_size() {
        let mut session = BloomSession::new(1024);
        session.step(&SqlValue::from("a"), Some(64)).unwrap();
        session.step(&SqlValue::from("b"), Some(4096)).unwrap();
        let buf = session.finalize().unwrap();
        assert_eq!(buf.len(), 64);

        let bf = BloomFilter::from_buffer(&buf).unwrap();
        assert!(bf.contains(b"a"));
        assert!(bf.contains(b"b"));
    }

    #[test]
    fn test_default_size_and_null_keys() {
        let mut session = BloomSession::new(128);
        session.step(&SqlValue::Null, None).unwrap();
        session.step(&SqlValue::Integer(42), None).unwrap();
        let buf = session.finalize().unwrap();
        assert_eq!(buf.len(), 128);
        assert!(BloomFilter::from_buffer(&buf).unwrap().contains(b"42"));
    }

    #[test]
    fn test_zero_size_fails() {
        let mut session = BloomSession::new(1024);
        assert!(session.step(&SqlValue::from("a"), Some(0)).is_err());
    }
}
