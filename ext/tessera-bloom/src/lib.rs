//!
//! tessera-bloom - Bloom Filters
//!
//! A fixed-size Bloom filter whose serialized form is the raw bit array with
//! no header, so it can be stored in a BLOB column and tested from SQL:
//!
//! - `BloomFilter` - add / contains / to_buffer / from_buffer / calculate_size
//! - `BloomSession` - per-group state behind the `bloomfilter(key [, size])` aggregate
//!
//! Callers must track the filter size out of band; a buffer carries nothing
//! but its bits.
//!

pub mod filter;
pub mod session;

pub use filter::*;
pub use session::*;
