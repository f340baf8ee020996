///
/// tessera-hash - Hashing Primitives
///
/// Non-cryptographic and digest hashes exposed as SQL scalar functions and
/// used internally by the Bloom filter:
///
/// - **murmurhash2**: fixed 32-bit MurmurHash2 over byte strings (Bloom filter bit selection)
/// - **Digests**: MD5, SHA-1, SHA-256 as lowercase hex (RustCrypto md-5, sha1, sha2)
/// - **Checksums**: Adler-32 and CRC-32
///
/// All functions operate on plain byte slices; callers convert engine values
/// with `SqlValue::key_bytes`.
///

pub mod digest;
pub mod murmur;

pub use digest::*;
pub use murmur::*;
