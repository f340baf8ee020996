///
/// Digest and checksum functions.
///
/// Digests take several parts and hash their concatenation, matching the
/// variadic SQL functions `md5(a, b, ...)`, `sha1(...)` and `sha256(...)`.
/// Output is the lowercase hex digest.
///

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

fn hex_digest<D: Digest, P: AsRef<[u8]>>(parts: &[P]) -> String {
    let mut hasher = D::new();
    for part in parts {
        hasher.update(part.as_ref());
    }
    hex::encode(hasher.finalize())
}

pub fn md5_hex<P: AsRef<[u8]>>(parts: &[P]) -> String {
    hex_digest::<Md5, P>(parts)
}

pub fn sha1_hex<P: AsRef<[u8]>>(parts: &[P]) -> String {
    hex_digest::<Sha1, P>(parts)
}

pub fn sha256_hex<P: AsRef<[u8]>>(parts: &[P]) -> String {
    hex_digest::<Sha256, P>(parts)
}

pub fn adler32(data: &[u8]) -> u32 {
    adler::adler32_slice(data)
}

pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
