///
/// MurmurHash2, 32-bit.
///
/// Input is consumed in little-endian 4-byte blocks so hashes (and therefore
/// serialized Bloom filters) are identical across platforms. The length is
/// mixed into the seed as a 32-bit value.
///

const M: u32 = 0x5bd1e995;
const R: u32 = 24;

pub fn murmurhash2(key: &[u8], seed: u32) -> u32 {
    let mut h: u32 = seed ^ (key.len() as u32);

    let mut blocks = key.chunks_exact(4);
    for block in &mut blocks {
        let mut k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = blocks.remainder();
    if tail.len() == 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}
