///
/// SQL function surface.
///
/// Registers the scalar and aggregate functions on a connection. Three
/// groups can be switched off independently through `[functions]` in the
/// extension config:
///
/// - hash:  murmurhash, md5, sha1, sha256, adler32, crc32
/// - rank:  fts_rank, fts_lucene, fts_bm25, fts_bm25f
/// - bloom: bloomfilter (aggregate), bloomfilter_contains, bloomfilter_add,
///          bloomfilter_calculate_size
///
/// Keys are converted with `SqlValue::key_bytes`, so integers and floats hash
/// as their decimal text. A NULL key yields NULL (or "not contained").
/// Errors surface to the calling statement as `UserFunctionError`.
///

use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::Connection;
use tracing::debug;

use tessera_bloom::{BloomFilter, BloomSession};
use tessera_core::{ExtError, ExtResult, ExtensionConfig, SqlValue};
use tessera_hash::{adler32, crc32, md5_hex, murmurhash2, sha1_hex, sha256_hex};
use tessera_rank::Scorer;

fn flags() -> FunctionFlags {
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC
}

fn arg(ctx: &Context<'_>, idx: usize) -> SqlValue {
    SqlValue::from_value_ref(ctx.get_raw(idx))
}

fn check_arity(name: &str, ctx: &Context<'_>, min: usize, max: usize) -> ExtResult<()> {
    let n = ctx.len();
    if n < min || n > max {
        return Err(ExtError::Validation(format!(
            "{}() takes {} to {} arguments, got {}",
            name, min, max, n
        )));
    }
    Ok(())
}

fn blob_arg(name: &str, value: &SqlValue) -> ExtResult<Vec<u8>> {
    match value {
        SqlValue::Blob(b) => Ok(b.clone()),
        SqlValue::Text(s) => Ok(s.as_bytes().to_vec()),
        other => Err(ExtError::Validation(format!(
            "{}() expects a blob, got {}",
            name,
            other.type_name()
        ))),
    }
}

pub fn register_functions(conn: &Connection, config: &ExtensionConfig) -> ExtResult<()> {
    if config.functions.hash {
        register_hash_functions(conn)?;
    }
    if config.functions.rank {
        register_rank_functions(conn)?;
    }
    if config.functions.bloom {
        register_bloom_functions(conn, config.bloom.default_size)?;
    }
    debug!(
        hash = config.functions.hash,
        rank = config.functions.rank,
        bloom = config.functions.bloom,
        "registered SQL functions"
    );
    Ok(())
}

pub fn register_hash_functions(conn: &Connection) -> ExtResult<()> {
    conn.create_scalar_function("murmurhash", -1, flags(), |ctx| {
        check_arity("murmurhash", ctx, 1, 2)?;
        let key = arg(ctx, 0);
        let seed = if ctx.len() > 1 {
            let raw = arg(ctx, 1);
            raw.as_i64().ok_or_else(|| {
                ExtError::Validation(format!("murmurhash() seed is not an integer: {}", raw))
            })? as u32
        } else {
            0
        };
        Ok(key.key_bytes().map(|k| murmurhash2(&k, seed) as i64))
    })?;

    type DigestFn = fn(&[Vec<u8>]) -> String;
    let digests: [(&str, DigestFn); 3] = [
        ("md5", md5_hex::<Vec<u8>>),
        ("sha1", sha1_hex::<Vec<u8>>),
        ("sha256", sha256_hex::<Vec<u8>>),
    ];
    for (name, digest) in digests {
        conn.create_scalar_function(name, -1, flags(), move |ctx| {
            let parts: Vec<Vec<u8>> = (0..ctx.len())
                .filter_map(|i| arg(ctx, i).key_bytes().map(|k| k.into_owned()))
                .collect();
            Ok(digest(&parts))
        })?;
    }

    type ChecksumFn = fn(&[u8]) -> u32;
    let checksums: [(&str, ChecksumFn); 2] = [("adler32", adler32), ("crc32", crc32)];
    for (name, checksum) in checksums {
        conn.create_scalar_function(name, 1, flags(), move |ctx| {
            Ok(arg(ctx, 0).key_bytes().map(|k| checksum(&k) as i64))
        })?;
    }
    Ok(())
}

pub fn register_rank_functions(conn: &Connection) -> ExtResult<()> {
    for scorer in Scorer::ALL {
        let name = scorer.sql_name();
        conn.create_scalar_function(name, -1, flags(), move |ctx| {
            if ctx.is_empty() {
                return Err(ExtError::Validation(format!(
                    "{}() requires a matchinfo buffer",
                    name
                ))
                .into());
            }
            let buf = match arg(ctx, 0) {
                SqlValue::Null => return Ok(None),
                other => blob_arg(name, &other)?,
            };
            let mut weights = Vec::with_capacity(ctx.len() - 1);
            for i in 1..ctx.len() {
                let value = arg(ctx, i);
                let weight = value.as_f64().ok_or_else(|| {
                    ExtError::Validation(format!(
                        "{}() weight {} is not numeric: {}",
                        name, i, value
                    ))
                })?;
                weights.push(weight);
            }
            Ok(Some(scorer.score(&buf, &weights)?))
        })?;
    }
    Ok(())
}

pub fn register_bloom_functions(conn: &Connection, default_size: usize) -> ExtResult<()> {
    conn.create_aggregate_function("bloomfilter", -1, flags(), BloomAggregate { default_size })?;

    conn.create_scalar_function("bloomfilter_contains", 2, flags(), |ctx| {
        let buffer = match arg(ctx, 1) {
            SqlValue::Null => return Ok(None),
            other => blob_arg("bloomfilter_contains", &other)?,
        };
        let filter = BloomFilter::from_buffer(&buffer)?;
        let found = arg(ctx, 0)
            .key_bytes()
            .map(|k| filter.contains(&k))
            .unwrap_or(false);
        Ok(Some(found))
    })?;

    conn.create_scalar_function("bloomfilter_add", 2, flags(), |ctx| {
        let buffer = match arg(ctx, 1) {
            SqlValue::Null => return Ok(None),
            other => blob_arg("bloomfilter_add", &other)?,
        };
        let mut filter = BloomFilter::from_buffer(&buffer)?;
        if let Some(key) = arg(ctx, 0).key_bytes() {
            filter.add(&key);
        }
        Ok(Some(filter.to_buffer()))
    })?;

    conn.create_scalar_function("bloomfilter_calculate_size", 2, flags(), |ctx| {
        let n = arg(ctx, 0).as_f64().ok_or_else(|| {
            ExtError::Validation("bloomfilter_calculate_size() n must be numeric".to_string())
        })?;
        let p = arg(ctx, 1).as_f64().ok_or_else(|| {
            ExtError::Validation("bloomfilter_calculate_size() p must be numeric".to_string())
        })?;
        let bits = BloomFilter::calculate_size(n, p)?;
        Ok(i64::try_from(bits).unwrap_or(i64::MAX))
    })?;
    Ok(())
}

/// `bloomfilter(key [, size])`: builds a filter over every non-NULL key in
/// the group.
struct BloomAggregate {
    default_size: usize,
}

impl Aggregate<BloomSession, Option<Vec<u8>>> for BloomAggregate {
    fn init(&self, _ctx: &mut Context<'_>) -> rusqlite::Result<BloomSession> {
        Ok(BloomSession::new(self.default_size))
    }

    fn step(&self, ctx: &mut Context<'_>, session: &mut BloomSession) -> rusqlite::Result<()> {
        check_arity("bloomfilter", ctx, 1, 2)?;
        let size = if ctx.len() > 1 {
            let raw = arg(ctx, 1);
            let size = raw.as_i64().filter(|s| *s > 0).ok_or_else(|| {
                ExtError::Validation(format!("bloomfilter() size must be a positive integer, got {}", raw))
            })?;
            Some(size as usize)
        } else {
            None
        };
        session.step(&arg(ctx, 0), size)?;
        Ok(())
    }

    fn finalize(
        &self,
        _ctx: &mut Context<'_>,
        session: Option<BloomSession>,
    ) -> rusqlite::Result<Option<Vec<u8>>> {
        Ok(session.and_then(BloomSession::finalize))
    }
}
