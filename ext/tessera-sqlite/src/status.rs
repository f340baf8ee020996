//!
//! Per-connection runtime counters (`sqlite3_db_status`).
//!

use std::os::raw::c_int;

use rusqlite::{ffi, Connection};

use tessera_core::{ExtError, ExtResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusMetric {
    LookasideUsed,
    CacheUsed,
    SchemaUsed,
    StmtUsed,
    LookasideHit,
    LookasideMissSize,
    LookasideMissFull,
    CacheHit,
    CacheMiss,
    CacheWrite,
    DeferredFks,
    CacheUsedShared,
    CacheSpill,
}

impl StatusMetric {
    pub const ALL: [StatusMetric; 13] = [
        StatusMetric::LookasideUsed,
        StatusMetric::CacheUsed,
        StatusMetric::SchemaUsed,
        StatusMetric::StmtUsed,
        StatusMetric::LookasideHit,
        StatusMetric::LookasideMissSize,
        StatusMetric::LookasideMissFull,
        StatusMetric::CacheHit,
        StatusMetric::CacheMiss,
        StatusMetric::CacheWrite,
        StatusMetric::DeferredFks,
        StatusMetric::CacheUsedShared,
        StatusMetric::CacheSpill,
    ];

    /// Engine operation code (`SQLITE_DBSTATUS_*`).
    pub fn code(&self) -> c_int {
        match self {
            StatusMetric::LookasideUsed => ffi::SQLITE_DBSTATUS_LOOKASIDE_USED,
            StatusMetric::CacheUsed => ffi::SQLITE_DBSTATUS_CACHE_USED,
            StatusMetric::SchemaUsed => ffi::SQLITE_DBSTATUS_SCHEMA_USED,
            StatusMetric::StmtUsed => ffi::SQLITE_DBSTATUS_STMT_USED,
            StatusMetric::LookasideHit => ffi::SQLITE_DBSTATUS_LOOKASIDE_HIT,
            StatusMetric::LookasideMissSize => ffi::SQLITE_DBSTATUS_LOOKASIDE_MISS_SIZE,
            StatusMetric::LookasideMissFull => ffi::SQLITE_DBSTATUS_LOOKASIDE_MISS_FULL,
            StatusMetric::CacheHit => ffi::SQLITE_DBSTATUS_CACHE_HIT,
            StatusMetric::CacheMiss => ffi::SQLITE_DBSTATUS_CACHE_MISS,
            StatusMetric::CacheWrite => ffi::SQLITE_DBSTATUS_CACHE_WRITE,
            StatusMetric::DeferredFks => ffi::SQLITE_DBSTATUS_DEFERRED_FKS,
            StatusMetric::CacheUsedShared => ffi::SQLITE_DBSTATUS_CACHE_USED_SHARED,
            StatusMetric::CacheSpill => ffi::SQLITE_DBSTATUS_CACHE_SPILL,
        }
    }

    pub fn from_code(code: c_int) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.code() == code)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StatusMetric::LookasideUsed => "lookaside_used",
            StatusMetric::CacheUsed => "cache_used",
            StatusMetric::SchemaUsed => "schema_used",
            StatusMetric::StmtUsed => "stmt_used",
            StatusMetric::LookasideHit => "lookaside_hit",
            StatusMetric::LookasideMissSize => "lookaside_miss_size",
            StatusMetric::LookasideMissFull => "lookaside_miss_full",
            StatusMetric::CacheHit => "cache_hit",
            StatusMetric::CacheMiss => "cache_miss",
            StatusMetric::CacheWrite => "cache_write",
            StatusMetric::DeferredFks => "deferred_fks",
            StatusMetric::CacheUsedShared => "cache_used_shared",
            StatusMetric::CacheSpill => "cache_spill",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub current: i64,
    pub highwater: i64,
}

/// Reads one counter. With `reset` the engine zeroes the highwater mark
/// (or the counter itself for hit/miss metrics) after reading.
pub fn db_status(conn: &Connection, metric: StatusMetric, reset: bool) -> ExtResult<StatusSnapshot> {
    let mut current: c_int = 0;
    let mut highwater: c_int = 0;
    let rc = unsafe {
        ffi::sqlite3_db_status(
            conn.handle(),
            metric.code(),
            &mut current,
            &mut highwater,
            reset as c_int,
        )
    };
    if rc != ffi::SQLITE_OK {
        return Err(ExtError::Engine {
            code: rc,
            message: format!("db_status({}) failed", metric.name()),
        });
    }
    Ok(StatusSnapshot {
        current: current as i64,
        highwater: highwater as i64,
    })
}
