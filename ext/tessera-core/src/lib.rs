//!
//! tessera-core - Shared Extension Types
//!
//! This crate provides the types shared across all tessera extension crates:
//!
//! - `SqlValue`, the tagged union used for every value crossing the
//!   engine boundary (Null/Integer/Float/Text/Blob)
//! - `ExtError`, the error taxonomy (validation, not-found, state, engine, busy)
//! - Binary codec helpers for engine-produced 32-bit word buffers and the
//!   table-function index string
//! - `ExtensionConfig`, loaded from TOML
//!

pub mod codec;
pub mod config;
pub mod error;
pub mod value;

pub use codec::*;
pub use config::*;
pub use error::*;
pub use value::*;
