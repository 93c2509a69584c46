//! Core types for the linkvault short-link resolver.
//!
//! This crate provides the types shared by the cache tiers, the sharded
//! store and the resolver service: validated short codes, shard selection
//! and the stored URL record.

pub mod error;
pub mod record;
pub mod shard;
pub mod shortcode;

pub use error::{CoreError, Result};
pub use record::{validate_origin, UrlRecord, MAX_ORIGIN_LENGTH};
pub use shard::{Shard, BASE62_ALPHABET, SHARD_COUNT};
pub use shortcode::{ShortCode, CODE_LENGTH};
