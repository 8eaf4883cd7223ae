//! Compact persistent indices over sets of 64-bit node identifiers
//!
//! Identifiers are collected per feature in [`builder::ChunkedIdBuffer`]s,
//! sorted and deduplicated by [`sort::sort_and_unique_chunks`] (in memory or
//! with an external k-way merge), and written by the [`writers`] as either a
//! raw sorted `u64` array or a roaring bitmap. The [`index`] module loads them
//! back behind the common [`index::NodeIndex`] trait.

pub mod base;
pub mod builder;
pub mod error;
pub mod handler;
pub mod index;
pub mod schema;
pub mod sort;
pub mod utils;
pub mod writers;

pub use base::NodeId;
pub use error::{Error, Result};
