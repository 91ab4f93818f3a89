//! Caching for the forcing pipeline.

pub mod memo;

pub use memo::{EvictionPolicy, MemoCache};
