//! Shared utility types for the analysis passes.
//!
//! # Key Components
//!
//! - [`BitSet`] - a dense bit vector used for dominator and member sets

mod bitset;

pub use bitset::BitSet;
