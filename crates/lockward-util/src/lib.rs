//! Shared utilities for Lockward.
//!
//! This crate provides the cross-cutting pieces used by the other Lockward
//! crates: the unified error type and the filesystem helpers that turn I/O
//! failures into it.

pub mod errors;
pub mod fs;
