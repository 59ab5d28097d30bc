//! Core data types for Lockward.
//!
//! This crate defines the inputs the override-consistency engine works on:
//! classification of raw dependency specs with `deno_semver` ranges, the
//! `package.json` manifest subset, the `package-lock.json` snapshot, and the
//! engine configuration.
//!
//! This crate is intentionally free of graph logic.

pub mod config;
pub mod lockfile;
pub mod manifest;
pub mod spec;
