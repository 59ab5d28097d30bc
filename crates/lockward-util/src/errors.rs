use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all Lockward operations.
///
/// Per-edge problems (missing, invalid, peer-local) are not errors; they are
/// classifications reported by the graph. Only conditions that make the
/// input unusable end up here.
#[derive(Debug, Error, Diagnostic)]
pub enum LockwardError {
    /// A named input file could not be read.
    #[error("Failed to read {what} at {}: {source}", .path.display())]
    Read {
        what: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid or malformed package manifest (package.json).
    #[error("Manifest error: {message}")]
    #[diagnostic(help("Check your package.json for syntax errors"))]
    Manifest { message: String },

    /// Invalid or malformed lockfile snapshot.
    #[error("Lockfile error: {message}")]
    #[diagnostic(help("Regenerate the lockfile with your package manager"))]
    Lockfile { message: String },

    /// Invalid engine configuration (lockward.toml).
    #[error("Config error: {message}")]
    #[diagnostic(help("Check lockward.toml for unknown keys or wrong value types"))]
    Config { message: String },

    /// The `overrides` section has an unusable shape.
    #[error("Invalid overrides: {message}")]
    #[diagnostic(help("Override values must be version strings or nested objects"))]
    OverrideConfig { message: String },

    /// A version range that has to be parsed is not valid npm range syntax.
    #[error("Invalid version range \"{range}\": {message}")]
    RangeParse { range: String, message: String },

    /// A version string that is not valid semver.
    #[error("Invalid version \"{version}\": {message}")]
    VersionParse { version: String, message: String },

    /// An override value of the form `$name` names a package that is not a
    /// direct dependency of the root package.
    #[error("Unable to resolve reference ${reference}")]
    #[diagnostic(
        code(lockward::unresolved_override_reference),
        help("Add \"{reference}\" to the root package's dependencies or use a literal version")
    )]
    UnresolvedOverrideReference { reference: String },

    /// An edge was used after it was detached from the graph.
    #[error("Edge \"{name}\" is detached from the graph")]
    EdgeDetached { name: String },

    /// A structural edit the graph cannot perform.
    #[error("Invalid graph mutation: {message}")]
    InvalidMutation { message: String },

    /// A node identifier that does not belong to this graph.
    #[error("Unknown node id {id}")]
    UnknownNode { id: usize },

    /// An edge identifier that does not belong to this graph.
    #[error("Unknown edge id {id}")]
    UnknownEdge { id: usize },
}

/// Convenience alias used across the Lockward crates.
pub type LockwardResult<T> = Result<T, LockwardError>;
