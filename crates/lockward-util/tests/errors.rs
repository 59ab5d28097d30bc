use std::path::PathBuf;

use lockward_util::errors::LockwardError;
use miette::Diagnostic;

#[test]
fn test_read_error_names_file() {
    let err = LockwardError::Read {
        what: "lockfile".to_string(),
        path: PathBuf::from("/tmp/package-lock.json"),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
    };
    let s = err.to_string();
    assert!(s.starts_with("Failed to read lockfile at /tmp/package-lock.json"), "got: {s}");
}

#[test]
fn test_manifest_error_display() {
    let err = LockwardError::Manifest {
        message: "bad syntax".to_string(),
    };
    assert_eq!(err.to_string(), "Manifest error: bad syntax");
}

#[test]
fn test_override_config_error_display() {
    let err = LockwardError::OverrideConfig {
        message: "expected an object".to_string(),
    };
    assert_eq!(err.to_string(), "Invalid overrides: expected an object");
}

#[test]
fn test_range_parse_error_display() {
    let err = LockwardError::RangeParse {
        range: "^^1".to_string(),
        message: "unexpected operator".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Invalid version range \"^^1\": unexpected operator"
    );
}

#[test]
fn test_unresolved_reference_display_and_code() {
    let err = LockwardError::UnresolvedOverrideReference {
        reference: "react".to_string(),
    };
    assert_eq!(err.to_string(), "Unable to resolve reference $react");
    let code = err.code().map(|c| c.to_string());
    assert_eq!(
        code.as_deref(),
        Some("lockward::unresolved_override_reference")
    );
    let help = err.help().map(|h| h.to_string()).unwrap_or_default();
    assert!(help.contains("react"), "got: {help}");
}

#[test]
fn test_edge_detached_display() {
    let err = LockwardError::EdgeDetached {
        name: "lodash".to_string(),
    };
    assert_eq!(err.to_string(), "Edge \"lodash\" is detached from the graph");
}
