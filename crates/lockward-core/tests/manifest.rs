use lockward_core::manifest::{BundleDependencies, PackageManifest};
use std::io::Write;
use tempfile::NamedTempFile;

const APP: &str = r#"{
  "name": "app",
  "version": "1.0.0",
  "dependencies": { "lodash": "^4.17.0", "react": "^18.0.0" },
  "devDependencies": { "eslint": "^8.0.0", "react": "^18.2.0" },
  "optionalDependencies": { "fsevents": "^2.3.0" },
  "peerDependencies": { "typescript": ">=5" },
  "peerDependenciesMeta": { "typescript": { "optional": true } },
  "overrides": { "lodash": "3.10.1" }
}"#;

#[test]
fn parse_tables() {
    let m = PackageManifest::parse_json(APP).unwrap();
    assert_eq!(m.name.as_deref(), Some("app"));
    assert_eq!(m.dependencies.len(), 2);
    assert_eq!(m.dev_dependencies["eslint"], "^8.0.0");
    assert_eq!(m.optional_dependencies["fsevents"], "^2.3.0");
    assert!(m.overrides.is_some());
}

#[test]
fn reference_lookup_prefers_dependencies() {
    let m = PackageManifest::parse_json(APP).unwrap();
    assert_eq!(m.lookup_reference("react"), Some("^18.0.0"));
    assert_eq!(m.lookup_reference("eslint"), Some("^8.0.0"));
    assert_eq!(m.lookup_reference("fsevents"), Some("^2.3.0"));
    assert_eq!(m.lookup_reference("typescript"), Some(">=5"));
    assert_eq!(m.lookup_reference("left-pad"), None);
}

#[test]
fn optional_peer_meta() {
    let m = PackageManifest::parse_json(APP).unwrap();
    assert!(m.is_optional_peer("typescript"));
    assert!(!m.is_optional_peer("react"));
}

#[test]
fn bundle_dependencies_forms() {
    let named = PackageManifest::parse_json(
        r#"{ "dependencies": { "a": "1", "b": "1" }, "bundleDependencies": ["a"] }"#,
    )
    .unwrap();
    assert!(named.is_bundled("a"));
    assert!(!named.is_bundled("b"));

    let all = PackageManifest::parse_json(
        r#"{ "dependencies": { "a": "1" }, "bundledDependencies": true }"#,
    )
    .unwrap();
    assert!(matches!(all.bundle_dependencies, BundleDependencies::All(true)));
    assert!(all.is_bundled("a"));
    assert!(!all.is_bundled("zzz"));
}

#[test]
fn from_path_reads_file() {
    let mut tmp = NamedTempFile::new().unwrap();
    tmp.write_all(APP.as_bytes()).unwrap();
    tmp.flush().unwrap();
    let m = PackageManifest::from_path(tmp.path()).unwrap();
    assert_eq!(m.version.as_deref(), Some("1.0.0"));
}

#[test]
fn invalid_json_is_manifest_error() {
    let err = PackageManifest::parse_json("{ not json").unwrap_err();
    assert!(err.to_string().starts_with("Manifest error:"), "got: {err}");
}
