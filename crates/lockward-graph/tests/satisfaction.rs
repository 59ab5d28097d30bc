use lockward_core::manifest::PackageManifest;
use lockward_graph::edge::{EdgeResolver, EdgeState, EdgeType};
use lockward_graph::graph::{Graph, NewNode};
use lockward_util::errors::LockwardError;
use serde_json::json;

fn app() -> Graph {
    Graph::new(PackageManifest {
        name: Some("app".into()),
        version: Some("1.0.0".into()),
        ..PackageManifest::default()
    })
}

fn pkg(name: &str, version: &str) -> NewNode {
    NewNode {
        name: name.to_string(),
        version: Some(version.to_string()),
        ..NewNode::default()
    }
}

#[test]
fn no_rule_means_raw_spec() {
    let mut g = app();
    let root = g.root();
    let a = g.add_node(root, pkg("a", "1.0.0")).unwrap();
    let specs = ["^1.0.0", "latest", "file:../a", "npm:other@^2.0.0", "user/repo#main"];
    for (i, spec) in specs.iter().enumerate() {
        let e = g
            .add_edge(a, EdgeType::Prod, &format!("dep{i}"), spec)
            .unwrap();
        assert_eq!(g.effective_spec(e).unwrap(), *spec);
    }
}

#[test]
fn narrow_override_excludes_the_replaced_version() {
    let mut g = app();
    let root = g.root();
    g.set_overrides(Some(&json!({ "pkg@8.23.0": "9.0.0" })))
        .unwrap();
    let e = g.add_edge(root, EdgeType::Prod, "pkg", "^8.0.0").unwrap();
    assert_eq!(g.effective_spec(e).unwrap(), "9.0.0");

    for (version, expected) in [("9.0.0", true), ("8.24.0", true), ("8.23.0", false)] {
        let node = g.add_node(root, pkg("pkg", version)).unwrap();
        assert_eq!(
            g.is_satisfied_by(e, node).unwrap(),
            expected,
            "pkg@{version}"
        );
    }
    assert_eq!(g.error_state(e).unwrap(), EdgeState::Invalid);
}

#[test]
fn plain_dependency_is_ok() {
    let mut g = app();
    let root = g.root();
    let a = g.add_node(root, pkg("a", "1.0.0")).unwrap();
    let lodash = g.add_node(root, pkg("lodash", "4.17.21")).unwrap();
    g.add_edge(root, EdgeType::Prod, "a", "^1.0.0").unwrap();
    let e = g.add_edge(a, EdgeType::Prod, "lodash", "^4.0.0").unwrap();

    assert_eq!(g.edge(e).unwrap().to(), Some(lodash));
    assert!(g.is_satisfied_by(e, lodash).unwrap());
    assert_eq!(g.error_state(e).unwrap(), EdgeState::Ok);
}

#[test]
fn peer_inside_its_requester_is_local() {
    let mut g = app();
    let root = g.root();
    let a = g.add_node(root, pkg("a", "1.0.0")).unwrap();
    g.add_node(a, pkg("react", "18.0.0")).unwrap();
    g.add_edge(root, EdgeType::Prod, "a", "^1.0.0").unwrap();
    let e = g.add_edge(a, EdgeType::Peer, "react", "^18.0.0").unwrap();
    assert_eq!(g.error_state(e).unwrap(), EdgeState::PeerLocal);
}

#[test]
fn root_peers_are_never_local() {
    let mut g = app();
    let root = g.root();
    g.add_node(root, pkg("react", "18.0.0")).unwrap();
    let e = g.add_edge(root, EdgeType::Peer, "react", "^18.0.0").unwrap();
    assert_eq!(g.error_state(e).unwrap(), EdgeState::Ok);
}

#[test]
fn literal_override_replaces_the_range() {
    let mut g = app();
    let root = g.root();
    g.set_overrides(Some(&json!({ "lodash": "3.10.1" }))).unwrap();
    let e = g.add_edge(root, EdgeType::Prod, "lodash", "^4.0.0").unwrap();
    assert_eq!(g.effective_spec(e).unwrap(), "3.10.1");

    let old = g.add_node(root, pkg("lodash", "3.10.1")).unwrap();
    assert!(g.is_satisfied_by(e, old).unwrap());
    assert_eq!(g.error_state(e).unwrap(), EdgeState::Ok);

    let new = g.add_node(root, pkg("lodash", "4.17.21")).unwrap();
    assert!(!g.is_satisfied_by(e, new).unwrap());
    assert_eq!(g.error_state(e).unwrap(), EdgeState::Invalid);
}

#[test]
fn wildcard_value_keeps_the_raw_spec() {
    let mut g = app();
    let root = g.root();
    g.set_overrides(Some(&json!({ "a": { "b": "2.0.0" } })))
        .unwrap();
    let e = g.add_edge(root, EdgeType::Prod, "a", "^1.0.0").unwrap();
    assert_eq!(g.effective_spec(e).unwrap(), "^1.0.0");
}

#[test]
fn back_reference_resolves_through_root_tables() {
    let mut g = Graph::new(PackageManifest {
        dev_dependencies: [("lodash".to_string(), "^4.17.0".to_string())].into(),
        ..PackageManifest::default()
    });
    let root = g.root();
    g.set_overrides(Some(&json!({ "lodash": "$lodash" }))).unwrap();
    let a = g.add_node(root, pkg("a", "1.0.0")).unwrap();
    let e = g.add_edge(a, EdgeType::Prod, "lodash", "^3.0.0").unwrap();
    g.add_edge(root, EdgeType::Prod, "a", "*").unwrap();
    assert_eq!(g.effective_spec(e).unwrap(), "^4.17.0");
}

#[test]
fn unresolved_back_reference_is_fatal() {
    let mut g = app();
    let root = g.root();
    g.set_overrides(Some(&json!({ "lodash": "$lodash" }))).unwrap();
    let e = g.add_edge(root, EdgeType::Prod, "lodash", "^4.0.0").unwrap();
    g.add_node(root, pkg("lodash", "4.17.21")).unwrap();

    let err = g.effective_spec(e).unwrap_err();
    assert!(matches!(
        err,
        LockwardError::UnresolvedOverrideReference { ref reference } if reference == "lodash"
    ));
    assert!(g.error_state(e).is_err());
}

#[test]
fn reference_root_replaces_the_graph_root() {
    let mut g = app();
    let root = g.root();
    g.set_overrides(Some(&json!({ "lodash": "$lodash" }))).unwrap();
    let e = g.add_edge(root, EdgeType::Prod, "lodash", "^4.0.0").unwrap();
    assert!(g.effective_spec(e).is_err());

    g.set_reference_root(PackageManifest {
        dependencies: [("lodash".to_string(), "4.17.21".to_string())].into(),
        ..PackageManifest::default()
    });
    assert_eq!(g.effective_spec(e).unwrap(), "4.17.21");
}

#[test]
fn override_keys_match_by_intersection() {
    let mut g = app();
    let root = g.root();
    g.set_overrides(Some(&json!({ "pkg@^2.0.0": "2.5.0" }))).unwrap();
    let a = g.add_node(root, pkg("a", "1.0.0")).unwrap();
    let b = g.add_node(root, pkg("b", "1.0.0")).unwrap();
    g.add_edge(root, EdgeType::Prod, "a", "*").unwrap();
    g.add_edge(root, EdgeType::Prod, "b", "*").unwrap();
    let matching = g.add_edge(a, EdgeType::Prod, "pkg", ">=2.1.0 <3").unwrap();
    let disjoint = g.add_edge(b, EdgeType::Prod, "pkg", "^1.0.0").unwrap();
    let tagged = g.add_edge(root, EdgeType::Prod, "pkg", "next").unwrap();

    assert_eq!(g.effective_spec(matching).unwrap(), "2.5.0");
    assert_eq!(g.effective_spec(disjoint).unwrap(), "^1.0.0");
    assert_eq!(g.effective_spec(tagged).unwrap(), "2.5.0");
}

#[test]
fn oversized_version_components_are_invalid() {
    let mut g = app();
    let root = g.root();
    g.add_node(root, pkg("x", "1.0.0")).unwrap();
    let caret = g
        .add_edge(root, EdgeType::Prod, "x", "^18446744073709551615.0.0")
        .unwrap();
    assert_eq!(g.error_state(caret).unwrap(), EdgeState::Invalid);

    g.add_node(root, pkg("y", "1.0.0")).unwrap();
    let tilde = g
        .add_edge(root, EdgeType::Prod, "y", "~1.18446744073709551615")
        .unwrap();
    assert_eq!(g.error_state(tilde).unwrap(), EdgeState::Invalid);
}
