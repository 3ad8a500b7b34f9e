// tests/asset_graph.rs

use std::collections::HashMap;

use assetflow::asset::{Asset, AssetGraph};
use assetflow::dag::{DagGraph, find_cycle, plan};
use assetflow::errors::FlowError;
use assetflow_test_utils::builders::asset;

fn names(order: &[String]) -> Vec<&str> {
    order.iter().map(String::as_str).collect()
}

#[test]
fn test_empty_asset_name_and_uri_are_rejected() {
    assert!(matches!(
        Asset::new("", "mem://x"),
        Err(FlowError::InvalidAsset(_))
    ));
    assert!(matches!(
        Asset::new("orders", "  "),
        Err(FlowError::InvalidAsset(_))
    ));
}

#[test]
fn test_duplicate_asset_names_are_rejected() {
    let err = AssetGraph::builder("dup")
        .asset(asset("a"))
        .asset(asset("a"))
        .build()
        .unwrap_err();
    assert!(matches!(err, FlowError::DuplicateAsset(name) if name == "a"));
}

#[test]
fn test_unknown_dependency_names_both_assets() {
    let err = AssetGraph::builder("g")
        .asset(asset("a"))
        .asset_after(asset("b"), &["missing"])
        .build()
        .unwrap_err();

    match err {
        FlowError::UnknownDependency { asset, dependency } => {
            assert_eq!(asset, "b");
            assert_eq!(dependency, "missing");
        }
        other => panic!("expected UnknownDependency, got {other:?}"),
    }
}

#[test]
fn test_dependency_entry_for_undeclared_asset_is_rejected() {
    let mut deps = HashMap::new();
    deps.insert("ghost".to_string(), vec!["a".to_string()]);
    let err = AssetGraph::new("g", vec![asset("a")], deps).unwrap_err();
    assert!(matches!(err, FlowError::AssetNotFound(name) if name == "ghost"));
}

#[test]
fn test_cycle_error_reports_the_path() {
    let err = AssetGraph::builder("g")
        .asset_after(asset("a"), &["c"])
        .asset_after(asset("b"), &["a"])
        .asset_after(asset("c"), &["b"])
        .build()
        .unwrap_err();

    match err {
        FlowError::Cycle { path } => {
            assert_eq!(path.first(), path.last());
            assert_eq!(path.len(), 4);
            for name in ["a", "b", "c"] {
                assert!(path.iter().any(|p| p == name), "{name} missing from {path:?}");
            }
        }
        other => panic!("expected Cycle, got {other:?}"),
    }
}

#[test]
fn test_self_dependency_is_a_one_node_cycle() {
    let err = AssetGraph::builder("g")
        .asset_after(asset("a"), &["a"])
        .build()
        .unwrap_err();
    assert!(matches!(err, FlowError::Cycle { path } if path == vec!["a", "a"]));
}

#[test]
fn test_find_cycle_path_follows_dependency_direction() {
    let graph = AssetGraph::builder("g")
        .asset_after(asset("a"), &["b"])
        .asset_after(asset("b"), &["a"])
        .build_unchecked()
        .unwrap();

    let dag = DagGraph::from_asset_graph(&graph);
    let path = find_cycle(&dag).expect("cycle");
    assert_eq!(path, vec!["a", "b", "a"]);
    for pair in path.windows(2) {
        assert!(dag.dependencies_of(&pair[0]).contains(&pair[1]));
    }
}

#[test]
fn test_plan_orders_dependencies_first_with_declaration_tie_break() {
    let graph = AssetGraph::builder("g")
        .asset_after(asset("report"), &["clean", "enrich"])
        .asset(asset("raw"))
        .asset_after(asset("enrich"), &["raw"])
        .asset_after(asset("clean"), &["raw"])
        .build()
        .unwrap();

    let plan = plan(&graph, &[]).unwrap();
    assert_eq!(names(plan.order()), vec!["raw", "enrich", "clean", "report"]);
}

#[test]
fn test_plan_is_deterministic() {
    let build = || {
        AssetGraph::builder("g")
            .asset(asset("x"))
            .asset(asset("y"))
            .asset(asset("z"))
            .asset_after(asset("w"), &["z", "x"])
            .build()
            .unwrap()
    };

    let first = plan(&build(), &[]).unwrap().into_order();
    for _ in 0..10 {
        assert_eq!(plan(&build(), &[]).unwrap().into_order(), first);
    }
    assert_eq!(names(&first), vec!["x", "y", "z", "w"]);
}

#[test]
fn test_plan_with_targets_keeps_only_upstream_closure() {
    let graph = AssetGraph::builder("g")
        .asset(asset("a"))
        .asset_after(asset("b"), &["a"])
        .asset_after(asset("c"), &["a"])
        .asset_after(asset("d"), &["b"])
        .build()
        .unwrap();

    let plan = plan(&graph, &["d".to_string()]).unwrap();
    assert_eq!(names(plan.order()), vec!["a", "b", "d"]);
    assert!(!plan.contains("c"));
}

#[test]
fn test_plan_with_unknown_target_fails() {
    let graph = AssetGraph::builder("g").asset(asset("a")).build().unwrap();
    let err = plan(&graph, &["nope".to_string()]).unwrap_err();
    assert!(matches!(err, FlowError::AssetNotFound(name) if name == "nope"));
}

#[test]
fn test_empty_graph_plans_nothing() {
    let graph = AssetGraph::builder("empty").build().unwrap();
    assert!(graph.is_empty());
    assert!(plan(&graph, &[]).unwrap().is_empty());
}

#[test]
fn test_structural_errors_are_flagged() {
    let err = AssetGraph::builder("g")
        .asset_after(asset("a"), &["a"])
        .build()
        .unwrap_err();
    assert!(err.is_structural());
    assert!(!FlowError::Store("disk full".into()).is_structural());
}
