// tests/property_dag.rs

use std::collections::HashSet;

use assetflow::asset::AssetGraph;
use assetflow::dag::{DagGraph, RunState, RunTracker, plan};
use assetflow::engine::{OrchestratorCore, OrchestratorEvent};
use assetflow::types::ErrorStrategy;
use assetflow_test_utils::builders::asset;
use proptest::prelude::*;

/// Random DAG: asset `i` may only depend on assets with a lower index.
fn dag_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..12).prop_flat_map(|n| {
        (0..n)
            .map(|i| proptest::collection::vec(0..i.max(1), 0..=i.min(3)))
            .collect::<Vec<_>>()
            .prop_map(|deps| {
                deps.into_iter()
                    .enumerate()
                    .map(|(i, d)| {
                        let mut d: Vec<usize> = d.into_iter().filter(|dep| *dep < i).collect();
                        d.sort_unstable();
                        d.dedup();
                        d
                    })
                    .collect()
            })
    })
}

fn build(deps: &[Vec<usize>]) -> AssetGraph {
    let mut builder = AssetGraph::builder("prop");
    // Declare in reverse so declaration order never matches topological order.
    for i in (0..deps.len()).rev() {
        let names: Vec<String> = deps[i].iter().map(|d| format!("n{}", d)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        builder = builder.asset_after(asset(&format!("n{i}")), &refs);
    }
    builder.build().unwrap()
}

proptest! {
    #[test]
    fn prop_plan_respects_every_dependency(deps in dag_strategy()) {
        let graph = build(&deps);
        let plan = plan(&graph, &[]).unwrap();
        prop_assert_eq!(plan.len(), deps.len());

        for (i, ds) in deps.iter().enumerate() {
            let me = plan.position(&format!("n{i}")).unwrap();
            for d in ds {
                let dep_name = format!("n{d}");
                prop_assert!(plan.position(&dep_name).unwrap() < me);
            }
        }
    }

    #[test]
    fn prop_targets_pull_in_exactly_their_upstream(deps in dag_strategy(), pick in any::<prop::sample::Index>()) {
        let graph = build(&deps);
        let target = pick.index(deps.len());

        let mut expected = HashSet::new();
        let mut stack = vec![target];
        while let Some(i) = stack.pop() {
            if expected.insert(format!("n{i}")) {
                stack.extend(deps[i].iter().copied());
            }
        }

        let plan = plan(&graph, &[format!("n{target}")]).unwrap();
        let got: HashSet<String> = plan.order().iter().cloned().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_core_completes_every_asset_within_worker_cap(
        deps in dag_strategy(),
        workers in 1usize..4,
        picks in proptest::collection::vec(any::<prop::sample::Index>(), 64),
    ) {
        let graph = build(&deps);
        let plan = plan(&graph, &[]).unwrap();
        let tracker = RunTracker::new(
            DagGraph::from_asset_graph(&graph),
            &plan,
            &HashSet::new(),
            ErrorStrategy::FailFast,
        );
        let mut core = OrchestratorCore::new(tracker, workers);

        let mut running: Vec<String> = core.start().dispatched();
        let mut completed: Vec<String> = Vec::new();
        let mut pick = picks.iter().cycle();

        while !running.is_empty() {
            prop_assert!(running.len() <= workers);
            let idx = pick.next().unwrap().index(running.len());
            let name = running.swap_remove(idx);

            // Every dependency finished before this asset.
            let i: usize = name[1..].parse().unwrap();
            for d in &deps[i] {
                let dep_name = format!("n{d}");
                prop_assert!(completed.contains(&dep_name));
            }

            completed.push(name.clone());
            let step = core.step(OrchestratorEvent::AssetCompleted { asset: name, success: true });
            running.extend(step.dispatched());
        }

        prop_assert!(core.is_finished());
        prop_assert_eq!(completed.len(), deps.len());
        for i in 0..deps.len() {
            prop_assert_eq!(core.tracker().state_of(&format!("n{i}")), Some(RunState::DoneSuccess));
        }
    }
}
