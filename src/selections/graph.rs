// src/selections/graph.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Dfs, Reversed};

use crate::errors::{LaunchError, Result};
use crate::selections::model::{Selection, Selections};

/// Selections reachable from the root, dependencies before dependents.
///
/// Fails if the root is missing, if an edge names an interface with no
/// selection, or if the dependency graph has a cycle.
pub fn binding_order(sels: &Selections) -> Result<Vec<&Selection>> {
    let root = sels.root()?;

    // Edge direction: dependency -> dependent, so a toposort lists
    // dependencies first.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for sel in sels.iter() {
        graph.add_node(sel.interface.as_str());
    }

    for sel in sels.iter() {
        for dep in sel.dependencies.iter() {
            if sels.get(&dep.interface).is_none() {
                return Err(LaunchError::MissingSelection(format!(
                    "{} (required by {})",
                    dep.interface, sel.interface
                )));
            }
            graph.add_edge(dep.interface.as_str(), sel.interface.as_str(), ());
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| {
        LaunchError::SelectionCycle(format!(
            "dependency cycle involving interface '{}'",
            cycle.node_id()
        ))
    })?;

    // Walk dependencies from the root: against the edge direction.
    let mut reachable = std::collections::HashSet::new();
    let reversed = Reversed(&graph);
    let mut dfs = Dfs::new(reversed, root.interface.as_str());
    while let Some(node) = dfs.next(reversed) {
        reachable.insert(node);
    }

    Ok(order
        .into_iter()
        .filter(|iface| reachable.contains(iface))
        .filter_map(|iface| sels.get(iface))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selections::model::Dependency;

    fn sel(iface: &str, deps: &[&str]) -> Selection {
        let mut s = Selection::new(iface, format!("sha256={iface}"));
        s.dependencies = deps.iter().map(|d| Dependency::new(*d)).collect();
        s
    }

    fn interfaces(order: &[&Selection]) -> Vec<String> {
        order.iter().map(|s| s.interface.clone()).collect()
    }

    #[test]
    fn dependencies_come_first_and_unreachable_are_skipped() {
        let mut sels = Selections::new("app");
        sels.insert(sel("app", &["lib", "runtime"]));
        sels.insert(sel("lib", &["runtime"]));
        sels.insert(sel("runtime", &[]));
        sels.insert(sel("unused", &["runtime"]));

        let order = interfaces(&binding_order(&sels).unwrap());
        assert_eq!(order.len(), 3);
        assert_eq!(order.last().map(String::as_str), Some("app"));

        let pos = |name: &str| order.iter().position(|i| i == name).unwrap();
        assert!(pos("runtime") < pos("lib"));
        assert!(!order.contains(&"unused".to_string()));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut sels = Selections::new("app");
        sels.insert(sel("app", &["ghost"]));

        let err = binding_order(&sels).unwrap_err();
        assert!(matches!(err, LaunchError::MissingSelection(ref m) if m.contains("ghost")));
    }

    #[test]
    fn cycle_is_rejected() {
        let mut sels = Selections::new("a");
        sels.insert(sel("a", &["b"]));
        sels.insert(sel("b", &["a"]));

        assert!(matches!(
            binding_order(&sels),
            Err(LaunchError::SelectionCycle(_))
        ));
    }
}
