//! Dependency ordering and inclusion filtering of discovered Configs
//!
//! Dependency rules map a glob over identity labels to the globs it depends
//! on. Every Config matching a rule key depends on every Config matching one
//! of its values, and dependencies are ordered first.

use crate::config::model::Config;
use crate::error::{ConfigError, ExecutionError, Result};
use globset::{GlobBuilder, GlobMatcher};
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Deserializer};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::Arc;
use tracing::debug;

/// Order `configs` so that dependencies precede their dependents.
///
/// Configs unconstrained by any rule keep their discovery order. A cycle is
/// reported as [`ExecutionError::DependencyCycle`] naming its members.
pub fn order_configs(
    configs: Vec<Arc<Config>>,
    dependencies: &BTreeMap<String, Vec<String>>,
) -> Result<Vec<Arc<Config>>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..configs.len()).map(|i| graph.add_node(i)).collect();
    let identities: Vec<&str> = configs.iter().map(|c| identity(c)).collect();

    for (dependent_pattern, dependency_patterns) in dependencies {
        let dependents = matching(&identities, dependent_pattern)?;
        for dependency_pattern in dependency_patterns {
            let targets = matching(&identities, dependency_pattern)?;
            for &dependent in &dependents {
                for &dependency in &targets {
                    if dependent == dependency {
                        continue;
                    }
                    debug!(
                        dependent = identities[dependent],
                        dependency = identities[dependency],
                        "dependency edge"
                    );
                    // Edges point from dependency to dependent: execution order
                    graph.update_edge(nodes[dependency], nodes[dependent], ());
                }
            }
        }
    }

    let order = topological_order(&graph)
        .map_err(|members| ExecutionError::DependencyCycle(
            members.into_iter().map(|i| identities[i].to_string()).collect(),
        ))?;

    let mut slots: Vec<Option<Arc<Config>>> = configs.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Kahn's algorithm, always releasing the earliest discovered ready node.
///
/// On a cycle, returns the members of every non-trivial strongly connected component.
fn topological_order(graph: &DiGraph<usize, ()>) -> std::result::Result<Vec<usize>, Vec<usize>> {
    let mut indegree: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = graph
        .node_indices()
        .filter(|n| indegree[n.index()] == 0)
        .map(|n| Reverse(n.index()))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(Reverse(index)) = ready.pop() {
        order.push(graph[NodeIndex::new(index)]);
        for next in graph.neighbors_directed(NodeIndex::new(index), Direction::Outgoing) {
            indegree[next.index()] -= 1;
            if indegree[next.index()] == 0 {
                ready.push(Reverse(next.index()));
            }
        }
    }

    if order.len() == graph.node_count() {
        return Ok(order);
    }

    let mut members: Vec<usize> = algo::tarjan_scc(graph)
        .into_iter()
        .filter(|component| component.len() > 1)
        .flatten()
        .map(|n| graph[n])
        .collect();
    members.sort_unstable();
    Err(members)
}

fn identity(config: &Config) -> &str {
    config.pathspec().unwrap_or(".")
}

fn matching(identities: &[&str], pattern: &str) -> Result<Vec<usize>> {
    let matcher = compile(pattern)?;
    Ok(identities
        .iter()
        .enumerate()
        .filter(|(_, id)| matcher.is_match(id))
        .map(|(i, _)| i)
        .collect())
}

fn compile(pattern: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            error: e.to_string(),
        })?;
    Ok(glob.compile_matcher())
}

/// Label filter applied after ordering.
///
/// Each label key maps to alternative groups of values. A Config passes when,
/// for every key, some group has all of its values among the Config's values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inclusion(BTreeMap<String, Vec<Vec<String>>>);

impl Inclusion {
    /// Build from `key -> ["a,b", "c"]` style groups. A group without any
    /// value is dropped; it would otherwise match every Config.
    pub fn from_groups<I, K, G>(groups: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<G>)>,
        K: Into<String>,
        G: AsRef<str>,
    {
        Inclusion(
            groups
                .into_iter()
                .map(|(key, alternatives)| {
                    let alternatives = alternatives
                        .iter()
                        .map(|group| {
                            group
                                .as_ref()
                                .split(',')
                                .map(str::trim)
                                .filter(|token| !token.is_empty())
                                .map(str::to_string)
                                .collect::<Vec<_>>()
                        })
                        .filter(|group| !group.is_empty())
                        .collect();
                    (key.into(), alternatives)
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, config: &Config) -> bool {
        self.0.iter().all(|(key, alternatives)| {
            let values = config.label(key);
            alternatives
                .iter()
                .any(|group| group.iter().all(|token| values.contains(token)))
        })
    }

    /// Keep only the Configs passing the filter, preserving order
    pub fn filter(&self, configs: Vec<Arc<Config>>) -> Vec<Arc<Config>> {
        configs.into_iter().filter(|c| self.matches(c)).collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawGroups {
    One(String),
    Many(Vec<String>),
}

impl<'de> Deserialize<'de> for Inclusion {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, RawGroups>::deserialize(deserializer)?;
        Ok(Inclusion::from_groups(raw.into_iter().map(|(key, groups)| {
            let groups = match groups {
                RawGroups::One(group) => vec![group],
                RawGroups::Many(groups) => groups,
            };
            (key, groups)
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{ConfigSource, PATHSPEC_LABEL};
    use crate::config::types::ConfigDocument;
    use crate::error::CohesionError;

    fn config(pathspec: &str, labels: &[(&str, &[&str])]) -> Arc<Config> {
        let mut document = ConfigDocument::default();
        document
            .labels
            .insert(PATHSPEC_LABEL.to_string(), vec![pathspec.to_string()]);
        for (key, values) in labels {
            document.labels.insert(
                key.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            );
        }
        document.register(format!("/repo/{}", pathspec), ConfigSource::Inline, None)
    }

    fn names(configs: &[Arc<Config>]) -> Vec<&str> {
        configs.iter().map(|c| c.pathspec().unwrap()).collect()
    }

    fn rules(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let configs = vec![config("x", &[]), config("y", &[]), config("z", &[])];
        let deps = rules(&[("x", &["y"]), ("y", &["z"])]);

        let ordered = order_configs(configs, &deps).unwrap();
        assert_eq!(names(&ordered), vec!["z", "y", "x"]);
    }

    #[test]
    fn test_unconstrained_keep_discovery_order() {
        let configs = vec![
            config("a", &[]),
            config("b", &[]),
            config("c", &[]),
            config("d", &[]),
        ];
        let deps = rules(&[("b", &["d"])]);

        let ordered = order_configs(configs, &deps).unwrap();
        assert_eq!(names(&ordered), vec!["a", "c", "d", "b"]);
    }

    #[test]
    fn test_glob_rules_and_self_edges() {
        let configs = vec![
            config("apps/web", &[]),
            config("libs/core", &[]),
            config("libs/ui", &[]),
        ];
        // `libs/*` depending on `libs/core` would give core a self edge
        let deps = rules(&[("apps/*", &["libs/*"]), ("libs/*", &["libs/core"])]);

        let ordered = order_configs(configs, &deps).unwrap();
        assert_eq!(names(&ordered), vec!["libs/core", "libs/ui", "apps/web"]);
    }

    #[test]
    fn test_wildcard_does_not_cross_separator() {
        let configs = vec![config("a/b/c", &[]), config("a/d", &[])];
        let deps = rules(&[("a/*", &["a/*/c"])]);

        let ordered = order_configs(configs, &deps).unwrap();
        assert_eq!(names(&ordered), vec!["a/b/c", "a/d"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let configs = vec![config("x", &[]), config("y", &[]), config("z", &[]), config("w", &[])];
        let deps = rules(&[("x", &["y"]), ("y", &["z"]), ("z", &["x"])]);

        match order_configs(configs, &deps) {
            Err(CohesionError::Execution(ExecutionError::DependencyCycle(members))) => {
                assert_eq!(members, vec!["x", "y", "z"]);
            }
            other => panic!("expected a cycle, got {:?}", other.map(|c| c.len())),
        }
    }

    #[test]
    fn test_inclusion_groups() {
        let prod_east = config("svc", &[("env", &["prod", "east"])]);

        let single = Inclusion::from_groups(vec![("env", vec!["prod,east"])]);
        assert!(single.matches(&prod_east));

        let either = Inclusion::from_groups(vec![("env", vec!["prod,east", "stage"])]);
        assert!(either.matches(&prod_east));

        let west = Inclusion::from_groups(vec![("env", vec!["prod,west"])]);
        assert!(!west.matches(&prod_east));

        let missing_key = Inclusion::from_groups(vec![("team", vec!["core"])]);
        assert!(!missing_key.matches(&prod_east));

        assert!(Inclusion::default().matches(&prod_east));
    }

    #[test]
    fn test_empty_inclusion_groups_match_nothing() {
        let prod_east = config("svc", &[("env", &["prod", "east"])]);

        let blank = Inclusion::from_groups(vec![("env", vec!["", " , "])]);
        assert!(!blank.matches(&prod_east));

        let padded = Inclusion::from_groups(vec![("env", vec!["", "west"])]);
        assert!(!padded.matches(&prod_east));
        assert_eq!(padded, Inclusion::from_groups(vec![("env", vec!["west"])]));
    }

    #[test]
    fn test_inclusion_deserialize() {
        let inclusion: Inclusion = serde_yaml::from_str(
            r#"
env: "prod, east"
team: [core, web]
"#,
        )
        .unwrap();

        assert_eq!(
            inclusion,
            Inclusion::from_groups(vec![
                ("env", vec!["prod,east"]),
                ("team", vec!["core", "web"]),
            ])
        );
    }
}
