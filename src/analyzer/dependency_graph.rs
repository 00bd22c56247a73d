use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ResolverError, Result};

/// Coarse ordering of components by how much the rest of the system relies on them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyTier {
    /// No dependencies of its own
    Foundation,
    /// Depends on something and is depended upon
    Integration,
    /// Everything else, including components outside the graph
    Application,
}

impl fmt::Display for DependencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyTier::Foundation => write!(f, "foundation"),
            DependencyTier::Integration => write!(f, "integration"),
            DependencyTier::Application => write!(f, "application"),
        }
    }
}

/// Static `component -> dependencies` map.
///
/// Invariants: no component lists itself, and every dependency is itself a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraph {
    edges: BTreeMap<String, Vec<String>>,
}

fn standard_edges() -> BTreeMap<String, Vec<String>> {
    let edges: [(&str, &[&str]); 7] = [
        ("iam_roles", &[]),
        ("lambda_layers", &[]),
        ("dynamodb", &["iam_roles"]),
        ("openai_client", &["lambda_layers"]),
        ("lambda_functions", &["lambda_layers", "iam_roles", "openai_client", "dynamodb"]),
        ("step_functions", &["lambda_functions", "iam_roles"]),
        ("api_gateway", &["step_functions", "iam_roles"]),
    ];

    edges
        .iter()
        .map(|(component, deps)| {
            (
                component.to_string(),
                deps.iter().map(|d| d.to_string()).collect(),
            )
        })
        .collect()
}

impl DependencyGraph {
    pub fn new(edges: BTreeMap<String, Vec<String>>) -> Result<Self> {
        for (component, deps) in &edges {
            if deps.iter().any(|d| d == component) {
                return Err(ResolverError::dependency_graph(format!(
                    "component '{}' depends on itself",
                    component
                )));
            }
            if let Some(missing) = deps.iter().find(|d| !edges.contains_key(d.as_str())) {
                return Err(ResolverError::dependency_graph(format!(
                    "component '{}' depends on unknown component '{}'",
                    component, missing
                )));
            }
        }
        Ok(Self { edges })
    }

    /// Graph of the serverless document-processing application.
    pub fn standard() -> Self {
        Self {
            edges: standard_edges(),
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn contains(&self, component: &str) -> bool {
        self.edges.contains_key(component)
    }

    /// Direct dependencies; empty for components outside the graph.
    pub fn dependencies(&self, component: &str) -> &[String] {
        self.edges.get(component).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Components that list `component` as a dependency.
    pub fn dependents(&self, component: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(other, deps)| other.as_str() != component && deps.iter().any(|d| d == component))
            .map(|(other, _)| other.as_str())
            .collect()
    }

    pub fn fan_in(&self, component: &str) -> usize {
        self.dependents(component).len()
    }

    pub fn tier(&self, component: &str) -> DependencyTier {
        if !self.contains(component) {
            return DependencyTier::Application;
        }
        if self.dependencies(component).is_empty() {
            DependencyTier::Foundation
        } else if self.fan_in(component) > 0 {
            DependencyTier::Integration
        } else {
            DependencyTier::Application
        }
    }

    pub fn as_map(&self) -> &BTreeMap<String, Vec<String>> {
        &self.edges
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_graph_is_closed_world() {
        assert!(DependencyGraph::new(standard_edges()).is_ok());
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut edges = BTreeMap::new();
        edges.insert("a".to_string(), vec!["a".to_string()]);
        assert!(DependencyGraph::new(edges).is_err());
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let mut edges = BTreeMap::new();
        edges.insert("a".to_string(), vec!["ghost".to_string()]);
        let err = DependencyGraph::new(edges).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_tiers() {
        let graph = DependencyGraph::standard();
        assert_eq!(graph.tier("lambda_layers"), DependencyTier::Foundation);
        assert_eq!(graph.tier("iam_roles"), DependencyTier::Foundation);
        assert_eq!(graph.tier("openai_client"), DependencyTier::Integration);
        assert_eq!(graph.tier("step_functions"), DependencyTier::Integration);
        assert_eq!(graph.tier("api_gateway"), DependencyTier::Application);
        assert_eq!(graph.tier("unknown_component"), DependencyTier::Application);
    }

    #[test]
    fn test_fan_in() {
        let graph = DependencyGraph::standard();
        assert_eq!(graph.fan_in("iam_roles"), 4);
        assert_eq!(graph.fan_in("api_gateway"), 0);
        assert!(graph.dependencies("nowhere").is_empty());
    }
}
