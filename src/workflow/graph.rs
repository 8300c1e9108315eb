//! Graph construction, validation and topological layering.

use super::node::DependentResourceNode;
use crate::error::{OperatorError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Immutable DAG of dependent-resource nodes.
///
/// Nodes are addressed by index; `layers[0]` holds the nodes without
/// dependencies and every node sits one layer below its deepest dependency.
#[derive(Debug)]
pub struct WorkflowGraph {
    nodes: Vec<Arc<DependentResourceNode>>,
    index: HashMap<String, usize>,
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
    layers: Vec<Vec<usize>>,
}

impl WorkflowGraph {
    /// Validates the nodes and derives the layering.
    ///
    /// Fails on duplicate or empty names, unknown dependencies, cycles, and
    /// delete postconditions on nodes that can never be deleted.
    pub fn build(nodes: Vec<DependentResourceNode>) -> Result<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if node.name.trim().is_empty() {
                return Err(OperatorError::invalid_workflow(
                    "dependent resource nodes must have a non-empty name",
                ));
            }
            if index.insert(node.name.clone(), position).is_some() {
                return Err(OperatorError::invalid_workflow(format!(
                    "duplicate dependent resource name '{}'",
                    node.name
                )));
            }
            let capabilities = node.capabilities();
            if node.has_delete_postcondition()
                && !capabilities.deletable
                && !capabilities.garbage_collected
            {
                return Err(OperatorError::invalid_workflow(format!(
                    "'{}' has a delete postcondition but cannot be deleted",
                    node.name
                )));
            }
        }

        let mut parents = vec![Vec::new(); nodes.len()];
        let mut children = vec![Vec::new(); nodes.len()];
        for (position, node) in nodes.iter().enumerate() {
            let mut seen = HashSet::new();
            for dependency in &node.depends_on {
                let parent = *index.get(dependency).ok_or_else(|| {
                    OperatorError::invalid_workflow(format!(
                        "'{}' depends on unknown dependent resource '{dependency}'",
                        node.name
                    ))
                })?;
                if seen.insert(parent) {
                    parents[position].push(parent);
                    children[parent].push(position);
                }
            }
        }

        let layers = layer(&nodes, &parents, &children)?;
        debug!(
            nodes = nodes.len(),
            layers = layers.len(),
            "Built workflow graph"
        );

        Ok(Self {
            nodes: nodes.into_iter().map(Arc::new).collect(),
            index,
            parents,
            children,
            layers,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&Arc<DependentResourceNode>> {
        self.index.get(name).map(|&position| &self.nodes[position])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<DependentResourceNode>> {
        self.nodes.iter()
    }

    /// Node names grouped by layer, in execution order.
    pub fn layer_names(&self) -> Vec<Vec<&str>> {
        self.layers
            .iter()
            .map(|layer| layer.iter().map(|&i| self.nodes[i].name()).collect())
            .collect()
    }

    /// Nodes without dependencies.
    pub fn top_level_nodes(&self) -> Vec<&str> {
        self.names_where(|position| self.parents[position].is_empty())
    }

    /// Nodes nothing depends on; cleanup starts here.
    pub fn bottom_level_nodes(&self) -> Vec<&str> {
        self.names_where(|position| self.children[position].is_empty())
    }

    pub fn has_cleaner(&self) -> bool {
        self.nodes
            .iter()
            .any(|node| node.capabilities().requires_explicit_delete())
    }

    pub(crate) fn layers(&self) -> &[Vec<usize>] {
        &self.layers
    }

    pub(crate) fn node_at(&self, position: usize) -> &Arc<DependentResourceNode> {
        &self.nodes[position]
    }

    pub(crate) fn parents_of(&self, position: usize) -> &[usize] {
        &self.parents[position]
    }

    pub(crate) fn children_of(&self, position: usize) -> &[usize] {
        &self.children[position]
    }

    fn names_where(&self, predicate: impl Fn(usize) -> bool) -> Vec<&str> {
        (0..self.nodes.len())
            .filter(|&position| predicate(position))
            .map(|position| self.nodes[position].name())
            .collect()
    }
}

/// Kahn's algorithm, one wave per layer.
fn layer(
    nodes: &[DependentResourceNode],
    parents: &[Vec<usize>],
    children: &[Vec<usize>],
) -> Result<Vec<Vec<usize>>> {
    let mut remaining: Vec<usize> = parents.iter().map(Vec::len).collect();
    let mut current: Vec<usize> = (0..nodes.len()).filter(|&i| remaining[i] == 0).collect();
    let mut layers = Vec::new();
    let mut placed = 0;

    while !current.is_empty() {
        let mut next = Vec::new();
        for &position in &current {
            for &child in &children[position] {
                remaining[child] -= 1;
                if remaining[child] == 0 {
                    next.push(child);
                }
            }
        }
        placed += current.len();
        layers.push(std::mem::replace(&mut current, next));
    }

    if placed != nodes.len() {
        let mut cyclic: Vec<&str> = (0..nodes.len())
            .filter(|&i| remaining[i] > 0)
            .map(|i| nodes[i].name())
            .collect();
        cyclic.sort_unstable();
        return Err(OperatorError::invalid_workflow(format!(
            "dependency cycle detected among [{}]",
            cyclic.join(", ")
        )));
    }

    Ok(layers)
}
