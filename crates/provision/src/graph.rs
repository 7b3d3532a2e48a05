//! Dependency graph builder
//!
//! Assembles descriptors into a DAG keyed by logical name and computes a
//! deterministic topological order. Apply walks the order forwards, destroy
//! walks the same order backwards, so the two are exact mirrors.

use crate::descriptor::{ResourceDescriptor, ResourceKind};
use crate::error::{Error, Result};
use crate::link::LinkPair;
use std::collections::{BTreeSet, HashMap};

/// Builder collecting descriptors and link pairs in declaration order.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    descriptors: Vec<ResourceDescriptor>,
    links: Vec<LinkPair>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor. Declaration order breaks ties in the topological order.
    pub fn resource(mut self, descriptor: ResourceDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Add several descriptors at once
    pub fn resources(mut self, descriptors: impl IntoIterator<Item = ResourceDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Declare a bidirectional link pair
    pub fn link_pair(mut self, pair: LinkPair) -> Self {
        self.links.push(pair);
        self
    }

    /// Validate and build the graph.
    ///
    /// Fails before anything is provisioned if a name is duplicated, a
    /// dependency is unknown, a link pair is malformed, or a cycle exists.
    pub fn build(self) -> Result<Graph> {
        Graph::new(self.descriptors, self.links)
    }
}

/// A validated, acyclic resource graph.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<ResourceDescriptor>,
    index: HashMap<String, usize>,
    /// Direct dependencies per node, sorted by declaration index
    deps: Vec<Vec<usize>>,
    /// Direct dependents per node, sorted by declaration index
    dependents: Vec<Vec<usize>>,
    /// Topological order (dependencies first)
    order: Vec<usize>,
    links: Vec<LinkPair>,
}

impl Graph {
    fn new(nodes: Vec<ResourceDescriptor>, links: Vec<LinkPair>) -> Result<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.name.clone(), i).is_some() {
                return Err(Error::DuplicateResource {
                    name: node.name.clone(),
                });
            }
        }

        validate_links(&nodes, &index, &links)?;

        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let mut direct = BTreeSet::new();
            for dep in node.dependencies() {
                let &i = index
                    .get(dep)
                    .ok_or_else(|| Error::UnresolvedDependency {
                        resource: node.name.clone(),
                        missing: dep.to_string(),
                    })?;
                direct.insert(i);
            }

            // Link ordering is structural: the reverse phase needs the forward
            // link, mirrors need both phases.
            for pair in &links {
                if pair.reverse == node.name {
                    direct.insert(index[&pair.forward]);
                }
            }
            if let Some(pair_name) = &node.via_link {
                let pair = links
                    .iter()
                    .find(|p| &p.name == pair_name)
                    .ok_or_else(|| Error::InvalidLinkPair {
                        pair: pair_name.clone(),
                        message: format!("{} routes through an undeclared link pair", node.name),
                    })?;
                direct.insert(index[&pair.forward]);
                direct.insert(index[&pair.reverse]);
            }

            deps.push(direct.into_iter().collect());
        }

        let mut dependents = vec![Vec::new(); nodes.len()];
        for (i, node_deps) in deps.iter().enumerate() {
            for &d in node_deps {
                dependents[d].push(i);
            }
        }

        let order = topological_order(&nodes, &deps)?;

        Ok(Self {
            nodes,
            index,
            deps,
            dependents,
            order,
            links,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a descriptor by logical name
    pub fn descriptor(&self, name: &str) -> Option<&ResourceDescriptor> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Descriptors in declaration order
    pub fn descriptors(&self) -> &[ResourceDescriptor] {
        &self.nodes
    }

    /// Declared link pairs
    pub fn links(&self) -> &[LinkPair] {
        &self.links
    }

    /// Logical names in creation order
    pub fn apply_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.nodes[i].name.as_str()).collect()
    }

    /// Logical names in teardown order: exactly the reverse of [`Graph::apply_order`]
    pub fn destroy_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .rev()
            .map(|&i| self.nodes[i].name.as_str())
            .collect()
    }

    /// Direct dependencies of a resource
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.index
            .get(name)
            .map(|&i| self.names(&self.deps[i]))
            .unwrap_or_default()
    }

    /// Direct dependents of a resource
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.index
            .get(name)
            .map(|&i| self.names(&self.dependents[i]))
            .unwrap_or_default()
    }

    /// Every resource that (transitively) depends on `name`, in apply order
    pub fn transitive_dependents(&self, name: &str) -> Vec<&str> {
        let Some(&start) = self.index.get(name) else {
            return Vec::new();
        };
        let mut reached = vec![false; self.nodes.len()];
        let mut stack = vec![start];
        while let Some(i) = stack.pop() {
            for &d in &self.dependents[i] {
                if !reached[d] {
                    reached[d] = true;
                    stack.push(d);
                }
            }
        }
        self.order
            .iter()
            .filter(|&&i| reached[i])
            .map(|&i| self.nodes[i].name.as_str())
            .collect()
    }

    /// Count of descriptors per kind
    pub fn count_kind(&self, kind: ResourceKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }

    fn names(&self, indices: &[usize]) -> Vec<&str> {
        indices
            .iter()
            .map(|&i| self.nodes[i].name.as_str())
            .collect()
    }

    pub(crate) fn node(&self, i: usize) -> &ResourceDescriptor {
        &self.nodes[i]
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn deps(&self, i: usize) -> &[usize] {
        &self.deps[i]
    }

    pub(crate) fn dependents(&self, i: usize) -> &[usize] {
        &self.dependents[i]
    }

    pub(crate) fn order(&self) -> &[usize] {
        &self.order
    }
}

fn validate_links(
    nodes: &[ResourceDescriptor],
    index: &HashMap<String, usize>,
    links: &[LinkPair],
) -> Result<()> {
    let mut seen_pairs = BTreeSet::new();
    let mut claimed = BTreeSet::new();

    for pair in links {
        let invalid = |message: String| Error::InvalidLinkPair {
            pair: pair.name.clone(),
            message,
        };

        if !seen_pairs.insert(pair.name.as_str()) {
            return Err(invalid("declared more than once".into()));
        }
        if pair.forward == pair.reverse {
            return Err(invalid("forward and reverse phase are the same resource".into()));
        }
        for phase in [&pair.forward, &pair.reverse] {
            let &i = index
                .get(phase)
                .ok_or_else(|| invalid(format!("unknown resource {phase}")))?;
            if nodes[i].kind != ResourceKind::ClusterLink {
                return Err(invalid(format!(
                    "{phase} is a {}, not a cluster link",
                    nodes[i].kind
                )));
            }
            if !claimed.insert(phase.as_str()) {
                return Err(invalid(format!("{phase} already belongs to another pair")));
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Visited,
}

/// Depth-first topological sort with visiting/visited marks.
///
/// Roots are taken in declaration order and dependencies are visited in
/// declaration order, so the result is deterministic.
fn topological_order(nodes: &[ResourceDescriptor], deps: &[Vec<usize>]) -> Result<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    let mut path = Vec::new();

    for root in 0..nodes.len() {
        visit(root, nodes, deps, &mut marks, &mut path, &mut order)?;
    }
    Ok(order)
}

fn visit(
    i: usize,
    nodes: &[ResourceDescriptor],
    deps: &[Vec<usize>],
    marks: &mut [Mark],
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<()> {
    match marks[i] {
        Mark::Visited => return Ok(()),
        Mark::Visiting => {
            let start = path.iter().position(|&p| p == i).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..]
                .iter()
                .map(|&p| nodes[p].name.clone())
                .collect();
            cycle.push(nodes[i].name.clone());
            return Err(Error::CycleDetected { cycle });
        }
        Mark::Unvisited => {}
    }

    marks[i] = Mark::Visiting;
    path.push(i);
    for &d in &deps[i] {
        visit(d, nodes, deps, marks, path, order)?;
    }
    path.pop();
    marks[i] = Mark::Visited;
    order.push(i);
    Ok(())
}
