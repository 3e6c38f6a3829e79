//! Per-branch routing tables built from an edge list.
//!
//! Indexing happens once, when a graph is constructed. Each edge is
//! destructured into indexed entries: node/start edges land in the edge
//! index under every single source they expand to, error edges land in the
//! error index under every error key. Every entry remembers the position of
//! its edge in the original list; error routing is scoped by that position.

use hashbrown::HashMap;

use crate::edge::{
    Edge, EdgeConfig, EdgeSource, ErrorConfig, ErrorSource, Next, NodeConfig, SingleErrorSource,
    SingleSource, Source,
};
use crate::error::BuildError;
use crate::node::NodeRef;

/// An indexed routing record of a node/start edge.
pub struct Entry<T, S> {
    /// The edge's unresolved targets.
    pub next: Next<T, S>,
    /// The edge's config.
    pub config: NodeConfig,
    /// The edge's position in the branch's edge list.
    pub index: usize,
}

impl<T, S> Clone for Entry<T, S> {
    fn clone(&self) -> Self {
        Self {
            next: self.next.clone(),
            config: self.config,
            index: self.index,
        }
    }
}

impl<T, S> core::fmt::Debug for Entry<T, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Entry")
            .field("next", &self.next)
            .field("config", &self.config)
            .field("index", &self.index)
            .finish()
    }
}

/// An indexed routing record of an error edge.
pub struct ErrorEntry<T, S> {
    /// The edge's unresolved targets.
    pub next: Next<T, S>,
    /// The edge's config.
    pub config: ErrorConfig,
    /// The edge's position in the branch's edge list.
    pub index: usize,
}

impl<T, S> Clone for ErrorEntry<T, S> {
    fn clone(&self) -> Self {
        Self {
            next: self.next.clone(),
            config: self.config,
            index: self.index,
        }
    }
}

impl<T, S> core::fmt::Debug for ErrorEntry<T, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ErrorEntry")
            .field("next", &self.next)
            .field("config", &self.config)
            .field("index", &self.index)
            .finish()
    }
}

/// The routing tables of one branch.
pub struct BranchIndex<T, S> {
    edge_index: HashMap<SingleSource<T, S>, Vec<Entry<T, S>>>,
    error_edge_index: HashMap<SingleErrorSource<T, S>, Vec<ErrorEntry<T, S>>>,
}

impl<T, S> BranchIndex<T, S> {
    /// Ingests an edge list into routing tables.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidEdge`] for structurally malformed
    /// edges and [`BuildError::InvalidConfigKind`] when an explicit config
    /// does not match its source kind.
    pub fn build(edges: &[Edge<T, S>]) -> Result<Self, BuildError> {
        let mut index = Self {
            edge_index: HashMap::new(),
            error_edge_index: HashMap::new(),
        };

        for (i, edge) in edges.iter().enumerate() {
            match edge {
                Edge::Chain {
                    source,
                    nodes,
                    next,
                } => index.add_chain(source, nodes, next.as_ref(), i)?,
                Edge::Pair { source, next } => match source {
                    EdgeSource::Node(source) => {
                        index.add_edge(source, next, NodeConfig::default(), i)?;
                    }
                    EdgeSource::Error(source) => {
                        index.add_error_edge(source, next, ErrorConfig::default(), i)?;
                    }
                },
                Edge::PairConfig {
                    source,
                    next,
                    config,
                } => match (source, config) {
                    (EdgeSource::Node(source), EdgeConfig::Node(config)) => {
                        index.add_edge(source, next, *config, i)?;
                    }
                    (EdgeSource::Error(source), EdgeConfig::Error(config)) => {
                        index.add_error_edge(source, next, *config, i)?;
                    }
                    _ => return Err(BuildError::InvalidConfigKind { index: i }),
                },
            }
        }

        Ok(index)
    }

    fn add_chain(
        &mut self,
        source: &Source<T, S>,
        nodes: &[NodeRef<T, S>],
        next: Option<&Next<T, S>>,
        i: usize,
    ) -> Result<(), BuildError> {
        let Some(first) = nodes.first() else {
            return Err(BuildError::InvalidEdge {
                index: i,
                reason: "node chain requires at least one node",
            });
        };

        self.add_edge(source, &Next::Static(first.into()), NodeConfig::default(), i)?;

        for pair in nodes.windows(2) {
            self.edge_index
                .entry(SingleSource::Node(pair[0].clone()))
                .or_default()
                .push(Entry {
                    next: Next::Static((&pair[1]).into()),
                    config: NodeConfig::default(),
                    index: i,
                });
        }

        if let (Some(next), Some(last)) = (next, nodes.last()) {
            self.edge_index
                .entry(SingleSource::Node(last.clone()))
                .or_default()
                .push(Entry {
                    next: next.clone(),
                    config: NodeConfig::default(),
                    index: i,
                });
        }

        Ok(())
    }

    fn add_edge(
        &mut self,
        source: &Source<T, S>,
        next: &Next<T, S>,
        config: NodeConfig,
        i: usize,
    ) -> Result<(), BuildError> {
        if source.is_empty() {
            return Err(BuildError::InvalidEdge {
                index: i,
                reason: "edge source list is empty",
            });
        }
        for single in source.iter() {
            self.edge_index.entry(single.clone()).or_default().push(Entry {
                next: next.clone(),
                config,
                index: i,
            });
        }
        Ok(())
    }

    fn add_error_edge(
        &mut self,
        source: &ErrorSource<T, S>,
        next: &Next<T, S>,
        config: ErrorConfig,
        i: usize,
    ) -> Result<(), BuildError> {
        if source.is_empty() {
            return Err(BuildError::InvalidEdge {
                index: i,
                reason: "error edge source list is empty",
            });
        }
        for single in source.iter() {
            self.error_edge_index
                .entry(single.clone())
                .or_default()
                .push(ErrorEntry {
                    next: next.clone(),
                    config,
                    index: i,
                });
        }
        Ok(())
    }

    /// The entries routed from a single source, in edge-list order.
    #[must_use]
    pub fn entries(&self, source: &SingleSource<T, S>) -> &[Entry<T, S>] {
        self.edge_index.get(source).map_or(&[], Vec::as_slice)
    }

    /// The error entries indexed under a single error key.
    #[must_use]
    pub fn error_entries_for(&self, source: &SingleErrorSource<T, S>) -> &[ErrorEntry<T, S>] {
        self.error_edge_index.get(source).map_or(&[], Vec::as_slice)
    }

    /// Iterates every error key together with its entries.
    pub fn error_entries(
        &self,
    ) -> impl Iterator<Item = (&SingleErrorSource<T, S>, &[ErrorEntry<T, S>])> {
        self.error_edge_index
            .iter()
            .map(|(key, entries)| (key, entries.as_slice()))
    }

    /// The number of distinct single sources with outgoing entries.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.edge_index.len()
    }
}

impl<T, S> core::fmt::Debug for BranchIndex<T, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BranchIndex")
            .field("sources", &self.edge_index.len())
            .field("error_keys", &self.error_edge_index.len())
            .finish()
    }
}
