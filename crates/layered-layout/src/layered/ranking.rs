use super::layers::RankLayers;
use super::model::{LayoutGraph, VertexId};
use crate::LayoutError;
use std::collections::HashMap;
use tracing::debug;

/// Topological clustering of a DAG, sinks first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ranking {
    /// `clusters[r]` holds the vertices of rank `r`
    pub clusters: Vec<Vec<VertexId>>,
    /// Vertices without any edge, left out of the clusters
    pub isolated: Vec<VertexId>,
}

impl Ranking {
    pub fn rank_of(&self, vertex: VertexId) -> Option<usize> {
        self.clusters.iter().position(|c| c.contains(&vertex))
    }
}

/// Assign ranks by repeatedly peeling off the sinks
///
/// Rank 0 holds the vertices without outgoing edges, and every vertex lands
/// one rank above the highest of its targets, so `rank(source) > rank(target)`
/// holds for every edge while unconstrained vertices share a cluster.
///
/// # Errors
/// Returns [`LayoutError::GraphHasCycle`] if the graph was not normalized.
pub fn rank_sinks_first(graph: &LayoutGraph) -> Result<Ranking, LayoutError> {
    let mut isolated = Vec::new();
    let mut out_degree: HashMap<VertexId, usize> = HashMap::new();
    let mut current = Vec::new();

    for vertex in graph.vertices() {
        if graph.degree(vertex) == 0 {
            isolated.push(vertex);
            continue;
        }
        let degree = graph.out_edges(vertex).len();
        if degree == 0 {
            current.push(vertex);
        }
        out_degree.insert(vertex, degree);
    }

    let pending = out_degree.len();
    let mut ranked = 0;
    let mut clusters = Vec::new();

    while !current.is_empty() {
        let mut next = Vec::new();
        for &vertex in &current {
            for source in graph.predecessors(vertex) {
                let Some(degree) = out_degree.get_mut(&source) else {
                    continue;
                };
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    next.push(source);
                }
            }
        }
        ranked += current.len();
        clusters.push(std::mem::replace(&mut current, next));
    }

    if ranked < pending {
        let stuck = graph
            .vertices()
            .find(|v| out_degree.get(v).is_some_and(|&d| d > 0));
        if let Some(vertex) = stuck {
            return Err(LayoutError::GraphHasCycle(vertex));
        }
    }

    debug!(
        "Ranked {} vertices into {} layers, {} isolated",
        ranked,
        clusters.len(),
        isolated.len()
    );

    Ok(Ranking { clusters, isolated })
}

/// Build the rank layers of a ranking, keeping cluster order
pub fn build_layers(graph: &mut LayoutGraph, ranking: &Ranking) -> Result<RankLayers, LayoutError> {
    let mut layers = RankLayers::new();
    for (rank, cluster) in ranking.clusters.iter().enumerate() {
        for &vertex in cluster {
            layers.add_item(graph, rank, vertex)?;
        }
    }
    Ok(layers)
}
