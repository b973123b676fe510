use super::layers::RankLayers;
use super::model::{EdgeId, LayoutEdge, LayoutGraph, OriginId, PathId, VertexId};
use crate::LayoutError;
use std::iter;
use tracing::debug;

/// One logical edge after dummy splitting
///
/// The path runs from `source` (lower rank side) to `target` through
/// `dummies`, one per skipped rank, and `hops` holds the single-rank edges in
/// the same order. When `reversed` is set the caller's edge pointed from
/// `target` to `source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPath {
    id: PathId,
    source: VertexId,
    target: VertexId,
    hops: Vec<EdgeId>,
    dummies: Vec<VertexId>,
    origin: Option<OriginId>,
    reversed: bool,
}

impl LayoutPath {
    pub(crate) fn new(
        id: PathId,
        source: VertexId,
        target: VertexId,
        origin: Option<OriginId>,
        reversed: bool,
    ) -> Self {
        Self {
            id,
            source,
            target,
            hops: Vec::new(),
            dummies: Vec::new(),
            origin,
            reversed,
        }
    }

    pub fn id(&self) -> PathId {
        self.id
    }

    pub fn source(&self) -> VertexId {
        self.source
    }

    pub fn target(&self) -> VertexId {
        self.target
    }

    pub fn hops(&self) -> &[EdgeId] {
        &self.hops
    }

    pub fn dummies(&self) -> &[VertexId] {
        &self.dummies
    }

    pub fn origin(&self) -> Option<OriginId> {
        self.origin
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Number of hops, equal to the rank difference of the endpoints
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Source, dummies and target in chain order
    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        iter::once(self.source)
            .chain(self.dummies.iter().copied())
            .chain(iter::once(self.target))
    }

    /// Endpoints in the direction of the caller's edge
    pub fn caller_endpoints(&self) -> (VertexId, VertexId) {
        if self.reversed {
            (self.target, self.source)
        } else {
            (self.source, self.target)
        }
    }

    pub(crate) fn set_dummies(&mut self, dummies: Vec<VertexId>) {
        self.dummies = dummies;
    }

    pub(crate) fn take_hops(&mut self) -> Vec<EdgeId> {
        std::mem::take(&mut self.hops)
    }

    /// Create the hop edges along the current dummy chain
    pub(crate) fn link_hops(&mut self, graph: &mut LayoutGraph) -> Result<(), LayoutError> {
        let template = LayoutEdge {
            origin: self.origin,
            reversed: self.reversed,
            path: Some(self.id),
        };
        let vertices: Vec<_> = self.vertices().collect();
        self.hops = vertices
            .windows(2)
            .map(|w| graph.add_edge(w[0], w[1], template))
            .collect::<Result<_, _>>()?;
        Ok(())
    }
}

/// Split every edge spanning more than one rank into a dummy chain
///
/// Each edge becomes one [`LayoutPath`], numbered in edge order. New dummies
/// are appended to their layer. Afterwards every edge of the graph spans
/// exactly one rank.
///
/// # Errors
/// Fails if an endpoint is unranked or an edge does not point to a lower
/// rank, which means the graph was not ranked first.
pub fn insert_dummies(
    graph: &mut LayoutGraph,
    layers: &mut RankLayers,
) -> Result<Vec<LayoutPath>, LayoutError> {
    let edges: Vec<_> = graph.edges().collect();
    let mut paths = Vec::with_capacity(edges.len());
    let mut dummy_count = 0;

    for edge in edges {
        let (source, target) = graph.endpoints(edge)?;
        let weight = *graph.edge(edge)?;
        let source_rank = graph
            .vertex(source)?
            .rank()
            .ok_or(LayoutError::Unranked(source))?;
        let target_rank = graph
            .vertex(target)?
            .rank()
            .ok_or(LayoutError::Unranked(target))?;
        if source_rank <= target_rank {
            return Err(LayoutError::RankOrder { edge });
        }

        let id = PathId(paths.len());
        let mut path = LayoutPath::new(id, source, target, weight.origin, weight.reversed);

        if source_rank == target_rank + 1 {
            graph.edge_mut(edge)?.path = Some(id);
            path.hops = vec![edge];
        } else {
            graph.remove_edge(edge)?;
            let mut dummies = Vec::with_capacity(source_rank - target_rank - 1);
            for rank in (target_rank + 1..source_rank).rev() {
                let dummy = graph.add_dummy();
                layers.add_item(graph, rank, dummy)?;
                dummies.push(dummy);
            }
            dummy_count += dummies.len();
            path.dummies = dummies;
            path.link_hops(graph)?;
        }
        paths.push(path);
    }

    debug!(
        "Built {} paths with {} dummy vertices",
        paths.len(),
        dummy_count
    );

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layered::normalize::normalize;
    use crate::layered::ranking::{build_layers, rank_sinks_first};
    use crate::{Extent, Size};
    use test_log::test;

    fn layered(
        n: usize,
        edges: &[(usize, usize)],
    ) -> (LayoutGraph, RankLayers, Vec<VertexId>, Vec<LayoutPath>) {
        let mut graph = LayoutGraph::new();
        let ids: Vec<_> = (0..n)
            .map(|i| graph.add_vertex(Extent::new(format!("n{i}"), Size::new(4.0, 2.0))))
            .collect();
        for (i, &(s, t)) in edges.iter().enumerate() {
            graph
                .add_edge(ids[s], ids[t], LayoutEdge::new(Some(OriginId(i))))
                .unwrap();
        }
        normalize(&mut graph);
        let ranking = rank_sinks_first(&graph).unwrap();
        let mut layers = build_layers(&mut graph, &ranking).unwrap();
        let paths = insert_dummies(&mut graph, &mut layers).unwrap();
        (graph, layers, ids, paths)
    }

    fn span(graph: &LayoutGraph, edge: EdgeId) -> usize {
        let (s, t) = graph.endpoints(edge).unwrap();
        let rs = graph.vertex(s).unwrap().rank().unwrap();
        let rt = graph.vertex(t).unwrap().rank().unwrap();
        rs.abs_diff(rt)
    }

    #[test]
    fn shortcut_edge_gets_one_dummy() {
        let (graph, layers, ids, paths) = layered(3, &[(0, 1), (1, 2), (0, 2)]);
        assert_eq!(paths.len(), 3);

        let shortcut = paths
            .iter()
            .find(|p| p.origin() == Some(OriginId(2)))
            .unwrap();
        assert_eq!(shortcut.len(), 2);
        assert_eq!(shortcut.dummies().len(), 1);
        let dummy = shortcut.dummies()[0];
        assert_eq!(graph.vertex(dummy).unwrap().rank(), Some(1));
        assert_eq!(layers.get(1).unwrap().items(), &[ids[1], dummy]);
        assert_eq!(
            shortcut.vertices().collect::<Vec<_>>(),
            vec![ids[0], dummy, ids[2]]
        );
    }

    #[test]
    fn every_hop_spans_one_rank() {
        let edges = [(0, 1), (1, 2), (2, 3), (0, 3), (4, 3), (4, 0), (3, 1)];
        let (graph, _, _, paths) = layered(5, &edges);
        for e in graph.edges() {
            assert_eq!(span(&graph, e), 1);
            let path = graph.edge(e).unwrap().path.unwrap();
            assert!(paths[path.0].hops().contains(&e));
        }
        for path in &paths {
            let rs = graph.vertex(path.source()).unwrap().rank().unwrap();
            let rt = graph.vertex(path.target()).unwrap().rank().unwrap();
            assert_eq!(path.len(), rs - rt);
        }
    }

    #[test]
    fn reversed_edges_keep_their_flag() {
        let (graph, _, ids, paths) = layered(2, &[(0, 1), (1, 0)]);
        let reversed: Vec<_> = paths.iter().filter(|p| p.is_reversed()).collect();
        assert_eq!(reversed.len(), 1);
        assert_eq!(reversed[0].caller_endpoints(), (ids[1], ids[0]));
        let hop = reversed[0].hops()[0];
        assert!(graph.edge(hop).unwrap().reversed);
    }

    #[test]
    fn unranked_graph_is_rejected() {
        let mut graph = LayoutGraph::new();
        let a = graph.add_vertex(Extent::default());
        let b = graph.add_vertex(Extent::default());
        graph.add_edge(a, b, LayoutEdge::default()).unwrap();
        let mut layers = RankLayers::new();
        assert_eq!(
            insert_dummies(&mut graph, &mut layers),
            Err(LayoutError::Unranked(a))
        );
    }
}
