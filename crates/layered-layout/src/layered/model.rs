use crate::{Extent, LayoutError, Point, Size, VertexExtents};
use derive_more::{Display, From};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences, IntoNodeIdentifiers};
use petgraph::Direction;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;
use tracing::{debug, warn};

/// Handle of a vertex in the layout arena
///
/// Arena slots are recycled after a removal, so a handle also carries the
/// stamp of the vertex it was issued for. A handle outliving its vertex never
/// resolves to the vertex that took the slot over. Handles order by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display("v{stamp}")]
pub struct VertexId {
    stamp: usize,
    slot: NodeIndex,
}

/// Handle of a single-hop edge in the layout arena, stamped like [`VertexId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display("e{stamp}")]
pub struct EdgeId {
    stamp: usize,
    slot: EdgeIndex,
}

/// Arena weight tagged with the stamp of its handle
#[derive(Debug, Clone)]
pub(crate) struct Stamped<T> {
    stamp: usize,
    weight: T,
}

/// Identity of a logical edge, stable across splits and merges
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Display)]
#[display("p{_0}")]
pub struct PathId(pub usize);

/// Position of a caller edge in the input, used to map routes back
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Display)]
#[display("o{_0}")]
pub struct OriginId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum VertexKind {
    /// A caller box
    Real(Extent),
    /// A zero-sized waypoint carrying a long edge through a layer
    Dummy { serial: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutVertex {
    kind: VertexKind,
    rank: Option<usize>,
    center: Option<Point>,
}

impl LayoutVertex {
    pub fn real(mut extent: Extent) -> Self {
        let size = extent.size.sanitized();
        if size != extent.size {
            warn!("Invalid size {:?} for vertex {:?}, clamping", extent.size, extent.name);
            extent.size = size;
        }
        Self {
            kind: VertexKind::Real(extent),
            rank: None,
            center: None,
        }
    }

    pub fn dummy(serial: usize) -> Self {
        Self {
            kind: VertexKind::Dummy { serial },
            rank: None,
            center: None,
        }
    }

    pub fn kind(&self) -> &VertexKind {
        &self.kind
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self.kind, VertexKind::Dummy { .. })
    }

    pub fn extent(&self) -> Option<&Extent> {
        match &self.kind {
            VertexKind::Real(extent) => Some(extent),
            VertexKind::Dummy { .. } => None,
        }
    }

    /// Display name, empty for dummies
    pub fn name(&self) -> &str {
        self.extent().map_or("", |e| e.name.as_str())
    }

    pub fn priority(&self) -> i32 {
        self.extent().map_or(0, |e| e.priority)
    }

    pub fn size(&self) -> Size {
        self.extent().map_or(Size::zero(), |e| e.size)
    }

    pub fn width(&self) -> f64 {
        self.size().width
    }

    pub fn height(&self) -> f64 {
        self.size().height
    }

    /// Index of the layer holding this vertex, `None` while unranked
    pub fn rank(&self) -> Option<usize> {
        self.rank
    }

    /// Center assigned by the last coordinate assignment
    pub fn center(&self) -> Option<Point> {
        self.center
    }

    /// Case-insensitive name equality, dummies compare by serial
    pub fn same_name(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (VertexKind::Real(a), VertexKind::Real(b)) => a.name.eq_ignore_ascii_case(&b.name),
            (VertexKind::Dummy { serial: a }, VertexKind::Dummy { serial: b }) => a == b,
            _ => false,
        }
    }

    pub(crate) fn set_rank(&mut self, rank: Option<usize>) {
        self.rank = rank;
    }

    pub(crate) fn set_center(&mut self, center: Point) {
        self.center = Some(center);
    }

    pub(crate) fn set_size(&mut self, size: Size) {
        if let VertexKind::Real(extent) = &mut self.kind {
            extent.size = size.sanitized();
        }
    }
}

/// Case-insensitive name order, falling back to the exact spelling
pub(crate) fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// A directed hop between two layout vertices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutEdge {
    /// Caller edge this hop was built from
    pub origin: Option<OriginId>,
    /// Set when the direction was flipped to break a cycle
    pub reversed: bool,
    /// Logical edge this hop belongs to, once paths are built
    pub path: Option<PathId>,
}

impl LayoutEdge {
    pub fn new(origin: Option<OriginId>) -> Self {
        Self {
            origin,
            ..Default::default()
        }
    }

    pub(crate) fn flipped(self) -> Self {
        Self {
            reversed: !self.reversed,
            ..self
        }
    }
}

/// Caller graph imported into a layout arena
#[derive(Debug)]
pub struct Imported<N, E> {
    pub graph: LayoutGraph,
    /// Caller vertices with their handle, in input order
    pub vertices: Vec<(N, VertexId)>,
    /// Caller edges, indexed by [`OriginId`]
    pub origins: Vec<E>,
}

/// Directed multigraph of real and dummy vertices
#[derive(Debug, Clone, Default)]
pub struct LayoutGraph {
    graph: StableDiGraph<Stamped<LayoutVertex>, Stamped<LayoutEdge>>,
    next_stamp: usize,
    dummy_serial: usize,
}

impl LayoutGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror a caller graph, one layout vertex per caller vertex
    ///
    /// Edges whose endpoints are not reported by `node_identifiers` are
    /// skipped. The caller graph is not modified.
    pub fn from_graph<G, S>(graph: G, extents: &S) -> Imported<G::NodeId, G::EdgeId>
    where
        G: IntoNodeIdentifiers + IntoEdgeReferences,
        G::NodeId: Copy + Eq + Hash,
        S: VertexExtents<G::NodeId>,
    {
        let mut layout = Self::new();
        let mut ids = HashMap::new();
        let mut vertices = Vec::new();
        for node in graph.node_identifiers() {
            let id = layout.add_vertex(extents.extent(node));
            ids.insert(node, id);
            vertices.push((node, id));
        }

        let mut origins = Vec::new();
        for edge in graph.edge_references() {
            let (Some(&source), Some(&target)) = (ids.get(&edge.source()), ids.get(&edge.target()))
            else {
                warn!("Skipping edge with an unknown endpoint");
                continue;
            };
            let origin = OriginId(origins.len());
            origins.push(edge.id());
            layout.insert_edge(source, target, LayoutEdge::new(Some(origin)));
        }

        debug!(
            "Imported {} vertices and {} edges",
            layout.vertex_count(),
            layout.edge_count()
        );

        Imported {
            graph: layout,
            vertices,
            origins,
        }
    }

    pub fn add_vertex(&mut self, extent: Extent) -> VertexId {
        self.insert_vertex(LayoutVertex::real(extent))
    }

    pub fn add_dummy(&mut self) -> VertexId {
        let serial = self.dummy_serial;
        self.dummy_serial += 1;
        self.insert_vertex(LayoutVertex::dummy(serial))
    }

    pub fn add_edge(
        &mut self,
        source: VertexId,
        target: VertexId,
        edge: LayoutEdge,
    ) -> Result<EdgeId, LayoutError> {
        self.vertex(source)?;
        self.vertex(target)?;
        Ok(self.insert_edge(source, target, edge))
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Result<LayoutEdge, LayoutError> {
        self.edge(id)?;
        self.graph
            .remove_edge(id.slot)
            .map(|e| e.weight)
            .ok_or(LayoutError::EdgeNotFound(id))
    }

    /// Remove a vertex together with all its edges
    pub fn remove_vertex(&mut self, id: VertexId) -> Result<LayoutVertex, LayoutError> {
        self.vertex(id)?;
        self.graph
            .remove_node(id.slot)
            .map(|v| v.weight)
            .ok_or(LayoutError::VertexNotFound(id))
    }

    /// Replace an edge by the same edge pointing the other way
    pub fn reverse_edge(&mut self, id: EdgeId) -> Result<EdgeId, LayoutError> {
        let (source, target) = self.endpoints(id)?;
        let edge = self.remove_edge(id)?;
        self.add_edge(target, source, edge.flipped())
    }

    pub fn contains_vertex(&self, id: VertexId) -> bool {
        self.vertex(id).is_ok()
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edge(id).is_ok()
    }

    pub fn vertex(&self, id: VertexId) -> Result<&LayoutVertex, LayoutError> {
        self.graph
            .node_weight(id.slot)
            .filter(|v| v.stamp == id.stamp)
            .map(|v| &v.weight)
            .ok_or(LayoutError::VertexNotFound(id))
    }

    pub(crate) fn vertex_mut(&mut self, id: VertexId) -> Result<&mut LayoutVertex, LayoutError> {
        self.graph
            .node_weight_mut(id.slot)
            .filter(|v| v.stamp == id.stamp)
            .map(|v| &mut v.weight)
            .ok_or(LayoutError::VertexNotFound(id))
    }

    pub fn edge(&self, id: EdgeId) -> Result<&LayoutEdge, LayoutError> {
        self.graph
            .edge_weight(id.slot)
            .filter(|e| e.stamp == id.stamp)
            .map(|e| &e.weight)
            .ok_or(LayoutError::EdgeNotFound(id))
    }

    pub(crate) fn edge_mut(&mut self, id: EdgeId) -> Result<&mut LayoutEdge, LayoutError> {
        self.graph
            .edge_weight_mut(id.slot)
            .filter(|e| e.stamp == id.stamp)
            .map(|e| &mut e.weight)
            .ok_or(LayoutError::EdgeNotFound(id))
    }

    pub fn endpoints(&self, id: EdgeId) -> Result<(VertexId, VertexId), LayoutError> {
        self.edge(id)?;
        self.graph
            .edge_endpoints(id.slot)
            .map(|(s, t)| (self.vertex_id(s), self.vertex_id(t)))
            .ok_or(LayoutError::EdgeNotFound(id))
    }

    /// Live vertices, in creation order
    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        let mut ids: Vec<_> = self
            .graph
            .node_indices()
            .map(|slot| self.vertex_id(slot))
            .collect();
        ids.sort();
        ids.into_iter()
    }

    /// Live edges, in creation order
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        let mut ids: Vec<_> = self
            .graph
            .edge_indices()
            .map(|slot| self.edge_id(slot))
            .collect();
        ids.sort();
        ids.into_iter()
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Outgoing edges of a vertex, in creation order
    pub fn out_edges(&self, id: VertexId) -> Vec<EdgeId> {
        self.directed_edges(id, Direction::Outgoing)
    }

    /// Incoming edges of a vertex, in creation order
    pub fn in_edges(&self, id: VertexId) -> Vec<EdgeId> {
        self.directed_edges(id, Direction::Incoming)
    }

    /// Targets of the outgoing edges, one entry per edge
    pub fn successors(&self, id: VertexId) -> Vec<VertexId> {
        self.out_edges(id)
            .into_iter()
            .filter_map(|e| self.endpoints(e).ok().map(|(_, t)| t))
            .collect()
    }

    /// Sources of the incoming edges, one entry per edge
    pub fn predecessors(&self, id: VertexId) -> Vec<VertexId> {
        self.in_edges(id)
            .into_iter()
            .filter_map(|e| self.endpoints(e).ok().map(|(s, _)| s))
            .collect()
    }

    pub fn degree(&self, id: VertexId) -> usize {
        self.out_edges(id).len() + self.in_edges(id).len()
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &StableDiGraph<Stamped<LayoutVertex>, Stamped<LayoutEdge>> {
        &self.graph
    }

    fn stamp(&mut self) -> usize {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    fn insert_vertex(&mut self, weight: LayoutVertex) -> VertexId {
        let stamp = self.stamp();
        let slot = self.graph.add_node(Stamped { stamp, weight });
        VertexId { stamp, slot }
    }

    fn insert_edge(&mut self, source: VertexId, target: VertexId, weight: LayoutEdge) -> EdgeId {
        let stamp = self.stamp();
        let slot = self
            .graph
            .add_edge(source.slot, target.slot, Stamped { stamp, weight });
        EdgeId { stamp, slot }
    }

    /// Handle of a live slot
    fn vertex_id(&self, slot: NodeIndex) -> VertexId {
        let stamp = self.graph.node_weight(slot).map_or(usize::MAX, |v| v.stamp);
        VertexId { stamp, slot }
    }

    fn edge_id(&self, slot: EdgeIndex) -> EdgeId {
        let stamp = self.graph.edge_weight(slot).map_or(usize::MAX, |e| e.stamp);
        EdgeId { stamp, slot }
    }

    fn directed_edges(&self, id: VertexId, direction: Direction) -> Vec<EdgeId> {
        if self.vertex(id).is_err() {
            return Vec::new();
        }
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(id.slot, direction)
            .map(|e| EdgeId {
                stamp: e.weight().stamp,
                slot: e.id(),
            })
            .collect();
        edges.sort();
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petgraph::graphmap::DiGraphMap;
    use test_log::test;

    fn extent(name: &str) -> Extent {
        Extent::new(name, Size::new(10.0, 5.0))
    }

    #[test]
    fn import_mirrors_the_caller_graph() {
        let mut graph = DiGraphMap::new();
        graph.add_edge("a", "b", ());
        graph.add_edge("b", "c", ());
        graph.add_node("lonely");

        let imported = LayoutGraph::from_graph(&graph, &|n: &str| extent(n));
        let layout = &imported.graph;
        assert_eq!(layout.vertex_count(), 4);
        assert_eq!(layout.edge_count(), 2);
        assert_eq!(imported.origins, vec![("a", "b"), ("b", "c")]);

        let ids: HashMap<_, _> = imported.vertices.iter().copied().collect();
        assert_eq!(layout.successors(ids["a"]), vec![ids["b"]]);
        assert_eq!(layout.predecessors(ids["c"]), vec![ids["b"]]);
        assert_eq!(layout.degree(ids["lonely"]), 0);
        assert_eq!(layout.vertex(ids["a"]).unwrap().name(), "a");
        // The caller graph is untouched
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn reversing_an_edge_flips_the_flag() {
        let mut graph = LayoutGraph::new();
        let a = graph.add_vertex(extent("a"));
        let b = graph.add_vertex(extent("b"));
        let e = graph.add_edge(a, b, LayoutEdge::new(Some(OriginId(3)))).unwrap();

        let r = graph.reverse_edge(e).unwrap();
        assert_eq!(graph.endpoints(r).unwrap(), (b, a));
        let edge = graph.edge(r).unwrap();
        assert!(edge.reversed);
        assert_eq!(edge.origin, Some(OriginId(3)));
    }

    #[test]
    fn missing_references_are_rejected() {
        let mut graph = LayoutGraph::new();
        let a = graph.add_vertex(extent("a"));
        let b = graph.add_vertex(extent("b"));
        graph.remove_vertex(b).unwrap();

        assert_eq!(
            graph.add_edge(a, b, LayoutEdge::default()),
            Err(LayoutError::VertexNotFound(b))
        );
        assert_eq!(graph.remove_vertex(b), Err(LayoutError::VertexNotFound(b)));
    }

    #[test]
    fn stale_handles_do_not_reach_recycled_slots() {
        let mut graph = LayoutGraph::new();
        let a = graph.add_vertex(extent("a"));
        let b = graph.add_vertex(extent("b"));
        let e = graph.add_edge(b, a, LayoutEdge::default()).unwrap();
        graph.remove_vertex(b).unwrap();

        let c = graph.add_vertex(extent("c"));
        let f = graph.add_edge(c, a, LayoutEdge::default()).unwrap();
        assert_ne!(b, c);
        assert_ne!(e, f);
        assert!(!graph.contains_vertex(b));
        assert!(!graph.contains_edge(e));
        assert_eq!(graph.remove_vertex(b), Err(LayoutError::VertexNotFound(b)));
        assert_eq!(graph.remove_edge(e), Err(LayoutError::EdgeNotFound(e)));
        assert_eq!(graph.vertex(c).unwrap().name(), "c");
        assert!(graph.successors(b).is_empty());
        assert_eq!(graph.vertices().collect::<Vec<_>>(), vec![a, c]);
        assert!(a < c);
    }

    #[test]
    fn dummies_have_no_extent() {
        let mut graph = LayoutGraph::new();
        let d1 = graph.add_dummy();
        let d2 = graph.add_dummy();
        let v1 = graph.vertex(d1).unwrap();
        let v2 = graph.vertex(d2).unwrap();
        assert!(v1.is_dummy());
        assert_eq!(v1.size(), Size::zero());
        assert_eq!(v1.kind(), &VertexKind::Dummy { serial: 0 });
        assert!(!v1.same_name(v2));

        let upper = LayoutVertex::real(extent("Widget"));
        let lower = LayoutVertex::real(extent("widget"));
        assert!(upper.same_name(&lower));
    }
}
