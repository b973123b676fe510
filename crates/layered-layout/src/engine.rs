use crate::{Point, Route, VertexExtents};
use std::collections::HashMap;
use std::hash::Hash;

/// A layout engine that can compute positions for graph nodes
///
/// This trait is generic over the graph type `G`, allowing different layout
/// engines to work with different graph types. Layered layouts implement
/// `LayoutEngine<G>` for any `G` exposing its nodes and edge references.
pub trait LayoutEngine<G> {
    /// The type used to identify nodes in the graph
    type NodeId: Copy + Eq + Hash;

    /// The type used to identify edges in the graph
    type EdgeId: Copy + Eq + Hash;

    type Error;

    /// Compute node centers and edge routes for the given graph
    ///
    /// # Errors
    /// Returns an error if the layout computation fails
    fn layout<S>(
        &self,
        graph: G,
        extents: &S,
    ) -> Result<DiagramLayout<Self::NodeId, Self::EdgeId>, Self::Error>
    where
        S: VertexExtents<Self::NodeId>;
}

/// Placement of a whole diagram, keyed by the caller's identifiers
#[derive(Debug, Clone)]
pub struct DiagramLayout<N, E> {
    /// Center of every node box
    pub vertex_centers: HashMap<N, Point>,
    /// Polyline of every edge, from the edge source to its target
    pub edge_routes: HashMap<E, Route>,
}

impl<N, E> Default for DiagramLayout<N, E> {
    fn default() -> Self {
        Self {
            vertex_centers: HashMap::new(),
            edge_routes: HashMap::new(),
        }
    }
}

impl<N: Eq + Hash, E: Eq + Hash> PartialEq for DiagramLayout<N, E> {
    fn eq(&self, other: &Self) -> bool {
        self.vertex_centers == other.vertex_centers && self.edge_routes == other.edge_routes
    }
}
