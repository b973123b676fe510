mod crossings;
mod dummies;
mod layers;
mod model;
mod normalize;
mod positions;
mod quasi_proper;
mod ranking;
mod session;

use crate::{DiagramLayout, LayoutEngine, LayoutError, VertexExtents};
use petgraph::visit::{IntoEdgeReferences, IntoNodeIdentifiers};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use tracing::debug;

pub use crossings::{count_crossings, initial_ordering, minimize_crossings, SiblingOrder};
pub use dummies::{insert_dummies, LayoutPath};
pub use layers::{RankLayer, RankLayers, RelativeLocation};
pub use model::{
    EdgeId, Imported, LayoutEdge, LayoutGraph, LayoutVertex, OriginId, PathId, VertexId,
    VertexKind,
};
pub use normalize::{normalize, remove_cycles_by_reversing_edges, remove_loops, Normalized};
pub use quasi_proper::{Prepared, QuasiProperLayoutGraph};
pub use ranking::{build_layers, rank_sinks_first, Ranking};
pub use session::LayoutSession;

use positions::{assign_coordinates, Spacing};

/// How edge routes are drawn between the vertex chain of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeRoutingStyle {
    /// Vertical and horizontal segments only
    Orthogonal,
    /// Straight segments through the dummy vertices
    #[default]
    Direct,
}

/// Configuration for the layered (Sugiyama-style) layout
///
/// Edges point from a child to its parent: parents end up above their
/// children and layer 0 holds the vertices without parents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayeredLayout {
    /// Gap between the bounding boxes of two consecutive layers
    pub vertical_gap: f64,

    /// Gap between two vertices of the same layer
    pub horizontal_gap: f64,

    pub edge_routing: EdgeRoutingStyle,

    /// Maximum sweeps of adjacent swaps during crossing reduction
    pub max_crossing_iterations: usize,

    /// Maximum sweeps of horizontal balancing
    pub max_balancing_iterations: usize,
}

impl Default for LayeredLayout {
    fn default() -> Self {
        Self {
            vertical_gap: 30.0,
            horizontal_gap: 15.0,
            edge_routing: EdgeRoutingStyle::default(),
            max_crossing_iterations: 10,
            max_balancing_iterations: 50,
        }
    }
}

impl LayeredLayout {
    /// Create a new layered layout with the given gaps
    pub fn new(vertical_gap: f64, horizontal_gap: f64) -> Self {
        Self {
            vertical_gap,
            horizontal_gap,
            ..Default::default()
        }
    }

    pub fn with_edge_routing(mut self, style: EdgeRoutingStyle) -> Self {
        self.edge_routing = style;
        self
    }

    /// Compute layer structure (expensive, cache this)
    ///
    /// This phase ranks the vertices, splits long edges and orders the
    /// layers. It only depends on the graph structure, the extents are used
    /// for names and priorities only.
    ///
    /// # Errors
    /// Returns an error if the layering could not be built, which points to
    /// an internal inconsistency since cycles and loops are handled.
    pub fn compute_layers<G, S>(
        &self,
        graph: G,
        extents: &S,
    ) -> Result<LayoutSession<G::NodeId, G::EdgeId>, LayoutError>
    where
        G: IntoNodeIdentifiers + IntoEdgeReferences,
        G::NodeId: Copy + Eq + Hash + fmt::Debug,
        G::EdgeId: Copy + Eq + Hash + fmt::Debug,
        S: VertexExtents<G::NodeId>,
    {
        let mut session = LayoutSession::from_graph(graph, extents)?;
        self.order(&mut session);
        Ok(session)
    }

    /// Order the layers of a session, returning the remaining crossings
    ///
    /// Run it again after a batch of edits to restore a good ordering.
    pub fn order<N, E>(&self, session: &mut LayoutSession<N, E>) -> usize
    where
        N: Copy + Eq + Hash + fmt::Debug,
        E: Copy + Eq + Hash + fmt::Debug,
    {
        let model = session.model_mut();
        initial_ordering(model);
        let crossings = minimize_crossings(model, self.max_crossing_iterations);
        session.set_crossings(crossings);
        crossings
    }

    /// Compute positions from cached layers (cheap, rerun when sizes change)
    ///
    /// This phase assigns coordinates to vertices based on their layer
    /// structure and current sizes. It can be called repeatedly as vertex
    /// sizes change.
    pub fn compute_positions<N, E, S>(
        &self,
        session: &mut LayoutSession<N, E>,
        extents: &S,
    ) -> DiagramLayout<N, E>
    where
        N: Copy + Eq + Hash + fmt::Debug,
        E: Copy + Eq + Hash + fmt::Debug,
        S: VertexExtents<N>,
    {
        session.refresh_extents(extents);
        self.positions(session)
    }

    /// Compute positions with the extents already known to the session
    pub fn positions<N, E>(&self, session: &mut LayoutSession<N, E>) -> DiagramLayout<N, E>
    where
        N: Copy + Eq + Hash + fmt::Debug,
        E: Copy + Eq + Hash + fmt::Debug,
    {
        let spacing = Spacing {
            vertical_gap: self.vertical_gap,
            horizontal_gap: self.horizontal_gap,
            max_iterations: self.max_balancing_iterations,
        };
        let centers = assign_coordinates(session.model_mut(), spacing);
        let layout = session.diagram(&centers, self.edge_routing, self.horizontal_gap);
        debug!(
            "Layout has {} vertices and {} routes",
            layout.vertex_centers.len(),
            layout.edge_routes.len()
        );
        layout
    }
}

// Implement LayoutEngine for any graph with the required capabilities
impl<G> LayoutEngine<G> for LayeredLayout
where
    G: IntoNodeIdentifiers + IntoEdgeReferences,
    G::NodeId: Copy + Eq + Hash + fmt::Debug,
    G::EdgeId: Copy + Eq + Hash + fmt::Debug,
{
    type NodeId = G::NodeId;
    type EdgeId = G::EdgeId;
    type Error = LayoutError;

    fn layout<S>(
        &self,
        graph: G,
        extents: &S,
    ) -> Result<DiagramLayout<Self::NodeId, Self::EdgeId>, Self::Error>
    where
        S: VertexExtents<Self::NodeId>,
    {
        let mut session = self.compute_layers(graph, extents)?;
        Ok(self.positions(&mut session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Extent, LayoutAction, Point, Size};
    use petgraph::graphmap::DiGraphMap;
    use test_log::test;

    fn extents(name: &str) -> Extent {
        Extent::new(name, Size::new(40.0, 20.0))
    }

    #[test]
    fn shortcut_edge_is_routed_through_its_dummy() {
        let graph = DiGraphMap::<&str, ()>::from_edges([("A", "B"), ("B", "C"), ("A", "C")]);
        let engine = LayeredLayout::default();
        let layout = engine.layout(&graph, &|n: &str| extents(n)).unwrap();

        assert_eq!(layout.vertex_centers.len(), 3);
        assert_eq!(layout.edge_routes.len(), 3);
        assert_eq!(layout.edge_routes[&("A", "C")].len(), 3);
        assert_eq!(layout.edge_routes[&("A", "B")].len(), 2);

        let (a, b, c) = (
            layout.vertex_centers["A"],
            layout.vertex_centers["B"],
            layout.vertex_centers["C"],
        );
        // Edges point up from child to parent
        assert!(c.y < b.y && b.y < a.y);
        assert_eq!(layout.edge_routes[&("A", "C")].first(), Some(a));
        assert_eq!(layout.edge_routes[&("A", "C")].last(), Some(c));
    }

    #[test]
    fn layout_is_deterministic() {
        let edges = [
            ("Circle", "Shape"),
            ("Square", "Shape"),
            ("Rect", "Shape"),
            ("Square", "Rect"),
            ("Shape", "Object"),
            ("Point", "Object"),
        ];
        let graph = DiGraphMap::<&str, ()>::from_edges(edges);
        let engine = LayeredLayout::default();
        let first = engine.layout(&graph, &|n: &str| extents(n)).unwrap();
        let second = engine.layout(&graph, &|n: &str| extents(n)).unwrap();
        assert_eq!(first, second);

        let mut session = engine.compute_layers(&graph, &|n: &str| extents(n)).unwrap();
        let third = engine.positions(&mut session);
        let fourth = engine.positions(&mut session);
        assert_eq!(first, third);
        assert_eq!(third, fourth);
    }

    #[test]
    fn isolated_vertices_are_placed_below() {
        let mut graph = DiGraphMap::<&str, ()>::new();
        graph.add_edge("child", "parent", ());
        graph.add_node("alone");
        let layout = LayeredLayout::default()
            .layout(&graph, &|n: &str| extents(n))
            .unwrap();

        let mut session = LayeredLayout::default()
            .compute_layers(&graph, &|n: &str| extents(n))
            .unwrap();
        assert_eq!(session.rank("alone").unwrap(), None);
        assert_eq!(session.model().layers().len(), 2);
        let positioned = LayeredLayout::default().positions(&mut session);
        assert_eq!(layout, positioned);

        assert!(layout.vertex_centers["alone"].y > layout.vertex_centers["child"].y);
    }

    #[test]
    fn cycles_and_loops_are_laid_out() {
        let graph =
            DiGraphMap::<&str, ()>::from_edges([("a", "b"), ("b", "c"), ("c", "a"), ("b", "b")]);
        let layout = LayeredLayout::default()
            .layout(&graph, &|n: &str| extents(n))
            .unwrap();
        assert_eq!(layout.edge_routes.len(), 4);
        let b = layout.vertex_centers["b"];
        let looped = &layout.edge_routes[&("b", "b")];
        assert_eq!(looped.first(), Some(b));
        assert!(looped.points.iter().all(|p| p.x >= b.x));
        // Every route starts at the caller's source
        for (&(source, target), route) in &layout.edge_routes {
            assert_eq!(route.first(), Some(layout.vertex_centers[source]));
            assert_eq!(route.last(), Some(layout.vertex_centers[target]));
        }
    }

    #[test]
    fn sizes_can_change_without_relayering() {
        let graph = DiGraphMap::<&str, ()>::from_edges([("b", "a"), ("c", "a")]);
        let engine = LayeredLayout::new(10.0, 5.0);
        let mut session = engine.compute_layers(&graph, &|n: &str| extents(n)).unwrap();
        let small = engine.compute_positions(&mut session, &|n: &str| extents(n));
        let large = engine.compute_positions(&mut session, &|n: &str| {
            Extent::new(n, Size::new(100.0, 20.0))
        });
        let gap = |l: &DiagramLayout<&str, (&str, &str)>| {
            l.vertex_centers["c"].x - l.vertex_centers["b"].x
        };
        assert_eq!(gap(&small), 45.0);
        assert_eq!(gap(&large), 105.0);
        assert_eq!(small.vertex_centers["a"].y, 20.0);
    }

    #[test]
    fn orthogonal_routes_only_turn_at_right_angles() {
        let graph = DiGraphMap::<&str, ()>::from_edges([("b", "a"), ("c", "a"), ("d", "a")]);
        let engine = LayeredLayout::default().with_edge_routing(EdgeRoutingStyle::Orthogonal);
        let layout = engine.layout(&graph, &|n: &str| extents(n)).unwrap();
        for route in layout.edge_routes.values() {
            for pair in route.points.windows(2) {
                let (p, q): (Point, Point) = (pair[0], pair[1]);
                assert!(p.x == q.x || p.y == q.y);
            }
        }
    }

    #[test]
    fn incremental_edits_match_a_fresh_layout() {
        let engine = LayeredLayout::default();
        let mut session: LayoutSession<&str, (&str, &str)> = LayoutSession::new();
        for key in ["Base", "Left", "Right", "Leaf"] {
            session.add_vertex(key, extents(key)).unwrap();
        }
        for (s, t) in [("Left", "Base"), ("Right", "Base"), ("Leaf", "Left"), ("Leaf", "Right")] {
            session.add_edge((s, t), s, t).unwrap();
        }
        engine.order(&mut session);
        let incremental = engine.positions(&mut session);

        let graph = DiGraphMap::<&str, ()>::from_edges([
            ("Left", "Base"),
            ("Right", "Base"),
            ("Leaf", "Left"),
            ("Leaf", "Right"),
        ]);
        let fresh = engine.layout(&graph, &|n: &str| extents(n)).unwrap();
        assert_eq!(incremental, fresh);
        assert_eq!(session.crossings(), 0);
    }

    #[test]
    fn routed_edges_are_logged() {
        let graph =
            DiGraphMap::<&str, ()>::from_edges([("b", "a"), ("c", "b"), ("c", "a"), ("a", "a")]);
        let engine = LayeredLayout::default();
        let mut session = engine.compute_layers(&graph, &|n: &str| extents(n)).unwrap();
        session.enable_action_log();
        let layout = engine.positions(&mut session);

        let log = session.model().action_log().unwrap();
        let rerouted: Vec<_> = log
            .iter()
            .filter_map(|(_, action)| match action {
                LayoutAction::EdgeRerouted { path, points } => Some((*path, *points)),
                _ => None,
            })
            .collect();
        // The self-loop is routed but has no path
        assert_eq!(rerouted.len(), 3);
        for (path, points) in rerouted {
            let key = session.edge_key(path).unwrap();
            assert_eq!(layout.edge_routes[&key].len(), points);
        }
        let long = session.path_id(("c", "a")).unwrap();
        assert!(log
            .iter()
            .any(|(_, a)| *a == LayoutAction::EdgeRerouted { path: long, points: 3 }));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: LayeredLayout =
            ron::from_str("(vertical_gap: 12.0, edge_routing: Orthogonal)").unwrap();
        assert_eq!(config.vertical_gap, 12.0);
        assert_eq!(config.edge_routing, EdgeRoutingStyle::Orthogonal);
        assert_eq!(config.horizontal_gap, 15.0);
        assert_eq!(config.max_crossing_iterations, 10);

        let text = ron::to_string(&config).unwrap();
        assert_eq!(ron::from_str::<LayeredLayout>(&text).unwrap(), config);
    }
}
