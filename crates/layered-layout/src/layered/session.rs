use super::model::{LayoutGraph, OriginId, PathId, VertexId};
use super::positions::{route_loop, route_path};
use super::quasi_proper::QuasiProperLayoutGraph;
use super::EdgeRoutingStyle;
use crate::actions::{Edit, LayoutAction};
use crate::{DiagramLayout, Extent, LayoutError, Point, SessionError, VertexExtents};
use petgraph::visit::{IntoEdgeReferences, IntoNodeIdentifiers};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeSlot {
    Path(PathId),
    /// Self-loop, kept out of the layering
    Loop(VertexId),
}

/// Layered layout state keyed by the caller's vertex and edge identifiers
///
/// A session is built once from a caller graph and then edited vertex by
/// vertex and edge by edge, each edit only touching the part of the layering
/// below it. Coordinates are recomputed on demand through
/// [`LayeredLayout::compute_positions`](super::LayeredLayout::compute_positions).
#[derive(Debug, Clone)]
pub struct LayoutSession<N, E> {
    model: QuasiProperLayoutGraph,
    vertices: HashMap<N, VertexId>,
    keys: HashMap<VertexId, N>,
    edges: HashMap<E, EdgeSlot>,
    path_keys: HashMap<PathId, E>,
    crossings: usize,
}

impl<N, E> Default for LayoutSession<N, E> {
    fn default() -> Self {
        Self {
            model: QuasiProperLayoutGraph::default(),
            vertices: HashMap::new(),
            keys: HashMap::new(),
            edges: HashMap::new(),
            path_keys: HashMap::new(),
            crossings: 0,
        }
    }
}

impl<N, E> LayoutSession<N, E>
where
    N: Copy + Eq + Hash + fmt::Debug,
    E: Copy + Eq + Hash + fmt::Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer a whole caller graph in one go
    pub fn from_graph<G, S>(graph: G, extents: &S) -> Result<Self, LayoutError>
    where
        G: IntoNodeIdentifiers<NodeId = N> + IntoEdgeReferences<EdgeId = E>,
        S: VertexExtents<N>,
    {
        let imported = LayoutGraph::from_graph(graph, extents);
        let (model, prepared) = QuasiProperLayoutGraph::build(imported.graph)?;
        let mut session = Self {
            model,
            ..Default::default()
        };

        for (key, id) in imported.vertices {
            session.vertices.insert(key, id);
            session.keys.insert(id, key);
        }
        let origin_key =
            |origin: Option<OriginId>| origin.and_then(|o| imported.origins.get(o.0).copied());
        for path in session.model.paths() {
            if let Some(key) = origin_key(path.origin()) {
                session.edges.insert(key, EdgeSlot::Path(path.id()));
                session.path_keys.insert(path.id(), key);
            }
        }
        for (vertex, origin) in prepared.loops {
            if let Some(key) = origin_key(origin) {
                session.edges.insert(key, EdgeSlot::Loop(vertex));
            }
        }

        debug!(
            "Session built with {} vertices, {} edges ({} reversed, {} isolated)",
            session.vertices.len(),
            session.edges.len(),
            prepared.reversed,
            prepared.isolated.len()
        );
        Ok(session)
    }

    pub fn model(&self) -> &QuasiProperLayoutGraph {
        &self.model
    }

    pub fn vertex_id(&self, key: N) -> Option<VertexId> {
        self.vertices.get(&key).copied()
    }

    pub fn vertex_key(&self, id: VertexId) -> Option<N> {
        self.keys.get(&id).copied()
    }

    /// Path of a caller edge, `None` for unknown edges and self-loops
    pub fn path_id(&self, key: E) -> Option<PathId> {
        match self.edges.get(&key)? {
            EdgeSlot::Path(id) => Some(*id),
            EdgeSlot::Loop(_) => None,
        }
    }

    pub fn edge_key(&self, path: PathId) -> Option<E> {
        self.path_keys.get(&path).copied()
    }

    pub fn contains_vertex(&self, key: N) -> bool {
        self.vertices.contains_key(&key)
    }

    pub fn contains_edge(&self, key: E) -> bool {
        self.edges.contains_key(&key)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Crossings left by the last ordering pass
    pub fn crossings(&self) -> usize {
        self.crossings
    }

    pub fn rank(&self, key: N) -> Result<Option<usize>, SessionError<N, E>> {
        let id = self.lookup(key)?;
        Ok(self.model.rank(id)?)
    }

    pub fn enable_action_log(&mut self) {
        self.model.enable_action_log();
    }

    pub fn add_vertex(
        &mut self,
        key: N,
        extent: Extent,
    ) -> Result<Edit<VertexId>, SessionError<N, E>> {
        if self.vertices.contains_key(&key) {
            return Err(SessionError::VertexExists(key));
        }
        let edit = self.model.add_vertex(extent);
        self.vertices.insert(key, edit.value);
        self.keys.insert(edit.value, key);
        Ok(edit)
    }

    /// Remove a vertex with every edge touching it
    pub fn remove_vertex(&mut self, key: N) -> Result<Vec<LayoutAction>, SessionError<N, E>> {
        let id = self.lookup(key)?;
        let edit = self.model.remove_vertex(id)?;
        for path in &edit.value {
            if let Some(edge) = self.path_keys.remove(path) {
                self.edges.remove(&edge);
            }
        }
        self.edges
            .retain(|_, slot| !matches!(slot, EdgeSlot::Loop(v) if *v == id));
        self.vertices.remove(&key);
        self.keys.remove(&id);
        Ok(edit.actions)
    }

    /// Add an edge from `source` to `target`
    ///
    /// Self-loops are accepted but stay out of the layering, they are only
    /// drawn as a small loop next to their vertex.
    pub fn add_edge(
        &mut self,
        key: E,
        source: N,
        target: N,
    ) -> Result<Vec<LayoutAction>, SessionError<N, E>> {
        if self.edges.contains_key(&key) {
            return Err(SessionError::EdgeExists(key));
        }
        let source_id = self.lookup(source)?;
        let target_id = self.lookup(target)?;

        if source_id == target_id {
            self.edges.insert(key, EdgeSlot::Loop(source_id));
            return Ok(vec![LayoutAction::LoopRemoved { vertex: source_id }]);
        }

        let edit = self.model.add_edge(source_id, target_id)?;
        self.edges.insert(key, EdgeSlot::Path(edit.value));
        self.path_keys.insert(edit.value, key);
        Ok(edit.actions)
    }

    pub fn remove_edge(&mut self, key: E) -> Result<Vec<LayoutAction>, SessionError<N, E>> {
        let slot = self
            .edges
            .get(&key)
            .copied()
            .ok_or(SessionError::EdgeNotFound(key))?;
        let actions = match slot {
            EdgeSlot::Path(path) => {
                let edit = self.model.remove_edge(path)?;
                self.path_keys.remove(&path);
                edit.actions
            }
            EdgeSlot::Loop(_) => Vec::new(),
        };
        self.edges.remove(&key);
        Ok(actions)
    }

    /// Update the extents of every caller vertex
    pub(crate) fn refresh_extents<S: VertexExtents<N>>(&mut self, extents: &S) {
        for (&key, &id) in &self.vertices {
            let size = extents.extent(key).size;
            if let Err(e) = self.model.set_size(id, size) {
                warn!("Cannot resize vertex {key:?}: {e}");
            }
        }
    }

    pub(crate) fn model_mut(&mut self) -> &mut QuasiProperLayoutGraph {
        &mut self.model
    }

    pub(crate) fn set_crossings(&mut self, crossings: usize) {
        self.crossings = crossings;
    }

    /// Centers and routes keyed by the caller identifiers
    ///
    /// Every routed path is traced as [`LayoutAction::EdgeRerouted`], in
    /// path order.
    pub(crate) fn diagram(
        &mut self,
        centers: &HashMap<VertexId, Point>,
        style: EdgeRoutingStyle,
        loop_gap: f64,
    ) -> DiagramLayout<N, E> {
        let vertex_centers = self
            .vertices
            .iter()
            .filter_map(|(&key, id)| Some((key, *centers.get(id)?)))
            .collect();

        let mut edge_routes = HashMap::with_capacity(self.edges.len());
        let mut routed = Vec::new();
        for path in self.model.paths() {
            let Some(&key) = self.path_keys.get(&path.id()) else {
                continue;
            };
            let route = route_path(&self.model, path, style);
            routed.push((path.id(), route.len()));
            edge_routes.insert(key, route);
        }
        for (path, points) in routed {
            self.model
                .trace(LayoutAction::EdgeRerouted { path, points }, None);
        }
        for (&key, slot) in &self.edges {
            if let EdgeSlot::Loop(vertex) = *slot {
                if let Some(route) = route_loop(&self.model, vertex, loop_gap) {
                    edge_routes.insert(key, route);
                }
            }
        }

        DiagramLayout {
            vertex_centers,
            edge_routes,
        }
    }

    fn lookup(&self, key: N) -> Result<VertexId, SessionError<N, E>> {
        self.vertex_id(key).ok_or(SessionError::VertexNotFound(key))
    }
}
