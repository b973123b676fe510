//! Incrementally maintained proper layering
//!
//! [`QuasiProperLayoutGraph`] keeps a layered graph where every logical edge
//! is a [`LayoutPath`] of single-rank hops. Adding or removing edges and
//! vertices only re-ranks the vertices below the change and re-splits the
//! paths touching a vertex whose rank moved, instead of laying out the whole
//! graph again.

use super::dummies::{insert_dummies, LayoutPath};
use super::layers::{RankLayers, RelativeLocation};
use super::model::{compare_names, EdgeId, LayoutGraph, OriginId, PathId, VertexId};
use super::normalize::normalize;
use super::ranking::{build_layers, rank_sinks_first};
use crate::actions::{ActionId, ActionLog, Edit, LayoutAction};
use crate::{Extent, LayoutError, Size};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use tracing::{debug, trace};

/// What [`QuasiProperLayoutGraph::build`] had to change in the input graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prepared {
    /// Self-loops kept out of the layering, with their caller edge
    pub loops: Vec<(VertexId, Option<OriginId>)>,
    /// Number of edges reversed to break cycles
    pub reversed: usize,
    /// Vertices without any edge, left unranked
    pub isolated: Vec<VertexId>,
}

/// Layered graph kept proper across edits
///
/// Ranks follow `rank(v) = 0` for a vertex without parents and
/// `1 + max(rank(parent))` otherwise, where the parents of `v` are the
/// targets of its paths. A real vertex without any path has no rank and sits
/// in no layer.
#[derive(Debug, Clone, Default)]
pub struct QuasiProperLayoutGraph {
    graph: LayoutGraph,
    layers: RankLayers,
    paths: BTreeMap<PathId, LayoutPath>,
    next_path: usize,
    pending: Vec<LayoutAction>,
    log: Option<ActionLog>,
}

impl QuasiProperLayoutGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer a whole graph at once
    ///
    /// Loops are removed, cycles broken, the graph ranked sinks first and
    /// split into single-rank hops. Paths are numbered in edge order.
    pub fn build(mut graph: LayoutGraph) -> Result<(Self, Prepared), LayoutError> {
        let normalized = normalize(&mut graph);
        let ranking = rank_sinks_first(&graph)?;
        let mut layers = build_layers(&mut graph, &ranking)?;
        let paths = insert_dummies(&mut graph, &mut layers)?;

        let prepared = Prepared {
            loops: normalized
                .loops
                .into_iter()
                .map(|(vertex, edge)| (vertex, edge.origin))
                .collect(),
            reversed: normalized.reversed.len(),
            isolated: ranking.isolated,
        };
        let model = Self {
            graph,
            layers,
            next_path: paths.len(),
            paths: paths.into_iter().map(|p| (p.id(), p)).collect(),
            ..Default::default()
        };
        debug_assert!(model.is_proper());
        Ok((model, prepared))
    }

    pub fn graph(&self) -> &LayoutGraph {
        &self.graph
    }

    pub fn layers(&self) -> &RankLayers {
        &self.layers
    }

    pub fn path(&self, id: PathId) -> Result<&LayoutPath, LayoutError> {
        self.paths.get(&id).ok_or(LayoutError::PathNotFound(id))
    }

    /// All paths, by id
    pub fn paths(&self) -> impl Iterator<Item = &LayoutPath> {
        self.paths.values()
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// Paths of the caller edges going from `source` to `target`
    pub fn paths_between(&self, source: VertexId, target: VertexId) -> Vec<PathId> {
        self.paths
            .values()
            .filter(|p| p.caller_endpoints() == (source, target))
            .map(LayoutPath::id)
            .collect()
    }

    /// Path carried by a dummy vertex
    pub fn path_of_dummy(&self, dummy: VertexId) -> Option<&LayoutPath> {
        let vertex = self.graph.vertex(dummy).ok()?;
        if !vertex.is_dummy() {
            return None;
        }
        let hop = self.graph.out_edges(dummy).into_iter().next()?;
        let id = self.graph.edge(hop).ok()?.path?;
        self.paths.get(&id)
    }

    pub fn rank(&self, vertex: VertexId) -> Result<Option<usize>, LayoutError> {
        Ok(self.graph.vertex(vertex)?.rank())
    }

    pub fn location(&self, vertex: VertexId) -> Result<Option<RelativeLocation>, LayoutError> {
        self.graph.vertex(vertex)?;
        Ok(self.layers.location_of(&self.graph, vertex))
    }

    /// Real vertices outside of any layer, in creation order
    pub fn unranked_vertices(&self) -> Vec<VertexId> {
        self.graph
            .vertices()
            .filter(|&v| {
                self.graph
                    .vertex(v)
                    .is_ok_and(|x| !x.is_dummy() && x.rank().is_none())
            })
            .collect()
    }

    /// Whether every hop spans exactly one rank downwards
    pub fn is_proper(&self) -> bool {
        self.graph.edges().all(|e| self.hop_span(e) == Some(1))
    }

    /// Targets of the paths leaving a real vertex, without duplicates
    pub fn parents(&self, vertex: VertexId) -> Result<Vec<VertexId>, LayoutError> {
        self.real(vertex)?;
        let mut parents = Vec::new();
        for id in self.hop_paths(self.graph.out_edges(vertex)) {
            let target = self.path(id)?.target();
            if !parents.contains(&target) {
                parents.push(target);
            }
        }
        Ok(parents)
    }

    /// Sources of the paths reaching a real vertex, without duplicates
    pub fn children(&self, vertex: VertexId) -> Result<Vec<VertexId>, LayoutError> {
        self.real(vertex)?;
        let mut children = Vec::new();
        for id in self.hop_paths(self.graph.in_edges(vertex)) {
            let source = self.path(id)?.source();
            if !children.contains(&source) {
                children.push(source);
            }
        }
        Ok(children)
    }

    /// The parent a vertex is visually attached to
    ///
    /// Among the parents, the closest in rank wins, then the highest
    /// priority, then the name in case-insensitive order. A dummy is attached
    /// to its upper neighbour in the chain.
    pub fn primary_parent(&self, vertex: VertexId) -> Result<Option<VertexId>, LayoutError> {
        if self.graph.vertex(vertex)?.is_dummy() {
            return Ok(self.graph.successors(vertex).first().copied());
        }
        let parents = self.parents(vertex)?;
        Ok(parents
            .into_iter()
            .min_by(|&a, &b| self.parent_preference(a, b)))
    }

    /// Children whose primary parent is `vertex`, sorted by name
    pub fn primary_children(&self, vertex: VertexId) -> Result<Vec<VertexId>, LayoutError> {
        if self.graph.vertex(vertex)?.is_dummy() {
            return Ok(self.graph.predecessors(vertex));
        }
        let mut children = self.children(vertex)?;
        children.retain(|&c| matches!(self.primary_parent(c), Ok(Some(p)) if p == vertex));
        children.sort_by(|&a, &b| self.name_order(a, b));
        Ok(children)
    }

    /// Other primary children of the primary parent, empty for dummies
    pub fn primary_siblings(&self, vertex: VertexId) -> Result<Vec<VertexId>, LayoutError> {
        if self.graph.vertex(vertex)?.is_dummy() {
            return Ok(Vec::new());
        }
        let Some(parent) = self.primary_parent(vertex)? else {
            return Ok(Vec::new());
        };
        let mut siblings = self.primary_children(parent)?;
        siblings.retain(|&s| s != vertex);
        Ok(siblings)
    }

    pub fn enable_action_log(&mut self) {
        self.log.get_or_insert_with(ActionLog::new);
    }

    pub fn disable_action_log(&mut self) {
        self.log = None;
    }

    pub fn action_log(&self) -> Option<&ActionLog> {
        self.log.as_ref()
    }

    /// Add a real vertex, unranked until an edge reaches it
    pub fn add_vertex(&mut self, extent: Extent) -> Edit<VertexId> {
        self.pending.clear();
        let vertex = self.graph.add_vertex(extent);
        self.emit(LayoutAction::VertexAdded { vertex }, None);
        self.finish(vertex)
    }

    /// Add a logical edge from a child to its parent
    ///
    /// If the parent already descends from the child the edge is stored the
    /// other way around and flagged as reversed.
    ///
    /// # Errors
    /// Fails on unknown or dummy endpoints and on self-loops.
    pub fn add_edge(
        &mut self,
        source: VertexId,
        target: VertexId,
    ) -> Result<Edit<PathId>, LayoutError> {
        self.add_edge_with_origin(source, target, None)
    }

    pub(crate) fn add_edge_with_origin(
        &mut self,
        source: VertexId,
        target: VertexId,
        origin: Option<OriginId>,
    ) -> Result<Edit<PathId>, LayoutError> {
        self.pending.clear();
        self.real(source)?;
        self.real(target)?;
        if source == target {
            return Err(LayoutError::SelfLoop(source));
        }

        let reversed = self.is_ancestor(source, target)?;
        let (child, parent) = if reversed {
            (target, source)
        } else {
            (source, target)
        };

        let id = PathId(self.next_path);
        self.next_path += 1;
        let mut path = LayoutPath::new(id, child, parent, origin, reversed);
        // A direct hop makes the path visible to ranking before it is split
        path.link_hops(&mut self.graph)?;
        self.paths.insert(id, path);

        let cause = self.emit(
            LayoutAction::EdgeAdded {
                path: id,
                source: child,
                target: parent,
            },
            None,
        );
        if reversed {
            debug!("Edge {source} -> {target} closes a cycle, storing it reversed");
            self.emit(LayoutAction::EdgeReversed { path: id }, cause);
        }

        self.update_ranks(&[child, parent], cause)?;
        self.respan(id, cause)?;
        Ok(self.finish(id))
    }

    /// Remove a logical edge with all its dummies
    pub fn remove_edge(&mut self, id: PathId) -> Result<Edit<LayoutPath>, LayoutError> {
        self.pending.clear();
        let mut path = self.paths.remove(&id).ok_or(LayoutError::PathNotFound(id))?;
        let cause = self.emit(LayoutAction::EdgeRemoved { path: id }, None);
        self.dismantle(&mut path, cause)?;
        self.update_ranks(&[path.source(), path.target()], cause)?;
        Ok(self.finish(path))
    }

    /// Remove a real vertex and every edge touching it
    ///
    /// Returns the removed paths.
    pub fn remove_vertex(&mut self, vertex: VertexId) -> Result<Edit<Vec<PathId>>, LayoutError> {
        self.pending.clear();
        self.real(vertex)?;
        let mut neighbours = self.parents(vertex)?;
        neighbours.extend(self.children(vertex)?);
        let removed: Vec<_> = self.incident_paths(vertex).into_iter().collect();

        let cause = self.emit(LayoutAction::VertexRemoved { vertex }, None);
        for &id in &removed {
            let mut path = self.paths.remove(&id).ok_or(LayoutError::PathNotFound(id))?;
            let edge_cause = self.emit(LayoutAction::EdgeRemoved { path: id }, cause);
            self.dismantle(&mut path, edge_cause)?;
        }
        if self.graph.vertex(vertex)?.rank().is_some() {
            let from = self.layers.remove_item(&mut self.graph, vertex)?;
            self.emit(
                LayoutAction::VertexMoved {
                    vertex,
                    from: Some(from),
                    to: None,
                },
                cause,
            );
        }
        self.graph.remove_vertex(vertex)?;
        self.update_ranks(&neighbours, cause)?;
        Ok(self.finish(removed))
    }

    /// Move a vertex to another position inside its layer
    pub fn reposition(
        &mut self,
        vertex: VertexId,
        position: usize,
    ) -> Result<Edit<RelativeLocation>, LayoutError> {
        self.pending.clear();
        let rank = self
            .graph
            .vertex(vertex)?
            .rank()
            .ok_or(LayoutError::Unranked(vertex))?;
        let (from, to) = self.layers.move_item(
            &mut self.graph,
            vertex,
            RelativeLocation::new(rank, position),
        )?;
        self.emit(
            LayoutAction::VertexMoved {
                vertex,
                from: Some(from),
                to: Some(to),
            },
            None,
        );
        Ok(self.finish(to))
    }

    pub(crate) fn set_size(&mut self, vertex: VertexId, size: Size) -> Result<(), LayoutError> {
        self.graph.vertex_mut(vertex)?.set_size(size);
        Ok(())
    }

    pub(crate) fn graph_mut(&mut self) -> &mut LayoutGraph {
        &mut self.graph
    }

    pub(crate) fn layers_mut(&mut self) -> &mut RankLayers {
        &mut self.layers
    }

    /// Record an action in the log only, for the layout phases
    pub(crate) fn trace(
        &mut self,
        action: LayoutAction,
        cause: Option<ActionId>,
    ) -> Option<ActionId> {
        self.log.as_mut().map(|log| log.record(action, cause))
    }

    fn emit(&mut self, action: LayoutAction, cause: Option<ActionId>) -> Option<ActionId> {
        trace!("{action:?}");
        let id = self.trace(action.clone(), cause);
        self.pending.push(action);
        id
    }

    fn finish<T>(&mut self, value: T) -> Edit<T> {
        self.layers.trim();
        debug_assert!(self.is_proper());
        Edit::new(value, std::mem::take(&mut self.pending))
    }

    fn real(&self, vertex: VertexId) -> Result<(), LayoutError> {
        if self.graph.vertex(vertex)?.is_dummy() {
            return Err(LayoutError::DummyVertex(vertex));
        }
        Ok(())
    }

    fn hop_paths(&self, hops: Vec<EdgeId>) -> Vec<PathId> {
        hops.into_iter()
            .filter_map(|e| self.graph.edge(e).ok()?.path)
            .collect()
    }

    fn incident_paths(&self, vertex: VertexId) -> BTreeSet<PathId> {
        let mut hops = self.graph.out_edges(vertex);
        hops.extend(self.graph.in_edges(vertex));
        self.hop_paths(hops).into_iter().collect()
    }

    fn hop_span(&self, edge: EdgeId) -> Option<usize> {
        let (source, target) = self.graph.endpoints(edge).ok()?;
        let source_rank = self.graph.vertex(source).ok()?.rank()?;
        let target_rank = self.graph.vertex(target).ok()?.rank()?;
        source_rank.checked_sub(target_rank)
    }

    /// Closer parents first, then higher priority, then name
    fn parent_preference(&self, a: VertexId, b: VertexId) -> Ordering {
        let (Ok(va), Ok(vb)) = (self.graph.vertex(a), self.graph.vertex(b)) else {
            return a.cmp(&b);
        };
        vb.rank()
            .cmp(&va.rank())
            .then_with(|| vb.priority().cmp(&va.priority()))
            .then_with(|| compare_names(va.name(), vb.name()))
            .then_with(|| a.cmp(&b))
    }

    fn name_order(&self, a: VertexId, b: VertexId) -> Ordering {
        let name = |v| self.graph.vertex(v).map_or("", |x| x.name());
        compare_names(name(a), name(b)).then_with(|| a.cmp(&b))
    }

    /// Whether `ancestor` is reached from `vertex` by walking up its parents
    fn is_ancestor(&self, ancestor: VertexId, vertex: VertexId) -> Result<bool, LayoutError> {
        let mut seen = HashSet::new();
        let mut stack = vec![vertex];
        while let Some(v) = stack.pop() {
            if v == ancestor {
                return Ok(true);
            }
            if seen.insert(v) {
                stack.extend(self.parents(v)?);
            }
        }
        Ok(false)
    }

    fn computed_rank(&self, vertex: VertexId) -> Result<Option<usize>, LayoutError> {
        let parents = self.parents(vertex)?;
        if parents.is_empty() {
            return Ok((!self.children(vertex)?.is_empty()).then_some(0));
        }
        let mut rank = 0;
        for parent in parents {
            let parent_rank = self
                .graph
                .vertex(parent)?
                .rank()
                .ok_or(LayoutError::Unranked(parent))?;
            rank = rank.max(parent_rank + 1);
        }
        Ok(Some(rank))
    }

    /// Recompute the ranks of the seeds and everything below them
    ///
    /// Vertices are visited parents first, moved vertices are re-placed in
    /// their new layer and the paths touching them are split again.
    fn update_ranks(
        &mut self,
        seeds: &[VertexId],
        cause: Option<ActionId>,
    ) -> Result<(), LayoutError> {
        let mut affected = BTreeSet::new();
        let mut stack = seeds.to_vec();
        while let Some(v) = stack.pop() {
            if self.graph.contains_vertex(v) && affected.insert(v) {
                stack.extend(self.children(v)?);
            }
        }

        let mut waiting = BTreeMap::new();
        for &v in &affected {
            let count = self
                .parents(v)?
                .iter()
                .filter(|p| affected.contains(*p))
                .count();
            waiting.insert(v, count);
        }
        let mut ready: VecDeque<_> = waiting
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&v, _)| v)
            .collect();

        let mut moved = Vec::new();
        while let Some(v) = ready.pop_front() {
            let from = self.graph.vertex(v)?.rank();
            let to = self.computed_rank(v)?;
            if from != to {
                self.relocate(v, from, to, cause)?;
                moved.push(v);
            }
            for child in self.children(v)? {
                if let Some(count) = waiting.get_mut(&child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(child);
                    }
                }
            }
        }

        let touched: BTreeSet<_> = moved
            .iter()
            .flat_map(|&v| self.incident_paths(v))
            .collect();
        if !moved.is_empty() {
            debug!(
                "Re-ranked {} of {} vertices, re-splitting {} paths",
                moved.len(),
                affected.len(),
                touched.len()
            );
        }
        for id in touched {
            self.respan(id, cause)?;
        }
        Ok(())
    }

    fn relocate(
        &mut self,
        vertex: VertexId,
        from_rank: Option<usize>,
        to_rank: Option<usize>,
        cause: Option<ActionId>,
    ) -> Result<(), LayoutError> {
        let rank_change = self.emit(
            LayoutAction::RankChanged {
                vertex,
                from: from_rank,
                to: to_rank,
            },
            cause,
        );
        let from = match from_rank {
            Some(_) => Some(self.layers.remove_item(&mut self.graph, vertex)?),
            None => None,
        };
        let to = match to_rank {
            Some(rank) => {
                let upper = self.primary_parent(vertex)?;
                let location = self.placement(upper, rank);
                let position = self.layers.insert_item(&mut self.graph, location, vertex)?;
                Some(RelativeLocation::new(rank, position))
            }
            None => None,
        };
        self.emit(LayoutAction::VertexMoved { vertex, from, to }, rank_change);
        Ok(())
    }

    /// Slot for a new vertex of `rank` hanging below `upper`
    ///
    /// The vertex goes right after the last vertex of the layer whose leftmost
    /// upper neighbour is not right of `upper`. Without an upper neighbour in
    /// the layer above it is appended.
    fn placement(&self, upper: Option<VertexId>, rank: usize) -> RelativeLocation {
        let len = self.layers.get(rank).map_or(0, |l| l.len());
        let anchor = upper
            .and_then(|u| self.layers.location_of(&self.graph, u))
            .filter(|l| l.layer + 1 == rank);
        let (Some(anchor), Some(layer)) = (anchor, self.layers.get(rank)) else {
            return RelativeLocation::new(rank, len);
        };
        let position = layer
            .items()
            .iter()
            .rposition(|&w| {
                self.upper_position(w, rank)
                    .is_some_and(|p| p <= anchor.position)
            })
            .map_or(0, |i| i + 1);
        RelativeLocation::new(rank, position)
    }

    /// Leftmost position of the neighbours of a vertex in the layer above
    fn upper_position(&self, vertex: VertexId, rank: usize) -> Option<usize> {
        let upper = self.layers.get(rank.checked_sub(1)?)?;
        self.graph
            .successors(vertex)
            .into_iter()
            .filter_map(|s| upper.position_of(s))
            .min()
    }

    /// Bring the dummy chain of a path in line with its endpoint ranks
    fn respan(&mut self, id: PathId, cause: Option<ActionId>) -> Result<(), LayoutError> {
        let path = self.path(id)?;
        let (child, parent) = (path.source(), path.target());
        let child_rank = self
            .graph
            .vertex(child)?
            .rank()
            .ok_or(LayoutError::Unranked(child))?;
        let parent_rank = self
            .graph
            .vertex(parent)?
            .rank()
            .ok_or(LayoutError::Unranked(parent))?;

        let wanted: Vec<_> = (parent_rank + 1..child_rank).rev().map(Some).collect();
        let current: Vec<_> = path
            .dummies()
            .iter()
            .map(|&d| self.graph.vertex(d).ok().and_then(|x| x.rank()))
            .collect();
        let linked = path.len() == path.dummies().len() + 1
            && path.hops().iter().all(|&e| self.graph.contains_edge(e));
        if linked && current == wanted {
            return Ok(());
        }

        let old_dummies = path.dummies().to_vec();
        let old_hops = self
            .paths
            .get_mut(&id)
            .ok_or(LayoutError::PathNotFound(id))?
            .take_hops();
        for hop in old_hops {
            if self.graph.contains_edge(hop) {
                self.graph.remove_edge(hop)?;
            }
        }

        let mut kept = BTreeMap::new();
        let mut merged = Vec::new();
        for dummy in old_dummies {
            match self.graph.vertex(dummy)?.rank() {
                Some(rank)
                    if rank > parent_rank && rank < child_rank && !kept.contains_key(&rank) =>
                {
                    kept.insert(rank, dummy);
                }
                rank => {
                    if rank.is_some() {
                        self.layers.remove_item(&mut self.graph, dummy)?;
                    }
                    self.graph.remove_vertex(dummy)?;
                    merged.push(dummy);
                }
            }
        }

        let mut split = Vec::new();
        for rank in parent_rank + 1..child_rank {
            if kept.contains_key(&rank) {
                continue;
            }
            let upper = if rank == parent_rank + 1 {
                Some(parent)
            } else {
                kept.get(&(rank - 1)).copied()
            };
            let location = self.placement(upper, rank);
            let dummy = self.graph.add_dummy();
            self.layers.insert_item(&mut self.graph, location, dummy)?;
            kept.insert(rank, dummy);
            split.push(dummy);
        }

        let path = self
            .paths
            .get_mut(&id)
            .ok_or(LayoutError::PathNotFound(id))?;
        path.set_dummies(kept.values().rev().copied().collect());
        path.link_hops(&mut self.graph)?;

        if !merged.is_empty() {
            self.emit(LayoutAction::PathMerged { path: id, dummies: merged }, cause);
        }
        if !split.is_empty() {
            self.emit(LayoutAction::PathSplit { path: id, dummies: split }, cause);
        }
        Ok(())
    }

    /// Remove the hops and dummies of a path taken out of the model
    fn dismantle(
        &mut self,
        path: &mut LayoutPath,
        cause: Option<ActionId>,
    ) -> Result<(), LayoutError> {
        for hop in path.take_hops() {
            if self.graph.contains_edge(hop) {
                self.graph.remove_edge(hop)?;
            }
        }
        let dummies = path.dummies().to_vec();
        for &dummy in &dummies {
            if self.graph.vertex(dummy)?.rank().is_some() {
                self.layers.remove_item(&mut self.graph, dummy)?;
            }
            self.graph.remove_vertex(dummy)?;
        }
        path.set_dummies(Vec::new());
        if !dummies.is_empty() {
            self.emit(
                LayoutAction::PathMerged {
                    path: path.id(),
                    dummies,
                },
                cause,
            );
        }
        Ok(())
    }
}
