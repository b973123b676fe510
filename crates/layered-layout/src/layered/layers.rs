use super::model::{LayoutGraph, VertexId};
use crate::LayoutError;
use derive_more::Constructor;
use serde::{Deserialize, Serialize};

/// Slot of a vertex in the layering, without absolute coordinates
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Constructor, Serialize, Deserialize,
)]
pub struct RelativeLocation {
    pub layer: usize,
    pub position: usize,
}

/// Vertices sharing a rank, ordered left to right
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankLayer {
    index: usize,
    items: Vec<VertexId>,
    height: f64,
    center_y: Option<f64>,
}

impl RankLayer {
    fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn items(&self) -> &[VertexId] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position_of(&self, vertex: VertexId) -> Option<usize> {
        self.items.iter().position(|&v| v == vertex)
    }

    /// Tallest vertex of the layer, set by coordinate assignment
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Vertical center of the layer, `None` until coordinates are assigned
    pub fn center_y(&self) -> Option<f64> {
        self.center_y
    }

    pub(crate) fn set_metrics(&mut self, height: f64, center_y: f64) {
        self.height = height;
        self.center_y = Some(center_y);
    }
}

/// All the rank layers, layer `i` holding the vertices of rank `i`
///
/// Every mutation keeps the `rank` of the affected vertices in sync with the
/// layer holding them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankLayers {
    layers: Vec<RankLayer>,
}

impl RankLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankLayer> {
        self.layers.iter()
    }

    pub fn get(&self, index: usize) -> Option<&RankLayer> {
        self.layers.get(index)
    }

    /// All layered vertices, top layer first
    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.layers.iter().flat_map(|l| l.items.iter().copied())
    }

    /// Layer holding a vertex, looked up through the vertex rank
    pub fn layer_of(&self, graph: &LayoutGraph, vertex: VertexId) -> Option<&RankLayer> {
        let rank = graph.vertex(vertex).ok()?.rank()?;
        self.layers.get(rank)
    }

    pub fn location_of(&self, graph: &LayoutGraph, vertex: VertexId) -> Option<RelativeLocation> {
        let layer = self.layer_of(graph, vertex)?;
        let position = layer.position_of(vertex)?;
        Some(RelativeLocation::new(layer.index, position))
    }

    /// Append a vertex at the right end of a layer
    pub fn add_item(
        &mut self,
        graph: &mut LayoutGraph,
        rank: usize,
        vertex: VertexId,
    ) -> Result<RelativeLocation, LayoutError> {
        let position = self.layers.get(rank).map_or(0, |l| l.len());
        let location = RelativeLocation::new(rank, position);
        self.insert_item(graph, location, vertex)?;
        Ok(location)
    }

    /// Insert a vertex at a location, clamping the position to the layer
    pub fn insert_item(
        &mut self,
        graph: &mut LayoutGraph,
        location: RelativeLocation,
        vertex: VertexId,
    ) -> Result<usize, LayoutError> {
        let v = graph.vertex_mut(vertex)?;
        if v.rank().is_some() {
            return Err(LayoutError::VertexAlreadyLayered(vertex));
        }
        v.set_rank(Some(location.layer));

        while self.layers.len() <= location.layer {
            let index = self.layers.len();
            self.layers.push(RankLayer::new(index));
        }
        let layer = &mut self.layers[location.layer];
        let position = location.position.min(layer.items.len());
        layer.items.insert(position, vertex);
        Ok(position)
    }

    /// Take a vertex out of its layer, returning where it was
    pub fn remove_item(
        &mut self,
        graph: &mut LayoutGraph,
        vertex: VertexId,
    ) -> Result<RelativeLocation, LayoutError> {
        let location = self
            .location_of(graph, vertex)
            .ok_or(LayoutError::Unranked(vertex))?;
        self.layers[location.layer].items.remove(location.position);
        graph.vertex_mut(vertex)?.set_rank(None);
        Ok(location)
    }

    /// Move a vertex to another slot, possibly in another layer
    ///
    /// Returns the previous and the actual new location.
    pub fn move_item(
        &mut self,
        graph: &mut LayoutGraph,
        vertex: VertexId,
        to: RelativeLocation,
    ) -> Result<(RelativeLocation, RelativeLocation), LayoutError> {
        let from = self.remove_item(graph, vertex)?;
        let position = self.insert_item(graph, to, vertex)?;
        Ok((from, RelativeLocation::new(to.layer, position)))
    }

    /// Drop empty layers at the bottom
    pub fn trim(&mut self) {
        while self.layers.last().is_some_and(RankLayer::is_empty) {
            self.layers.pop();
        }
    }

    pub(crate) fn layer_mut(&mut self, index: usize) -> Option<&mut RankLayer> {
        self.layers.get_mut(index)
    }

    pub(crate) fn swap(&mut self, layer: usize, a: usize, b: usize) {
        if let Some(layer) = self.layers.get_mut(layer) {
            layer.items.swap(a, b);
        }
    }

    /// Replace the order of a layer with a permutation of its items
    pub(crate) fn set_order(&mut self, layer: usize, order: Vec<VertexId>) {
        if let Some(layer) = self.layers.get_mut(layer) {
            debug_assert_eq!(layer.items.len(), order.len());
            layer.items = order;
        }
    }
}
