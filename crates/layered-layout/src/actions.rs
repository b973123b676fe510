//! Record of what the layout did
//!
//! Every mutation of the incremental model returns the [`LayoutAction`]s it
//! caused inside an [`Edit`]. When tracing is enabled the same actions, plus
//! the placement actions of coordinate assignment, are also kept in an
//! [`ActionLog`] whose edges link each action to the ones it triggered.

use crate::layered::{PathId, RelativeLocation, VertexId};
use crate::Point;
use derive_more::{Display, From};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutAction {
    VertexAdded {
        vertex: VertexId,
    },
    VertexRemoved {
        vertex: VertexId,
    },
    /// A vertex changed slot, `None` meaning outside of any layer
    VertexMoved {
        vertex: VertexId,
        from: Option<RelativeLocation>,
        to: Option<RelativeLocation>,
    },
    RankChanged {
        vertex: VertexId,
        from: Option<usize>,
        to: Option<usize>,
    },
    EdgeAdded {
        path: PathId,
        source: VertexId,
        target: VertexId,
    },
    EdgeRemoved {
        path: PathId,
    },
    /// The edge was stored in the opposite direction to keep the graph acyclic
    EdgeReversed {
        path: PathId,
    },
    LoopRemoved {
        vertex: VertexId,
    },
    /// Dummies added to a path
    PathSplit {
        path: PathId,
        dummies: Vec<VertexId>,
    },
    /// Dummies removed from a path
    PathMerged {
        path: PathId,
        dummies: Vec<VertexId>,
    },
    LayerReordered {
        layer: usize,
    },
    VertexPlaced {
        vertex: VertexId,
        center: Point,
    },
    EdgeRerouted {
        path: PathId,
        points: usize,
    },
}

/// Result of a mutation, with the actions it caused
#[derive(Debug, Clone, PartialEq)]
pub struct Edit<T> {
    pub value: T,
    pub actions: Vec<LayoutAction>,
}

impl<T> Edit<T> {
    pub fn new(value: T, actions: Vec<LayoutAction>) -> Self {
        Self { value, actions }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Edit<U> {
        Edit {
            value: f(self.value),
            actions: self.actions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Display)]
#[display("a{}", _0.index())]
pub struct ActionId(NodeIndex);

/// Causality graph of layout actions
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    graph: DiGraph<LayoutAction, ()>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action, linking it to the action that caused it
    pub fn record(&mut self, action: LayoutAction, cause: Option<ActionId>) -> ActionId {
        let id = self.graph.add_node(action);
        if let Some(cause) = cause.filter(|c| c.0.index() < id.index()) {
            self.graph.add_edge(cause.0, id, ());
        }
        ActionId(id)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn get(&self, id: ActionId) -> Option<&LayoutAction> {
        self.graph.node_weight(id.0)
    }

    /// Actions in recording order
    pub fn iter(&self) -> impl Iterator<Item = (ActionId, &LayoutAction)> {
        self.graph
            .node_indices()
            .map(|i| (ActionId(i), &self.graph[i]))
    }

    pub fn cause_of(&self, id: ActionId) -> Option<ActionId> {
        self.graph
            .neighbors_directed(id.0, Direction::Incoming)
            .next()
            .map(ActionId)
    }

    /// Actions directly triggered by the given one, in recording order
    pub fn effects_of(&self, id: ActionId) -> Vec<ActionId> {
        let mut effects: Vec<_> = self
            .graph
            .neighbors_directed(id.0, Direction::Outgoing)
            .map(ActionId)
            .collect();
        effects.sort();
        effects
    }

    /// Actions that were not caused by another one
    pub fn roots(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.graph
            .node_indices()
            .filter(|&i| {
                self.graph
                    .neighbors_directed(i, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(ActionId)
    }

    pub fn clear(&mut self) {
        self.graph.clear();
    }
}
