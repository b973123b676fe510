use crate::layered::{EdgeId, PathId, VertexId};
use std::fmt;
use thiserror::Error;

/// Errors raised by the layout graph and its incremental model
///
/// All of them are precondition failures of the offending call: the graph is
/// left untouched and retrying without changing the input cannot succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("vertex {0} is not part of the layout graph")]
    VertexNotFound(VertexId),

    #[error("edge {0} is not part of the layout graph")]
    EdgeNotFound(EdgeId),

    #[error("path {0} is not part of the layout graph")]
    PathNotFound(PathId),

    /// The operation only applies to real vertices
    #[error("vertex {0} is a dummy vertex")]
    DummyVertex(VertexId),

    #[error("self-loop on vertex {0} cannot be layered")]
    SelfLoop(VertexId),

    #[error("vertex {0} already belongs to a rank layer")]
    VertexAlreadyLayered(VertexId),

    #[error("vertex {0} has not been assigned a rank")]
    Unranked(VertexId),

    /// An edge whose source is not ranked below its target
    #[error("edge {edge} does not point to a lower rank")]
    RankOrder { edge: EdgeId },

    /// Ranking was attempted before cycles were removed
    #[error("graph contains a cycle at vertex {0}")]
    GraphHasCycle(VertexId),
}

/// Errors raised by a keyed layout session
#[derive(Debug, Error)]
pub enum SessionError<N, E>
where
    N: fmt::Debug,
    E: fmt::Debug,
{
    #[error("vertex {0:?} already exists")]
    VertexExists(N),

    #[error("edge {0:?} already exists")]
    EdgeExists(E),

    #[error("vertex {0:?} not found")]
    VertexNotFound(N),

    #[error("edge {0:?} not found")]
    EdgeNotFound(E),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}
