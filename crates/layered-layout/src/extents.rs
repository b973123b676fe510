use crate::Size;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// Box supplied by the caller for a real vertex
///
/// The name and priority only take part in tie-breaks (primary parent
/// selection and sibling ordering), the size drives coordinate assignment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Extent {
    pub name: String,
    pub size: Size,
    pub priority: i32,
}

impl Extent {
    /// Create an extent with the default priority
    pub fn new(name: impl Into<String>, size: Size) -> Self {
        Self {
            name: name.into(),
            size,
            priority: 0,
        }
    }

    /// Set the priority used when choosing between candidate parents
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn width(&self) -> f64 {
        self.size.width
    }

    pub fn height(&self) -> f64 {
        self.size.height
    }
}

impl From<Size> for Extent {
    fn from(size: Size) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }
}

/// Trait for providing vertex extents during layout computation
pub trait VertexExtents<N> {
    /// Get the extent of a vertex
    fn extent(&self, node: N) -> Extent;
}

// Blanket implementation for closures
impl<N, F> VertexExtents<N> for F
where
    F: Fn(N) -> Extent,
{
    fn extent(&self, node: N) -> Extent {
        self(node)
    }
}

// Implementation for HashMap
impl<N: Eq + Hash + Copy> VertexExtents<N> for HashMap<N, Extent> {
    fn extent(&self, node: N) -> Extent {
        self.get(&node).cloned().unwrap_or_default()
    }
}
