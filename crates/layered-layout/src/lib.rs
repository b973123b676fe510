//! Layered layout of class and type diagrams
//!
//! This crate lays out directed graphs whose edges point from a derived
//! element to its base, the way inheritance hierarchies are drawn: bases on
//! top, derived elements below, long edges routed through waypoints. It works
//! with any graph implementing petgraph's visitor traits.
//!
//! # Layout Engines
//!
//! - [`LayeredLayout`]: Sugiyama-style layered layout, with cycle breaking,
//!   crossing reduction and horizontal balancing
//!
//! The layering can also be kept in a [`LayoutSession`](layered::LayoutSession)
//! and edited vertex by vertex and edge by edge, only the part of the diagram
//! below an edit being re-layered.
//!
//! # Example
//!
//! ```
//! use layered_layout::{Extent, LayeredLayout, LayoutEngine, Size};
//! use petgraph::graphmap::DiGraphMap;
//!
//! // Create a graph, edges point from the derived type to its base
//! let mut graph = DiGraphMap::new();
//! graph.add_edge("Circle", "Shape", ());
//! graph.add_edge("Square", "Shape", ());
//!
//! // Create a layout engine
//! let engine = LayeredLayout::new(30.0, 15.0);
//!
//! // Provide vertex extents
//! let extents = |name: &str| Extent::new(name, Size::new(100.0, 50.0));
//!
//! // Use the LayoutEngine trait (simple, single-phase):
//! let layout = engine.layout(&graph, &extents).unwrap();
//! assert!(layout.vertex_centers["Shape"].y < layout.vertex_centers["Circle"].y);
//!
//! // Or directly by calling each step for better control
//! let mut session = engine.compute_layers(&graph, &extents).unwrap();
//! let layout = engine.compute_positions(&mut session, &extents);
//! assert_eq!(layout.edge_routes.len(), 2);
//! ```

mod actions;
mod engine;
mod error;
mod extents;
mod geometry;

pub mod layered;

// Re-export core types and traits
pub use actions::{ActionId, ActionLog, Edit, LayoutAction};
pub use engine::{DiagramLayout, LayoutEngine};
pub use error::{LayoutError, SessionError};
pub use extents::{Extent, VertexExtents};
pub use geometry::{Point, Rect, Route, Size};

// Re-export petgraph visitor traits for graph abstraction
pub use petgraph::visit::{IntoEdgeReferences, IntoNodeIdentifiers};

// Re-export layered layout types
pub use layered::{EdgeRoutingStyle, LayeredLayout, LayoutSession, QuasiProperLayoutGraph};
