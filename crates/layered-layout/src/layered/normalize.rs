use super::model::{EdgeId, LayoutEdge, LayoutGraph, VertexId};
use std::collections::HashMap;
use tracing::debug;

/// Outcome of [`normalize`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// Self-loops taken out of the graph, with the vertex they looped on
    pub loops: Vec<(VertexId, LayoutEdge)>,
    /// Edges re-inserted in the opposite direction
    pub reversed: Vec<EdgeId>,
}

/// Remove self-loops and break cycles, leaving a DAG
///
/// Parallel edges are left untouched. Running it again on the result is a
/// no-op.
pub fn normalize(graph: &mut LayoutGraph) -> Normalized {
    let loops = remove_loops(graph);
    let reversed = remove_cycles_by_reversing_edges(graph);
    debug!(
        "Normalized graph: {} loops removed, {} edges reversed",
        loops.len(),
        reversed.len()
    );
    Normalized { loops, reversed }
}

/// Delete every edge whose source is its target
pub fn remove_loops(graph: &mut LayoutGraph) -> Vec<(VertexId, LayoutEdge)> {
    let loop_edges: Vec<_> = graph
        .edges()
        .filter(|&e| matches!(graph.endpoints(e), Ok((s, t)) if s == t))
        .collect();

    loop_edges
        .into_iter()
        .filter_map(|e| {
            let (vertex, _) = graph.endpoints(e).ok()?;
            let edge = graph.remove_edge(e).ok()?;
            Some((vertex, edge))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    OnStack,
    Done,
}

/// Reverse the back edges found by a depth-first traversal
///
/// Roots and neighbours are visited in creation order, so the choice of
/// reversed edge among several cycles only depends on the input order.
pub fn remove_cycles_by_reversing_edges(graph: &mut LayoutGraph) -> Vec<EdgeId> {
    let back_edges = find_back_edges(graph);
    back_edges
        .into_iter()
        .filter_map(|e| graph.reverse_edge(e).ok())
        .collect()
}

/// Edges whose target is on the DFS stack when they are explored
pub(crate) fn find_back_edges(graph: &LayoutGraph) -> Vec<EdgeId> {
    let mut state: HashMap<VertexId, Visit> = HashMap::new();
    let mut back_edges = Vec::new();
    let roots: Vec<_> = graph.vertices().collect();

    for root in roots {
        if state.contains_key(&root) {
            continue;
        }
        state.insert(root, Visit::OnStack);
        let mut stack = vec![(root, graph.out_edges(root), 0usize)];

        while let Some((vertex, edges, next)) = stack.last_mut() {
            let Some(&edge) = edges.get(*next) else {
                state.insert(*vertex, Visit::Done);
                stack.pop();
                continue;
            };
            *next += 1;

            let Ok((_, target)) = graph.endpoints(edge) else {
                continue;
            };
            match state.get(&target) {
                Some(Visit::OnStack) => back_edges.push(edge),
                Some(Visit::Done) => {}
                None => {
                    state.insert(target, Visit::OnStack);
                    stack.push((target, graph.out_edges(target), 0));
                }
            }
        }
    }

    back_edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Extent, Size};
    use petgraph::algo::is_cyclic_directed;
    use test_log::test;

    fn graph_with(names: &[&str], edges: &[(usize, usize)]) -> (LayoutGraph, Vec<VertexId>) {
        let mut graph = LayoutGraph::new();
        let ids: Vec<_> = names
            .iter()
            .map(|n| graph.add_vertex(Extent::new(*n, Size::new(1.0, 1.0))))
            .collect();
        for &(s, t) in edges {
            graph
                .add_edge(ids[s], ids[t], LayoutEdge::default())
                .unwrap();
        }
        (graph, ids)
    }

    #[test]
    fn loops_are_removed() {
        let (mut graph, ids) = graph_with(&["a", "b"], &[(0, 0), (0, 1), (1, 1)]);
        let normalized = normalize(&mut graph);
        assert_eq!(normalized.loops.len(), 2);
        assert_eq!(normalized.loops[0].0, ids[0]);
        assert_eq!(normalized.loops[1].0, ids[1]);
        assert_eq!(graph.edge_count(), 1);
        assert!(normalized.reversed.is_empty());
    }

    #[test]
    fn cycles_are_broken() {
        let (mut graph, _) = graph_with(
            &["a", "b", "c", "d"],
            &[(0, 1), (1, 2), (2, 3), (3, 0), (2, 0)],
        );
        assert!(is_cyclic_directed(graph.inner()));

        let normalized = normalize(&mut graph);
        assert!(!is_cyclic_directed(graph.inner()));
        assert_eq!(graph.edge_count(), 5);
        assert!(!normalized.reversed.is_empty());
        for e in &normalized.reversed {
            assert!(graph.edge(*e).unwrap().reversed);
        }
        assert!(find_back_edges(&graph).is_empty());
    }

    #[test]
    fn normal_graphs_are_left_alone() {
        let (mut graph, ids) = graph_with(&["a", "b", "c"], &[(0, 1), (1, 2), (0, 2), (0, 1)]);
        let normalized = normalize(&mut graph);
        assert_eq!(normalized, Normalized::default());
        // Parallel edges survive
        assert_eq!(graph.successors(ids[0]), vec![ids[1], ids[2], ids[1]]);
    }

    #[test]
    fn two_cycle_reverses_the_closing_edge() {
        let (mut graph, ids) = graph_with(&["a", "b"], &[(0, 1), (1, 0)]);
        let reversed = remove_cycles_by_reversing_edges(&mut graph);
        assert_eq!(reversed.len(), 1);
        assert_eq!(graph.endpoints(reversed[0]).unwrap(), (ids[0], ids[1]));
        assert_eq!(graph.successors(ids[0]).len(), 2);
    }
}
