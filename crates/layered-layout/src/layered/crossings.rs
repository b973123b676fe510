use super::model::{compare_names, VertexId};
use super::quasi_proper::QuasiProperLayoutGraph;
use crate::actions::LayoutAction;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Strict total order of the vertices of one layer
///
/// Vertices are ordered by the position of their primary parent in the layer
/// above, then by the name of the real vertex they stand for (a dummy stands
/// for the lower end of its path), then by handle.
pub struct SiblingOrder<'a> {
    model: &'a QuasiProperLayoutGraph,
}

impl<'a> SiblingOrder<'a> {
    pub fn new(model: &'a QuasiProperLayoutGraph) -> Self {
        Self { model }
    }

    pub fn compare(&self, a: VertexId, b: VertexId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let (ra, rb) = (self.representative(a), self.representative(b));
        self.anchor(a)
            .cmp(&self.anchor(b))
            .then_with(|| compare_names(self.name(ra), self.name(rb)))
            .then_with(|| ra.cmp(&rb))
            .then_with(|| a.cmp(&b))
    }

    fn anchor(&self, vertex: VertexId) -> Option<usize> {
        let parent = self.model.primary_parent(vertex).ok()??;
        Some(self.model.location(parent).ok()??.position)
    }

    fn representative(&self, vertex: VertexId) -> VertexId {
        self.model
            .path_of_dummy(vertex)
            .map_or(vertex, |path| path.source())
    }

    fn name(&self, vertex: VertexId) -> &str {
        self.model.graph().vertex(vertex).map_or("", |v| v.name())
    }
}

/// Order every layer below the first one from the order of the layer above
///
/// Vertices are gathered under their upper neighbours from left to right,
/// each group sorted with [`SiblingOrder`]. The first layer keeps its order.
pub fn initial_ordering(model: &mut QuasiProperLayoutGraph) {
    for index in 1..model.layers().len() {
        let (current, order) = {
            let layers = model.layers();
            let (Some(upper), Some(lower)) = (layers.get(index - 1), layers.get(index)) else {
                continue;
            };
            let members: HashSet<_> = lower.items().iter().copied().collect();
            let siblings = SiblingOrder::new(model);
            let mut placed = HashSet::new();
            let mut order = Vec::with_capacity(lower.len());

            for &vertex in upper.items() {
                let mut group: Vec<_> = model
                    .graph()
                    .predecessors(vertex)
                    .into_iter()
                    .filter(|v| members.contains(v) && !placed.contains(v))
                    .collect();
                group.sort_by(|&a, &b| siblings.compare(a, b));
                group.dedup();
                for v in group {
                    placed.insert(v);
                    order.push(v);
                }
            }
            order.extend(lower.items().iter().filter(|v| !placed.contains(*v)));
            (lower.items().to_vec(), order)
        };

        if current != order {
            model.layers_mut().set_order(index, order);
            model.trace(LayoutAction::LayerReordered { layer: index }, None);
        }
    }
}

/// Reduce crossings by swapping adjacent vertices
///
/// A swap is kept only when it strictly lowers the crossings around the
/// layer, so the result never has more crossings than the input. Returns the
/// final number of crossings.
pub fn minimize_crossings(model: &mut QuasiProperLayoutGraph, max_iterations: usize) -> usize {
    let initial = count_crossings(model);
    let mut touched = HashSet::new();

    for _ in 0..max_iterations {
        let mut improved = false;

        for layer_index in 0..model.layers().len() {
            let layer_len = model.layers().get(layer_index).map_or(0, |l| l.len());
            for i in 0..layer_len.saturating_sub(1) {
                let crossings_before = crossings_around(model, layer_index);
                model.layers_mut().swap(layer_index, i, i + 1);
                let crossings_after = crossings_around(model, layer_index);

                if crossings_after < crossings_before {
                    improved = true;
                    touched.insert(layer_index);
                } else {
                    // Swap back if no improvement
                    model.layers_mut().swap(layer_index, i, i + 1);
                }
            }
        }

        if !improved {
            break;
        }
    }

    let mut touched: Vec<_> = touched.into_iter().collect();
    touched.sort_unstable();
    for layer in touched {
        model.trace(LayoutAction::LayerReordered { layer }, None);
    }

    let crossings = count_crossings(model);
    debug!("Crossing reduction: {initial} -> {crossings}");
    crossings
}

/// Count the number of hop crossings between consecutive layers
pub fn count_crossings(model: &QuasiProperLayoutGraph) -> usize {
    (0..model.layers().len().saturating_sub(1))
        .map(|i| crossings_between(model, i))
        .sum()
}

fn crossings_around(model: &QuasiProperLayoutGraph, layer: usize) -> usize {
    let above = match layer.checked_sub(1) {
        Some(upper) => crossings_between(model, upper),
        None => 0,
    };
    above + crossings_between(model, layer)
}

/// Crossings between the hops joining layer `upper` and layer `upper + 1`
fn crossings_between(model: &QuasiProperLayoutGraph, upper: usize) -> usize {
    let (Some(upper_layer), Some(lower_layer)) =
        (model.layers().get(upper), model.layers().get(upper + 1))
    else {
        return 0;
    };
    let positions: HashMap<_, _> = upper_layer
        .items()
        .iter()
        .enumerate()
        .map(|(i, &v)| (v, i))
        .collect();

    let mut segments = Vec::new();
    for (i, &vertex) in lower_layer.items().iter().enumerate() {
        for target in model.graph().successors(vertex) {
            if let Some(&j) = positions.get(&target) {
                segments.push((i, j));
            }
        }
    }

    let mut crossings = 0;
    for (k, &(l1, u1)) in segments.iter().enumerate() {
        for &(l2, u2) in &segments[k + 1..] {
            if (l1 < l2 && u1 > u2) || (l1 > l2 && u1 < u2) {
                crossings += 1;
            }
        }
    }
    crossings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Extent, Size};
    use test_log::test;

    fn model_with(
        names: &[&str],
        edges: &[(usize, usize)],
    ) -> (QuasiProperLayoutGraph, Vec<VertexId>) {
        let mut model = QuasiProperLayoutGraph::new();
        let ids: Vec<_> = names
            .iter()
            .map(|n| model.add_vertex(Extent::new(*n, Size::new(10.0, 4.0))).value)
            .collect();
        for &(s, t) in edges {
            model.add_edge(ids[s], ids[t]).unwrap();
        }
        (model, ids)
    }

    fn items(model: &QuasiProperLayoutGraph, layer: usize) -> Vec<VertexId> {
        model.layers().get(layer).unwrap().items().to_vec()
    }

    #[test]
    fn siblings_are_sorted_by_name() {
        let (mut model, ids) = model_with(
            &["root", "zeta", "Beta", "alpha"],
            &[(1, 0), (2, 0), (3, 0)],
        );
        initial_ordering(&mut model);
        assert_eq!(items(&model, 1), vec![ids[3], ids[2], ids[1]]);
    }

    #[test]
    fn children_follow_their_parents() {
        // Two roots, each with two children added alternately
        let (mut model, ids) = model_with(
            &["l", "r", "r2", "l2", "r1", "l1"],
            &[(2, 1), (3, 0), (4, 1), (5, 0)],
        );
        initial_ordering(&mut model);
        assert_eq!(items(&model, 0), vec![ids[1], ids[0]]);
        assert_eq!(items(&model, 1), vec![ids[4], ids[2], ids[5], ids[3]]);
        assert_eq!(count_crossings(&model), 0);
    }

    #[test]
    fn dummies_sort_by_the_vertex_they_lead_to() {
        // "a" reaches the root through a dummy next to the real child "m"
        let (mut model, ids) = model_with(
            &["root", "m", "a", "n"],
            &[(1, 0), (2, 0), (2, 1), (3, 1)],
        );
        initial_ordering(&mut model);
        let layer = items(&model, 1);
        assert_eq!(layer.len(), 2);
        let dummy = layer[0];
        assert!(model.graph().vertex(dummy).unwrap().is_dummy());
        assert_eq!(model.path_of_dummy(dummy).unwrap().source(), ids[2]);
        assert_eq!(layer[1], ids[1]);
    }

    #[test]
    fn sibling_order_is_total() {
        let (model, ids) = model_with(&["root", "x", "X", "y"], &[(1, 0), (2, 0), (3, 0)]);
        let order = SiblingOrder::new(&model);
        for &a in &ids[1..] {
            assert_eq!(order.compare(a, a), Ordering::Equal);
            for &b in &ids[1..] {
                if a != b {
                    assert_eq!(order.compare(a, b), order.compare(b, a).reverse());
                    assert_ne!(order.compare(a, b), Ordering::Equal);
                }
            }
        }
        // Same name up to case, exact spelling decides
        assert_eq!(order.compare(ids[2], ids[1]), Ordering::Less);
    }

    #[test]
    fn swaps_only_keep_improvements() {
        let (mut model, ids) = model_with(&["a", "b", "c", "d"], &[(2, 0), (3, 1)]);
        // Cross the two edges by hand
        model.reposition(ids[3], 0).unwrap();
        assert_eq!(count_crossings(&model), 1);

        let crossings = minimize_crossings(&mut model, 10);
        assert_eq!(crossings, 0);
        assert_eq!(count_crossings(&model), 0);

        let again = minimize_crossings(&mut model, 10);
        assert_eq!(again, 0);
    }

    #[test]
    fn crossing_count_of_a_complete_bipartite_layer() {
        let (model, _) = model_with(
            &["a", "b", "c", "d"],
            &[(2, 0), (2, 1), (3, 0), (3, 1)],
        );
        assert_eq!(count_crossings(&model), 1);
    }
}
