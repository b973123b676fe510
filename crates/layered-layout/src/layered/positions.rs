use super::dummies::LayoutPath;
use super::model::VertexId;
use super::quasi_proper::QuasiProperLayoutGraph;
use super::EdgeRoutingStyle;
use crate::actions::LayoutAction;
use crate::{Point, Route, Size};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const EPSILON: f64 = 1e-9;

/// Spacing and iteration limits of coordinate assignment
#[derive(Debug, Clone, Copy)]
pub(crate) struct Spacing {
    pub vertical_gap: f64,
    pub horizontal_gap: f64,
    pub max_iterations: usize,
}

/// Horizontal state of one layer while balancing
#[derive(Debug, Clone, Default)]
struct Row {
    items: Vec<VertexId>,
    widths: Vec<f64>,
    xs: Vec<f64>,
    height: f64,
    center_y: f64,
}

impl Row {
    fn left(&self, i: usize) -> f64 {
        self.xs[i] - self.widths[i] / 2.0
    }

    fn right(&self, i: usize) -> f64 {
        self.xs[i] + self.widths[i] / 2.0
    }

    /// Center of the span covered by some items
    fn span_center(&self, items: &[usize]) -> Option<f64> {
        let left = items.iter().map(|&i| self.left(i)).reduce(f64::min)?;
        let right = items.iter().map(|&i| self.right(i)).reduce(f64::max)?;
        Some((left + right) / 2.0)
    }

    fn min_center(&self, i: usize, gap: f64) -> f64 {
        self.right(i - 1) + gap + self.widths[i] / 2.0
    }

    /// Move item `i` right to `x`, pushing its right neighbours if they overlap
    fn push_right(&mut self, i: usize, x: f64, gap: f64) {
        self.xs[i] = x;
        for k in i + 1..self.xs.len() {
            let min = self.min_center(k, gap);
            if self.xs[k] + EPSILON >= min {
                break;
            }
            self.xs[k] = min;
        }
    }

    /// Shift a sorted group of items right, pushing whatever they run into
    fn shift_group(&mut self, group: &[usize], delta: f64, gap: f64) {
        let Some(&first) = group.first() else {
            return;
        };
        for k in first..self.xs.len() {
            if group.contains(&k) {
                self.xs[k] += delta;
            }
            if k > 0 {
                let min = self.min_center(k, gap);
                if self.xs[k] < min {
                    self.xs[k] = min;
                }
            }
        }
    }
}

/// Assign a center to every vertex of the model
///
/// Layers are stacked top-down and packed left to right, then balanced so
/// parents sit above their children and sibling groups below their parents.
/// Unranked vertices get a row of their own below the last layer.
pub(crate) fn assign_coordinates(
    model: &mut QuasiProperLayoutGraph,
    spacing: Spacing,
) -> HashMap<VertexId, Point> {
    let mut rows = initial_rows(model, spacing);
    let rounds = balance(model, &mut rows, spacing);
    normalize_horizontal(&mut rows);

    let overflow = overflow_row(model, rows.last(), spacing);
    let mut centers = HashMap::new();

    for (index, row) in rows.iter().enumerate() {
        if let Some(layer) = model.layers_mut().layer_mut(index) {
            layer.set_metrics(row.height, row.center_y);
        }
    }
    for row in rows.iter().chain(overflow.as_ref()) {
        for (&vertex, &x) in row.items.iter().zip(&row.xs) {
            let center = Point::new(x, row.center_y);
            if let Ok(v) = model.graph_mut().vertex_mut(vertex) {
                v.set_center(center);
            }
            model.trace(LayoutAction::VertexPlaced { vertex, center }, None);
            centers.insert(vertex, center);
        }
    }

    debug!(
        "Placed {} vertices in {} layers after {} balancing rounds",
        centers.len(),
        rows.len(),
        rounds
    );
    centers
}

fn row_of(model: &QuasiProperLayoutGraph, items: Vec<VertexId>, gap: f64) -> Row {
    let sizes: Vec<Size> = items
        .iter()
        .map(|&v| model.graph().vertex(v).map_or(Size::zero(), |x| x.size()))
        .collect();
    let height = sizes.iter().map(|s| s.height).fold(0.0, f64::max);

    let mut xs = Vec::with_capacity(items.len());
    let mut x = 0.0;
    for size in &sizes {
        xs.push(x + size.width / 2.0);
        x += size.width + gap;
    }

    Row {
        items,
        widths: sizes.iter().map(|s| s.width).collect(),
        xs,
        height,
        center_y: 0.0,
    }
}

/// Center of a row stacked below `previous`, the first row sitting one gap
/// below the origin
fn stacked_center(previous: Option<&Row>, height: f64, gap: f64) -> f64 {
    let (center, previous_height) = previous.map_or((0.0, 0.0), |r| (r.center_y, r.height));
    center + previous_height / 2.0 + height / 2.0 + gap
}

fn initial_rows(model: &QuasiProperLayoutGraph, spacing: Spacing) -> Vec<Row> {
    let mut rows: Vec<Row> = Vec::with_capacity(model.layers().len());
    for layer in model.layers().iter() {
        let mut row = row_of(model, layer.items().to_vec(), spacing.horizontal_gap);
        row.center_y = stacked_center(rows.last(), row.height, spacing.vertical_gap);
        rows.push(row);
    }
    rows
}

fn overflow_row(
    model: &QuasiProperLayoutGraph,
    last: Option<&Row>,
    spacing: Spacing,
) -> Option<Row> {
    let unranked = model.unranked_vertices();
    if unranked.is_empty() {
        return None;
    }
    let mut row = row_of(model, unranked, spacing.horizontal_gap);
    row.center_y = stacked_center(last, row.height, spacing.vertical_gap);
    Some(row)
}

/// Run balancing sweeps until nothing moves, returning the number of sweeps
fn balance(model: &QuasiProperLayoutGraph, rows: &mut [Row], spacing: Spacing) -> usize {
    let gap = spacing.horizontal_gap;
    let index: HashMap<VertexId, (usize, usize)> = rows
        .iter()
        .enumerate()
        .flat_map(|(l, row)| row.items.iter().enumerate().map(move |(i, &v)| (v, (l, i))))
        .collect();

    let mut rounds = 0;
    while rounds < spacing.max_iterations {
        rounds += 1;
        let mut moved = false;
        for upper in 0..rows.len().saturating_sub(1) {
            let (top, bottom) = rows.split_at_mut(upper + 1);
            let (upper_row, lower_row) = (&mut top[upper], &mut bottom[0]);
            moved |= center_parents(model, &index, upper_row, lower_row, upper + 1, gap);
            moved |= center_children(model, &index, upper_row, lower_row, upper, gap);
        }
        if !moved {
            break;
        }
    }
    rounds
}

/// Move each upper vertex right above the middle of its children
fn center_parents(
    model: &QuasiProperLayoutGraph,
    index: &HashMap<VertexId, (usize, usize)>,
    upper: &mut Row,
    lower: &Row,
    lower_layer: usize,
    gap: f64,
) -> bool {
    let mut moved = false;
    for i in 0..upper.items.len() {
        let children: Vec<_> = model
            .graph()
            .predecessors(upper.items[i])
            .into_iter()
            .filter_map(|c| index.get(&c).filter(|(l, _)| *l == lower_layer).map(|&(_, p)| p))
            .collect();
        let Some(target) = lower.span_center(&children) else {
            continue;
        };
        if upper.xs[i] + EPSILON < target {
            upper.push_right(i, target, gap);
            moved = true;
        }
    }
    moved
}

/// Move each group of primary siblings right below the middle of its parents
fn center_children(
    model: &QuasiProperLayoutGraph,
    index: &HashMap<VertexId, (usize, usize)>,
    upper: &Row,
    lower: &mut Row,
    upper_layer: usize,
    gap: f64,
) -> bool {
    let in_upper = |v: VertexId| {
        index
            .get(&v)
            .filter(|(l, _)| *l == upper_layer)
            .map(|&(_, p)| p)
    };

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &vertex) in lower.items.iter().enumerate() {
        let anchor = model
            .primary_parent(vertex)
            .ok()
            .flatten()
            .and_then(|p| in_upper(p));
        if let Some(anchor) = anchor {
            groups.entry(anchor).or_default().push(i);
        }
    }

    let mut moved = false;
    for group in groups.values() {
        let mut parents: Vec<_> = group
            .iter()
            .flat_map(|&i| model.graph().successors(lower.items[i]))
            .filter_map(in_upper)
            .collect();
        parents.sort_unstable();
        parents.dedup();

        let (Some(current), Some(target)) = (lower.span_center(group), upper.span_center(&parents))
        else {
            continue;
        };
        if current + EPSILON < target {
            lower.shift_group(group, target - current, gap);
            moved = true;
        }
    }
    moved
}

/// Translate all rows so the leftmost edge is at zero
fn normalize_horizontal(rows: &mut [Row]) {
    let min_left = rows
        .iter()
        .filter(|r| !r.items.is_empty())
        .map(|r| r.left(0))
        .reduce(f64::min);
    let Some(min_left) = min_left else {
        return;
    };
    for row in rows.iter_mut() {
        for x in &mut row.xs {
            *x -= min_left;
        }
    }
}

/// Polyline of a path in the direction of the caller's edge
pub(crate) fn route_path(
    model: &QuasiProperLayoutGraph,
    path: &LayoutPath,
    style: EdgeRoutingStyle,
) -> Route {
    let mut points: Vec<Point> = path
        .vertices()
        .filter_map(|v| model.graph().vertex(v).ok()?.center())
        .collect();
    if path.is_reversed() {
        points.reverse();
    }
    match style {
        EdgeRoutingStyle::Direct => Route::new(points),
        EdgeRoutingStyle::Orthogonal => orthogonalize(&points),
    }
}

/// Replace slanted segments by a vertical, horizontal, vertical staircase
fn orthogonalize(points: &[Point]) -> Route {
    let mut route = Vec::with_capacity(points.len() * 3);
    for (i, &point) in points.iter().enumerate() {
        if let Some(&previous) = i.checked_sub(1).and_then(|j| points.get(j)) {
            if (previous.x - point.x).abs() > EPSILON {
                let mid_y = (previous.y + point.y) / 2.0;
                route.push(Point::new(previous.x, mid_y));
                route.push(Point::new(point.x, mid_y));
            }
        }
        route.push(point);
    }
    Route::new(route)
}

/// Small loop on the right side of a vertex
pub(crate) fn route_loop(
    model: &QuasiProperLayoutGraph,
    vertex: VertexId,
    gap: f64,
) -> Option<Route> {
    let v = model.graph().vertex(vertex).ok()?;
    let center = v.center()?;
    let x = center.x + v.width() / 2.0 + gap;
    let dy = v.height() / 4.0;
    Some(Route::new(vec![
        center,
        Point::new(x, center.y - dy),
        Point::new(x, center.y + dy),
        center,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Extent;
    use test_log::test;

    const SPACING: Spacing = Spacing {
        vertical_gap: 30.0,
        horizontal_gap: 15.0,
        max_iterations: 50,
    };

    fn model_with(
        sizes: &[(&str, f64, f64)],
        edges: &[(usize, usize)],
    ) -> (QuasiProperLayoutGraph, Vec<VertexId>) {
        let mut model = QuasiProperLayoutGraph::new();
        let ids: Vec<_> = sizes
            .iter()
            .map(|&(n, w, h)| model.add_vertex(Extent::new(n, Size::new(w, h))).value)
            .collect();
        for &(s, t) in edges {
            model.add_edge(ids[s], ids[t]).unwrap();
        }
        (model, ids)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn parent_is_centered_over_its_children() {
        let (mut model, ids) = model_with(
            &[("A", 1.0, 1.0), ("B", 1.0, 1.0), ("C", 1.0, 1.0)],
            &[(1, 0), (2, 0)],
        );
        let centers = assign_coordinates(&mut model, SPACING);
        assert_close(centers[&ids[0]].x, 8.5);
        assert_close(centers[&ids[1]].x, 0.5);
        assert_close(centers[&ids[2]].x, 16.5);
        assert_close(centers[&ids[0]].y, 30.5);
        assert_close(centers[&ids[1]].y, 61.5);
        assert_eq!(model.graph().vertex(ids[0]).unwrap().center(), Some(centers[&ids[0]]));
    }

    #[test]
    fn layers_stack_by_height() {
        let (mut model, ids) = model_with(
            &[("top", 10.0, 20.0), ("mid", 10.0, 40.0), ("side", 10.0, 10.0), ("low", 10.0, 5.0)],
            &[(1, 0), (2, 0), (3, 1)],
        );
        let centers = assign_coordinates(&mut model, SPACING);
        // 0 + 0 + 10 + 30, then 40 + 10 + 20 + 30, then 100 + 20 + 2.5 + 30
        assert_close(centers[&ids[0]].y, 40.0);
        assert_close(centers[&ids[1]].y, 100.0);
        assert_close(centers[&ids[2]].y, 100.0);
        assert_close(centers[&ids[3]].y, 152.5);

        let layer = model.layers().get(1).unwrap();
        assert_close(layer.height(), 40.0);
        assert_close(layer.center_y().unwrap(), 100.0);
    }

    #[test]
    fn vertices_in_a_layer_never_overlap() {
        let (mut model, _) = model_with(
            &[
                ("r", 30.0, 10.0),
                ("s", 5.0, 10.0),
                ("a", 20.0, 10.0),
                ("b", 7.0, 10.0),
                ("c", 12.0, 10.0),
                ("d", 3.0, 10.0),
            ],
            &[(2, 0), (3, 0), (4, 1), (5, 1), (5, 0), (4, 0)],
        );
        let centers = assign_coordinates(&mut model, SPACING);
        for layer in model.layers().iter() {
            for pair in layer.items().windows(2) {
                let (a, b) = (pair[0], pair[1]);
                let wa = model.graph().vertex(a).unwrap().width();
                let wb = model.graph().vertex(b).unwrap().width();
                let gap = (centers[&b].x - wb / 2.0) - (centers[&a].x + wa / 2.0);
                assert!(gap >= SPACING.horizontal_gap - 1e-6, "gap {gap}");
            }
        }
        let min_left = centers
            .iter()
            .map(|(v, c)| c.x - model.graph().vertex(*v).unwrap().width() / 2.0)
            .fold(f64::INFINITY, f64::min);
        assert_close(min_left, 0.0);
    }

    #[test]
    fn narrow_child_moves_under_wide_parent() {
        let (mut model, ids) =
            model_with(&[("wide", 40.0, 10.0), ("narrow", 4.0, 10.0)], &[(1, 0)]);
        let centers = assign_coordinates(&mut model, SPACING);
        assert_close(centers[&ids[0]].x, 20.0);
        assert_close(centers[&ids[1]].x, 20.0);
    }

    #[test]
    fn unranked_vertices_go_below() {
        let (mut model, ids) = model_with(
            &[("a", 10.0, 10.0), ("b", 10.0, 10.0), ("x", 6.0, 4.0), ("y", 6.0, 8.0)],
            &[(1, 0)],
        );
        let centers = assign_coordinates(&mut model, SPACING);
        let bottom = centers[&ids[1]].y;
        // 5 + 4 + 30 below the center of the last layer
        assert_close(centers[&ids[2]].y, bottom + 39.0);
        assert_close(centers[&ids[3]].y, bottom + 39.0);
        assert_close(centers[&ids[2]].x, 3.0);
        assert_close(centers[&ids[3]].x, 24.0);
    }

    #[test]
    fn routes_follow_the_dummy_chain() {
        let (mut model, ids) = model_with(
            &[("a", 10.0, 10.0), ("b", 10.0, 10.0), ("c", 10.0, 10.0)],
            &[(1, 0), (2, 1), (2, 0)],
        );
        assign_coordinates(&mut model, SPACING);
        let id = model.paths_between(ids[2], ids[0])[0];
        let path = model.path(id).unwrap().clone();

        let direct = route_path(&model, &path, EdgeRoutingStyle::Direct);
        assert_eq!(direct.len(), 3);
        let c = model.graph().vertex(ids[2]).unwrap().center().unwrap();
        let a = model.graph().vertex(ids[0]).unwrap().center().unwrap();
        assert_eq!(direct.first(), Some(c));
        assert_eq!(direct.last(), Some(a));

        let orthogonal = route_path(&model, &path, EdgeRoutingStyle::Orthogonal);
        assert!(orthogonal.len() >= direct.len());
        for pair in orthogonal.points.windows(2) {
            let (p, q) = (pair[0], pair[1]);
            assert!((p.x - q.x).abs() < 1e-9 || (p.y - q.y).abs() < 1e-9);
        }
    }

    #[test]
    fn reversed_paths_are_routed_backwards() {
        let (mut model, ids) =
            model_with(&[("a", 10.0, 10.0), ("b", 10.0, 10.0)], &[(1, 0), (0, 1)]);
        assign_coordinates(&mut model, SPACING);
        let id = model.paths_between(ids[0], ids[1])[0];
        let path = model.path(id).unwrap().clone();
        assert!(path.is_reversed());
        let route = route_path(&model, &path, EdgeRoutingStyle::Direct);
        let a = model.graph().vertex(ids[0]).unwrap().center().unwrap();
        assert_eq!(route.first(), Some(a));
    }

    #[test]
    fn loops_stick_out_on_the_right() {
        let (mut model, ids) = model_with(&[("a", 10.0, 8.0), ("b", 10.0, 8.0)], &[(1, 0)]);
        assign_coordinates(&mut model, SPACING);
        let route = route_loop(&model, ids[0], 15.0).unwrap();
        let center = model.graph().vertex(ids[0]).unwrap().center().unwrap();
        assert_eq!(route.len(), 4);
        assert_eq!(route.first(), Some(center));
        assert_eq!(route.last(), Some(center));
        assert_close(route.points[1].x, center.x + 20.0);
        assert_close(route.points[1].y, center.y - 2.0);
        assert_close(route.points[2].y, center.y + 2.0);
    }
}
