//! Two-dimensional KD-tree over mesh node coordinates.

/// Squared Euclidean distance between `(y, x)` pairs.
fn distance2(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dy = a[0] - b[0];
    let dx = a[1] - b[1];
    dy * dy + dx * dx
}

#[derive(Debug, Clone)]
struct Node {
    /// Index into the caller's coordinate arrays.
    point: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Static KD-tree built once per dataset.
///
/// Nodes with non-finite coordinates are left out. Among nodes at the same
/// nearest distance the lowest original index wins, so repeated queries
/// against the same mesh are deterministic.
#[derive(Debug, Clone)]
pub struct KdTree {
    points: Vec<[f64; 2]>,
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl KdTree {
    /// Build from parallel `ys`/`xs` arrays; extra elements of the longer
    /// array are ignored.
    pub fn new(ys: &[f64], xs: &[f64]) -> Self {
        let points: Vec<[f64; 2]> = ys.iter().zip(xs).map(|(&y, &x)| [y, x]).collect();
        let mut indices: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| p[0].is_finite() && p[1].is_finite())
            .map(|(i, _)| i)
            .collect();

        let mut tree = Self {
            points,
            nodes: Vec::with_capacity(indices.len()),
            root: None,
        };
        tree.root = tree.build(&mut indices, 0);
        tree
    }

    fn build(&mut self, indices: &mut [usize], depth: usize) -> Option<usize> {
        if indices.is_empty() {
            return None;
        }

        let axis = depth % 2;
        let points = &self.points;
        indices.sort_by(|&a, &b| points[a][axis].total_cmp(&points[b][axis]).then(a.cmp(&b)));

        let mid = indices.len() / 2;
        let slot = self.nodes.len();
        self.nodes.push(Node {
            point: indices[mid],
            axis,
            left: None,
            right: None,
        });

        let (lower, upper) = indices.split_at_mut(mid);
        let left = self.build(lower, depth + 1);
        let right = self.build(&mut upper[1..], depth + 1);
        self.nodes[slot].left = left;
        self.nodes[slot].right = right;

        Some(slot)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index of the node nearest `(y, x)`, or `None` for an empty mesh.
    pub fn nearest(&self, y: f64, x: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        if let Some(root) = self.root {
            self.search(root, [y, x], &mut best);
        }
        best.map(|(i, _)| i)
    }

    fn search(&self, slot: usize, target: [f64; 2], best: &mut Option<(usize, f64)>) {
        let node = &self.nodes[slot];
        let point = self.points[node.point];

        let d = distance2(point, target);
        let better = match *best {
            None => true,
            Some((bi, bd)) => d < bd || (d == bd && node.point < bi),
        };
        if better {
            *best = Some((node.point, d));
        }

        let diff = target[node.axis] - point[node.axis];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(near) = near {
            self.search(near, target, best);
        }
        // Equal distances on the far side may still hold a lower index.
        if let Some(far) = far {
            if best.map_or(true, |(_, bd)| diff * diff <= bd) {
                self.search(far, target, best);
            }
        }
    }
}
