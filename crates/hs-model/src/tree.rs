//! Second-order regression trees fitted to gradient/hessian pairs.
//!
//! Split search is exact greedy over presorted row lists: every open node
//! keeps, for each sampled feature, its rows ordered by that feature, and a
//! split partitions those lists in place of re-sorting.

use hs_types::Dataset;

/// Minimum loss reduction for a split to be considered at all.
const RT_EPS: f64 = 1e-6;

/// Order in which candidate nodes are expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowPolicy {
    /// Split every splittable node, level by level.
    Depthwise,
    /// Always split the node with the largest loss reduction first; bounded
    /// by `max_leaves` when that is non-zero.
    Lossguide,
}

#[derive(Debug, Clone)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub max_leaves: usize,
    pub lambda: f64,
    pub alpha: f64,
    pub gamma: f64,
    pub min_child_weight: f64,
    pub eta: f64,
    pub grow_policy: GrowPolicy,
}

impl TreeParams {
    /// L1-thresholded gradient sum.
    fn threshold_l1(&self, g: f64) -> f64 {
        if g > self.alpha {
            g - self.alpha
        } else if g < -self.alpha {
            g + self.alpha
        } else {
            0.0
        }
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        let t = self.threshold_l1(g);
        t * t / denom
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -self.threshold_l1(g) / denom * self.eta
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted regression tree. Rows with `x[feature] < threshold` go left.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    /// Position within the sampled feature list.
    feature_pos: usize,
    threshold: f64,
    gain: f64,
    left_g: f64,
    left_h: f64,
}

struct OpenNode {
    node: usize,
    depth: usize,
    /// Node rows sorted by each sampled feature.
    sorted: Vec<Vec<usize>>,
    g: f64,
    h: f64,
    split: SplitCandidate,
}

/// Grow one tree on `rows`, considering only `features`. `grad` and `hess`
/// are indexed by dataset row.
pub(crate) fn grow_tree(
    dataset: &Dataset,
    rows: &[usize],
    features: &[usize],
    grad: &[f64],
    hess: &[f64],
    params: &TreeParams,
) -> RegressionTree {
    let g: f64 = rows.iter().map(|&r| grad[r]).sum();
    let h: f64 = rows.iter().map(|&r| hess[r]).sum();
    let mut nodes = vec![Node::Leaf {
        value: params.leaf_value(g, h),
    }];

    if rows.is_empty() || features.is_empty() || params.max_depth == 0 {
        return RegressionTree { nodes };
    }

    let sorted: Vec<Vec<usize>> = features
        .iter()
        .map(|&f| {
            let mut order = rows.to_vec();
            order.sort_by(|&a, &b| dataset.row(a)[f].total_cmp(&dataset.row(b)[f]));
            order
        })
        .collect();

    let mut open = Vec::new();
    if let Some(split) = find_split(dataset, features, &sorted, grad, hess, g, h, params) {
        open.push(OpenNode {
            node: 0,
            depth: 0,
            sorted,
            g,
            h,
            split,
        });
    }

    let mut goes_left = vec![false; dataset.len()];
    let mut leaves = 1usize;

    while !open.is_empty() {
        let pick = match params.grow_policy {
            GrowPolicy::Depthwise => 0,
            GrowPolicy::Lossguide => {
                if params.max_leaves > 0 && leaves >= params.max_leaves {
                    break;
                }
                open.iter()
                    .enumerate()
                    .max_by(|a, b| a.1.split.gain.total_cmp(&b.1.split.gain))
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            }
        };
        let current = open.remove(pick);
        let split = current.split;
        let feature = features[split.feature_pos];

        for &r in &current.sorted[0] {
            goes_left[r] = dataset.row(r)[feature] < split.threshold;
        }
        let (left_sorted, right_sorted): (Vec<Vec<usize>>, Vec<Vec<usize>>) = current
            .sorted
            .into_iter()
            .map(|order| order.into_iter().partition::<Vec<usize>, _>(|&r| goes_left[r]))
            .unzip();

        let (lg, lh) = (split.left_g, split.left_h);
        let (rg, rh) = (current.g - lg, current.h - lh);
        let left = nodes.len();
        nodes.push(Node::Leaf {
            value: params.leaf_value(lg, lh),
        });
        let right = nodes.len();
        nodes.push(Node::Leaf {
            value: params.leaf_value(rg, rh),
        });
        nodes[current.node] = Node::Split {
            feature,
            threshold: split.threshold,
            left,
            right,
        };
        leaves += 1;

        let depth = current.depth + 1;
        if depth >= params.max_depth {
            continue;
        }
        for (node, sorted, g, h) in [(left, left_sorted, lg, lh), (right, right_sorted, rg, rh)] {
            if let Some(split) = find_split(dataset, features, &sorted, grad, hess, g, h, params) {
                open.push(OpenNode {
                    node,
                    depth,
                    sorted,
                    g,
                    h,
                    split,
                });
            }
        }
    }

    RegressionTree { nodes }
}

#[allow(clippy::too_many_arguments)]
fn find_split(
    dataset: &Dataset,
    features: &[usize],
    sorted: &[Vec<usize>],
    grad: &[f64],
    hess: &[f64],
    g: f64,
    h: f64,
    params: &TreeParams,
) -> Option<SplitCandidate> {
    let parent_score = params.score(g, h);
    let mut best: Option<SplitCandidate> = None;

    for (feature_pos, order) in sorted.iter().enumerate() {
        let f = features[feature_pos];
        let mut lg = 0.0;
        let mut lh = 0.0;

        for pair in order.windows(2) {
            let (row, next) = (pair[0], pair[1]);
            lg += grad[row];
            lh += hess[row];

            let v = dataset.row(row)[f];
            let v_next = dataset.row(next)[f];
            if v_next <= v {
                continue;
            }
            let (rg, rh) = (g - lg, h - lh);
            if lh < params.min_child_weight || rh < params.min_child_weight {
                continue;
            }

            let gain = 0.5 * (params.score(lg, lh) + params.score(rg, rh) - parent_score)
                - params.gamma;
            if gain <= RT_EPS || best.is_some_and(|b| gain <= b.gain) {
                continue;
            }

            let mid = v + (v_next - v) / 2.0;
            let threshold = if mid > v { mid } else { v_next };
            best = Some(SplitCandidate {
                feature_pos,
                threshold,
                gain,
                left_g: lg,
                left_h: lh,
            });
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(policy: GrowPolicy) -> TreeParams {
        TreeParams {
            max_depth: 4,
            max_leaves: 0,
            lambda: 0.0,
            alpha: 0.0,
            gamma: 0.0,
            min_child_weight: 0.0,
            eta: 1.0,
            grow_policy: policy,
        }
    }

    /// Squared-error gradients for targets `y` at prediction 0: g = -y, h = 1.
    fn gradients(targets: &[f64]) -> (Vec<f64>, Vec<f64>) {
        (targets.iter().map(|y| -y).collect(), vec![1.0; targets.len()])
    }

    fn step_data() -> (Dataset, Vec<f64>) {
        let features: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64, 0.0]).collect();
        let targets = vec![-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0];
        (Dataset::new(features, vec![0; 8]).unwrap(), targets)
    }

    #[test]
    fn fits_a_step_function() {
        let (ds, targets) = step_data();
        let (grad, hess) = gradients(&targets);
        let rows: Vec<usize> = (0..8).collect();
        let tree = grow_tree(&ds, &rows, &[0, 1], &grad, &hess, &params(GrowPolicy::Depthwise));

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(&[1.0, 0.0]), -1.0);
        assert_eq!(tree.predict(&[6.0, 0.0]), 1.0);
        // threshold sits between 3 and 4
        assert_eq!(tree.predict(&[3.4, 0.0]), -1.0);
        assert_eq!(tree.predict(&[3.6, 0.0]), 1.0);
    }

    #[test]
    fn respects_max_depth() {
        let features: Vec<Vec<f64>> = (0..16).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..16).map(|i| (i * i) as f64).collect();
        let ds = Dataset::new(features, vec![0; 16]).unwrap();
        let (grad, hess) = gradients(&targets);
        let rows: Vec<usize> = (0..16).collect();

        let mut p = params(GrowPolicy::Depthwise);
        p.max_depth = 2;
        let tree = grow_tree(&ds, &rows, &[0], &grad, &hess, &p);
        assert_eq!(tree.depth(), 2);
        assert!(tree.n_leaves() <= 4);
    }

    #[test]
    fn lossguide_respects_leaf_budget() {
        let features: Vec<Vec<f64>> = (0..16).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..16).map(|i| (i * i) as f64).collect();
        let ds = Dataset::new(features, vec![0; 16]).unwrap();
        let (grad, hess) = gradients(&targets);
        let rows: Vec<usize> = (0..16).collect();

        let mut p = params(GrowPolicy::Lossguide);
        p.max_leaves = 3;
        let tree = grow_tree(&ds, &rows, &[0], &grad, &hess, &p);
        assert_eq!(tree.n_leaves(), 3);
    }

    #[test]
    fn unlimited_lossguide_matches_depthwise_predictions() {
        let (ds, targets) = step_data();
        let (grad, hess) = gradients(&targets);
        let rows: Vec<usize> = (0..8).collect();
        let a = grow_tree(&ds, &rows, &[0], &grad, &hess, &params(GrowPolicy::Depthwise));
        let b = grow_tree(&ds, &rows, &[0], &grad, &hess, &params(GrowPolicy::Lossguide));
        for x in 0..8 {
            assert_eq!(a.predict(&[x as f64, 0.0]), b.predict(&[x as f64, 0.0]));
        }
    }

    #[test]
    fn gamma_prunes_weak_splits() {
        let (ds, targets) = step_data();
        let (grad, hess) = gradients(&targets);
        let rows: Vec<usize> = (0..8).collect();
        let mut p = params(GrowPolicy::Depthwise);
        p.gamma = 100.0;
        let tree = grow_tree(&ds, &rows, &[0], &grad, &hess, &p);
        assert_eq!(tree.n_leaves(), 1);
    }

    #[test]
    fn min_child_weight_blocks_small_children() {
        let (ds, targets) = step_data();
        let (grad, hess) = gradients(&targets);
        let rows: Vec<usize> = (0..8).collect();
        let mut p = params(GrowPolicy::Depthwise);
        p.min_child_weight = 5.0;
        let tree = grow_tree(&ds, &rows, &[0], &grad, &hess, &p);
        assert_eq!(tree.n_leaves(), 1);
    }

    #[test]
    fn lambda_and_eta_shrink_leaves() {
        let (ds, targets) = step_data();
        let (grad, hess) = gradients(&targets);
        let rows: Vec<usize> = (0..8).collect();
        let mut p = params(GrowPolicy::Depthwise);
        p.lambda = 4.0;
        p.eta = 0.5;
        let tree = grow_tree(&ds, &rows, &[0], &grad, &hess, &p);
        // leaf = -G / (H + lambda) * eta = 4 / 8 * 0.5
        assert_eq!(tree.predict(&[7.0, 0.0]), 0.25);
    }

    #[test]
    fn constant_feature_cannot_split() {
        let (ds, targets) = step_data();
        let (grad, hess) = gradients(&targets);
        let rows: Vec<usize> = (0..8).collect();
        let tree = grow_tree(&ds, &rows, &[1], &grad, &hess, &params(GrowPolicy::Depthwise));
        assert_eq!(tree.n_leaves(), 1);
    }
}
