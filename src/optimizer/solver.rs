//! Levenberg-Marquardt solve of one connected component.
//!
//! Each component is handled in three phases:
//! 1. INITIALIZE: integrate odometry edges from the anchor (or keep a warm
//!    estimate) to get a consistent starting point
//! 2. SOLVE: damped Gauss-Newton on the weighted edge residuals, with the
//!    anchor held fixed
//! 3. REPORT: per-component iteration count, costs and convergence flag
//!
//! Poses are updated on the right, `T <- T * exp(delta)`, so the rotational
//! update is always well defined regardless of the current orientation.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector, Matrix6, Vector6};

use super::OptimizerConfig;
use crate::geometry::SE3;
use crate::measurement::{Edge, FrameIndex};

/// Step for central-difference Jacobians.
const JACOBIAN_EPS: f64 = 1e-6;

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_UP: f64 = 10.0;
const LAMBDA_DOWN: f64 = 0.1;
const MIN_LAMBDA: f64 = 1e-10;
const MAX_LAMBDA: f64 = 1e10;

/// Outcome of solving one connected component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentReport {
    /// Lowest node of the component, held fixed during the solve.
    pub anchor: FrameIndex,
    pub nodes: usize,
    pub edges: usize,
    pub iterations: usize,
    /// Weighted squared residual before the first iteration.
    pub initial_cost: f64,
    pub final_cost: f64,
    pub converged: bool,
    /// Whether the solve started from the previous estimate.
    pub warm_start: bool,
}

/// Summary of one full optimization pass over the graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveReport {
    pub components: Vec<ComponentReport>,
    pub nodes: usize,
    pub edges: usize,
}

impl SolveReport {
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// More than one connected component was solved.
    pub fn is_disconnected(&self) -> bool {
        self.components.len() > 1
    }

    /// Every component reached a convergence criterion.
    pub fn converged(&self) -> bool {
        self.components.iter().all(|c| c.converged)
    }

    /// Longest iteration count over the components.
    pub fn iterations(&self) -> usize {
        self.components.iter().map(|c| c.iterations).max().unwrap_or(0)
    }

    pub fn initial_cost(&self) -> f64 {
        self.components.iter().map(|c| c.initial_cost).sum()
    }

    pub fn final_cost(&self) -> f64 {
        self.components.iter().map(|c| c.final_cost).sum()
    }
}

/// Starting poses for a component.
///
/// `seed` holds poses that are already known (at least the anchor). The
/// remaining nodes are filled by walking edges in order of increasing gap,
/// then increasing index, repeating until no node can be added. Walking the
/// lowest gaps first makes odometry the primary source of the guess.
pub(crate) fn initial_guess(
    nodes: &[FrameIndex],
    edges: &[&Edge],
    mut seed: HashMap<FrameIndex, SE3>,
) -> Vec<SE3> {
    let mut ordered: Vec<&Edge> = edges.to_vec();
    ordered.sort_by_key(|e| (e.gap(), e.from().min(e.to())));

    loop {
        let mut progressed = false;
        for edge in &ordered {
            match (seed.get(&edge.from()), seed.get(&edge.to())) {
                (Some(from), None) => {
                    let pose = from.compose(edge.measurement());
                    seed.insert(edge.to(), pose);
                    progressed = true;
                }
                (None, Some(to)) => {
                    let pose = to.compose(&edge.measurement().inverse());
                    seed.insert(edge.from(), pose);
                    progressed = true;
                }
                _ => {}
            }
        }
        if !progressed {
            break;
        }
    }

    nodes
        .iter()
        .map(|n| seed.get(n).copied().unwrap_or_default())
        .collect()
}

/// Component-local view of the graph: node positions instead of indices.
struct LocalProblem<'a> {
    /// `(local_from, local_to, edge)`
    edges: Vec<(usize, usize, &'a Edge)>,
    n_nodes: usize,
}

impl<'a> LocalProblem<'a> {
    fn new(nodes: &[FrameIndex], edges: &[&'a Edge]) -> Self {
        let local: HashMap<FrameIndex, usize> =
            nodes.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let edges = edges
            .iter()
            .filter_map(|e| Some((*local.get(&e.from())?, *local.get(&e.to())?, *e)))
            .collect();
        Self {
            edges,
            n_nodes: nodes.len(),
        }
    }

    fn cost(&self, poses: &[SE3]) -> f64 {
        self.edges
            .iter()
            .map(|(i, j, e)| e.cost(&poses[*i], &poses[*j]))
            .sum()
    }

    /// Normal equations `H = J^T Ω J`, `b = J^T Ω r` over the free nodes
    /// (local index 0 is fixed), plus the current cost.
    fn linearize(&self, poses: &[SE3]) -> (DMatrix<f64>, DVector<f64>, f64) {
        let dim = (self.n_nodes - 1) * 6;
        let mut h = DMatrix::zeros(dim, dim);
        let mut b = DVector::zeros(dim);
        let mut cost = 0.0;

        for &(i, j, edge) in &self.edges {
            let residual = edge.residual(&poses[i], &poses[j]);
            let omega = Matrix6::from_diagonal(edge.information());
            cost += residual.component_mul(&residual).dot(edge.information());

            let jac_i = numeric_jacobian(|d| edge.residual(&poses[i].retract(d), &poses[j]));
            let jac_j = numeric_jacobian(|d| edge.residual(&poses[i], &poses[j].retract(d)));

            let blocks = [(i, jac_i), (j, jac_j)];
            for &(a, jac_a) in &blocks {
                if a == 0 {
                    continue;
                }
                let ra = (a - 1) * 6;
                let jt_omega = jac_a.transpose() * omega;

                let mut b_block = b.fixed_rows_mut::<6>(ra);
                b_block += jt_omega * residual;

                for &(c, jac_c) in &blocks {
                    if c == 0 {
                        continue;
                    }
                    let rc = (c - 1) * 6;
                    let mut h_block = h.fixed_view_mut::<6, 6>(ra, rc);
                    h_block += jt_omega * jac_c;
                }
            }
        }

        (h, b, cost)
    }
}

/// Central-difference Jacobian of `f` at zero perturbation.
fn numeric_jacobian<F>(f: F) -> Matrix6<f64>
where
    F: Fn(&Vector6<f64>) -> Vector6<f64>,
{
    let mut jac = Matrix6::zeros();
    for p in 0..6 {
        let mut delta = Vector6::zeros();
        delta[p] = JACOBIAN_EPS;
        let plus = f(&delta);
        let minus = f(&(-delta));
        jac.set_column(p, &((plus - minus) / (2.0 * JACOBIAN_EPS)));
    }
    jac
}

/// Solve the damped system, Cholesky first with LU as fallback.
fn solve_damped(h: &DMatrix<f64>, b: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let mut damped = h.clone();
    for i in 0..damped.nrows() {
        damped[(i, i)] += lambda * damped[(i, i)].max(1e-6);
    }
    let rhs = -b;
    match damped.clone().cholesky() {
        Some(chol) => Some(chol.solve(&rhs)),
        None => damped.lu().solve(&rhs),
    }
}

fn retract_all(poses: &[SE3], delta: &DVector<f64>) -> Vec<SE3> {
    poses
        .iter()
        .enumerate()
        .map(|(k, pose)| {
            if k == 0 {
                return *pose;
            }
            let d = Vector6::from_iterator(delta.rows((k - 1) * 6, 6).iter().copied());
            pose.retract(&d)
        })
        .collect()
}

fn state_norm(poses: &[SE3]) -> f64 {
    poses
        .iter()
        .map(|p| p.log().norm_squared())
        .sum::<f64>()
        .sqrt()
}

/// Result of [`solve_component`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct LmOutcome {
    pub iterations: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub converged: bool,
}

/// Optimize the poses of one connected component in place.
///
/// `poses[0]` is the anchor and never moves. Stops on the first of:
/// gradient below `gradient_tolerance`, step below `step_tolerance`
/// (relative to the state), relative cost decrease below `cost_tolerance`,
/// or `max_iterations`. Hitting the budget leaves `converged == false` but
/// the best poses found are still returned.
pub(crate) fn solve_component(
    nodes: &[FrameIndex],
    edges: &[&Edge],
    poses: &mut Vec<SE3>,
    max_iterations: usize,
    config: &OptimizerConfig,
) -> LmOutcome {
    let problem = LocalProblem::new(nodes, edges);
    let initial_cost = problem.cost(poses);

    if problem.n_nodes < 2 {
        return LmOutcome {
            iterations: 0,
            initial_cost,
            final_cost: initial_cost,
            converged: true,
        };
    }

    let mut lambda = LAMBDA_INIT;
    let mut iterations = 0;
    let mut converged = false;
    let mut cost = initial_cost;

    for iter in 0..max_iterations {
        let (h, b, current_cost) = problem.linearize(poses);
        cost = current_cost;

        if b.amax() < config.gradient_tolerance {
            converged = true;
            break;
        }
        iterations = iter + 1;

        let Some(delta) = solve_damped(&h, &b, lambda) else {
            if lambda >= MAX_LAMBDA {
                break;
            }
            lambda = (lambda * LAMBDA_UP).min(MAX_LAMBDA);
            continue;
        };

        let norm = state_norm(poses);
        if delta.norm() < config.step_tolerance * (norm + config.step_tolerance) {
            converged = true;
            break;
        }

        let trial = retract_all(poses, &delta);
        let trial_cost = problem.cost(&trial);

        if trial_cost < cost {
            let decrease = (cost - trial_cost) / cost;
            *poses = trial;
            cost = trial_cost;
            lambda = (lambda * LAMBDA_DOWN).max(MIN_LAMBDA);
            if decrease < config.cost_tolerance {
                converged = true;
                break;
            }
        } else {
            if lambda >= MAX_LAMBDA {
                break;
            }
            lambda = (lambda * LAMBDA_UP).min(MAX_LAMBDA);
        }
    }

    LmOutcome {
        iterations,
        initial_cost,
        final_cost: cost,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn step(k: usize) -> SE3 {
        SE3::from_euler(
            &Vector3::new(0.0, 0.01 * k as f64, 0.1),
            Vector3::new(1.0, 0.1 * k as f64, 0.0),
        )
    }

    fn ground_truth(n: usize) -> Vec<SE3> {
        let mut poses = vec![SE3::identity()];
        for k in 1..n {
            let next = poses[k - 1].compose(&step(k));
            poses.push(next);
        }
        poses
    }

    fn exact_edge(gt: &[SE3], i: usize, j: usize) -> Edge {
        Edge::with_weights(i, j, gt[i].between(&gt[j]), Vector6::repeat(1.0)).unwrap()
    }

    #[test]
    fn test_initial_guess_integrates_odometry() {
        let gt = ground_truth(6);
        let edges: Vec<Edge> = (0..5).map(|i| exact_edge(&gt, i, i + 1)).collect();
        let refs: Vec<&Edge> = edges.iter().collect();
        let nodes: Vec<_> = (0..6).collect();

        let guess = initial_guess(&nodes, &refs, HashMap::from([(0, SE3::identity())]));
        for (a, b) in guess.iter().zip(&gt) {
            assert_relative_eq!(a.translation, b.translation, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_initial_guess_walks_edges_backwards() {
        let gt = ground_truth(4);
        // Stored as 3 -> 2 etc., anchor at 0 is only reachable through `to`
        let edges: Vec<Edge> = (0..3).map(|i| exact_edge(&gt, i + 1, i)).collect();
        let refs: Vec<&Edge> = edges.iter().collect();
        let nodes: Vec<_> = (0..4).collect();

        let guess = initial_guess(&nodes, &refs, HashMap::from([(0, SE3::identity())]));
        assert_relative_eq!(guess[3].translation, gt[3].translation, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_recovers_loop_consistent_poses() {
        let gt = ground_truth(8);
        let mut edges: Vec<Edge> = (0..7).map(|i| exact_edge(&gt, i, i + 1)).collect();
        edges.push(exact_edge(&gt, 0, 7));
        let refs: Vec<&Edge> = edges.iter().collect();
        let nodes: Vec<_> = (0..8).collect();

        // Perturb the starting point away from the solution
        let mut poses: Vec<SE3> = gt
            .iter()
            .enumerate()
            .map(|(k, p)| {
                if k == 0 {
                    *p
                } else {
                    p.retract(&Vector6::new(0.02, -0.01, 0.03, 0.1, -0.05, 0.08))
                }
            })
            .collect();

        let config = OptimizerConfig::default();
        let outcome = solve_component(&nodes, &refs, &mut poses, 50, &config);

        assert!(outcome.iterations > 0);
        assert!(outcome.converged);
        assert!(outcome.final_cost < outcome.initial_cost * 1e-8);
        for (a, b) in poses.iter().zip(&gt) {
            assert_relative_eq!(a.translation, b.translation, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_exact_start_converges_immediately() {
        let gt = ground_truth(5);
        let edges: Vec<Edge> = (0..4).map(|i| exact_edge(&gt, i, i + 1)).collect();
        let refs: Vec<&Edge> = edges.iter().collect();
        let nodes: Vec<_> = (0..5).collect();
        let mut poses = gt.clone();

        let outcome = solve_component(&nodes, &refs, &mut poses, 10, &OptimizerConfig::default());
        assert_eq!(outcome.iterations, 0);
        assert!(outcome.converged);
        assert!(outcome.final_cost < 1e-20);
    }

    #[test]
    fn test_budget_exhaustion_is_soft() {
        let gt = ground_truth(6);
        let mut edges: Vec<Edge> = (0..5).map(|i| exact_edge(&gt, i, i + 1)).collect();
        // Inconsistent loop edge, can never reach zero cost
        edges.push(
            Edge::with_weights(0, 5, SE3::identity(), Vector6::repeat(1.0)).unwrap(),
        );
        let refs: Vec<&Edge> = edges.iter().collect();
        let nodes: Vec<_> = (0..6).collect();
        let mut poses = gt.clone();

        let outcome = solve_component(&nodes, &refs, &mut poses, 1, &OptimizerConfig::default());
        assert_eq!(outcome.iterations, 1);
        assert!(!outcome.converged);
        assert!(outcome.final_cost <= outcome.initial_cost);
        assert!(poses.iter().all(|p| p.is_finite()));
    }
}
