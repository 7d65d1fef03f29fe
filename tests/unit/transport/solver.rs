use super::*;
use crate::foundation::core::Point;
use crate::transport::cost::DenseCost;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_cloud(rng: &mut StdRng, n: usize, scale: f64) -> PointCloud {
    PointCloud::new(
        (0..n)
            .map(|_| Point::new(rng.random::<f64>() * scale, rng.random::<f64>() * scale))
            .collect(),
    )
}

fn brute_force_min(cost: &DenseCost) -> f64 {
    fn rec(cost: &DenseCost, row: usize, used: &mut Vec<bool>, acc: f64, best: &mut f64) {
        let n = cost.rows();
        if row == n {
            *best = best.min(acc);
            return;
        }
        for j in 0..n {
            if !used[j] {
                used[j] = true;
                rec(cost, row + 1, used, acc + cost.cost(row, j), best);
                used[j] = false;
            }
        }
    }
    let mut best = f64::INFINITY;
    rec(cost, 0, &mut vec![false; cost.rows()], 0.0, &mut best);
    best
}

fn solver_cfg() -> SolverConfig {
    SolverConfig {
        max_iterations: 10_000_000,
        threads: Some(2),
        dense_cost_limit: 4096,
    }
}

#[test]
fn matches_brute_force_on_small_problems() {
    let mut rng = StdRng::seed_from_u64(5);
    let sap = ShortestAugmentingPath::new(1_000_000);
    for n in 1..=7 {
        for _ in 0..5 {
            let data: Vec<f64> = (0..n * n).map(|_| rng.random::<f64>() * 100.0).collect();
            let cost = DenseCost::new(n, n, data).unwrap();
            let a = sap.assign(&cost).unwrap();
            let expected = brute_force_min(&cost);
            assert!((a.cost - expected).abs() < 1e-9, "n={n}: {} vs {expected}", a.cost);
            let plan = TransportPlan::from_assignment(&a.row_to_col).unwrap();
            assert!(plan.is_permutation());
        }
    }
}

#[test]
fn parallel_and_sequential_scans_agree() {
    let mut rng = StdRng::seed_from_u64(9);
    let source = random_cloud(&mut rng, 120, 50.0);
    let target = random_cloud(&mut rng, 120, 50.0);
    let cost = DenseCost::squared_euclidean(source.points(), target.points());

    let seq = ShortestAugmentingPath::new(u64::MAX).assign(&cost).unwrap();
    let par = ShortestAugmentingPath {
        max_iterations: u64::MAX,
        parallel_threshold: 1,
    }
    .assign(&cost)
    .unwrap();
    assert!((seq.cost - par.cost).abs() < 1e-6);
    assert_eq!(seq.row_to_col, par.row_to_col);
}

#[test]
fn solved_plan_conserves_mass_and_is_sparse() {
    let mut rng = StdRng::seed_from_u64(21);
    let n = 300;
    let source = random_cloud(&mut rng, n, 40.0);
    let target = random_cloud(&mut rng, n, 40.0);
    let solver = TransportSolver::new(&solver_cfg()).unwrap();
    let plan = solver.solve(&source, &target).unwrap();

    assert_eq!(plan.nnz(), n);
    assert!(plan.is_permutation());
    assert!(plan.is_mass_conserving(1e-12));
    for s in plan.row_sums() {
        assert!((s - 1.0 / n as f64).abs() < 1e-12);
    }
}

#[test]
fn lazy_and_dense_costs_give_the_same_optimum() {
    let mut rng = StdRng::seed_from_u64(33);
    let source = random_cloud(&mut rng, 80, 10.0);
    let target = random_cloud(&mut rng, 80, 10.0);
    let dense = TransportSolver::new(&solver_cfg()).unwrap();
    let lazy = TransportSolver::new(&SolverConfig {
        dense_cost_limit: 0,
        ..solver_cfg()
    })
    .unwrap();
    let dense_cost = DenseCost::squared_euclidean(source.points(), target.points());
    let cost: &dyn CostMatrix = &dense_cost;
    let plan_cost = |plan: TransportPlan| -> f64 {
        (0..plan.rows())
            .flat_map(|i| plan.row(i).map(move |(j, v)| v * cost.cost(i, j)))
            .sum()
    };
    let a = plan_cost(dense.solve(&source, &target).unwrap());
    let b = plan_cost(lazy.solve(&source, &target).unwrap());
    assert!((a - b).abs() < 1e-9);
}

#[test]
fn translated_cloud_maps_each_point_to_its_copy() {
    let mut rng = StdRng::seed_from_u64(2);
    let source = random_cloud(&mut rng, 60, 100.0);
    let target = PointCloud::new(
        source
            .points()
            .iter()
            .rev()
            .map(|p| Point::new(p.x + 0.5, p.y - 0.25))
            .collect(),
    );
    let plan = TransportSolver::new(&solver_cfg())
        .unwrap()
        .solve(&source, &target)
        .unwrap();
    for i in 0..60 {
        let (j, _) = plan.row(i).next().unwrap();
        assert_eq!(j, 59 - i);
    }
}

#[test]
fn mismatched_sizes_are_rejected() {
    let solver = TransportSolver::new(&solver_cfg()).unwrap();
    let a = PointCloud::new(vec![Point::new(0.0, 0.0); 3]);
    let b = PointCloud::new(vec![Point::new(0.0, 0.0); 4]);
    match solver.solve(&a, &b).unwrap_err() {
        MorphError::DimensionMismatch { left, right, .. } => assert_eq!((left, right), (3, 4)),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn iteration_cap_is_a_hard_failure() {
    let mut rng = StdRng::seed_from_u64(4);
    let source = random_cloud(&mut rng, 200, 10.0);
    let target = random_cloud(&mut rng, 200, 10.0);
    let solver = TransportSolver::new(&SolverConfig {
        max_iterations: 10,
        ..solver_cfg()
    })
    .unwrap();
    match solver.solve(&source, &target).unwrap_err() {
        MorphError::SolverDivergence {
            iterations, cap, ..
        } => {
            assert_eq!(cap, 10);
            assert_eq!(iterations, 10);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn identical_clouds_need_no_search() {
    let mut rng = StdRng::seed_from_u64(17);
    let cloud = random_cloud(&mut rng, 150, 30.0);
    let cost = DenseCost::squared_euclidean(cloud.points(), cloud.points());
    let a = ShortestAugmentingPath::new(u64::MAX).assign(&cost).unwrap();
    assert_eq!(a.iterations, 0);
    assert_eq!(a.row_to_col, (0..150).collect::<Vec<_>>());
    assert_eq!(a.cost, 0.0);
}

#[test]
fn row_reduction_handles_crowded_columns() {
    // every row prefers column 0, so the column reduction matches a single row
    let n = 6;
    let data: Vec<f64> = (0..n)
        .flat_map(|i| (0..n).map(move |j| (j * j) as f64 + (i * j) as f64 * 0.5 + i as f64))
        .collect();
    let cost = DenseCost::new(n, n, data).unwrap();
    let a = ShortestAugmentingPath::new(u64::MAX).assign(&cost).unwrap();
    assert!((a.cost - brute_force_min(&cost)).abs() < 1e-9);
    assert!(a.iterations > 0);
}

#[test]
fn two_smallest_orders_by_cost_then_column() {
    let two = [(3.0, 4), (1.0, 7), (1.0, 2), (5.0, 0)]
        .into_iter()
        .fold(TwoSmallest::EMPTY, TwoSmallest::push);
    assert_eq!(two.first, (1.0, 2));
    assert_eq!(two.second, (1.0, 7));

    let left = TwoSmallest::EMPTY.push((2.0, 1)).push((9.0, 3));
    let right = TwoSmallest::EMPTY.push((0.5, 8)).push((2.0, 0));
    let merged = left.merge(right);
    assert_eq!(merged.first, (0.5, 8));
    assert_eq!(merged.second, (2.0, 0));
}

#[test]
fn non_finite_costs_are_reported() {
    let cost = DenseCost::new(2, 2, vec![f64::NAN; 4]).unwrap();
    assert!(ShortestAugmentingPath::new(100).assign(&cost).is_err());
}

#[test]
fn zero_thread_pool_is_rejected() {
    assert!(
        TransportSolver::new(&SolverConfig {
            threads: Some(0),
            ..solver_cfg()
        })
        .is_err()
    );
}
