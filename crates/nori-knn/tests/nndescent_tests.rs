//! End-to-end NN-Descent builds checked against exact brute-force lists.

use nori_knn::{
    brute_force_index, build_index, BuildStatus, CancelToken, DistanceError, DistanceFunction,
    FnSpace, KnnError, KnnGraphConfig, KnnIndex, NeighborEntry, NnDescent, PointId, Space,
    VectorSpace,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn random_space(n: usize, dims: usize, seed: u64) -> VectorSpace {
    let mut rng = StdRng::seed_from_u64(seed);
    let vectors = (0..n)
        .map(|_| (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();
    VectorSpace::new(vectors, DistanceFunction::Euclidean).unwrap()
}

fn corner_space() -> VectorSpace {
    VectorSpace::new(
        vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![10.0, 10.0],
        ],
        DistanceFunction::Euclidean,
    )
    .unwrap()
}

fn lists(index: &KnnIndex) -> Vec<Vec<NeighborEntry>> {
    index.iter().map(|(_, list)| list.to_vec()).collect()
}

/// Structural invariants every returned index must satisfy.
fn assert_well_formed<S: Space>(index: &KnnIndex, space: &S, k: usize) {
    let expected_len = k.min(space.len() - 1);
    for (p, list) in index.iter() {
        assert_eq!(list.len(), expected_len, "point {} has a short list", p);
        assert!(list.iter().all(|e| e.id != p), "point {} lists itself", p);

        let mut ids: Vec<PointId> = list.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), list.len(), "point {} has duplicate neighbors", p);

        assert!(
            list.windows(2).all(|w| w[0].distance <= w[1].distance),
            "point {} list is not sorted",
            p
        );

        for entry in list {
            let truth = space.distance(p, entry.id).unwrap();
            assert!((entry.distance - truth).abs() < 1e-12);
        }
    }
}

#[test]
fn test_corner_points_exact_distances() {
    let space = corner_space();
    let exact = brute_force_index(&space, 1).unwrap();

    let expected = [1.0, 1.0, 1.0, 181.0_f64.sqrt()];
    for (p, want) in expected.iter().enumerate() {
        let got = exact.neighbors_of(p as PointId).unwrap()[0].distance;
        assert!((got - want).abs() < 1e-9, "point {}: {} != {}", p, got, want);
    }

    // (10, 10) is equally far from (1, 0) and (0, 1)
    let far = exact.neighbors_of(3).unwrap()[0].id;
    assert!(far == 1 || far == 2);
}

#[test]
fn test_corner_points_single_neighbor() {
    let space = corner_space();
    let exact = brute_force_index(&space, 1).unwrap();

    // Some seeds settle on a second-nearest neighbor; none may beat the exact one
    for seed in 0..50 {
        let index = build_index(&space, 1, 1.0, 0.001, seed).unwrap();
        assert_well_formed(&index, &space, 1);
        for (p, list) in index.iter() {
            let best = exact.neighbors_of(p).unwrap()[0].distance;
            assert!(list[0].distance >= best - 1e-12);
        }
    }

    let index = build_index(&space, 1, 1.0, 0.001, 42).unwrap();
    for (p, list) in index.iter() {
        let best = exact.neighbors_of(p).unwrap()[0].distance;
        assert!((list[0].distance - best).abs() < 1e-12, "point {}", p);
    }
}

#[test]
fn test_corner_points_full_lists_are_exact() {
    let space = corner_space();
    let exact = brute_force_index(&space, 3).unwrap();
    let index = build_index(&space, 3, 1.0, 0.001, 42).unwrap();

    assert_well_formed(&index, &space, 3);
    for (p, list) in index.iter() {
        let truth = exact.neighbors_of(p).unwrap();
        for (ours, theirs) in list.iter().zip(truth) {
            assert!((ours.distance - theirs.distance).abs() < 1e-12);
        }
    }
    assert_eq!(index.recall_against(&exact).unwrap(), 1.0);
}

#[test]
fn test_same_seed_same_index() {
    init_tracing();
    let space = random_space(100, 2, 1234);

    let first = build_index(&space, 5, 1.0, 0.001, 99).unwrap();
    let second = build_index(&space, 5, 1.0, 0.001, 99).unwrap();

    assert_eq!(lists(&first), lists(&second));
    assert_eq!(first.status(), second.status());
    assert_eq!(
        first.stats().distance_evaluations,
        second.stats().distance_evaluations
    );
    assert_eq!(first.stats().iterations, second.stats().iterations);
}

#[test]
fn test_invalid_parameters_evaluate_nothing() {
    let calls = AtomicUsize::new(0);
    let space = FnSpace::new(10, |a, b| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok((a as f64 - b as f64).abs())
    });

    assert!(matches!(
        build_index(&space, 0, 1.0, 0.001, 1),
        Err(KnnError::InvalidParameter(_))
    ));
    assert!(matches!(
        build_index(&space, 5, 1.5, 0.001, 1),
        Err(KnnError::InvalidParameter(_))
    ));
    assert!(matches!(
        build_index(&space, 5, 1.0, 0.0, 1),
        Err(KnnError::InvalidParameter(_))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_empty_dataset() {
    let space = FnSpace::new(0, |_, _| Ok(0.0));
    assert!(matches!(
        build_index(&space, 3, 1.0, 0.001, 1),
        Err(KnnError::InvalidParameter(_))
    ));
}

#[test]
fn test_dataset_smaller_than_k() {
    let space = VectorSpace::new(
        vec![vec![0.0, 0.0], vec![3.0, 4.0], vec![1.0, 0.0]],
        DistanceFunction::Euclidean,
    )
    .unwrap();
    let index = build_index(&space, 5, 1.0, 0.001, 7).unwrap();

    assert_well_formed(&index, &space, 5);
    let ids: Vec<PointId> = index.neighbors_of(0).unwrap().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![2, 1]);
    let ids: Vec<PointId> = index.neighbors_of(1).unwrap().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![2, 0]);

    // Lists shorter than k have no k-distance
    assert_eq!(index.knn_distance(0).unwrap(), nori_knn::UNBOUNDED);
}

#[test]
fn test_close_to_exact_on_small_datasets() {
    init_tracing();
    for seed in 0..8_u64 {
        let (n, k) = (50, 10);
        let space = random_space(n, 3, seed);
        let exact = brute_force_index(&space, k).unwrap();

        let config = KnnGraphConfig::new(k)
            .with_delta(1e-6)
            .with_seed(seed)
            .with_max_iterations(1000);
        let index = NnDescent::new(config).unwrap().build(&space).unwrap();

        assert_well_formed(&index, &space, k);

        for p in 0..n as PointId {
            let ours = index.neighbors_of(p).unwrap();
            let truth = exact.neighbors_of(p).unwrap();
            let hits = truth
                .iter()
                .filter(|t| ours.iter().any(|o| o.id == t.id))
                .count();
            let overlap = hits as f64 / truth.len() as f64;
            assert!(
                overlap >= 0.9,
                "seed={} point={} overlap={}",
                seed,
                p,
                overlap
            );

            let ours = index.knn_distance(p).unwrap();
            let truth = exact.knn_distance(p).unwrap();
            assert!(
                (ours - truth).abs() < 1e-9,
                "seed={} point={} k-distance {} != {}",
                seed,
                p,
                ours,
                truth
            );
        }
        assert!(index.recall_against(&exact).unwrap() >= 0.9);
    }
}

#[test]
fn test_bound_sum_never_increases() {
    let space = random_space(300, 4, 77);
    let config = KnnGraphConfig::new(8).with_seed(5);
    let index = NnDescent::new(config).unwrap().build(&space).unwrap();

    let iterations = &index.stats().iterations;
    assert!(!iterations.is_empty());
    for pair in iterations.windows(2) {
        assert!(pair[1].bound_sum <= pair[0].bound_sum);
    }
    for (i, stats) in iterations.iter().enumerate() {
        assert_eq!(stats.iteration, i + 1);
    }
}

#[test]
fn test_converged_status() {
    let space = random_space(400, 3, 8);
    let index = NnDescent::new(KnnGraphConfig::new(10).with_seed(1))
        .unwrap()
        .build(&space)
        .unwrap();

    assert_eq!(index.status(), BuildStatus::Converged);
    let last = index.stats().iterations.last().unwrap();
    assert!((last.updates as f64) < 0.001 * 10.0 * 400.0);
    assert!(index.stats().scan_rate(400) > 0.0);
}

#[test]
fn test_distance_failure_aborts_build() {
    let space = FnSpace::new(30, |a, b| {
        if a == 29 || b == 29 {
            Err(DistanceError::new("incomparable", a, b))
        } else {
            Ok((a as f64 - b as f64).abs())
        }
    });

    // k = n - 1: initialization compares every point with 29
    let result = build_index(&space, 29, 1.0, 0.001, 3);
    match result {
        Err(KnnError::Distance(err)) => assert!(err.a == 29 || err.b == 29),
        other => panic!("expected distance failure, got {:?}", other.map(|i| i.len())),
    }
}

#[test]
fn test_cancelled_build() {
    let space = random_space(50, 2, 3);
    let token = CancelToken::new();
    let builder = NnDescent::new(KnnGraphConfig::new(4))
        .unwrap()
        .with_cancel(token.clone());

    token.cancel();
    assert!(token.is_cancelled());
    assert!(matches!(
        builder.build(&space),
        Err(KnnError::Cancelled { .. })
    ));
}

#[test]
fn test_parallel_build() {
    init_tracing();
    let space = random_space(500, 4, 31);
    let exact = brute_force_index(&space, 10).unwrap();

    let config = KnnGraphConfig::new(10).with_seed(11).with_parallel(true);
    let index = NnDescent::new(config).unwrap().build(&space).unwrap();

    assert_well_formed(&index, &space, 10);
    assert!(index.is_converged());
    assert!(index.recall_against(&exact).unwrap() > 0.9);
}

#[test]
fn test_reduced_sample_rate() {
    let space = random_space(300, 3, 12);
    let exact = brute_force_index(&space, 8).unwrap();

    let full = NnDescent::new(KnnGraphConfig::new(8).with_seed(2))
        .unwrap()
        .build(&space)
        .unwrap();
    let sampled = NnDescent::new(KnnGraphConfig::new(8).with_rho(0.5).with_seed(2))
        .unwrap()
        .build(&space)
        .unwrap();

    assert_well_formed(&sampled, &space, 8);
    assert!(sampled.recall_against(&exact).unwrap() > 0.8);
    assert!(full.recall_against(&exact).unwrap() > 0.9);
}

#[test]
fn test_config_from_yaml_drives_build() {
    let config = KnnGraphConfig::from_yaml_str("k: 4\nseed: 17\nmax_iterations: 30\n").unwrap();
    let space = random_space(60, 2, 17);
    let index = NnDescent::new(config).unwrap().build(&space).unwrap();

    assert_eq!(index.k(), 4);
    assert!(index.stats().num_iterations() <= 30);
    assert_well_formed(&index, &space, 4);
}

#[test]
fn test_knn_prefix_matches_list() {
    let space = random_space(80, 2, 40);
    let index = build_index(&space, 6, 1.0, 0.001, 40).unwrap();

    for p in 0..80 {
        let full = index.neighbors_of(p).unwrap();
        assert_eq!(index.knn(p, 3).unwrap(), &full[..3]);
        assert_eq!(index.knn_distance(p).unwrap(), full[5].distance);
    }
    assert!(matches!(index.knn(80, 3), Err(KnnError::NotFound(80))));
}
