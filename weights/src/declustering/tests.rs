use super::distance::{condition_number, DistanceMatrix};
use super::*;
use common::FloatExt;

fn point(lat: f64, lon: f64, tag: &str) -> GeoPoint {
    GeoPoint::new(lat, lon, tag).unwrap()
}

fn solver() -> DeclusteringSolver {
    DeclusteringSolver::new(DeclusteringParams::default()).unwrap()
}

/// Two stations a few kilometres apart and one a quarter of the globe away.
fn two_clustered_one_isolated() -> Vec<GeoPoint> {
    vec![
        point(0.0, 0.0, "A"),
        point(0.0, 0.01, "B"),
        point(0.0, 90.0, "C"),
    ]
}

/// Ten stations packed within 0.2 degrees plus one 40 degrees away.
fn dense_cluster_with_outlier() -> Vec<GeoPoint> {
    let mut points: Vec<GeoPoint> = (0..10)
        .map(|k| point(0.0, 0.02 * k as f64, &format!("cluster{k}")))
        .collect();
    points.push(point(0.0, 40.0, "outlier"));
    points
}

#[test]
fn test_params_validation() {
    assert!(DeclusteringSolver::new(DeclusteringParams::with_max_ratio(0.0)).is_err());
    assert!(DeclusteringSolver::new(DeclusteringParams::with_max_ratio(1.5)).is_err());

    let zero_gap = DeclusteringParams {
        gap: 0.0,
        ..Default::default()
    };
    assert!(DeclusteringSolver::new(zero_gap).is_err());

    let no_steps = DeclusteringParams {
        max_steps: 0,
        ..Default::default()
    };
    assert!(DeclusteringSolver::new(no_steps).is_err());

    let bad_drop = DeclusteringParams {
        drop_ratio: Some(1.0),
        ..Default::default()
    };
    assert!(DeclusteringSolver::new(bad_drop).is_err());
}

#[test]
fn test_ref_distance_steps() {
    let params = DeclusteringParams::default();
    assert!(params.ref_distance(0).approximately_eq(0.5));
    assert!(params.ref_distance(3).approximately_eq(2.0));
    assert!(params.ref_distance(DEFAULT_MAX_STEPS - 1).approximately_eq(180.0));
}

#[test]
fn test_kernel_weights_two_points() {
    let points = vec![point(0.0, 0.0, "a"), point(0.0, 10.0, "b")];
    let matrix = DistanceMatrix::new(&points);
    assert_eq!(matrix.len(), 2);
    assert!(matrix.max_distance().relative_eq(10.0, 1e-9));

    // At d equal to the separation each neighbour contributes exp(-1).
    let weights = matrix.kernel_weights(&[1.0, 2.0], 10.0);
    let density = 1.0 + (-1.0_f64).exp();
    assert!(weights[0].relative_eq(1.0 / density, 1e-12));
    assert!(weights[1].relative_eq(2.0 / density, 1e-12));
}

#[test]
fn test_condition_number() {
    assert!(condition_number(&[]).approximately_eq(1.0));
    assert!(condition_number(&[2.0]).approximately_eq(1.0));
    assert!(condition_number(&[0.5, 2.0, 1.0]).approximately_eq(4.0));
}

#[test]
fn test_empty_point_set() {
    let result = solver().solve(&[]).unwrap();
    assert!(result.is_empty());
    assert!(result.cond_num.approximately_eq(1.0));
    assert!(result.converged);
    assert!(result.scan.is_empty());
}

#[test]
fn test_single_point_keeps_prior() {
    let points = vec![point(10.0, 20.0, "only").with_weight(3.0).unwrap()];
    let result = solver().solve(&points).unwrap();

    assert_eq!(result.len(), 1);
    assert!(result.weight("only").unwrap().approximately_eq(3.0));
    assert!(result.ref_distance.is_none());
    assert!(result.scan.is_empty());
    assert!(result.cond_num.approximately_eq(1.0));
}

#[test]
fn test_colocated_points_keep_priors() {
    let points = vec![
        point(45.0, 45.0, "a"),
        point(45.0, 45.0, "b"),
        point(45.0, 45.0, "c"),
    ];
    let result = solver().solve(&points).unwrap();

    for tag in ["a", "b", "c"] {
        assert!(result.weight(tag).unwrap().approximately_eq(1.0));
    }
    assert!(result.ref_distance.is_none());
    assert!(result.scan.is_empty());
    assert!(result.cond_num.approximately_eq(1.0));
}

#[test]
fn test_duplicate_tag_is_rejected() {
    let points = vec![point(0.0, 0.0, "dup"), point(1.0, 1.0, "dup")];
    assert!(matches!(
        solver().solve(&points),
        Err(WeightError::DuplicateTag(tag)) if tag == "dup"
    ));
    assert!(solver().priors_only(&points).is_err());
}

#[test]
fn test_priors_only_returns_priors() {
    let points = vec![
        point(0.0, 0.0, "a").with_weight(2.0).unwrap(),
        point(0.0, 0.01, "b").with_weight(0.5).unwrap(),
    ];
    let result = solver().priors_only(&points).unwrap();

    assert!(result.weight("a").unwrap().approximately_eq(2.0));
    assert!(result.weight("b").unwrap().approximately_eq(0.5));
    assert!(result.cond_num.approximately_eq(4.0));
    assert!(result.scan.is_empty());
}

#[test]
fn test_isolated_point_outweighs_cluster() {
    let result = solver().solve(&two_clustered_one_isolated()).unwrap();

    let a = result.weight("A").unwrap();
    let b = result.weight("B").unwrap();
    let c = result.weight("C").unwrap();

    assert!(a.relative_eq(b, 1e-3), "clustered weights {a} vs {b}");
    assert!(c > a * 1.5, "isolated {c} vs clustered {a}");
    assert!(result.ref_distance.is_some());
}

#[test]
fn test_unreachable_target_stops_early() {
    // The peak of this layout is ~2, so 0.35 * peak is below 1 and cannot be met.
    let result = solver().solve(&two_clustered_one_isolated()).unwrap();

    assert!(!result.converged);
    assert!(!result.scan.is_empty());
    assert!(result.scan.len() < DEFAULT_MAX_STEPS);

    let peak = result
        .scan
        .iter()
        .map(|s| s.cond_num)
        .fold(0.0_f64, f64::max);
    assert!(peak <= 2.0 + 1e-9);
    let last = result.scan.last().unwrap();
    assert!(last.cond_num < 0.95 * peak);
}

#[test]
fn test_dense_cluster_converges() {
    let result = solver().solve(&dense_cluster_with_outlier()).unwrap();

    assert!(result.converged);
    let peak = result
        .scan
        .iter()
        .map(|s| s.cond_num)
        .fold(0.0_f64, f64::max);
    assert!(peak > 9.0, "peak {peak}");
    assert!(result.cond_num <= 0.35 * peak + 1e-9);

    let chosen = result.ref_distance.unwrap();
    assert!(chosen > 20.0 && chosen < 50.0, "ref distance {chosen}");
    assert!(result.scan.last().unwrap().ref_distance.approximately_eq(chosen));

    let outlier = result.weight("outlier").unwrap();
    for k in 0..10 {
        let member = result.weight(&format!("cluster{k}")).unwrap();
        assert!(outlier > member);
    }
}

#[test]
fn test_scan_is_bounded_by_max_steps() {
    let params = DeclusteringParams {
        drop_ratio: None,
        max_steps: 5,
        ..Default::default()
    };
    let solver = DeclusteringSolver::new(params).unwrap();
    let result = solver.solve(&two_clustered_one_isolated()).unwrap();

    assert_eq!(result.scan.len(), 5);
    assert!(!result.converged);
    let chosen = result.ref_distance.unwrap();
    assert!(result.scan.iter().any(|s| s.ref_distance.approximately_eq(chosen)));
}

#[test]
fn test_center_distances_reported() {
    let center = GeoCoord::new(0.0, 0.0).unwrap();
    let result = solver()
        .with_center(center)
        .solve(&two_clustered_one_isolated())
        .unwrap();

    let distances = result.center_distances.unwrap();
    assert!(distances["A"].approximately_eq(0.0));
    assert!(distances["C"].relative_eq(90.0, 1e-9));

    let plain = solver().solve(&two_clustered_one_isolated()).unwrap();
    assert!(plain.center_distances.is_none());
}

#[test]
fn test_solve_is_deterministic() {
    let points = dense_cluster_with_outlier();
    let first = solver().solve(&points).unwrap();
    let second = solver().solve(&points).unwrap();
    assert_eq!(first, second);
}
