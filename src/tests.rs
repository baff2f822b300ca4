use ndarray::{array, Array, Array2};
use proptest::prelude::*;

use crate::{
    linear_scan, partition, reference_squared_distance, squared_distance, Error, KdTreeBuilder,
    MinReduce, Neighbour, Node, Point, PointSet, Problem, Scalar,
};

fn random_set(rng: &mut oorandom::Rand32, n: usize, dim: usize) -> PointSet {
    let data = Array::from_shape_simple_fn((n, dim), || rng.rand_float());
    PointSet::new(data).unwrap()
}

fn naive(a: &[Scalar], b: &[Scalar]) -> Scalar {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn close(a: Scalar, b: Scalar) -> bool {
    (a - b).abs() <= 1e-4 * a.abs().max(b.abs()).max(1.)
}

#[test]
fn test_metric() {
    let set = PointSet::new(array![[1., 2., 3., 4.], [2., 3., 4., 5.]]).unwrap();
    let (a, b) = (set.point(0), set.point(1));

    assert_eq!(4., squared_distance(&a, &b).unwrap(), "Test lane kernel");
    assert_eq!(4., reference_squared_distance(&a, &b).unwrap(), "Test reference distance");
    assert_eq!(0., squared_distance(&a, &a).unwrap(), "Test distance to itself");
}

#[test]
fn test_metric_dimension_mismatch() {
    let narrow = PointSet::new(array![[1., 2.]]).unwrap();
    let wide = PointSet::new(array![[1., 2., 3.]]).unwrap();

    match squared_distance(&narrow.point(0), &wide.point(0)) {
        Err(Error::DimensionMismatch { expected, actual }) => {
            assert_eq!((expected, actual), (2, 3));
        }
        other => panic!("expected a dimension mismatch, got {:?}", other),
    }
    assert!(reference_squared_distance(&narrow.point(0), &wide.point(0)).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn kernel_matches_naive_sum(
        dim in 1usize..70,
        seed in any::<u64>(),
    ) {
        let mut rng = oorandom::Rand32::new(seed);
        let set = random_set(&mut rng, 2, dim);
        let (a, b) = (set.point(0), set.point(1));

        let (xa, xb) = (a.coordinates(), b.coordinates());
        let expected = naive(xa.as_slice().unwrap(), xb.as_slice().unwrap());
        let got = squared_distance(&a, &b).unwrap();
        prop_assert!(close(got, expected), "kernel {} vs naive {} at dim {}", got, expected, dim);

        let reference = reference_squared_distance(&a, &b).unwrap();
        prop_assert!(close(reference, expected));
    }

    #[test]
    fn kernel_matches_naive_sum_on_lane_multiples(
        lanes in 1usize..16,
        seed in any::<u64>(),
    ) {
        let mut rng = oorandom::Rand32::new(seed);
        let set = random_set(&mut rng, 2, lanes * crate::LANES);
        let (a, b) = (set.point(0), set.point(1));

        let (xa, xb) = (a.coordinates(), b.coordinates());
        let expected = naive(xa.as_slice().unwrap(), xb.as_slice().unwrap());
        prop_assert!(close(squared_distance(&a, &b).unwrap(), expected));
    }
}

#[test]
fn test_build_empty_and_single() {
    let set = PointSet::new(Array2::zeros((1, 4))).unwrap();

    let tree = KdTreeBuilder::new().build(&mut []).unwrap();
    assert!(tree.is_empty());
    assert_eq!(0, tree.len());
    assert!(tree.search(&set.point(0)).unwrap().is_none());

    let mut points = set.points();
    let tree = KdTreeBuilder::new().build(&mut points).unwrap();
    let root = tree.root().unwrap();
    assert!(root.is_leaf());
    assert_eq!(0, root.point().id());
    assert_eq!(1, tree.len());
}

#[test]
fn test_build_rejects_mixed_dimensions() {
    let narrow = PointSet::new(array![[1., 2.]]).unwrap();
    let wide = PointSet::new(array![[1., 2., 3.]]).unwrap();
    let mut points = vec![narrow.point(0), wide.point(0)];

    assert!(matches!(
        KdTreeBuilder::new().build(&mut points),
        Err(Error::DimensionMismatch { .. })
    ));
}

fn check_sizes(node: &Node<'_>) {
    let n = node.count();
    let left = node.left().map_or(0, |c| c.count());
    let right = node.right().map_or(0, |c| c.count());
    assert_eq!(n / 2, left, "left subtree of a {}-point node", n);
    assert_eq!(n - n / 2 - 1, right, "right subtree of a {}-point node", n);

    for child in node.left().into_iter().chain(node.right()) {
        check_sizes(child);
    }
}

#[test]
fn test_build_split_sizes() {
    let mut rng = oorandom::Rand32::new(7);
    for n in 1..=100 {
        let set = random_set(&mut rng, n, 3);
        let mut points = set.points();
        let tree = KdTreeBuilder::new().parallel_depth(3).build(&mut points).unwrap();

        assert_eq!(n, tree.len());
        assert!(tree.verify(), "ordering invariant broken for n = {}", n);
        check_sizes(tree.root().unwrap());

        let bound = (n as f64).log2().ceil() as usize + 1;
        assert!(tree.depth() <= bound, "depth {} for n = {}", tree.depth(), n);
    }
}

#[test]
fn test_build_lower_median() {
    // Even count: the point ranked n/2 on axis 0 becomes the root.
    let set = PointSet::new(array![[4., 0.], [1., 0.], [3., 0.], [2., 0.]]).unwrap();
    let mut points = set.points();
    let tree = KdTreeBuilder::new().build(&mut points).unwrap();

    let root = tree.root().unwrap();
    assert_eq!(2, root.point().id());
    assert_eq!(2, root.left().unwrap().count());
    assert_eq!(1, root.right().unwrap().count());
}

#[test]
fn test_build_is_deterministic() {
    let mut rng = oorandom::Rand32::new(11);
    let set = random_set(&mut rng, 300, 4);

    let mut seq = set.points();
    let mut par = set.points();
    let a = KdTreeBuilder::new().parallel_depth(0).build(&mut seq).unwrap();
    let b = KdTreeBuilder::new().parallel_depth(16).build(&mut par).unwrap();

    let ids = |p: &[Point<'_>]| p.iter().map(|p| p.id()).collect::<Vec<_>>();
    assert_eq!(ids(&seq), ids(&par));
    assert_eq!(a.root().unwrap().point().id(), b.root().unwrap().point().id());
}

#[test]
fn test_search_matches_linear_scan() {
    let mut rng = oorandom::Rand32::new(3);
    for &(n, dim) in &[(1, 8), (2, 8), (17, 8), (250, 16), (1000, 8), (64, 3)] {
        let index = random_set(&mut rng, n, dim);
        let queries = random_set(&mut rng, 25, dim);

        let mut points = index.points();
        let tree = KdTreeBuilder::new().build(&mut points).unwrap();
        let all = index.points();

        for q in queries.points() {
            let got = tree.search(&q).unwrap().unwrap();
            let expected = linear_scan(&all, &q).unwrap().unwrap();
            assert_eq!(expected.dist(), got.dist(), "n = {}, dim = {}", n, dim);
            assert_eq!(expected.index(), got.index(), "n = {}, dim = {}", n, dim);
        }

        let batch = tree.search_batch(&queries.points()).unwrap();
        for (q, nb) in queries.points().iter().zip(batch) {
            assert_eq!(tree.search(q).unwrap(), nb);
        }
    }
}

/// With ties, the tree may return any point at the minimum distance; check it is one of them.
fn assert_tied_nearest(index: &PointSet, got: Neighbour, q: &Point<'_>) {
    let all = index.points();
    let expected = linear_scan(&all, q).unwrap().unwrap();
    assert_eq!(expected.dist(), got.dist());

    let tied: Vec<usize> = all
        .iter()
        .filter(|p| squared_distance(p, q).unwrap() == expected.dist())
        .map(|p| p.id())
        .collect();
    assert!(tied.contains(&got.index()), "{} not among {:?}", got.index(), tied);
    assert_eq!(
        expected.dist(),
        squared_distance(&index.point(got.index()), q).unwrap()
    );
}

#[test]
fn test_search_identical_points() {
    let index = PointSet::new(Array2::from_elem((40, 8), 0.5)).unwrap();
    let mut points = index.points();
    let tree = KdTreeBuilder::new().build(&mut points).unwrap();

    // Query on the shared point: every index point ties at distance 0.
    let same = PointSet::new(Array2::from_elem((1, 8), 0.5)).unwrap();
    let q = same.point(0);
    let got = tree.search(&q).unwrap().unwrap();
    assert_eq!(0., got.dist());
    assert_tied_nearest(&index, got, &q);

    let away = PointSet::new(Array2::from_elem((1, 8), 1.5)).unwrap();
    let q = away.point(0);
    let got = tree.search(&q).unwrap().unwrap();
    assert_eq!(8., got.dist());
    assert_tied_nearest(&index, got, &q);
}

#[test]
fn test_search_partial_ties() {
    // Two clusters of duplicates; only the ids of the nearer cluster are acceptable.
    let data = Array::from_shape_fn((30, 8), |(i, j)| {
        if j == 0 && i % 3 == 0 {
            2.
        } else {
            0.
        }
    });
    let index = PointSet::new(data).unwrap();
    let mut points = index.points();
    let tree = KdTreeBuilder::new().build(&mut points).unwrap();

    let queries = PointSet::new(array![
        [1.8, 0., 0., 0., 0., 0., 0., 0.],
        [0.1, 0., 0., 0., 0., 0., 0., 0.]
    ])
    .unwrap();
    for q in queries.points() {
        let got = tree.search(&q).unwrap().unwrap();
        assert_tied_nearest(&index, got, &q);
    }
    let got = tree.search(&queries.point(0)).unwrap().unwrap();
    assert_eq!(0, got.index() % 3);
}

#[test]
fn test_search_collinear_points() {
    let data = Array::from_shape_fn((50, 8), |(i, j)| if j == 0 { i as Scalar } else { 0. });
    let index = PointSet::new(data).unwrap();
    let mut points = index.points();
    let tree = KdTreeBuilder::new().build(&mut points).unwrap();

    let queries = PointSet::new(array![
        [12.4, 0., 0., 0., 0., 0., 0., 0.],
        [-3., 1., 0., 0., 0., 0., 0., 0.],
        [49.6, 0., 0., 0., 0., 0., 0., 2.]
    ])
    .unwrap();
    let expected = [(12, 0.16), (0, 10.), (49, 4.36)];

    for (q, &(id, dist)) in queries.points().iter().zip(&expected) {
        let got = tree.search(q).unwrap().unwrap();
        assert_eq!(id, got.index());
        assert!(close(dist, got.dist()), "{} vs {}", dist, got.dist());
    }
}

#[test]
fn test_search_dimension_mismatch() {
    let index = PointSet::new(Array2::zeros((5, 8))).unwrap();
    let query = PointSet::new(Array2::zeros((1, 16))).unwrap();
    let mut points = index.points();
    let tree = KdTreeBuilder::new().build(&mut points).unwrap();

    assert!(matches!(
        tree.search(&query.point(0)),
        Err(Error::DimensionMismatch { .. })
    ));
}

#[test]
fn test_partition_covers_range() {
    for m in 0..60 {
        for n in 1..12 {
            let parts = partition(m, n).unwrap();
            assert_eq!(n, parts.len());

            let mut next = 0;
            for p in &parts {
                assert_eq!(next, p.start(), "m = {}, n = {}", m, n);
                next = p.end();
            }
            assert_eq!(m, next);
            assert!(parts.iter().all(|p| p.len() <= (m + n - 1) / n));
        }
    }
}

#[test]
fn test_partition_underflow() {
    assert!(matches!(
        partition(10, 0),
        Err(Error::PartitionUnderflow { workers: 0, points: 10 })
    ));
}

#[test]
fn test_partition_clips_tail() {
    let ranges: Vec<_> = partition(5, 4).unwrap().iter().map(|p| p.range()).collect();
    assert_eq!(vec![0..2, 2..4, 4..5, 5..5], ranges);
}

#[test]
fn test_min_reduce_rounds() {
    let reduce = std::sync::Arc::new(MinReduce::new(3).unwrap());
    let handles: Vec<_> = (0..3)
        .map(|rank| {
            let reduce = reduce.clone();
            std::thread::spawn(move || {
                (0..20)
                    .map(|round| reduce.reduce(rank, round, (rank * 10 + round) as Scalar).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        let mins = handle.join().unwrap();
        assert_eq!((0..20).map(|r| r as Scalar).collect::<Vec<_>>(), mins);
    }
}

#[test]
fn test_min_reduce_rejects_empty_pool() {
    assert!(matches!(MinReduce::new(0), Err(Error::InvalidConfig(_))));

    let single = MinReduce::new(1).unwrap();
    assert_eq!(3., single.reduce(0, 0, 3.).unwrap());
    assert_eq!(1., single.reduce(0, 1, 1.).unwrap());
}

#[test]
fn test_min_reduce_wrong_round() {
    let reduce = MinReduce::new(2).unwrap();
    assert!(matches!(
        reduce.reduce(1, 3, 1.),
        Err(Error::ProtocolDesync { .. })
    ));
}

#[test]
fn test_min_reduce_abort_wakes_waiters() {
    let reduce = std::sync::Arc::new(MinReduce::new(3).unwrap());
    let waiter = {
        let reduce = reduce.clone();
        std::thread::spawn(move || reduce.reduce(1, 0, 1.))
    };

    std::thread::sleep(std::time::Duration::from_millis(20));
    reduce.abort(2);
    assert!(matches!(waiter.join().unwrap(), Err(Error::Disconnected(2))));
    assert!(reduce.reduce(0, 0, 1.).is_err());
}

#[test]
fn test_problem_generation() {
    let a = Problem::generate(42, 16, 100, 10).unwrap();
    let b = Problem::generate(42, 16, 100, 10).unwrap();

    assert_eq!(110, a.points().len());
    assert_eq!(100..110, a.query_ids());
    assert_eq!(a.points().point(57).coordinates(), b.points().point(57).coordinates());
    assert!(a.queries().iter().all(|q| q.id() >= 100));

    assert!(matches!(Problem::generate(1, 12, 10, 1), Err(Error::InvalidConfig(_))));
    assert!(matches!(Problem::generate(1, 0, 10, 1), Err(Error::InvalidConfig(_))));
}
