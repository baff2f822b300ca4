use kdmesh::{linear_scan, KdTreeBuilder, PointSet};
use ndarray::Array;

// In this example, we generate 10000 random points in a 16-dimensional Euclidean space and build
// a single k-d tree over them. Subtrees are built in parallel on rayon's global pool down to
// depth 6; below that each subtree is built sequentially on the thread that reached it.
fn main() {
    let mut rng = oorandom::Rand32::new(0);
    let data = Array::from_shape_simple_fn((10_000, 16), || rng.rand_float());
    let index = PointSet::new(data).unwrap();

    let mut points = index.points();
    let tree = KdTreeBuilder::new()
        .parallel_depth(6)
        .build(&mut points)
        .unwrap();
    println!("> {} points, depth {}", tree.len(), tree.depth());

    // Search the nearest neighbour of 10 query points, and check against a linear scan.
    let queries = Array::from_shape_simple_fn((10, 16), || rng.rand_float());
    let queries = PointSet::new(queries).unwrap();
    let all = index.points();

    for q in queries.points() {
        let nn = tree.search(&q).unwrap().unwrap();
        let check = linear_scan(&all, &q).unwrap().unwrap();
        println!("{} -> {} ({}), linear scan {}", q.id(), nn.index(), nn.dist(), check.index());
    }
}
