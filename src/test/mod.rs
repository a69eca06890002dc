use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::r#type::Point;


/// `n` points uniformly distributed in `[-5, 5)²` with ids `0..n`.
pub(crate) fn random_points(n: usize, seed: u64) -> Vec<Point> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|id| Point::new(rand_coord(&mut rng), rand_coord(&mut rng), id as i64))
        .collect()
}

pub(crate) fn rand_coord(rng: &mut impl Rng) -> f64 {
    rng.gen::<f64>() * 10. - 5.
}

/// Squared distances from every point to the query, ascending.
pub(crate) fn linear_scan(points: &[Point], qx: f64, qy: f64) -> Vec<f64> {
    let mut dists: Vec<f64> = points.iter().map(|p| p.sq_dist(qx, qy)).collect();
    dists.sort_by(|a, b| a.total_cmp(b));
    dists
}
