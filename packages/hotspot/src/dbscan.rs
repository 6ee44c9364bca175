//! DBSCAN over raw-degree coordinates.
//!
//! Distance is plain Euclidean on `(lon, lat)` degrees, not geodesic.
//! At Kuwait's scale (under 2 degrees of extent) the distortion is small
//! relative to the 0.01 degree eps, and it keeps neighborhood queries a
//! single R-tree range lookup.

use rstar::{AABB, PointDistance, RTree, RTreeObject};

struct IndexedPoint {
    idx: usize,
    position: [f64; 2],
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        dx.mul_add(dx, dy * dy)
    }
}

/// Clusters points, returning one label per input point in input order.
///
/// `Some(cluster_id)` for clustered points, `None` for noise. Cluster ids
/// are dense from 0 but carry no meaning across runs; only membership is
/// stable for identical input.
#[must_use]
pub fn cluster(points: &[[f64; 2]], eps: f64, min_samples: usize) -> Vec<Option<usize>> {
    let tree = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(idx, &position)| IndexedPoint { idx, position })
            .collect(),
    );

    let eps_squared = eps * eps;
    let region_query = |idx: usize| -> Vec<usize> {
        tree.locate_within_distance(points[idx], eps_squared)
            .map(|p| p.idx)
            .collect()
    };

    // Noise until proven otherwise; `visited` tracks expansion separately
    // so border points can still be adopted by a neighboring core point.
    let mut labels: Vec<Option<usize>> = vec![None; points.len()];
    let mut visited = vec![false; points.len()];
    let mut next_cluster = 0usize;

    for start in 0..points.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;

        let neighbors = region_query(start);
        if neighbors.len() < min_samples {
            continue;
        }

        let cluster_id = next_cluster;
        next_cluster += 1;
        labels[start] = Some(cluster_id);

        let mut queue = neighbors;
        while let Some(idx) = queue.pop() {
            if labels[idx].is_none() {
                labels[idx] = Some(cluster_id);
            }

            if visited[idx] {
                continue;
            }
            visited[idx] = true;

            let idx_neighbors = region_query(idx);
            if idx_neighbors.len() >= min_samples {
                queue.extend(idx_neighbors);
            }
        }
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_close_points_form_one_cluster() {
        let points = [[47.490, 29.300], [47.491, 29.301], [47.492, 29.302]];
        let labels = cluster(&points, 0.01, 3);
        assert_eq!(labels, vec![Some(0), Some(0), Some(0)]);
    }

    #[test]
    fn isolated_points_are_noise() {
        let points = [[47.0, 29.0], [47.5, 29.5], [48.0, 30.0]];
        let labels = cluster(&points, 0.01, 3);
        assert!(labels.iter().all(Option::is_none));
    }

    #[test]
    fn separate_dense_groups_get_distinct_clusters() {
        let points = [
            [47.100, 29.100],
            [47.101, 29.101],
            [47.102, 29.100],
            [47.900, 29.900],
            [47.901, 29.901],
            [47.902, 29.900],
        ];
        let labels = cluster(&points, 0.01, 3);

        let first = labels[0].unwrap();
        let second = labels[3].unwrap();
        assert_ne!(first, second);
        assert!(labels[..3].iter().all(|l| *l == Some(first)));
        assert!(labels[3..].iter().all(|l| *l == Some(second)));
    }

    #[test]
    fn membership_is_stable_across_reruns() {
        let points = [
            [47.490, 29.300],
            [47.491, 29.301],
            [47.492, 29.302],
            [48.2, 29.9],
        ];
        let a = cluster(&points, 0.01, 3);
        let b = cluster(&points, 0.01, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn border_point_joins_cluster() {
        // Middle point is core (3 neighbors within eps); the ends are
        // border points with only 2 each.
        let points = [[47.000, 29.000], [47.008, 29.000], [47.016, 29.000]];
        let labels = cluster(&points, 0.01, 3);
        assert_eq!(labels[1], Some(0));
        assert_eq!(labels[0], Some(0));
        assert_eq!(labels[2], Some(0));
    }
}
