//! Density-based clustering of swing prices.
//!
//! 1-D DBSCAN: with points sorted ascending, a cluster is a maximal run whose
//! consecutive gaps are all <= ε. Runs shorter than `min_points` are noise.
//! Sorting by (price, bar index) makes the partition independent of the
//! input order.

use serde::{Deserialize, Serialize};

use super::SwingPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Members sorted by ascending price.
    pub members: Vec<SwingPoint>,
}

impl Cluster {
    /// Build from members in any order.
    pub fn new(mut members: Vec<SwingPoint>) -> Self {
        members.sort_by(|a, b| a.price.total_cmp(&b.price).then(a.index.cmp(&b.index)));
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.members.iter().map(|m| m.price).collect()
    }

    pub fn low(&self) -> f64 {
        self.members.first().map_or(f64::NAN, |m| m.price)
    }

    pub fn high(&self) -> f64 {
        self.members.last().map_or(f64::NAN, |m| m.price)
    }

    pub fn width(&self) -> f64 {
        self.high() - self.low()
    }

    /// Median member price.
    pub fn centroid(&self) -> f64 {
        super::kde::median_sorted(&self.prices())
    }

    /// Bar index of the newest member swing.
    pub fn newest_index(&self) -> usize {
        self.members.iter().map(|m| m.index).max().unwrap_or(0)
    }
}

pub fn cluster_points(points: &[SwingPoint], eps: f64, min_points: usize) -> Vec<Cluster> {
    let mut sorted: Vec<SwingPoint> = points
        .iter()
        .copied()
        .filter(|p| p.price.is_finite())
        .collect();
    sorted.sort_by(|a, b| a.price.total_cmp(&b.price).then(a.index.cmp(&b.index)));

    let min_points = min_points.max(1);
    let mut clusters = Vec::new();
    let mut run: Vec<SwingPoint> = Vec::new();

    for point in sorted {
        if let Some(prev) = run.last() {
            if point.price - prev.price > eps {
                if run.len() >= min_points {
                    clusters.push(Cluster::new(std::mem::take(&mut run)));
                } else {
                    run.clear();
                }
            }
        }
        run.push(point);
    }
    if run.len() >= min_points {
        clusters.push(Cluster::new(run));
    }
    clusters
}
