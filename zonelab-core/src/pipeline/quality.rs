//! Cluster quality filter: outliers, width guard, density prominence.
//!
//! The filter is lenient where numerics break down. A cluster too small for
//! a density estimate passes the prominence check, and a too-wide cluster
//! that cannot be split is kept in its shrunk form.

use statrs::statistics::Statistics;

use super::kde::{percentile_sorted, DensityGrid, KdeError};
use super::Cluster;
use crate::config::{QualityConfig, WidthGuardConfig};
use crate::domain::Bar;

/// Allowed zone widths for one cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidthBounds {
    pub min: f64,
    pub max: f64,
}

impl WidthBounds {
    /// `min = max(min_pct · price, min_atr · vol)`,
    /// `max = min(k_atr · vol, k_pct · price, k_range · range)`, never below `min`.
    pub fn compute(guard: &WidthGuardConfig, price: f64, vol: f64, rolling_range: f64) -> Self {
        let price = price.abs();
        let min = (guard.min_width_pct * price)
            .max(guard.min_width_atr * vol)
            .max(f64::EPSILON);
        let mut max = (guard.max_width_atr * vol).min(guard.max_width_pct * price);
        if rolling_range.is_finite() && rolling_range > 0.0 {
            max = max.min(guard.max_width_range * rolling_range);
        }
        Self {
            min,
            max: max.max(min),
        }
    }
}

/// Highest high minus lowest low over the newest `lookback` bars.
pub fn rolling_range(bars: &[Bar], lookback: usize) -> f64 {
    let start = bars.len().saturating_sub(lookback);
    let window = &bars[start..];
    let high = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let low = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    high - low
}

pub struct QualityFilter<'a> {
    pub quality: &'a QualityConfig,
    pub guard: &'a WidthGuardConfig,
    /// Timeframe volatility scalar.
    pub vol: f64,
    pub rolling_range: f64,
}

impl QualityFilter<'_> {
    pub fn bounds_for(&self, price: f64) -> WidthBounds {
        WidthBounds::compute(self.guard, price, self.vol, self.rolling_range)
    }

    /// Run all three sub-filters. Returns zero, one or two clusters.
    pub fn apply(&self, cluster: Cluster) -> Vec<Cluster> {
        let Some(cleaned) = self.remove_outliers(cluster) else {
            return Vec::new();
        };
        self.guard_width(cleaned)
            .into_iter()
            .filter(|c| c.len() >= 2 && self.is_prominent(c))
            .collect()
    }

    /// Drop members with |z| above the limit. `None` when fewer than two remain.
    pub fn remove_outliers(&self, cluster: Cluster) -> Option<Cluster> {
        let prices = cluster.prices();
        let mean = prices.iter().mean();
        let sd = prices.iter().std_dev();
        if !(sd.is_finite() && sd > 0.0) {
            return (cluster.len() >= 2).then_some(cluster);
        }
        let kept: Vec<_> = cluster
            .members
            .into_iter()
            .filter(|m| ((m.price - mean) / sd).abs() <= self.quality.outlier_z)
            .collect();
        (kept.len() >= 2).then(|| Cluster::new(kept))
    }

    /// Shrink to the inner percentile band, then try a density split.
    pub fn guard_width(&self, cluster: Cluster) -> Vec<Cluster> {
        let max = self.bounds_for(cluster.centroid()).max;
        if cluster.width() <= max {
            return vec![cluster];
        }

        let prices = cluster.prices();
        let lo = percentile_sorted(&prices, self.quality.shrink_lower_pct);
        let hi = percentile_sorted(&prices, self.quality.shrink_upper_pct);
        let inner: Vec<_> = cluster
            .members
            .iter()
            .copied()
            .filter(|m| m.price >= lo && m.price <= hi)
            .collect();
        let shrunk = if inner.len() >= 2 {
            Cluster::new(inner)
        } else {
            cluster.clone()
        };
        if shrunk.width() <= max {
            return vec![shrunk];
        }

        match self.split(&cluster) {
            Some((left, right)) => {
                tracing::debug!(
                    low = cluster.low(),
                    high = cluster.high(),
                    left = left.len(),
                    right = right.len(),
                    "split wide cluster at density valley"
                );
                vec![left, right]
            }
            None => vec![shrunk],
        }
    }

    /// Split at the density valley between the two tallest significant peaks.
    fn split(&self, cluster: &Cluster) -> Option<(Cluster, Cluster)> {
        let grid = DensityGrid::estimate(&cluster.prices(), self.quality.kde_grid_points).ok()?;
        let peaks = grid.significant_peaks(self.quality.min_prominence_ratio);
        let (a, b) = (peaks.first()?, peaks.get(1)?);
        if (a.x - b.x).abs() < self.guard.split_gap_atr * self.vol {
            return None;
        }
        let valley = grid.valley_between(a.index, b.index)?;
        let (left, right): (Vec<_>, Vec<_>) =
            cluster.members.iter().copied().partition(|m| m.price < valley);
        (left.len() >= 2 && right.len() >= 2).then(|| (Cluster::new(left), Cluster::new(right)))
    }

    /// Tallest-peak prominence check; a degenerate estimate passes.
    pub fn is_prominent(&self, cluster: &Cluster) -> bool {
        match DensityGrid::estimate(&cluster.prices(), self.quality.kde_grid_points) {
            Ok(grid) => grid.prominence_ratio() >= self.quality.min_prominence_ratio,
            Err(KdeError::Degenerate(reason)) => {
                tracing::trace!(reason, members = cluster.len(), "density estimate skipped");
                true
            }
        }
    }

    /// Final draft geometry `(low, mid, high)`: the member span clamped to the
    /// width bounds, centred on the median.
    pub fn draft_bounds(&self, cluster: &Cluster) -> (f64, f64, f64) {
        let centroid = cluster.centroid();
        let bounds = self.bounds_for(centroid);
        let width = cluster.width().clamp(bounds.min, bounds.max);
        let low = centroid - width / 2.0;
        let high = centroid + width / 2.0;
        (low, (low + high) / 2.0, high)
    }
}
