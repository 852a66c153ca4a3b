//! Gaussian kernel density estimate and peak prominence.
//!
//! Bandwidth follows Silverman's rule, `0.9 · min(σ, IQR/1.34) · n^(-1/5)`.
//! The density is sampled on a fixed grid spanning the sample range padded
//! by three bandwidths, so unimodal samples fall to near zero at both ends.
//! Degenerate input (fewer than 3 points, zero spread, non-finite density)
//! is an error the caller is expected to treat leniently.

use statrs::distribution::{Continuous, Normal};
use statrs::statistics::Statistics;
use thiserror::Error;

const MIN_POINTS: usize = 3;
const PAD_BANDWIDTHS: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KdeError {
    #[error("degenerate density estimate: {0}")]
    Degenerate(&'static str),
}

/// Linear-interpolated quantile of an ascending-sorted slice.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

pub fn median_sorted(sorted: &[f64]) -> f64 {
    percentile_sorted(sorted, 0.5)
}

/// Median of an unsorted sample.
pub fn median(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    median_sorted(&sorted)
}

pub fn silverman_bandwidth(sorted: &[f64]) -> Result<f64, KdeError> {
    if sorted.len() < MIN_POINTS {
        return Err(KdeError::Degenerate("fewer than 3 points"));
    }
    let sigma = sorted.iter().std_dev();
    let iqr = percentile_sorted(sorted, 0.75) - percentile_sorted(sorted, 0.25);
    // IQR collapses for samples with repeated values; fall back to σ alone
    let spread = if iqr > 0.0 { sigma.min(iqr / 1.34) } else { sigma };
    let h = 0.9 * spread * (sorted.len() as f64).powf(-0.2);
    if h.is_finite() && h > 0.0 {
        Ok(h)
    } else {
        Err(KdeError::Degenerate("zero spread"))
    }
}

/// Density sampled on an evenly spaced grid.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub bandwidth: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub x: f64,
    pub density: f64,
    pub prominence: f64,
}

impl DensityGrid {
    pub fn estimate(values: &[f64], grid_points: usize) -> Result<Self, KdeError> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);
        let h = silverman_bandwidth(&sorted)?;
        let kernel = Normal::new(0.0, 1.0).map_err(|_| KdeError::Degenerate("kernel"))?;

        let lo = sorted[0] - PAD_BANDWIDTHS * h;
        let hi = sorted[sorted.len() - 1] + PAD_BANDWIDTHS * h;
        let points = grid_points.max(2);
        let step = (hi - lo) / (points - 1) as f64;
        let norm = 1.0 / (sorted.len() as f64 * h);

        let xs: Vec<f64> = (0..points).map(|i| lo + step * i as f64).collect();
        let ys: Vec<f64> = xs
            .iter()
            .map(|&x| norm * sorted.iter().map(|&p| kernel.pdf((x - p) / h)).sum::<f64>())
            .collect();

        if ys.iter().any(|y| !y.is_finite()) {
            return Err(KdeError::Degenerate("non-finite density"));
        }
        Ok(Self { xs, ys, bandwidth: h })
    }

    pub fn max_density(&self) -> f64 {
        self.ys.iter().copied().fold(0.0, f64::max)
    }

    /// Local maxima with their topographic prominence, tallest first.
    ///
    /// A plateau reports its left-most sample.
    pub fn peaks(&self) -> Vec<Peak> {
        let ys = &self.ys;
        let n = ys.len();
        let mut peaks = Vec::new();
        for i in 0..n {
            let left_ok = i == 0 || ys[i] > ys[i - 1];
            let right_ok = i + 1 == n || ys[i] >= ys[i + 1];
            if !(left_ok && right_ok) || ys[i] <= 0.0 {
                continue;
            }
            peaks.push(Peak {
                index: i,
                x: self.xs[i],
                density: ys[i],
                prominence: self.prominence_at(i),
            });
        }
        peaks.sort_by(|a, b| b.density.total_cmp(&a.density).then(a.index.cmp(&b.index)));
        peaks
    }

    /// Height above the higher of the two lowest points reachable before
    /// climbing above this peak.
    fn prominence_at(&self, i: usize) -> f64 {
        let ys = &self.ys;
        let h = ys[i];
        let mut left_min = h;
        for &y in ys[..i].iter().rev() {
            if y > h {
                break;
            }
            left_min = left_min.min(y);
        }
        let mut right_min = h;
        for &y in &ys[i + 1..] {
            if y > h {
                break;
            }
            right_min = right_min.min(y);
        }
        h - left_min.max(right_min)
    }

    /// Peaks whose prominence is at least `ratio` of the maximum density.
    pub fn significant_peaks(&self, ratio: f64) -> Vec<Peak> {
        let floor = ratio * self.max_density();
        self.peaks()
            .into_iter()
            .filter(|p| p.prominence >= floor)
            .collect()
    }

    /// Tallest peak prominence over maximum density.
    pub fn prominence_ratio(&self) -> f64 {
        let max = self.max_density();
        match self.peaks().first() {
            Some(peak) if max > 0.0 => peak.prominence / max,
            _ => 0.0,
        }
    }

    /// Location of the density minimum strictly between two grid indices.
    pub fn valley_between(&self, a: usize, b: usize) -> Option<f64> {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        if hi <= lo + 1 {
            return None;
        }
        (lo + 1..hi)
            .min_by(|&i, &j| self.ys[i].total_cmp(&self.ys[j]))
            .map(|i| self.xs[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;

    #[test]
    fn percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_sorted(&v, 0.5), 3.0);
        assert_approx(percentile_sorted(&v, 0.15), 1.6, 1e-12);
        assert_eq!(percentile_sorted(&v, 1.0), 5.0);
        assert!(percentile_sorted(&[], 0.5).is_nan());
    }

    #[test]
    fn median_of_even_sample() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn too_few_points_is_degenerate() {
        assert_eq!(
            DensityGrid::estimate(&[1.0, 2.0], 64),
            Err(KdeError::Degenerate("fewer than 3 points"))
        );
    }

    #[test]
    fn identical_points_are_degenerate() {
        assert!(DensityGrid::estimate(&[5.0, 5.0, 5.0, 5.0], 64).is_err());
    }

    #[test]
    fn unimodal_sample_is_fully_prominent() {
        let grid = DensityGrid::estimate(&[9.8, 9.9, 10.0, 10.0, 10.1, 10.2], 128).unwrap();
        assert_eq!(grid.peaks().len(), 1);
        // padded grid lets the tails fall close to zero
        assert!(grid.prominence_ratio() > 0.9);
    }

    #[test]
    fn bimodal_sample_has_two_significant_peaks() {
        let values = [1.0, 1.05, 1.1, 1.0, 5.0, 5.05, 5.1, 5.0];
        let grid = DensityGrid::estimate(&values, 128).unwrap();
        let peaks = grid.significant_peaks(0.25);
        assert_eq!(peaks.len(), 2);
        let valley = grid.valley_between(peaks[0].index, peaks[1].index).unwrap();
        assert!(valley > 1.1 && valley < 5.0);
    }
}
