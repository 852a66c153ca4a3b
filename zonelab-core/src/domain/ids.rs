use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Timeframe, ZoneKind};

/// Deterministic zone identifier.
///
/// Derived from timeframe, kind at creation and the quantized midpoint, so
/// the same level rebuilt from the same history always gets the same id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ZoneId(pub String);

impl ZoneId {
    /// Build the id for a zone.
    ///
    /// Uses BLAKE3 for a stable hash across builds/platforms.
    pub fn derive(timeframe: Timeframe, kind: ZoneKind, bucket: i64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(timeframe.as_str().as_bytes());
        hasher.update(&[kind.code() as u8]);
        hasher.update(&bucket.to_le_bytes());
        let hex = hasher.finalize().to_hex();
        Self(format!("{}-{}-{}", timeframe, kind.code(), &hex.as_str()[..16]))
    }

    /// Disambiguate a colliding id by appending an ordinal suffix.
    pub fn with_suffix(&self, ordinal: usize) -> Self {
        Self(format!("{}.{ordinal}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quantize a price on a logarithmic grid with steps of `bucket_pct`.
///
/// Neighbouring buckets differ by a constant relative distance, so the grid
/// works identically for a 0.5 asset and a 50,000 asset.
pub fn price_bucket(price: f64, bucket_pct: f64) -> i64 {
    let step = (1.0 + bucket_pct.max(1e-6)).ln();
    let p = if price.is_finite() && price > 0.0 {
        price
    } else {
        f64::MIN_POSITIVE
    };
    (p.ln() / step).round() as i64
}
