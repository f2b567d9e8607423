//! Per-lag direction classification of a forward/backward test pair.

use crate::ingest::reader::CausalityRow;
use crate::models::{Lag, LagDirection};

/// Compare one lag's forward and backward p-values against `significance`.
///
/// `NaN` never counts as significant.
pub fn classify_lag(forward_p: f64, backward_p: f64, significance: f64) -> Option<LagDirection> {
    match (forward_p < significance, backward_p < significance) {
        (true, true) => Some(LagDirection::Bidir),
        (true, false) => Some(LagDirection::Forward),
        (false, true) => Some(LagDirection::Back),
        (false, false) => None,
    }
}

/// Significant lags of one row pair, grouped by direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LagBuckets {
    pub bidir: Vec<Lag>,
    pub forward: Vec<Lag>,
    pub back: Vec<Lag>,
}

impl LagBuckets {
    pub fn push(&mut self, direction: LagDirection, lag: Lag) {
        match direction {
            LagDirection::Bidir => self.bidir.push(lag),
            LagDirection::Forward => self.forward.push(lag),
            LagDirection::Back => self.back.push(lag),
        }
    }

    pub fn significant_count(&self) -> usize {
        self.bidir.len() + self.forward.len() + self.back.len()
    }

    pub fn is_empty(&self) -> bool {
        self.significant_count() == 0
    }

    /// Edges materialized for `direction`. Every significant lag re-emits
    /// each bucket that is non-empty at that point, so this counts the
    /// significant lags from the bucket's first lag onwards.
    pub fn emissions(&self, direction: LagDirection) -> usize {
        let Some(first) = self.bucket(direction).first() else {
            return 0;
        };
        [&self.bidir, &self.forward, &self.back]
            .into_iter()
            .flatten()
            .filter(|lag| *lag >= first)
            .count()
    }

    pub fn bucket(&self, direction: LagDirection) -> &[Lag] {
        match direction {
            LagDirection::Bidir => &self.bidir,
            LagDirection::Forward => &self.forward,
            LagDirection::Back => &self.back,
        }
    }
}

/// Classify every lag slot of a pair: `forward` tests perpetrator ->
/// consequence, `backward` the reverse hypothesis.
pub fn classify_pair(forward: &CausalityRow, backward: &CausalityRow, significance: f64) -> LagBuckets {
    let mut buckets = LagBuckets::default();
    for lag in Lag::all() {
        if let Some(direction) =
            classify_lag(forward.p_value(lag), backward.p_value(lag), significance)
        {
            buckets.push(direction, lag);
        }
    }
    buckets
}
