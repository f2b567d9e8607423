//! Shared value types: metric identifiers, lags and diff categories.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{RcaError, RcaResult};

// ---------------------------------------------------------------------------
// Metric identifiers
// ---------------------------------------------------------------------------

/// Separates the service (application) prefix from the metric name.
pub const APP_METRIC_DELIMITER: char = '|';

/// Suffix appended to differenced metrics by the preprocessing stage.
pub const DIFF_SUFFIX: &str = "-diff";

/// Split a `service|metric` identifier on the first delimiter.
///
/// Returns `None` when the identifier carries no delimiter.
pub fn split_identifier(identifier: &str) -> Option<(&str, &str)> {
    identifier.split_once(APP_METRIC_DELIMITER)
}

/// Drop the application prefix of a metric name, if any.
///
/// Cluster tables key metrics by this canonical form.
pub fn canonical_metric(metric: &str) -> &str {
    match metric.split_once(APP_METRIC_DELIMITER) {
        Some((_, name)) => name,
        None => metric,
    }
}

/// Drop a trailing `-diff` marker.
pub fn strip_diff_suffix(metric: &str) -> &str {
    metric.strip_suffix(DIFF_SUFFIX).unwrap_or(metric)
}

/// Leading token of a service name (`nova_api` -> `nova`).
pub fn service_prefix(service: &str) -> &str {
    service.split('_').next().unwrap_or(service)
}

// ---------------------------------------------------------------------------
// Lags
// ---------------------------------------------------------------------------

/// Number of lag slots tested per metric pair.
pub const LAG_SLOTS: u8 = 5;

/// A causality test lag (1-based slot index).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lag(pub u8);

impl Lag {
    /// All lag slots in column order.
    pub fn all() -> impl Iterator<Item = Lag> {
        (1..=LAG_SLOTS).map(Lag)
    }

    /// Column header holding this lag's p-value.
    pub fn column(self) -> String {
        format!("p_for_lag_{}", self.0)
    }

    /// Parse a lag written as a number (`2`, `2.0`).
    pub fn parse(raw: &str) -> RcaResult<Lag> {
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| RcaError::Parse(format!("invalid lag value: {raw:?}")))?;
        if value.fract() != 0.0 || value < 1.0 || value > f64::from(u8::MAX) {
            return Err(RcaError::Parse(format!("lag must be a positive integer: {raw:?}")));
        }
        Ok(Lag(value as u8))
    }
}

impl fmt::Display for Lag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of comparing a forward/backward p-value pair at one lag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LagDirection {
    /// Both hypotheses significant.
    Bidir,
    /// Perpetrator -> consequence.
    Forward,
    /// Consequence -> perpetrator.
    Back,
}

// ---------------------------------------------------------------------------
// Diff categories
// ---------------------------------------------------------------------------

/// Partition label of a metric relative to a comparison snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffCategory {
    New,
    Discarded,
    Unchanged,
}

impl DiffCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            DiffCategory::New => "new",
            DiffCategory::Discarded => "discarded",
            DiffCategory::Unchanged => "unchanged",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_identifier_first_delimiter_only() {
        assert_eq!(
            split_identifier("nova_api|cpu|user"),
            Some(("nova_api", "cpu|user"))
        );
        assert_eq!(split_identifier("no-delimiter"), None);
    }

    #[test]
    fn test_canonical_metric() {
        assert_eq!(canonical_metric("keystone|mem_used"), "mem_used");
        assert_eq!(canonical_metric("mem_used"), "mem_used");
    }

    #[test]
    fn test_strip_diff_suffix_is_literal() {
        assert_eq!(strip_diff_suffix("rx_bytes-diff"), "rx_bytes");
        // Only the literal suffix goes, not trailing characters from it.
        assert_eq!(strip_diff_suffix("cpu_idle"), "cpu_idle");
        assert_eq!(strip_diff_suffix("tx_diff"), "tx_diff");
    }

    #[test]
    fn test_service_prefix() {
        assert_eq!(service_prefix("nova_compute"), "nova");
        assert_eq!(service_prefix("rabbitmq"), "rabbitmq");
    }

    #[test]
    fn test_lag_parse() {
        assert_eq!(Lag::parse("1.0").unwrap(), Lag(1));
        assert_eq!(Lag::parse(" 3 ").unwrap(), Lag(3));
        assert!(Lag::parse("1.5").is_err());
        assert!(Lag::parse("0").is_err());
        assert!(Lag::parse("x").is_err());
    }

    #[test]
    fn test_lag_columns() {
        let columns: Vec<String> = Lag::all().map(Lag::column).collect();
        assert_eq!(columns.len(), 5);
        assert_eq!(columns[0], "p_for_lag_1");
        assert_eq!(columns[4], "p_for_lag_5");
    }
}
