//! Optional per-metric scores and the uncertainty band over them.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::config::ScoreBand;
use crate::errors::{RcaError, RcaResult};
use crate::ingest::reader::{column_index, open_table, parse_p_value};

#[derive(Clone, Debug, Default)]
pub struct MetricScores {
    scores: HashMap<String, f64>,
}

/// Result of checking a metric pair against a [`ScoreBand`].
#[derive(Clone, Debug, PartialEq)]
pub enum BandCheck {
    /// Outside the band; carries the perpetrator and consequence weights.
    Weights(f64, f64),
    /// Inside the uncertainty band.
    Uncertain,
    /// No score for this metric.
    Missing(String),
}

impl MetricScores {
    pub fn load(path: &Path) -> RcaResult<Self> {
        Self::parse(open_table(path)?, &path.display().to_string())
    }

    /// Parse a `metric<TAB>score` table with a header line.
    pub fn parse<R: BufRead>(reader: R, source: &str) -> RcaResult<Self> {
        let mut lines = reader.lines();
        let Some(header) = lines.next().transpose()? else {
            return Ok(Self::default());
        };
        let header: Vec<&str> = header.split('\t').collect();
        let metric_idx = column_index(&header, "metric", source)?;
        let score_idx = column_index(&header, "score", source)?;

        let mut scores = HashMap::new();
        for (offset, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let line_no = offset + 2;
            let fields: Vec<&str> = line.split('\t').collect();
            let (Some(metric), Some(score)) = (fields.get(metric_idx), fields.get(score_idx)) else {
                return Err(RcaError::Parse(format!("{source}:{line_no}: short row")));
            };
            scores.insert(metric.trim().to_string(), parse_p_value(score, source, line_no)?);
        }
        Ok(Self { scores })
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.scores.get(metric).copied().filter(|s| !s.is_nan())
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Look up both (suffix-stripped) metrics and test them against `band`.
    pub fn check(&self, band: &ScoreBand, perpetrator: &str, consequence: &str) -> BandCheck {
        let Some(p_score) = self.get(perpetrator) else {
            return BandCheck::Missing(perpetrator.to_string());
        };
        let Some(c_score) = self.get(consequence) else {
            return BandCheck::Missing(consequence.to_string());
        };
        if p_score < band.upper && c_score > band.lower {
            BandCheck::Uncertain
        } else {
            BandCheck::Weights(p_score, c_score)
        }
    }
}
