//! Reading gzip-compressed, tab-separated causality tables.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use walkdir::WalkDir;

use crate::errors::{RcaError, RcaResult};
use crate::models::{Lag, LAG_SLOTS};

/// File names ending with this are causality tables.
pub const CAUSALITY_SUFFIX: &str = "causality.tsv.gz";

const PERPETRATOR_COLUMN: &str = "perpetrator";
const CONSEQUENCE_COLUMN: &str = "consequence";

/// One directional causality test between two metrics.
#[derive(Clone, Debug, PartialEq)]
pub struct CausalityRow {
    pub perpetrator: String,
    pub consequence: String,
    /// p-value per lag slot; `NaN` when absent.
    pub p_values: [f64; LAG_SLOTS as usize],
}

impl CausalityRow {
    pub fn p_value(&self, lag: Lag) -> f64 {
        self.p_values
            .get(usize::from(lag.0).wrapping_sub(1))
            .copied()
            .unwrap_or(f64::NAN)
    }
}

/// Causality files directly inside `dir`, sorted by path.
pub fn list_causality_files(dir: &Path) -> RcaResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| RcaError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().ends_with(CAUSALITY_SUFFIX) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Open a table for line reading, decompressing `.gz` files.
pub(crate) fn open_table(path: &Path) -> RcaResult<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let is_gzip = path.extension().is_some_and(|ext| ext == "gz");
    if is_gzip {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub(crate) fn column_index(header: &[&str], name: &str, source: &str) -> RcaResult<usize> {
    header
        .iter()
        .position(|column| column.trim() == name)
        .ok_or_else(|| RcaError::Parse(format!("{source}: missing column {name:?}")))
}

pub(crate) fn parse_p_value(raw: &str, source: &str, line_no: usize) -> RcaResult<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse()
        .map_err(|_| RcaError::Parse(format!("{source}:{line_no}: invalid p-value {raw:?}")))
}

/// Parse a causality table whose first line is the header.
pub fn parse_causality_table<R: BufRead>(reader: R, source: &str) -> RcaResult<Vec<CausalityRow>> {
    let mut lines = reader.lines();
    let Some(header) = lines.next().transpose()? else {
        return Ok(Vec::new());
    };
    let header: Vec<&str> = header.split('\t').collect();
    let perpetrator_idx = column_index(&header, PERPETRATOR_COLUMN, source)?;
    let consequence_idx = column_index(&header, CONSEQUENCE_COLUMN, source)?;
    let lag_idx: Vec<usize> = Lag::all()
        .map(|lag| column_index(&header, &lag.column(), source))
        .collect::<RcaResult<_>>()?;
    let width = header.len();

    let mut rows = Vec::new();
    for (offset, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let line_no = offset + 2;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < width {
            return Err(RcaError::Parse(format!(
                "{source}:{line_no}: expected {width} fields, found {}",
                fields.len()
            )));
        }
        let mut p_values = [f64::NAN; LAG_SLOTS as usize];
        for (slot, &idx) in p_values.iter_mut().zip(&lag_idx) {
            *slot = parse_p_value(fields[idx], source, line_no)?;
        }
        rows.push(CausalityRow {
            perpetrator: fields[perpetrator_idx].trim().to_string(),
            consequence: fields[consequence_idx].trim().to_string(),
            p_values,
        });
    }
    Ok(rows)
}

/// Keep the first row of each (perpetrator, consequence) pair.
pub fn dedup_rows(rows: Vec<CausalityRow>) -> Vec<CausalityRow> {
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(rows.len());
    rows.into_iter()
        .filter(|row| seen.insert((row.perpetrator.clone(), row.consequence.clone())))
        .collect()
}

/// Read and deduplicate one causality file.
pub fn read_causality_file(path: &Path) -> RcaResult<Vec<CausalityRow>> {
    let source = path.display().to_string();
    let rows = parse_causality_table(open_table(path)?, &source)?;
    Ok(dedup_rows(rows))
}
