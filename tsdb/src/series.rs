//! Time series stored as text files, and the distance the server ranks
//! them by.
//!
//! A series file holds one `time value` pair per line, separated by
//! whitespace or a comma. Series `id` lives at `{directory}/{id}.dat`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::registry::validate_store_name;
use crate::vantage::SeriesSource;

/// File extension of series files.
pub const SERIES_EXTENSION: &str = "dat";

/// Subdirectory of an index directory that holds its series.
pub const SERIES_DIRECTORY: &str = "series";

/// A sampled time series.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

impl Series {
    /// Parse the text form of a series.
    ///
    /// Returns `None` if any non-empty line is not a `time value` pair.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut times = Vec::new();
        let mut values = Vec::new();
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            let mut fields = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|field| !field.is_empty());
            let time = fields.next()?.parse().ok()?;
            let value = fields.next()?.parse().ok()?;
            if fields.next().is_some() {
                return None;
            }
            times.push(time);
            values.push(value);
        }
        Some(Self { times, values })
    }
}

/// Series files in one directory.
#[derive(Debug, Clone)]
pub struct SeriesDirectory {
    directory: PathBuf,
}

impl SeriesDirectory {
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Ids of every series file in the directory, sorted.
    pub fn ids(&self) -> std::io::Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == SERIES_EXTENSION)
                && let Some(id) = path.file_stem().and_then(|stem| stem.to_str())
                && validate_store_name(id).is_ok()
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl SeriesSource<Series> for SeriesDirectory {
    fn load(&self, id: &str) -> Option<Series> {
        // Ids become file names.
        validate_store_name(id).ok()?;
        let path = self.directory.join(format!("{id}.{SERIES_EXTENSION}"));
        let text = fs::read_to_string(&path).ok()?;
        let series = Series::parse(&text);
        if series.is_none() {
            tracing::warn!(path = %path.display(), "malformed series file");
        }
        series
    }
}

/// Correlation distance between the values of two series.
///
/// Both series are standardized over their common prefix; the result is
/// `sqrt(2 (1 - r))` for Pearson correlation `r`, which ranges over
/// `0..=2` and satisfies the triangle inequality. A series that is empty or
/// constant has correlation 0 with everything.
#[must_use]
pub fn correlation_distance(a: &Series, b: &Series) -> f64 {
    let n = a.values.len().min(b.values.len());
    let (Some(za), Some(zb)) = (standardize(&a.values[..n]), standardize(&b.values[..n])) else {
        return std::f64::consts::SQRT_2;
    };

    #[allow(clippy::cast_precision_loss)]
    let r = za.iter().zip(&zb).map(|(x, y)| x * y).sum::<f64>() / n as f64;
    (2.0 * (1.0 - r.clamp(-1.0, 1.0))).sqrt()
}

#[allow(clippy::cast_precision_loss)]
fn standardize(values: &[f64]) -> Option<Vec<f64>> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let deviation = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    if !deviation.is_normal() {
        return None;
    }
    Some(values.iter().map(|v| (v - mean) / deviation).collect())
}
