//! Vantage-point similarity index.
//!
//! An index is a directory of stores, one per vantage point. Store `db{i}`
//! maps the distance from vantage point `i` to every indexed series onto
//! that series' id, so the vantage point itself sits at key `0.0`.
//!
//! A query for the `k` nearest series measures the query against every
//! vantage point, picks the `k`-th closest one, and range-queries its store
//! out to twice that distance `d`. The `k` closest vantage points are
//! themselves series within `d` of the query, so the `k` nearest series are
//! all within `d` too, and by the triangle inequality within `2d` of the
//! chosen vantage point.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::registry::STORE_EXTENSION;
use crate::storage::{Database, StoreError};

/// A distance between two series.
pub trait Metric<T> {
    fn distance(&self, a: &T, b: &T) -> f64;
}

impl<T, F> Metric<T> for F
where
    F: Fn(&T, &T) -> f64,
{
    fn distance(&self, a: &T, b: &T) -> f64 {
        self(a, b)
    }
}

/// Loads series by id.
pub trait SeriesSource<T> {
    fn load(&self, id: &str) -> Option<T>;
}

impl<T: Clone> SeriesSource<T> for HashMap<String, T> {
    fn load(&self, id: &str) -> Option<T> {
        self.get(id).cloned()
    }
}

/// A series found by a nearest-neighbor query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub distance: f64,
}

/// An on-disk vantage-point index.
#[derive(Debug, Clone)]
pub struct VantageIndex {
    directory: PathBuf,
    /// Store files, ordered by vantage point number.
    stores: Vec<PathBuf>,
}

impl VantageIndex {
    /// Build an index over `ids` with `count` randomly chosen vantage points.
    ///
    /// Every store of a previous index in `directory` is removed first.
    pub fn build<T, R>(
        directory: &Path,
        ids: &[String],
        source: &impl SeriesSource<T>,
        metric: &impl Metric<T>,
        count: usize,
        rng: &mut R,
    ) -> Result<Self, VantageError>
    where
        R: Rng + ?Sized,
    {
        if ids.len() < count {
            return Err(VantageError::InsufficientSeries {
                available: ids.len(),
                requested: count,
            });
        }
        fs::create_dir_all(directory)?;
        for (_, stale) in store_files(directory)? {
            fs::remove_file(&stale)?;
        }

        let series = ids
            .iter()
            .map(|id| load(source, id))
            .collect::<Result<Vec<_>, _>>()?;

        let mut stores = Vec::with_capacity(count);
        for (number, vantage) in rand::seq::index::sample(rng, ids.len(), count)
            .into_iter()
            .enumerate()
        {
            let path = store_path(directory, number);
            let mut db: Database = Database::open(&path)?;
            for (position, (id, other)) in ids.iter().zip(&series).enumerate() {
                let distance = if position == vantage {
                    0.0
                } else {
                    metric.distance(&series[vantage], other)
                };
                db.set(distance, id.as_str())?;
            }
            db.commit()?;
            db.close()?;

            tracing::debug!(vantage = %ids[vantage], path = %path.display(), "built vantage store");
            stores.push(path);
        }

        tracing::info!(
            vantage_points = count,
            series = ids.len(),
            directory = %directory.display(),
            "built vantage index"
        );
        Ok(Self {
            directory: directory.to_path_buf(),
            stores,
        })
    }

    /// Open the index previously built in `directory`.
    pub fn open(directory: &Path) -> Result<Self, VantageError> {
        Ok(Self {
            directory: directory.to_path_buf(),
            stores: store_files(directory)?
                .into_iter()
                .map(|(_, path)| path)
                .collect(),
        })
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of vantage points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.stores.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// The id of each vantage point, in vantage point order.
    pub fn vantage_points(&self) -> Result<Vec<String>, VantageError> {
        self.stores
            .iter()
            .map(|path| {
                let mut db: Database = Database::open(path)?;
                Ok(db.get(&0.0)?)
            })
            .collect()
    }

    /// The `count` series nearest to `query`, closest first.
    ///
    /// `count` may not exceed the number of vantage points.
    pub fn nearest<T>(
        &self,
        query: &T,
        count: usize,
        source: &impl SeriesSource<T>,
        metric: &impl Metric<T>,
    ) -> Result<Vec<Neighbor>, VantageError> {
        if count > self.stores.len() {
            return Err(VantageError::TooFewVantagePoints {
                available: self.stores.len(),
                requested: count,
            });
        }

        let Some(rank) = count.checked_sub(1) else {
            return Ok(Vec::new());
        };

        let mut vantage_distances = self
            .stores
            .iter()
            .zip(self.vantage_points()?)
            .map(|(path, id)| Ok((path.as_path(), metric.distance(query, &load(source, &id)?))))
            .collect::<Result<Vec<_>, VantageError>>()?;
        vantage_distances.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (path, distance) = vantage_distances[rank];

        let radius = 2.0 * distance;
        let mut db: Database = Database::open(path)?;
        let candidates = db.range_at_most(&radius)?;
        tracing::debug!(
            store = %path.display(),
            radius,
            candidates = candidates.len(),
            "searching vantage store"
        );

        let mut neighbors = candidates
            .into_iter()
            .map(|(_, id)| {
                let distance = metric.distance(query, &load(source, &id)?);
                Ok(Neighbor { id, distance })
            })
            .collect::<Result<Vec<_>, VantageError>>()?;
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
        neighbors.truncate(count);
        Ok(neighbors)
    }
}

fn load<T>(source: &impl SeriesSource<T>, id: &str) -> Result<T, VantageError> {
    source
        .load(id)
        .ok_or_else(|| VantageError::MissingSeries(id.to_string()))
}

/// The index stores in `directory`, ordered by vantage point number.
fn store_files(directory: &Path) -> std::io::Result<Vec<(usize, PathBuf)>> {
    let mut numbered = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if let Some(number) = store_number(&path) {
            numbered.push((number, path));
        }
    }
    numbered.sort_by_key(|(number, _)| *number);
    Ok(numbered)
}

fn store_path(directory: &Path, number: usize) -> PathBuf {
    directory.join(format!("db{number}.{STORE_EXTENSION}"))
}

/// The vantage point number of an index store file, if `path` is one.
fn store_number(path: &Path) -> Option<usize> {
    if path.extension()? != STORE_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.strip_prefix("db")?.parse().ok()
}

/// Error returned by index operations.
#[derive(Debug)]
pub enum VantageError {
    /// Fewer series than requested vantage points.
    InsufficientSeries { available: usize, requested: usize },
    /// More neighbors requested than there are vantage points.
    TooFewVantagePoints { available: usize, requested: usize },
    /// The series source has no series with this id.
    MissingSeries(String),
    Io(std::io::Error),
    Store(StoreError),
}

impl std::fmt::Display for VantageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientSeries {
                available,
                requested,
            } => write!(
                f,
                "cannot choose {requested} vantage points from {available} series"
            ),
            Self::TooFewVantagePoints {
                available,
                requested,
            } => write!(
                f,
                "requested {requested} neighbors but the index has {available} vantage points"
            ),
            Self::MissingSeries(id) => write!(f, "no series with id '{id}'"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for VantageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VantageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<StoreError> for VantageError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
