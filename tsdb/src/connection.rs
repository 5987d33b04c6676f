//! Per-request handling for WebSocket clients.
//!
//! Store calls block on file I/O and the advisory lock, so each request is
//! executed on tokio's blocking pool.
//!
//! Named stores live at `{base}/{name}.dbdb`. A vantage-point index named
//! `idx` lives in `{base}/idx/`, with the series it indexes in
//! `{base}/idx/series/`.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use crate::protocol::{
    self, ClientRequest, NearestRequest, ServerResponse, Status, client_request::Operation,
};
use crate::registry::{RegistryError, StoreRegistry, validate_store_name};
use crate::series::{SERIES_DIRECTORY, SeriesDirectory, correlation_distance};
use crate::storage::{Database, StoreError};
use crate::vantage::{SeriesSource, VantageError, VantageIndex};

pub struct ClientConnection {
    registry: Arc<StoreRegistry>,
}

impl ClientConnection {
    #[must_use]
    pub const fn new(registry: Arc<StoreRegistry>) -> Self {
        Self { registry }
    }

    pub async fn handle_message(&self, request: ClientRequest) -> ServerResponse {
        let request_id = request.request_id;
        let Some(operation) = request.operation else {
            return ServerResponse::with_status(
                request_id,
                Status::InvalidRequest,
                "request has no operation",
            );
        };

        let registry = Arc::clone(&self.registry);
        let mut response =
            match tokio::task::spawn_blocking(move || execute(&registry, operation)).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!("store task failed: {e}");
                    ServerResponse::with_status(None, Status::StorageError, "store task failed")
                }
            };
        response.request_id = request_id;
        response
    }
}

fn execute(registry: &StoreRegistry, operation: Operation) -> ServerResponse {
    match operation {
        Operation::Get(request) => with_store(registry, &request.store, |db| {
            Ok(ServerResponse {
                value: Some(db.get(&request.key)?),
                ..Default::default()
            })
        }),
        Operation::Set(request) => with_store(registry, &request.store, |db| {
            db.set(request.key, request.value)?;
            Ok(ServerResponse::default())
        }),
        Operation::Commit(request) => with_store(registry, &request.store, |db| {
            Ok(ServerResponse {
                root_address: Some(db.commit()?),
                ..Default::default()
            })
        }),
        Operation::RangeAtMost(request) => with_store(registry, &request.store, |db| {
            let entries = db
                .range_at_most(&request.key)?
                .into_iter()
                .map(|(key, value)| protocol::Entry { key, value })
                .collect();
            Ok(ServerResponse {
                entries,
                ..Default::default()
            })
        }),
        Operation::Nearest(request) => nearest(registry.base_directory(), &request),
    }
}

fn nearest(base_directory: &Path, request: &NearestRequest) -> ServerResponse {
    if let Err(e) = validate_store_name(&request.index) {
        return ServerResponse::with_status(None, Status::InvalidRequest, e.to_string());
    }
    let directory = base_directory.join(&request.index);
    let source = SeriesDirectory::new(directory.join(SERIES_DIRECTORY));
    let Some(query) = source.load(&request.series_id) else {
        return ServerResponse::with_status(
            None,
            Status::NotFound,
            format!("no series with id '{}'", request.series_id),
        );
    };
    let count = usize::try_from(request.count).unwrap_or(usize::MAX);

    match VantageIndex::open(&directory)
        .and_then(|index| index.nearest(&query, count, &source, &correlation_distance))
    {
        Ok(neighbors) => ServerResponse {
            neighbors: neighbors
                .into_iter()
                .map(|neighbor| protocol::Neighbor {
                    id: neighbor.id,
                    distance: neighbor.distance,
                })
                .collect(),
            ..Default::default()
        },
        Err(e) => vantage_error_response(&e),
    }
}

/// Run `f` against the named store and turn its outcome into a response.
#[allow(clippy::significant_drop_tightening)]
fn with_store(
    registry: &StoreRegistry,
    name: &str,
    f: impl FnOnce(&mut Database) -> Result<ServerResponse, StoreError>,
) -> ServerResponse {
    let database = match registry.get_or_open(name) {
        Ok(database) => database,
        Err(RegistryError::InvalidName(e)) => {
            return ServerResponse::with_status(None, Status::InvalidRequest, e.to_string());
        }
        Err(RegistryError::Store(e)) => return store_error_response(&e),
        Err(e @ RegistryError::LockPoisoned) => {
            tracing::error!("{e}");
            return ServerResponse::with_status(None, Status::StorageError, e.to_string());
        }
    };

    let Ok(mut database) = database.lock() else {
        tracing::error!("store '{name}' lock poisoned");
        return ServerResponse::with_status(None, Status::StorageError, "store lock poisoned");
    };
    f(&mut *database).unwrap_or_else(|e| store_error_response(&e))
}

fn vantage_error_response(error: &VantageError) -> ServerResponse {
    let status = match error {
        VantageError::Store(e) => return store_error_response(e),
        VantageError::MissingSeries(_) => Status::NotFound,
        VantageError::Io(e) if e.kind() == ErrorKind::NotFound => Status::NotFound,
        VantageError::InsufficientSeries { .. } | VantageError::TooFewVantagePoints { .. } => {
            Status::InvalidRequest
        }
        VantageError::Io(_) => {
            tracing::error!("index error: {error}");
            Status::StorageError
        }
    };
    ServerResponse::with_status(None, status, error.to_string())
}

fn store_error_response(error: &StoreError) -> ServerResponse {
    let status = match error {
        StoreError::NotFound => Status::NotFound,
        StoreError::Closed => Status::Closed,
        StoreError::Io(_) | StoreError::Corruption(_) | StoreError::Lock(_) => {
            tracing::error!("store error: {error}");
            Status::StorageError
        }
    };
    ServerResponse::with_status(None, status, error.to_string())
}
