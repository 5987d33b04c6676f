// Life of a request:
// 1. A protobuf `ClientRequest` arrives on the WebSocket
// 2. The named store is looked up (or opened) in the registry
// 3. The store call runs on the blocking pool
// 4. The outcome is encoded as a `ServerResponse`
//
// System components:
//  - Storage engine (copy-on-write red-black tree over an append-only file)
//  - Store registry
//  - Vantage-point index, a client of the storage engine
//  - Series files and the correlation distance the index ranks by

pub mod config;
mod connection;
pub mod protocol;
pub mod registry;
pub mod series;
pub mod storage;
pub mod vantage;

#[cfg(test)]
mod simulation;

pub use connection::ClientConnection;
pub use registry::StoreRegistry;
