//! Wire messages exchanged over the WebSocket.
//!
//! Each binary frame carries exactly one protobuf-encoded message: clients
//! send [`ClientRequest`], the server answers each with one
//! [`ServerResponse`] carrying the same `request_id`.

/// A request from a client.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientRequest {
    /// Echoed back in the response.
    #[prost(uint32, optional, tag = "1")]
    pub request_id: Option<u32>,
    #[prost(oneof = "client_request::Operation", tags = "2, 3, 4, 5, 6")]
    pub operation: Option<client_request::Operation>,
}

pub mod client_request {
    /// The store operation requested.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Operation {
        #[prost(message, tag = "2")]
        Get(super::GetRequest),
        #[prost(message, tag = "3")]
        Set(super::SetRequest),
        #[prost(message, tag = "4")]
        Commit(super::CommitRequest),
        #[prost(message, tag = "5")]
        RangeAtMost(super::RangeAtMostRequest),
        #[prost(message, tag = "6")]
        Nearest(super::NearestRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRequest {
    #[prost(string, tag = "1")]
    pub store: String,
    #[prost(double, tag = "2")]
    pub key: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetRequest {
    #[prost(string, tag = "1")]
    pub store: String,
    #[prost(double, tag = "2")]
    pub key: f64,
    #[prost(string, tag = "3")]
    pub value: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommitRequest {
    #[prost(string, tag = "1")]
    pub store: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RangeAtMostRequest {
    #[prost(string, tag = "1")]
    pub store: String,
    /// Inclusive upper bound.
    #[prost(double, tag = "2")]
    pub key: f64,
}

/// Find the series most similar to a stored series.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NearestRequest {
    /// Name of the vantage-point index.
    #[prost(string, tag = "1")]
    pub index: String,
    /// Id of the query series within the index's series directory.
    #[prost(string, tag = "2")]
    pub series_id: String,
    /// Number of neighbors wanted; at most the number of vantage points.
    #[prost(uint32, tag = "3")]
    pub count: u32,
}

/// One result of a nearest-neighbor search.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Neighbor {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(double, tag = "2")]
    pub distance: f64,
}

/// One key/value pair of a range result.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Entry {
    #[prost(double, tag = "1")]
    pub key: f64,
    #[prost(string, tag = "2")]
    pub value: String,
}

/// The server's answer to one request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerResponse {
    #[prost(uint32, optional, tag = "1")]
    pub request_id: Option<u32>,
    #[prost(enumeration = "Status", tag = "2")]
    pub status: i32,
    /// Human-readable detail for non-`Ok` statuses.
    #[prost(string, tag = "3")]
    pub message: String,
    /// Set for a successful `Get`.
    #[prost(string, optional, tag = "4")]
    pub value: Option<String>,
    /// Set for a successful `RangeAtMost`, in ascending key order.
    #[prost(message, repeated, tag = "5")]
    pub entries: Vec<Entry>,
    /// Set for a successful `Commit`.
    #[prost(uint64, optional, tag = "6")]
    pub root_address: Option<u64>,
    /// Set for a successful `Nearest`, closest first.
    #[prost(message, repeated, tag = "7")]
    pub neighbors: Vec<Neighbor>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    NotFound = 1,
    InvalidRequest = 2,
    Closed = 3,
    StorageError = 4,
}

impl ServerResponse {
    /// A response with the given status and no payload.
    #[must_use]
    pub fn with_status(request_id: Option<u32>, status: Status, message: impl Into<String>) -> Self {
        Self {
            request_id,
            status: status.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}
