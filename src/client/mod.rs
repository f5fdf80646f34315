//! Document client for the remote service, gated by the rate limiter.

mod document;
mod submitter;
mod transport;

pub use document::{Description, Document, Product};
pub use submitter::{DocumentClient, Receipt};
pub use transport::{DryRunTransport, HttpTransport, OutboundRequest, Transport, TransportResponse};
