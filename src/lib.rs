//! Tollgate - Sliding-Window Admission Gate
//!
//! This crate throttles a shared action, such as submitting documents to a remote
//! service, so that no more than a fixed number of invocations happen within any
//! rolling time window, no matter how many tasks call it concurrently.

pub mod client;
pub mod config;
pub mod error;
pub mod ratelimit;
