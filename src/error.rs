//! Rejection reasons produced by the built-in producers.

use thiserror::Error;

/// The default rejection reason of a [`Deferred`](crate::Deferred).
///
/// Handles and combinators are generic over their reason type, so any
/// `Clone + Send` type works. `Error` covers the failures the crate itself can
/// produce. `wait_for_all` does not wrap the reason of the input that rejected
/// first, it forwards it unchanged so callers can still match on the variant.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// A producer failed synchronously while the handle was being created.
    #[error("producer failed: {0}")]
    Producer(String),

    /// The transport could not complete the request at all.
    #[error("request failed: {0}")]
    Transport(String),

    /// A response arrived but its status is outside of the success range.
    #[error("{status} {status_text}")]
    Response { status: u16, status_text: String },
}
