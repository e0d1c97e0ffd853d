//! Resource client library for BuildRun tooling.
//!
//! Provides the [`ResourceApi`] capability and an HTTP implementation for
//! reading, watching, patching and creating platform objects and following
//! execution unit output.

pub mod api;
pub mod error;
pub mod http;

pub use api::{decode, get_typed, LogStream, ResourceApi, WatchStream};
pub use error::ClientError;
pub use http::HttpResourceApi;
