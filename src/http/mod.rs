//! HTTP client module
//!
//! Provides the JSON HTTP client used to talk to the remote reporting service.

mod client;

pub use client::{HttpClient, HttpError, HttpRequest, HttpResponse};
