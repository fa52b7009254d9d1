//! Remote acquisition: listing discovery, HTTP transport, retry, download cache.

pub mod catalog;
pub mod downloader;
pub mod http;
pub mod retry;

pub use catalog::SourceCatalog;
pub use downloader::{Artifact, Downloader, FetchOutcome, FetchSource};
pub use http::{ReqwestTransport, Transport, TransportError};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
