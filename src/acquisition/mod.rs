//! Page acquisition: plain HTTP and browser-backed fetching.
//!
//! Both paths produce the same classified [`FetchOutcome`]; the orchestrator
//! picks one per run. The HTTP fetcher is the default, the browser fetcher is
//! the fallback for sites whose catalogs only exist after script execution.

pub mod browser;
pub mod http;

pub use browser::{BrowserCapture, BrowserFetcher, PageCapture};
pub use http::{AccessStatus, FetchOutcome, HttpFetcher};
