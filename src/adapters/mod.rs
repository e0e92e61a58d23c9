// Adapters layer: concrete implementations for external systems (child processes, http).

pub mod http;
pub mod process;

pub use http::HttpFetcher;
pub use process::SystemRunner;
