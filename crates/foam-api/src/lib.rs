mod error;
pub use error::ApiError;

mod handler;
pub use handler::{ApiHandler, DiskSpace, StatusKind, StatusReport};

mod adapter;
pub use adapter::PanelApiAdapter;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::HttpApi;

#[cfg(feature = "http")]
mod sse;

#[cfg(feature = "http")]
pub use axum;
