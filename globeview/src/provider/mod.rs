//! Tile imagery provider abstraction
//!
//! The cache only needs one capability from the network layer: turn a
//! [`TileAddress`](crate::coord::TileAddress) into encoded image bytes. That
//! capability is the [`TileFetcher`] trait. [`TemplateProvider`] implements it
//! for any XYZ tile server described by a URL template, on top of an
//! [`AsyncHttpClient`] so tests can substitute a mock transport.
//!
//! ```ignore
//! use globeview::provider::{ReqwestClient, TemplateConfig, TemplateProvider};
//!
//! let config = TemplateConfig::default();
//! let client = ReqwestClient::with_config(config.timeout_secs, &config.user_agent)?;
//! let provider = TemplateProvider::new(client, config)?;
//! ```

mod http;
mod template;
mod types;

pub use http::{AsyncHttpClient, ReqwestClient};
pub use template::{TemplateConfig, TemplateProvider, DEFAULT_URL_TEMPLATE};
pub use types::{BoxFuture, ProviderError, TileFetcher};

#[cfg(test)]
pub use http::tests::MockAsyncHttpClient;
