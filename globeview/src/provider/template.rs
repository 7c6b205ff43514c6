//! URL-template tile provider.
//!
//! Any XYZ (Web Mercator) tile server can be described by a template such as
//! `https://{s}.tile.example.com/{z}/{x}/{y}.png`:
//!
//! - `{x}`, `{y}`, `{z}`: column, row (0 at the north edge) and zoom
//! - `{s}`: optional subdomain, rotated over the configured list by
//!   `(x + y) % n` so neighbouring tiles spread across hosts

use tracing::debug;

use super::http::{AsyncHttpClient, DEFAULT_TIMEOUT_SECS};
use super::types::{BoxFuture, ProviderError, TileFetcher};
use crate::coord::TileAddress;

/// ArcGIS World Imagery, served without authentication.
pub const DEFAULT_URL_TEMPLATE: &str =
    "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}";

/// Highest zoom ArcGIS World Imagery serves in most areas.
const DEFAULT_MAX_ZOOM: u8 = 19;

/// Provider settings, typically loaded from the `[provider]` config section.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateConfig {
    pub url_template: String,
    pub subdomains: Vec<String>,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            subdomains: Vec::new(),
            min_zoom: 0,
            max_zoom: DEFAULT_MAX_ZOOM,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: concat!("globeview/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl TemplateConfig {
    /// Checks placeholders, subdomains and the zoom range.
    pub fn validate(&self) -> Result<(), ProviderError> {
        for placeholder in ["{x}", "{y}", "{z}"] {
            if !self.url_template.contains(placeholder) {
                return Err(ProviderError::InvalidTemplate(format!(
                    "missing {} in '{}'",
                    placeholder, self.url_template
                )));
            }
        }
        if self.url_template.contains("{s}") && self.subdomains.is_empty() {
            return Err(ProviderError::InvalidTemplate(
                "template uses {s} but no subdomains are configured".to_string(),
            ));
        }
        if self.min_zoom > self.max_zoom {
            return Err(ProviderError::InvalidTemplate(format!(
                "min_zoom {} exceeds max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        Ok(())
    }
}

/// Tile provider that expands a URL template per tile.
pub struct TemplateProvider<C: AsyncHttpClient> {
    http_client: C,
    config: TemplateConfig,
}

impl<C: AsyncHttpClient> TemplateProvider<C> {
    /// Creates a provider after validating the template.
    pub fn new(http_client: C, config: TemplateConfig) -> Result<Self, ProviderError> {
        config.validate()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    /// Builds the tile URL for the given address.
    pub fn build_url(&self, tile: &TileAddress) -> String {
        let mut url = self
            .config
            .url_template
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
            .replace("{z}", &tile.zoom.to_string());
        if !self.config.subdomains.is_empty() {
            let n = self.config.subdomains.len() as i64;
            let index = (tile.x + tile.y).rem_euclid(n) as usize;
            url = url.replace("{s}", &self.config.subdomains[index]);
        }
        url
    }
}

impl<C: AsyncHttpClient> TileFetcher for TemplateProvider<C> {
    fn fetch(&self, tile: TileAddress) -> BoxFuture<'_, Result<Vec<u8>, ProviderError>> {
        Box::pin(async move {
            if !self.supports_zoom(tile.zoom) {
                return Err(ProviderError::UnsupportedZoom(tile.zoom));
            }
            let url = self.build_url(&tile);
            debug!(tile_x = tile.x, tile_y = tile.y, zoom = tile.zoom, url = %url, "Fetching tile");
            self.http_client.get(&url).await
        })
    }

    fn name(&self) -> &str {
        "template"
    }

    fn min_zoom(&self) -> u8 {
        self.config.min_zoom
    }

    fn max_zoom(&self) -> u8 {
        self.config.max_zoom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockAsyncHttpClient;

    fn osm_like() -> TemplateConfig {
        TemplateConfig {
            url_template: "https://{s}.tile.example.com/{z}/{x}/{y}.png".to_string(),
            subdomains: vec!["a".into(), "b".into(), "c".into()],
            ..TemplateConfig::default()
        }
    }

    #[test]
    fn test_default_template_is_valid() {
        assert!(TemplateConfig::default().validate().is_ok());
    }

    #[test]
    fn test_build_url_default_template_uses_row_before_column() {
        let provider =
            TemplateProvider::new(MockAsyncHttpClient::new(Ok(vec![])), TemplateConfig::default())
                .unwrap();
        let url = provider.build_url(&TileAddress::unchecked(3, 5, 4));
        assert!(url.ends_with("/tile/4/5/3"), "{}", url);
    }

    #[test]
    fn test_subdomains_rotate_by_tile_position() {
        let provider =
            TemplateProvider::new(MockAsyncHttpClient::new(Ok(vec![])), osm_like()).unwrap();
        assert_eq!(
            provider.build_url(&TileAddress::unchecked(0, 0, 2)),
            "https://a.tile.example.com/2/0/0.png"
        );
        assert_eq!(
            provider.build_url(&TileAddress::unchecked(1, 0, 2)),
            "https://b.tile.example.com/2/1/0.png"
        );
        assert_eq!(
            provider.build_url(&TileAddress::unchecked(2, 3, 3)),
            "https://c.tile.example.com/3/2/3.png"
        );
    }

    #[test]
    fn test_invalid_templates_are_rejected() {
        let missing_y = TemplateConfig {
            url_template: "https://example.com/{z}/{x}".to_string(),
            ..TemplateConfig::default()
        };
        assert!(matches!(
            missing_y.validate(),
            Err(ProviderError::InvalidTemplate(_))
        ));

        let no_subdomains = TemplateConfig {
            subdomains: vec![],
            ..osm_like()
        };
        assert!(no_subdomains.validate().is_err());

        let inverted = TemplateConfig {
            min_zoom: 10,
            max_zoom: 5,
            ..TemplateConfig::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[tokio::test]
    async fn test_fetch_requests_expanded_url() {
        let provider =
            TemplateProvider::new(MockAsyncHttpClient::new(Ok(vec![7, 7])), osm_like()).unwrap();
        let bytes = provider.fetch(TileAddress::unchecked(1, 1, 1)).await.unwrap();
        assert_eq!(bytes, vec![7, 7]);
        assert_eq!(
            provider.http_client.requested_urls(),
            vec!["https://c.tile.example.com/1/1/1.png"]
        );
    }

    #[tokio::test]
    async fn test_fetch_unsupported_zoom() {
        let provider =
            TemplateProvider::new(MockAsyncHttpClient::new(Ok(vec![])), TemplateConfig::default())
                .unwrap();
        let result = provider.fetch(TileAddress::unchecked(0, 0, 20)).await;
        assert_eq!(result, Err(ProviderError::UnsupportedZoom(20)));
        assert!(provider.http_client.requested_urls().is_empty());
    }
}
