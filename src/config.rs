use reqwest::Url;

/// Origin the page is served from when nothing else is configured.
pub const DEFAULT_PAGE_ORIGIN: &str = "http://127.0.0.1:5000";

/// Path of the classification endpoint, relative to the API base.
pub const PREDICT_PATH: &str = "/predict";

/// Path of the backend liveness endpoint, relative to the API base.
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Base URL of the prediction backend, resolved once at start-up.
///
/// An empty base means requests go to the same origin as the page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EndpointConfig {
    api_base: String,
}

impl EndpointConfig {
    /// Resolves the config from the optional `api-base-url` setting.
    pub fn resolve(setting: Option<&str>) -> Self {
        let api_base = setting.map(str::trim).unwrap_or_default();
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn is_same_origin(&self) -> bool {
        self.api_base.is_empty()
    }

    /// Builds the absolute URL of `path`, relative to `origin` when same-origin.
    pub fn endpoint_url(&self, origin: &Url, path: &str) -> Result<Url, ConfigError> {
        if self.is_same_origin() {
            return origin.join(path).map_err(|e| ConfigError::InvalidUrl {
                url: format!("{origin}{path}"),
                reason: e.to_string(),
            });
        }

        let url = format!("{}{}", self.api_base, path);
        Url::parse(&url).map_err(|e| ConfigError::InvalidUrl {
            url,
            reason: e.to_string(),
        })
    }

    pub fn predict_url(&self, origin: &Url) -> Result<Url, ConfigError> {
        self.endpoint_url(origin, PREDICT_PATH)
    }

    pub fn health_url(&self, origin: &Url) -> Result<Url, ConfigError> {
        self.endpoint_url(origin, HEALTH_PATH)
    }
}

/// Parses the page origin given on the command line.
pub fn parse_origin(origin: &str) -> Result<Url, ConfigError> {
    Url::parse(origin).map_err(|e| ConfigError::InvalidUrl {
        url: origin.to_string(),
        reason: e.to_string(),
    })
}
