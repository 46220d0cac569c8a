use serde::{Deserialize, Serialize};

/// Multipart form field carrying the image.
pub const IMAGE_FIELD: &str = "image";

/// Body returned by `POST /predict`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PredictionResult {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub treatment: Option<String>,
    #[serde(default)]
    pub schemes: Option<Vec<String>>,
    #[serde(default)]
    pub govt_schemes: Option<Vec<String>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl PredictionResult {
    /// Scheme items, taken from `schemes` or else `govt_schemes`.
    pub fn scheme_items(&self) -> &[String] {
        match (&self.schemes, &self.govt_schemes) {
            (Some(schemes), _) if !schemes.is_empty() => schemes,
            (_, Some(schemes)) => schemes,
            _ => &[],
        }
    }
}

/// Body returned by the backend alongside a non-success status.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub details: Option<String>,
}
