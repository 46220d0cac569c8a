use crate::{
    capture::CapturedImage,
    config::{ConfigError, EndpointConfig},
    messages::{ErrorBody, IMAGE_FIELD, PredictionResult},
};
use reqwest::{
    StatusCode, Url,
    multipart::{Form, Part},
};
use std::future::Future;

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("response is not a valid prediction: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A service that classifies a leaf image.
pub trait PredictBackend: Clone + Send + Sync + 'static {
    fn predict(
        &self,
        image: CapturedImage,
    ) -> impl Future<Output = Result<PredictionResult, PredictError>> + Send;
}

/// Talks to the prediction service over HTTP.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    predict_url: Url,
    health_url: Url,
}

impl HttpBackend {
    pub fn new(config: &EndpointConfig, origin: &Url) -> Result<Self, ConfigError> {
        Ok(Self {
            client: reqwest::Client::new(),
            predict_url: config.predict_url(origin)?,
            health_url: config.health_url(origin)?,
        })
    }

    pub fn predict_url(&self) -> &Url {
        &self.predict_url
    }

    /// Queries `GET /health` and returns its body.
    pub async fn health(&self) -> Result<serde_json::Value, PredictError> {
        let response = self.client.get(self.health_url.clone()).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

impl PredictBackend for HttpBackend {
    async fn predict(&self, image: CapturedImage) -> Result<PredictionResult, PredictError> {
        let file_name = image.file_name();
        let mime_type = image.mime_type();
        let part = Part::bytes(image.into_bytes())
            .file_name(file_name)
            .mime_str(mime_type)?;
        let form = Form::new().part(IMAGE_FIELD, part);

        log::debug!("POST {}", self.predict_url);

        let response = self
            .client
            .post(self.predict_url.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

fn status_error(status: StatusCode, body: &[u8]) -> PredictError {
    let body = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            error,
            details: Some(details),
        }) => format!("{error} ({details})"),
        Ok(ErrorBody { error, .. }) => error,
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    };
    PredictError::Status { status, body }
}
