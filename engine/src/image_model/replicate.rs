use std::{future::Future, pin::Pin, time::Duration};

use log::debug;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::sleep;

use super::{GenerateError, Image, ImageModel, models, output};

pub const API_BASE: &str = "https://api.replicate.com/v1";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct ReplicateImageModel {
    client: Client,
    api_token: String,
    base_url: String,
}

impl ReplicateImageModel {
    pub fn new(api_token: String) -> Self {
        Self::with_base_url(api_token, API_BASE.into())
    }

    pub fn with_base_url(api_token: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_token,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn create_prediction(&self, model: &str, prompt: &str) -> RequestBuilder {
        let input = models::prediction_input(model, prompt);
        let request = match model.split_once(':') {
            Some((_, version)) => self
                .client
                .post(format!("{}/predictions", self.base_url))
                .json(&json!({ "version": version, "input": input })),
            None => self
                .client
                .post(format!("{}/models/{model}/predictions", self.base_url))
                .json(&json!({ "input": input })),
        };
        request
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
    }

    /// Searches the public models, most run first. Only the first result page is fetched.
    pub async fn search_models(&self, query: &str) -> Result<Vec<ModelSummary>, GenerateError> {
        let query_method = Method::from_bytes(b"QUERY").expect("QUERY is a valid method token");
        let page = self
            .client
            .request(query_method, format!("{}/models", self.base_url))
            .bearer_auth(&self.api_token)
            .header("Content-Type", "text/plain")
            .body(query.to_string())
            .send()
            .await?
            .error_for_status()?
            .json::<SearchPage>()
            .await?;

        let mut models = page.results;
        models.sort_by(|a, b| b.run_count.cmp(&a.run_count));
        Ok(models)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, GenerateError> {
        let failed = |reason: String| GenerateError::DownloadFailed {
            url: url.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(failed(format!("status {status}")));
        }
        let bytes = resp.bytes().await.map_err(|e| failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// One hit of a model search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub run_count: u64,
}

impl ModelSummary {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<ModelSummary>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

impl ImageModel for ReplicateImageModel {
    fn generate<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Image, GenerateError>> + Send + 'a>> {
        Box::pin(async move {
            // 1. Create prediction
            let create_resp = self.create_prediction(model, prompt).send().await?;
            let status = create_resp.status();
            let body = create_resp.text().await?;
            if !status.is_success() {
                return Err(GenerateError::PredictionFailed(format!("{status} - {body}")));
            }

            let mut prediction = serde_json::from_str::<Prediction>(&body).map_err(|e| {
                GenerateError::PredictionFailed(format!("Unexpected response ({e}):\n{body}"))
            })?;
            let poll_url = prediction.urls.as_ref().and_then(|u| u.get.clone());

            // 2. Poll until finished
            loop {
                match prediction.status.as_str() {
                    "succeeded" => break,
                    "failed" | "canceled" => {
                        return Err(GenerateError::PredictionFailed(format!(
                            "{} ({})",
                            prediction.status, prediction.error
                        )));
                    }
                    other => {
                        debug!("Prediction for {model} is {other}, polling");
                        let url = poll_url.as_deref().ok_or_else(|| {
                            GenerateError::PredictionFailed(format!(
                                "Missing prediction get URL:\n{body}"
                            ))
                        })?;
                        sleep(POLL_INTERVAL).await;
                        prediction = self
                            .client
                            .get(url)
                            .bearer_auth(&self.api_token)
                            .send()
                            .await?
                            .error_for_status()?
                            .json::<Prediction>()
                            .await?;
                    }
                }
            }

            // 3. Download image
            let source = output::resolve_reference(&prediction.output)?;
            debug!("Downloading {source}");
            let data = self.download(&source).await?;
            Ok(Image { data, source })
        })
    }

    fn clone(&self) -> Box<dyn ImageModel + Send + Sync + 'static> {
        Box::new(Clone::clone(self))
    }
}
