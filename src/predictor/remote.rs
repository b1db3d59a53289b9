use crate::{config::RemoteModelSettings, error::PredictorError, predictor::Predictor};
use async_trait::async_trait;
use ndarray::{Array, Ix4};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<Vec<Vec<Vec<f32>>>>,
}

#[derive(Deserialize)]
struct PredictResponse {
    predictions: Vec<Vec<f32>>,
}

/// Remote predictor: delegates inference to a separately hosted model-serving
/// endpoint speaking the `instances`/`predictions` JSON schema.
pub struct RemotePredictor {
    client: reqwest::Client,
    endpoint: String,
}

impl RemotePredictor {
    pub fn new(settings: &RemoteModelSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
        })
    }
}

fn batch_to_instances(batch: &Array<f32, Ix4>) -> Vec<Vec<Vec<Vec<f32>>>> {
    batch
        .outer_iter()
        .map(|image| {
            image
                .outer_iter()
                .map(|row| row.outer_iter().map(|pixel| pixel.to_vec()).collect())
                .collect()
        })
        .collect()
}

#[async_trait]
impl Predictor for RemotePredictor {
    #[instrument(skip(self, batch))]
    async fn predict(&self, batch: &Array<f32, Ix4>) -> Result<Vec<f32>, PredictorError> {
        let request = PredictRequest {
            instances: batch_to_instances(batch),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PredictorError::EndpointStatus(status));
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|_| PredictorError::MalformedResponse)?;

        body.predictions
            .into_iter()
            .next()
            .ok_or(PredictorError::MalformedResponse)
    }
}
