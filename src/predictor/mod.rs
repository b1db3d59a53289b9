mod ort;
mod remote;

pub use self::ort::OrtPredictor;
pub use self::remote::RemotePredictor;

use crate::{
    config::{ModelSettings, Transport},
    error::PredictorError,
};
use anyhow::Context;
use async_trait::async_trait;
use ndarray::{Array, Ix4};
use std::sync::Arc;

/// A classification model reachable through some transport. Implementations
/// take a batched NHWC image tensor and return the raw per-class score vector.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, batch: &Array<f32, Ix4>) -> Result<Vec<f32>, PredictorError>;
}

/// Selects the predictor implementation from configuration, once at startup.
pub fn build(settings: &ModelSettings) -> anyhow::Result<Arc<dyn Predictor>> {
    match settings.transport {
        Transport::Local => {
            let local = settings
                .local
                .as_ref()
                .context("model.local is required for the local transport")?;
            let predictor = OrtPredictor::new(local)
                .context("failed to instantiate the in-process model session")?;
            Ok(Arc::new(predictor))
        }
        Transport::Remote => {
            let remote = settings
                .remote
                .as_ref()
                .context("model.remote is required for the remote transport")?;
            let predictor = RemotePredictor::new(remote)
                .context("failed to build the prediction endpoint client")?;
            Ok(Arc::new(predictor))
        }
    }
}
