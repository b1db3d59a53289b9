use crate::{config::LocalModelSettings, error::PredictorError, predictor::Predictor};
use async_trait::async_trait;
use ndarray::{Array, Axis, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// In-process predictor: the ONNX artifact is loaded once at startup into a
/// small pool of sessions, and requests pick a session round-robin.
pub struct OrtPredictor {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    output_name: String,
}

impl OrtPredictor {
    pub fn new(settings: &LocalModelSettings) -> Result<Self, ort::Error> {
        ort::init().commit()?;
        let num_instances = settings.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(settings.get_model_path())?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        let output_name = sessions
            .first()
            .and_then(|session| {
                let session = session.lock().ok()?;
                session.outputs().first().map(|output| output.name().to_owned())
            })
            .unwrap_or_else(|| "output0".to_string());

        tracing::info!("Created {} ONNX sessions", num_instances);

        Ok(Self {
            counter: Arc::new(AtomicUsize::new(0)),
            sessions: Arc::new(sessions),
            output_name,
        })
    }

    fn run_inference(
        &self,
        input: &Array<f32, Ix4>,
    ) -> Result<ndarray::ArrayD<f32>, PredictorError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let session_arc = &self.sessions[index];
        let mut session = session_arc
            .lock()
            .map_err(|e| PredictorError::Inference(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| PredictorError::Inference(format!("failed to build tensor: {}", e)))?;

        let input_tensor = ort::inputs![tensor_ref];

        let outputs = session
            .run(input_tensor)
            .map_err(|e| PredictorError::Inference(format!("inference failed: {}", e)))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            PredictorError::Inference(format!("model has no output named {}", self.output_name))
        })?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| PredictorError::Inference(format!("failed to extract tensor: {}", e)))?;

        let ix = shape.to_ixdyn();
        let array = ndarray::ArrayD::from_shape_vec(ix, data.to_vec())
            .map_err(|e| PredictorError::Inference(format!("invalid tensor shape: {}", e)))?;

        Ok(array)
    }
}

#[async_trait]
impl Predictor for OrtPredictor {
    async fn predict(&self, batch: &Array<f32, Ix4>) -> Result<Vec<f32>, PredictorError> {
        let output = self.run_inference(batch)?;

        // The model returns one score row per batch entry; we always submit a
        // batch of one.
        let scores: Vec<f32> = if output.ndim() > 1 {
            output.index_axis(Axis(0), 0).iter().copied().collect()
        } else {
            output.iter().copied().collect()
        };

        Ok(scores)
    }
}
