use crate::{
    error::{ApiError, PredictorError},
    labels::CLASS_NAMES,
    server::SharedState,
    tensor::image_to_batch,
};
use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use tracing::instrument;

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub class: String,
    pub confidence: f32,
}

#[instrument(skip(state, multipart))]
pub async fn predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    let mut image_data = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidUpload(e.to_string()))?
    {
        if field.name() == Some("file") {
            image_data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidUpload(e.to_string()))?,
            );
            break;
        }
    }

    let image_data = image_data.ok_or(ApiError::MissingFile)?;
    let batch = image_to_batch(&image_data)?;
    let scores = state.predictor.predict(&batch).await?;
    let response = classify(&scores)?;

    tracing::debug!(
        "Predicted {} with confidence {:.3}",
        response.class,
        response.confidence
    );

    Ok(Json(response))
}

/// Maps the raw score vector to its arg-max label. The confidence is the
/// maximum score as the model produced it, not a re-normalized value.
fn classify(scores: &[f32]) -> Result<PredictionResponse, PredictorError> {
    if scores.len() != CLASS_NAMES.len() {
        return Err(PredictorError::ScoreShape {
            got: scores.len(),
            expected: CLASS_NAMES.len(),
        });
    }

    let (index, confidence) = scores
        .iter()
        .copied()
        .enumerate()
        .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
        .ok_or(PredictorError::ScoreShape {
            got: 0,
            expected: CLASS_NAMES.len(),
        })?;

    Ok(PredictionResponse {
        class: CLASS_NAMES[index].to_string(),
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{predictor::Predictor, routes::api_routes};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use image::{ImageBuffer, Rgb};
    use ndarray::{Array, Ix4};
    use std::{io::Cursor, sync::Arc};
    use tower::ServiceExt;

    struct MockPredictor {
        scores: Vec<f32>,
    }

    #[async_trait]
    impl Predictor for MockPredictor {
        async fn predict(&self, _batch: &Array<f32, Ix4>) -> Result<Vec<f32>, PredictorError> {
            Ok(self.scores.clone())
        }
    }

    /// Derives the winning class from the red channel of the first pixel, so
    /// distinct uploads map to distinct labels.
    struct EchoPredictor;

    #[async_trait]
    impl Predictor for EchoPredictor {
        async fn predict(&self, batch: &Array<f32, Ix4>) -> Result<Vec<f32>, PredictorError> {
            let index = (batch[[0, 0, 0, 0]] as usize) % CLASS_NAMES.len();
            let mut scores = vec![0.0; CLASS_NAMES.len()];
            scores[index] = 1.0;
            Ok(scores)
        }
    }

    struct UnreachablePredictor;

    #[async_trait]
    impl Predictor for UnreachablePredictor {
        async fn predict(&self, _batch: &Array<f32, Ix4>) -> Result<Vec<f32>, PredictorError> {
            Err(PredictorError::MalformedResponse)
        }
    }

    fn test_router(predictor: Arc<dyn Predictor>) -> Router {
        api_routes().with_state(SharedState { predictor })
    }

    fn healthy_scores() -> Vec<f32> {
        let mut scores = vec![0.0; 10];
        scores[0] = 0.01;
        scores[9] = 0.97;
        scores
    }

    fn png_fixture() -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(64, 48, Rgb([120, 200, 40]));
        let mut image_data: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut image_data), image::ImageFormat::Png)
            .unwrap();
        image_data
    }

    fn multipart_request(uri: &str, field_name: &str, payload: &[u8]) -> Request<Body> {
        let boundary = "leaf-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"leaf.png\"\r\n",
                field_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn response_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_predict_returns_argmax_label_and_raw_confidence() {
        let app = test_router(Arc::new(MockPredictor {
            scores: healthy_scores(),
        }));

        let response = app
            .oneshot(multipart_request("/predict", "file", &png_fixture()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["class"], "Tomato_healthy");
        assert!((json["confidence"].as_f64().unwrap() - 0.97).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_predict_is_served_under_both_paths() {
        for uri in ["/predict", "/api/predict"] {
            let app = test_router(Arc::new(MockPredictor {
                scores: healthy_scores(),
            }));

            let response = app
                .oneshot(multipart_request(uri, "file", &png_fixture()))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_rejects_bytes_that_are_not_an_image() {
        let app = test_router(Arc::new(MockPredictor {
            scores: healthy_scores(),
        }));

        let response = app
            .oneshot(multipart_request("/predict", "file", b"not an image"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = response_json(response).await;
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_rejects_upload_without_file_field() {
        let app = test_router(Arc::new(MockPredictor {
            scores: healthy_scores(),
        }));

        let response = app
            .oneshot(multipart_request("/predict", "attachment", &png_fixture()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_maps_remote_failure_to_bad_gateway() {
        let app = test_router(Arc::new(UnreachablePredictor));

        let response = app
            .oneshot(multipart_request("/predict", "file", &png_fixture()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = response_json(response).await;
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_concurrent_uploads_get_independent_predictions() {
        let app = test_router(Arc::new(EchoPredictor));

        let mut handles = Vec::new();
        for i in 0..10u8 {
            let app = app.clone();
            handles.push(tokio::spawn(async move {
                let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(8, 8, Rgb([i, 0, 0]));
                let mut image_data: Vec<u8> = Vec::new();
                img.write_to(&mut Cursor::new(&mut image_data), image::ImageFormat::Png)
                    .unwrap();

                let response = app
                    .oneshot(multipart_request("/predict", "file", &image_data))
                    .await
                    .unwrap();
                assert_eq!(response.status(), StatusCode::OK);

                let json = response_json(response).await;
                (i, json["class"].as_str().unwrap().to_string())
            }));
        }

        for handle in handles {
            let (i, class) = handle.await.unwrap();
            assert_eq!(class, CLASS_NAMES[i as usize]);
        }
    }

    #[test]
    fn test_classify_takes_first_index_on_ties() {
        let mut scores = vec![0.1; 10];
        scores[2] = 0.5;
        scores[7] = 0.5;

        let response = classify(&scores).unwrap();

        assert_eq!(response.class, CLASS_NAMES[2]);
        assert_eq!(response.confidence, 0.5);
    }

    #[test]
    fn test_classify_rejects_wrong_score_count() {
        let result = classify(&[0.5, 0.5]);

        assert!(matches!(
            result,
            Err(PredictorError::ScoreShape {
                got: 2,
                expected: 10
            })
        ));
    }
}
