use crate::{config::Settings, predictor::Predictor, routes::api_routes};
use axum::{extract::DefaultBodyLimit, http::HeaderValue, Router};
use std::{future::Future, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

#[derive(Clone)]
pub struct SharedState {
    pub predictor: Arc<dyn Predictor>,
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(predictor: Arc<dyn Predictor>, config: &Settings) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let app_state = SharedState { predictor };

        let mut router = Router::new()
            .merge(api_routes())
            .with_state(app_state)
            .layer(DefaultBodyLimit::max(config.server.max_upload_bytes))
            .layer(cors_layer(&config.cors.allowed_origins)?)
            .layer(TraceLayer::new_for_http());

        if let Some(frontend) = &config.frontend {
            let index = frontend.dist_dir.join("index.html");
            let assets = ServeDir::new(&frontend.dist_dir).not_found_service(ServeFile::new(index));
            router = router.fallback_service(assets);
            tracing::info!("Serving frontend assets from {:?}", frontend.dist_dir);
        }

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

// Credentialed CORS forbids wildcards, so the configured origins are listed
// and methods/headers mirror the request.
fn cors_layer(allowed_origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = allowed_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}
