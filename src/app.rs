use crate::{config::Settings, predictor, server::HttpServer};
use tokio::signal;

pub async fn start_app(config: Settings) -> anyhow::Result<()> {
    let predictor = match predictor::build(&config.model) {
        Ok(predictor) => predictor,
        Err(e) => {
            tracing::error!("Failed to initialize predictor: {:?}", e);
            return Err(e);
        }
    };

    let server = HttpServer::new(predictor, &config).await?;
    server.run(shutdown_signal()).await?;

    tracing::info!("Shutdown complete.");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown.");
}
