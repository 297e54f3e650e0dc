use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tracing::{info, warn};

use bomlink_api as api;
use bomlink_api::mailer::{DisabledMailer, HttpMailer, Mailer};
use bomlink_api::ocr::{DisabledOcrClient, OcrClient, ReadApiOcrClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db = Arc::new(api::db::establish_connection_from_app_config(&cfg).await?);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // External collaborators: OCR read API and mail delivery
    let ocr: Arc<dyn OcrClient> = match (cfg.ocr_endpoint.clone(), cfg.ocr_api_key.clone()) {
        (Some(endpoint), Some(api_key)) => Arc::new(ReadApiOcrClient::new(
            endpoint,
            api_key,
            Duration::from_millis(cfg.ocr_poll_interval_ms),
            cfg.ocr_poll_attempts,
        )),
        _ => {
            warn!("OCR not configured; image/PDF imports will be rejected");
            Arc::new(DisabledOcrClient)
        }
    };
    let mailer: Arc<dyn Mailer> = match (cfg.mail_api_url.clone(), cfg.mail_api_key.clone()) {
        (Some(api_url), Some(api_key)) => Arc::new(HttpMailer::new(api_url, api_key)),
        _ => {
            warn!("Mail delivery not configured; RFQ sends will be rejected");
            Arc::new(DisabledMailer)
        }
    };

    // Aggregate app services used by HTTP handlers
    let services = api::services::AppServices::new(
        db.clone(),
        event_sender.clone(),
        ocr,
        mailer,
        cfg.mail_from.clone(),
    );

    let state = Arc::new(api::AppState {
        db,
        config: cfg.clone(),
        event_sender,
        services,
    });

    let app = api::app_router(state);
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
