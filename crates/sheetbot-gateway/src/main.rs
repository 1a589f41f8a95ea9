//! Sheetbot gateway: loads config, wires the spreadsheet and LLM clients into the
//! command processor, optionally registers the Telegram webhook, then serves HTTP.

mod logging;
mod routes;
mod telegram;

use std::sync::Arc;

use sheetbot_core::{
    AppConfig, CommandProcessor, GoogleSheetsClient, OpenAiClient, SessionStore, SheetService,
};

use crate::routes::AppState;
use crate::telegram::TelegramClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;
    let _log_guard = logging::init(config.log_dir.as_deref())?;
    tracing::info!(version = sheetbot_core::version(), "sheetbot starting");

    let sheets = Arc::new(GoogleSheetsClient::from_config(&config.sheets)?);
    let llm = Arc::new(OpenAiClient::from_config(&config.llm)?);
    let service = SheetService::new(
        sheets,
        config.templates.clone(),
        config.builder.clone(),
        config.retry,
    );
    let processor = CommandProcessor::new(
        llm.clone(),
        llm,
        service,
        SessionStore::new(config.chat.max_history),
    );

    let (telegram, webhook_secret) = match &config.telegram {
        Some(tg) => {
            let client = Arc::new(TelegramClient::new(&tg.api_base, &tg.bot_token)?);
            if let Some(base) = &tg.webhook_url {
                let url = format!("{}/webhook", base.trim_end_matches('/'));
                if let Err(e) = client.set_webhook(&url, tg.webhook_secret.as_deref()).await {
                    tracing::error!(url = %url, error = %e, "webhook registration failed");
                }
            }
            (Some(client), tg.webhook_secret.clone())
        }
        None => {
            tracing::warn!("telegram not configured; /webhook will refuse updates");
            (None, None)
        }
    };

    let app = routes::router(AppState {
        processor: Arc::new(processor),
        telegram,
        webhook_secret,
    });

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!(addr = %config.server.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
