//! Accepts incoming connections, allocates a transcription session per
//! connection, and assigns each one a monotonically increasing identifier.

use crate::config::{Args, SessionParams};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use whisper_rs::{WhisperContext, WhisperContextParameters};

pub async fn run(args: Args) -> Result<()> {
    info!(model = %args.model, "loading recognizer model");
    let ctx = load_engine_context(&args)?;

    // `--host` is informational only; bind is by port.
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr).await.context("failed to bind")?;
    info!(%addr, host = %args.host, "listening");

    let next_user_id = Arc::new(AtomicU64::new(1));

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "accept failed");
                continue;
            }
        };

        let user_id = next_user_id.fetch_add(1, Ordering::Relaxed);
        info!(%peer_addr, user_id, "connection accepted");

        let ctx = ctx.clone();
        let params = SessionParams::default();
        tokio::spawn(async move {
            if let Err(e) =
                crate::connection::handle_connection(stream, user_id, ctx, params).await
            {
                error!(user_id, error = %e, "connection error");
            }
        });
    }
}

fn load_engine_context(args: &Args) -> Result<Arc<WhisperContext>> {
    let mut params = WhisperContextParameters::default();
    params.use_gpu(!args.no_gpu);
    let ctx = WhisperContext::new_with_params(&args.model, params)
        .context("failed to load recognizer model")?;
    Ok(Arc::new(ctx))
}
