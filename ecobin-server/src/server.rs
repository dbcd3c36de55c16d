use std::net::SocketAddr;

use axum_server::Handle;
use tracing::{error, info};

use ecobin_core::Error;
use ecobin_core::web::build_router;

use crate::Args;
use crate::context::ServerContext;

pub async fn run_server(args: Args) -> Result<(), Error> {
    let ctx = ServerContext::build(&args).await?;
    let app = build_router(ctx.service.clone());

    let addr: SocketAddr = args
        .bind_addr
        .parse()
        .map_err(|e| Error::Config(format!("invalid bind address '{}': {}", args.bind_addr, e)))?;

    let handle = Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
            return;
        }
        info!("Ctrl-C detected, draining in-flight requests...");
        shutdown_handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
    });

    info!("EcoBin API listening on http://{}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    info!("HTTP server shut down.");
    Ok(())
}
