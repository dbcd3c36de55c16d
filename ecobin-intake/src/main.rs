use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use ecobin_intake::capture::CommandFrameSource;
use ecobin_intake::classifier::CommandClassifier;
use ecobin_intake::config::IntakeArgs;
use ecobin_intake::fallback::resolver_for;
use ecobin_intake::reward_client::HttpRewardClient;
use ecobin_intake::trigger::{SerialTriggerChannel, run_trigger_reader};
use ecobin_intake::{IntakeAgent, LogSink};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ecobin_intake=info"));
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = IntakeArgs::parse();

    let trigger = args.trigger_config();
    let retry = args.retry_policy();
    info!(
        "EcoBin intake starting. port={}, api_url={}, fallback={:?}, overflow={:?}",
        trigger.port, args.api_url, args.fallback, args.overflow
    );

    let capture_timeout = Duration::from_millis(args.capture_timeout_ms);
    let frames = Arc::new(CommandFrameSource::new(&args.capture_command, capture_timeout)?);
    let classifier = Arc::new(CommandClassifier::new(&args.classifier_command, capture_timeout)?);
    let resolver = resolver_for(args.fallback, Duration::from_secs(args.prompt_timeout_secs))?;
    let client = Arc::new(HttpRewardClient::new(args.api_url.clone(), args.api_token.clone(), retry)?);

    let agent = IntakeAgent::new(frames, classifier, resolver, client, Arc::new(LogSink))
        .with_overflow(args.overflow)
        .with_cooldown(Duration::from_millis(args.cooldown_ms));

    let (tx, rx) = mpsc::channel(args.overflow.channel_capacity());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
            return;
        }
        info!("Ctrl-C detected, finishing current cycle...");
        let _ = shutdown_tx.send(true);
    });

    let reconnect_delay = trigger.reconnect_delay;
    let reader = tokio::spawn(run_trigger_reader(
        Arc::new(SerialTriggerChannel::new(trigger)),
        tx,
        reconnect_delay,
        shutdown_rx.clone(),
    ));

    agent.run(rx, shutdown_rx).await;
    if let Err(e) = reader.await {
        error!("Trigger reader task failed: {:?}", e);
    }

    info!("Main finished. Goodbye!");
    Ok(())
}
