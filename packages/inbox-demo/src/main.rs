// Demo entry point: loads the inbox through a watched store, then polls

use std::sync::Arc;

use anyhow::{Context, Result};
use inbox_demo::{inbox, Config, InboxApp, InboxView, MockInboxApi, PollingClient};
use stethoscope::{ListenInfo, Target, Watcher};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,inbox_demo=debug,stethoscope=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(?config, "Configuration loaded");

    let watcher = Watcher::builder()
        .name("inbox-demo")
        .config(config.watcher)
        .build()?;
    let api = Arc::new(MockInboxApi::with_latency(config.api_latency));
    let app = InboxApp::new(api, Vec::new(), Some(watcher.interceptor()));
    let view = InboxView::attach(app.store());

    watcher
        .listen_async(
            ListenInfo::new(|| async {
                app.request_messages();
                Ok(())
            })
            .target(Target::new(inbox::REQUEST_MESSAGES).on_matched({
                let view = view.clone();
                move || {
                    println!("{}", view.lines().join("\n"));
                    Ok(())
                }
            }))
            .target(Target::new(inbox::RECEIVE_MESSAGES)),
        )
        .await
        .context("Initial load did not settle")?;
    println!("{}", view.lines().join("\n"));

    tracing::info!(interval_ms = config.polling_interval.as_millis() as u64, "Starting polling");
    let polling = PollingClient::with_interval(app.clone(), config.polling_interval).start();
    tokio::time::sleep(config.run_for).await;
    polling.stop();

    println!("{}", view.lines().join("\n"));
    Ok(())
}
