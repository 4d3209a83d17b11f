use anyhow::anyhow;
use clap::Parser;
use tokio::sync::broadcast;
use tokio::task;

use bidding_board::api::BiddingApi;
use bidding_board::command::Command;
use bidding_board::config::CliParams;
use bidding_board::logging;
use bidding_board::realtime::{RealtimeMonitor, RealtimeWindow};
use bidding_board::session::SessionStore;
use bidding_board::tui::{AppSettings, TuiApp};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let param = CliParams::parse();
    logging::init(&param.log_file)?;
    tracing::info!(api = %param.api_base, "starting bidding board");

    let api = BiddingApi::new(&param.api_base)?;
    let (tx, mut rx) = broadcast::channel::<Command>(256);

    let hash_api = api.clone();
    let hash_tx = tx.clone();
    task::spawn(async move {
        let hash = match hash_api.fetch_password_hash().await {
            Ok(hash) => hash,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "password hash unavailable");
                None
            }
        };
        let _ = hash_tx.send(Command::PasswordHash(hash));
    });

    let window = RealtimeWindow::auction();
    let monitor_error_tx = tx.clone();
    let mut monitor = RealtimeMonitor::new(
        api.clone(),
        window,
        param.timezone,
        param.poll_interval.as_duration(),
        tx.clone(),
        tx.subscribe(),
    );
    task::spawn(async move {
        if let Err(err) = monitor.run().await {
            let _ = monitor_error_tx.send(Command::Error(format!("realtime monitor error: {err}")));
        }
    });

    let settings = AppSettings {
        timezone: param.timezone,
        initial_query: param.initial_query(),
        realtime_window: window,
        playback_interval: param.playback_interval.as_duration(),
        top_n: param.top_n(),
    };
    let mut app = TuiApp::new(
        api,
        tx.clone(),
        SessionStore::new(&param.session_file),
        settings,
    );
    let app_result = tokio::select! {
        result = app.run(&mut rx) => result,
        _ = tokio::signal::ctrl_c() => Ok(()),
    };
    let _ = tx.send(Command::Exit);
    app.dispose();
    tracing::info!("bidding board stopped");
    app_result.map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}
