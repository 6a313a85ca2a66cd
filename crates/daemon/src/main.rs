#![forbid(unsafe_code)]

//! `regressd`: newline-delimited JSON command loop over the regression store.

mod config;
mod logging;
mod ops;
mod support;

use crate::config::{Cli, Config};
use crate::ops::OpContext;
use crate::support::{Args, op_error, response_error, response_ok};
use clap::Parser;
use rg_channel::{ControlChannel, FanoutHub, GroupMessage, SharedStore};
use rg_storage::SqliteStore;
use serde_json::Value;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, broadcast, mpsc};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init();

    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "configuration rejected");
            return ExitCode::from(2);
        }
    };
    let store = match SqliteStore::open(&config.storage_dir) {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(error = %err, dir = %config.storage_dir.display(), "cannot open store");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(dir = %config.storage_dir.display(), "store opened");
    let store: SharedStore = Arc::new(Mutex::new(store));
    let fanout = FanoutHub::new(config.fanout_capacity);

    let channel = match config.task_manager.clone() {
        Some(channel_config) => {
            tracing::info!(url = %channel_config.url, "starting control channel");
            Some(ControlChannel::spawn(
                channel_config,
                Arc::clone(&store),
                fanout.clone(),
            ))
        }
        None => {
            tracing::info!("task manager disabled; notifications stay queued");
            None
        }
    };

    let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_lines(out_rx));
    let forwarder = tokio::spawn(forward_fanout(fanout.subscribe(), out_tx.clone()));

    let served = serve(&store, channel.as_ref(), &out_tx).await;

    if let Some(channel) = &channel {
        channel.shutdown().await;
    }
    forwarder.abort();
    let _ = forwarder.await;
    drop(out_tx);
    if let Err(err) = writer.await {
        tracing::error!(error = %err, "stdout writer failed");
    }

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "stdin read failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve(
    store: &SharedStore,
    channel: Option<&ControlChannel>,
    out: &mpsc::UnboundedSender<String>,
) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(store, channel, &line).await;
        if out.send(response.to_string()).is_err() {
            break;
        }
    }
    tracing::debug!("stdin closed");
    Ok(())
}

async fn handle_line(store: &SharedStore, channel: Option<&ControlChannel>, line: &str) -> Value {
    let request = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(request)) => request,
        Ok(_) => {
            return response_error(
                &Value::Null,
                None,
                op_error("INVALID_INPUT", "request must be a JSON object"),
            );
        }
        Err(err) => {
            return response_error(
                &Value::Null,
                None,
                op_error("INVALID_INPUT", &format!("invalid JSON: {err}")),
            );
        }
    };
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let Some(op) = request.get("op").and_then(Value::as_str) else {
        return response_error(&id, None, op_error("INVALID_INPUT", "op is required"));
    };
    let args = match request.get("args") {
        None | Some(Value::Null) => Args::new(),
        Some(Value::Object(args)) => args.clone(),
        Some(_) => {
            return response_error(
                &id,
                Some(op),
                op_error("INVALID_INPUT", "args must be an object"),
            );
        }
    };

    tracing::debug!(op, "request");
    let result = {
        let mut guard = store.lock().await;
        let mut ctx = OpContext {
            store: &mut *guard,
            channel,
        };
        ops::dispatch(&mut ctx, op, &args)
    };

    match result {
        Ok(result) => {
            if let Some(channel) = channel
                && ops::find(op).is_some_and(|spec| spec.wakes_outbox)
            {
                channel.outbox_ready();
            }
            response_ok(&id, op, result)
        }
        Err(error) => {
            tracing::debug!(op, error = %error, "request failed");
            response_error(&id, Some(op), error)
        }
    }
}

/// Relay fan-out messages to stdout as notification lines.
async fn forward_fanout(
    mut rx: broadcast::Receiver<GroupMessage>,
    out: mpsc::UnboundedSender<String>,
) {
    loop {
        match rx.recv().await {
            Ok(message) => match serde_json::to_string(&message) {
                Ok(line) => {
                    if out.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => tracing::warn!(error = %err, "cannot encode fan-out message"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "fan-out forwarder lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn write_lines(mut rx: mpsc::UnboundedReceiver<String>) {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = rx.recv().await {
        let written = async {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await
        }
        .await;
        if let Err(err) = written {
            tracing::error!(error = %err, "cannot write to stdout");
            break;
        }
    }
}
