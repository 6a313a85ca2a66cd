#![forbid(unsafe_code)]

use crate::client::{ChannelConfig, SharedStore, Shared};
use crate::fanout::FanoutHub;
use crate::inbound::handle_start;
use crate::wire::OutboundMessage;
use futures::{SinkExt, StreamExt};
use rg_storage::StoreError;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("websocket: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}

pub(crate) enum SessionEnd {
    Shutdown,
    Closed,
}

pub(crate) struct SessionContext<'a> {
    pub(crate) config: &'a ChannelConfig,
    pub(crate) store: &'a SharedStore,
    pub(crate) fanout: &'a FanoutHub,
    pub(crate) shared: &'a Shared,
}

/// Drive one connection until it drops or shutdown is requested.
pub(crate) async fn run_session(
    socket: Socket,
    context: &SessionContext<'_>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd, SessionError> {
    let (mut sink, mut stream) = socket.split();
    let mut poll = tokio::time::interval(context.config.outbox_poll);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if let Err(err) = sink.send(Message::Close(None)).await {
                    tracing::debug!(error = %err, "close frame not sent");
                }
                return Ok(SessionEnd::Shutdown);
            }
            _ = context.shared.wake.notified() => {
                drain_outbox(&mut sink, context).await?;
            }
            _ = poll.tick() => {
                drain_outbox(&mut sink, context).await?;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => on_text(context, &text).await,
                Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Closed),
                // Pings are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
            },
        }
    }
}

async fn on_text(context: &SessionContext<'_>, text: &str) {
    match handle_start(context.store, context.fanout, text).await {
        Ok(Some(_)) => {
            context.shared.status.send_modify(|status| status.started += 1);
        }
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(error = %err, frame = %text, "dropping inbound frame");
        }
    }
}

/// Send every undelivered outbox row in sequence order. A row is marked sent
/// only once its frame was written.
async fn drain_outbox<S>(sink: &mut S, context: &SessionContext<'_>) -> Result<u64, SessionError>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let batch_size = context.config.outbox_batch.max(1);
    let mut delivered = 0u64;
    loop {
        let batch = {
            let store = context.store.lock().await;
            store.outbox_pending(batch_size)?
        };
        let full = batch.len() >= batch_size;
        if batch.is_empty() {
            break;
        }
        for row in batch {
            let text = OutboundMessage::from(&row).encode()?;
            sink.send(Message::Text(text)).await?;
            {
                let mut store = context.store.lock().await;
                store.outbox_mark_sent(row.seq)?;
            }
            delivered += 1;
            tracing::debug!(
                seq = row.seq,
                action = row.action.as_str(),
                trial_id = row.trial_id,
                "sent notification"
            );
        }
        if !full {
            break;
        }
    }
    if delivered > 0 {
        context
            .shared
            .status
            .send_modify(|status| status.delivered += delivered);
        tracing::info!(delivered, "outbox drained");
        let pruned = {
            let mut store = context.store.lock().await;
            store.outbox_prune_sent(context.config.outbox_retention)
        };
        if let Err(err) = pruned {
            tracing::warn!(error = %err, "cannot prune delivered notifications");
        }
    }
    Ok(delivered)
}
