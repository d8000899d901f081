use flume::{Receiver, Sender};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use tracing::{debug, info};

use crate::error::{Error, ErrorKind, Result};
use crate::node::Node;

/// Drives a [`Node`] until `cancellation` fires or `inbound` closes.
///
/// The node ticks every [`Node::tick_period`]. Each text received on
/// `inbound` is processed as a command envelope. After every event, the
/// queued messages are serialized to JSON and sent on `outbound`.
///
/// # Errors
///
/// An error is returned when a message cannot be serialized or when
/// `outbound` is closed.
pub async fn run(
    mut node: Node,
    inbound: Receiver<String>,
    outbound: Sender<String>,
    cancellation: CancellationToken,
) -> Result<()> {
    let mut interval = tokio::time::interval(node.tick_period());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancellation.cancelled() => {
                info!("Runner cancelled");
                break;
            }
            _ = interval.tick() => node.tick(),
            text = inbound.recv_async() => {
                let Ok(text) = text else {
                    info!("Inbound channel closed");
                    break;
                };
                debug!("Received: {text}");
                node.handle_text(&text);
            }
        }

        forward(&node, &outbound).await?;
    }

    Ok(())
}

async fn forward(node: &Node, outbound: &Sender<String>) -> Result<()> {
    for message in node.drain_messages() {
        let text = serde_json::to_string(&message)?;
        outbound
            .send_async(text)
            .await
            .map_err(|_| Error::new(ErrorKind::Network, "Outbound channel closed"))?;
    }
    Ok(())
}
