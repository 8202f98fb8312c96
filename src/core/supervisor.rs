// src/core/supervisor.rs
use crate::core::listener::{ChannelListener, ListenerSettings};
use crate::storage::{PersistenceAdapter, StoreConnector};
use crate::types::{ChannelKind, ConnectionState};
use crate::utils::backoff::Backoff;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Owns one supervised listener per channel. Listeners share nothing but the
/// connector and the cancellation token.
pub struct Supervisor {
    cancel: CancellationToken,
    tasks: Vec<(ChannelKind, JoinHandle<()>)>,
    states: HashMap<ChannelKind, watch::Receiver<ConnectionState>>,
}

impl Supervisor {
    pub fn start(settings: ListenerSettings, connector: Arc<dyn StoreConnector>) -> Self {
        Self::start_channels(&ChannelKind::ALL, settings, connector)
    }

    pub fn start_channels(
        channels: &[ChannelKind],
        settings: ListenerSettings,
        connector: Arc<dyn StoreConnector>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let settings = Arc::new(settings);
        let mut tasks = Vec::with_capacity(channels.len());
        let mut states = HashMap::with_capacity(channels.len());

        for &channel in channels {
            let (tx, rx) = watch::channel(ConnectionState::Disconnected);
            let handle = tokio::spawn(supervise(
                channel,
                settings.clone(),
                connector.clone(),
                Arc::new(tx),
                cancel.clone(),
            ));
            tasks.push((channel, handle));
            states.insert(channel, rx);
        }

        info!(
            channels = tasks.len(),
            store = %connector.describe(),
            "supervisor started"
        );
        Self {
            cancel,
            tasks,
            states,
        }
    }

    /// `None` for a channel this supervisor was not started with.
    pub fn state(&self, channel: ChannelKind) -> Option<ConnectionState> {
        self.states.get(&channel).map(|rx| *rx.borrow())
    }

    #[cfg(test)]
    pub fn watch(&self, channel: ChannelKind) -> Option<watch::Receiver<ConnectionState>> {
        self.states.get(&channel).cloned()
    }

    /// Cancels every listener and waits for each to release its connection.
    pub async fn stop(self) {
        for (channel, _) in &self.tasks {
            info!(%channel, state = ?self.state(*channel), "stopping listener");
        }
        self.cancel.cancel();
        for (channel, handle) in self.tasks {
            if let Err(e) = handle.await {
                error!(%channel, error = %e, "supervised task ended abnormally");
            }
        }
        info!("supervisor stopped");
    }
}

/// Restarts the listener if it panics. A normal return means it was cancelled.
async fn supervise(
    channel: ChannelKind,
    settings: Arc<ListenerSettings>,
    connector: Arc<dyn StoreConnector>,
    state: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new(settings.reconnect_base, settings.reconnect_max);

    loop {
        let listener = ChannelListener::new(
            channel,
            settings.clone(),
            PersistenceAdapter::new(connector.clone()),
            state.clone(),
        );
        let outcome = tokio::spawn(listener.run(cancel.clone())).await;

        match outcome {
            Ok(()) => break,
            Err(e) if e.is_panic() => {
                state.send_replace(ConnectionState::Faulted);
                error!(%channel, error = %e, "listener panicked, restarting");
            }
            Err(e) => {
                warn!(%channel, error = %e, "listener task cancelled");
                break;
            }
        }

        let delay = backoff.next_delay();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    state.send_replace(ConnectionState::Disconnected);
}
