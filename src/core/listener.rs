// src/core/listener.rs
use crate::config::VenueConfig;
use crate::connectors::messages::{
    decode, encode_ping, encode_subscribe, Control, ParsedMessage, Subscription, PONG_TEXT,
};
use crate::core::dispatcher::Dispatcher;
use crate::core::heartbeat::HeartbeatMonitor;
use crate::error::TransportError;
use crate::storage::PersistenceAdapter;
use crate::types::{ChannelKind, ConnectionState};
use crate::utils::backoff::Backoff;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

type VenueStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub ws_url: String,
    pub symbol: String,
    pub candle_interval: String,
    pub heartbeat_interval: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl ListenerSettings {
    pub fn from_venue(venue: &VenueConfig) -> Self {
        Self {
            ws_url: venue.ws_url.clone(),
            symbol: venue.symbol.clone(),
            candle_interval: venue.candle_interval.clone(),
            heartbeat_interval: venue.heartbeat_interval(),
            reconnect_base: Duration::from_millis(venue.reconnect_base_ms),
            reconnect_max: Duration::from_millis(venue.reconnect_max_ms),
        }
    }

    pub fn subscription(&self, channel: ChannelKind) -> Subscription {
        Subscription::for_channel(channel, &self.symbol, Some(&self.candle_interval))
    }
}

enum LoopEvent {
    Cancelled,
    Frame(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
    HeartbeatDue,
}

/// One venue connection for one channel:
/// `Disconnected -> Connecting -> Subscribed -> Faulted -> Connecting ...`
/// until cancelled.
pub struct ChannelListener {
    subscription: Subscription,
    settings: Arc<ListenerSettings>,
    dispatcher: Dispatcher,
    backoff: Backoff,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl ChannelListener {
    pub fn new(
        channel: ChannelKind,
        settings: Arc<ListenerSettings>,
        adapter: PersistenceAdapter,
        state: Arc<watch::Sender<ConnectionState>>,
    ) -> Self {
        let backoff = Backoff::new(settings.reconnect_base, settings.reconnect_max);
        Self {
            subscription: settings.subscription(channel),
            dispatcher: Dispatcher::new(channel, adapter),
            settings,
            backoff,
            state,
        }
    }

    pub fn channel(&self) -> ChannelKind {
        self.subscription.channel()
    }

    /// Runs until `cancel` fires. Transport failures never end the loop; they
    /// fault the connection and schedule a reconnect with backoff.
    pub async fn run(mut self, cancel: CancellationToken) {
        let channel = self.channel();
        info!(%channel, url = %self.settings.ws_url, "listener starting");
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = self.dispatcher.prepare() => {}
        }

        while !cancel.is_cancelled() {
            match self.run_session(&cancel).await {
                Ok(()) => break,
                Err(e) => {
                    self.set_state(ConnectionState::Faulted);
                    warn!(%channel, error = %e, "connection faulted");
                }
            }

            let delay = self.backoff.next_delay();
            warn!(
                %channel,
                attempt = self.backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "reconnect scheduled"
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.dispatcher.shutdown().await;
        self.set_state(ConnectionState::Disconnected);
        info!(%channel, "listener stopped");
    }

    /// `Ok(())` only on cancellation.
    async fn run_session(&mut self, cancel: &CancellationToken) -> Result<(), TransportError> {
        self.set_state(ConnectionState::Connecting);

        let connected = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = connect_async(self.settings.ws_url.as_str()) => result,
        };
        let (mut ws, _) = connected?;

        let frame = encode_subscribe(&self.subscription);
        debug!(channel = %self.channel(), %frame, "subscribing");
        ws.send(Message::Text(frame)).await?;

        self.receive_loop(&mut ws, cancel).await
    }

    async fn receive_loop(
        &mut self,
        ws: &mut VenueStream,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let mut heartbeat = HeartbeatMonitor::new(self.settings.heartbeat_interval, Instant::now());

        loop {
            let deadline = heartbeat.next_deadline();
            let event = tokio::select! {
                _ = cancel.cancelled() => LoopEvent::Cancelled,
                frame = ws.next() => LoopEvent::Frame(frame),
                _ = tokio::time::sleep_until(deadline) => LoopEvent::HeartbeatDue,
            };

            match event {
                LoopEvent::Cancelled => {
                    if let Err(e) = ws.close(None).await {
                        debug!(channel = %self.channel(), error = %e, "close handshake failed");
                    }
                    return Ok(());
                }
                LoopEvent::Frame(None) => return Err(TransportError::Closed),
                LoopEvent::Frame(Some(frame)) => {
                    heartbeat.on_frame_received(Instant::now());
                    self.handle_message(frame?, ws).await?;
                }
                LoopEvent::HeartbeatDue => {}
            }

            let now = Instant::now();
            if heartbeat.is_stale(now) {
                return Err(TransportError::HeartbeatTimeout(heartbeat.idle_for(now)));
            }
            if heartbeat.tick(now) {
                trace!(channel = %self.channel(), "sending keep-alive ping");
                ws.send(Message::Text(encode_ping())).await?;
            }
        }
    }

    async fn handle_message(
        &mut self,
        message: Message,
        ws: &mut VenueStream,
    ) -> Result<(), TransportError> {
        let channel = self.channel();
        let payload = match message {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(bytes) => bytes,
            Message::Close(frame) => {
                info!(%channel, ?frame, "venue closed the connection");
                return Err(TransportError::Closed);
            }
            // Protocol-level pings are answered by tungstenite.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return Ok(()),
        };

        match decode(&payload) {
            Ok(ParsedMessage::Control(Control::Ping)) => {
                ws.send(Message::Text(PONG_TEXT.to_string())).await?;
            }
            Ok(ParsedMessage::Control(Control::Pong)) => trace!(%channel, "pong"),
            Ok(ParsedMessage::Control(Control::SubscriptionAck)) => {
                debug!(%channel, "subscription acknowledged")
            }
            Ok(ParsedMessage::VenueError(reason)) => {
                warn!(%channel, %reason, "venue reported an error")
            }
            Ok(message) if message.channel() == Some(channel) => {
                if *self.state.borrow() != ConnectionState::Subscribed {
                    self.set_state(ConnectionState::Subscribed);
                    self.backoff.reset();
                    info!(%channel, "subscription confirmed by first payload");
                }
                let outcome = self.dispatcher.dispatch(message).await;
                if outcome.dropped > 0 {
                    warn!(
                        %channel,
                        stored = outcome.stored,
                        dropped = outcome.dropped,
                        "records dropped"
                    );
                }
            }
            Ok(message) => {
                warn!(%channel, received = ?message.channel(), "ignoring payload for another channel")
            }
            Err(e) => warn!(%channel, error = %e, "ignoring undecodable frame"),
        }

        Ok(())
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(channel = %self.channel(), ?previous, ?next, "connection state changed");
        }
    }
}
