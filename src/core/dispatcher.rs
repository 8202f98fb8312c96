// src/core/dispatcher.rs
use crate::connectors::messages::ParsedMessage;
use crate::storage::PersistenceAdapter;
use crate::types::ChannelKind;
use tracing::{debug, error, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub stored: usize,
    pub dropped: usize,
}

/// Routes decoded records to the store, one upsert per record. A record the
/// store refuses is logged with its key and dropped.
pub struct Dispatcher {
    channel: ChannelKind,
    adapter: PersistenceAdapter,
}

impl Dispatcher {
    pub fn new(channel: ChannelKind, adapter: PersistenceAdapter) -> Self {
        Self { channel, adapter }
    }

    pub async fn dispatch(&mut self, message: ParsedMessage) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        match message {
            ParsedMessage::Trades(trades) => {
                for trade in &trades {
                    match self.adapter.upsert_trade(trade).await {
                        Ok(()) => {
                            outcome.stored += 1;
                            debug!(channel = %self.channel, tid = trade.tid, coin = %trade.coin, time = trade.time, "trade stored");
                        }
                        Err(e) => {
                            outcome.dropped += 1;
                            warn!(
                                channel = %self.channel,
                                tid = trade.tid,
                                coin = %trade.coin,
                                time = trade.time,
                                error = %e,
                                "dropping trade"
                            );
                        }
                    }
                }
            }
            ParsedMessage::Candles(candles) => {
                for candle in &candles {
                    match self.adapter.upsert_candle(candle).await {
                        Ok(()) => {
                            outcome.stored += 1;
                            debug!(channel = %self.channel, t = candle.t, s = %candle.s, i = %candle.i, "candle stored");
                        }
                        Err(e) => {
                            outcome.dropped += 1;
                            warn!(
                                channel = %self.channel,
                                t = candle.t,
                                s = %candle.s,
                                i = %candle.i,
                                error = %e,
                                "dropping candle"
                            );
                        }
                    }
                }
            }
            ParsedMessage::Control(_) | ParsedMessage::VenueError(_) => {}
        }

        outcome
    }

    /// Opens the store connection ahead of the first record. On failure the
    /// first write opens it instead.
    pub async fn prepare(&mut self) {
        if let Err(e) = self.adapter.connect().await {
            error!(channel = %self.channel, error = %e, "store unavailable at startup");
        }
    }

    /// Releases the store connection.
    pub async fn shutdown(&mut self) {
        if self.adapter.is_connected() {
            debug!(channel = %self.channel, "releasing store connection");
        }
        self.adapter.disconnect().await;
    }
}
