// src/connectors/mod.rs
pub mod coinapi;
pub mod hyperliquid;
pub mod messages;
