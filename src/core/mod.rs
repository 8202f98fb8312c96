// src/core/mod.rs
pub mod backfill;
pub mod dispatcher;
pub mod heartbeat;
pub mod listener;
pub mod supervisor;
