//! Core signon library (session state, credential flows, providers, config).

pub mod challenge;
pub mod config;
pub mod effects;
pub mod events;
pub mod interrupt;
pub mod logging;
pub mod notify;
pub mod providers;
pub mod runtime;
pub mod session;
pub mod state;
pub mod update;
pub mod validate;
