pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {infra::notify_hub::BroadcastHub, services::Engine};

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub hub: BroadcastHub,
}
