mod client;
mod config;
mod error;
mod state;
mod subscription;

pub use client::WaveClient;
pub use config::{
    ClientConfig, DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_CONTRACT_ADDRESS, DEFAULT_COOLDOWN_HINT,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use error::{ErrorKind, WaveError};
pub use state::ClientEvent;
pub use subscription::SubscriptionHandle;
