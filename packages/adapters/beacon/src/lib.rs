mod client;
mod error;
mod manager;

pub use client::BeaconHttpClient;
pub use error::{Error, Result};
pub use manager::BeaconClientManager;
