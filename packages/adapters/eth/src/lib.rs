mod client;
mod error;
mod manager;

pub use client::HttpClient;
pub use error::{Error, Result};
pub use manager::ExecutionClientManager;
