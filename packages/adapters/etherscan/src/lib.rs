mod client;
mod error;

pub use client::{DEFAULT_GAS_ORACLE_URL, EtherscanGasOracle};
pub use error::{Error, Result};
