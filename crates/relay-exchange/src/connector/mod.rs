//! 거래소 커넥터.

pub mod bybit;

pub use bybit::{BybitClient, BybitClientFactory, BybitConfig};
