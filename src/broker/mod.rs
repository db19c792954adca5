//! Broker integration.
//!
//! Defines the `Broker` trait and the Alpaca REST implementation.

pub mod alpaca;

use async_trait::async_trait;

use crate::types::{AccountState, BrokerError, OrderReceipt, OrderRequest, Position};

/// Abstraction over a brokerage account.
///
/// `get_position` must report a missing position as
/// `BrokerError::NotFound`, distinct from every other failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    /// Current equity and buying power.
    async fn get_account(&self) -> Result<AccountState, BrokerError>;

    /// Submit an order.
    async fn create_order(&self, order: &OrderRequest) -> Result<OrderReceipt, BrokerError>;

    /// Open position in `symbol`.
    async fn get_position(&self, symbol: &str) -> Result<Position, BrokerError>;

    /// Liquidate the entire position in `symbol`.
    async fn close_position(&self, symbol: &str) -> Result<OrderReceipt, BrokerError>;
}
