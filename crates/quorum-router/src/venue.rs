//! Venue client seam.
//!
//! The exchange connectivity layer is an external collaborator; the
//! router only sees this trait. One client per venue.

use crate::error::RouterResult;
use async_trait::async_trait;
use quorum_core::{OrderId, OrderSide, Price, Size, Symbol, VenueId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-of-book quote with the depth available at that price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueQuote {
    pub venue: VenueId,
    pub price: Price,
    pub depth: Size,
    /// Taker fee, percent of notional.
    pub fee_pct: Decimal,
}

impl VenueQuote {
    /// Price adjusted for the venue fee: what a taker actually pays
    /// (buy) or receives (sell) per unit.
    pub fn effective_price(&self, side: OrderSide) -> Decimal {
        let fee = self.fee_pct / Decimal::ONE_HUNDRED;
        match side {
            OrderSide::Buy => self.price.inner() * (Decimal::ONE + fee),
            OrderSide::Sell => self.price.inner() * (Decimal::ONE - fee),
        }
    }
}

/// Result of submitting one child order to a venue.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueFill {
    pub order_id: OrderId,
    pub price: Price,
    pub quantity: Size,
    /// Fee charged, in quote currency.
    pub fee: Decimal,
}

/// One exchange connection.
///
/// Every call carries a bounded timeout at the call site; a timeout is a
/// definite failure for that call, never an unknown.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VenueClient: Send + Sync {
    fn venue_id(&self) -> VenueId;

    /// Fetch the current quote and depth for a symbol and side.
    async fn quote(&self, symbol: &Symbol, side: OrderSide) -> RouterResult<VenueQuote>;

    /// Submit a child order; resolves when the venue confirms or rejects.
    async fn submit(
        &self,
        order_id: &OrderId,
        symbol: &Symbol,
        side: OrderSide,
        price: Price,
        quantity: Size,
    ) -> RouterResult<VenueFill>;

    /// Best-effort cancel. Idempotent on the venue side.
    async fn cancel(&self, order_id: &OrderId) -> RouterResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_effective_price_includes_fee() {
        let quote = VenueQuote {
            venue: VenueId::from("binance"),
            price: Price::new(dec!(100)),
            depth: Size::new(dec!(5)),
            fee_pct: dec!(0.1),
        };
        assert_eq!(quote.effective_price(OrderSide::Buy), dec!(100.1));
        assert_eq!(quote.effective_price(OrderSide::Sell), dec!(99.9));
    }
}
