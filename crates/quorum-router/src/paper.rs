//! In-process paper venue.
//!
//! Fills every submitted order immediately at the quoted price. Used by
//! paper mode and integration tests; quotes are seeded via `set_quote`.

use crate::error::{RouterError, RouterResult};
use crate::venue::{VenueClient, VenueFill, VenueQuote};
use async_trait::async_trait;
use parking_lot::Mutex;
use quorum_core::{OrderId, OrderSide, Price, Size, Symbol, VenueId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

pub struct PaperVenue {
    venue_id: VenueId,
    fee_pct: Decimal,
    book: Mutex<HashMap<Symbol, (Price, Size)>>,
}

impl PaperVenue {
    pub fn new(venue_id: impl Into<VenueId>, fee_pct: Decimal) -> Self {
        Self {
            venue_id: venue_id.into(),
            fee_pct,
            book: Mutex::new(HashMap::new()),
        }
    }

    /// Seed or update the top-of-book for a symbol.
    pub fn set_quote(&self, symbol: Symbol, price: Price, depth: Size) {
        self.book.lock().insert(symbol, (price, depth));
    }
}

#[async_trait]
impl VenueClient for PaperVenue {
    fn venue_id(&self) -> VenueId {
        self.venue_id.clone()
    }

    async fn quote(&self, symbol: &Symbol, _side: OrderSide) -> RouterResult<VenueQuote> {
        let book = self.book.lock();
        let (price, depth) = book.get(symbol).ok_or_else(|| RouterError::NoQuote {
            venue: self.venue_id.clone(),
        })?;
        Ok(VenueQuote {
            venue: self.venue_id.clone(),
            price: *price,
            depth: *depth,
            fee_pct: self.fee_pct,
        })
    }

    async fn submit(
        &self,
        order_id: &OrderId,
        symbol: &Symbol,
        side: OrderSide,
        price: Price,
        quantity: Size,
    ) -> RouterResult<VenueFill> {
        {
            let mut book = self.book.lock();
            if let Some((_, depth)) = book.get_mut(symbol) {
                *depth = depth.saturating_sub(quantity);
            }
        }
        let fee = quantity.inner() * price.inner() * self.fee_pct / Decimal::ONE_HUNDRED;
        debug!(venue = %self.venue_id, %order_id, %side, %price, %quantity, "paper fill");
        Ok(VenueFill {
            order_id: order_id.clone(),
            price,
            quantity,
            fee,
        })
    }

    async fn cancel(&self, order_id: &OrderId) -> RouterResult<()> {
        debug!(venue = %self.venue_id, %order_id, "paper cancel");
        Ok(())
    }
}
