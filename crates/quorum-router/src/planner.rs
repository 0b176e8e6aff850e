//! Venue allocation planning.
//!
//! Pure function of the gathered quotes: rank by fee-adjusted price,
//! greedily allocate up to each venue's depth, then accept or reject the
//! whole plan against the slippage bound. Rejection is all-or-nothing; a
//! partial, worse-than-bound fill is never dispatched.

use crate::error::{RouterError, RouterResult};
use crate::venue::VenueQuote;
use quorum_core::{CoreError, OrderSide, Price, Size, VenueId};
use rust_decimal::Decimal;
use tracing::{debug, trace};

/// One planned per-venue allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedLeg {
    pub venue: VenueId,
    pub price: Price,
    pub quantity: Size,
    /// Fee for this leg, in quote currency.
    pub fee: Decimal,
}

/// An accepted routing plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Legs in dispatch order, best effective price first.
    pub legs: Vec<PlannedLeg>,
    /// Volume-weighted average price across legs.
    pub expected_avg_price: Price,
    /// Best raw quote price among participating venues.
    pub best_price: Price,
    pub total_fee: Decimal,
}

/// Build a plan for `amount`, or reject it.
pub fn plan(
    mut quotes: Vec<VenueQuote>,
    side: OrderSide,
    amount: Size,
    max_slippage_pct: Decimal,
) -> RouterResult<Plan> {
    if amount.inner() <= Decimal::ZERO {
        return Err(CoreError::InvalidAmount(amount.to_string()).into());
    }
    if max_slippage_pct < Decimal::ZERO {
        return Err(CoreError::InvalidSlippage(max_slippage_pct.to_string()).into());
    }
    if quotes.is_empty() {
        return Err(RouterError::NoVenues);
    }

    quotes.sort_by(|a, b| {
        let (ea, eb) = (a.effective_price(side), b.effective_price(side));
        match side {
            OrderSide::Buy => ea.cmp(&eb),
            OrderSide::Sell => eb.cmp(&ea),
        }
    });

    let best_price = match side {
        OrderSide::Buy => quotes
            .iter()
            .map(|q| q.price)
            .min()
            .unwrap_or(quotes[0].price),
        OrderSide::Sell => quotes
            .iter()
            .map(|q| q.price)
            .max()
            .unwrap_or(quotes[0].price),
    };

    // Greedy allocation down the ranking.
    let mut legs = Vec::new();
    let mut remaining = amount;
    for quote in &quotes {
        if remaining.is_zero() {
            break;
        }
        let take = remaining.min(quote.depth);
        if take.is_zero() {
            continue;
        }
        let fee = take.inner() * quote.price.inner() * quote.fee_pct / Decimal::ONE_HUNDRED;
        legs.push(PlannedLeg {
            venue: quote.venue.clone(),
            price: quote.price,
            quantity: take,
            fee,
        });
        remaining = remaining.saturating_sub(take);
        trace!(venue = %quote.venue, %take, "leg allocated");
    }

    if !remaining.is_zero() {
        let available = amount.saturating_sub(remaining);
        return Err(RouterError::InsufficientDepth {
            requested: amount,
            available,
        });
    }

    let filled: Decimal = legs.iter().map(|l| l.quantity.inner()).sum();
    let weighted: Decimal = legs
        .iter()
        .map(|l| l.price.inner() * l.quantity.inner())
        .sum();
    let vwap = Price::new(weighted / filled);

    // Slippage bound relative to the best available price.
    let pct = max_slippage_pct / Decimal::ONE_HUNDRED;
    match side {
        OrderSide::Buy => {
            let limit = best_price.slippage_ceiling(max_slippage_pct);
            if vwap > limit {
                return Err(RouterError::SlippageExceeded { vwap, limit });
            }
        }
        OrderSide::Sell => {
            let limit = Price::new(best_price.inner() * (Decimal::ONE - pct));
            if vwap < limit {
                return Err(RouterError::SlippageExceeded { vwap, limit });
            }
        }
    }

    let total_fee = legs.iter().map(|l| l.fee).sum();
    debug!(
        legs = legs.len(),
        %vwap,
        %best_price,
        %total_fee,
        "plan accepted"
    );
    Ok(Plan {
        legs,
        expected_avg_price: vwap,
        best_price,
        total_fee,
    })
}
