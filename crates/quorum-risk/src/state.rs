//! Shared risk accounting state.
//!
//! `RiskState` is owned by exactly one task (the gate actor) and mutated
//! only through its message loop, which makes every check-and-reserve an
//! indivisible operation without explicit locking.

use crate::error::{RiskError, RiskResult, VetoReason};
use quorum_core::{RecentSet, ReservationId, Size, Symbol, VenueId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, trace};

/// One outstanding exposure reservation.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub symbol: Symbol,
    pub amount: Size,
    /// Per-venue split, populated once the routing plan is committed.
    pub venues: HashMap<VenueId, Size>,
}

/// Outcome of releasing a reservation.
#[derive(Debug, Clone, PartialEq)]
pub struct Released {
    pub symbol: Symbol,
    pub amount: Size,
}

/// Per-account mutable risk state.
#[derive(Debug, Default)]
pub struct RiskState {
    consecutive_losses: u32,
    symbol_exposure: HashMap<Symbol, Size>,
    venue_exposure: HashMap<VenueId, Size>,
    reservations: HashMap<ReservationId, Reservation>,
    /// Recently released reservation ids, for double-release detection.
    /// Bounded: a replay older than the window reads as unknown.
    released: RecentSet<ReservationId>,
}

impl RiskState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the projected symbol exposure against `cap` and, if within
    /// bounds, reserve `amount` in one step.
    pub fn check_and_reserve(
        &mut self,
        symbol: &Symbol,
        amount: Size,
        cap: Size,
    ) -> Result<ReservationId, VetoReason> {
        let current = self.symbol_exposure(symbol);
        let projected = current + amount;
        if projected > cap {
            debug!(%symbol, %current, %amount, %cap, "symbol exposure cap exceeded");
            return Err(VetoReason::SymbolExposureExceeded(symbol.clone()));
        }

        let id = ReservationId::new();
        self.symbol_exposure.insert(symbol.clone(), projected);
        self.reservations.insert(
            id,
            Reservation {
                symbol: symbol.clone(),
                amount,
                venues: HashMap::new(),
            },
        );
        trace!(reservation = %id, %symbol, %amount, "exposure reserved");
        Ok(id)
    }

    /// Record the per-venue split of a reservation, checking each venue's
    /// projected exposure against `venue_cap`.
    ///
    /// On a cap breach nothing is mutated; the caller is expected to
    /// release the reservation and treat the plan as vetoed.
    pub fn commit_venues(
        &mut self,
        id: ReservationId,
        split: HashMap<VenueId, Size>,
        venue_cap: Size,
    ) -> RiskResult<()> {
        if self.released.contains(&id) {
            return Err(RiskError::DoubleRelease(id));
        }
        if !self.reservations.contains_key(&id) {
            return Err(RiskError::UnknownReservation(id));
        }

        for (venue, amount) in &split {
            let projected = self.venue_exposure(venue) + *amount;
            if projected > venue_cap {
                debug!(reservation = %id, %venue, %amount, %venue_cap, "venue exposure cap exceeded");
                return Err(RiskError::Veto(VetoReason::VenueExposureExceeded(
                    venue.clone(),
                )));
            }
        }

        for (venue, amount) in &split {
            let projected = self.venue_exposure(venue) + *amount;
            self.venue_exposure.insert(venue.clone(), projected);
        }
        if let Some(reservation) = self.reservations.get_mut(&id) {
            reservation.venues = split;
        }
        Ok(())
    }

    /// Release a reservation exactly once.
    ///
    /// A second release of the same id is a consistency violation and is
    /// reported as `DoubleRelease`; an id we never issued is
    /// `UnknownReservation`. Neither mutates state.
    pub fn release(&mut self, id: ReservationId) -> RiskResult<Released> {
        if self.released.contains(&id) {
            return Err(RiskError::DoubleRelease(id));
        }
        let reservation = self
            .reservations
            .remove(&id)
            .ok_or(RiskError::UnknownReservation(id))?;

        let remaining = self
            .symbol_exposure(&reservation.symbol)
            .saturating_sub(reservation.amount);
        if remaining.is_zero() {
            self.symbol_exposure.remove(&reservation.symbol);
        } else {
            self.symbol_exposure
                .insert(reservation.symbol.clone(), remaining);
        }

        for (venue, amount) in &reservation.venues {
            let remaining = self.venue_exposure(venue).saturating_sub(*amount);
            if remaining.is_zero() {
                self.venue_exposure.remove(venue);
            } else {
                self.venue_exposure.insert(venue.clone(), remaining);
            }
        }

        self.released.insert(id);
        trace!(reservation = %id, symbol = %reservation.symbol, "exposure released");
        Ok(Released {
            symbol: reservation.symbol,
            amount: reservation.amount,
        })
    }

    /// Record a realized trade outcome. A loss increments the consecutive
    /// loss counter; a win or flat close resets it.
    pub fn record_outcome(&mut self, realized_pnl: Decimal) {
        if realized_pnl < Decimal::ZERO {
            self.consecutive_losses += 1;
            debug!(
                losses = self.consecutive_losses,
                pnl = %realized_pnl,
                "loss recorded"
            );
        } else if self.consecutive_losses > 0 {
            debug!(previous = self.consecutive_losses, "loss streak reset");
            self.consecutive_losses = 0;
        }
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    pub fn symbol_exposure(&self, symbol: &Symbol) -> Size {
        self.symbol_exposure
            .get(symbol)
            .copied()
            .unwrap_or(Size::ZERO)
    }

    pub fn venue_exposure(&self, venue: &VenueId) -> Size {
        self.venue_exposure
            .get(venue)
            .copied()
            .unwrap_or(Size::ZERO)
    }

    pub fn open_reservations(&self) -> usize {
        self.reservations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::new("BTC/USDT").unwrap()
    }

    #[test]
    fn test_check_and_reserve_headroom() {
        let mut state = RiskState::new();
        let cap = Size::new(dec!(10000));

        // First $6000 fits, second exceeds the $10000 cap.
        let first = state.check_and_reserve(&symbol(), Size::new(dec!(6000)), cap);
        assert!(first.is_ok());

        let second = state.check_and_reserve(&symbol(), Size::new(dec!(6000)), cap);
        assert_eq!(
            second.unwrap_err(),
            VetoReason::SymbolExposureExceeded(symbol())
        );
        assert_eq!(state.symbol_exposure(&symbol()), Size::new(dec!(6000)));
    }

    #[test]
    fn test_release_restores_headroom() {
        let mut state = RiskState::new();
        let cap = Size::new(dec!(10000));

        let id = state
            .check_and_reserve(&symbol(), Size::new(dec!(6000)), cap)
            .unwrap();
        state.release(id).unwrap();

        assert_eq!(state.symbol_exposure(&symbol()), Size::ZERO);
        assert!(state
            .check_and_reserve(&symbol(), Size::new(dec!(6000)), cap)
            .is_ok());
    }

    #[test]
    fn test_double_release_detected() {
        let mut state = RiskState::new();
        let id = state
            .check_and_reserve(&symbol(), Size::new(dec!(100)), Size::new(dec!(1000)))
            .unwrap();

        assert!(state.release(id).is_ok());
        let second = state.release(id);
        assert!(matches!(second, Err(RiskError::DoubleRelease(_))));
        // State untouched by the failed release.
        assert_eq!(state.symbol_exposure(&symbol()), Size::ZERO);
    }

    #[test]
    fn test_unknown_reservation() {
        let mut state = RiskState::new();
        let result = state.release(ReservationId::new());
        assert!(matches!(result, Err(RiskError::UnknownReservation(_))));
    }

    #[test]
    fn test_commit_venues_checks_cap() {
        let mut state = RiskState::new();
        let id = state
            .check_and_reserve(&symbol(), Size::new(dec!(5000)), Size::new(dec!(10000)))
            .unwrap();

        let over = HashMap::from([(VenueId::from("binance"), Size::new(dec!(5000)))]);
        let result = state.commit_venues(id, over, Size::new(dec!(4000)));
        assert!(matches!(
            result,
            Err(RiskError::Veto(VetoReason::VenueExposureExceeded(_)))
        ));
        // Failed commit leaves venue exposure untouched.
        assert_eq!(
            state.venue_exposure(&VenueId::from("binance")),
            Size::ZERO
        );

        let split = HashMap::from([
            (VenueId::from("binance"), Size::new(dec!(3000))),
            (VenueId::from("kraken"), Size::new(dec!(2000))),
        ]);
        state.commit_venues(id, split, Size::new(dec!(4000))).unwrap();
        assert_eq!(
            state.venue_exposure(&VenueId::from("binance")),
            Size::new(dec!(3000))
        );

        // Release clears both symbol and venue exposure.
        state.release(id).unwrap();
        assert_eq!(
            state.venue_exposure(&VenueId::from("binance")),
            Size::ZERO
        );
        assert_eq!(
            state.venue_exposure(&VenueId::from("kraken")),
            Size::ZERO
        );
    }

    #[test]
    fn test_loss_counter() {
        let mut state = RiskState::new();
        state.record_outcome(dec!(-50));
        state.record_outcome(dec!(-10));
        assert_eq!(state.consecutive_losses(), 2);

        state.record_outcome(dec!(25));
        assert_eq!(state.consecutive_losses(), 0);

        // Flat close also resets.
        state.record_outcome(dec!(-5));
        state.record_outcome(dec!(0));
        assert_eq!(state.consecutive_losses(), 0);
    }
}
