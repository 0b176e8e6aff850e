//! Per-symbol consensus rounds and the book that owns them.

use crate::error::{ConsensusError, ConsensusResult};
use chrono::{DateTime, Duration, Utc};
use quorum_core::{AgentId, AgentSignal, RoundId, Symbol, Timeframe};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// One evaluation cycle aggregating agent signals for a symbol.
///
/// Signals are deduplicated by (agent, timeframe): the latest timestamp
/// wins. Once closed, the signal set is frozen and the round is immutable.
#[derive(Debug, Clone)]
pub struct ConsensusRound {
    pub round_id: RoundId,
    pub symbol: Symbol,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    signals: HashMap<(AgentId, Timeframe), AgentSignal>,
    closed: bool,
}

impl ConsensusRound {
    pub fn open(symbol: Symbol, window_start: DateTime<Utc>, window: Duration) -> Self {
        Self {
            round_id: RoundId::new(),
            symbol,
            window_start,
            window_end: window_start + window,
            signals: HashMap::new(),
            closed: false,
        }
    }

    /// Record a signal. Latest timestamp per (agent, timeframe) wins;
    /// an older duplicate is silently discarded.
    pub fn record(&mut self, signal: AgentSignal) -> ConsensusResult<()> {
        if self.closed {
            return Err(ConsensusError::RoundClosed(self.symbol.clone()));
        }
        let key = (signal.agent.clone(), signal.timeframe);
        match self.signals.get(&key) {
            Some(existing) if existing.at >= signal.at => {
                trace!(agent = %signal.agent, tf = %signal.timeframe, "stale signal discarded");
            }
            _ => {
                self.signals.insert(key, signal);
            }
        }
        Ok(())
    }

    /// Freeze the signal set. A round with zero signals still closes.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    /// The frozen signal set (valid to call before close as a snapshot).
    pub fn signals(&self) -> impl Iterator<Item = &AgentSignal> {
        self.signals.values()
    }

    /// Whether the round's window has elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_end
    }
}

/// Owns the open round per symbol.
///
/// Rounds for different symbols proceed in parallel; rounds for the same
/// symbol are serialized: a symbol with an in-flight round keeps its open
/// round collecting until the in-flight one resolves.
pub struct RoundBook {
    window: Duration,
    open: HashMap<Symbol, ConsensusRound>,
    in_flight: HashSet<Symbol>,
}

impl RoundBook {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            open: HashMap::new(),
            in_flight: HashSet::new(),
        }
    }

    /// Record a signal, opening a round for the symbol if none is open.
    pub fn record(&mut self, symbol: Symbol, signal: AgentSignal) -> ConsensusResult<RoundId> {
        let round = self
            .open
            .entry(symbol.clone())
            .or_insert_with(|| ConsensusRound::open(symbol, Utc::now(), self.window));
        round.record(signal)?;
        Ok(round.round_id)
    }

    /// Close and return every due round whose symbol has no in-flight
    /// round. Closed rounds become in-flight until `resolve` is called.
    pub fn close_due(&mut self, now: DateTime<Utc>) -> Vec<ConsensusRound> {
        let due: Vec<Symbol> = self
            .open
            .iter()
            .filter(|(symbol, round)| round.is_due(now) && !self.in_flight.contains(symbol))
            .map(|(symbol, _)| symbol.clone())
            .collect();

        due.into_iter()
            .filter_map(|symbol| self.close_symbol(&symbol))
            .collect()
    }

    /// Close the open round for a symbol on an external tick.
    ///
    /// Returns `None` if no round is open or one is already in flight.
    pub fn close_symbol(&mut self, symbol: &Symbol) -> Option<ConsensusRound> {
        if self.in_flight.contains(symbol) {
            trace!(%symbol, "round close deferred: previous round in flight");
            return None;
        }
        let mut round = self.open.remove(symbol)?;
        round.close();
        self.in_flight.insert(symbol.clone());
        debug!(%symbol, round_id = %round.round_id, signals = round.signal_count(), "round closed");
        Some(round)
    }

    /// Mark a symbol's in-flight round as resolved, allowing the next
    /// round for that symbol to close.
    pub fn resolve(&mut self, symbol: &Symbol) {
        self.in_flight.remove(symbol);
    }

    pub fn has_in_flight(&self, symbol: &Symbol) -> bool {
        self.in_flight.contains(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_core::Action;
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::new("BTC/USDT").unwrap()
    }

    fn signal(agent: &str, tf: Timeframe, action: Action, conf: &str, at: DateTime<Utc>) -> AgentSignal {
        AgentSignal::new(AgentId::from(agent), tf, action, conf.parse().unwrap(), at).unwrap()
    }

    #[test]
    fn test_dedup_latest_wins() {
        let mut round = ConsensusRound::open(symbol(), Utc::now(), Duration::seconds(10));
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(1);

        round
            .record(signal("a", Timeframe::M5, Action::Buy, "0.5", t0))
            .unwrap();
        round
            .record(signal("a", Timeframe::M5, Action::Sell, "0.9", t1))
            .unwrap();
        // Older duplicate arriving late must not overwrite.
        round
            .record(signal("a", Timeframe::M5, Action::Buy, "0.1", t0))
            .unwrap();

        assert_eq!(round.signal_count(), 1);
        let s = round.signals().next().unwrap();
        assert_eq!(s.action, Action::Sell);
        assert_eq!(s.confidence, dec!(0.9));
    }

    #[test]
    fn test_closed_round_rejects_signals() {
        let mut round = ConsensusRound::open(symbol(), Utc::now(), Duration::seconds(10));
        round.close();
        let result = round.record(signal("a", Timeframe::M5, Action::Buy, "0.5", Utc::now()));
        assert!(matches!(result, Err(ConsensusError::RoundClosed(_))));
    }

    #[test]
    fn test_zero_signal_round_still_closes() {
        let mut round = ConsensusRound::open(symbol(), Utc::now(), Duration::seconds(10));
        round.close();
        assert!(round.is_closed());
        assert_eq!(round.signal_count(), 0);
    }

    #[test]
    fn test_same_symbol_rounds_serialized() {
        let mut book = RoundBook::new(Duration::seconds(0));
        book.record(
            symbol(),
            signal("a", Timeframe::M5, Action::Buy, "0.5", Utc::now()),
        )
        .unwrap();

        let first = book.close_symbol(&symbol());
        assert!(first.is_some());
        assert!(book.has_in_flight(&symbol()));

        // Next round opens and fills, but cannot close while in flight.
        book.record(
            symbol(),
            signal("a", Timeframe::M5, Action::Buy, "0.6", Utc::now()),
        )
        .unwrap();
        assert!(book.close_symbol(&symbol()).is_none());

        book.resolve(&symbol());
        assert!(book.close_symbol(&symbol()).is_some());
    }

    #[test]
    fn test_close_due_skips_in_flight() {
        let mut book = RoundBook::new(Duration::seconds(0));
        let btc = symbol();
        let eth = Symbol::new("ETH/USDT").unwrap();

        book.record(btc.clone(), signal("a", Timeframe::M5, Action::Buy, "0.5", Utc::now()))
            .unwrap();
        book.record(eth.clone(), signal("a", Timeframe::M5, Action::Sell, "0.5", Utc::now()))
            .unwrap();

        let closed = book.close_due(Utc::now() + Duration::seconds(1));
        assert_eq!(closed.len(), 2);

        // Both symbols now in flight; new rounds stay open.
        book.record(btc.clone(), signal("a", Timeframe::M5, Action::Buy, "0.7", Utc::now()))
            .unwrap();
        let closed = book.close_due(Utc::now() + Duration::seconds(2));
        assert!(closed.is_empty());
    }
}
