//! Session statistics output.
//!
//! Periodic per-symbol summary of the decision flow, read back from the
//! Prometheus registry so the numbers always match what is exported:
//! - rounds closed and verdict split
//! - veto count
//! - composite resolution split
//! - alignment mean and realized PnL

use crate::metrics::{
    COMPOSITES_RESOLVED_TOTAL, CONSENSUS_ALIGNMENT, ROUNDS_CLOSED_TOTAL, TRADE_PNL, VERDICTS_TOTAL,
    VETOES_TOTAL,
};
use chrono::{DateTime, Utc};
use prometheus::core::Collector;
use std::collections::HashMap;
use tracing::info;

/// Session statistics for one symbol.
#[derive(Debug, Clone)]
pub struct SymbolSessionStats {
    pub symbol: String,
    pub rounds_closed: u64,
    pub verdicts_buy: u64,
    pub verdicts_sell: u64,
    pub verdicts_hold: u64,
    pub vetoes: u64,
    pub alignment_avg: f64,
    pub realized_pnl: f64,
    pub trades_closed: u64,
}

/// Session statistics reporter.
pub struct SessionStatsReporter {
    symbols: Vec<String>,
    start_time: DateTime<Utc>,
}

impl SessionStatsReporter {
    pub fn new(symbols: Vec<String>) -> Self {
        Self {
            symbols,
            start_time: Utc::now(),
        }
    }

    /// Get current statistics for all symbols.
    pub fn get_stats(&self) -> Vec<SymbolSessionStats> {
        self.symbols
            .iter()
            .map(|symbol| self.get_symbol_stats(symbol))
            .collect()
    }

    fn get_symbol_stats(&self, symbol: &str) -> SymbolSessionStats {
        let rounds_closed = self.get_counter_value(&ROUNDS_CLOSED_TOTAL, &[symbol]);
        let verdicts_buy = self.get_counter_value(&VERDICTS_TOTAL, &[symbol, "buy"]);
        let verdicts_sell = self.get_counter_value(&VERDICTS_TOTAL, &[symbol, "sell"]);
        let verdicts_hold = self.get_counter_value(&VERDICTS_TOTAL, &[symbol, "hold"]);
        let vetoes = self.sum_counter_with_label(&VETOES_TOTAL, 1, symbol);
        let (alignment_avg, _) = self.histogram_mean(&CONSENSUS_ALIGNMENT, 0, symbol);
        let (pnl_mean, trades_closed) = self.histogram_mean(&TRADE_PNL, 0, symbol);

        SymbolSessionStats {
            symbol: symbol.to_string(),
            rounds_closed,
            verdicts_buy,
            verdicts_sell,
            verdicts_hold,
            vetoes,
            alignment_avg,
            realized_pnl: pnl_mean * trades_closed as f64,
            trades_closed,
        }
    }

    fn get_counter_value(&self, counter: &prometheus::CounterVec, labels: &[&str]) -> u64 {
        counter.with_label_values(labels).get() as u64
    }

    /// Sum a counter vec across all label sets whose label at
    /// `label_index` equals `value`.
    fn sum_counter_with_label(
        &self,
        counter: &prometheus::CounterVec,
        label_index: usize,
        value: &str,
    ) -> u64 {
        let mut total = 0u64;
        for mf in counter.collect() {
            for m in mf.get_metric() {
                let pairs = m.get_label();
                if pairs
                    .get(label_index)
                    .map(|p| p.get_value() == value)
                    .unwrap_or(false)
                {
                    total += m.get_counter().get_value() as u64;
                }
            }
        }
        total
    }

    /// Histogram mean and sample count across label sets whose label at
    /// `label_index` equals `value`.
    fn histogram_mean(
        &self,
        histogram: &prometheus::HistogramVec,
        label_index: usize,
        value: &str,
    ) -> (f64, u64) {
        let mut total_sum = 0.0;
        let mut total_count = 0u64;
        for mf in histogram.collect() {
            for m in mf.get_metric() {
                let pairs = m.get_label();
                if pairs
                    .get(label_index)
                    .map(|p| p.get_value() == value)
                    .unwrap_or(false)
                {
                    let h = m.get_histogram();
                    total_sum += h.get_sample_sum();
                    total_count += h.get_sample_count();
                }
            }
        }
        if total_count > 0 {
            (total_sum / total_count as f64, total_count)
        } else {
            (0.0, 0)
        }
    }

    /// Output the session summary to logs.
    pub fn output_summary(&self) {
        let stats = self.get_stats();
        let duration = Utc::now() - self.start_time;
        let hours = duration.num_hours();
        let minutes = duration.num_minutes() % 60;

        let resolved_filled = self.get_counter_value(&COMPOSITES_RESOLVED_TOTAL, &["filled"]);
        let resolved_partial = self.get_counter_value(&COMPOSITES_RESOLVED_TOTAL, &["partial"]);
        let resolved_failed = self.get_counter_value(&COMPOSITES_RESOLVED_TOTAL, &["failed"]);

        info!("========== Session Statistics Summary ==========");
        info!(
            "Period: {} ({} hours {} minutes)",
            self.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
            hours,
            minutes
        );
        info!(
            "Composites: filled={}, partial={}, failed={}",
            resolved_filled, resolved_partial, resolved_failed
        );

        for s in &stats {
            info!("--- {} ---", s.symbol);
            info!(
                "  Rounds closed: {} (buy: {}, sell: {}, hold: {})",
                s.rounds_closed, s.verdicts_buy, s.verdicts_sell, s.verdicts_hold
            );
            info!("  Vetoes: {}", s.vetoes);
            info!("  Alignment avg: {:.4}", s.alignment_avg);
            info!(
                "  Realized PnL: {:.2} over {} closed trades",
                s.realized_pnl, s.trades_closed
            );
        }

        info!("================================================");
    }

    /// Get JSON-formatted statistics keyed by symbol.
    pub fn to_map(&self) -> HashMap<String, SymbolSessionStats> {
        self.get_stats()
            .into_iter()
            .map(|s| (s.symbol.clone(), s))
            .collect()
    }
}
