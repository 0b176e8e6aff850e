//! Weighted multi-timeframe consensus.
//!
//! For each action class the engine sums `weight(timeframe) × confidence`
//! over the signals voting for it. The alignment score is the leading
//! class's weight over the total; below the configured threshold, or on
//! any exact tie, the verdict is hold.

use crate::round::ConsensusRound;
use quorum_core::{Action, RoundId, Size, Symbol, Timeframe};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Consensus engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Per-timeframe weights applied to signal confidence.
    #[serde(default = "default_weights")]
    pub weights: HashMap<Timeframe, Decimal>,
    /// Minimum alignment score for a directional verdict.
    #[serde(default = "default_alignment_threshold")]
    pub alignment_threshold: Decimal,
    /// Base position size before the consensus multiplier.
    #[serde(default = "default_base_size")]
    pub base_size: Size,
    /// Lower clamp on the recommended size.
    #[serde(default = "default_min_size")]
    pub min_size: Size,
    /// Upper clamp on the recommended size.
    #[serde(default = "default_max_size")]
    pub max_size: Size,
    /// A lone signal only produces a directional verdict when its
    /// confidence reaches this override threshold.
    #[serde(default = "default_single_signal_override")]
    pub single_signal_override_confidence: Decimal,
}

fn default_weights() -> HashMap<Timeframe, Decimal> {
    HashMap::from([
        (Timeframe::M1, Decimal::new(10, 2)),
        (Timeframe::M5, Decimal::new(15, 2)),
        (Timeframe::M15, Decimal::new(20, 2)),
        (Timeframe::H1, Decimal::new(25, 2)),
        (Timeframe::H4, Decimal::new(20, 2)),
        (Timeframe::D1, Decimal::new(10, 2)),
    ])
}

fn default_alignment_threshold() -> Decimal {
    Decimal::new(55, 2) // 0.55
}

fn default_base_size() -> Size {
    Size::new(Decimal::new(1000, 0))
}

fn default_min_size() -> Size {
    Size::new(Decimal::new(100, 0))
}

fn default_max_size() -> Size {
    Size::new(Decimal::new(5000, 0))
}

fn default_single_signal_override() -> Decimal {
    Decimal::new(95, 2) // 0.95
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            alignment_threshold: default_alignment_threshold(),
            base_size: default_base_size(),
            min_size: default_min_size(),
            max_size: default_max_size(),
            single_signal_override_confidence: default_single_signal_override(),
        }
    }
}

/// Outcome of evaluating one closed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub round_id: RoundId,
    pub symbol: Symbol,
    pub action: Action,
    /// Fraction of total signal weight backing the leading action.
    pub alignment: Decimal,
    /// Alignment × mean confidence of signals backing the leading action.
    pub confidence: Decimal,
    /// Recommended position size; zero for hold.
    pub size: Size,
    pub signal_count: usize,
    /// Informational: fewer than two signals backed this round.
    /// Quorum enforcement is the risk gate's job, not ours.
    pub low_quorum: bool,
    /// The verdict came from a lone signal that cleared the override
    /// confidence threshold. Exempts it from the gate's quorum veto.
    pub single_signal_override: bool,
}

impl Verdict {
    fn hold(round: &ConsensusRound, alignment: Decimal) -> Self {
        Self {
            round_id: round.round_id,
            symbol: round.symbol.clone(),
            action: Action::Hold,
            alignment,
            confidence: Decimal::ZERO,
            size: Size::ZERO,
            signal_count: round.signal_count(),
            low_quorum: round.signal_count() < 2,
            single_signal_override: false,
        }
    }
}

/// Converts a closed round's signal set into one verdict.
pub struct ConsensusEngine {
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    /// Evaluate a closed round.
    ///
    /// Deterministic: the same signal set always yields the same verdict.
    /// Any exact tie on weighted support yields hold.
    pub fn evaluate(&self, round: &ConsensusRound) -> Verdict {
        if round.signal_count() == 0 {
            return Verdict::hold(round, Decimal::ZERO);
        }

        // Weighted support and confidence sums per action class.
        let mut support: HashMap<Action, Decimal> = HashMap::new();
        let mut conf_sum: HashMap<Action, Decimal> = HashMap::new();
        let mut conf_count: HashMap<Action, u32> = HashMap::new();

        for signal in round.signals() {
            let weight = self.weight(signal.timeframe);
            *support.entry(signal.action).or_default() += weight * signal.confidence;
            *conf_sum.entry(signal.action).or_default() += signal.confidence;
            *conf_count.entry(signal.action).or_default() += 1;
        }

        let total: Decimal = support.values().copied().sum();
        if total.is_zero() {
            // All signals carried zero confidence.
            return Verdict::hold(round, Decimal::ZERO);
        }

        let mut leading = Action::Hold;
        let mut leading_support = Decimal::MIN;
        for (&action, &s) in &support {
            if s > leading_support {
                leading = action;
                leading_support = s;
            }
        }

        let alignment = leading_support / total;

        // Tie on the leading weighted score: conservative hold.
        let tied = support
            .iter()
            .any(|(&action, &s)| action != leading && s == leading_support);
        if tied {
            debug!(round_id = %round.round_id, "weighted support tie, holding");
            return Verdict::hold(round, alignment);
        }

        if leading.is_hold() || alignment < self.config.alignment_threshold {
            return Verdict::hold(round, alignment);
        }

        let mean_conf = conf_sum[&leading] / Decimal::from(conf_count[&leading]);
        let confidence = alignment * mean_conf;

        // A lone signal passes its confidence through directly, but only
        // an unusually confident one may produce a directional verdict.
        if round.signal_count() == 1
            && confidence < self.config.single_signal_override_confidence
        {
            return Verdict::hold(round, alignment);
        }

        Verdict {
            round_id: round.round_id,
            symbol: round.symbol.clone(),
            action: leading,
            alignment,
            confidence,
            size: self.recommend_size(alignment, confidence),
            signal_count: round.signal_count(),
            low_quorum: round.signal_count() < 2,
            // Reaching here with one signal means the override held.
            single_signal_override: round.signal_count() == 1,
        }
    }

    fn weight(&self, timeframe: Timeframe) -> Decimal {
        self.config
            .weights
            .get(&timeframe)
            .copied()
            .unwrap_or(Decimal::new(10, 2))
    }

    /// Size recommendation, monotonically increasing in alignment and
    /// confidence: `base × (0.5·alignment + 0.5·confidence)`, clamped to
    /// [0.3, 1.5] × base and then to the configured absolute bounds.
    fn recommend_size(&self, alignment: Decimal, confidence: Decimal) -> Size {
        let half = Decimal::new(5, 1);
        let multiplier = alignment * half + confidence * half;
        let base = self.config.base_size;
        let raw = base * multiplier;
        let banded = raw.clamp(base * Decimal::new(3, 1), base * Decimal::new(15, 1));
        banded.clamp(self.config.min_size, self.config.max_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use quorum_core::{AgentId, AgentSignal};
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::new("BTC/USDT").unwrap()
    }

    fn round_with(signals: &[(&str, Timeframe, Action, Decimal)]) -> ConsensusRound {
        let mut round = ConsensusRound::open(symbol(), Utc::now(), Duration::seconds(10));
        for (agent, tf, action, conf) in signals {
            round
                .record(
                    AgentSignal::new(AgentId::from(*agent), *tf, *action, *conf, Utc::now())
                        .unwrap(),
                )
                .unwrap();
        }
        round.close();
        round
    }

    fn engine_with_threshold(threshold: Decimal) -> ConsensusEngine {
        ConsensusEngine::new(ConsensusConfig {
            weights: HashMap::from([
                (Timeframe::M5, dec!(1)),
                (Timeframe::H1, dec!(2)),
                (Timeframe::D1, dec!(1)),
            ]),
            alignment_threshold: threshold,
            ..Default::default()
        })
    }

    #[test]
    fn test_worked_example() {
        // (5m, buy, 0.9), (1h, sell, 0.6), (1d, buy, 0.7), weights {5m:1, 1h:2, 1d:1}
        // buy = 1*0.9 + 1*0.7 = 1.6; sell = 2*0.6 = 1.2; total = 2.8
        // alignment = 1.6/2.8 ≈ 0.571; confidence ≈ 0.571 * 0.8 = 0.457
        let round = round_with(&[
            ("a", Timeframe::M5, Action::Buy, dec!(0.9)),
            ("b", Timeframe::H1, Action::Sell, dec!(0.6)),
            ("c", Timeframe::D1, Action::Buy, dec!(0.7)),
        ]);
        let verdict = engine_with_threshold(dec!(0.55)).evaluate(&round);

        assert_eq!(verdict.action, Action::Buy);
        assert!((verdict.alignment - dec!(0.5714)).abs() < dec!(0.0001));
        assert!((verdict.confidence - dec!(0.4571)).abs() < dec!(0.0001));
        assert!(!verdict.low_quorum);
        assert!(!verdict.single_signal_override);
    }

    #[test]
    fn test_below_threshold_holds() {
        let round = round_with(&[
            ("a", Timeframe::M5, Action::Buy, dec!(0.9)),
            ("b", Timeframe::H1, Action::Sell, dec!(0.6)),
            ("c", Timeframe::D1, Action::Buy, dec!(0.7)),
        ]);
        // Alignment ≈ 0.571 < 0.6 threshold.
        let verdict = engine_with_threshold(dec!(0.6)).evaluate(&round);
        assert_eq!(verdict.action, Action::Hold);
        assert_eq!(verdict.size, Size::ZERO);
    }

    #[test]
    fn test_exact_tie_holds() {
        // buy = 1*0.6, sell = 1*0.6: tied support must hold.
        let round = round_with(&[
            ("a", Timeframe::M5, Action::Buy, dec!(0.6)),
            ("b", Timeframe::D1, Action::Sell, dec!(0.6)),
        ]);
        let verdict = engine_with_threshold(dec!(0.3)).evaluate(&round);
        assert_eq!(verdict.action, Action::Hold);
    }

    #[test]
    fn test_three_way_tie_holds() {
        let round = round_with(&[
            ("a", Timeframe::M5, Action::Buy, dec!(0.5)),
            ("b", Timeframe::D1, Action::Sell, dec!(0.5)),
            ("c", Timeframe::M5, Action::Hold, dec!(0.5)),
        ]);
        let verdict = engine_with_threshold(dec!(0.1)).evaluate(&round);
        assert_eq!(verdict.action, Action::Hold);
    }

    #[test]
    fn test_empty_round_holds() {
        let round = round_with(&[]);
        let verdict = engine_with_threshold(dec!(0.55)).evaluate(&round);
        assert_eq!(verdict.action, Action::Hold);
        assert!(verdict.low_quorum);
        assert_eq!(verdict.size, Size::ZERO);
    }

    #[test]
    fn test_single_signal_below_override_holds() {
        let round = round_with(&[("a", Timeframe::H1, Action::Buy, dec!(0.8))]);
        let verdict = engine_with_threshold(dec!(0.55)).evaluate(&round);
        // Alignment is 1.0, confidence 0.8 < 0.95 override: hold.
        assert_eq!(verdict.action, Action::Hold);
        assert!(verdict.low_quorum);
    }

    #[test]
    fn test_single_signal_override_passes() {
        let round = round_with(&[("a", Timeframe::H1, Action::Buy, dec!(0.97))]);
        let verdict = engine_with_threshold(dec!(0.55)).evaluate(&round);
        assert_eq!(verdict.action, Action::Buy);
        // Confidence passed through directly (alignment = 1).
        assert_eq!(verdict.confidence, dec!(0.97));
        assert!(verdict.low_quorum);
        assert!(verdict.single_signal_override);
    }

    #[test]
    fn test_size_monotone_and_clamped() {
        let engine = ConsensusEngine::new(ConsensusConfig {
            base_size: Size::new(dec!(1000)),
            min_size: Size::new(dec!(100)),
            max_size: Size::new(dec!(1200)),
            ..Default::default()
        });

        let low = engine.recommend_size(dec!(0.6), dec!(0.4));
        let high = engine.recommend_size(dec!(0.9), dec!(0.8));
        assert!(high > low);

        // 0.5*1 + 0.5*1 = 1.0 -> 1000, within [300, 1500] band, under max.
        assert_eq!(engine.recommend_size(dec!(1), dec!(1)), Size::new(dec!(1000)));
        // Very weak consensus clamps to the 0.3x band floor.
        assert_eq!(
            engine.recommend_size(dec!(0.1), dec!(0.1)),
            Size::new(dec!(300))
        );
    }

    #[test]
    fn test_hold_majority_holds() {
        let round = round_with(&[
            ("a", Timeframe::H1, Action::Hold, dec!(0.9)),
            ("b", Timeframe::M5, Action::Buy, dec!(0.3)),
        ]);
        let verdict = engine_with_threshold(dec!(0.3)).evaluate(&round);
        assert_eq!(verdict.action, Action::Hold);
    }
}
