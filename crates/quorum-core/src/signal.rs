//! Agent signals: the decision inputs consumed by the consensus engine.

use crate::error::{CoreError, Result};
use crate::ids::AgentId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Observation timeframe of an agent signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// All supported timeframes, shortest first.
    pub const ALL: [Timeframe; 6] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::H1,
        Self::H4,
        Self::D1,
    ];
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Timeframe {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1m" => Ok(Self::M1),
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "1h" => Ok(Self::H1),
            "4h" => Ok(Self::H4),
            "1d" => Ok(Self::D1),
            other => Err(CoreError::UnknownTimeframe(other.to_string())),
        }
    }
}

/// Trading action voted for by an agent, or decided by the consensus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn is_hold(&self) -> bool {
        matches!(self, Self::Hold)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
            Self::Hold => write!(f, "hold"),
        }
    }
}

/// One agent's vote for one timeframe. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSignal {
    /// Originating agent.
    pub agent: AgentId,
    /// Timeframe the agent observed.
    pub timeframe: Timeframe,
    /// Voted action.
    pub action: Action,
    /// Confidence in [0, 1].
    pub confidence: Decimal,
    /// When the agent produced the signal.
    pub at: DateTime<Utc>,
}

impl AgentSignal {
    /// Create a signal, validating the confidence range.
    pub fn new(
        agent: AgentId,
        timeframe: Timeframe,
        action: Action,
        confidence: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Self> {
        if confidence < Decimal::ZERO || confidence > Decimal::ONE {
            return Err(CoreError::InvalidConfidence(confidence.to_string()));
        }
        Ok(Self {
            agent,
            timeframe,
            action,
            confidence,
            at,
        })
    }
}
