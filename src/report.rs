//! Risk report data model (§3 of the design doc): the only replicated
//! entity, plus the wire-level tier that includes the GREEN reports the
//! store never sees.

use serde::{Deserialize, Serialize};

/// Severity tier once validated as store-worthy. GREEN never makes it this
/// far; see [`WireTier`] for what a client may submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Amber,
    Red,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Amber => "AMBER",
            Tier::Red => "RED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AMBER" => Some(Tier::Amber),
            "RED" => Some(Tier::Red),
            _ => None,
        }
    }
}

/// Severity tier as stamped by the client, before the leader validates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireTier {
    Green,
    Amber,
    Red,
}

impl WireTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireTier::Green => "GREEN",
            WireTier::Amber => "AMBER",
            WireTier::Red => "RED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GREEN" => Some(WireTier::Green),
            "AMBER" => Some(WireTier::Amber),
            "RED" => Some(WireTier::Red),
            _ => None,
        }
    }

    /// Narrows to a storable [`Tier`], or `None` for GREEN.
    pub fn into_tier(self) -> Option<Tier> {
        match self {
            WireTier::Green => None,
            WireTier::Amber => Some(Tier::Amber),
            WireTier::Red => Some(Tier::Red),
        }
    }
}

impl From<Tier> for WireTier {
    fn from(t: Tier) -> Self {
        match t {
            Tier::Amber => WireTier::Amber,
            Tier::Red => WireTier::Red,
        }
    }
}

/// The five real-valued clinical inputs carried on every report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClinicalInputs {
    pub age: f64,
    pub serum_sodium: f64,
    pub serum_creatinine: f64,
    pub ejection_fraction: f64,
    pub day: i64,
}

/// A report as submitted by a client: no `id` (assigned per-replica by the
/// store) and no `alert_sent` (leader-only bookkeeping).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReport {
    pub patient_id: String,
    pub timestamp: i64,
    pub inputs: ClinicalInputs,
    pub probability: f64,
    pub tier: WireTier,
}

/// A report as it lives in a replica's store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub id: i64,
    pub patient_id: String,
    pub timestamp: i64,
    pub inputs: ClinicalInputs,
    pub probability: f64,
    pub tier: Tier,
    pub alert_sent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_round_trips() {
        for t in [Tier::Amber, Tier::Red] {
            assert_eq!(Tier::parse(t.as_str()), Some(t));
        }
        assert_eq!(Tier::parse("GREEN"), None);
    }

    #[test]
    fn wire_tier_narrows() {
        assert_eq!(WireTier::Green.into_tier(), None);
        assert_eq!(WireTier::Amber.into_tier(), Some(Tier::Amber));
        assert_eq!(WireTier::Red.into_tier(), Some(Tier::Red));
    }
}
