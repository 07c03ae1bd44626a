//! Ledger-worthiness gate
//!
//! Only extreme readings justify a ledger write. Each reading type has an
//! upper and a lower threshold; a reading strictly beyond either is posted.
//! Governance actions are always posted. There is no memory between calls.

use crate::types::{ReadingType, SensorPayload};
use serde::{Deserialize, Serialize};

/// Base compute units of an update instruction
pub const UPDATE_BASE_COST: u64 = 3000;
/// Compute units per payload byte of an update instruction
pub const UPDATE_COST_PER_BYTE: u64 = 5;

/// Estimated compute units of writing `payload_bytes` in an update
pub fn estimated_update_cost(payload_bytes: usize) -> u64 {
    UPDATE_BASE_COST + UPDATE_COST_PER_BYTE * payload_bytes as u64
}

/// Post thresholds of one reading type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Post when strictly above
    pub upper: f64,
    /// Post when strictly below
    pub lower: f64,
}

impl Thresholds {
    /// Thresholds of a reading type
    pub fn of(reading_type: ReadingType) -> Self {
        let (upper, lower) = match reading_type {
            ReadingType::AirQuality => (150.0, 25.0),
            ReadingType::Traffic => (90.0, 10.0),
            ReadingType::Energy => (95.0, 20.0),
            ReadingType::WaterLevel => (95.0, 10.0),
            ReadingType::Waste => (90.0, 5.0),
            ReadingType::Unclassified => (90.0, 10.0),
        };
        Self { upper, lower }
    }
}

/// Classification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    /// Whether the record goes to the ledger
    pub ledger_worthy: bool,
    /// Human-readable explanation
    pub reason: String,
}

/// Decides which records go to the ledger
#[derive(Debug, Clone, Copy, Default)]
pub struct EligibilityClassifier;

impl EligibilityClassifier {
    /// Create new classifier
    pub fn new() -> Self {
        Self
    }

    /// Whether a reading is extreme enough to post
    ///
    /// `auxiliary` never changes the decision.
    pub fn is_ledger_worthy(&self, reading_type: ReadingType, value: f64, _auxiliary: Option<f64>) -> bool {
        let t = Thresholds::of(reading_type);
        value > t.upper || value < t.lower
    }

    /// Explanation of the decision
    pub fn reason(&self, reading_type: ReadingType, value: f64, auxiliary: Option<f64>) -> String {
        let t = Thresholds::of(reading_type);
        let unit = if reading_type == ReadingType::AirQuality { "" } else { "%" };

        let mut reason = if value > t.upper {
            format!("{} {}{} above {}{}", reading_type, value, unit, t.upper, unit)
        } else if value < t.lower {
            format!("{} {}{} below {}{}", reading_type, value, unit, t.lower, unit)
        } else {
            format!(
                "{} {}{} within [{}{}, {}{}], kept local",
                reading_type, value, unit, t.lower, unit, t.upper, unit
            )
        };

        if let Some(aux) = auxiliary {
            reason.push_str(&format!(" (auxiliary {})", aux));
        }
        reason
    }

    /// Classify a reading
    pub fn classify(&self, reading_type: ReadingType, value: f64, auxiliary: Option<f64>) -> Eligibility {
        Eligibility {
            ledger_worthy: self.is_ledger_worthy(reading_type, value, auxiliary),
            reason: self.reason(reading_type, value, auxiliary),
        }
    }

    /// Classify a typed payload by its primary value
    pub fn classify_payload(&self, payload: &SensorPayload) -> Eligibility {
        self.classify(
            payload.reading_type(),
            payload.primary_value(),
            payload.auxiliary_value(),
        )
    }

    /// Governance actions are always posted
    pub fn governance(&self, action_name: &str) -> Eligibility {
        Eligibility {
            ledger_worthy: true,
            reason: format!("governance action '{}' is always recorded", action_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_quality_boundaries() {
        let c = EligibilityClassifier::new();
        assert!(c.is_ledger_worthy(ReadingType::AirQuality, 151.0, None));
        assert!(c.is_ledger_worthy(ReadingType::AirQuality, 24.0, None));
        assert!(!c.is_ledger_worthy(ReadingType::AirQuality, 150.0, None));
        assert!(!c.is_ledger_worthy(ReadingType::AirQuality, 25.0, None));
        assert!(!c.is_ledger_worthy(ReadingType::AirQuality, 60.0, None));
    }

    #[test]
    fn test_other_types() {
        let c = EligibilityClassifier::new();
        assert!(c.is_ledger_worthy(ReadingType::Traffic, 90.5, None));
        assert!(!c.is_ledger_worthy(ReadingType::Traffic, 90.0, None));
        assert!(c.is_ledger_worthy(ReadingType::Energy, 19.9, None));
        assert!(!c.is_ledger_worthy(ReadingType::Energy, 95.0, None));
        assert!(c.is_ledger_worthy(ReadingType::WaterLevel, 96.0, None));
        assert!(c.is_ledger_worthy(ReadingType::Waste, 4.0, None));
        assert!(!c.is_ledger_worthy(ReadingType::Waste, 5.0, None));
        assert!(c.is_ledger_worthy(ReadingType::Unclassified, 91.0, None));
    }

    #[test]
    fn test_auxiliary_only_affects_reason() {
        let c = EligibilityClassifier::new();
        let plain = c.classify(ReadingType::Traffic, 50.0, None);
        let aux = c.classify(ReadingType::Traffic, 50.0, Some(12.0));
        assert_eq!(plain.ledger_worthy, aux.ledger_worthy);
        assert!(aux.reason.contains("auxiliary 12"));
    }

    #[test]
    fn test_reason_text() {
        let c = EligibilityClassifier::new();
        assert_eq!(c.reason(ReadingType::AirQuality, 185.0, None), "air_quality 185 above 150");
        assert_eq!(c.reason(ReadingType::Waste, 2.0, None), "waste 2% below 5%");
        assert!(c.reason(ReadingType::AirQuality, 60.0, None).contains("kept local"));
    }

    #[test]
    fn test_governance_always_worthy() {
        let c = EligibilityClassifier::new();
        assert!(c.governance("budget_2025").ledger_worthy);
    }

    #[test]
    fn test_update_cost() {
        assert_eq!(estimated_update_cost(0), 3000);
        assert_eq!(estimated_update_cost(22), 3110);
    }
}
