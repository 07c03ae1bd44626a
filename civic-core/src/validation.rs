//! Record validation
//!
//! Every payload field has a closed numeric range. The tables are versioned
//! and queryable; there is no way to admit a payload without passing them.

use crate::types::{ContractPayload, ReadingType, SensorPayload};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Version of the range tables below
pub const VALIDATION_TABLE_VERSION: u32 = 1;

/// Maximum location length (bytes)
pub const MAX_LOCATION_LEN: usize = 50;
/// Maximum sensor id length (bytes)
pub const MAX_SENSOR_ID_LEN: usize = 30;
/// Maximum contract name length (bytes)
pub const MAX_CONTRACT_NAME_LEN: usize = 50;
/// Maximum contract description length (bytes)
pub const MAX_CONTRACT_DESCRIPTION_LEN: usize = 200;
/// Maximum contract type length (bytes)
pub const MAX_CONTRACT_TYPE_LEN: usize = 30;

/// Closed range of one payload field
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldRange {
    /// Field name
    pub field: &'static str,
    /// Inclusive lower bound
    pub min: f64,
    /// Inclusive upper bound
    pub max: f64,
    /// Whether the field must be a whole number
    pub integer: bool,
}

const fn range(field: &'static str, min: f64, max: f64) -> FieldRange {
    FieldRange {
        field,
        min,
        max,
        integer: false,
    }
}

const fn whole(field: &'static str, min: f64, max: f64) -> FieldRange {
    FieldRange {
        field,
        min,
        max,
        integer: true,
    }
}

const AIR_QUALITY_RANGES: &[FieldRange] = &[
    whole("aqi", 0.0, 500.0),
    range("pm25", 0.0, 1000.0),
    range("pm10", 0.0, 1000.0),
    range("co2", 0.0, 10000.0),
    range("humidity", 0.0, 100.0),
    range("temperature", -50.0, 100.0),
];

const TRAFFIC_RANGES: &[FieldRange] = &[
    range("congestion_level", 0.0, 100.0),
    whole("vehicle_count", 0.0, 10000.0),
    range("average_speed", 0.0, 200.0),
];

const ENERGY_RANGES: &[FieldRange] = &[
    range("load_percentage", 0.0, 100.0),
    range("consumption", 0.0, 100000.0),
    range("voltage", 0.0, 1000.0),
    range("power_factor", 0.0, 1.0),
];

const WATER_LEVEL_RANGES: &[FieldRange] = &[
    range("level_percentage", 0.0, 100.0),
    range("flow_rate", 0.0, 100.0),
];

const WASTE_RANGES: &[FieldRange] = &[
    range("fill_percentage", 0.0, 100.0),
    range("temperature", -50.0, 100.0),
];

const UNCLASSIFIED_RANGES: &[FieldRange] = &[range("value", 0.0, 100.0)];

/// What is wrong with a field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// Value outside the closed range
    OutOfRange {
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
        /// Offending value
        actual: f64,
    },
    /// Field absent or null
    Missing,
    /// Field present but not a finite number
    NotANumber,
    /// Fractional value in a whole-number field
    NotAnInteger,
    /// Payload is not a JSON object
    NotAnObject,
    /// Identifier longer than allowed
    TooLong {
        /// Limit in bytes
        max: usize,
        /// Actual length in bytes
        len: usize,
    },
    /// Identifier empty where one is required
    Empty,
}

/// Violation of one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    /// Field name
    pub field: String,
    /// Violation
    #[serde(flatten)]
    pub kind: ViolationKind,
}

impl FieldViolation {
    fn new(field: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::OutOfRange { min, max, actual } => {
                write!(f, "{} = {} outside [{}, {}]", self.field, actual, min, max)
            }
            ViolationKind::Missing => write!(f, "{} is missing", self.field),
            ViolationKind::NotANumber => write!(f, "{} is not a number", self.field),
            ViolationKind::NotAnInteger => write!(f, "{} must be a whole number", self.field),
            ViolationKind::NotAnObject => write!(f, "{} is not an object", self.field),
            ViolationKind::TooLong { max, len } => {
                write!(f, "{} is {} bytes (max {})", self.field, len, max)
            }
            ViolationKind::Empty => write!(f, "{} is empty", self.field),
        }
    }
}

/// Non-empty list of field violations
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldViolation>);

impl ValidationErrors {
    /// All violations
    pub fn violations(&self) -> &[FieldViolation] {
        &self.0
    }

    /// Names of the offending fields
    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|v| v.field.as_str()).collect()
    }

    /// Number of violations
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a value produced by the validator
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn check(violations: Vec<FieldViolation>) -> Result<(), Self> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Self(violations))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

fn check_value(range: &FieldRange, value: f64) -> Option<ViolationKind> {
    if !value.is_finite() {
        return Some(ViolationKind::NotANumber);
    }
    if range.integer && value.fract() != 0.0 {
        return Some(ViolationKind::NotAnInteger);
    }
    if value < range.min || value > range.max {
        return Some(ViolationKind::OutOfRange {
            min: range.min,
            max: range.max,
            actual: value,
        });
    }
    None
}

fn check_len(field: &str, value: &str, min: usize, max: usize, out: &mut Vec<FieldViolation>) {
    if value.len() < min {
        out.push(FieldViolation::new(field, ViolationKind::Empty));
    } else if value.len() > max {
        out.push(FieldViolation::new(
            field,
            ViolationKind::TooLong {
                max,
                len: value.len(),
            },
        ));
    }
}

/// Validates payloads and identifiers before admission
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordValidator;

impl RecordValidator {
    /// Create new validator
    pub fn new() -> Self {
        Self
    }

    /// Table version
    pub fn version(&self) -> u32 {
        VALIDATION_TABLE_VERSION
    }

    /// Closed range table of a reading type
    pub fn ranges(reading_type: ReadingType) -> &'static [FieldRange] {
        match reading_type {
            ReadingType::AirQuality => AIR_QUALITY_RANGES,
            ReadingType::Traffic => TRAFFIC_RANGES,
            ReadingType::Energy => ENERGY_RANGES,
            ReadingType::WaterLevel => WATER_LEVEL_RANGES,
            ReadingType::Waste => WASTE_RANGES,
            ReadingType::Unclassified => UNCLASSIFIED_RANGES,
        }
    }

    /// Validate a typed payload
    pub fn validate(&self, payload: &SensorPayload) -> Result<(), ValidationErrors> {
        let table = Self::ranges(payload.reading_type());
        let violations = payload
            .field_values()
            .into_iter()
            .zip(table)
            .filter_map(|((name, value), range)| {
                debug_assert_eq!(name, range.field);
                check_value(range, value).map(|kind| FieldViolation::new(name, kind))
            })
            .collect();

        ValidationErrors::check(violations)
    }

    /// Parse and validate an untyped JSON payload
    ///
    /// Extra fields are ignored. Missing, null, non-numeric and fractional
    /// whole-number fields are all reported, one violation per field.
    pub fn validate_raw(
        &self,
        reading_type: ReadingType,
        raw: &serde_json::Value,
    ) -> Result<SensorPayload, ValidationErrors> {
        let object = raw.as_object().ok_or_else(|| {
            ValidationErrors(vec![FieldViolation::new("payload", ViolationKind::NotAnObject)])
        })?;

        let mut values: HashMap<&'static str, f64> = HashMap::new();
        let mut violations = Vec::new();

        for range in Self::ranges(reading_type) {
            let kind = match object.get(range.field) {
                None | Some(serde_json::Value::Null) => Some(ViolationKind::Missing),
                Some(value) => match value.as_f64() {
                    Some(number) => {
                        values.insert(range.field, number);
                        check_value(range, number)
                    }
                    None => Some(ViolationKind::NotANumber),
                },
            };

            if let Some(kind) = kind {
                violations.push(FieldViolation::new(range.field, kind));
            }
        }

        ValidationErrors::check(violations)?;

        let payload = SensorPayload::from_fields(reading_type, |name| {
            values.get(name).copied().unwrap_or_default()
        });
        self.validate(&payload)?;
        Ok(payload)
    }

    /// Check reading identifiers (location, sensor id)
    pub fn validate_identifiers(&self, location: &str, sensor_id: &str) -> Result<(), ValidationErrors> {
        let mut violations = Vec::new();
        check_len("location", location, 0, MAX_LOCATION_LEN, &mut violations);
        check_len("sensor_id", sensor_id, 1, MAX_SENSOR_ID_LEN, &mut violations);
        ValidationErrors::check(violations)
    }

    /// Check a full reading: identifiers and raw payload, every violation reported
    pub fn validate_reading(
        &self,
        reading_type: ReadingType,
        raw: &serde_json::Value,
        location: &str,
        sensor_id: &str,
    ) -> Result<SensorPayload, ValidationErrors> {
        let identifiers = self.validate_identifiers(location, sensor_id);
        match (identifiers, self.validate_raw(reading_type, raw)) {
            (Ok(()), Ok(payload)) => Ok(payload),
            (Err(mut first), Err(second)) => {
                first.0.extend(second.0);
                Err(first)
            }
            (Err(e), Ok(_)) | (Ok(()), Err(e)) => Err(e),
        }
    }

    /// Check a contract record
    pub fn validate_contract(&self, contract: &ContractPayload) -> Result<(), ValidationErrors> {
        let mut violations = Vec::new();
        check_len("name", &contract.name, 1, MAX_CONTRACT_NAME_LEN, &mut violations);
        check_len(
            "description",
            &contract.description,
            0,
            MAX_CONTRACT_DESCRIPTION_LEN,
            &mut violations,
        );
        check_len(
            "contract_type",
            &contract.contract_type,
            1,
            MAX_CONTRACT_TYPE_LEN,
            &mut violations,
        );
        ValidationErrors::check(violations)
    }
}
