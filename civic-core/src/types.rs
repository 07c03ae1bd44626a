//! Core types for the commit pipeline
//!
//! All key and address types are:
//! - Value types (cloned freely, never mutated after construction)
//! - Deterministic in their byte representation (they seed address derivation)
//! - Serialized as base58 strings where they are identities

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Maximum length of a single derivation seed
pub const MAX_SEED_LEN: usize = 32;

/// 32-byte ledger identity (account address or signer public key)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pubkey([u8; 32]);

impl Pubkey {
    /// Create from raw bytes
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Copy out bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl AsRef<[u8]> for Pubkey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self)
    }
}

impl FromStr for Pubkey {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|e| crate::Error::InvalidIdentity(format!("'{}': {}", s, e)))?;

        let bytes: [u8; 32] = decoded.try_into().map_err(|v: Vec<u8>| {
            crate::Error::InvalidIdentity(format!("'{}' decodes to {} bytes, expected 32", s, v.len()))
        })?;

        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Pubkey {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        value.parse()
    }
}

impl From<Pubkey> for String {
    fn from(key: Pubkey) -> Self {
        key.to_string()
    }
}

/// Record namespace on the ledger
///
/// The seed strings are protocol constants: renaming one moves every
/// address in that namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Air-quality sensor records
    AirQuality,
    /// Civic contracts (administrative/governance actions)
    Contract,
}

impl Namespace {
    /// Derivation seed
    pub fn seed(&self) -> &'static str {
        match self {
            Namespace::AirQuality => "air_quality",
            Namespace::Contract => "contract",
        }
    }

    /// Reporting category (same string as the seed)
    pub fn category(&self) -> &'static str {
        self.seed()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.seed())
    }
}

/// Truncate an identifier to its first 32 bytes for use as a seed
pub fn truncate_seed(value: &str) -> &[u8] {
    let bytes = value.as_bytes();
    &bytes[..bytes.len().min(MAX_SEED_LEN)]
}

/// Logical key of an on-ledger record
///
/// Identifiers are stored as their seed bytes: the first 32 bytes of the
/// UTF-8 encoding, cut without regard to character boundaries. Two inputs
/// sharing those bytes name the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalRecordKey {
    namespace: Namespace,
    primary: Vec<u8>,
    secondary: Vec<u8>,
    authority: Pubkey,
}

impl LogicalRecordKey {
    /// Create new key
    pub fn new(
        namespace: Namespace,
        primary: impl AsRef<str>,
        secondary: impl AsRef<str>,
        authority: Pubkey,
    ) -> Self {
        Self {
            namespace,
            primary: truncate_seed(primary.as_ref()).to_vec(),
            secondary: truncate_seed(secondary.as_ref()).to_vec(),
            authority,
        }
    }

    /// Air-quality record key: (location, sensor id)
    pub fn air_quality(location: impl AsRef<str>, sensor_id: impl AsRef<str>, authority: Pubkey) -> Self {
        Self::new(Namespace::AirQuality, location, sensor_id, authority)
    }

    /// Contract record key: contract name under an authority
    pub fn contract(name: impl AsRef<str>, authority: Pubkey) -> Self {
        Self::new(Namespace::Contract, name, "", authority)
    }

    /// Namespace
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Primary seed bytes (location / contract name)
    pub fn primary_seed(&self) -> &[u8] {
        &self.primary
    }

    /// Secondary seed bytes (sensor id; empty for contracts)
    pub fn secondary_seed(&self) -> &[u8] {
        &self.secondary
    }

    /// Primary identifier for display; a split trailing char shows as U+FFFD
    pub fn primary(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.primary)
    }

    /// Secondary identifier for display
    pub fn secondary(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.secondary)
    }

    /// Authority identity
    pub fn authority(&self) -> &Pubkey {
        &self.authority
    }
}

impl fmt::Display for LogicalRecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.secondary.is_empty() {
            write!(f, "{}/{}", self.namespace, self.primary())
        } else {
            write!(f, "{}/{}/{}", self.namespace, self.primary(), self.secondary())
        }
    }
}

/// Derived record address with its off-curve bump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivedAddress {
    address: Pubkey,
    bump: u8,
}

impl DerivedAddress {
    /// Create from parts (for records loaded from elsewhere; audit before trusting)
    pub fn new(address: Pubkey, bump: u8) -> Self {
        Self { address, bump }
    }

    /// Account locator
    pub fn address(&self) -> Pubkey {
        self.address
    }

    /// Bump seed that pushed the hash off the curve
    pub fn bump(&self) -> u8 {
        self.bump
    }
}

impl fmt::Display for DerivedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Reading type reported by a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingType {
    /// Air quality (AQI composite index)
    AirQuality,
    /// Traffic congestion
    Traffic,
    /// Energy load
    Energy,
    /// Water level
    WaterLevel,
    /// Waste bin fill level
    Waste,
    /// Anything else
    Unclassified,
}

impl ReadingType {
    /// Stable label
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingType::AirQuality => "air_quality",
            ReadingType::Traffic => "traffic",
            ReadingType::Energy => "energy",
            ReadingType::WaterLevel => "water_level",
            ReadingType::Waste => "waste",
            ReadingType::Unclassified => "unclassified",
        }
    }

    /// Parse a label as sent by the application layer; unknown labels are unclassified
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "air_quality" | "airquality" | "air" => ReadingType::AirQuality,
            "traffic" | "traffic_congestion" => ReadingType::Traffic,
            "energy" | "energy_load" => ReadingType::Energy,
            "water" | "water_level" => ReadingType::WaterLevel,
            "waste" | "waste_fill" => ReadingType::Waste,
            _ => ReadingType::Unclassified,
        }
    }

    /// On-ledger namespace for this reading type, if the program has a record layout for it
    pub fn ledger_namespace(&self) -> Option<Namespace> {
        match self {
            ReadingType::AirQuality => Some(Namespace::AirQuality),
            _ => None,
        }
    }
}

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Air-quality reading, laid out as the ledger stores it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AirQualityReading {
    /// Composite air quality index
    pub aqi: u16,
    /// PM2.5 (μg/m³)
    pub pm25: f32,
    /// PM10 (μg/m³)
    pub pm10: f32,
    /// CO2 (ppm)
    pub co2: f32,
    /// Relative humidity (%)
    pub humidity: f32,
    /// Temperature (°C)
    pub temperature: f32,
}

/// Traffic reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficReading {
    /// Congestion (%)
    pub congestion_level: f64,
    /// Vehicles counted in the sampling window
    pub vehicle_count: f64,
    /// Average speed (km/h)
    pub average_speed: f64,
}

/// Energy meter reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyReading {
    /// Load relative to rated capacity (%)
    pub load_percentage: f64,
    /// Consumption (kW)
    pub consumption: f64,
    /// Voltage (V)
    pub voltage: f64,
    /// Power factor (0..1)
    pub power_factor: f64,
}

/// Water level reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaterLevelReading {
    /// Level relative to capacity (%)
    pub level_percentage: f64,
    /// Flow rate (m/s)
    pub flow_rate: f64,
}

/// Waste bin reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WasteReading {
    /// Fill level (%)
    pub fill_percentage: f64,
    /// Bin temperature (°C)
    pub temperature: f64,
}

/// Reading with a single percentage value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenericReading {
    /// Value (%)
    pub value: f64,
}

/// Typed sensor payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorPayload {
    /// Air quality
    AirQuality(AirQualityReading),
    /// Traffic
    Traffic(TrafficReading),
    /// Energy
    Energy(EnergyReading),
    /// Water level
    WaterLevel(WaterLevelReading),
    /// Waste
    Waste(WasteReading),
    /// Unclassified
    Unclassified(GenericReading),
}

impl SensorPayload {
    /// Reading type of this payload
    pub fn reading_type(&self) -> ReadingType {
        match self {
            SensorPayload::AirQuality(_) => ReadingType::AirQuality,
            SensorPayload::Traffic(_) => ReadingType::Traffic,
            SensorPayload::Energy(_) => ReadingType::Energy,
            SensorPayload::WaterLevel(_) => ReadingType::WaterLevel,
            SensorPayload::Waste(_) => ReadingType::Waste,
            SensorPayload::Unclassified(_) => ReadingType::Unclassified,
        }
    }

    /// Value the eligibility gate looks at
    pub fn primary_value(&self) -> f64 {
        match self {
            SensorPayload::AirQuality(r) => f64::from(r.aqi),
            SensorPayload::Traffic(r) => r.congestion_level,
            SensorPayload::Energy(r) => r.load_percentage,
            SensorPayload::WaterLevel(r) => r.level_percentage,
            SensorPayload::Waste(r) => r.fill_percentage,
            SensorPayload::Unclassified(r) => r.value,
        }
    }

    /// Secondary measurement reported alongside the primary value
    pub fn auxiliary_value(&self) -> Option<f64> {
        match self {
            SensorPayload::AirQuality(r) => Some(f64::from(r.pm25)),
            SensorPayload::Traffic(r) => Some(r.average_speed),
            SensorPayload::Energy(r) => Some(r.consumption),
            SensorPayload::WaterLevel(r) => Some(r.flow_rate),
            SensorPayload::Waste(r) => Some(r.temperature),
            SensorPayload::Unclassified(_) => None,
        }
    }

    /// Field values by name, in table order
    pub fn field_values(&self) -> Vec<(&'static str, f64)> {
        match self {
            SensorPayload::AirQuality(r) => vec![
                ("aqi", f64::from(r.aqi)),
                ("pm25", f64::from(r.pm25)),
                ("pm10", f64::from(r.pm10)),
                ("co2", f64::from(r.co2)),
                ("humidity", f64::from(r.humidity)),
                ("temperature", f64::from(r.temperature)),
            ],
            SensorPayload::Traffic(r) => vec![
                ("congestion_level", r.congestion_level),
                ("vehicle_count", r.vehicle_count),
                ("average_speed", r.average_speed),
            ],
            SensorPayload::Energy(r) => vec![
                ("load_percentage", r.load_percentage),
                ("consumption", r.consumption),
                ("voltage", r.voltage),
                ("power_factor", r.power_factor),
            ],
            SensorPayload::WaterLevel(r) => vec![
                ("level_percentage", r.level_percentage),
                ("flow_rate", r.flow_rate),
            ],
            SensorPayload::Waste(r) => vec![
                ("fill_percentage", r.fill_percentage),
                ("temperature", r.temperature),
            ],
            SensorPayload::Unclassified(r) => vec![("value", r.value)],
        }
    }

    /// Approximate on-ledger size of the payload
    pub fn encoded_len(&self) -> usize {
        match self {
            // u16 + five f32
            SensorPayload::AirQuality(_) => 22,
            other => other.field_values().len() * 8,
        }
    }

    /// Build from already range-checked field values
    pub(crate) fn from_fields(reading_type: ReadingType, field: impl Fn(&str) -> f64) -> Self {
        match reading_type {
            ReadingType::AirQuality => SensorPayload::AirQuality(AirQualityReading {
                aqi: field("aqi") as u16,
                pm25: field("pm25") as f32,
                pm10: field("pm10") as f32,
                co2: field("co2") as f32,
                humidity: field("humidity") as f32,
                temperature: field("temperature") as f32,
            }),
            ReadingType::Traffic => SensorPayload::Traffic(TrafficReading {
                congestion_level: field("congestion_level"),
                vehicle_count: field("vehicle_count"),
                average_speed: field("average_speed"),
            }),
            ReadingType::Energy => SensorPayload::Energy(EnergyReading {
                load_percentage: field("load_percentage"),
                consumption: field("consumption"),
                voltage: field("voltage"),
                power_factor: field("power_factor"),
            }),
            ReadingType::WaterLevel => SensorPayload::WaterLevel(WaterLevelReading {
                level_percentage: field("level_percentage"),
                flow_rate: field("flow_rate"),
            }),
            ReadingType::Waste => SensorPayload::Waste(WasteReading {
                fill_percentage: field("fill_percentage"),
                temperature: field("temperature"),
            }),
            ReadingType::Unclassified => SensorPayload::Unclassified(GenericReading {
                value: field("value"),
            }),
        }
    }
}

/// Civic contract record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPayload {
    /// Contract name (also the primary seed)
    pub name: String,
    /// Description
    pub description: String,
    /// Contract type
    pub contract_type: String,
    /// Active flag
    pub is_active: bool,
}

/// Administrative/governance action from the application layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceAction {
    /// Action name (becomes the contract name)
    pub action_name: String,
    /// Acting user or system
    pub actor_id: String,
    /// Free-form details
    pub details: String,
}

impl GovernanceAction {
    /// Contract type recorded for governance actions
    pub const CONTRACT_TYPE: &'static str = "governance";

    /// Map to the contract record written on the ledger
    pub fn to_contract_payload(&self) -> ContractPayload {
        ContractPayload {
            name: self.action_name.clone(),
            description: format!("{}: {}", self.actor_id, self.details),
            contract_type: Self::CONTRACT_TYPE.to_string(),
            is_active: true,
        }
    }
}

/// Payload of a ledger operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "namespace", rename_all = "snake_case")]
pub enum LedgerPayload {
    /// Air-quality record data
    AirQuality(AirQualityReading),
    /// Contract record data
    Contract(ContractPayload),
}

impl LedgerPayload {
    /// Namespace this payload belongs to
    pub fn namespace(&self) -> Namespace {
        match self {
            LedgerPayload::AirQuality(_) => Namespace::AirQuality,
            LedgerPayload::Contract(_) => Namespace::Contract,
        }
    }
}

/// Kind of ledger operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create the record account (idempotent)
    Initialize,
    /// Write record data
    Update,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Initialize => write!(f, "initialize"),
            OperationKind::Update => write!(f, "update"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubkey_base58_roundtrip() {
        let key: Pubkey = crate::DEFAULT_PROGRAM_ID.parse().unwrap();
        assert_eq!(key.to_string(), crate::DEFAULT_PROGRAM_ID);

        let system: Pubkey = "11111111111111111111111111111111".parse().unwrap();
        assert_eq!(system, Pubkey::new([0u8; 32]));
    }

    #[test]
    fn test_pubkey_rejects_wrong_length() {
        assert!("abc".parse::<Pubkey>().is_err());
        assert!("0OIl".parse::<Pubkey>().is_err());
    }

    #[test]
    fn test_pubkey_serde_as_string() {
        let key = Pubkey::new([7u8; 32]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key));
        let back: Pubkey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_key_keeps_raw_seed_prefix() {
        let authority = Pubkey::new([1u8; 32]);
        let long = "x".repeat(40);
        let key = LogicalRecordKey::air_quality(&long, "ENV_001", authority);
        assert_eq!(key.primary_seed().len(), 32);
        assert_eq!(key.primary(), "x".repeat(32));

        // 31 ASCII bytes then a 2-byte char: its first byte stays in the seed
        let multibyte = format!("{}é", "a".repeat(31));
        let key = LogicalRecordKey::air_quality(&multibyte, "ENV_001", authority);
        assert_eq!(key.primary_seed(), truncate_seed(&multibyte));
        assert_eq!(key.primary_seed()[31], 0xC3);
        assert_eq!(key.primary(), format!("{}\u{FFFD}", "a".repeat(31)));

        let suffixed = format!("{}é and more", "a".repeat(31));
        assert_eq!(key, LogicalRecordKey::air_quality(&suffixed, "ENV_001", authority));
    }

    #[test]
    fn test_truncate_seed() {
        assert_eq!(truncate_seed("short"), b"short");
        assert_eq!(truncate_seed(&"y".repeat(50)).len(), MAX_SEED_LEN);
    }

    #[test]
    fn test_reading_type_labels() {
        assert_eq!(ReadingType::from_label("air_quality"), ReadingType::AirQuality);
        assert_eq!(ReadingType::from_label("Air-Quality"), ReadingType::AirQuality);
        assert_eq!(ReadingType::from_label("waste"), ReadingType::Waste);
        assert_eq!(ReadingType::from_label("noise"), ReadingType::Unclassified);
        assert_eq!(ReadingType::AirQuality.ledger_namespace(), Some(Namespace::AirQuality));
        assert_eq!(ReadingType::Traffic.ledger_namespace(), None);
    }

    #[test]
    fn test_governance_action_mapping() {
        let action = GovernanceAction {
            action_name: "budget_2025".to_string(),
            actor_id: "council".to_string(),
            details: "approved".to_string(),
        };
        let payload = action.to_contract_payload();
        assert_eq!(payload.name, "budget_2025");
        assert_eq!(payload.description, "council: approved");
        assert_eq!(payload.contract_type, "governance");
        assert!(payload.is_active);
    }
}
