//! Property-based tests for the pure pipeline components
//!
//! - Determinism: same key fields → same address, every call and entry point
//! - Off-curve: every derived address fails point decompression
//! - Seed sensitivity: changing any identifier byte moves the address
//! - Range enforcement: one field one unit out → exactly one violation
//! - Eligibility: strictly-beyond-threshold rule

use civic_core::{
    address::is_on_curve, AddressDeriver, AirQualityReading, EligibilityClassifier,
    LogicalRecordKey, Namespace, Pubkey, ReadingType, RecordValidator, SensorPayload,
};
use proptest::prelude::*;

/// Strategy for identifiers as sensors report them
fn identifier_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_]{1,32}"
}

/// Strategy for identifiers with multi-byte characters, often cut mid-char at 32 bytes
fn unicode_identifier_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z0-9_éü日本]{1,40}",
        "[a]{31}[é日]{1,4}",
    ]
}

/// Strategy for authority identities
fn authority_strategy() -> impl Strategy<Value = Pubkey> {
    any::<[u8; 32]>().prop_map(Pubkey::new)
}

/// Strategy for in-range air-quality readings
fn reading_strategy() -> impl Strategy<Value = AirQualityReading> {
    (
        0u16..=500,
        0.0f32..=1000.0,
        0.0f32..=1000.0,
        0.0f32..=10000.0,
        0.0f32..=100.0,
        -50.0f32..=100.0,
    )
        .prop_map(|(aqi, pm25, pm10, co2, humidity, temperature)| AirQualityReading {
            aqi,
            pm25,
            pm10,
            co2,
            humidity,
            temperature,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: derivation is deterministic, off-curve and the same through a key
    #[test]
    fn prop_derivation_deterministic(
        location in prop_oneof![identifier_strategy(), unicode_identifier_strategy()],
        sensor in prop_oneof![identifier_strategy(), unicode_identifier_strategy()],
        authority in authority_strategy(),
    ) {
        let deriver = AddressDeriver::default();
        let first = deriver.derive(Namespace::AirQuality, &location, &sensor, &authority).unwrap();
        let second = AddressDeriver::default()
            .derive(Namespace::AirQuality, &location, &sensor, &authority)
            .unwrap();
        let key = LogicalRecordKey::air_quality(&location, &sensor, authority);
        let via_key = deriver.derive_key(&key).unwrap();

        prop_assert_eq!(first, second);
        prop_assert_eq!(first, via_key);
        prop_assert!(!is_on_curve(first.address().as_bytes()));
    }

    /// Property: corrupting one identifier byte changes the address
    #[test]
    fn prop_seed_byte_sensitivity(
        name in identifier_strategy(),
        index in any::<prop::sample::Index>(),
        authority in authority_strategy(),
    ) {
        let deriver = AddressDeriver::default();
        let original = deriver.derive(Namespace::Contract, &name, "", &authority).unwrap();

        let mut bytes = name.clone().into_bytes();
        let i = index.index(bytes.len());
        // Stay within the identifier alphabet so the string remains valid
        bytes[i] = if bytes[i] == b'_' { b'x' } else { b'_' };
        let corrupted = String::from_utf8(bytes).unwrap();

        let moved = deriver.derive(Namespace::Contract, &corrupted, "", &authority).unwrap();
        prop_assert_ne!(original.address(), moved.address());
    }

    /// Property: in-range payloads validate
    #[test]
    fn prop_in_range_accepted(reading in reading_strategy()) {
        let validator = RecordValidator::new();
        prop_assert!(validator.validate(&SensorPayload::AirQuality(reading)).is_ok());
    }

    /// Property: pushing one field one unit past its bound yields exactly that violation
    #[test]
    fn prop_single_violation(reading in reading_strategy(), field in 0usize..6, above in any::<bool>()) {
        let mut r = reading;
        let name = match (field, above) {
            (0, _) => { r.aqi = 501; "aqi" }
            (1, true) => { r.pm25 = 1001.0; "pm25" }
            (1, false) => { r.pm25 = -1.0; "pm25" }
            (2, true) => { r.pm10 = 1001.0; "pm10" }
            (2, false) => { r.pm10 = -1.0; "pm10" }
            (3, true) => { r.co2 = 10001.0; "co2" }
            (3, false) => { r.co2 = -1.0; "co2" }
            (4, true) => { r.humidity = 101.0; "humidity" }
            (4, false) => { r.humidity = -1.0; "humidity" }
            (_, true) => { r.temperature = 101.0; "temperature" }
            (_, false) => { r.temperature = -51.0; "temperature" }
        };

        let errors = RecordValidator::new()
            .validate(&SensorPayload::AirQuality(r))
            .unwrap_err();
        prop_assert_eq!(errors.fields(), vec![name]);
    }

    /// Property: AQI is posted exactly when strictly outside [25, 150]
    #[test]
    fn prop_air_quality_gate(aqi in 0u16..=500) {
        let classifier = EligibilityClassifier::new();
        let worthy = classifier.is_ledger_worthy(ReadingType::AirQuality, f64::from(aqi), None);
        prop_assert_eq!(worthy, !(25..=150).contains(&aqi));
    }

    /// Property: the auxiliary value never changes the decision
    #[test]
    fn prop_auxiliary_ignored(value in 0.0f64..=100.0, aux in proptest::option::of(-1e6f64..1e6)) {
        let classifier = EligibilityClassifier::new();
        for reading_type in [ReadingType::Traffic, ReadingType::Energy, ReadingType::WaterLevel, ReadingType::Waste] {
            prop_assert_eq!(
                classifier.is_ledger_worthy(reading_type, value, aux),
                classifier.is_ledger_worthy(reading_type, value, None)
            );
        }
    }
}
