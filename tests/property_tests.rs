/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use brand_mission_api::metadata::OnboardingMetadata;
use brand_mission_api::models::{level_for_xp, MissionRank};
use brand_mission_api::unlock::advance_rank;
use brand_mission_api::webhook_models::{PaymentNotification, SignatureHeader};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::HashMap;

fn rank_strategy() -> impl Strategy<Value = MissionRank> {
    prop::sample::select(MissionRank::ALL_RANKS.to_vec())
}

fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "\\PC{0,20}".prop_map(Value::String),
    ]
}

fn json_value() -> impl Strategy<Value = Value> {
    json_leaf().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z_]{1,10}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn metadata_strategy() -> impl Strategy<Value = OnboardingMetadata> {
    prop::collection::btree_map("[a-zA-Z_]{1,12}", json_value(), 0..8).prop_map(|m| {
        OnboardingMetadata::from_value(Value::Object(m.into_iter().collect::<Map<_, _>>()))
    })
}

// Property: approved payments never lower the unlocked mission
proptest! {
    #[test]
    fn unlock_rank_never_decreases(
        start in prop::option::of(rank_strategy()),
        purchases in prop::collection::vec(rank_strategy(), 0..12)
    ) {
        let mut current = start;
        for purchased in purchases {
            let (next, advanced) = advance_rank(current, purchased);
            if let Some(previous) = current {
                prop_assert!(next >= previous);
                prop_assert_eq!(advanced, next > previous);
            }
            prop_assert!(next >= purchased);
            current = Some(next);
        }
    }

    #[test]
    fn all_is_terminal(purchased in rank_strategy()) {
        let (next, advanced) = advance_rank(Some(MissionRank::All), purchased);
        prop_assert_eq!(next, MissionRank::All);
        prop_assert!(!advanced);
    }

    #[test]
    fn rank_string_round_trip(rank in rank_strategy()) {
        prop_assert_eq!(rank.as_str().parse::<MissionRank>().unwrap(), rank);
    }
}

// Property: metadata blob survives serialize/deserialize without loss
proptest! {
    #[test]
    fn metadata_round_trips_through_storage(metadata in metadata_strategy()) {
        let restored = OnboardingMetadata::parse_lenient(&metadata.to_storage_string());
        prop_assert_eq!(restored, metadata);
    }

    #[test]
    fn metadata_parse_never_panics(raw in "\\PC*") {
        let _ = OnboardingMetadata::parse_lenient(&raw);
    }

    #[test]
    fn metadata_payment_record_keeps_other_keys(
        metadata in metadata_strategy(),
        payment_id in "[0-9]{1,12}"
    ) {
        let mut updated = metadata.clone();
        updated.record_payment(&payment_id, "approved", Some("mission-2"));
        for (key, value) in metadata.as_map() {
            if key != "payment" && key != "checkout" {
                prop_assert_eq!(updated.get(key), Some(value));
            }
        }
        prop_assert_eq!(updated.checkout_status(), Some("approved"));
    }
}

// Property: webhook parsing never panics on arbitrary input
proptest! {
    #[test]
    fn notification_parse_never_panics(
        body in prop::collection::vec(any::<u8>(), 0..256),
        topic in prop::option::of("\\PC{0,12}"),
        id in prop::option::of("\\PC{0,12}")
    ) {
        let mut query = HashMap::new();
        if let Some(topic) = topic {
            query.insert("topic".to_string(), topic);
        }
        if let Some(id) = id {
            query.insert("id".to_string(), id);
        }
        if let Ok(notification) = PaymentNotification::parse(&body, &query) {
            if notification.is_payment() {
                prop_assert!(notification.resource_id.is_some());
            }
        }
    }

    #[test]
    fn notification_parse_handles_arbitrary_json(value in json_value()) {
        let body = value.to_string();
        let _ = PaymentNotification::parse(body.as_bytes(), &HashMap::new());
    }

    #[test]
    fn signature_header_parse_never_panics(header in "\\PC*") {
        let _ = SignatureHeader::parse(&header);
    }
}

// Property: level labels only move up as xp grows
proptest! {
    #[test]
    fn level_is_monotonic(a in 0i64..100_000, b in 0i64..100_000) {
        let order = ["Iniciante", "Estrategista", "Especialista", "Mestre da Marca"];
        let idx = |xp: i64| order.iter().position(|l| *l == level_for_xp(xp)).unwrap();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(idx(low) <= idx(high));
    }
}
