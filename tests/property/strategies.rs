// tests/property/strategies.rs

//! Shared generators for events, rooms, and rules.

use proptest::collection::{btree_set, vec};
use proptest::prelude::*;
use roomgraph::core::events::Event;
use roomgraph::core::room::RoomId;
use roomgraph::core::rules::{Rule, RuleSpec};

pub fn room_id() -> impl Strategy<Value = RoomId> {
    "[a-z]{1,3}(\\.[a-z]{1,3})?".prop_map(|name| RoomId::parse(&name).unwrap())
}

fn key() -> impl Strategy<Value = String> {
    prop_oneof![Just("type"), Just("ip"), Just("feed")].prop_map(str::to_string)
}

fn value() -> impl Strategy<Value = String> {
    "[a-c]{1,2}"
}

pub fn event() -> impl Strategy<Value = Event> {
    vec((key(), value()), 0..6).prop_map(|pairs| pairs.into_iter().collect())
}

pub fn rule_spec() -> impl Strategy<Value = RuleSpec> {
    let leaf = prop_oneof![
        (key(), value()).prop_map(|(k, v)| RuleSpec::equals(k, v)),
        (key(), "[a-c*?]{1,3}").prop_map(|(k, p)| RuleSpec::glob(k, p)),
        key().prop_map(RuleSpec::HasKey),
        value().prop_map(RuleSpec::Contains),
    ];
    leaf.prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            vec(inner.clone(), 1..3).prop_map(RuleSpec::And),
            vec(inner.clone(), 1..3).prop_map(RuleSpec::Or),
            inner.prop_map(|spec| RuleSpec::Not(Box::new(spec))),
        ]
    })
}

pub fn rule() -> impl Strategy<Value = Rule> {
    prop_oneof![
        1 => Just(Rule::Anything),
        4 => rule_spec().prop_map(Rule::Match),
    ]
}

pub fn destinations() -> impl Strategy<Value = std::collections::BTreeSet<RoomId>> {
    btree_set(room_id(), 0..4)
}
