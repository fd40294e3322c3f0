// tests/property/classifier_test.rs

//! Property-based tests for the reference-counted classifier.

use super::strategies::{event, room_id, rule};
use proptest::collection::vec;
use proptest::prelude::*;
use roomgraph::core::rules::{Classifier, Predicate};
use std::collections::BTreeSet;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    })]

    /// Classification is exactly the set of destinations with a matching rule.
    #[test]
    fn test_classify_matches_model(
        pairs in vec((rule(), room_id()), 0..8),
        events in vec(event(), 1..5),
    ) {
        let mut classifier = Classifier::new();
        for (rule, dst) in &pairs {
            classifier.register(rule.clone(), dst.clone());
        }

        for event in &events {
            let expected: BTreeSet<_> = pairs
                .iter()
                .filter(|(rule, _)| rule.matches(event))
                .map(|(_, dst)| dst.clone())
                .collect();
            prop_assert_eq!(classifier.classify(event), expected);
        }
    }

    /// Undoing every registration, in any order, leaves nothing behind.
    #[test]
    fn test_balanced_unregister_empties_classifier(
        (pairs, order) in vec((rule(), room_id()), 0..8)
            .prop_flat_map(|pairs| (Just(pairs.clone()), Just(pairs).prop_shuffle())),
        sample in event(),
    ) {
        let mut classifier = Classifier::new();
        for (rule, dst) in &pairs {
            classifier.register(rule.clone(), dst.clone());
        }

        for (rule, dst) in &order {
            prop_assert!(classifier.unregister(rule, dst).is_ok());
        }

        prop_assert!(classifier.is_empty());
        prop_assert_eq!(classifier.len(), 0);
        prop_assert!(classifier.classify(&sample).is_empty());
    }

    /// A pair's count equals the number of times it was registered.
    #[test]
    fn test_counts_track_registrations(
        pairs in vec((rule(), room_id()), 1..8),
    ) {
        let mut classifier = Classifier::new();
        for (rule, dst) in &pairs {
            classifier.register(rule.clone(), dst.clone());
        }
        for (rule, dst) in &pairs {
            let times = pairs.iter().filter(|(r, d)| r == rule && d == dst).count();
            prop_assert_eq!(classifier.count(rule, dst), times);
        }
    }
}
