//! Property tests for the lifecycle ladder, the result classifier, and the
//! completion percentage.

mod fixtures;

use std::sync::Arc;

use fixtures::{component_record, ScriptedStore};
use labflow::{
    classify_result, ResultField, ResultKind, SaveScope, ServiceRef, TestDescriptor,
    TestPackageWorkflow, TestStatus,
};
use proptest::prelude::*;

const ALL_STATUSES: [TestStatus; 6] = [
    TestStatus::Pending,
    TestStatus::Confirmed,
    TestStatus::Sampled,
    TestStatus::Resulted,
    TestStatus::Completed,
    TestStatus::Canceled,
];

fn ladder_position(status: TestStatus) -> Option<usize> {
    match status {
        TestStatus::Pending => Some(0),
        TestStatus::Confirmed => Some(1),
        TestStatus::Sampled => Some(2),
        TestStatus::Resulted => Some(3),
        TestStatus::Completed => Some(4),
        TestStatus::Canceled => None,
    }
}

proptest! {
    /// A legal move never regresses on the ladder, and terminal states
    /// allow no move but the identity.
    #[test]
    fn status_never_regresses(from_idx in 0usize..6, to_idx in 0usize..6) {
        let from = ALL_STATUSES[from_idx];
        let to = ALL_STATUSES[to_idx];
        if from.can_advance_to(to) && from != to {
            prop_assert!(!from.is_terminal());
            match (ladder_position(from), ladder_position(to)) {
                (Some(a), Some(b)) => prop_assert!(b > a),
                // Off-ladder moves only ever land on CANCELED.
                (_, None) => prop_assert_eq!(to, TestStatus::Canceled),
                (None, Some(_)) => prop_assert!(false, "left CANCELED"),
            }
        }
    }

    /// The classifier is total: every input lands in exactly one kind, and
    /// only the three canonical tokens leave Raw.
    #[test]
    fn classifier_is_total(value in ".{0,32}") {
        let kind = classify_result(&value);
        let canonical = matches!(
            value.trim().to_uppercase().as_str(),
            "POSITIVE" | "NEGATIVE" | "INCONCLUSIVE"
        );
        prop_assert_eq!(kind != ResultKind::Raw, canonical);
    }

    /// Percentage stays within [0, 100] and matches the filled share for
    /// any fill pattern.
    #[test]
    fn completion_percentage_matches_filled_share(pattern in proptest::collection::vec(any::<bool>(), 1..12)) {
        tokio_test::block_on(async {
            let records = (0..pattern.len() as u64)
                .map(|i| component_record(i + 1, "component"))
                .collect();
            let store = Arc::new(ScriptedStore::new().with_service(1, records));
            let mut engine = TestPackageWorkflow::new(Arc::clone(&store));
            engine
                .load(TestDescriptor {
                    test_id: 1,
                    status: TestStatus::Sampled,
                    package_id: None,
                    services: vec![ServiceRef {
                        service_id: 1,
                        service_name: "panel".to_string(),
                    }],
                })
                .await
                .expect("load");

            let mut filled = 0usize;
            for (i, fill) in pattern.iter().enumerate() {
                if *fill {
                    engine.edit_component(1, i as u64 + 1, ResultField::ResultValue, "POSITIVE");
                    filled += 1;
                }
            }

            let pct = engine.completion_percentage();
            assert!((0.0..=100.0).contains(&pct));
            let expected = 100.0 * filled as f64 / pattern.len() as f64;
            assert!((pct - expected).abs() < f64::EPSILON * 100.0);

            // The gate agrees with the pattern: unfilled components block.
            if filled < pattern.len() {
                assert!(engine.save_all_results(SaveScope::All).await.is_err());
            }
        });
    }
}
