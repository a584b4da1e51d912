// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property-based tests for the result status-transition policy.

use mt_model::{Failure, ResultStatus, TestResult};
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────

fn arb_finishing_status() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("passed"),
        Just("failed"),
        Just("invalidated"),
    ]
}

fn arb_failure() -> impl Strategy<Value = Failure> {
    (
        proptest::option::of(".{0,40}"),
        proptest::option::of(1u32..100),
    )
        .prop_map(|(comment, failed_step_number)| Failure {
            comment,
            failed_step_number,
            bug_url: None,
        })
}

fn finish(result: &mut TestResult, status: &str, failure: Failure) -> Result<(), mt_error::MtError> {
    match ResultStatus::parse_finishing(status).unwrap() {
        ResultStatus::Passed => result.finish_succeed(),
        ResultStatus::Failed => result.finish_fail(failure),
        ResultStatus::Invalidated => result.finish_invalidate(failure.comment),
        ResultStatus::Pending => unreachable!("parse_finishing never yields Pending"),
    }
}

// ── 1. Every legal status string maps to exactly one terminal state ─

proptest! {
    #[test]
    fn legal_status_finishes_exactly_once(status in arb_finishing_status(), failure in arb_failure()) {
        let mut r = TestResult::pending(1, 5, 2, 9, 3);
        finish(&mut r, status, failure).unwrap();
        prop_assert!(r.status.is_terminal());
        prop_assert_eq!(r.status.as_str(), status);
        prop_assert!(r.completed_at.is_some());
    }
}

// ── 2. A second finish of any kind is rejected, state preserved ─────

proptest! {
    #[test]
    fn second_finish_always_rejected(
        first in arb_finishing_status(),
        second in arb_finishing_status(),
        failure in arb_failure(),
    ) {
        let mut r = TestResult::pending(1, 5, 2, 9, 3);
        finish(&mut r, first, failure.clone()).unwrap();
        let before = r.clone();

        let err = finish(&mut r, second, failure).unwrap_err();
        prop_assert_eq!(err.code, mt_error::ErrorCode::ResultAlreadyFinished);
        prop_assert_eq!(r, before);
    }
}

// ── 3. Unknown status strings never parse ───────────────────────────

proptest! {
    #[test]
    fn unknown_status_never_parses(s in "[a-z]{1,12}") {
        prop_assume!(!matches!(s.as_str(), "passed" | "failed" | "invalidated"));
        prop_assert!(ResultStatus::parse_finishing(&s).is_err());
    }
}
