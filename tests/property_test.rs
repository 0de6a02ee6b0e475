//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for any valid input.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use statement_ledger::crypto::{
    block_fingerprint, fingerprint, is_fingerprint, statement_fingerprint, GENESIS_HASH,
};
use statement_ledger::domain::{
    Confidence, Judgment, LedgerEntry, NewStatement, VerificationStatus, PARSE_FAILURE_ISSUE,
};

// ============================================================================
// Custom Strategies
// ============================================================================

fn arb_statement() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("The sky is blue".to_string()),
        Just("Unemployment fell to 3.5 percent".to_string()),
        "[A-Za-z0-9 ,.'%-]{1,200}".prop_filter("not blank", |s| !s.trim().is_empty()),
    ]
}

fn arb_speaker() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{1,15}( [A-Z][a-z]{1,15})?"
}

fn arb_source_url() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        "[a-z]{3,12}".prop_map(|host| Some(format!("https://{host}.example/article"))),
    ]
}

/// Millisecond timestamps between 2000 and 2100.
fn arb_millis() -> impl Strategy<Value = i64> {
    946_684_800_000i64..4_102_444_800_000i64
}

fn arb_new_statement() -> impl Strategy<Value = NewStatement> {
    (arb_statement(), arb_speaker(), arb_source_url()).prop_map(|(statement, speaker, url)| {
        let candidate = NewStatement::new(statement, speaker);
        match url {
            Some(url) => candidate.with_source_url(url),
            None => candidate,
        }
    })
}

// ============================================================================
// Fingerprint Properties
// ============================================================================

proptest! {
    #[test]
    fn statement_fingerprint_is_deterministic(
        statement in arb_statement(),
        speaker in arb_speaker(),
        url in arb_source_url(),
    ) {
        let a = statement_fingerprint(&statement, &speaker, url.as_deref());
        let b = statement_fingerprint(&statement, &speaker, url.as_deref());
        prop_assert_eq!(&a, &b);
        prop_assert!(is_fingerprint(&a));
    }

    #[test]
    fn statement_fingerprint_changes_with_content(
        statement in arb_statement(),
        speaker in arb_speaker(),
        extra in "[a-z]",
    ) {
        let original = statement_fingerprint(&statement, &speaker, None);
        let edited = statement_fingerprint(&format!("{statement}{extra}"), &speaker, None);
        prop_assert_ne!(original, edited);
    }

    #[test]
    fn part_boundaries_are_unambiguous(a in "[a-z]{1,10}", b in "[a-z]{1,10}") {
        // Moving a character across the boundary must change the digest
        let shifted_left = format!("{a}{}", &b[..1]);
        let shifted_right = b[1..].to_string();
        prop_assert_ne!(
            fingerprint(&[a.as_str(), b.as_str()]),
            fingerprint(&[shifted_left.as_str(), shifted_right.as_str()])
        );
    }

    #[test]
    fn block_fingerprint_binds_every_input(
        statement_fp in "[0-9a-f]{64}",
        previous in "[0-9a-f]{64}",
        millis in arb_millis(),
    ) {
        let base = block_fingerprint(&statement_fp, &previous, millis);
        prop_assert!(is_fingerprint(&base));
        prop_assert_ne!(&base, &block_fingerprint(&statement_fp, &previous, millis + 1));
        prop_assert_ne!(&base, &block_fingerprint(&statement_fp, GENESIS_HASH, millis));
        prop_assert_ne!(&base, &block_fingerprint(&previous, &statement_fp, millis));
    }

    #[test]
    fn is_fingerprint_rejects_uppercase_and_wrong_length(value in "[0-9A-F]{64}") {
        prop_assume!(value.bytes().any(|b| b.is_ascii_uppercase()));
        prop_assert!(!is_fingerprint(&value));
        prop_assert!(!is_fingerprint(&value.to_lowercase()[1..]));
    }
}

// ============================================================================
// Sealing Properties
// ============================================================================

proptest! {
    #[test]
    fn sealed_entries_verify_and_link(
        first in arb_new_statement(),
        second in arb_new_statement(),
        millis in arb_millis(),
        gap in 0i64..10_000,
    ) {
        let t0 = Utc.timestamp_millis_opt(millis).unwrap();
        let t1 = Utc.timestamp_millis_opt(millis + gap).unwrap();

        let head = LedgerEntry::seal(&first, None, t0);
        prop_assert!(head.verify_fingerprints());
        prop_assert!(head.is_genesis());
        prop_assert_eq!(head.height, 1);

        let next = LedgerEntry::seal(&second, Some(&head), t1);
        prop_assert!(next.verify_fingerprints());
        prop_assert_eq!(&next.previous_hash, &head.block_fingerprint);
        prop_assert_eq!(next.height, 2);
    }

    #[test]
    fn tampering_with_a_sealed_entry_is_detected(
        candidate in arb_new_statement(),
        millis in arb_millis(),
        forged_speaker in arb_speaker(),
    ) {
        let entry = LedgerEntry::seal(&candidate, None, Utc.timestamp_millis_opt(millis).unwrap());
        prop_assume!(forged_speaker != entry.speaker);

        let mut forged = entry.clone();
        forged.speaker = forged_speaker;
        prop_assert!(!forged.verify_fingerprints());
    }

    #[test]
    fn sub_millisecond_precision_does_not_break_replay(
        candidate in arb_new_statement(),
        millis in arb_millis(),
        nanos in 0u32..1_000_000,
    ) {
        let now = Utc.timestamp_millis_opt(millis).unwrap()
            + chrono::Duration::nanoseconds(nanos as i64);
        let entry = LedgerEntry::seal(&candidate, None, now);
        prop_assert_eq!(entry.created_at.timestamp_millis(), millis);
        prop_assert!(entry.verify_fingerprints());
    }
}

// ============================================================================
// Judgment Parsing Properties
// ============================================================================

proptest! {
    #[test]
    fn degraded_judgments_carry_safe_defaults(content in ".{0,400}") {
        let judgment = Judgment::parse(&content);
        if judgment.is_degraded() {
            let result = judgment.result();
            prop_assert_eq!(result.status, VerificationStatus::Unverified);
            prop_assert_eq!(result.confidence, Confidence::Low);
            prop_assert_eq!(&result.issues, &vec![PARSE_FAILURE_ISSUE.to_string()]);
            prop_assert_eq!(&result.reasoning, &content);
        }
    }

    #[test]
    fn objects_with_a_status_always_parse(
        status in prop_oneof![Just("VERIFIED"), Just("DISPUTED"), Just("nonsense")],
        fenced in any::<bool>(),
    ) {
        let body = serde_json::json!({ "status": status }).to_string();
        let content = if fenced { format!("```json\n{body}\n```") } else { body };
        prop_assert!(!Judgment::parse(&content).is_degraded());
    }
}
