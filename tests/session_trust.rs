mod common;
use common::{
    mismatch, profile, refused, Call, FakeConnector, FakeRemediation, Journal, ScriptedPrompt,
};

use hostbridge::channel::HostVerification;
use hostbridge::managers::stream::CancelFlag;
use hostbridge::services::logger::Logger;
use hostbridge::services::trust::{PromptPolicy, RejectPolicy, TrustResolver};
use std::sync::Arc;

fn resolver(connector: FakeConnector, remediation: FakeRemediation) -> TrustResolver {
    TrustResolver::new(
        &Logger::new("test"),
        Arc::new(connector),
        Arc::new(remediation),
    )
}

fn opens(journal: &Journal) -> usize {
    journal.count(|call| matches!(call, Call::Open { .. }))
}

#[test]
fn open_then_close_twice_is_a_noop_the_second_time() {
    let journal = Journal::default();
    let trust = resolver(
        FakeConnector::new(journal.clone()),
        FakeRemediation::new(journal.clone()),
    );
    let mut report = trust.open(&profile("10.0.0.2"), &RejectPolicy).expect("open");
    assert!(!report.remediated);
    assert!(!report.untrusted);
    assert!(report.session.is_open());

    report.session.close();
    report.session.close();
    assert!(!report.session.is_open());
    assert_eq!(journal.count(|call| *call == Call::Close), 1);
}

#[test]
fn dropping_an_open_session_closes_it() {
    let journal = Journal::default();
    let trust = resolver(
        FakeConnector::new(journal.clone()),
        FakeRemediation::new(journal.clone()),
    );
    {
        let _report = trust.open(&profile("10.0.0.2"), &RejectPolicy).expect("open");
    }
    assert_eq!(journal.count(|call| *call == Call::Close), 1);
}

#[test]
fn connect_failure_is_reported_without_retry() {
    let journal = Journal::default();
    let trust = resolver(
        FakeConnector::new(journal.clone()).with_outcomes(vec![refused("10.0.0.2")]),
        FakeRemediation::new(journal.clone()),
    );
    let err = trust
        .open(&profile("10.0.0.2"), &RejectPolicy)
        .err()
        .expect("should fail");
    assert_eq!(err.code(), "CONNECT_FAILED");
    assert_eq!(opens(&journal), 1);
}

#[test]
fn non_interactive_mismatch_always_rejects() {
    let journal = Journal::default();
    let trust = resolver(
        FakeConnector::new(journal.clone()).with_outcomes(vec![mismatch("10.0.0.2")]),
        FakeRemediation::new(journal.clone()),
    );
    let err = trust
        .open(&profile("10.0.0.2"), &RejectPolicy)
        .err()
        .expect("should reject");
    assert_eq!(err.code(), "IDENTITY_MISMATCH");
    assert_eq!(opens(&journal), 1);
    assert_eq!(journal.count(|call| matches!(call, Call::Forget(_))), 0);
}

#[test]
fn remediation_forgets_the_key_and_retries_exactly_once() {
    let journal = Journal::default();
    let trust = resolver(
        FakeConnector::new(journal.clone()).with_outcomes(vec![mismatch("10.0.0.2")]),
        FakeRemediation::new(journal.clone()),
    );
    let policy = PromptPolicy::new(Arc::new(ScriptedPrompt::choosing(0)));
    let report = trust.open(&profile("10.0.0.2"), &policy).expect("retry succeeds");
    assert!(report.remediated);
    assert!(!report.untrusted);

    let calls = journal.calls();
    assert_eq!(
        &calls[..3],
        &[
            Call::Open {
                host: "10.0.0.2".to_string(),
                verification: HostVerification::Strict,
            },
            Call::Forget("10.0.0.2".to_string()),
            Call::Open {
                host: "10.0.0.2".to_string(),
                verification: HostVerification::Strict,
            },
        ]
    );
}

#[test]
fn second_mismatch_after_remediation_is_terminal() {
    let journal = Journal::default();
    let trust = resolver(
        FakeConnector::new(journal.clone())
            .with_outcomes(vec![mismatch("10.0.0.2"), mismatch("10.0.0.2")]),
        FakeRemediation::new(journal.clone()),
    );
    let policy = PromptPolicy::new(Arc::new(ScriptedPrompt::choosing(0)));
    let err = trust
        .open(&profile("10.0.0.2"), &policy)
        .err()
        .expect("should fail");
    assert_eq!(err.code(), "IDENTITY_MISMATCH");
    assert_eq!(opens(&journal), 2);
    assert_eq!(journal.count(|call| matches!(call, Call::Forget(_))), 1);
}

#[test]
fn failed_remediation_falls_back_to_reject() {
    let journal = Journal::default();
    let trust = resolver(
        FakeConnector::new(journal.clone()).with_outcomes(vec![mismatch("10.0.0.2")]),
        FakeRemediation::failing(journal.clone()),
    );
    let policy = PromptPolicy::new(Arc::new(ScriptedPrompt::choosing(0)));
    let err = trust
        .open(&profile("10.0.0.2"), &policy)
        .err()
        .expect("should fail");
    assert_eq!(err.code(), "IDENTITY_MISMATCH");
    assert_eq!(opens(&journal), 1);
}

#[test]
fn accepting_connects_once_without_verification() {
    let journal = Journal::default();
    let trust = resolver(
        FakeConnector::new(journal.clone()).with_outcomes(vec![mismatch("10.0.0.2")]),
        FakeRemediation::new(journal.clone()),
    );
    let policy = PromptPolicy::new(Arc::new(ScriptedPrompt::choosing(1)));
    let report = trust.open(&profile("10.0.0.2"), &policy).expect("accepted");
    assert!(report.untrusted);
    assert!(!report.remediated);
    assert!(journal.calls().contains(&Call::Open {
        host: "10.0.0.2".to_string(),
        verification: HostVerification::Untrusted,
    }));
}

#[test]
fn empty_host_fails_before_any_connection() {
    let journal = Journal::default();
    let trust = resolver(
        FakeConnector::new(journal.clone()),
        FakeRemediation::new(journal.clone()),
    );
    let err = trust
        .open(&profile("  "), &RejectPolicy)
        .err()
        .expect("should fail");
    assert_eq!(err.code(), "NO_HOST");
    assert!(journal.calls().is_empty());
}

#[test]
fn interrupted_run_still_closes_the_session() {
    let journal = Journal::default();
    let cancel = CancelFlag::new();
    let trust = resolver(
        FakeConnector::new(journal.clone()),
        FakeRemediation::new(journal.clone()),
    )
    .with_cancel(cancel.clone());
    let mut report = trust.open(&profile("10.0.0.2"), &RejectPolicy).expect("open");
    cancel.cancel();
    let err = report.session.run("sleep 600").expect_err("interrupted");
    assert_eq!(err.code(), "CANCELLED");
    drop(report);
    assert_eq!(journal.count(|call| *call == Call::Close), 1);
}
