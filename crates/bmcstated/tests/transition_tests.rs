//! Transition requests: validation, cause ordering and revert on refusal.

mod common;

use bmcstate_common::{BmcState, PropertyValue, RebootCause, Transition};
use bmcstated::init::JobMode;
use bmcstated::transition::{TransitionError, TransitionExecutor};
use common::*;
use std::time::Duration;

fn executor() -> TransitionExecutor {
    TransitionExecutor::new(
        "reboot.target",
        "poweroff.target",
        JobMode::ReplaceIrreversibly,
        Duration::from_secs(1),
    )
}

#[tokio::test]
async fn test_none_is_rejected_without_side_effects() {
    let mut store = store(BmcState::Ready);
    store.set_requested_transition(Transition::Off);
    let mut rx = store.subscribe();
    let before = store.snapshot();
    let jobs = FakeJobs::default();
    let causes = MemoryCauses::default();

    let err = executor()
        .request(&mut store, &jobs, &causes, Transition::None)
        .await
        .unwrap_err();

    assert!(matches!(err, TransitionError::Invalid(Transition::None)));
    assert_eq!(store.snapshot(), before);
    assert!(jobs.started().is_empty());
    assert!(drain(&mut rx).is_empty());
    assert_eq!(causes.current(), None);
}

#[tokio::test]
async fn test_reboot_records_cause_before_actuation() {
    let mut store = store(BmcState::Ready);
    let jobs = FakeJobs::default();
    jobs.observe(store.subscribe());
    let causes = MemoryCauses::default();

    let accepted = executor()
        .request(&mut store, &jobs, &causes, Transition::Reboot)
        .await
        .unwrap();
    assert_eq!(accepted, Transition::Reboot);

    // The cause change was already published when start_unit was called
    let seen: Vec<PropertyValue> = jobs.seen_before_start().iter().map(|c| c.value).collect();
    assert_eq!(
        seen,
        vec![
            PropertyValue::LastRebootCause(RebootCause::SoftwareRequested),
            PropertyValue::RequestedBmcTransition(Transition::Reboot),
        ]
    );

    assert_eq!(
        jobs.started(),
        vec![("reboot.target".to_string(), JobMode::ReplaceIrreversibly)]
    );
    assert_eq!(store.last_reboot_cause(), RebootCause::SoftwareRequested);
    assert_eq!(store.requested_transition(), Transition::Reboot);
    assert_eq!(causes.current(), Some(RebootCause::SoftwareRequested));
}

#[tokio::test]
async fn test_off_leaves_cause_alone() {
    let mut store = store(BmcState::Ready);
    let jobs = FakeJobs::default();
    let causes = MemoryCauses::default();

    executor()
        .request(&mut store, &jobs, &causes, Transition::Off)
        .await
        .unwrap();

    assert_eq!(store.requested_transition(), Transition::Off);
    assert_eq!(store.last_reboot_cause(), RebootCause::Unknown);
    assert_eq!(causes.current(), None);
    assert_eq!(jobs.started()[0].0, "poweroff.target");
}

#[tokio::test]
async fn test_refused_actuation_reverts() {
    let mut store = store(BmcState::Ready);
    store.set_requested_transition(Transition::Off);
    let before = store.snapshot();
    let jobs = FakeJobs::rejecting();
    let causes = MemoryCauses::default();

    let err = executor()
        .request(&mut store, &jobs, &causes, Transition::Reboot)
        .await
        .unwrap_err();

    match err {
        TransitionError::Rejected { target, .. } => assert_eq!(target, "reboot.target"),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(store.snapshot(), before);
    assert_eq!(causes.current(), None);
}

#[tokio::test]
async fn test_refused_reboot_keeps_record_of_accepted_reboot() {
    let mut store = store(BmcState::Ready);
    let jobs = FakeJobs::default();
    let causes = MemoryCauses::default();
    let exec = executor();

    exec.request(&mut store, &jobs, &causes, Transition::Reboot)
        .await
        .unwrap();
    let first_record = causes.record();
    assert!(first_record.is_some());

    jobs.start_rejecting();
    exec.request(&mut store, &jobs, &causes, Transition::Reboot)
        .await
        .unwrap_err();

    // The first reboot is still pending; its record must survive it
    assert_eq!(causes.record(), first_record);
    assert_eq!(store.last_reboot_cause(), RebootCause::SoftwareRequested);
    assert_eq!(store.requested_transition(), Transition::Reboot);
}

#[tokio::test]
async fn test_refused_reboot_restores_older_cause() {
    let mut store = store(BmcState::Ready);
    store.set_last_reboot_cause(RebootCause::WatchdogTimeout);
    let jobs = FakeJobs::rejecting();
    let causes = MemoryCauses::with(RebootCause::PowerLoss);
    let before = causes.record();

    executor()
        .request(&mut store, &jobs, &causes, Transition::Reboot)
        .await
        .unwrap_err();

    assert_eq!(store.last_reboot_cause(), RebootCause::WatchdogTimeout);
    assert_eq!(causes.record(), before);
}

#[tokio::test]
async fn test_requested_transition_is_sticky() {
    let mut store = store(BmcState::Ready);
    let jobs = FakeJobs::default();
    let causes = MemoryCauses::default();

    executor()
        .request(&mut store, &jobs, &causes, Transition::Reboot)
        .await
        .unwrap();

    // Completion is observed through CurrentBMCState only
    store.set_current_state(BmcState::NotReady);
    assert_eq!(store.requested_transition(), Transition::Reboot);
}

#[tokio::test]
async fn test_new_request_supersedes_previous() {
    let mut store = store(BmcState::Ready);
    let jobs = FakeJobs::default();
    let causes = MemoryCauses::default();
    let exec = executor();

    exec.request(&mut store, &jobs, &causes, Transition::Off).await.unwrap();
    exec.request(&mut store, &jobs, &causes, Transition::Reboot).await.unwrap();

    assert_eq!(store.requested_transition(), Transition::Reboot);
    let units: Vec<String> = jobs.started().into_iter().map(|(u, _)| u).collect();
    assert_eq!(units, vec!["poweroff.target", "reboot.target"]);
}
