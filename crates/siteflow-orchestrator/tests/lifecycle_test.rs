mod common;

use common::{Harness, SCRIPTED_SLUG};
use siteflow_cloud::ResizeProgress;
use siteflow_core::{ActionStatus, CoreError, RecordStore, TaskState};
use siteflow_orchestrator::{
    ActionParams, CreateServerParams, InstanceAction, OrchestratorError, TickReport,
};
use std::sync::atomic::Ordering;
use uuid::Uuid;

fn create_params(name: &str) -> CreateServerParams {
    CreateServerParams {
        name: name.to_string(),
        provider: SCRIPTED_SLUG.to_string(),
        region: "r1".to_string(),
        size: "small".to_string(),
        owner: Some("owner@example.com".to_string()),
        initial_os: None,
        ssh_key_id: None,
        script: None,
    }
}

/// Drive a freshly requested server through create, post-provision
/// commands, and the completion email
async fn provision(harness: &Harness, name: &str) -> Uuid {
    let response = harness
        .services
        .create_server(create_params(name))
        .await
        .unwrap();
    harness.queue.drain().await.unwrap();
    harness.scheduler.tick().await.unwrap(); // post-provision commands
    harness.scheduler.tick().await.unwrap(); // completion email
    response.server_id
}

#[tokio::test]
async fn test_create_chain_end_to_end() {
    let harness = Harness::new();

    let response = harness
        .services
        .create_server(create_params("site1"))
        .await
        .unwrap();

    // Nothing touched the provider yet; the record is idle until the
    // queued task runs
    let record = harness.services.get_server(response.server_id).await.unwrap();
    assert!(record.instance_id.is_none());
    assert_eq!(record.action_status, ActionStatus::Idle);
    assert_eq!(harness.provider.create_calls.load(Ordering::SeqCst), 0);

    // Drain runs the create hook, which provisions and parks the next step
    let report = harness.queue.drain().await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(harness.provider.create_calls.load(Ordering::SeqCst), 1);

    let record = harness.services.get_server(response.server_id).await.unwrap();
    assert_eq!(record.instance_id.as_deref(), Some("inst-1"));
    assert_eq!(
        record.pending_action.as_deref(),
        Some("after-server-create-commands")
    );

    // First tick runs the setup commands and parks the email step
    harness.scheduler.tick().await.unwrap();
    assert_eq!(harness.executor.exec_count(), 1);
    let record = harness.services.get_server(response.server_id).await.unwrap();
    assert_eq!(record.pending_action.as_deref(), Some("email"));

    // Second tick sends the email and clears the deferred action
    harness.scheduler.tick().await.unwrap();
    assert_eq!(harness.notifier.sent_count(), 1);
    let sent = harness.notifier.sent.lock().unwrap().clone();
    assert_eq!(sent[0].0, "owner@example.com");

    let record = harness.services.get_server(response.server_id).await.unwrap();
    assert_eq!(record.action_status, ActionStatus::Idle);
    assert!(record.pending_action.is_none());
    assert!(!record.history.is_empty());

    let task = harness.store.get_task(response.task_id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Complete);

    // Ticks past the end of the workflow change nothing
    let report = harness.scheduler.tick().await.unwrap();
    assert_eq!(report, TickReport::default());
    assert_eq!(harness.provider.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.notifier.sent_count(), 1);
}

#[tokio::test]
async fn test_waiting_step_retries_until_active() {
    let harness = Harness::new();

    // Instance stays provisioning for two polls before going active
    harness.provider.script_details(&[
        siteflow_cloud::ServerState::New,
        siteflow_cloud::ServerState::New,
    ]);

    let response = harness
        .services
        .create_server(create_params("slowpoke"))
        .await
        .unwrap();
    harness.queue.drain().await.unwrap();

    // Two ticks against a not-yet-active instance run nothing
    harness.scheduler.tick().await.unwrap();
    harness.scheduler.tick().await.unwrap();
    assert_eq!(harness.executor.exec_count(), 0);

    let record = harness.services.get_server(response.server_id).await.unwrap();
    assert_eq!(
        record.pending_action.as_deref(),
        Some("after-server-create-commands")
    );

    // Third tick sees the instance active and runs the commands
    harness.scheduler.tick().await.unwrap();
    assert_eq!(harness.executor.exec_count(), 1);
}

#[tokio::test]
async fn test_failed_commands_keep_step_for_retry() {
    let harness = Harness::new();
    let response = harness
        .services
        .create_server(create_params("flaky"))
        .await
        .unwrap();
    harness.queue.drain().await.unwrap();

    *harness.executor.fail_next.lock().unwrap() = true;
    let report = harness.scheduler.tick().await.unwrap();
    assert_eq!(report.failed, 1);

    // The error is persisted but the step stays parked for the next tick
    let record = harness.services.get_server(response.server_id).await.unwrap();
    assert!(record.error.is_some());
    assert_eq!(
        record.pending_action.as_deref(),
        Some("after-server-create-commands")
    );

    // Retry succeeds and clears the error
    harness.scheduler.tick().await.unwrap();
    let record = harness.services.get_server(response.server_id).await.unwrap();
    assert!(record.error.is_none());
    assert_eq!(record.pending_action.as_deref(), Some("email"));
    assert_eq!(harness.executor.exec_count(), 2);
}

#[tokio::test]
async fn test_delete_tolerates_vanished_instance() {
    let harness = Harness::new();
    let server_id = provision(&harness, "doomed").await;

    harness.provider.vanish();
    let task_id = harness.services.delete_server(server_id).await.unwrap();
    let report = harness.queue.drain().await.unwrap();
    assert_eq!(report.completed, 1);

    // Record is soft-deleted even though the provider had already lost
    // the instance
    let record = harness.store.get_server(server_id).await.unwrap().unwrap();
    assert!(record.trashed);
    assert_eq!(harness.provider.delete_calls.load(Ordering::SeqCst), 1);
    assert!(harness.services.list_servers().await.unwrap().is_empty());

    let task = harness.store.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.state, TaskState::Complete);

    // A trashed record refuses further work
    let err = harness.services.delete_server(server_id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::RecordTrashed(_)));
}

#[tokio::test]
async fn test_duplicate_enqueue_rejected_until_terminal() {
    let harness = Harness::new();
    let server_id = provision(&harness, "popular").await;

    harness.services.delete_server(server_id).await.unwrap();
    let err = harness.services.delete_server(server_id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Core(CoreError::DuplicateTask { .. })
    ));
}

#[tokio::test]
async fn test_resize_polls_until_complete_and_powers_on_once() {
    let harness = Harness::new();
    let server_id = provision(&harness, "growing").await;

    harness
        .provider
        .script_resize(&[ResizeProgress::InProgress, ResizeProgress::Completed]);

    let params = ActionParams {
        new_size: Some("large".to_string()),
        ..ActionParams::default()
    };
    harness
        .services
        .execute_site_action(server_id, InstanceAction::Resize, params)
        .await
        .unwrap();
    harness.queue.drain().await.unwrap();

    let record = harness.services.get_server(server_id).await.unwrap();
    assert!(record.pending_resize.is_some());
    assert_eq!(record.pending_action.as_deref(), Some("resize-poll"));

    // Still in progress: pairing and step survive the tick
    harness.scheduler.tick().await.unwrap();
    let record = harness.services.get_server(server_id).await.unwrap();
    assert!(record.pending_resize.is_some());
    assert_eq!(harness.provider.power_on_calls.load(Ordering::SeqCst), 0);

    // Completed: size applied, instance restarted exactly once
    harness.scheduler.tick().await.unwrap();
    let record = harness.services.get_server(server_id).await.unwrap();
    assert_eq!(record.size, "large");
    assert!(record.pending_resize.is_none());
    assert_eq!(record.action_status, ActionStatus::Idle);
    assert_eq!(harness.provider.power_on_calls.load(Ordering::SeqCst), 1);

    // Extra ticks cannot restart it again
    harness.scheduler.tick().await.unwrap();
    assert_eq!(harness.provider.power_on_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_restart_keeps_resize_pairing_for_retry() {
    let harness = Harness::new();
    let server_id = provision(&harness, "stubborn").await;

    // Resize completes on the provider side, but the first restart
    // attempt fails transiently
    harness
        .provider
        .script_resize(&[ResizeProgress::Completed, ResizeProgress::Completed]);
    harness.provider.fail_power_on(1);

    let params = ActionParams {
        new_size: Some("large".to_string()),
        ..ActionParams::default()
    };
    harness
        .services
        .execute_site_action(server_id, InstanceAction::Resize, params)
        .await
        .unwrap();
    harness.queue.drain().await.unwrap();

    let report = harness.scheduler.tick().await.unwrap();
    assert_eq!(report.failed, 1);

    // The failed restart must not finalize anything: pairing and poll
    // step survive, the size is untouched, no restart happened yet
    let record = harness.services.get_server(server_id).await.unwrap();
    assert!(record.error.is_some());
    assert!(record.pending_resize.is_some());
    assert_eq!(record.pending_action.as_deref(), Some("resize-poll"));
    assert_eq!(record.size, "small");
    assert_eq!(harness.provider.power_on_calls.load(Ordering::SeqCst), 0);

    // The retry tick restarts the instance and finalizes the size
    harness.scheduler.tick().await.unwrap();
    let record = harness.services.get_server(server_id).await.unwrap();
    assert!(record.error.is_none());
    assert!(record.pending_resize.is_none());
    assert_eq!(record.size, "large");
    assert_eq!(record.action_status, ActionStatus::Idle);
    assert_eq!(harness.provider.power_on_calls.load(Ordering::SeqCst), 1);

    // Later ticks cannot restart it a second time
    harness.scheduler.tick().await.unwrap();
    assert_eq!(harness.provider.power_on_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_resize_parks_error_and_stops_polling() {
    let harness = Harness::new();
    let server_id = provision(&harness, "shrinking").await;

    harness.provider.script_resize(&[ResizeProgress::Errored]);

    let params = ActionParams {
        new_size: Some("large".to_string()),
        ..ActionParams::default()
    };
    harness
        .services
        .execute_site_action(server_id, InstanceAction::Resize, params)
        .await
        .unwrap();
    harness.queue.drain().await.unwrap();

    let report = harness.scheduler.tick().await.unwrap();
    assert_eq!(report.failed, 1);

    let record = harness.services.get_server(server_id).await.unwrap();
    assert!(record.error.is_some());
    assert!(record.pending_resize.is_none());
    assert_eq!(record.action_status, ActionStatus::Idle);
    assert_eq!(record.size, "small");
}

#[tokio::test]
async fn test_resize_rejected_without_capability() {
    let harness = Harness::new();

    let mut params = create_params("static-box");
    params.provider = "custom-server".to_string();
    params.region = "custom-server-region".to_string();
    let response = harness.services.create_server(params).await.unwrap();
    harness.queue.drain().await.unwrap();
    harness.scheduler.tick().await.unwrap();
    harness.scheduler.tick().await.unwrap();

    let action_params = ActionParams {
        new_size: Some("large".to_string()),
        ..ActionParams::default()
    };
    harness
        .services
        .execute_site_action(response.server_id, InstanceAction::Resize, action_params)
        .await
        .unwrap();
    let report = harness.queue.drain().await.unwrap();
    assert_eq!(report.failed, 1);

    let record = harness.services.get_server(response.server_id).await.unwrap();
    assert!(record.pending_resize.is_none());
}

#[tokio::test]
async fn test_change_domain_runs_remote_command() {
    let harness = Harness::new();
    let server_id = provision(&harness, "renamed").await;

    harness
        .services
        .change_domain(server_id, "old.example.com", "new.example.com")
        .await
        .unwrap();

    // Same site cannot be renamed twice concurrently
    let err = harness
        .services
        .change_domain(server_id, "old.example.com", "other.example.com")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Core(CoreError::DuplicateTask { .. })
    ));

    let report = harness.queue.drain().await.unwrap();
    assert_eq!(report.completed, 1);

    let commands = harness.executor.commands.lock().unwrap().clone();
    let last = commands.last().unwrap();
    assert!(last.contains("old.example.com"));
    assert!(last.contains("new.example.com"));
}

#[tokio::test]
async fn test_relocate_creates_linked_replacement() {
    let harness = Harness::new();
    let server_id = provision(&harness, "mover").await;

    let params = ActionParams {
        target_region: Some("r2".to_string()),
        ..ActionParams::default()
    };
    harness
        .services
        .execute_site_action(server_id, InstanceAction::Relocate, params)
        .await
        .unwrap();
    harness.queue.drain().await.unwrap();

    let servers = harness.services.list_servers().await.unwrap();
    assert_eq!(servers.len(), 2);

    let replacement = servers
        .iter()
        .find(|r| r.parent_id == Some(server_id))
        .expect("replacement record");
    assert_eq!(replacement.region, "r2");
    assert!(replacement.instance_id.is_some());
    assert_ne!(
        replacement.instance_id,
        harness
            .services
            .get_server(server_id)
            .await
            .unwrap()
            .instance_id
    );

    // The original record survives until cutover is confirmed
    let original = harness.services.get_server(server_id).await.unwrap();
    assert!(!original.trashed);
}
