#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;

use wanlab_core::model::snapshot::lookup;
use wanlab_core::{
    Command, CommandResult, ConfigStore, Controller, CoreError, MemoryBlobStore, Port, PortOrigin,
    Preset, PresetScope, ProbeDirection, ProbeLine, ProbeMode, ProbeState, ProfilePatch,
    SessionState,
};

use common::{FakeLab, key, memory_store, session_config, two_subnet_lab};

async fn open(lab: &Arc<FakeLab>, store: ConfigStore) -> Controller {
    let controller = Controller::with_backend(session_config(false), Arc::clone(lab) as _, store);
    controller.open().await.unwrap();
    controller
}

fn delay_and_loss() -> ProfilePatch {
    ProfilePatch {
        delay_ms: Some(50),
        loss_pct: Some(1.0),
        ..ProfilePatch::default()
    }
}

// ── Discovery and resolution ─────────────────────────────────────────

#[tokio::test]
async fn open_discovers_ports_and_resolves_peers() {
    let lab = FakeLab::with_ports(two_subnet_lab());
    let controller = open(&lab, memory_store()).await;

    assert_eq!(controller.session_state(), SessionState::Open);
    assert_eq!(controller.ports().await.len(), 4);
    assert_eq!(controller.primary_server().await, Some(key("lab_server:eth0")));

    let client1 = controller.resolve_key("client1:eth0").await.unwrap();
    assert_eq!(client1.iface(), "eth0@if7");

    let target = controller
        .resolve_target(&client1, ProbeDirection::ClientToServer)
        .await
        .unwrap();
    assert_eq!(target.address, "10.0.0.1");
    assert_eq!(target.peer, key("lab_server:eth0"));

    let back = controller
        .resolve_target(&key("lab_server:eth1"), ProbeDirection::ServerToClient)
        .await
        .unwrap();
    assert_eq!(back.address, "10.0.1.2");

    controller.close().await;
}

#[tokio::test]
async fn failed_discovery_leaves_only_custom_ports() {
    let lab = FakeLab::with_ports(two_subnet_lab());
    lab.fail_discovery.store(true, Ordering::SeqCst);
    let store = memory_store();
    store.add_custom_port(&key("edge:wan0")).unwrap();

    let controller = open(&lab, store).await;
    let ports = controller.ports().await;
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].origin, PortOrigin::Custom);
    controller.close().await;
}

// ── Apply ────────────────────────────────────────────────────────────

#[tokio::test]
async fn applied_profile_survives_refresh_and_new_session() {
    let lab = FakeLab::with_ports(two_subnet_lab());
    let blobs = Arc::new(MemoryBlobStore::new());
    let controller = open(&lab, ConfigStore::new(blobs.clone())).await;
    let client1 = key("client1:eth0");

    controller
        .execute(Command::EditPort {
            key: client1.clone(),
            patch: delay_and_loss(),
        })
        .await
        .unwrap();
    let result = controller
        .execute(Command::Apply {
            keys: Some(vec![client1.clone()]),
        })
        .await
        .unwrap();
    assert!(matches!(result, CommandResult::Applied { count: 1 }));

    {
        let applied = lab.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0][0].0.iface(), "eth0@if7");
        assert_eq!(applied[0][0].1.delay_ms, 50);
    }

    // A re-discovery does not touch the desired profile.
    controller.execute(Command::Refresh).await.unwrap();
    let view = controller.port(&client1).await.unwrap();
    assert_eq!(view.profile.delay_ms, 50);
    assert!((view.profile.loss_pct - 1.0).abs() < f64::EPSILON);
    controller.close().await;

    let again = open(&lab, ConfigStore::new(blobs)).await;
    assert_eq!(again.port(&client1).await.unwrap().profile.delay_ms, 50);
    again.close().await;
}

#[tokio::test]
async fn rejected_preset_apply_keeps_painted_profiles() {
    let lab = FakeLab::with_ports(two_subnet_lab());
    let controller = open(&lab, memory_store()).await;
    lab.fail_apply.store(true, Ordering::SeqCst);

    let before = controller.store().load();
    let err = controller
        .execute(Command::ApplyPreset {
            preset: Preset::Mobile3g,
            scope: PresetScope::Clients,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ApplyFailed { .. }));

    // The preset is painted and persisted as the desired state; nothing
    // reached the backend.
    assert!(lab.applied.lock().unwrap().is_empty());
    let after = controller.store().load();
    assert_ne!(before, after);
    assert_eq!(
        lookup(&after, &key("client2:eth0")).unwrap().delay_ms,
        Preset::Mobile3g.profile().delay_ms
    );
    assert!(lookup(&after, &key("lab_server:eth0")).is_none());
    controller.close().await;
}

#[tokio::test]
async fn empty_apply_skips_backend() {
    let lab = FakeLab::with_ports(Vec::new());
    let controller = open(&lab, memory_store()).await;

    let result = controller.execute(Command::Apply { keys: None }).await.unwrap();
    assert!(matches!(result, CommandResult::Applied { count: 0 }));
    assert!(lab.applied.lock().unwrap().is_empty());
    controller.close().await;
}

#[tokio::test]
async fn apply_unknown_port_is_rejected() {
    let lab = FakeLab::with_ports(two_subnet_lab());
    let controller = open(&lab, memory_store()).await;

    let err = controller
        .execute(Command::Apply {
            keys: Some(vec![key("ghost:eth0")]),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::UnknownKey { .. }));
    controller.close().await;
}

// ── Custom ports ─────────────────────────────────────────────────────

#[tokio::test]
async fn custom_port_round_trips_through_store() {
    let lab = FakeLab::with_ports(two_subnet_lab());
    let blobs = Arc::new(MemoryBlobStore::new());
    let controller = open(&lab, ConfigStore::new(blobs.clone())).await;

    controller
        .execute(Command::AddCustomPort {
            key: key("edge:wan0"),
        })
        .await
        .unwrap();
    let err = controller
        .execute(Command::AddCustomPort {
            key: key("client1:eth0"),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateKey { .. }));
    controller.close().await;

    let again = open(&lab, ConfigStore::new(blobs.clone())).await;
    assert_eq!(again.ports().await.len(), 5);
    again
        .execute(Command::RemovePort {
            key: key("edge:wan0"),
        })
        .await
        .unwrap();
    assert_eq!(again.ports().await.len(), 4);
    again.close().await;

    assert!(ConfigStore::new(blobs).custom_ports().is_empty());
}

// ── Snapshots, export and import ─────────────────────────────────────

#[tokio::test]
async fn snapshot_load_paints_matching_ports() {
    let lab = FakeLab::with_ports(two_subnet_lab());
    let controller = open(&lab, memory_store()).await;
    let client1 = key("client1:eth0");

    controller
        .execute(Command::EditPort {
            key: client1.clone(),
            patch: delay_and_loss(),
        })
        .await
        .unwrap();
    controller
        .execute(Command::SaveSnapshot {
            name: "baseline".into(),
        })
        .await
        .unwrap();
    controller
        .execute(Command::EditPort {
            key: client1.clone(),
            patch: ProfilePatch {
                delay_ms: Some(0),
                ..ProfilePatch::default()
            },
        })
        .await
        .unwrap();

    let result = controller
        .execute(Command::LoadSnapshot {
            name: "baseline".into(),
            apply: true,
        })
        .await
        .unwrap();
    assert!(matches!(
        result,
        CommandResult::Painted {
            painted: 4,
            applied: Some(4)
        }
    ));
    assert_eq!(controller.port(&client1).await.unwrap().profile.delay_ms, 50);
    assert_eq!(controller.snapshots(), vec!["baseline".to_owned()]);

    let err = controller
        .execute(Command::LoadSnapshot {
            name: "missing".into(),
            apply: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SnapshotNotFound { .. }));
    controller.close().await;
}

#[tokio::test]
async fn export_keeps_entries_for_absent_ports() {
    let lab = FakeLab::with_ports(two_subnet_lab());
    let store = memory_store();
    store
        .merge([(&key("client9:eth0"), &Preset::WifiBad.profile())])
        .unwrap();
    let controller = open(&lab, store).await;

    let doc = controller.export().await;
    assert_eq!(doc.cfg.len(), 5);
    assert!(doc.cfg.contains_key("client9:eth0"));
    assert_eq!(doc.meta.ports, 3);
    controller.close().await;
}

#[tokio::test]
async fn import_with_restore_recreates_lab_and_applies() {
    let lab = FakeLab::with_ports(two_subnet_lab());
    let controller = open(&lab, memory_store()).await;
    let text = serde_json::json!({
        "meta": { "schema": "wanlab.lab.v1", "saved_at": "2024-05-01T10:00:00.000Z", "ports": 2 },
        "cfg": {
            "client1:eth0@if3": { "delay_ms": "80", "loss_pct": 0.5 },
            "lab_server:eth1": { "delay_ms": 10 }
        }
    })
    .to_string();

    let result = controller
        .execute(Command::Import {
            text,
            restore: true,
        })
        .await
        .unwrap();
    let CommandResult::Imported {
        entries,
        desired_ports,
        painted,
        applied,
    } = result
    else {
        panic!("unexpected result: {result:?}");
    };
    assert_eq!((entries, desired_ports, painted, applied), (2, 2, 2, Some(2)));
    assert_eq!(*lab.inits.lock().unwrap(), vec![(2, true)]);
    assert_eq!(
        controller.port(&key("client1:eth0")).await.unwrap().profile.delay_ms,
        80
    );
    controller.close().await;
}

#[tokio::test]
async fn malformed_import_changes_nothing() {
    let lab = FakeLab::with_ports(two_subnet_lab());
    let controller = open(&lab, memory_store()).await;
    let before = controller.store().load();

    let err = controller
        .execute(Command::Import {
            text: r#"{"client1:eth0": 5}"#.into(),
            restore: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::MalformedPersisted { .. }));
    assert_eq!(controller.store().load(), before);
    controller.close().await;
}

// ── Lab lifecycle ────────────────────────────────────────────────────

#[tokio::test]
async fn init_lab_validates_size_and_refreshes() {
    let lab = FakeLab::with_ports(Vec::new());
    let controller = open(&lab, memory_store()).await;

    let err = controller
        .execute(Command::InitLab {
            ports: 33,
            recreate: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
    assert!(lab.inits.lock().unwrap().is_empty());

    *lab.ports.lock().unwrap() = vec![
        Port::discovered("client1", "eth0", Some("10.0.0.2/24".into())),
        Port::discovered("lab_server", "eth0", Some("10.0.0.1/24".into())),
    ];
    let result = controller
        .execute(Command::InitLab {
            ports: 1,
            recreate: false,
        })
        .await
        .unwrap();
    assert!(matches!(result, CommandResult::Lab(_)));
    assert_eq!(controller.ports().await.len(), 2);

    controller.execute(Command::DestroyLab).await.unwrap();
    assert!(controller.ports().await.is_empty());
    controller.close().await;
}

// ── Probes ───────────────────────────────────────────────────────────

#[tokio::test]
async fn single_probe_pings_resolved_server() {
    let lab = FakeLab::with_ports(two_subnet_lab());
    let controller = open(&lab, memory_store()).await;

    let probe = controller
        .start_probe(
            &key("client2:eth0"),
            ProbeDirection::ClientToServer,
            ProbeMode::single(3),
        )
        .await
        .unwrap();
    probe.wait().await;

    assert_eq!(probe.state(), ProbeState::Stopped);
    assert_eq!(
        *lab.probes.lock().unwrap(),
        vec![("client2".to_owned(), "10.0.1.1".to_owned(), 3)]
    );
    assert!(matches!(probe.lines()[0], ProbeLine::Raw { .. }));

    let (name, log) = controller
        .export_probe_log(&key("client2:eth0"), ProbeDirection::ClientToServer)
        .await
        .unwrap();
    assert!(name.starts_with("ping-client2-"));
    assert!(log.starts_with("WAN Lab Ping Log\n"));
    controller.close().await;
}

#[tokio::test]
async fn probe_direction_must_match_role() {
    let lab = FakeLab::with_ports(two_subnet_lab());
    let controller = open(&lab, memory_store()).await;

    let err = controller
        .start_probe(
            &key("lab_server:eth0"),
            ProbeDirection::ClientToServer,
            ProbeMode::single(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
    controller.close().await;
}

#[tokio::test(start_paused = true)]
async fn continuous_probe_runs_until_stopped() {
    let lab = FakeLab::with_ports(two_subnet_lab());
    let controller = open(&lab, memory_store()).await;
    let client1 = key("client1:eth0");

    let probe = controller
        .start_probe(&client1, ProbeDirection::ClientToServer, ProbeMode::Continuous)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(3500)).await;
    controller
        .stop_probe(&client1, ProbeDirection::ClientToServer)
        .await;
    probe.wait().await;

    let lines = probe.lines();
    assert!(lines.len() >= 3);
    assert_eq!(lines[0].to_string(), "#1 51.2 ms");
    assert_eq!(probe.state(), ProbeState::Stopped);
    controller.close().await;
}

// ── Lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn closed_session_rejects_commands() {
    let lab = FakeLab::with_ports(two_subnet_lab());
    let controller = open(&lab, memory_store()).await;
    controller.close().await;
    controller.close().await;

    assert_eq!(controller.session_state(), SessionState::Closed);
    let err = controller.execute(Command::Refresh).await.unwrap_err();
    assert!(matches!(err, CoreError::SessionClosed));
    assert!(matches!(
        controller.open().await.unwrap_err(),
        CoreError::SessionClosed
    ));
}
