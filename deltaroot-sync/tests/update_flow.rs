//! End-to-end update flows against an in-memory remote.

mod common;

use common::{drain, manifest_json, FakeSource, Fixture, V1, V2};
use deltaroot_core::Version;
use deltaroot_sync::{
    CancellationToken, InstallOutcome, Lifecycle, RunOptions, SyncError, TaskFailure, TaskKind,
    UpdateEvent, UpdateOutcome, UpdateStatus,
};
use tokio::sync::mpsc;

/// V2 keeps `index.html` and `a.js`, changes `b.js`, adds `js/c.js`.
fn publish_v2(source: &FakeSource, update: &str, install: &str) {
    source.publish(
        V2,
        update,
        install,
        &[
            ("index.html", "i1", "<html>v1</html>"),
            ("a.js", "h1", "console.log('a')"),
            ("b.js", "h3", "console.log('b2')"),
            ("js/c.js", "h4", "console.log('c')"),
        ],
    );
}

fn v(s: &str) -> Version {
    Version::from(s)
}

// ---------------------------------------------------------------------------
// 1. Open / check
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_open_installs_bundled_baseline() {
    let fx = Fixture::new();
    let engine = fx.engine(&FakeSource::new());

    let root = fx.layout.content_dir(&v(V1));
    assert!(root.join("index.html").is_file());
    assert_eq!(engine.active_root(), root.as_path());
    assert_eq!(engine.version_info().current_version, Some(v(V1)));
    assert!(fx.layout.state_path().is_file());
}

#[tokio::test]
async fn newer_remote_release_is_available() {
    let fx = Fixture::new();
    let source = FakeSource::new();
    publish_v2(&source, "now", "now");
    let engine = fx.engine(&source);

    let check = engine.check_for_update().await;

    assert!(check.available);
    let session = check.session.expect("session");
    assert_eq!(session.status(), UpdateStatus::None);
    assert_eq!(session.remote().version, v(V2));
    assert_eq!(session.staging_dir(), fx.layout.content_dir(&v(V2)).as_path());
}

#[tokio::test]
async fn same_release_is_not_available() {
    let fx = Fixture::new();
    let source = FakeSource::new();
    source.publish(V1, "now", "now", &[]);
    let engine = fx.engine(&source);

    let check = engine.check_for_update().await;
    assert!(!check.available);
    assert!(check.session.is_none());
}

#[tokio::test]
async fn unreachable_or_malformed_remote_means_no_update() {
    let fx = Fixture::new();
    let source = FakeSource::new();
    let engine = fx.engine(&source);
    assert!(!engine.check_for_update().await.available);

    source.put("chcp.json", r#"{"content_url":"https://cdn.test/app"}"#);
    assert!(!engine.check_for_update().await.available);
}

// ---------------------------------------------------------------------------
// 2. Successful sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_with_install_now_promotes_new_version() {
    let fx = Fixture::new();
    let source = FakeSource::new();
    publish_v2(&source, "now", "now");
    let mut engine = fx.engine(&source);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let check = engine.check_for_update().await;
    let outcome = engine
        .run_update(check.session, RunOptions::default(), &CancellationToken::new(), &tx)
        .await
        .expect("run");

    assert_eq!(outcome.status(), UpdateStatus::Installed);
    let new_root = fx.layout.content_dir(&v(V2));
    assert_eq!(engine.active_root(), new_root.as_path());
    assert_eq!(
        std::fs::read_to_string(new_root.join("b.js")).expect("b.js"),
        "console.log('b2')"
    );
    assert_eq!(
        std::fs::read_to_string(new_root.join("a.js")).expect("a.js"),
        "console.log('a')"
    );
    assert!(new_root.join("js/c.js").is_file());
    assert!(!fx.layout.temp_dir(&v(V2)).exists());
    assert!(!fx.layout.version_dir(&v(V1)).exists(), "previous version purged");

    let info = engine.version_info();
    assert_eq!(info.current_version, Some(v(V2)));
    assert_eq!(info.previous_version, Some(v(V1)));
    assert_eq!(info.ready_install_version, None);

    // Reused files were copied, not fetched.
    let requests = source.requests();
    assert!(!requests.iter().any(|url| url.ends_with("/a.js")));
    assert!(requests.iter().any(|url| url.ends_with("/b.js")));

    let again = engine.check_for_update().await;
    assert!(!again.available);

    drop(tx);
    let events = drain(&mut rx);
    let progress: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            UpdateEvent::Progress { snapshot, .. } => Some(snapshot.progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 6, "2 reused + 2 changed + 2 bookkeeping");
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last().copied(), Some(100.0));
    assert!(events.iter().any(|e| matches!(
        e,
        UpdateEvent::Status { status: UpdateStatus::Success, .. }
    )));
    assert!(matches!(
        events.last(),
        Some(UpdateEvent::Install {
            status: UpdateStatus::Installed,
            outcome: InstallOutcome::Installed { .. },
            ..
        })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn manifest_listing_bookkeeping_files_still_succeeds() {
    for _ in 0..10 {
        let fx = Fixture::new();
        let source = FakeSource::new();
        publish_v2(&source, "now", "now");
        source.put(
            "chcp.manifest",
            manifest_json(&[
                ("index.html", "i1"),
                ("a.js", "h1"),
                ("b.js", "h3"),
                ("js/c.js", "h4"),
                ("chcp.json", "hx"),
                ("chcp.manifest", "hy"),
            ]),
        );
        let mut engine = fx.engine(&source);
        let (tx, _rx) = mpsc::unbounded_channel();

        let check = engine.check_for_update().await;
        let outcome = engine
            .run_update(check.session, RunOptions::default(), &CancellationToken::new(), &tx)
            .await
            .expect("run");

        let UpdateOutcome::Synced { snapshot, .. } = &outcome else {
            panic!("expected a sync, got {outcome:?}");
        };
        assert_eq!(snapshot.task_count, 6);
        assert_eq!(snapshot.failed, 0);
        assert_eq!(outcome.status(), UpdateStatus::Installed);
        assert!(fx.layout.content_dir(&v(V2)).join("chcp.json").is_file());
    }
}

#[tokio::test]
async fn deferred_install_waits_for_lifecycle() {
    let fx = Fixture::new();
    let source = FakeSource::new();
    publish_v2(&source, "now", "resume");
    let mut engine = fx.engine(&source);
    let (tx, _rx) = mpsc::unbounded_channel();

    let check = engine.check_for_update().await;
    let outcome = engine
        .run_update(check.session, RunOptions::default(), &CancellationToken::new(), &tx)
        .await
        .expect("run");

    assert_eq!(outcome.status(), UpdateStatus::Success);
    let old_root = fx.layout.content_dir(&v(V1));
    assert_eq!(engine.active_root(), old_root.as_path());
    assert_eq!(engine.version_info().ready_install_version, Some(v(V2)));

    // A reopened engine keeps serving the old root until install.
    let reopened = fx.engine(&source);
    assert_eq!(reopened.active_root(), old_root.as_path());

    assert_eq!(
        engine.apply_lifecycle(Lifecycle::Start).expect("start"),
        InstallOutcome::NothingToInstall
    );
    let installed = engine.apply_lifecycle(Lifecycle::Resume).expect("resume");
    assert!(matches!(installed, InstallOutcome::Installed { .. }));
    assert_eq!(engine.active_root(), fx.layout.content_dir(&v(V2)).as_path());
    assert_eq!(engine.version_info().ready_install_version, None);
}

#[tokio::test]
async fn forced_install_without_update_installs_ready_version() {
    let fx = Fixture::new();
    let source = FakeSource::new();
    publish_v2(&source, "now", "start");
    let mut engine = fx.engine(&source);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let check = engine.check_for_update().await;
    engine
        .run_update(check.session, RunOptions::default(), &CancellationToken::new(), &tx)
        .await
        .expect("sync");
    drain(&mut rx);

    let check = engine.check_for_update().await;
    assert!(!check.available);
    let options = RunOptions {
        force_update: None,
        force_install: Some(true),
    };
    let outcome = engine
        .run_update(check.session, options, &CancellationToken::new(), &tx)
        .await
        .expect("install");

    assert!(matches!(
        outcome,
        UpdateOutcome::Installed {
            install: InstallOutcome::Installed { .. }
        }
    ));
    assert_eq!(engine.active_root(), fx.layout.content_dir(&v(V2)).as_path());
}

// ---------------------------------------------------------------------------
// 3. Policies without a sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_policy_defers_without_touching_disk() {
    let fx = Fixture::new();
    let source = FakeSource::new();
    publish_v2(&source, "start", "now");
    let mut engine = fx.engine(&source);
    let (tx, _rx) = mpsc::unbounded_channel();

    let check = engine.check_for_update().await;
    assert!(check.available);
    let outcome = engine
        .run_update(check.session, RunOptions::default(), &CancellationToken::new(), &tx)
        .await
        .expect("run");

    assert!(matches!(outcome, UpdateOutcome::Deferred { status: UpdateStatus::None }));
    assert!(!fx.layout.version_dir(&v(V2)).exists());
}

#[tokio::test]
async fn forced_update_without_update_reports_status() {
    let fx = Fixture::new();
    let source = FakeSource::new();
    source.publish(V1, "now", "now", &[]);
    let mut engine = fx.engine(&source);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let check = engine.check_for_update().await;
    let options = RunOptions {
        force_update: Some(true),
        force_install: None,
    };
    engine
        .run_update(check.session, options, &CancellationToken::new(), &tx)
        .await
        .expect("run");

    drop(tx);
    let events = drain(&mut rx);
    assert!(matches!(
        events.as_slice(),
        [UpdateEvent::Status {
            status: UpdateStatus::None,
            snapshot: None
        }]
    ));
}

// ---------------------------------------------------------------------------
// 4. Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_download_leaves_state_untouched() {
    let fx = Fixture::new();
    let source = FakeSource::new();
    publish_v2(&source, "now", "now");
    source.remove("js/c.js");
    let mut engine = fx.engine(&source);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let check = engine.check_for_update().await;
    let outcome = engine
        .run_update(check.session, RunOptions::default(), &CancellationToken::new(), &tx)
        .await
        .expect("run");

    let UpdateOutcome::Synced { snapshot, install } = outcome else {
        panic!("expected a sync outcome");
    };
    assert_eq!(snapshot.status, UpdateStatus::Fail);
    assert!(snapshot.progress < 100.0);
    assert_eq!(snapshot.completed, snapshot.task_count);
    assert_eq!(snapshot.failed, 1);
    assert!(install.is_none());

    let info = engine.version_info();
    assert_eq!(info.current_version, Some(v(V1)));
    assert_eq!(info.ready_install_version, None);
    assert_eq!(engine.active_root(), fx.layout.content_dir(&v(V1)).as_path());

    drop(tx);
    let events = drain(&mut rx);
    let fail_events = events
        .iter()
        .filter(|e| matches!(e, UpdateEvent::Status { status: UpdateStatus::Fail, .. }))
        .count();
    assert_eq!(fail_events, 1);
    assert!(events.iter().any(|e| matches!(
        e,
        UpdateEvent::Progress { report, .. }
            if report.entry.path == "js/c.js"
                && matches!(report.failure, Some(TaskFailure::Http { .. }))
    )));
}

#[tokio::test]
async fn download_that_writes_nothing_fails_session() {
    let fx = Fixture::new();
    let source = FakeSource::new();
    publish_v2(&source, "now", "now");
    source.ghost("b.js");
    let mut engine = fx.engine(&source);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let check = engine.check_for_update().await;
    let outcome = engine
        .run_update(check.session, RunOptions::default(), &CancellationToken::new(), &tx)
        .await
        .expect("run");

    assert_eq!(outcome.status(), UpdateStatus::Fail);
    drop(tx);
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        UpdateEvent::Progress { report, .. }
            if report.kind == TaskKind::Download
                && matches!(report.failure, Some(TaskFailure::MissingTempFile { .. }))
    )));
}

#[tokio::test]
async fn missing_remote_manifest_aborts_before_any_write() {
    let fx = Fixture::new();
    let source = FakeSource::new();
    publish_v2(&source, "now", "now");
    source.remove("chcp.manifest");
    let mut engine = fx.engine(&source);
    let (tx, _rx) = mpsc::unbounded_channel();

    let check = engine.check_for_update().await;
    let err = engine
        .run_update(check.session, RunOptions::default(), &CancellationToken::new(), &tx)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::ManifestUnavailable { .. }), "got: {err}");
    assert!(!fx.layout.version_dir(&v(V2)).exists());
    assert_eq!(engine.version_info().current_version, Some(v(V1)));
}

#[tokio::test]
async fn cancelled_run_fails_every_task() {
    let fx = Fixture::new();
    let source = FakeSource::new();
    publish_v2(&source, "now", "now");
    let mut engine = fx.engine(&source);
    let (tx, _rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let check = engine.check_for_update().await;
    let outcome = engine
        .run_update(check.session, RunOptions::default(), &cancel, &tx)
        .await
        .expect("run");

    let UpdateOutcome::Synced { snapshot, .. } = outcome else {
        panic!("expected a sync outcome");
    };
    assert_eq!(snapshot.status, UpdateStatus::Fail);
    assert_eq!(snapshot.failed, snapshot.task_count);
    assert_eq!(snapshot.progress, 0.0);
}

#[tokio::test]
async fn missing_start_page_aborts_cutover() {
    let fx = Fixture::with_start_page("app/main.html");
    let source = FakeSource::new();
    publish_v2(&source, "now", "now");
    let mut engine = fx.engine(&source);
    let before = engine.active_root().to_path_buf();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let check = engine.check_for_update().await;
    let outcome = engine
        .run_update(check.session, RunOptions::default(), &CancellationToken::new(), &tx)
        .await
        .expect("run");

    let UpdateOutcome::Synced { snapshot, install } = outcome else {
        panic!("expected a sync outcome");
    };
    assert_eq!(snapshot.status, UpdateStatus::Success);
    assert!(matches!(install, Some(InstallOutcome::Aborted { .. })));
    assert_eq!(engine.active_root(), before.as_path());
    assert_eq!(engine.version_info().ready_install_version, Some(v(V2)));

    drop(tx);
    assert!(matches!(
        drain(&mut rx).last(),
        Some(UpdateEvent::Install {
            status: UpdateStatus::Success,
            outcome: InstallOutcome::Aborted { .. },
            ..
        })
    ));
}
