mod common;

use chrono::{Duration, Utc};
use common::{expired_session, harness, harness_with_refresher, session, FakeRefresher};
use credential_storage::{AuthStateChanged, Backend, Provider, Session};
use session_sync::{parse_redirect, AuthError, AuthService, ReconcileOutcome, RefreshConfig};
use std::sync::atomic::Ordering;
use sync_config_and_utils::{Config, Paths};
use tempfile::TempDir;

#[tokio::test]
async fn sign_out_clears_both_backends() {
    let h = harness();
    h.service.sign_in(session("A", 100)).await.unwrap();
    assert_eq!(h.service.reconcile().await, ReconcileOutcome::SyncedToLocal);
    assert!(h.store.read_remote().await.is_some());

    h.service.sign_out().await.unwrap();

    assert_eq!(h.store.read_local().await, None);
    assert_eq!(h.store.read_remote().await, None);
    assert!(!h.service.is_authenticated().await);
    assert_eq!(h.service.current_session().await, None);
    assert_eq!(h.dump(), (vec![], vec![]));
}

#[tokio::test]
async fn sign_in_rejects_empty_token_or_subject() {
    let h = harness();

    let no_token = Session::new("u1", "", Provider::Google, Utc::now());
    assert!(matches!(
        h.service.sign_in(no_token).await,
        Err(AuthError::InvalidSession(_))
    ));

    let no_subject = Session::new("  ", "A", Provider::Google, Utc::now());
    assert!(matches!(
        h.service.sign_in(no_subject).await,
        Err(AuthError::InvalidSession(_))
    ));

    assert_eq!(h.store.read_local().await, None);
}

#[tokio::test]
async fn redirect_sign_in_then_reconcile_reaches_the_web_app() {
    let h = harness();
    let session = parse_redirect(
        "https://ext.invalid/callback#access_token=A&refresh_token=R&user_id=u1&expires_in=3600",
        Utc::now(),
    )
    .unwrap();

    h.service.sign_in(session.clone()).await.unwrap();
    assert!(h.service.is_authenticated().await);
    assert_eq!(h.service.current_session().await, Some(session.clone()));

    assert_eq!(h.service.reconcile().await, ReconcileOutcome::SyncedToLocal);
    assert_eq!(h.store.read_remote().await, Some(session));
}

#[tokio::test]
async fn auth_state_events_follow_presence() {
    let h = harness();
    let mut events = h.service.subscribe();

    h.service.sign_in(session("A", 100)).await.unwrap();
    h.service.reconcile().await;
    h.service.sign_out().await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    let signed_in = |backend| AuthStateChanged {
        backend,
        authenticated: true,
        subject: Some("u1".to_string()),
    };
    let signed_out = |backend| AuthStateChanged {
        backend,
        authenticated: false,
        subject: None,
    };

    assert_eq!(received.len(), 4);
    assert_eq!(received[0], signed_in(Backend::Local));
    assert_eq!(received[1], signed_in(Backend::Remote));
    assert!(received[2..].contains(&signed_out(Backend::Local)));
    assert!(received[2..].contains(&signed_out(Backend::Remote)));
}

#[tokio::test]
async fn refresh_local_replaces_expired_token() {
    let h = harness_with_refresher(FakeRefresher::succeeding("A2"));
    h.store
        .write_local(Some(&expired_session("A", 100).with_refresh_token("R")))
        .await;
    assert!(!h.service.is_authenticated().await);

    let refreshed = h.service.refresh_local().await.unwrap();
    assert_eq!(refreshed.access_token, "A2");
    assert_eq!(refreshed.refresh_token.as_deref(), Some("R2"));
    assert!(refreshed.expires_at.unwrap() > Utc::now() + Duration::minutes(59));
    assert!(refreshed.updated_at.timestamp_millis() > 100);

    assert_eq!(h.store.read_local().await, Some(refreshed));
    assert!(h.service.is_authenticated().await);
}

#[tokio::test]
async fn refresh_local_leaves_live_session_alone() {
    let h = harness_with_refresher(FakeRefresher::succeeding("A2"));
    let live = session("A", 100).with_refresh_token("R");
    h.store.write_local(Some(&live)).await;

    assert_eq!(h.service.refresh_local().await.unwrap(), live);
    assert_eq!(h.refresher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_refresh_clears_local_session() {
    let h = harness();
    h.store
        .write_local(Some(&expired_session("A", 100).with_refresh_token("R")))
        .await;

    let service = h.service.with_refresh_config(RefreshConfig {
        max_retries: 1,
        ..RefreshConfig::default()
    });
    assert!(matches!(
        service.refresh_local().await,
        Err(AuthError::TokenRefresh(_))
    ));
    assert_eq!(h.store.read_local().await, None);
}

#[tokio::test]
async fn out_of_range_refresh_expiry_is_an_error() {
    let refresher = FakeRefresher::succeeding("A2");
    refresher.result.lock().unwrap().as_mut().unwrap().expires_in = Some(i64::MAX);
    let h = harness_with_refresher(refresher);
    let expired = expired_session("A", 100).with_refresh_token("R");
    h.store.write_local(Some(&expired)).await;

    assert!(matches!(
        h.service.refresh_local().await,
        Err(AuthError::TokenRefresh(ref msg)) if msg == "invalid expires_in"
    ));
    assert_eq!(h.store.read_local().await, Some(expired));
}

#[tokio::test]
async fn refresh_local_without_refresh_token_or_session() {
    let h = harness();
    assert!(matches!(
        h.service.refresh_local().await,
        Err(AuthError::NotLoggedIn)
    ));

    h.store.write_local(Some(&expired_session("A", 100))).await;
    assert!(matches!(
        h.service.refresh_local().await,
        Err(AuthError::SessionExpired)
    ));
}

#[tokio::test]
async fn file_backed_service_persists_both_copies() {
    let dir = TempDir::new().unwrap();
    let paths = Paths::with_base_dir(dir.path().to_path_buf());
    let config = Config::default();

    let session = Session::new("u1", "A", Provider::Password, Utc::now())
        .with_email("u1@example.com")
        .with_expires_at(Utc::now() + Duration::hours(1));

    let service = AuthService::from_config(&config, &paths).unwrap();
    service.sign_in(session.clone()).await.unwrap();
    assert_eq!(service.reconcile().await, ReconcileOutcome::SyncedToLocal);
    assert!(paths.local_store_file().exists());
    assert!(paths.cookie_file().exists());

    let reopened = AuthService::from_config(&config, &paths).unwrap();
    assert_eq!(reopened.store().read_local().await, Some(session.clone()));
    assert_eq!(reopened.store().read_remote().await, Some(session));
    assert_eq!(reopened.reconcile().await, ReconcileOutcome::AlreadyInSync);

    reopened.sign_out().await.unwrap();
    assert!(!service.is_authenticated().await);
}

#[tokio::test]
async fn load_reads_sync_settings_from_config_file() {
    let dir = TempDir::new().unwrap();
    let paths = Paths::with_base_dir(dir.path().to_path_buf());
    let config = Config {
        reconcile_interval_secs: 15,
        ..Config::default()
    };
    config.save(&paths).unwrap();

    let service = AuthService::load(&paths).unwrap();
    assert_eq!(service.sync_interval(), std::time::Duration::from_secs(15));
    assert!(!service.is_authenticated().await);
}
