//! Identity backend authentication and pooling-flag behavior.

mod common;

use std::sync::Arc;

use idp_directory::{
    AuthMode, DirectoryError, DirectoryIdentityBackend, PoolRegistry,
};

use common::{test_config, FakeConnector, FakeDirectory};

fn backend_with(
    dir: &Arc<FakeDirectory>,
    use_pool: bool,
    use_auth_pool: bool,
) -> DirectoryIdentityBackend {
    let mut config = test_config(4);
    config.use_pool = use_pool;
    config.use_auth_pool = use_auth_pool;
    let registry = Arc::new(PoolRegistry::new(
        config,
        Arc::new(FakeConnector {
            dir: Arc::clone(dir),
        }),
    ));
    DirectoryIdentityBackend::new(registry)
}

#[tokio::test]
async fn authenticate_valid_user() {
    let dir = FakeDirectory::new();
    let dn = dir.add_user("jdoe", "hunter2");
    let backend = backend_with(&dir, true, true);

    let entry = backend.authenticate("jdoe", "hunter2").await.unwrap();
    assert_eq!(entry.dn, dn);
    assert_eq!(entry.first("uid"), Some("jdoe"));
}

#[tokio::test]
async fn authenticate_wrong_password() {
    let dir = FakeDirectory::new();
    dir.add_user("jdoe", "hunter2");
    let backend = backend_with(&dir, true, true);

    let err = backend.authenticate("jdoe", "wrong").await.unwrap_err();
    assert!(matches!(err, DirectoryError::InvalidCredentials));
}

#[tokio::test]
async fn authenticate_unknown_user() {
    let dir = FakeDirectory::new();
    let backend = backend_with(&dir, true, true);

    let err = backend.authenticate("ghost", "whatever").await.unwrap_err();
    assert!(matches!(err, DirectoryError::UserNotFound(_)));
}

#[tokio::test]
async fn get_user_returns_none_for_missing() {
    let dir = FakeDirectory::new();
    let backend = backend_with(&dir, true, true);

    assert!(backend.get_user("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn failed_end_user_bind_does_not_poison_admin_pool() {
    let dir = FakeDirectory::new();
    dir.add_user("jdoe", "hunter2");
    let backend = backend_with(&dir, true, true);

    for _ in 0..5 {
        let _ = backend.authenticate("jdoe", "wrong").await.unwrap_err();
    }
    // Admin lookups keep working after repeated end-user failures.
    let entry = backend.authenticate("jdoe", "hunter2").await.unwrap();
    assert_eq!(entry.first("uid"), Some("jdoe"));
}

#[tokio::test]
async fn unpooled_mode_opens_dedicated_sessions() {
    let dir = FakeDirectory::new();
    dir.add_user("jdoe", "hunter2");
    let backend = backend_with(&dir, false, false);

    let opened_before = dir.opened_count();
    backend.authenticate("jdoe", "hunter2").await.unwrap();
    backend.authenticate("jdoe", "hunter2").await.unwrap();

    // Every lookup and every bind opened a fresh session; none recycled.
    assert!(dir.opened_count() >= opened_before + 4);
}

#[tokio::test]
async fn auth_pool_flag_only_disables_end_user_pooling() {
    let dir = FakeDirectory::new();
    dir.add_user("jdoe", "hunter2");
    let backend = backend_with(&dir, true, false);

    backend.authenticate("jdoe", "hunter2").await.unwrap();
    let opened_after_first = dir.opened_count();
    backend.authenticate("jdoe", "hunter2").await.unwrap();

    // Admin session recycled; only the end-user bind opened a session.
    assert_eq!(dir.opened_count(), opened_after_first + 1);
}

#[tokio::test]
async fn acquire_connection_defaults_to_service_account() {
    let dir = FakeDirectory::new();
    let backend = backend_with(&dir, true, true);

    let lease = backend
        .acquire_connection(AuthMode::Admin, None)
        .await
        .unwrap();
    assert_eq!(lease.bound_dn(), Some(common::SERVICE_DN));
}
