//! Save/apply/restore behaviour of the settings toggler against the in-memory store

use proxy_toggler_lib::core::sysproxy::toggler::{
    ENVIRONMENT_KEY, HTTP_PROXY, INTERNET_SETTINGS_KEY, PROXY_ENABLE, PROXY_OVERRIDE,
    PROXY_SERVER,
};
use proxy_toggler_lib::core::sysproxy::{
    Mechanism, MemorySettingsStore, MutationOp, PriorValue, RecordingNotifier, SettingsToggler,
    Snapshot, StoredValue, SysProxyError, ABSENCE_SENTINEL,
};
use std::sync::Arc;

fn toggler_over(store: &MemorySettingsStore) -> (SettingsToggler, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::new());
    let toggler = SettingsToggler::new(Arc::new(store.clone()), notifier.clone());
    (toggler, notifier)
}

fn string(v: &str) -> Option<StoredValue> {
    Some(StoredValue::String(v.to_string()))
}

#[test]
fn test_scenario_old_proxy_restored_and_override_stays_absent() {
    let store = MemorySettingsStore::with_proxy_keys();
    store.insert_u32(INTERNET_SETTINGS_KEY, PROXY_ENABLE, 0);
    store.insert_string(INTERNET_SETTINGS_KEY, PROXY_SERVER, "oldproxy:3128");
    let (mut toggler, _) = toggler_over(&store);
    let mut snap = Snapshot::new();

    toggler.enable_system_proxy(1080, &mut snap).unwrap();

    assert_eq!(store.value(INTERNET_SETTINGS_KEY, PROXY_ENABLE), Some(StoredValue::U32(1)));
    assert_eq!(store.value(INTERNET_SETTINGS_KEY, PROXY_SERVER), string("socks=127.0.0.1:1080"));
    assert_eq!(store.value(INTERNET_SETTINGS_KEY, PROXY_OVERRIDE), string("<local>"));
    assert_eq!(snap.proxy_enabled, 0);
    assert_eq!(snap.proxy_server_prior, PriorValue::Present("oldproxy:3128".into()));
    assert_eq!(snap.proxy_override_prior, PriorValue::Absent);

    toggler.disable_system_proxy(&snap).unwrap();

    assert_eq!(store.value(INTERNET_SETTINGS_KEY, PROXY_ENABLE), Some(StoredValue::U32(0)));
    assert_eq!(store.value(INTERNET_SETTINGS_KEY, PROXY_SERVER), string("oldproxy:3128"));
    assert!(!store.contains(INTERNET_SETTINGS_KEY, PROXY_OVERRIDE));
}

#[test]
fn test_round_trip_with_present_values() {
    let store = MemorySettingsStore::with_proxy_keys();
    store.insert_u32(INTERNET_SETTINGS_KEY, PROXY_ENABLE, 1);
    store.insert_string(INTERNET_SETTINGS_KEY, PROXY_SERVER, "http=corp:80;https=corp:443");
    store.insert_string(INTERNET_SETTINGS_KEY, PROXY_OVERRIDE, "*.corp;<local>");
    let (mut toggler, _) = toggler_over(&store);
    let mut snap = Snapshot::new();

    toggler.enable_system_proxy(8080, &mut snap).unwrap();
    assert_eq!(store.value(INTERNET_SETTINGS_KEY, PROXY_SERVER), string("socks=127.0.0.1:8080"));
    toggler.disable_system_proxy(&snap).unwrap();

    assert_eq!(store.value(INTERNET_SETTINGS_KEY, PROXY_ENABLE), Some(StoredValue::U32(1)));
    assert_eq!(
        store.value(INTERNET_SETTINGS_KEY, PROXY_SERVER),
        string("http=corp:80;https=corp:443")
    );
    assert_eq!(store.value(INTERNET_SETTINGS_KEY, PROXY_OVERRIDE), string("*.corp;<local>"));
}

#[test]
fn test_absent_server_deleted_not_emptied() {
    let store = MemorySettingsStore::with_proxy_keys();
    let (mut toggler, _) = toggler_over(&store);
    let mut snap = Snapshot::new();

    toggler.enable_system_proxy(1080, &mut snap).unwrap();
    assert!(store.contains(INTERNET_SETTINGS_KEY, PROXY_SERVER));
    toggler.disable_system_proxy(&snap).unwrap();

    assert!(!store.contains(INTERNET_SETTINGS_KEY, PROXY_SERVER));
    assert!(!store.contains(INTERNET_SETTINGS_KEY, PROXY_OVERRIDE));
}

#[test]
fn test_empty_string_restored_as_empty_string() {
    let store = MemorySettingsStore::with_proxy_keys();
    store.insert_string(INTERNET_SETTINGS_KEY, PROXY_SERVER, "");
    let (mut toggler, _) = toggler_over(&store);
    let mut snap = Snapshot::new();

    toggler.enable_system_proxy(1080, &mut snap).unwrap();
    toggler.disable_system_proxy(&snap).unwrap();

    assert_eq!(store.value(INTERNET_SETTINGS_KEY, PROXY_SERVER), string(""));
}

#[test]
fn test_value_equal_to_sentinel_text_is_rewritten_not_deleted() {
    // Known edge case: this value prints exactly like an absent one. The
    // snapshot keeps it as Present, so restore writes it back.
    let store = MemorySettingsStore::with_proxy_keys();
    store.insert_string(INTERNET_SETTINGS_KEY, PROXY_SERVER, ABSENCE_SENTINEL);
    let (mut toggler, _) = toggler_over(&store);
    let mut snap = Snapshot::new();

    toggler.enable_system_proxy(1080, &mut snap).unwrap();
    assert_eq!(snap.proxy_server_prior.to_string(), PriorValue::Absent.to_string());
    assert_eq!(snap.proxy_server_prior, PriorValue::Present(ABSENCE_SENTINEL.into()));

    toggler.disable_system_proxy(&snap).unwrap();
    assert_eq!(store.value(INTERNET_SETTINGS_KEY, PROXY_SERVER), string(ABSENCE_SENTINEL));
}

#[test]
fn test_open_failure_on_enable_makes_no_writes() {
    let store = MemorySettingsStore::with_proxy_keys();
    store.insert_string(INTERNET_SETTINGS_KEY, PROXY_SERVER, "oldproxy:3128");
    store.deny_access(INTERNET_SETTINGS_KEY);
    let (mut toggler, notifier) = toggler_over(&store);
    let mut snap = Snapshot::new();
    let before = store.mutation_count();

    let err = toggler.enable_system_proxy(1080, &mut snap).unwrap_err();

    assert!(matches!(
        err,
        SysProxyError::StoreUnavailable { mechanism: Mechanism::SystemProxy, .. }
    ));
    assert_eq!(store.mutation_count(), before);
    assert_eq!(snap, Snapshot::new());
    assert!(!toggler.is_active(Mechanism::SystemProxy));
    assert_eq!(notifier.refresh_count(), 0);
}

#[test]
fn test_open_failure_on_env_enable_skips_broadcast() {
    let store = MemorySettingsStore::with_proxy_keys();
    store.deny_access(ENVIRONMENT_KEY);
    let (mut toggler, notifier) = toggler_over(&store);
    let mut snap = Snapshot::new();

    let err = toggler.enable_env_proxy(1080, &mut snap).unwrap_err();
    assert_eq!(err.category(), "store_unavailable");
    assert!(notifier.topics().is_empty());
}

#[test]
fn test_missing_key_is_store_unavailable() {
    let store = MemorySettingsStore::new();
    let (mut toggler, _) = toggler_over(&store);
    let mut snap = Snapshot::new();
    assert!(matches!(
        toggler.enable_system_proxy(1080, &mut snap),
        Err(SysProxyError::StoreUnavailable { .. })
    ));
}

#[test]
fn test_open_failure_on_restore_is_reported_and_stays_active() {
    let store = MemorySettingsStore::with_proxy_keys();
    let (mut toggler, _) = toggler_over(&store);
    let mut snap = Snapshot::new();
    toggler.enable_system_proxy(1080, &mut snap).unwrap();

    store.deny_access(INTERNET_SETTINGS_KEY);
    let err = toggler.disable_system_proxy(&snap).unwrap_err();
    assert!(matches!(err, SysProxyError::StoreUnavailable { .. }));
    assert!(toggler.is_active(Mechanism::SystemProxy));

    store.allow_access(INTERNET_SETTINGS_KEY);
    toggler.disable_system_proxy(&snap).unwrap();
    assert!(!store.contains(INTERNET_SETTINGS_KEY, PROXY_SERVER));
}

#[test]
fn test_second_enable_rejected_and_snapshot_preserved() {
    let store = MemorySettingsStore::with_proxy_keys();
    store.insert_string(INTERNET_SETTINGS_KEY, PROXY_SERVER, "oldproxy:3128");
    let (mut toggler, _) = toggler_over(&store);
    let mut snap = Snapshot::new();

    toggler.enable_system_proxy(1080, &mut snap).unwrap();
    let err = toggler.enable_system_proxy(1080, &mut snap).unwrap_err();

    assert_eq!(err, SysProxyError::AlreadyActive(Mechanism::SystemProxy));
    // true original survives
    assert_eq!(snap.proxy_server_prior, PriorValue::Present("oldproxy:3128".into()));

    toggler.disable_system_proxy(&snap).unwrap();
    assert_eq!(store.value(INTERNET_SETTINGS_KEY, PROXY_SERVER), string("oldproxy:3128"));
}

#[test]
fn test_disable_without_enable_rejected() {
    let store = MemorySettingsStore::with_proxy_keys();
    let (mut toggler, notifier) = toggler_over(&store);
    let snap = Snapshot::new();

    assert_eq!(
        toggler.disable_system_proxy(&snap).unwrap_err(),
        SysProxyError::NotActive(Mechanism::SystemProxy)
    );
    assert_eq!(
        toggler.disable_env_proxy(&snap).unwrap_err(),
        SysProxyError::NotActive(Mechanism::EnvProxy)
    );
    assert_eq!(store.mutation_count(), 0);
    assert!(notifier.topics().is_empty());
}

#[test]
fn test_disable_consumes_snapshot_once() {
    let store = MemorySettingsStore::with_proxy_keys();
    let (mut toggler, _) = toggler_over(&store);
    let mut snap = Snapshot::new();
    toggler.enable_env_proxy(1080, &mut snap).unwrap();
    toggler.disable_env_proxy(&snap).unwrap();
    assert!(matches!(
        toggler.disable_env_proxy(&snap),
        Err(SysProxyError::NotActive(Mechanism::EnvProxy))
    ));
}

#[test]
fn test_write_failures_aggregated_on_enable() {
    let store = MemorySettingsStore::with_proxy_keys();
    store.fail_mutations_of(PROXY_SERVER);
    store.fail_mutations_of(PROXY_OVERRIDE);
    let (mut toggler, _) = toggler_over(&store);
    let mut snap = Snapshot::new();

    let err = toggler.enable_system_proxy(1080, &mut snap).unwrap_err();
    match &err {
        SysProxyError::MutationsFailed { mechanism, failures } => {
            assert_eq!(*mechanism, Mechanism::SystemProxy);
            let names: Vec<_> = failures.iter().map(|f| f.value_name.as_str()).collect();
            assert_eq!(names, vec![PROXY_SERVER, PROXY_OVERRIDE]);
            assert!(failures.iter().all(|f| f.op == MutationOp::Set));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // the write that succeeded still landed, so the toggle is live
    assert_eq!(store.value(INTERNET_SETTINGS_KEY, PROXY_ENABLE), Some(StoredValue::U32(1)));
    assert!(toggler.is_active(Mechanism::SystemProxy));

    store.clear_failures();
    toggler.disable_system_proxy(&snap).unwrap();
    assert_eq!(store.value(INTERNET_SETTINGS_KEY, PROXY_ENABLE), Some(StoredValue::U32(0)));
}

#[test]
fn test_restore_failures_reported_and_rest_still_restored() {
    let store = MemorySettingsStore::with_proxy_keys();
    store.insert_string(INTERNET_SETTINGS_KEY, PROXY_SERVER, "oldproxy:3128");
    let (mut toggler, _) = toggler_over(&store);
    let mut snap = Snapshot::new();
    toggler.enable_system_proxy(1080, &mut snap).unwrap();

    store.fail_mutations_of(PROXY_OVERRIDE);
    let err = toggler.disable_system_proxy(&snap).unwrap_err();
    match err {
        SysProxyError::MutationsFailed { failures, .. } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].value_name, PROXY_OVERRIDE);
            assert_eq!(failures[0].op, MutationOp::Delete);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(store.value(INTERNET_SETTINGS_KEY, PROXY_SERVER), string("oldproxy:3128"));
    assert!(!toggler.is_active(Mechanism::SystemProxy));
}

#[test]
fn test_env_round_trip_absent() {
    let store = MemorySettingsStore::with_proxy_keys();
    let (mut toggler, notifier) = toggler_over(&store);
    let mut snap = Snapshot::new();

    toggler.enable_env_proxy(9050, &mut snap).unwrap();
    assert_eq!(store.value(ENVIRONMENT_KEY, HTTP_PROXY), string("socks://127.0.0.1:9050"));
    assert!(snap.http_proxy_env_prior.is_absent());

    toggler.disable_env_proxy(&snap).unwrap();
    assert!(!store.contains(ENVIRONMENT_KEY, HTTP_PROXY));
    assert_eq!(notifier.topics(), vec!["ENVIRONMENT", "ENVIRONMENT"]);
}

#[test]
fn test_handles_released_on_every_path() {
    let store = MemorySettingsStore::with_proxy_keys();
    let (mut toggler, _) = toggler_over(&store);
    let mut snap = Snapshot::new();

    toggler.enable_system_proxy(1080, &mut snap).unwrap();
    toggler.enable_env_proxy(1080, &mut snap).unwrap();
    assert_eq!(store.open_handles(), 0);

    store.fail_mutations_of(HTTP_PROXY);
    let _ = toggler.disable_env_proxy(&snap);
    assert_eq!(store.open_handles(), 0);

    store.deny_access(INTERNET_SETTINGS_KEY);
    let _ = toggler.disable_system_proxy(&snap);
    assert_eq!(store.open_handles(), 0);
}
