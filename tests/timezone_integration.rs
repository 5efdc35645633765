//! Integration tests for the Timezone plugin running inside the plugin manager

use bundle_patcher::plugin::{
    DataStore, HostServices, JsonFileStore, MenuContext, MenuItem, ModalHost, ModalStack,
    PluginManager, User,
};
use bundle_patcher::plugins::timezones::{
    self, SetTimezoneModal, Timezones, DATASTORE_KEY, MESSAGE_HOOK, PROFILE_HOOK,
    SET_TIMEZONE_ITEM, USER_CONTEXT_MENU,
};
use bundle_patcher::plugins::NoAccountLimit;
use bundle_patcher::HostConfig;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

struct Host {
    manager: PluginManager,
    modals: Arc<ModalStack>,
    timezones: Arc<Timezones>,
}

fn host(store_path: &Path, config: &HostConfig) -> Host {
    let datastore: Arc<dyn DataStore> = Arc::new(JsonFileStore::new(store_path));
    let modals = Arc::new(ModalStack::new());
    let services = HostServices {
        modals: modals.clone(),
        ..HostServices::new(Arc::clone(&datastore))
    };

    let timezones = Arc::new(Timezones::from_config(config, datastore));
    let mut manager = PluginManager::new(services);
    manager.register(Arc::new(NoAccountLimit::new())).unwrap();
    manager.register(timezones.clone()).unwrap();
    manager.apply_config(config).unwrap();

    Host {
        manager,
        modals,
        timezones,
    }
}

fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        username: format!("user{id}"),
    }
}

#[tokio::test]
async fn test_set_timezone_through_context_menu() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("datastore.json");
    let mut host = host(&store_path, &HostConfig::default());

    assert!(host.manager.start_all().is_empty());
    host.timezones.store().ready().await;

    let menus = Arc::clone(&host.manager.services().context_menus);
    let items = menus.build(
        USER_CONTEXT_MENU,
        Vec::new(),
        &MenuContext {
            user: Some(user("77")),
        },
    );
    let Some(MenuItem::Item {
        action: Some(action),
        ..
    }) = MenuItem::find(&items, SET_TIMEZONE_ITEM)
    else {
        panic!("Set Timezone item missing from {items:?}");
    };
    action.invoke();

    let (key, modal) = host.modals.top().unwrap();
    let modal = modal.as_any().downcast_ref::<SetTimezoneModal>().unwrap();
    assert_eq!(modal.user_id(), "77");
    modal.save(Some("America/New_York")).unwrap();
    assert!(host.modals.close_modal(key));

    // Persisted as one JSON object under one key
    let reopened = JsonFileStore::new(&store_path);
    assert_eq!(
        reopened.get(DATASTORE_KEY).unwrap(),
        Some(json!({"77": "America/New_York"}))
    );

    let rendered = host
        .manager
        .render(timezones::NAME, PROFILE_HOOK, &json!({"user": {"id": "77"}}))
        .unwrap();
    assert_eq!(rendered["className"], json!("timezone-profile-item"));
    assert_eq!(rendered["kind"], json!("profile"));

    host.manager.stop_all();
    assert_eq!(menus.patch_count(USER_CONTEXT_MENU), 0);
    assert_eq!(
        host.manager
            .render(timezones::NAME, PROFILE_HOOK, &json!({"user": {"id": "77"}})),
        None
    );
}

#[tokio::test]
async fn test_message_timestamp_uses_stored_zone_and_settings() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("datastore.json");
    JsonFileStore::new(&store_path)
        .set(DATASTORE_KEY, json!({"5": "America/New_York", "6": null}))
        .unwrap();

    let config = HostConfig::parse(
        r#"
message_timestamp_class = "timestamp_3ZpB"

[plugins.Timezone.settings]
"24h Time" = false
"#,
    )
    .unwrap();
    let mut host = host(&store_path, &config);
    host.manager.start_all();
    host.timezones.store().ready().await;

    let props = json!({
        "message": {
            "author": { "id": "5", "username": "five" },
            "timestamp": "2024-01-15T20:05:00Z"
        }
    });
    let rendered = host
        .manager
        .render(timezones::NAME, MESSAGE_HOOK, &props)
        .unwrap();
    assert_eq!(rendered["text"], json!("(1/15/24 3:05 PM)"));
    assert_eq!(
        rendered["className"],
        json!("timezone-message-item timestamp_3ZpB")
    );
    assert_eq!(rendered["tooltip"], json!("Monday, January 15, 2024 3:05 PM"));

    // Cleared entry renders nothing
    let cleared = json!({
        "message": { "author": { "id": "6" }, "timestamp": "2024-01-15T20:05:00Z" }
    });
    assert_eq!(
        host.manager.render(timezones::NAME, MESSAGE_HOOK, &cleared),
        None
    );

    // Switch to 24h: only the hour representation changes
    host.manager
        .set_setting(timezones::NAME, timezones::SETTING_24H, json!(true))
        .unwrap();
    let rendered = host
        .manager
        .render(timezones::NAME, MESSAGE_HOOK, &props)
        .unwrap();
    assert_eq!(rendered["text"], json!("(1/15/24 15:05)"));

    // Message headers can be turned off
    host.manager
        .set_setting(timezones::NAME, timezones::SETTING_MESSAGE_TIME, json!(false))
        .unwrap();
    assert_eq!(host.manager.render(timezones::NAME, MESSAGE_HOOK, &props), None);
}

#[tokio::test]
async fn test_reads_before_load_are_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("datastore.json");
    JsonFileStore::new(&store_path)
        .set(DATASTORE_KEY, json!({"1": "Asia/Tokyo"}))
        .unwrap();

    let host = host(&store_path, &HostConfig::default());
    let store = host.timezones.store();
    assert!(!store.is_ready());
    assert_eq!(store.get("1"), None);

    store.spawn_load().unwrap().await.unwrap();
    store.ready().await;
    assert_eq!(store.get("1").as_deref(), Some("Asia/Tokyo"));
}

#[tokio::test(start_paused = true)]
async fn test_mounted_profile_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("datastore.json");
    let host = host(&store_path, &HostConfig::default());
    let store = host.timezones.store();
    store.load().unwrap();
    store.set("9", Some("Europe/Berlin")).unwrap();

    let mounted = host.timezones.mount_profile_timestamp("9");
    let mut updates = mounted.subscribe();
    updates.changed().await.unwrap();

    let rendered = mounted.current().unwrap();
    assert_eq!(rendered.class_name, "timezone-profile-item");
    assert!(!rendered.tooltip.is_empty());

    drop(mounted);
    assert!(updates.changed().await.is_err());
}
