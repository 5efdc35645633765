//! Timezone: shows the local time of users in profiles and message headers.

pub mod format;
pub mod modal;
pub mod store;
pub mod timestamp;

pub use format::{get_time, DateStyle, FormatOptions, Locale, Preset, TimeStyle, TimezoneError};
pub use modal::SetTimezoneModal;
pub use store::{TimezoneStore, DATASTORE_KEY};
pub use timestamp::{next_refresh_delay, MountedTimestamp, RenderedTimestamp, TimestampKind, TimestampStyle};

use crate::config::{HostConfig, Matcher, PatchDescriptor, ReplacementRule};
use crate::plugin::{
    ContextMenuPatch, DataStore, HostServices, MenuAction, MenuContext, MenuItem, Plugin,
    PluginError, PluginMeta, SettingsDefinition, SettingsStore, User,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use timestamp::render_timestamp;

pub const NAME: &str = "Timezone";
pub const USER_CONTEXT_MENU: &str = "user-context";
pub const SET_TIMEZONE_ITEM: &str = "set-timezone";

pub const SETTING_24H: &str = "24h Time";
pub const SETTING_MESSAGE_TIME: &str = "showMessageHeaderTime";
pub const SETTING_PROFILE_TIME: &str = "showProfileTime";

pub const PROFILE_HOOK: &str = "renderProfileTimezone";
pub const MESSAGE_HOOK: &str = "renderMessageTimezone";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileProps {
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageProps {
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub author: User,
    pub timestamp: DateTime<Utc>,
}

fn settings_definition() -> SettingsDefinition {
    SettingsDefinition::new()
        .boolean(SETTING_24H, "Show time in 24h format", true)
        .boolean(SETTING_MESSAGE_TIME, "Show time in message headers", true)
        .boolean(SETTING_PROFILE_TIME, "Show time in profiles", true)
}

fn patches() -> Vec<PatchDescriptor> {
    let profile = |find: &str| {
        PatchDescriptor::new(
            find,
            vec![ReplacementRule::new(
                Matcher::regex(r"(hasProfileEffect.+?)children:\["),
                "$&$self.renderProfileTimezone(arguments[0]),",
            )],
        )
    };

    vec![
        profile(".NITRO_BANNER,"),
        profile("=!1,canUsePremiumCustomization:"),
        PatchDescriptor::new(
            r#""Message Username""#,
            vec![ReplacementRule::new(
                Matcher::regex(r"(isVisibleOnlyOnHover.+?)id:.{1,11},timestamp.{1,50}}\),"),
                "$&,$self.renderMessageTimezone(arguments[0]),",
            )],
        ),
    ]
}

pub struct Timezones {
    meta: PluginMeta,
    settings: Arc<SettingsStore>,
    store: Arc<TimezoneStore>,
    locale: Locale,
    host_class: Option<String>,
    menu_patch: Mutex<Option<Arc<dyn ContextMenuPatch>>>,
}

impl Timezones {
    pub fn new(datastore: Arc<dyn DataStore>, locale: Locale) -> Self {
        Self {
            meta: PluginMeta::new(
                NAME,
                "Shows the local time of users in profiles and message headers",
                &["Aria"],
            ),
            settings: Arc::new(SettingsStore::new(settings_definition())),
            store: TimezoneStore::new(datastore),
            locale,
            host_class: None,
            menu_patch: Mutex::new(None),
        }
    }

    pub fn from_config(config: &HostConfig, datastore: Arc<dyn DataStore>) -> Self {
        let mut plugin = Self::new(datastore, Locale::from_tag(&config.locale));
        plugin.host_class = config.message_timestamp_class.clone();
        plugin
    }

    pub fn store(&self) -> &Arc<TimezoneStore> {
        &self.store
    }

    pub fn style(&self) -> TimestampStyle {
        timestamp_style(&self.settings, self.locale, self.host_class.clone())
    }

    /// Format `instant` in `timezone` with the current hour-cycle setting.
    pub fn get_time(
        &self,
        timezone: &str,
        instant: DateTime<Utc>,
        preset: Preset,
    ) -> Result<String, TimezoneError> {
        let style = self.style();
        get_time(timezone, instant, preset.options(), style.hour12, style.locale)
    }

    pub fn render_profile_timezone(
        &self,
        props: &ProfileProps,
        now: DateTime<Utc>,
    ) -> Result<Option<RenderedTimestamp>, TimezoneError> {
        if !self.settings.get_bool(SETTING_PROFILE_TIME) {
            return Ok(None);
        }
        let Some(user) = props.user.as_ref().filter(|u| !u.id.is_empty()) else {
            return Ok(None);
        };
        self.render_for(&user.id, TimestampKind::Profile, now)
    }

    pub fn render_message_timezone(
        &self,
        props: &MessageProps,
    ) -> Result<Option<RenderedTimestamp>, TimezoneError> {
        if !self.settings.get_bool(SETTING_MESSAGE_TIME) {
            return Ok(None);
        }
        let Some(message) = props.message.as_ref() else {
            return Ok(None);
        };
        self.render_for(&message.author.id, TimestampKind::Message, message.timestamp)
    }

    fn render_for(
        &self,
        user_id: &str,
        kind: TimestampKind,
        instant: DateTime<Utc>,
    ) -> Result<Option<RenderedTimestamp>, TimezoneError> {
        match self.store.get(user_id) {
            Some(timezone) => render_timestamp(&timezone, kind, instant, &self.style()).map(Some),
            None => Ok(None),
        }
    }

    /// Mount a self-refreshing profile timestamp. Needs a tokio runtime.
    pub fn mount_profile_timestamp(&self, user_id: &str) -> MountedTimestamp {
        let settings = Arc::clone(&self.settings);
        let (locale, host_class) = (self.locale, self.host_class.clone());
        MountedTimestamp::mount(Arc::clone(&self.store), user_id.to_string(), move || {
            timestamp_style(&settings, locale, host_class.clone())
        })
    }

    fn user_context_patch(&self, services: &HostServices) -> Arc<dyn ContextMenuPatch> {
        let store = Arc::clone(&self.store);
        let modals = Arc::clone(&services.modals);

        Arc::new(
            move |items: &mut Vec<MenuItem>, ctx: &MenuContext| -> Result<(), PluginError> {
                let Some(user) = ctx.user.as_ref() else {
                    return Ok(());
                };

                let (store, modals, user_id) =
                    (Arc::clone(&store), Arc::clone(&modals), user.id.clone());
                let action = MenuAction::new(move || {
                    modals.open_modal(Box::new(SetTimezoneModal::new(
                        user_id.clone(),
                        Arc::clone(&store),
                    )));
                });

                items.push(MenuItem::Separator);
                items.push(MenuItem::item(SET_TIMEZONE_ITEM, "Set Timezone", action));
                Ok(())
            },
        )
    }
}

fn timestamp_style(
    settings: &SettingsStore,
    locale: Locale,
    host_class: Option<String>,
) -> TimestampStyle {
    TimestampStyle {
        hour12: !settings.get_bool(SETTING_24H),
        locale,
        host_class,
    }
}

fn parse_props<T: DeserializeOwned + Default>(hook: &str, props: &Value) -> Result<T, PluginError> {
    if props.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(props.clone()).map_err(|e| PluginError::InvalidProps {
        plugin: NAME.to_string(),
        hook: hook.to_string(),
        message: e.to_string(),
    })
}

fn render_error(e: TimezoneError) -> PluginError {
    PluginError::Render {
        plugin: NAME.to_string(),
        message: e.to_string(),
    }
}

impl Plugin for Timezones {
    fn meta(&self) -> &PluginMeta {
        &self.meta
    }

    fn patches(&self) -> Vec<PatchDescriptor> {
        patches()
    }

    fn settings(&self) -> Option<&SettingsStore> {
        Some(self.settings.as_ref())
    }

    fn start(&self, services: &HostServices) -> Result<(), PluginError> {
        self.store.spawn_load();

        let patch = self.user_context_patch(services);
        services
            .context_menus
            .add_patch(USER_CONTEXT_MENU, NAME, Arc::clone(&patch));
        *self.menu_patch.lock() = Some(patch);
        Ok(())
    }

    fn stop(&self, services: &HostServices) -> Result<(), PluginError> {
        if let Some(patch) = self.menu_patch.lock().take() {
            services.context_menus.remove_patch(USER_CONTEXT_MENU, &patch);
        }
        Ok(())
    }

    fn render(&self, hook: &str, props: &Value) -> Result<Option<Value>, PluginError> {
        let rendered = match hook {
            PROFILE_HOOK => {
                let props: ProfileProps = parse_props(hook, props)?;
                self.render_profile_timezone(&props, Utc::now())
            }
            MESSAGE_HOOK => {
                let props: MessageProps = parse_props(hook, props)?;
                self.render_message_timezone(&props)
            }
            _ => {
                return Err(PluginError::UnknownHook {
                    plugin: NAME.to_string(),
                    hook: hook.to_string(),
                })
            }
        }
        .map_err(render_error)?;

        rendered
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| PluginError::Render {
                plugin: NAME.to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::apply_rule;
    use crate::plugin::{MemoryStore, ModalStack};
    use chrono::TimeZone;
    use serde_json::json;

    fn plugin() -> Timezones {
        let plugin = Timezones::new(Arc::new(MemoryStore::new()), Locale::EnUs);
        plugin.store().load().unwrap();
        plugin
    }

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            username: "someone".to_string(),
        }
    }

    #[test]
    fn test_settings_defaults() {
        let plugin = plugin();
        let settings = plugin.settings().unwrap();
        assert!(settings.get_bool(SETTING_24H));
        assert!(settings.get_bool(SETTING_MESSAGE_TIME));
        assert!(settings.get_bool(SETTING_PROFILE_TIME));
        assert_eq!(settings.definition().options().len(), 3);
    }

    #[test]
    fn test_profile_render_at_known_instant() {
        let plugin = plugin();
        plugin.settings.set(SETTING_24H, json!(false)).unwrap();
        plugin.store().set("1", Some("America/New_York")).unwrap();

        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 17, 30, 0).unwrap();
        let rendered = plugin
            .render_profile_timezone(&ProfileProps { user: Some(user("1")) }, instant)
            .unwrap()
            .unwrap();
        assert_eq!(rendered.tooltip, "Monday, January 15, 2024 12:30 PM");
        assert_eq!(rendered.text, "1/15/24 12:30 PM");
    }

    #[test]
    fn test_render_is_gated_and_null_guarded() {
        let plugin = plugin();
        plugin.store().set("1", Some("UTC")).unwrap();
        let now = Utc::now();

        assert_eq!(plugin.render_profile_timezone(&ProfileProps::default(), now).unwrap(), None);
        assert_eq!(plugin.render_message_timezone(&MessageProps::default()).unwrap(), None);
        // No timezone stored for this user
        assert_eq!(
            plugin
                .render_profile_timezone(&ProfileProps { user: Some(user("2")) }, now)
                .unwrap(),
            None
        );

        plugin.settings.set(SETTING_PROFILE_TIME, json!(false)).unwrap();
        assert_eq!(
            plugin
                .render_profile_timezone(&ProfileProps { user: Some(user("1")) }, now)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_render_hook_dispatch() {
        let plugin = plugin();
        plugin.store().set("9", Some("Europe/London")).unwrap();

        let props = json!({
            "message": {
                "author": { "id": "9" },
                "timestamp": "2024-01-15T20:05:00Z"
            }
        });
        let rendered = plugin.render(MESSAGE_HOOK, &props).unwrap().unwrap();
        assert_eq!(rendered["text"], json!("(1/15/24 20:05)"));
        assert_eq!(rendered["className"], json!("timezone-message-item"));

        assert_eq!(plugin.render(MESSAGE_HOOK, &Value::Null).unwrap(), None);
        assert!(matches!(
            plugin.render(MESSAGE_HOOK, &json!({"message": 5})),
            Err(PluginError::InvalidProps { .. })
        ));
        assert!(matches!(
            plugin.render("renderNothing", &Value::Null),
            Err(PluginError::UnknownHook { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mounted_timestamp_follows_hour_setting() {
        let plugin = plugin();
        plugin.store().set("9", Some("UTC")).unwrap();

        let mounted = plugin.mount_profile_timestamp("9");
        let mut rx = mounted.subscribe();
        rx.changed().await.unwrap();
        let before = mounted.current().unwrap();
        assert!(!before.text.contains('M'), "{}", before.text);

        plugin.settings.set(SETTING_24H, json!(false)).unwrap();
        tokio::time::advance(std::time::Duration::from_secs(62)).await;
        rx.changed().await.unwrap();

        let after = mounted.current().unwrap();
        assert!(
            after.text.ends_with(" AM") || after.text.ends_with(" PM"),
            "{}",
            after.text
        );
    }

    #[test]
    fn test_context_menu_lifecycle() {
        let plugin = plugin();
        let modals = Arc::new(ModalStack::new());
        let services = HostServices {
            modals: modals.clone(),
            ..HostServices::in_memory()
        };

        plugin.start(&services).unwrap();
        assert_eq!(services.context_menus.patch_count(USER_CONTEXT_MENU), 1);

        // No target user: nothing appended
        let items = services
            .context_menus
            .build(USER_CONTEXT_MENU, Vec::new(), &MenuContext::default());
        assert!(items.is_empty());

        let ctx = MenuContext { user: Some(user("5")) };
        let items = services.context_menus.build(USER_CONTEXT_MENU, Vec::new(), &ctx);
        assert!(matches!(items[0], MenuItem::Separator));
        let Some(MenuItem::Item { label, action: Some(action), .. }) =
            MenuItem::find(&items, SET_TIMEZONE_ITEM)
        else {
            panic!("set-timezone item missing");
        };
        assert_eq!(label, "Set Timezone");

        action.invoke();
        let (_, modal) = modals.top().unwrap();
        let modal = modal.as_any().downcast_ref::<SetTimezoneModal>().unwrap();
        assert_eq!(modal.user_id(), "5");

        plugin.stop(&services).unwrap();
        assert_eq!(services.context_menus.patch_count(USER_CONTEXT_MENU), 0);
    }

    #[test]
    fn test_profile_patch_injects_render_call() {
        let source = r#"{hasProfileEffect:e,foo:1,children:[a,b]}"#;
        let rule = &patches()[0].replacement[0];
        let applied = apply_rule(source, rule, r#"Vencord.Plugins.plugins["Timezone"]"#).unwrap();
        assert_eq!(
            applied.text,
            r#"{hasProfileEffect:e,foo:1,children:[Vencord.Plugins.plugins["Timezone"].renderProfileTimezone(arguments[0]),a,b]}"#
        );
    }

    #[test]
    fn test_message_patch_injects_render_call() {
        let source = r#"isVisibleOnlyOnHover:!1,x:(0,r.jsx)(T,{id:(0,m.Z)(n),timestamp:n.timestamp}),rest"#;
        let rule = &patches()[2].replacement[0];
        let applied = apply_rule(source, rule, "P").unwrap();
        assert_eq!(
            applied.text,
            r#"isVisibleOnlyOnHover:!1,x:(0,r.jsx)(T,{id:(0,m.Z)(n),timestamp:n.timestamp}),,P.renderMessageTimezone(arguments[0]),rest"#
        );
    }
}
