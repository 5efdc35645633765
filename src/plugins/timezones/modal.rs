use crate::plugin::Modal;
use crate::plugins::timezones::format::TimezoneError;
use crate::plugins::timezones::store::TimezoneStore;
use std::any::Any;
use std::sync::Arc;

/// Dialog for picking (or clearing) one user's timezone.
#[derive(Debug)]
pub struct SetTimezoneModal {
    user_id: String,
    store: Arc<TimezoneStore>,
}

impl SetTimezoneModal {
    pub fn new(user_id: impl Into<String>, store: Arc<TimezoneStore>) -> Self {
        Self {
            user_id: user_id.into(),
            store,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The zone the picker starts on.
    pub fn current(&self) -> Option<String> {
        self.store.get(&self.user_id)
    }

    /// Every selectable IANA zone name.
    pub fn choices() -> impl Iterator<Item = &'static str> {
        chrono_tz::TZ_VARIANTS.iter().map(|tz| tz.name())
    }

    /// `None` clears the user's timezone.
    pub fn save(&self, timezone: Option<&str>) -> Result<(), TimezoneError> {
        self.store.set(&self.user_id, timezone)
    }
}

impl Modal for SetTimezoneModal {
    fn title(&self) -> String {
        "Timezones".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
