//! Built-in plugins.

pub mod no_account_limit;
pub mod timezones;

pub use no_account_limit::NoAccountLimit;
pub use timezones::Timezones;

use crate::config::HostConfig;
use crate::plugin::{DataStore, Plugin};
use std::sync::Arc;

/// Every built-in plugin, in registration order.
pub fn builtin(config: &HostConfig, datastore: Arc<dyn DataStore>) -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(NoAccountLimit::new()),
        Arc::new(Timezones::from_config(config, datastore)),
    ]
}
