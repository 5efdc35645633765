//! Error boundary for plugin-rendered components.
//!
//! Anything a plugin injects into the host's render path runs through
//! [`guard`]: an error or a panic renders nothing instead of propagating into
//! the host.

use crate::plugin::PluginError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

pub fn guard<T>(
    plugin: &str,
    component: &str,
    render: impl FnOnce() -> Result<Option<T>, PluginError>,
) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(render)) {
        Ok(Ok(rendered)) => rendered,
        Ok(Err(error)) => {
            warn!(plugin, component, %error, "component failed to render");
            None
        }
        Err(payload) => {
            warn!(
                plugin,
                component,
                panic = panic_message(payload.as_ref()),
                "component panicked while rendering"
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_passes_through_success() {
        assert_eq!(guard("P", "c", || Ok(Some(5))), Some(5));
        assert_eq!(guard::<i32>("P", "c", || Ok(None)), None);
    }

    #[test]
    fn test_guard_swallows_errors_and_panics() {
        let failed: Option<i32> = guard("P", "c", || {
            Err(PluginError::Render {
                plugin: "P".to_string(),
                message: "boom".to_string(),
            })
        });
        assert_eq!(failed, None);

        let panicked: Option<i32> = guard("P", "c", || panic!("boom"));
        assert_eq!(panicked, None);
    }
}
