//! Context-menu extension point.
//!
//! Plugins register patches against a menu id (`"user-context"`, ...). When
//! the host builds that menu, each patch receives the item list built so far
//! and may append to or rearrange it. Patches run in registration order, each
//! behind the error boundary: a failing patch leaves the list as it was.

use crate::plugin::boundary::guard;
use crate::plugin::{PluginError, User};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Callback run when a menu item is chosen.
#[derive(Clone)]
pub struct MenuAction(Arc<dyn Fn() + Send + Sync>);

impl MenuAction {
    pub fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(action))
    }

    pub fn invoke(&self) {
        (self.0)()
    }
}

impl fmt::Debug for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MenuAction(..)")
    }
}

#[derive(Debug, Clone)]
pub enum MenuItem {
    Item {
        id: String,
        label: String,
        action: Option<MenuAction>,
    },
    Separator,
    Group(Vec<MenuItem>),
}

impl MenuItem {
    pub fn item(id: impl Into<String>, label: impl Into<String>, action: MenuAction) -> Self {
        MenuItem::Item {
            id: id.into(),
            label: label.into(),
            action: Some(action),
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            MenuItem::Item { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Find an item by id, descending into groups.
    pub fn find<'a>(items: &'a [MenuItem], id: &str) -> Option<&'a MenuItem> {
        items.iter().find_map(|item| match item {
            MenuItem::Item { id: item_id, .. } if item_id == id => Some(item),
            MenuItem::Group(children) => MenuItem::find(children, id),
            _ => None,
        })
    }
}

/// What the menu was opened on.
#[derive(Debug, Clone, Default)]
pub struct MenuContext {
    pub user: Option<User>,
}

pub trait ContextMenuPatch: Send + Sync {
    fn patch(&self, items: &mut Vec<MenuItem>, ctx: &MenuContext) -> Result<(), PluginError>;
}

impl<F> ContextMenuPatch for F
where
    F: Fn(&mut Vec<MenuItem>, &MenuContext) -> Result<(), PluginError> + Send + Sync,
{
    fn patch(&self, items: &mut Vec<MenuItem>, ctx: &MenuContext) -> Result<(), PluginError> {
        self(items, ctx)
    }
}

struct Registered {
    plugin: String,
    patch: Arc<dyn ContextMenuPatch>,
}

#[derive(Default)]
pub struct ContextMenuRegistry {
    patches: RwLock<BTreeMap<String, Vec<Registered>>>,
}

impl fmt::Debug for ContextMenuRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patches = self.patches.read();
        let counts: BTreeMap<&str, usize> = patches
            .iter()
            .map(|(menu, list)| (menu.as_str(), list.len()))
            .collect();
        f.debug_struct("ContextMenuRegistry")
            .field("patches", &counts)
            .finish()
    }
}

fn same_patch(a: &Arc<dyn ContextMenuPatch>, b: &Arc<dyn ContextMenuPatch>) -> bool {
    // Compare data pointers only; vtable pointers are not unique
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl ContextMenuRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_patch(&self, menu_id: &str, plugin: &str, patch: Arc<dyn ContextMenuPatch>) {
        self.patches
            .write()
            .entry(menu_id.to_string())
            .or_default()
            .push(Registered {
                plugin: plugin.to_string(),
                patch,
            });
    }

    /// Unregister `patch` from `menu_id`. Returns whether it was registered.
    pub fn remove_patch(&self, menu_id: &str, patch: &Arc<dyn ContextMenuPatch>) -> bool {
        let mut patches = self.patches.write();
        let Some(list) = patches.get_mut(menu_id) else {
            return false;
        };

        let before = list.len();
        list.retain(|registered| !same_patch(&registered.patch, patch));
        let removed = list.len() != before;
        if list.is_empty() {
            patches.remove(menu_id);
        }
        removed
    }

    pub fn patch_count(&self, menu_id: &str) -> usize {
        self.patches.read().get(menu_id).map_or(0, Vec::len)
    }

    /// Run every patch registered for `menu_id` over `items`.
    pub fn build(&self, menu_id: &str, items: Vec<MenuItem>, ctx: &MenuContext) -> Vec<MenuItem> {
        // Snapshot so a patch may open modals or touch the registry without deadlocking
        let patches: Vec<(String, Arc<dyn ContextMenuPatch>)> = self
            .patches
            .read()
            .get(menu_id)
            .map(|list| {
                list.iter()
                    .map(|r| (r.plugin.clone(), Arc::clone(&r.patch)))
                    .collect()
            })
            .unwrap_or_default();

        let mut items = items;
        for (plugin, patch) in patches {
            let mut working = items.clone();
            let patched = guard(&plugin, menu_id, || {
                patch.patch(&mut working, ctx)?;
                Ok(Some(working))
            });
            if let Some(patched) = patched {
                items = patched;
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append_item(items: &mut Vec<MenuItem>, _ctx: &MenuContext) -> Result<(), PluginError> {
        items.push(MenuItem::item("extra", "Extra", MenuAction::new(|| {})));
        Ok(())
    }

    #[test]
    fn test_add_and_remove_are_symmetric() {
        let registry = ContextMenuRegistry::new();
        let patch: Arc<dyn ContextMenuPatch> = Arc::new(append_item);
        let other: Arc<dyn ContextMenuPatch> = Arc::new(append_item);

        registry.add_patch("user-context", "A", Arc::clone(&patch));
        registry.add_patch("user-context", "B", Arc::clone(&other));
        assert_eq!(registry.patch_count("user-context"), 2);

        assert!(registry.remove_patch("user-context", &patch));
        assert!(!registry.remove_patch("user-context", &patch));
        assert_eq!(registry.patch_count("user-context"), 1);

        assert!(registry.remove_patch("user-context", &other));
        assert_eq!(registry.patch_count("user-context"), 0);
    }

    #[test]
    fn test_build_runs_patches_for_menu_only() {
        let registry = ContextMenuRegistry::new();
        registry.add_patch("user-context", "A", Arc::new(append_item));

        let built = registry.build("user-context", vec![MenuItem::Separator], &MenuContext::default());
        assert_eq!(built.len(), 2);
        assert!(MenuItem::find(&built, "extra").is_some());

        let untouched = registry.build("guild-context", Vec::new(), &MenuContext::default());
        assert!(untouched.is_empty());
    }

    #[test]
    fn test_failing_patch_leaves_items_unchanged() {
        let registry = ContextMenuRegistry::new();
        registry.add_patch(
            "user-context",
            "Broken",
            Arc::new(|items: &mut Vec<MenuItem>, _: &MenuContext| {
                items.clear();
                Err(PluginError::Render {
                    plugin: "Broken".to_string(),
                    message: "boom".to_string(),
                })
            }),
        );
        registry.add_patch("user-context", "A", Arc::new(append_item));

        let built = registry.build("user-context", vec![MenuItem::Separator], &MenuContext::default());
        assert_eq!(built.len(), 2);
    }
}
