//! Post-dynamics hooks.
//!
//! Hooks run once per tick, after the dynamics or kinematics update and
//! after the clock advances. The simulator installs its own hooks here
//! (external-force clearing, forced pose) next to any the host adds.

use std::fmt;

use crate::world::World;

/// Boxed hook body.
pub type PostDynamicsHook = Box<dyn FnMut(&mut World) + Send>;

/// Handle returned by [`PostDynamicsHooks::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

impl HookId {
    /// Raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Ordered hook registry. Hooks run in insertion order.
#[derive(Default)]
pub struct PostDynamicsHooks {
    next: u64,
    hooks: Vec<(HookId, PostDynamicsHook)>,
}

impl fmt::Debug for PostDynamicsHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|(id, _)| id))
            .finish()
    }
}

impl PostDynamicsHooks {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook.
    pub fn add<F>(&mut self, hook: F) -> HookId
    where
        F: FnMut(&mut World) + Send + 'static,
    {
        let id = HookId(self.next);
        self.next += 1;
        self.hooks.push((id, Box::new(hook)));
        id
    }

    /// Remove a hook. Returns false for an unknown id.
    pub fn remove(&mut self, id: HookId) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|(h, _)| *h != id);
        self.hooks.len() != before
    }

    /// Whether a hook is installed.
    #[must_use]
    pub fn contains(&self, id: HookId) -> bool {
        self.hooks.iter().any(|(h, _)| *h == id)
    }

    /// Number of installed hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// True when no hook is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook on `world`.
    pub fn run(&mut self, world: &mut World) {
        for (_, hook) in &mut self.hooks {
            hook(world);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_hooks_run_in_order_and_remove() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut hooks = PostDynamicsHooks::new();
        let c = Arc::clone(&calls);
        let first = hooks.add(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let c = Arc::clone(&calls);
        let second = hooks.add(move |_| {
            c.fetch_add(10, Ordering::SeqCst);
        });
        assert_ne!(first, second);

        let mut world = World::default();
        hooks.run(&mut world);
        assert_eq!(calls.load(Ordering::SeqCst), 11);

        assert!(hooks.remove(first));
        assert!(!hooks.remove(first));
        assert!(!hooks.contains(first));
        hooks.run(&mut world);
        assert_eq!(calls.load(Ordering::SeqCst), 21);
        assert_eq!(hooks.len(), 1);
    }
}
