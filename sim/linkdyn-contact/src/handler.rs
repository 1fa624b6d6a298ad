//! Named collision handlers.
//!
//! A material may name a handler. Before constraint rows are built for a
//! candidate whose material names a registered handler, the handler receives
//! the link pair, the culled points and the material. It may edit points or
//! material in place, and returns `false` to veto the pair entirely.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::contact::{ContactPoint, LinkRef};
use crate::material::ContactMaterial;

/// Thread-safe callback wrapper that implements Debug.
pub struct Callback<F: ?Sized>(pub Arc<F>);

impl<F: ?Sized> Clone for Callback<F> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<F: ?Sized> fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(<fn>)")
    }
}

/// Collision handler: `(link_a, link_b, points, material) -> keep`.
pub type CollisionHandler = Callback<
    dyn Fn(LinkRef, LinkRef, &mut Vec<ContactPoint>, &mut ContactMaterial) -> bool + Send + Sync,
>;

impl CollisionHandler {
    /// Wrap a closure as a handler.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(LinkRef, LinkRef, &mut Vec<ContactPoint>, &mut ContactMaterial) -> bool
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(f))
    }
}

/// Registry of handlers by name.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, CollisionHandler>,
}

impl HandlerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one with the same name.
    pub fn register(&mut self, name: impl Into<String>, handler: CollisionHandler) {
        self.handlers.insert(name.into(), handler);
    }

    /// Remove a handler. Returns `false` if the name is unknown.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    /// Look up a handler.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CollisionHandler> {
        self.handlers.get(name)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler named by `material`, if registered.
    ///
    /// Returns `false` when the handler vetoes the pair. Pairs without a
    /// registered handler are always kept.
    pub fn dispatch(
        &self,
        link_a: LinkRef,
        link_b: LinkRef,
        points: &mut Vec<ContactPoint>,
        material: &mut ContactMaterial,
    ) -> bool {
        let Some(name) = material.handler.clone() else {
            return true;
        };
        match self.handlers.get(&name) {
            Some(handler) => (handler.0)(link_a, link_b, points, material),
            None => true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};

    fn sample_points() -> Vec<ContactPoint> {
        vec![ContactPoint::new(Point3::origin(), Vector3::z(), 0.001)]
    }

    #[test]
    fn test_register_and_unregister() {
        let mut registry = HandlerRegistry::new();
        registry.register("veto", CollisionHandler::new(|_, _, _, _| false));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister("veto"));
        assert!(!registry.unregister("veto"));
        assert!(!registry.unregister("never-registered"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dispatch_veto_and_augment() {
        let mut registry = HandlerRegistry::new();
        registry.register("veto", CollisionHandler::new(|_, _, _, _| false));
        registry.register(
            "slippery",
            CollisionHandler::new(|_, _, points, material| {
                material.friction = 0.0;
                points.truncate(1);
                true
            }),
        );

        let a = LinkRef::new(0, 0);
        let b = LinkRef::new(1, 0);

        let mut material = ContactMaterial::default().handler("veto");
        assert!(!registry.dispatch(a, b, &mut sample_points(), &mut material));

        let mut material = ContactMaterial::with_friction(0.9).handler("slippery");
        let mut points = sample_points();
        points.extend(sample_points());
        assert!(registry.dispatch(a, b, &mut points, &mut material));
        assert_eq!(material.friction, 0.0);
        assert_eq!(points.len(), 1);

        let mut material = ContactMaterial::default().handler("missing");
        assert!(registry.dispatch(a, b, &mut sample_points(), &mut material));
    }

    #[test]
    fn test_callback_debug() {
        let handler = CollisionHandler::new(|_, _, _, _| true);
        assert_eq!(format!("{handler:?}"), "Callback(<fn>)");
    }
}
