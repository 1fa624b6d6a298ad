//! Contact materials and the material-table collaborator.

use hashbrown::HashMap;

use crate::contact::LinkRef;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Friction and restitution for one link pair.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactMaterial {
    /// Coulomb friction coefficient before range clamping.
    pub friction: f64,
    /// Restitution override; `None` uses the solver-wide coefficient.
    pub restitution: Option<f64>,
    /// Name of a registered collision handler for this pair.
    pub handler: Option<String>,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self {
            friction: 0.5,
            restitution: None,
            handler: None,
        }
    }
}

impl ContactMaterial {
    /// Material with the given friction coefficient.
    #[must_use]
    pub fn with_friction(friction: f64) -> Self {
        Self {
            friction,
            ..Default::default()
        }
    }

    /// Override the restitution coefficient for this pair.
    #[must_use]
    pub fn restitution(mut self, restitution: f64) -> Self {
        self.restitution = Some(restitution);
        self
    }

    /// Route this pair through a named collision handler.
    #[must_use]
    pub fn handler(mut self, name: impl Into<String>) -> Self {
        self.handler = Some(name.into());
        self
    }
}

/// Lookup from a link pair to its contact material.
pub trait MaterialTable: Send + Sync {
    /// Material for contacts between `a` and `b`.
    fn material(&self, a: LinkRef, b: LinkRef) -> ContactMaterial;
}

/// Same material for every pair.
#[derive(Debug, Clone, Default)]
pub struct UniformMaterial(pub ContactMaterial);

impl MaterialTable for UniformMaterial {
    fn material(&self, _a: LinkRef, _b: LinkRef) -> ContactMaterial {
        self.0.clone()
    }
}

/// Per-pair overrides on top of a default material. Lookup is symmetric.
#[derive(Debug, Clone, Default)]
pub struct PairMaterialTable {
    default: ContactMaterial,
    pairs: HashMap<(LinkRef, LinkRef), ContactMaterial>,
}

impl PairMaterialTable {
    /// Table returning `default` for every unlisted pair.
    #[must_use]
    pub fn new(default: ContactMaterial) -> Self {
        Self {
            default,
            pairs: HashMap::new(),
        }
    }

    /// Set the material for one pair.
    pub fn insert(&mut self, a: LinkRef, b: LinkRef, material: ContactMaterial) {
        self.pairs.insert(ordered(a, b), material);
    }

    /// Number of explicit pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True when no pair is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl MaterialTable for PairMaterialTable {
    fn material(&self, a: LinkRef, b: LinkRef) -> ContactMaterial {
        self.pairs
            .get(&ordered(a, b))
            .unwrap_or(&self.default)
            .clone()
    }
}

fn ordered(a: LinkRef, b: LinkRef) -> (LinkRef, LinkRef) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_lookup_is_symmetric() {
        let mut table = PairMaterialTable::new(ContactMaterial::with_friction(0.3));
        let wheel = LinkRef::new(0, 2);
        let floor = LinkRef::new(1, 0);
        table.insert(wheel, floor, ContactMaterial::with_friction(1.2).handler("grip"));

        assert_eq!(table.material(floor, wheel).friction, 1.2);
        assert_eq!(table.material(wheel, floor).handler.as_deref(), Some("grip"));
        assert_eq!(table.material(wheel, LinkRef::new(2, 0)).friction, 0.3);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_uniform_material() {
        let table = UniformMaterial(ContactMaterial::with_friction(0.8).restitution(0.5));
        let m = table.material(LinkRef::new(0, 0), LinkRef::new(1, 0));
        assert_eq!(m.friction, 0.8);
        assert_eq!(m.restitution, Some(0.5));
    }
}
