//! Ordered entity registry.

use std::collections::HashMap;

use crate::entity::Entity;
use crate::error::{BridgeError, Result};

/// Ordered collection of entities, unique by key.
///
/// Iteration follows registration order. Registering a key twice replaces the
/// earlier entity in place, so merged sets keep the position of the first
/// registration and the content of the last.
pub struct EntityRegistry<S> {
    entities: Vec<Entity<S>>,
    index: HashMap<String, usize>,
}

impl<S> EntityRegistry<S> {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register an entity, replacing any entity with the same key.
    pub fn register(&mut self, entity: Entity<S>) -> Result<()> {
        if entity.key().is_empty() {
            return Err(BridgeError::Registry(format!(
                "entity of kind {} has an empty key",
                entity.kind()
            )));
        }

        match self.index.get(entity.key()) {
            Some(&pos) => {
                tracing::debug!(entity = %entity.key(), "Replacing registered entity");
                self.entities[pos] = entity;
            }
            None => {
                self.index
                    .insert(entity.key().to_string(), self.entities.len());
                self.entities.push(entity);
            }
        }
        Ok(())
    }

    /// Fold a whole entity set into the registry.
    pub fn merge(&mut self, set: impl IntoIterator<Item = Entity<S>>) -> Result<()> {
        set.into_iter().try_for_each(|entity| self.register(entity))
    }

    /// Build a registry from sets applied in order; later sets win by key.
    pub fn from_sets<I>(sets: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<Entity<S>>>,
    {
        let mut registry = Self::new();
        for set in sets {
            registry.merge(set)?;
        }
        Ok(registry)
    }

    pub fn get(&self, key: &str) -> Option<&Entity<S>> {
        self.index.get(key).map(|&pos| &self.entities[pos])
    }

    /// Entities in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity<S>> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl<S> Default for EntityRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for EntityRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entities.iter().map(|e| e.key()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ComponentKind;
    use wallbridge_common::Value;

    fn zero(_: &()) -> Value {
        Value::Integer(0)
    }

    fn sensor(key: &str) -> Entity<()> {
        Entity::new(key, ComponentKind::Sensor, zero)
    }

    #[test]
    fn test_registration_order() {
        let mut registry = EntityRegistry::new();
        for key in ["lock", "status", "added_energy"] {
            registry.register(sensor(key)).unwrap();
        }

        let keys: Vec<&str> = registry.iter().map(|e| e.key()).collect();
        assert_eq!(keys, vec!["lock", "status", "added_energy"]);
    }

    #[test]
    fn test_duplicate_key_last_wins() {
        let mut registry = EntityRegistry::new();
        registry.register(sensor("x").with_meta("name", "first")).unwrap();
        registry.register(sensor("y")).unwrap();
        registry.register(sensor("x").with_meta("name", "second")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("x").unwrap().meta("name"), Some("second"));
        // Position of the first registration is kept
        assert_eq!(registry.iter().next().unwrap().key(), "x");
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut registry = EntityRegistry::new();
        let err = registry.register(sensor("")).unwrap_err();
        assert!(matches!(err, BridgeError::Registry(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_from_sets_overrides() {
        let base = vec![sensor("status").with_meta("name", "Status"), sensor("lock")];
        let diagnostic = vec![sensor("status").with_meta("name", "Raw status")];

        let registry = EntityRegistry::from_sets([base, diagnostic]).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("status").unwrap().meta("name"), Some("Raw status"));
        assert!(registry.get("missing").is_none());
    }
}
