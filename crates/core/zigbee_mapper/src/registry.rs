//! The typed entity registry: replaces a stringly-typed pub/sub table with
//! an ordered collection keyed by friendly name. Grounded
//! on the indexed-collection shape of `tedge_mapper::c8y::converter`'s
//! retained-entity book-keeping.

use crate::model::{DeviceTypeCode, Entity, EntitySource};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("friendly_name {0:?} is already registered")]
    DuplicateFriendlyName(String),
    #[error("no entity registered under friendly_name {0:?}")]
    UnknownEntity(String),
}

/// Entities in registration order, indexed by friendly name. Order matters:
/// the registration sweep replays devices before groups, and unregistration
/// on a snapshot replace walks the stale set in whatever order it was built.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: Vec<Entity>,
    by_name: HashMap<String, usize>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        EntityRegistry::default()
    }

    /// Register a new entity. Friendly names are unique across the whole
    /// registry: devices and groups share one namespace.
    pub fn register(&mut self, entity: Entity) -> Result<(), RegistryError> {
        if self.by_name.contains_key(&entity.entity_name) {
            return Err(RegistryError::DuplicateFriendlyName(entity.entity_name));
        }
        let index = self.entities.len();
        self.by_name.insert(entity.entity_name.clone(), index);
        self.entities.push(entity);
        Ok(())
    }

    pub fn get(&self, friendly_name: &str) -> Option<&Entity> {
        self.by_name.get(friendly_name).map(|&i| &self.entities[i])
    }

    pub fn get_mut(&mut self, friendly_name: &str) -> Option<&mut Entity> {
        let index = *self.by_name.get(friendly_name)?;
        self.entities.get_mut(index)
    }

    pub fn contains(&self, friendly_name: &str) -> bool {
        self.by_name.contains_key(friendly_name)
    }

    /// Remove an entity, returning it so the caller can unregister its
    /// bridged endpoints from the northbound host.
    pub fn unregister(&mut self, friendly_name: &str) -> Result<Entity, RegistryError> {
        let index = self
            .by_name
            .remove(friendly_name)
            .ok_or_else(|| RegistryError::UnknownEntity(friendly_name.to_string()))?;
        let removed = self.entities.remove(index);
        // Every entity after `index` shifted down by one; reindex.
        for (name, i) in self.by_name.iter_mut() {
            if *i > index {
                *i -= 1;
            }
            let _ = name;
        }
        Ok(removed)
    }

    pub fn rename(&mut self, old_name: &str, new_name: String) -> Result<(), RegistryError> {
        if self.by_name.contains_key(&new_name) {
            return Err(RegistryError::DuplicateFriendlyName(new_name));
        }
        let index = *self
            .by_name
            .get(old_name)
            .ok_or_else(|| RegistryError::UnknownEntity(old_name.to_string()))?;
        self.by_name.remove(old_name);
        self.by_name.insert(new_name.clone(), index);
        self.entities[index].entity_name = new_name;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All entities sourced from a device, keyed by ieee address, for the
    /// snapshot-replace pass over `bridge/devices`.
    pub fn device_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities
            .iter()
            .filter(|e| matches!(e.source, EntitySource::Device { .. }))
    }

    /// All entities sourced from a group, keyed by group id, for the
    /// snapshot-replace pass over `bridge/groups`.
    pub fn group_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities
            .iter()
            .filter(|e| matches!(e.source, EntitySource::Group { .. }))
    }

    pub fn find_by_ieee_address(&self, ieee_address: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.ieee_address() == Some(ieee_address))
    }

    pub fn find_by_group_id(&self, id: u32) -> Option<&Entity> {
        self.entities.iter().find(|e| e.group_id() == Some(id))
    }

    pub fn set_device_types(&mut self, friendly_name: &str, device_types: std::collections::HashSet<DeviceTypeCode>) {
        if let Some(entity) = self.get_mut(friendly_name) {
            entity.device_types = device_types;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_entity(name: &str) -> Entity {
        Entity::new(
            name.to_string(),
            EntitySource::Device { ieee_address: format!("0x{name}") },
            false,
        )
    }

    #[test]
    fn registers_and_looks_up_by_friendly_name() {
        let mut registry = EntityRegistry::new();
        registry.register(device_entity("Lamp1")).unwrap();
        assert!(registry.contains("Lamp1"));
        assert_eq!(registry.get("Lamp1").unwrap().entity_name, "Lamp1");
    }

    #[test]
    fn duplicate_friendly_name_is_rejected() {
        let mut registry = EntityRegistry::new();
        registry.register(device_entity("Lamp1")).unwrap();
        let err = registry.register(device_entity("Lamp1")).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateFriendlyName(_)));
    }

    #[test]
    fn unregister_removes_and_reindexes() {
        let mut registry = EntityRegistry::new();
        registry.register(device_entity("Lamp1")).unwrap();
        registry.register(device_entity("Lamp2")).unwrap();
        registry.unregister("Lamp1").unwrap();
        assert!(!registry.contains("Lamp1"));
        assert_eq!(registry.get("Lamp2").unwrap().entity_name, "Lamp2");
    }

    #[test]
    fn rename_preserves_identity_and_updates_index() {
        let mut registry = EntityRegistry::new();
        registry.register(device_entity("Lamp1")).unwrap();
        registry.rename("Lamp1", "LivingRoomLamp".to_string()).unwrap();
        assert!(!registry.contains("Lamp1"));
        assert!(registry.contains("LivingRoomLamp"));
    }

    #[test]
    fn find_by_ieee_address_locates_device_entity() {
        let mut registry = EntityRegistry::new();
        registry.register(device_entity("Lamp1")).unwrap();
        let found = registry.find_by_ieee_address("0xLamp1").unwrap();
        assert_eq!(found.entity_name, "Lamp1");
    }
}
