//! Registry of currently active contact points.

use serde::{Deserialize, Serialize};

/// A single tracked contact.
///
/// Identity is the `(device_type, pointer_id)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub device_type: i32,
    pub pointer_id: u32,
    pub x: f64,
    pub y: f64,
    pub pressure: i32,
    pub inverted: bool,
}

/// The set of active contacts, in insertion order.
#[derive(Debug, Clone)]
pub struct ContactRegistry {
    contacts: Vec<Contact>,
    host_pointer_id: u32,
}

impl ContactRegistry {
    /// Create an empty registry. Contacts carrying `host_pointer_id` are the
    /// host pointing device: they are kept in the registry but excluded from
    /// [`tracked`](Self::tracked).
    pub fn new(host_pointer_id: u32) -> Self {
        Self {
            contacts: Vec::new(),
            host_pointer_id,
        }
    }

    fn position(&self, device_type: i32, pointer_id: u32) -> Option<usize> {
        self.contacts
            .iter()
            .position(|c| c.device_type == device_type && c.pointer_id == pointer_id)
    }

    /// Insert a new contact or overwrite the mutable fields of an existing one.
    pub fn upsert(
        &mut self,
        device_type: i32,
        pointer_id: u32,
        inverted: bool,
        x: f64,
        y: f64,
        pressure: i32,
    ) {
        match self.position(device_type, pointer_id) {
            Some(i) => {
                let contact = &mut self.contacts[i];
                contact.inverted = inverted;
                contact.x = x;
                contact.y = y;
                contact.pressure = pressure;
            }
            None => self.contacts.push(Contact {
                device_type,
                pointer_id,
                x,
                y,
                pressure,
                inverted,
            }),
        }
    }

    /// Remove a contact. Unknown identities are ignored.
    pub fn remove(&mut self, device_type: i32, pointer_id: u32) -> Option<Contact> {
        self.position(device_type, pointer_id)
            .map(|i| self.contacts.remove(i))
    }

    /// All contacts, host pointer included.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Contacts that take part in kinematic aggregation.
    pub fn tracked(&self) -> impl Iterator<Item = &Contact> {
        let host = self.host_pointer_id;
        self.contacts.iter().filter(move |c| c.pointer_id != host)
    }

    pub fn is_host(&self, pointer_id: u32) -> bool {
        pointer_id == self.host_pointer_id
    }

    /// Number of simultaneous contacts, host pointer included.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_upsert_updates_in_place() {
        let mut registry = ContactRegistry::new(1);
        registry.upsert(2, 10, false, 1.0, 2.0, 100);
        registry.upsert(2, 11, false, 5.0, 5.0, 100);
        registry.upsert(2, 10, true, 3.0, 4.0, 200);

        assert_eq!(registry.len(), 2);
        let first = &registry.contacts()[0];
        assert_eq!(first.pointer_id, 10);
        assert_eq!((first.x, first.y), (3.0, 4.0));
        assert_eq!(first.pressure, 200);
        assert!(first.inverted);
    }

    #[test]
    fn test_same_pointer_on_different_devices_is_distinct() {
        let mut registry = ContactRegistry::new(1);
        registry.upsert(2, 10, false, 0.0, 0.0, 0);
        registry.upsert(3, 10, false, 0.0, 0.0, 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut registry = ContactRegistry::new(1);
        registry.upsert(2, 10, false, 0.0, 0.0, 0);
        assert!(registry.remove(2, 99).is_none());
        assert!(registry.remove(2, 10).is_some());
        assert!(registry.is_empty());
        assert!(registry.remove(2, 10).is_none());
    }

    #[test]
    fn test_host_pointer_kept_but_not_tracked() {
        let mut registry = ContactRegistry::new(1);
        registry.upsert(0, 1, false, 50.0, 50.0, 0);
        registry.upsert(2, 7, false, 10.0, 10.0, 0);

        assert_eq!(registry.len(), 2);
        let tracked: Vec<u32> = registry.tracked().map(|c| c.pointer_id).collect();
        assert_eq!(tracked, vec![7]);

        registry.remove(0, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_identities_stay_unique() {
        let mut registry = ContactRegistry::new(1);
        // Deterministic pseudo-random interleaving of upserts and removes
        let mut state = 12345u32;
        for _ in 0..2000 {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let device = ((state >> 8) % 3) as i32;
            let pointer = (state >> 12) % 6;
            if (state >> 20) % 4 == 0 {
                registry.remove(device, pointer);
            } else {
                registry.upsert(device, pointer, false, 0.0, 0.0, 0);
            }

            let ids: HashSet<(i32, u32)> = registry
                .contacts()
                .iter()
                .map(|c| (c.device_type, c.pointer_id))
                .collect();
            assert_eq!(ids.len(), registry.len());
        }
    }
}
