//! Final id allocation
//!
//! One namespace per merge call. Serials increase monotonically in the
//! order entries are visited; anonymous entries are named after their serial
//! the way the engine's exporter names generated objects.

use crate::core::errors::{EntryLabel, IntegrityViolation};
use crate::library::{LocalId, Placeholder};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalId {
    pub serial: u32,
    pub name: String,
}

impl FinalId {
    /// Value of an attribute referencing this id
    pub fn reference(&self) -> String {
        format!("#{}", self.name)
    }
}

/// Name for an entry the engine never looks up by name
pub fn anonymous_name(serial: u32) -> String {
    format!("!G{serial:04X}")
}

#[derive(Debug)]
pub struct IdNamespace {
    next: u32,
    assigned: HashMap<Placeholder, FinalId>,
    names: HashSet<String>,
}

impl IdNamespace {
    pub fn starting_at(first: u32) -> Self {
        Self {
            next: first,
            assigned: HashMap::new(),
            names: HashSet::new(),
        }
    }

    /// Give `local` a serial and a final name
    pub fn allocate(&mut self, tag: &str, local: &LocalId) -> Result<&FinalId, IntegrityViolation> {
        let serial = self.next;
        let name = local
            .engine_name
            .clone()
            .unwrap_or_else(|| anonymous_name(serial));
        let entry = EntryLabel {
            tag: tag.to_string(),
            id: Some(name.clone()),
        };

        let Some(next) = serial.checked_add(1) else {
            return Err(IntegrityViolation::IdSpaceExhausted { entry });
        };
        if self.assigned.contains_key(&local.placeholder) {
            return Err(IntegrityViolation::DuplicatePlaceholder {
                entry,
                placeholder: local.placeholder,
            });
        }
        if !self.names.insert(name.clone()) {
            return Err(IntegrityViolation::DuplicateId { entry, id: name });
        }

        self.next = next;
        Ok(self
            .assigned
            .entry(local.placeholder)
            .or_insert(FinalId { serial, name }))
    }

    pub fn resolve(&self, placeholder: &Placeholder) -> Option<&FinalId> {
        self.assigned.get(placeholder)
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Role;

    #[test]
    fn test_serials_increase_and_name_anonymous_entries() {
        let mut namespace = IdNamespace::starting_at(0x1F);
        let a = namespace
            .allocate("DATABLOCK", &LocalId::anonymous(Placeholder::glyph(Role::DataBlock, 'A')))
            .unwrap()
            .clone();
        let b = namespace
            .allocate("RENDERNODE", &LocalId::named(Placeholder::glyph(Role::RenderNode, 'A'), "65"))
            .unwrap()
            .clone();
        assert_eq!(a.name, "!G001F");
        assert_eq!(a.reference(), "#!G001F");
        assert_eq!(b.serial, 0x20);
        assert_eq!(b.name, "65");
        assert_eq!(namespace.len(), 2);
    }

    #[test]
    fn test_duplicate_placeholder_is_rejected() {
        let mut namespace = IdNamespace::starting_at(1);
        let local = LocalId::anonymous(Placeholder::shared(Role::Texture));
        namespace.allocate("TEXTURE", &local).unwrap();
        assert!(matches!(
            namespace.allocate("TEXTURE", &local),
            Err(IntegrityViolation::DuplicatePlaceholder { .. })
        ));
    }

    #[test]
    fn test_exhausted_serials_are_an_error() {
        let mut namespace = IdNamespace::starting_at(u32::MAX);
        let local = LocalId::anonymous(Placeholder::shared(Role::Texture));
        assert!(matches!(
            namespace.allocate("TEXTURE", &local),
            Err(IntegrityViolation::IdSpaceExhausted { .. })
        ));
        assert!(namespace.is_empty());
    }

    #[test]
    fn test_duplicate_engine_name_is_rejected() {
        let mut namespace = IdNamespace::starting_at(1);
        namespace
            .allocate("SHADERINSTANCE", &LocalId::named(Placeholder::shared(Role::ShaderInstance), "font"))
            .unwrap();
        match namespace.allocate("TEXTURE", &LocalId::named(Placeholder::shared(Role::Texture), "font")) {
            Err(IntegrityViolation::DuplicateId { id, .. }) => assert_eq!(id, "font"),
            other => panic!("expected DuplicateId, got {other:?}"),
        }
    }
}
