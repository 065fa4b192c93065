use gazex_core::ObjectId;
pub use string_cache::DefaultAtom as Atom;

/// Interns scene object names into compact ids.
///
/// Ids are handed out in first-seen order, so two registries fed the same names in the
/// same order agree on every id. Replay relies on that.
#[derive(Debug, Clone, Default)]
pub struct ObjectRegistry {
    names: Vec<Atom>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a name and return its id
    pub fn intern(&mut self, name: &str) -> ObjectId {
        let atom = Atom::from(name);
        match self.names.iter().position(|a| *a == atom) {
            Some(idx) => ObjectId(idx as u32),
            None => {
                self.names.push(atom);
                ObjectId((self.names.len() - 1) as u32)
            }
        }
    }

    pub fn id_of(&self, name: &str) -> Option<ObjectId> {
        let atom = Atom::from(name);
        self.names
            .iter()
            .position(|a| *a == atom)
            .map(|idx| ObjectId(idx as u32))
    }

    pub fn name_of(&self, id: ObjectId) -> Option<&str> {
        self.names.get(id.0 as usize).map(|a| &**a)
    }

    /// Current count of unique names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (ObjectId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(idx, a)| (ObjectId(idx as u32), &**a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut reg = ObjectRegistry::new();
        let a = reg.intern("FixationCross");
        let b = reg.intern("TargetA");
        assert_eq!(reg.intern("FixationCross"), a);
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.name_of(b), Some("TargetA"));
        assert_eq!(reg.id_of("TargetA"), Some(b));
        assert_eq!(reg.id_of("Nope"), None);
        assert_eq!(reg.name_of(ObjectId(9)), None);
    }

    #[test]
    fn same_order_same_ids() {
        let names = ["Cue0", "Target0", "Target1", "Distractor0"];
        let mut a = ObjectRegistry::new();
        let mut b = ObjectRegistry::new();
        for n in names {
            a.intern(n);
        }
        for n in names {
            b.intern(n);
        }
        let ea: Vec<_> = a.entries().map(|(id, n)| (id, n.to_string())).collect();
        let eb: Vec<_> = b.entries().map(|(id, n)| (id, n.to_string())).collect();
        assert_eq!(ea, eb);
        assert_eq!(ea[3], (ObjectId(3), "Distractor0".to_string()));
    }
}
