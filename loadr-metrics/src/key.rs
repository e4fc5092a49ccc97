use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Interned string id. Metric names, tag keys and tag values all share one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl From<KeyId> for u32 {
    fn from(v: KeyId) -> Self {
        v.0
    }
}

#[derive(Debug, Default)]
struct Table {
    ids: HashMap<Arc<str>, KeyId, ahash::RandomState>,
    strings: Vec<Arc<str>>,
}

#[derive(Debug, Default)]
pub struct Interner {
    table: RwLock<Table>,
}

impl Interner {
    pub fn get_or_intern(&self, s: &str) -> KeyId {
        if let Some(id) = self.get(s) {
            return id;
        }

        let mut table = self.table.write();

        // Another writer may have won the race between the read and write lock.
        if let Some(&id) = table.ids.get(s) {
            return id;
        }

        let id = KeyId(u32::try_from(table.strings.len()).unwrap_or(u32::MAX));
        let s: Arc<str> = Arc::from(s);
        table.strings.push(s.clone());
        table.ids.insert(s, id);
        id
    }

    /// Lookup without interning.
    pub fn get(&self, s: &str) -> Option<KeyId> {
        self.table.read().ids.get(s).copied()
    }

    pub fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        self.table.read().strings.get(id.0 as usize).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let interner = Interner::default();
        let a = interner.get_or_intern("http_reqs");
        let b = interner.get_or_intern("checks");
        assert_ne!(a, b);
        assert_eq!(interner.get_or_intern("http_reqs"), a);
        assert_eq!(interner.get("checks"), Some(b));
        assert_eq!(interner.get("missing"), None);
        assert_eq!(interner.resolve(a).as_deref(), Some("http_reqs"));
    }
}
