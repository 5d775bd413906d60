//! String interner for attribute, function and label names.
//!
//! A compilation pass is single-threaded, so one table behind `&mut self`
//! is enough. Names are dense indices into the table, which lets the driver
//! ship the table next to a serialized pre-IR program and rebuild identical
//! `Name`s on the other side.

use rustc_hash::FxHashMap;

use super::Name;

/// Dense string interner.
///
/// Index 0 always holds the empty string ([`Name::EMPTY`]).
#[derive(Clone, Debug)]
pub struct StringInterner {
    map: FxHashMap<Box<str>, Name>,
    strings: Vec<Box<str>>,
}

impl StringInterner {
    /// Create an interner holding only the empty string.
    pub fn new() -> Self {
        let mut interner = Self {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(64),
        };
        interner.intern("");
        interner
    }

    /// Rebuild an interner from a table produced by [`to_table`](Self::to_table).
    ///
    /// Entries are interned in order, so a table without duplicates maps
    /// index `i` to `Name::from_raw(i)`. A missing leading empty string is
    /// tolerated: it is inserted first and every index shifts by one.
    pub fn from_table<S: AsRef<str>>(table: &[S]) -> Self {
        let mut interner = Self::new();
        for s in table {
            interner.intern(s.as_ref());
        }
        interner
    }

    /// Snapshot of the string table, indexed by `Name::index()`.
    pub fn to_table(&self) -> Vec<String> {
        self.strings.iter().map(|s| s.to_string()).collect()
    }

    /// Intern a string, returning its Name.
    pub fn intern(&mut self, s: &str) -> Name {
        if let Some(&name) = self.map.get(s) {
            return name;
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "a single pass never interns 4 billion distinct names"
        )]
        let name = Name::from_raw(self.strings.len() as u32);
        let owned: Box<str> = s.into();
        self.strings.push(owned.clone());
        self.map.insert(owned, name);
        name
    }

    /// Look up a string without interning it.
    pub fn get(&self, s: &str) -> Option<Name> {
        self.map.get(s).copied()
    }

    /// Look up the string for a Name.
    ///
    /// Names from a different interner resolve to `"<?>"` instead of panicking.
    pub fn lookup(&self, name: Name) -> &str {
        self.strings.get(name.index()).map_or("<?>", |s| s)
    }

    /// Number of interned strings, including the empty string.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// True when only the empty string is present.
    pub fn is_empty(&self) -> bool {
        self.strings.len() <= 1
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut interner = StringInterner::new();
        let a = interner.intern("open");
        let b = interner.intern("open");
        assert_eq!(a, b);
        assert_eq!(interner.lookup(a), "open");
        assert_eq!(interner.lookup(Name::EMPTY), "");
    }

    #[test]
    fn table_round_trip_preserves_names() {
        let mut interner = StringInterner::new();
        let open = interner.intern("open");
        let label = interner.intern("label");

        let rebuilt = StringInterner::from_table(&interner.to_table());
        assert_eq!(rebuilt.get("open"), Some(open));
        assert_eq!(rebuilt.get("label"), Some(label));
        assert_eq!(rebuilt.len(), interner.len());
    }

    #[test]
    fn foreign_name_does_not_panic() {
        let interner = StringInterner::new();
        assert_eq!(interner.lookup(Name::from_raw(999)), "<?>");
        assert!(interner.is_empty());
    }
}
