/// Interned byte strings.
///
/// Every string is interned: two requests for the same bytes always yield the
/// same `StringId`, so identifiers and string literals compare by id.
use indexmap::IndexSet;
use std::fmt;

/// An opaque handle to a string in the interner.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct StringId(pub u32);

/// String interner: owns all strings and hands out stable ids.
#[derive(Default)]
pub struct StringInterner {
    strings: IndexSet<Box<[u8]>>,
}

impl StringInterner {
    /// Create a new empty interner.
    pub fn new() -> Self {
        StringInterner {
            strings: IndexSet::new(),
        }
    }

    /// Intern a byte string. Returns the existing id if already present.
    pub fn intern(&mut self, bytes: &[u8]) -> StringId {
        if let Some(idx) = self.strings.get_index_of(bytes) {
            return StringId(idx as u32);
        }
        let (idx, _) = self.strings.insert_full(bytes.into());
        StringId(idx as u32)
    }

    /// Look up a string without interning it.
    pub fn find(&self, bytes: &[u8]) -> Option<StringId> {
        self.strings.get_index_of(bytes).map(|idx| StringId(idx as u32))
    }

    /// Get the bytes of an interned string.
    ///
    /// Panics if `id` was not produced by this interner.
    pub fn get_bytes(&self, id: StringId) -> &[u8] {
        &self.strings[id.0 as usize]
    }

    /// Get the string as UTF-8, replacing invalid sequences.
    pub fn display(&self, id: StringId) -> String {
        String::from_utf8_lossy(self.get_bytes(id)).into_owned()
    }

    /// Number of distinct strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl fmt::Debug for StringInterner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.strings.iter().map(|s| String::from_utf8_lossy(s)))
            .finish()
    }
}
