use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global string interner for bloc and zone IDs — fast comparisons, low memory.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// Id prefix marking an element as a draggable bloc (`bloc-<opaque>`).
pub const BLOC_PREFIX: &str = "bloc-";

/// A lightweight, interned identifier for elements in the bloc tree.
/// Internally a `Spur` index — 4 bytes, Copy, Eq, Hash in O(1).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlocId(Spur);

impl BlocId {
    /// Intern a new string as a BlocId, or return existing if already interned.
    pub fn intern(s: &str) -> Self {
        BlocId(INTERNER.get_or_intern(s))
    }

    /// Resolve back to a string slice.
    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }

    /// Whether this id follows the draggable `bloc-` convention.
    pub fn is_bloc(&self) -> bool {
        self.has_prefix(BLOC_PREFIX)
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.as_str().starts_with(prefix)
    }

    /// Generate a fresh id derived from `base`.
    ///
    /// Ids with `prefix` get a new opaque suffix (`bloc-7f`, ...); other ids
    /// are suffixed with `-copy-N`. Uniqueness across the process comes from
    /// a monotonic counter, callers that mirror foreign ids should still
    /// check for collisions.
    pub fn fresh_from(base: BlocId, prefix: &str) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        if base.has_prefix(prefix) {
            Self::intern(&format!("{prefix}dup{n:x}"))
        } else {
            Self::intern(&format!("{}-copy-{n}", base.as_str()))
        }
    }
}

impl fmt::Debug for BlocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.as_str())
    }
}

impl fmt::Display for BlocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BlocId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BlocId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(BlocId::intern(&s))
    }
}

/// Identifier of a registered drop zone. Shares the interner with `BlocId`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneId(Spur);

impl ZoneId {
    pub fn intern(s: &str) -> Self {
        ZoneId(INTERNER.get_or_intern(s))
    }

    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }
}

impl fmt::Debug for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zone:{}", self.as_str())
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ZoneId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ZoneId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ZoneId::intern(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_roundtrip() {
        let a = BlocId::intern("bloc-hero");
        let b = BlocId::intern("bloc-hero");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "bloc-hero");
        assert!(a.is_bloc());
        assert!(!BlocId::intern("sidebar").is_bloc());
    }

    #[test]
    fn fresh_ids_are_unique_and_keep_prefix() {
        let base = BlocId::intern("bloc-card");
        let a = BlocId::fresh_from(base, BLOC_PREFIX);
        let b = BlocId::fresh_from(base, BLOC_PREFIX);
        assert_ne!(a, b);
        assert!(a.is_bloc());

        let plain = BlocId::fresh_from(BlocId::intern("caption"), BLOC_PREFIX);
        assert!(plain.as_str().starts_with("caption-copy-"));
    }
}
