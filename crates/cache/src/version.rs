use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque identity of one committed write
///
/// Compared for equality only. A fresh random token per write lets a reader
/// tell "something changed" apart from the ordered `serial`, and a partition
/// restart apart from an incremental update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionToken(Uuid);

impl VersionToken {
    pub fn fresh() -> Self {
        VersionToken(Uuid::new_v4())
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First group is enough to tell tokens apart in logs
        let s = self.0.to_string();
        f.write_str(&s[..8])
    }
}

/// The unit a partition stores and hands out
///
/// Entries are immutable once built; a write replaces the whole `Arc`.
#[derive(Debug, Clone)]
pub struct CachedEntry<T> {
    /// `None` until the partition has ever been populated
    pub value: Option<T>,
    pub version: VersionToken,
    /// Per-partition counter, bumped by every committed write
    pub serial: u64,
    /// Identity of the partition activation that produced this entry
    pub epoch: VersionToken,
}

impl<T> CachedEntry<T> {
    /// Entry a partition starts from after its initial load
    pub(crate) fn initial(value: Option<T>) -> Self {
        let epoch = VersionToken::fresh();
        Self {
            value,
            version: VersionToken::fresh(),
            serial: 0,
            epoch,
        }
    }

    /// Successor entry carrying `value`
    pub(crate) fn next(&self, value: T) -> Self {
        Self {
            value: Some(value),
            version: VersionToken::fresh(),
            serial: self.serial + 1,
            epoch: self.epoch,
        }
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_populated(&self) -> bool {
        self.value.is_some()
    }
}

pub type SharedEntry<T> = Arc<CachedEntry<T>>;
