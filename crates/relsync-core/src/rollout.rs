//! Staged rollout gating.
//!
//! An entry with a staging percentage is only offered to the matching share
//! of installations. Each installation is identified by a random v4 UUID
//! persisted next to the app, so its bucket is stable across runs.

use std::path::Path;

use relsync_schema::ReleaseEntry;
use tracing::{debug, warn};
use uuid::Uuid;

/// Stable identifier of one installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(Uuid);

impl UserId {
    /// A fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Read the id stored at `path`, creating and persisting a new one if the
    /// file is missing or unreadable.
    ///
    /// # Errors
    ///
    /// Returns an I/O error only if a new id cannot be written.
    pub fn load_or_create(path: &Path) -> std::io::Result<Self> {
        if let Ok(text) = std::fs::read_to_string(path) {
            match Uuid::parse_str(text.trim()) {
                Ok(uuid) => return Ok(Self(uuid)),
                Err(e) => warn!(path = %path.display(), "Ignoring malformed user id: {e}"),
            }
        }
        let id = Self::generate();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, id.0.to_string())?;
        debug!(path = %path.display(), "Created user id {}", id.0);
        Ok(id)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Position of this user in `[0, 1]`, from the last four bytes of the UUID.
    pub fn bucket(&self) -> f64 {
        let bytes = self.0.as_bytes();
        let tail = [bytes[12], bytes[13], bytes[14], bytes[15]];
        f64::from(u32::from_le_bytes(tail)) / f64::from(u32::MAX)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decides whether an entry is offered to a user.
pub trait RolloutGate: Send + Sync {
    /// Whether `user` may see `entry`.
    fn is_eligible(&self, user: Option<&UserId>, entry: &ReleaseEntry) -> bool;
}

impl<F> RolloutGate for F
where
    F: Fn(Option<&UserId>, &ReleaseEntry) -> bool + Send + Sync,
{
    fn is_eligible(&self, user: Option<&UserId>, entry: &ReleaseEntry) -> bool {
        self(user, entry)
    }
}

/// Offers every entry to everyone, ignoring staging.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl RolloutGate for AllowAll {
    fn is_eligible(&self, _: Option<&UserId>, _: &ReleaseEntry) -> bool {
        true
    }
}

/// Honors each entry's staging percentage.
///
/// Unstaged entries are always eligible. Staged entries are never offered to
/// an anonymous user, and otherwise only when the user's bucket falls below
/// the percentage.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentageGate;

impl RolloutGate for PercentageGate {
    fn is_eligible(&self, user: Option<&UserId>, entry: &ReleaseEntry) -> bool {
        let Some(pct) = entry.staging_percentage() else {
            return true;
        };
        let Some(user) = user else {
            return false;
        };
        user.bucket() < f64::from(pct) / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relsync_schema::Sha1Hash;

    fn staged(pct: Option<u8>) -> ReleaseEntry {
        ReleaseEntry::new("MyApp-2.0.0-full.nupkg", Sha1Hash::compute(b"x"), 1)
            .unwrap()
            .with_staging_percentage(pct)
    }

    fn user_with_tail(tail: u32) -> UserId {
        let mut bytes = [0u8; 16];
        bytes[12..16].copy_from_slice(&tail.to_le_bytes());
        UserId::from_uuid(Uuid::from_bytes(bytes))
    }

    #[test]
    fn staging_formula() {
        let gate = PercentageGate;
        let low = user_with_tail(u32::MAX / 10); // ~0.10
        let high = user_with_tail(u32::MAX / 10 * 9); // ~0.90

        assert!(gate.is_eligible(None, &staged(None)));
        assert!(!gate.is_eligible(None, &staged(Some(50))));
        assert!(gate.is_eligible(Some(&low), &staged(Some(50))));
        assert!(!gate.is_eligible(Some(&high), &staged(Some(50))));
        assert!(!gate.is_eligible(Some(&low), &staged(Some(0))));
        assert!(gate.is_eligible(Some(&high), &staged(Some(100))));
    }

    #[test]
    fn closures_are_gates() {
        let deny_all = |_: Option<&UserId>, _: &ReleaseEntry| false;
        assert!(!deny_all.is_eligible(None, &staged(None)));
        assert!(AllowAll.is_eligible(None, &staged(Some(1))));
    }

    #[test]
    fn user_id_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("userid");
        let first = UserId::load_or_create(&path).unwrap();
        let second = UserId::load_or_create(&path).unwrap();
        assert_eq!(first, second);

        std::fs::write(&path, "not a uuid").unwrap();
        let replaced = UserId::load_or_create(&path).unwrap();
        assert_ne!(replaced, first);
    }
}
