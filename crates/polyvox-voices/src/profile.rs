//! Voice profile data model: append-only history with a movable pointer

use crate::error::ProfileError;
use chrono::{DateTime, Utc};
use polyvox_tts::{UserId, VoiceDescriptor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Per-profile monotonic version identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct VersionId(pub u64);

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for VersionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('v').unwrap_or(s);
        digits
            .parse::<u64>()
            .map(VersionId)
            .map_err(|e| format!("invalid version id '{}': {}", s, e))
    }
}

/// One entry in a user's voice history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub id: VersionId,
    pub descriptor: VoiceDescriptor,
    pub created_at: DateTime<Utc>,
    /// Uploaded sample this version was built from, when kept
    pub source_sample: Option<PathBuf>,
    /// Optional display name given at upload time
    pub label: Option<String>,
}

/// A user's voice state: ordered version history plus the pointer to
/// the entry currently in effect. The history is append-only except
/// for the explicit backup prune policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub user: UserId,
    versions: Vec<VersionEntry>,
    current: Option<VersionId>,
    next_version: u64,
}

impl VoiceProfile {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            versions: Vec::new(),
            current: None,
            next_version: 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn current_id(&self) -> Option<VersionId> {
        self.current
    }

    pub fn current_entry(&self) -> Option<&VersionEntry> {
        let id = self.current?;
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn entry(&self, id: VersionId) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// Next id that `append` will assign
    pub fn peek_next_version(&self) -> VersionId {
        VersionId(self.next_version)
    }

    /// Append a new version and make it current.
    pub fn append(
        &mut self,
        descriptor: VoiceDescriptor,
        source_sample: Option<PathBuf>,
        label: Option<String>,
    ) -> VersionId {
        let id = VersionId(self.next_version);
        self.next_version += 1;
        self.versions.push(VersionEntry {
            id,
            descriptor,
            created_at: Utc::now(),
            source_sample,
            label,
        });
        self.current = Some(id);
        id
    }

    /// Move the current pointer to an existing version. Creates no new
    /// entry and deletes nothing; later versions stay reachable.
    pub fn restore(&mut self, id: VersionId) -> Result<&VersionEntry, ProfileError> {
        if !self.versions.iter().any(|v| v.id == id) {
            return Err(ProfileError::VersionNotFound(id));
        }
        self.current = Some(id);
        Ok(self
            .versions
            .iter()
            .find(|v| v.id == id)
            .expect("presence checked above"))
    }

    /// History newest-first, regardless of where current points.
    pub fn history(&self) -> Vec<VersionEntry> {
        let mut entries = self.versions.clone();
        entries.reverse();
        entries
    }

    /// Backup prune policy: keep the current entry and the newest
    /// `backup_limit` others; return what was dropped so the caller can
    /// clean up stored samples.
    pub fn prune_backups(&mut self, backup_limit: usize) -> Vec<VersionEntry> {
        let current = self.current;
        let backups = self
            .versions
            .iter()
            .filter(|v| Some(v.id) != current)
            .count();
        if backups <= backup_limit {
            return Vec::new();
        }

        let mut to_drop = backups - backup_limit;
        let mut removed = Vec::with_capacity(to_drop);
        // Versions are stored oldest-first, so dropping from the front
        // removes the oldest backups.
        self.versions.retain(|v| {
            if to_drop > 0 && Some(v.id) != current {
                to_drop -= 1;
                removed.push(v.clone());
                false
            } else {
                true
            }
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> VoiceProfile {
        VoiceProfile::new(UserId::new("u1"))
    }

    fn descriptor(n: u32) -> VoiceDescriptor {
        VoiceDescriptor::sample_file(format!("/samples/u1_v{}.wav", n))
    }

    #[test]
    fn upload_replace_restore_scenario() {
        let mut p = profile();

        let v1 = p.append(descriptor(1), None, Some("S1".into()));
        assert_eq!(p.current_id(), Some(v1));

        let v2 = p.append(descriptor(2), None, Some("S2".into()));
        assert_eq!(p.current_id(), Some(v2));
        assert!(p.entry(v1).is_some(), "v1 retained as backup");

        p.restore(v1).unwrap();
        assert_eq!(p.current_id(), Some(v1));
        assert!(p.entry(v2).is_some(), "v2 still present after restore");

        // history is newest-first regardless of the current pointer
        let ids: Vec<VersionId> = p.history().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![v2, v1]);
    }

    #[test]
    fn restore_unknown_version_fails() {
        let mut p = profile();
        p.append(descriptor(1), None, None);
        match p.restore(VersionId(99)) {
            Err(ProfileError::VersionNotFound(id)) => assert_eq!(id, VersionId(99)),
            other => panic!("expected VersionNotFound, got {:?}", other),
        }
    }

    #[test]
    fn prune_keeps_current_and_newest_backups() {
        let mut p = profile();
        let v1 = p.append(descriptor(1), None, None);
        let v2 = p.append(descriptor(2), None, None);
        let v3 = p.append(descriptor(3), None, None);
        let v4 = p.append(descriptor(4), None, None);
        p.restore(v2).unwrap();

        // current = v2; backups = v1, v3, v4; keep the newest 2
        let removed = p.prune_backups(2);
        let removed_ids: Vec<VersionId> = removed.iter().map(|e| e.id).collect();
        assert_eq!(removed_ids, vec![v1]);
        assert!(p.entry(v2).is_some());
        assert!(p.entry(v3).is_some());
        assert!(p.entry(v4).is_some());
        assert_eq!(p.current_id(), Some(v2));
    }

    #[test]
    fn prune_under_limit_is_a_no_op() {
        let mut p = profile();
        p.append(descriptor(1), None, None);
        p.append(descriptor(2), None, None);
        assert!(p.prune_backups(5).is_empty());
        assert_eq!(p.history().len(), 2);
    }

    #[test]
    fn version_id_parses_both_spellings() {
        assert_eq!("v3".parse::<VersionId>().unwrap(), VersionId(3));
        assert_eq!("7".parse::<VersionId>().unwrap(), VersionId(7));
        assert!("vv".parse::<VersionId>().is_err());
    }
}
