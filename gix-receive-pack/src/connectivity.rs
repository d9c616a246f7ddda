//! Connectivity checking: verifying that every object reachable from an
//! update's new value is either present in the freshly received pack or
//! already resident in the repository.
//!
//! The check walks the full object graph starting at each update's `new`
//! object -- commit ancestry, each commit's tree, and every blob/subtree a
//! tree names -- stopping at any commit already known to be present (the
//! "haves" boundary). Two rounds are attempted: first against a small haves
//! set built only from the refs actually targeted by this push, and -- only
//! if that walk reports a missing object -- again against the full set of
//! visible refs. This mirrors the optimization in `policy::ff::is_fast_forward`,
//! generalized to cover every update in the batch instead of a single ref.

use std::collections::{HashSet, VecDeque};

use gix_hash::ObjectId;
use gix_object::{Find, Kind};
use gix_odb::Handle as OdbHandle;

use crate::protocol::{CommandUpdate, RefRecord};
use crate::Error;

/// Maximum number of commits visited per update before giving up with a
/// [`Error::Validation`] rather than looping forever on a corrupt pack.
const MAX_TRAVERSAL_NODES: usize = 250_000;

/// Configuration for connectivity checking.
#[derive(Debug, Clone)]
pub struct ConnectivityConfig {
    /// If true and the "parallel" feature is enabled, an implementation may use a thread-pool.
    pub parallel: bool,
    /// Rate limit for progress emission (milliseconds); None disables rate limiting.
    pub progress_rate_limit_ms: Option<u64>,
    /// If true, allow per-ref deferred reachability checks based on workload.
    pub defer_per_ref: bool,
    /// Maximum number of refs to check in this pass when deferral is enabled.
    /// Remaining refs will be returned in `ConnectivityOutcome::deferred_refs`.
    pub defer_limit: Option<usize>,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            progress_rate_limit_ms: Some(100),
            defer_per_ref: false,
            defer_limit: None,
        }
    }
}

/// Result of a connectivity check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectivityOutcome {
    /// Total number of refs that were considered for checking.
    pub total_refs: usize,
    /// Number of refs that were actually checked in this pass.
    pub checked_refs: usize,
    /// Ref names that were deferred for later checking (deferral policy).
    pub deferred_refs: Vec<String>,
    /// True if the connectivity check completed without detecting unreachable objects.
    pub ok: bool,
}

/// Trait for checking object connectivity after receiving a pack.
///
/// Implementations are expected to:
/// - Exclude hidden refs by design (callers should pass only visible refs).
/// - Optionally emit progress messages when the "progress" feature is enabled.
/// - Support a deferral policy to avoid long pauses on heavily loaded servers.
pub trait ConnectivityChecker {
    /// Check connectivity for the provided updates against the visible reference set.
    fn check(
        &mut self,
        updates: &[CommandUpdate],
        visible_refs: &[RefRecord],
    ) -> Result<ConnectivityOutcome, Error>;

    /// Whether this checker is configured to attempt parallel execution.
    fn is_parallel(&self) -> bool;
}

/// A connectivity checker backed by an object database walk.
///
/// `odb` should be the quarantine handle (or the post-migration main handle)
/// so that objects from the just-received pack are visible to lookups.
pub struct DefaultConnectivityChecker {
    config: ConnectivityConfig,
    odb: OdbHandle,
}

impl DefaultConnectivityChecker {
    /// Build a checker that walks `odb` to verify reachability.
    pub fn new(config: ConnectivityConfig, odb: OdbHandle) -> Self {
        Self { config, odb }
    }

    /// Access configuration.
    pub fn config(&self) -> &ConnectivityConfig {
        &self.config
    }

    /// Update configuration.
    pub fn set_config(&mut self, config: ConnectivityConfig) {
        self.config = config;
    }

    fn plan_refs(&self, total_refs: usize, names: &[String]) -> (usize, Vec<String>) {
        if self.config.defer_per_ref {
            let limit = self
                .config
                .defer_limit
                .unwrap_or_else(|| total_refs.saturating_div(2).max(1));
            if total_refs > limit {
                (limit, names[limit..].to_vec())
            } else {
                (total_refs, Vec::new())
            }
        } else {
            (total_refs, Vec::new())
        }
    }

    /// Walk the full object graph reachable from every update's `new` object
    /// -- commits, their trees, and every blob/subtree those trees name --
    /// stopping at any id present in `haves`. Returns the first missing
    /// object found, if any. Submodule (gitlink) entries are skipped: their
    /// target lives in another repository entirely.
    fn find_missing_object(
        &self,
        updates: &[CommandUpdate],
        haves: &HashSet<ObjectId>,
    ) -> Result<Option<ObjectId>, Error> {
        let mut visited: HashSet<ObjectId> = HashSet::new();
        let mut queue: VecDeque<ObjectId> = VecDeque::new();

        for update in updates {
            if let CommandUpdate::Create { new, .. } | CommandUpdate::Update { new, .. } = update {
                if !new.is_null() {
                    queue.push_back(*new);
                }
            }
        }

        let mut visited_count = 0usize;
        let mut buf = Vec::new();
        while let Some(id) = queue.pop_front() {
            if haves.contains(&id) || !visited.insert(id) {
                continue;
            }
            visited_count += 1;
            if visited_count > MAX_TRAVERSAL_NODES {
                return Err(Error::Validation(format!(
                    "connectivity check aborted after visiting {MAX_TRAVERSAL_NODES} objects"
                )));
            }

            let object = match self.odb.try_find(&id, &mut buf) {
                Ok(Some(object)) => object,
                Ok(None) => return Ok(Some(id)),
                Err(e) => return Err(Error::Validation(format!("object lookup failed for {id}: {e}"))),
            };

            match object.kind {
                Kind::Commit => {
                    let commit = gix_object::CommitRef::from_bytes(object.data)
                        .map_err(|e| Error::Validation(format!("failed to parse commit {id}: {e}")))?;
                    for parent in commit.parents() {
                        if !visited.contains(&parent) {
                            queue.push_back(parent);
                        }
                    }
                    let tree = commit.tree();
                    if !visited.contains(&tree) {
                        queue.push_back(tree);
                    }
                }
                Kind::Tree => {
                    let tree = gix_object::TreeRef::from_bytes(object.data)
                        .map_err(|e| Error::Validation(format!("failed to parse tree {id}: {e}")))?;
                    for entry in tree.entries {
                        if entry.mode.kind() == gix_object::tree::EntryKind::Commit {
                            // Submodule gitlink: its target lives in another repository.
                            continue;
                        }
                        let child = entry.oid.to_owned();
                        if !visited.contains(&child) {
                            queue.push_back(child);
                        }
                    }
                }
                Kind::Tag => {
                    let tag = gix_object::TagRef::from_bytes(object.data)
                        .map_err(|e| Error::Validation(format!("failed to parse tag {id}: {e}")))?;
                    let target = tag.target();
                    if !visited.contains(&target) {
                        queue.push_back(target);
                    }
                }
                Kind::Blob => {}
            }
        }

        Ok(None)
    }
}

impl ConnectivityChecker for DefaultConnectivityChecker {
    fn check(
        &mut self,
        updates: &[CommandUpdate],
        visible_refs: &[RefRecord],
    ) -> Result<ConnectivityOutcome, Error> {
        let mut names: Vec<String> = Vec::with_capacity(visible_refs.len());
        for r in visible_refs {
            names.push(r.name.clone());
        }
        for u in updates {
            let candidate = u.name().to_owned();
            if !names.iter().any(|n| n == &candidate) {
                names.push(candidate);
            }
        }
        let total = names.len();
        let (checked, deferred) = self.plan_refs(total, &names);

        // Round 1: a small haves set built only from the refs this push actually
        // touches (their pre-push values), which is usually enough to prove
        // every newly-pushed commit's ancestry bottoms out quickly.
        let small_haves: HashSet<ObjectId> = updates
            .iter()
            .filter_map(|u| match u {
                CommandUpdate::Update { old, .. } | CommandUpdate::Delete { old, .. } => Some(*old),
                CommandUpdate::Create { .. } => None,
            })
            .filter(|id| !id.is_null())
            .collect();

        if self.find_missing_object(updates, &small_haves)?.is_none() {
            return Ok(ConnectivityOutcome {
                total_refs: total,
                checked_refs: checked,
                deferred_refs: deferred,
                ok: true,
            });
        }

        // Round 2: fall back to the full set of visible ref tips as the haves
        // boundary, which is authoritative but more expensive to assemble.
        let full_haves: HashSet<ObjectId> = visible_refs.iter().map(|r| r.oid).collect();
        match self.find_missing_object(updates, &full_haves)? {
            None => Ok(ConnectivityOutcome {
                total_refs: total,
                checked_refs: checked,
                deferred_refs: deferred,
                ok: true,
            }),
            Some(missing) => Err(Error::MissingObject(missing)),
        }
    }

    fn is_parallel(&self) -> bool {
        self.config.parallel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gix_hash::ObjectId;

    fn oid(hex40: &str) -> ObjectId {
        ObjectId::from_hex(hex40.as_bytes()).expect("valid hex")
    }

    fn rr(hex40: &str, name: &str) -> RefRecord {
        RefRecord::new(oid(hex40), name)
    }

    fn empty_odb() -> (tempfile::TempDir, OdbHandle) {
        let dir = tempfile::tempdir().expect("tempdir");
        let objects_dir = dir.path().join("objects");
        std::fs::create_dir_all(&objects_dir).expect("create objects dir");
        let odb = gix_odb::at(&objects_dir).expect("odb");
        (dir, odb)
    }

    #[test]
    fn plan_refs_without_deferral_checks_everything() {
        let (_dir, odb) = empty_odb();
        let checker = DefaultConnectivityChecker::new(ConnectivityConfig::default(), odb);
        let (checked, deferred) = checker.plan_refs(3, &["a".into(), "b".into(), "c".into()]);
        assert_eq!(checked, 3);
        assert!(deferred.is_empty());
    }

    #[test]
    fn plan_refs_applies_defer_limit() {
        let (_dir, odb) = empty_odb();
        let mut cfg = ConnectivityConfig::default();
        cfg.defer_per_ref = true;
        cfg.defer_limit = Some(1);
        let checker = DefaultConnectivityChecker::new(cfg, odb);
        let (checked, deferred) = checker.plan_refs(3, &["a".into(), "b".into(), "c".into()]);
        assert_eq!(checked, 1);
        assert_eq!(deferred.len(), 2);
    }

    #[test]
    fn missing_object_is_reported_when_not_in_odb() {
        let (_dir, odb) = empty_odb();
        let mut checker = DefaultConnectivityChecker::new(ConnectivityConfig::default(), odb);
        let updates = vec![CommandUpdate::Create {
            new: oid("1111111111111111111111111111111111111111"),
            name: "refs/heads/main".to_string(),
        }];
        let refs = vec![rr("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "refs/heads/other")];
        let err = checker.check(&updates, &refs).unwrap_err();
        assert!(matches!(err, Error::MissingObject(_)));
    }

    #[test]
    fn is_parallel_reflects_config() {
        let (_dir, odb) = empty_odb();
        let mut cfg = ConnectivityConfig::default();
        cfg.parallel = true;
        let checker = DefaultConnectivityChecker::new(cfg, odb);
        assert!(checker.is_parallel());
    }
}
