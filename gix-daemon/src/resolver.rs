//! Maps a client-supplied repository path to an openable repository and the set of
//! services the daemon will perform against it.
//!
//! This mirrors `git daemon`'s own resolution rules: a request path is joined onto a
//! configured base directory (never allowed to escape it via `..`), and a repository is
//! served only when it is "exported" — either every repository under `base_path` is
//! (`--export-all`), or the repository carries a `git-daemon-export-ok` marker file.
//! `spec.md` §4.7 calls this out as the "repository resolver" the daemon dispatches
//! through without specifying its policy; the marker-file rule is supplemented here from
//! `git-daemon(1)`, the protocol family this crate's `spec.md` describes.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::ServiceKind;

/// A repository resolved from a daemon request, along with which services may run
/// against it.
pub struct ResolvedRepository {
    /// The opened repository.
    pub repository: gix::Repository,
    /// Filesystem path that was opened, for logging.
    pub path: PathBuf,
}

/// Resolves service requests to repositories.
///
/// Implement this to plug in custom layout or authorization rules; [`PathResolver`] is the
/// default, `git-daemon`-compatible implementation.
pub trait RepositoryResolver: Send + Sync {
    /// Resolve `requested_path` (as sent by the client, e.g. `/project.git`) to a
    /// repository, or fail with [`Error::NotEnabled`]/[`Error::RepositoryNotFound`].
    fn resolve(&self, requested_path: &str, host: Option<&str>) -> Result<ResolvedRepository>;

    /// Whether `service` may run against the repository at `requested_path`.
    ///
    /// Called after `resolve` succeeds; separated out so implementations can deny a
    /// service (e.g. `git-receive-pack`) without re-opening the repository.
    fn service_enabled(&self, service: ServiceKind, requested_path: &str) -> bool;
}

/// Default resolver: joins requests onto a base directory and honors `--export-all` /
/// `git-daemon-export-ok`, exactly as `git daemon` does.
pub struct PathResolver {
    base_path: PathBuf,
    export_all: bool,
    allow_receive_pack: bool,
}

impl PathResolver {
    /// Serve repositories rooted at `base_path`. Each must carry a `git-daemon-export-ok`
    /// marker file unless `export_all` is set.
    pub fn new(base_path: impl Into<PathBuf>, export_all: bool) -> Self {
        Self {
            base_path: base_path.into(),
            export_all,
            allow_receive_pack: false,
        }
    }

    /// Allow `git-receive-pack` in addition to `git-upload-pack`.
    ///
    /// Matches `git daemon`'s `--enable=receive-pack`, which is opt-in because accepting
    /// pushes over the anonymous git:// protocol has no authentication.
    pub fn with_receive_pack(mut self, allow: bool) -> Self {
        self.allow_receive_pack = allow;
        self
    }

    fn join_within_base(&self, requested_path: &str) -> Result<PathBuf> {
        let requested = requested_path.trim_start_matches('/');
        let candidate = Path::new(requested);
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(Error::MalformedRequest(format!(
                "repository path '{requested_path}' escapes the base directory"
            )));
        }
        Ok(self.base_path.join(candidate))
    }

    fn is_exported(&self, repo_path: &Path) -> bool {
        self.export_all || repo_path.join("git-daemon-export-ok").is_file()
    }
}

impl RepositoryResolver for PathResolver {
    fn resolve(&self, requested_path: &str, _host: Option<&str>) -> Result<ResolvedRepository> {
        let path = self.join_within_base(requested_path)?;
        if !path.exists() {
            return Err(Error::RepositoryNotFound(requested_path.to_string()));
        }
        if !self.is_exported(&path) {
            return Err(Error::NotEnabled {
                service: "(resolve)".to_string(),
                path: requested_path.to_string(),
            });
        }
        let repository = gix::open(&path)?;
        Ok(ResolvedRepository { repository, path })
    }

    fn service_enabled(&self, service: ServiceKind, _requested_path: &str) -> bool {
        match service {
            ServiceKind::UploadPack => true,
            ServiceKind::ReceivePack => self.allow_receive_pack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_parent_dir_traversal() {
        let resolver = PathResolver::new("/srv/git", false);
        let err = resolver.resolve("../../etc/passwd", None).unwrap_err();
        assert!(matches!(err, Error::MalformedRequest(_)));
    }

    #[test]
    fn export_all_bypasses_marker_file() {
        let temp = tempfile::tempdir().unwrap();
        let repo_dir = temp.path().join("repo.git");
        std::fs::create_dir_all(&repo_dir).unwrap();
        gix::init_bare(&repo_dir).unwrap();

        let resolver = PathResolver::new(temp.path(), true);
        let resolved = resolver.resolve("repo.git", None).unwrap();
        assert_eq!(resolved.path, repo_dir);
    }

    #[test]
    fn without_export_all_missing_marker_is_not_enabled() {
        let temp = tempfile::tempdir().unwrap();
        let repo_dir = temp.path().join("repo.git");
        std::fs::create_dir_all(&repo_dir).unwrap();
        gix::init_bare(&repo_dir).unwrap();

        let resolver = PathResolver::new(temp.path(), false);
        let err = resolver.resolve("repo.git", None).unwrap_err();
        assert!(matches!(err, Error::NotEnabled { .. }));
    }

    #[test]
    fn marker_file_enables_export() {
        let temp = tempfile::tempdir().unwrap();
        let repo_dir = temp.path().join("repo.git");
        std::fs::create_dir_all(&repo_dir).unwrap();
        gix::init_bare(&repo_dir).unwrap();
        std::fs::write(repo_dir.join("git-daemon-export-ok"), b"").unwrap();

        let resolver = PathResolver::new(temp.path(), false);
        let resolved = resolver.resolve("repo.git", None).unwrap();
        assert_eq!(resolved.path, repo_dir);
    }

    #[test]
    fn receive_pack_disabled_by_default() {
        let resolver = PathResolver::new("/srv/git", true);
        assert!(resolver.service_enabled(ServiceKind::UploadPack, "repo.git"));
        assert!(!resolver.service_enabled(ServiceKind::ReceivePack, "repo.git"));
    }
}
