/*!
Receive-pack engine for gitoxide: parses head-info, enforces push policy, ingests
the incoming pack, runs hooks, applies ref updates, and reports status back to
the client over the `report-status`/`report-status-v2` wire format.

Design principles
- Zero I/O in constructors and configuration APIs.
- Typestate to prevent invalid API usage at compile time.
- Keep the core types minimal yet extensible.
*/

#![forbid(unsafe_code)]

use core::marker::PhantomData;

pub mod config;
pub mod connectivity;
pub mod engine;
mod error;
pub mod hooks;
pub mod interrupt;
pub mod pack;
pub mod policy;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod shallow;

pub use engine::{Engine, LooseFileRefUpdater, PushRequest, RefUpdater};
pub use error::{PackIngestionError, ErrorContext, ErrorKind};
pub use policy::PolicySet;

/// Typestates representing builder progress.
pub mod state {
    /// Initial builder state with no mode selected.
    pub struct Start;
    /// Ready state after transport mode (blocking or async) is selected.
    pub struct Ready;
}

/// Error type for operations provided by this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An I/O failure from the filesystem or the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A protocol-level problem: malformed head-info, bad capability, wire violation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A semantic validation failure (fsck, capability negotiation, object checks).
    #[error("validation error: {0}")]
    Validation(String),

    /// Fsck rejected one or more objects in the incoming pack.
    #[error("fsck error: {0}")]
    Fsck(String),

    /// The connectivity check found an object reachable from an update that is
    /// neither in the new pack nor already present in the repository.
    #[error("missing object: {0}")]
    MissingObject(gix_hash::ObjectId),

    /// A push-policy rule rejected a command.
    #[error("{message}")]
    PolicyViolation {
        /// Machine-readable policy name, e.g. `deny_non_fast_forwards`.
        reason: String,
        /// The ref the rejected command targeted.
        refname: String,
        /// The command's old id, if any.
        old: Option<gix_hash::ObjectId>,
        /// The command's new id, if any.
        new: Option<gix_hash::ObjectId>,
        /// Fully rendered human-readable message.
        message: String,
    },

    /// Setting up the environment for a hook or policy check failed (e.g. reading HEAD).
    #[error("environment setup failed: {0}")]
    EnvironmentSetup(String),

    /// A hook process exceeded its configured timeout.
    #[error("hook '{name}' timed out after {seconds}s{}", detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    HookTimeout {
        name: String,
        seconds: u64,
        detail: Option<String>,
    },

    /// A hook process produced more output than the configured limit.
    #[error("hook '{name}' exceeded max output size of {limit} bytes{}", detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    HookOutputExceeded {
        name: String,
        limit: usize,
        detail: Option<String>,
    },

    /// A hook process exited with a non-zero status.
    #[error("hook '{name}' failed with exit code {exit_code}{}", detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    HookFailed {
        name: String,
        exit_code: i32,
        detail: Option<String>,
    },

    /// The operation was cancelled, e.g. by an interrupt handler.
    #[error("operation cancelled")]
    Cancelled,

    /// Pack ingestion failed; see the wrapped error for classification and context.
    #[error(transparent)]
    PackIngestion(#[from] error::PackIngestionError),

    /// Placeholder error for operations not yet wired into the engine.
    #[error("unimplemented")]
    Unimplemented,
}

impl Error {
    /// Build a [`Error::HookTimeout`].
    pub fn hook_timeout(name: &str, seconds: u64, detail: Option<&str>) -> Self {
        Error::HookTimeout {
            name: name.to_string(),
            seconds,
            detail: detail.map(str::to_string),
        }
    }

    /// Build a [`Error::HookOutputExceeded`].
    pub fn hook_output_exceeded(name: &str, limit: usize, detail: Option<&str>) -> Self {
        Error::HookOutputExceeded {
            name: name.to_string(),
            limit,
            detail: detail.map(str::to_string),
        }
    }

    /// Build a [`Error::HookFailed`] from a bare exit code.
    pub fn hook_failed(name: &str, exit_code: i32, detail: Option<&str>) -> Self {
        Error::HookFailed {
            name: name.to_string(),
            exit_code,
            detail: detail.map(str::to_string),
        }
    }

    /// Build a [`Error::HookFailed`], folding the hook's stderr into the detail message.
    pub fn hook_failed_with_output(name: &str, exit_code: i32, stderr: &[u8], detail: Option<&str>) -> Self {
        let stderr_text = String::from_utf8_lossy(stderr).trim().to_string();
        let combined = match (stderr_text.is_empty(), detail) {
            (true, Some(d)) => Some(d.to_string()),
            (true, None) => None,
            (false, Some(d)) => Some(format!("{stderr_text}: {d}")),
            (false, None) => Some(stderr_text),
        };
        Error::HookFailed {
            name: name.to_string(),
            exit_code,
            detail: combined,
        }
    }

    /// Build an [`Error::EnvironmentSetup`].
    pub fn environment_setup(msg: &str) -> Self {
        Error::EnvironmentSetup(msg.to_string())
    }

    /// Build a [`Error::PolicyViolation`] without old/new ids.
    pub fn policy_violation(reason: &str, refname: &str) -> Self {
        Error::PolicyViolation {
            reason: reason.to_string(),
            refname: refname.to_string(),
            old: None,
            new: None,
            message: format!("policy '{reason}' rejected update to '{refname}'"),
        }
    }

    /// Build a [`Error::PolicyViolation`] carrying the old/new object ids for reporting.
    pub fn policy_violation_with_oids(
        reason: &str,
        refname: &str,
        old: Option<gix_hash::ObjectId>,
        new: Option<gix_hash::ObjectId>,
    ) -> Self {
        Error::PolicyViolation {
            reason: reason.to_string(),
            refname: refname.to_string(),
            old,
            new,
            message: format!("policy '{reason}' rejected update to '{refname}'"),
        }
    }
}

/// Opaque configuration for the receive-pack engine.
#[derive(Default, Debug, Clone)]
struct Config {
    mode: Mode,
    policy: PolicySet,
    atomic: bool,
}

/// Execution mode for receive-pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Blocking,
    #[cfg(feature = "async")]
    Async,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Blocking
    }
}

/// Builder for constructing a receive-pack instance with typestate guarantees.
#[derive(Debug, Clone)]
pub struct ReceivePackBuilder<S = state::Start> {
    cfg: Config,
    _state: PhantomData<S>,
}

impl ReceivePackBuilder<state::Start> {
    /// Create a new builder in the Start state.
    pub fn new() -> Self {
        Self {
            cfg: Config::default(),
            _state: PhantomData,
        }
    }

    /// Select blocking mode and move to Ready state.
    pub fn blocking(mut self) -> ReceivePackBuilder<state::Ready> {
        self.cfg.mode = Mode::Blocking;
        ReceivePackBuilder {
            cfg: self.cfg,
            _state: PhantomData,
        }
    }

    /// Select async mode and move to Ready state.
    ///
    /// Requires the "async" feature to be enabled.
    #[cfg(feature = "async")]
    pub fn r#async(mut self) -> ReceivePackBuilder<state::Ready> {
        self.cfg.mode = Mode::Async;
        ReceivePackBuilder {
            cfg: self.cfg,
            _state: PhantomData,
        }
    }
}

impl<S> ReceivePackBuilder<S> {
    /// Set the push policy to enforce.
    pub fn with_policy(mut self, policy: PolicySet) -> Self {
        self.cfg.policy = policy;
        self
    }

    /// Require every command in a push to succeed or none to be applied.
    pub fn with_atomic(mut self, atomic: bool) -> Self {
        self.cfg.atomic = atomic;
        self
    }
}

impl ReceivePackBuilder<state::Ready> {
    /// Finalize the builder and obtain a ReceivePack instance, driving hooks
    /// execution via `hooks`.
    ///
    /// This does no I/O and validates configuration.
    pub fn build<H: hooks::Hooks>(self, hooks: H) -> ReceivePack<H> {
        let engine = Engine::new(self.cfg.policy.clone(), hooks).with_atomic(self.cfg.atomic);
        ReceivePack {
            cfg: self.cfg,
            engine,
        }
    }
}

/// Receive-pack engine entry point, parameterized by the hook implementation
/// it drives (`hooks::NoopHooks` for tests, `hooks::ExternalHooks` for real
/// repositories behind the `hooks-external` feature).
pub struct ReceivePack<H: hooks::Hooks> {
    cfg: Config,
    engine: Engine<H>,
}

impl<H: hooks::Hooks> ReceivePack<H> {
    /// Run one push to completion, applying accepted updates via `updater` and
    /// returning the report to write back to the client.
    pub fn execute<R: std::io::BufRead, U: RefUpdater>(
        &mut self,
        request: PushRequest<'_, R>,
        updater: &mut U,
    ) -> Result<protocol::Report, Error> {
        let _mode = self.cfg.mode;
        self.engine.execute(request, updater)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hooks::NoopHooks;

    fn test_odb() -> gix_odb::Handle {
        let temp_dir = tempfile::tempdir().unwrap();
        let objects_dir = temp_dir.path().join("objects");
        std::fs::create_dir_all(&objects_dir).unwrap();
        gix_odb::at(objects_dir).unwrap()
    }

    fn test_ref_store() -> (tempfile::TempDir, gix_ref::file::Store) {
        let temp_dir = tempfile::tempdir().unwrap();
        let git_dir = temp_dir.path().join(".git");
        std::fs::create_dir_all(&git_dir).unwrap();
        let store = gix_ref::file::Store::at(
            git_dir,
            gix_ref::store::init::Options {
                write_reflog: gix_ref::store::WriteReflog::Disable,
                object_hash: gix_hash::Kind::Sha1,
                precompose_unicode: false,
                prohibit_windows_device_names: false,
            },
        );
        (temp_dir, store)
    }

    #[test]
    fn builder_blocking_runs_an_empty_push_cleanly() {
        let mut rp = ReceivePackBuilder::new().blocking().build(NoopHooks::new());

        let odb = test_odb();
        let (_temp_dir, ref_store) = test_ref_store();
        let mut updater = LooseFileRefUpdater::new(&ref_store);

        let report = rp
            .execute::<&[u8], _>(
                PushRequest {
                    head_info: "",
                    pack: None,
                    main_odb: &odb,
                    ref_store: &ref_store,
                    visible_refs: &[],
                    main_objects_dir: _temp_dir.path().join("objects"),
                },
                &mut updater,
            )
            .unwrap();
        assert!(report.all_ok());
    }
}