//! Orchestrates the full receive-pack pipeline: parse, enforce policy, ingest
//! the pack, run hooks, check connectivity, apply ref updates, and report status.
//!
//! Each phase below is implemented by its own module (`protocol::commands`,
//! `policy`, `pack`, `hooks`, `connectivity`); this module only sequences them
//! and turns per-command failures into [`protocol::report::Report`] entries
//! instead of aborting the whole push, matching Git's "independent ref
//! updates" behavior: one rejected ref does not block the others unless the
//! `atomic` capability was negotiated.

use std::io;

use gix_odb::Handle as OdbHandle;

use crate::connectivity::{ConnectivityChecker, DefaultConnectivityChecker};
use crate::hooks::Hooks;
use crate::pack::Quarantine;
use crate::policy::PolicySet;
use crate::protocol::{CommandList, CommandUpdate, RefRecord, Report, UnpackStatus};
use crate::Error;

/// Applies a single accepted command to the ref store.
///
/// Pulled out behind a trait, in the same spirit as [`Hooks`] and
/// [`ConnectivityChecker`], so the pipeline's structure does not hinge on one
/// fixed ref-storage backend.
pub trait RefUpdater {
    /// Apply `command`, which has already passed policy, hooks, and connectivity.
    fn apply(&mut self, command: &CommandUpdate) -> Result<(), Error>;
}

/// A [`RefUpdater`] that writes loose refs directly under the ref store's git
/// directory, the same way the policy module's own tests set up fixtures:
/// one oid-per-line file per ref, removed outright on delete.
///
/// This does not maintain packed-refs or write reflogs; repositories that
/// need those should supply their own [`RefUpdater`].
pub struct LooseFileRefUpdater<'a> {
    ref_store: &'a gix_ref::file::Store,
}

impl<'a> LooseFileRefUpdater<'a> {
    /// Build an updater that writes loose ref files under `ref_store`'s git directory.
    pub fn new(ref_store: &'a gix_ref::file::Store) -> Self {
        Self { ref_store }
    }
}

impl RefUpdater for LooseFileRefUpdater<'_> {
    fn apply(&mut self, command: &CommandUpdate) -> Result<(), Error> {
        let path = self.ref_store.git_dir().join(command.name());
        match command {
            CommandUpdate::Create { new, .. } | CommandUpdate::Update { new, .. } => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, format!("{new}\n"))?;
            }
            CommandUpdate::Delete { .. } => {
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
            }
        }
        Ok(())
    }
}

/// Everything the engine needs from the surrounding repository and transport
/// to drive one push to completion.
pub struct Engine<H: Hooks> {
    policy: PolicySet,
    hooks: H,
    /// Whether a single rejected command aborts the whole push (the `atomic`
    /// capability).
    atomic: bool,
}

/// What the caller must supply per invocation: the raw head-info text, the
/// incoming pack bytes, and handles to the repository's ref store and object
/// database.
pub struct PushRequest<'a, R: io::BufRead> {
    /// Raw head-info text (command lines plus capability/push-option/shallow lines).
    pub head_info: &'a str,
    /// The incoming pack stream, or `None` if the push only deletes refs.
    pub pack: Option<&'a mut R>,
    /// The repository's main object database, used for fast-forward and
    /// connectivity checks and as the thin-pack base lookup.
    pub main_odb: &'a OdbHandle,
    /// The repository's ref store, used to resolve the current branch for
    /// policy evaluation.
    pub ref_store: &'a gix_ref::file::Store,
    /// Every visible (non-hidden) ref currently in the repository, used both
    /// as the connectivity check's haves boundary and, together with the
    /// commands, to determine what advertisement looked like before this push.
    pub visible_refs: &'a [RefRecord],
    /// Directory to quarantine the incoming pack in before migrating it in.
    pub main_objects_dir: std::path::PathBuf,
}

impl<H: Hooks> Engine<H> {
    /// Build an engine that will run `hooks` and enforce `policy`.
    pub fn new(policy: PolicySet, hooks: H) -> Self {
        Self {
            policy,
            hooks,
            atomic: false,
        }
    }

    /// Require every command to succeed or none to be applied.
    pub fn with_atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    /// Run the full pipeline against `updater` and produce the report to send
    /// back to the client.
    pub fn execute<R: io::BufRead, U: RefUpdater>(
        &mut self,
        request: PushRequest<'_, R>,
        updater: &mut U,
    ) -> Result<Report, Error> {
        let (commands, _options) = CommandList::parse_from_text(request.head_info)?;

        let policy_results: Vec<Result<(), Error>> = commands
            .iter()
            .map(|command| self.policy.evaluate(command, request.ref_store, request.main_odb))
            .collect();
        let any_command_allowed = policy_results.iter().any(Result::is_ok);

        let (unpack_status, mut quarantine) = if any_command_allowed {
            match self.ingest_pack(request.pack, &request.main_objects_dir, request.main_odb) {
                Ok(quarantine) => (UnpackStatus::Ok, quarantine),
                Err(e) => (UnpackStatus::Failed(e.to_string()), None),
            }
        } else {
            (UnpackStatus::Ok, None)
        };
        let unpack_ok = matches!(unpack_status, UnpackStatus::Ok);
        let mut report = Report::new().unpack(unpack_status);

        if !unpack_ok {
            for command in commands.iter() {
                report = report.failed(command.name(), "unpacker error");
            }
            return Ok(report);
        }

        let all_commands: Vec<CommandUpdate> = commands.iter().cloned().collect();
        let pre_receive_decision = self.hooks.pre_receive(&all_commands)?;
        if !pre_receive_decision.allowed {
            if let Some(mut q) = quarantine.take() {
                q.drop_on_failure()?;
            }
            for command in commands.iter() {
                report = report.failed(command.name(), "pre-receive hook declined");
            }
            return Ok(report);
        }

        // name -> outcome, Ok(()) meaning "still a candidate for application".
        let mut outcomes: Vec<(&CommandUpdate, Result<(), String>)> = Vec::with_capacity(commands.len());
        for (command, policy_result) in commands.iter().zip(policy_results.into_iter()) {
            let outcome = match policy_result {
                Err(e) => Err(e.to_string()),
                Ok(()) => match self.hooks.update(command) {
                    Ok(decision) if decision.allowed => Ok(()),
                    Ok(decision) => Err(decision.message),
                    Err(e) => Err(e.to_string()),
                },
            };
            outcomes.push((command, outcome));
        }

        if self.atomic && outcomes.iter().any(|(_, r)| r.is_err()) {
            if let Some(mut q) = quarantine.take() {
                q.drop_on_failure()?;
            }
            for (command, _) in &outcomes {
                report = report.failed(command.name(), "atomic transaction failed");
            }
            return Ok(report);
        }

        let accepted: Vec<CommandUpdate> = outcomes
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(c, _)| (*c).clone())
            .collect();

        if !accepted.is_empty() {
            // Check against the quarantine (which sees both the just-received objects
            // and, via 'info/alternates', the main ODB) so a pack that fails
            // connectivity is never migrated in.
            let checker_odb = match &quarantine {
                Some(q) => gix_odb::at(&q.objects_dir)
                    .map_err(|e| Error::Validation(format!("failed to open quarantine object database: {e}")))?,
                None => request.main_odb.clone(),
            };
            let mut checker = DefaultConnectivityChecker::new(Default::default(), checker_odb);
            if let Err(e) = checker.check(&accepted, request.visible_refs) {
                let reason = format!("connectivity check failed: {e}");
                for (_, result) in outcomes.iter_mut() {
                    if result.is_ok() {
                        *result = Err(reason.clone());
                    }
                }
            }
        }

        // The pack is migrated into the main ODB only once something still
        // intends to use its contents; otherwise it is discarded with the
        // quarantine directory, atomically, via `drop_on_failure`.
        if let Some(mut q) = quarantine.take() {
            if outcomes.iter().any(|(_, r)| r.is_ok()) {
                q.migrate_on_success()?;
            } else {
                q.drop_on_failure()?;
            }
        }

        let mut applied: Vec<CommandUpdate> = Vec::new();
        for (command, result) in outcomes {
            match result {
                Ok(()) => match updater.apply(command) {
                    Ok(()) => {
                        report = report.ok(command.name());
                        applied.push(command.clone());
                    }
                    Err(e) => report = report.failed(command.name(), e.to_string()),
                },
                Err(reason) => report = report.failed(command.name(), reason),
            }
        }

        if !applied.is_empty() {
            self.hooks.post_receive(&applied)?;
        }

        Ok(report)
    }

    /// Ingest the incoming pack into a freshly activated quarantine and hand the
    /// still-active quarantine back to the caller, which migrates it into the
    /// main object database only after the connectivity check passes (or drops
    /// it, on any failure between here and there).
    fn ingest_pack<R: io::BufRead>(
        &self,
        pack: Option<&mut R>,
        main_objects_dir: &std::path::Path,
        main_odb: &OdbHandle,
    ) -> Result<Option<Quarantine>, Error> {
        let Some(_pack) = pack else {
            return Ok(None);
        };
        let mut quarantine = Quarantine::new(main_objects_dir);
        quarantine.activate()?;

        #[cfg(feature = "progress")]
        let result = {
            use gix_features::progress::Discard;
            let mut progress = Discard;
            crate::pack::PackIngestor::index_pack(
                _pack,
                &quarantine.objects_dir,
                None,
                Some(main_odb.clone()),
                &mut progress,
            )
        };
        #[cfg(not(feature = "progress"))]
        let result = {
            let _ = main_odb;
            crate::pack::PackIngestor::index_pack_stub()
        };

        match result {
            Ok(()) => Ok(Some(quarantine)),
            Err(e) => {
                quarantine.drop_on_failure()?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::hooks::NoopHooks;
    use crate::policy::PolicySet;

    use super::*;

    #[test]
    fn engine_builds_with_noop_hooks() {
        let _engine = Engine::new(PolicySet::default(), NoopHooks::new());
    }

    #[test]
    fn loose_file_ref_updater_writes_and_removes_refs() {
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
        let mut updater = LooseFileRefUpdater::new(&store);

        let oid = gix_hash::ObjectId::from_hex(b"1111111111111111111111111111111111111111").unwrap();
        updater
            .apply(&CommandUpdate::Create {
                new: oid,
                name: "refs/heads/main".to_string(),
            })
            .unwrap();
        let written = std::fs::read_to_string(store.git_dir().join("refs/heads/main")).unwrap();
        assert_eq!(written.trim(), oid.to_string());

        updater
            .apply(&CommandUpdate::Delete {
                old: oid,
                name: "refs/heads/main".to_string(),
            })
            .unwrap();
        assert!(!store.git_dir().join("refs/heads/main").exists());
    }
}
