//! Concrete [`Service`](gix_serve_core::service::Service) implementations the daemon's
//! accept loop dispatches to, one per `ServiceKind` in `spec.md` §2's component table.
//!
//! These are thin adapters: all protocol logic lives in `gix-upload-pack` and
//! `gix-receive-pack`; this module only bridges the shared `ServerRequest` envelope
//! `gix-serve-core` defines to each crate's own entry point.

use std::io::{Read, Write};

use gix_serve_core::protocol::ServerRequest;
use gix_serve_core::service::{Error as ServiceError, Service};

use gix_receive_pack::hooks::Hooks;
use gix_receive_pack::protocol::{CapabilitySet, RefRecord};
use gix_receive_pack::session::SessionContext;
use gix_receive_pack::{engine::LooseFileRefUpdater, ReceivePack};
use gix_upload_pack::config::ServerOptions as UploadPackOptions;
use gix_upload_pack::server::Server as UploadPackServer;
use gix_serve_core::visibility::VisibleRoots;

/// Serves `git-upload-pack`: ref advertisement, want/have negotiation, pack generation.
pub struct UploadPackService {
    options: UploadPackOptions,
}

impl UploadPackService {
    /// Build a service that serves every connection with `options`.
    pub fn new(options: UploadPackOptions) -> Self {
        Self { options }
    }
}

impl<R: Read, W: Write> Service<R, W> for UploadPackService {
    fn handle(&mut self, req: ServerRequest<'_, R, W>) -> Result<(), ServiceError> {
        let mut server = UploadPackServer::new(req.repo.path(), self.options.clone())
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        server
            .serve(req.input, req.output)
            .map_err(|e| ServiceError::Protocol(e.to_string()))
    }
}

/// Serves `git-receive-pack`: command parsing, policy, pack ingestion, connectivity
/// checking, ref updates, and status reporting.
///
/// Parameterized by the hook implementation, the same way [`ReceivePack`] is, so the
/// daemon can be built with `gix_receive_pack::hooks::NoopHooks` in tests and
/// `gix_receive_pack::hooks::ExternalHooks` (behind the `hooks-external` feature) in
/// production.
pub struct ReceivePackService<H: Hooks> {
    receive_pack: ReceivePack<H>,
    capabilities: CapabilitySet,
    hidden: Option<std::sync::Arc<gix_receive_pack::protocol::HiddenRefPredicate>>,
}

impl<H: Hooks> ReceivePackService<H> {
    /// Build a service driving `receive_pack` for every connection, advertising
    /// `capabilities` and hiding refs matched by `hidden` (if any).
    pub fn new(
        receive_pack: ReceivePack<H>,
        capabilities: CapabilitySet,
        hidden: Option<std::sync::Arc<gix_receive_pack::protocol::HiddenRefPredicate>>,
    ) -> Self {
        Self {
            receive_pack,
            capabilities,
            hidden,
        }
    }
}

impl<R: Read, W: Write, H: Hooks> Service<R, W> for ReceivePackService<H> {
    fn handle(&mut self, req: ServerRequest<'_, R, W>) -> Result<(), ServiceError> {
        let main_odb = req.repo.objects.clone().into_inner();
        let ref_store = &req.repo.refs;
        let main_objects_dir = req.repo.path().join("objects");

        let hidden_predicate = |r: &gix_serve_core::visibility::RefRecord| -> bool {
            self.hidden
                .as_ref()
                .map(|pred| pred(&RefRecord::new(r.id, r.name.clone())))
                .unwrap_or(false)
        };
        let visible = VisibleRoots::new(req.repo, std::sync::Arc::new(hidden_predicate))
            .collect()
            .map_err(ServiceError::Validation)?;
        let refs: Vec<RefRecord> = visible.into_iter().map(|(name, id)| RefRecord::new(id, name)).collect();

        let mut input = req.input;
        let mut output = req.output;
        let ctx = SessionContext {
            refs: &refs,
            capabilities: &self.capabilities,
            hidden: self.hidden.as_deref(),
            main_odb: &main_odb,
            ref_store,
            main_objects_dir,
        };
        let mut updater = LooseFileRefUpdater::new(ref_store);

        gix_receive_pack::session::serve(&mut input, &mut output, &ctx, &mut self.receive_pack, &mut updater)
            .map_err(|e| ServiceError::Protocol(e.to_string()))
    }
}
