//! `git daemon`-compatible TCP accept loop dispatching connections to
//! `gix-upload-pack` and `gix-receive-pack`, per `spec.md` §4.7.
//!
//! The daemon itself speaks no pack-protocol: it reads exactly one request line
//! (`<service> <path>\0host=<host>\0`), resolves a repository, and hands the
//! connection's raw reader/writer to whichever [`gix_serve_core::service::Service`]
//! implementation matches the requested service.

pub mod config;
pub mod daemon;
pub mod error;
pub mod request;
pub mod resolver;
pub mod service;

pub use config::DaemonOptions;
pub use daemon::{Daemon, DaemonState};
pub use error::{Error, Result};
pub use request::ServiceKind;
pub use resolver::{PathResolver, RepositoryResolver, ResolvedRepository};
pub use service::{ReceivePackService, UploadPackService};
