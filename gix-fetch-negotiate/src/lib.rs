//! Client-side want/have negotiation for Git's pack transfer protocol.
//!
//! This crate drives the client half of the fetch negotiation dance described
//! by the smart HTTP/Git protocol: advertise-independent `want`/`have`
//! exchange, ACK dispatch, and the `done` handshake that tells the remote to
//! start streaming a pack. It deliberately knows nothing about how commits
//! are stored; callers supply a [`graph::CommitSource`] backed by whatever
//! object database they use.

#![forbid(unsafe_code)]

pub mod capabilities;
pub mod error;
pub mod graph;
pub mod negotiate;
pub mod stateless;

pub use capabilities::ClientCapabilities;
pub use error::{Error, Result};
pub use graph::{CommitSource, Flags, Graph, NodeId, ParsedCommit};
pub use negotiate::{Ack, NegotiationOutcome, Negotiator, HAVE_BATCH_SIZE, MAX_HAVES_SINCE_LAST_CONTINUE};
pub use stateless::ReplayBuffer;
