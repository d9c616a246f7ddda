//! Stateless-RPC negotiation support.
//!
//! Over HTTP, each negotiation round is an independent request/response pair:
//! the server remembers nothing between them, so the client must replay every
//! `have` it has already sent in every subsequent round. This requires
//! `multi_ack_detailed`, since plain `multi_ack`/single-ACK modes cannot tell
//! the client which of the replayed haves are still useful.

use std::io::Write;

use gix_hash::ObjectId;

use crate::capabilities::ClientCapabilities;
use crate::error::{Error, Result};

/// Accumulates every `have` sent so far across stateless-RPC rounds so it can
/// be replayed verbatim at the start of the next one.
#[derive(Debug, Clone, Default)]
pub struct ReplayBuffer {
    sent: Vec<ObjectId>,
}

impl ReplayBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify the capability set is usable for stateless RPC before any round
    /// is sent, per `spec.md` §4.3.
    pub fn require_detailed_ack(capabilities: &ClientCapabilities) -> Result<()> {
        if capabilities.multi_ack_detailed {
            Ok(())
        } else {
            Err(Error::StatelessRPCRequiresDetailedAck)
        }
    }

    /// Record that `have` was sent in the round just completed.
    pub fn record(&mut self, have: ObjectId) {
        self.sent.push(have);
    }

    /// Record a full batch at once.
    pub fn record_batch(&mut self, haves: impl IntoIterator<Item = ObjectId>) {
        self.sent.extend(haves);
    }

    /// Every `have` line sent in prior rounds, oldest first.
    pub fn previously_sent(&self) -> &[ObjectId] {
        &self.sent
    }

    /// Write every previously-sent `have` line to `write`, for replay at the
    /// start of a new stateless-RPC round. Does not write a trailing flush;
    /// callers append the current round's new haves before flushing.
    pub fn replay<W: Write>(&self, write: &mut W) -> Result<()> {
        for have in &self.sent {
            let line = format!("have {have}\n");
            gix_packetline_blocking::encode::text_to_write(line.as_bytes(), write).map_err(Error::Io)?;
        }
        Ok(())
    }

    /// Number of haves accumulated so far.
    pub fn len(&self) -> usize {
        self.sent.len()
    }

    /// Whether nothing has been sent yet.
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(b: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = b;
        ObjectId::from_bytes_or_panic(&bytes)
    }

    #[test]
    fn rejects_negotiation_without_detailed_ack() {
        let mut caps = ClientCapabilities::wanted_defaults();
        caps.multi_ack_detailed = false;
        let err = ReplayBuffer::require_detailed_ack(&caps).unwrap_err();
        assert!(matches!(err, Error::StatelessRPCRequiresDetailedAck));
    }

    #[test]
    fn replay_reproduces_every_prior_have_in_order() {
        let mut buffer = ReplayBuffer::new();
        buffer.record(oid(1));
        buffer.record(oid(2));
        let mut out = Vec::new();
        buffer.replay(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let first = oid(1);
        let second = oid(2);
        assert!(text.contains(&first.to_string()));
        assert!(text.contains(&second.to_string()));
        assert!(
            text.find(&first.to_string()).unwrap() < text.find(&second.to_string()).unwrap(),
            "replay must preserve send order"
        );
    }
}
