//! The want/have negotiation algorithm itself.
//!
//! Implements `spec.md` §4.3 steps 1-5: send `want` lines, seed the local
//! commit graph from the client's own refs, drive batches of `have` lines,
//! dispatch the remote's ACK/NAK responses, and decide when to stop.

use std::collections::{BTreeSet, BinaryHeap};
use std::io::{Read, Write};

use gix_hash::ObjectId;
use gix_packetline_blocking::{PacketLineRef, StreamingPeekableIter};

use crate::capabilities::ClientCapabilities;
use crate::error::{Error, Result};
use crate::graph::{CommitSource, Flags, Graph, NodeId};

/// Maximum number of `have` lines sent before a flush packet invites a response.
pub const HAVE_BATCH_SIZE: usize = 32;

/// If this many haves pass without the server replying with an `ACK ... continue`,
/// the negotiator gives up trying to narrow further and sends `done`.
pub const MAX_HAVES_SINCE_LAST_CONTINUE: usize = 256;

const FLUSH_PKT_DELIMITERS: [PacketLineRef<'static>; 1] = [PacketLineRef::Flush];

/// What the remote said about one `have`/`done` round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// No common object was found yet.
    Nak,
    /// A bare `ACK <id>` with no qualifier: classic single-ACK mode. The
    /// server has enough and is about to stream the pack; negotiation stops
    /// here without the client ever sending `done` (`spec.md` §4.3 step 4).
    Final(ObjectId),
    /// `ACK <id> common` (`multi_ack`/`multi_ack_detailed`): `id` is common,
    /// negotiation continues.
    Common(ObjectId),
    /// `id` is common and the server invites another batch immediately.
    Continue(ObjectId),
    /// `id` is common and the server is ready to send the pack.
    Ready(ObjectId),
}

/// Outcome of a complete negotiation.
#[derive(Debug, Clone)]
pub struct NegotiationOutcome {
    /// Objects confirmed common with the remote.
    pub common: Vec<ObjectId>,
    /// Whether the negotiation concluded with zero wants, meaning no pack
    /// channel should be opened at all.
    pub nothing_to_fetch: bool,
}

/// Drives one negotiation session against a single remote connection.
pub struct Negotiator<'s, S: CommitSource> {
    graph: Graph<'s, S>,
    capabilities: ClientCapabilities,
    /// Commit-time-ordered work queue, keyed `(commit_time, arena index)` so
    /// the max-heap pops the newest commit first. Parents of a popped commit
    /// are pushed back in here (`spec.md` §4.3 step 3 / §6.2), so the queue
    /// keeps descending into history for as long as there is anything left
    /// that isn't already known `COMMON`.
    queue: BinaryHeap<(i64, u32)>,
    common: BTreeSet<ObjectId>,
    haves_since_last_continue: usize,
}

impl<'s, S: CommitSource> Negotiator<'s, S> {
    /// Start a new negotiation backed by `source` for commit lookups.
    pub fn new(source: &'s S, capabilities: ClientCapabilities) -> Self {
        Self {
            graph: Graph::new(source),
            capabilities,
            queue: BinaryHeap::new(),
            common: BTreeSet::new(),
            haves_since_last_continue: 0,
        }
    }

    /// Seed the negotiator with the tips of every local ref, marking them
    /// `REACHABLE` and queuing them in descending commit-time order
    /// (`spec.md` §6.2).
    pub fn seed(&mut self, local_tips: impl IntoIterator<Item = ObjectId>) -> Result<()> {
        for tip in local_tips {
            let node = self.graph.materialize(&tip)?;
            self.graph.insert_flags(node, Flags::REACHABLE | Flags::LOCALLY_SEEN);
            self.enqueue(node);
        }
        Ok(())
    }

    /// Push `node` onto the work queue unless it is already queued or has
    /// already been confirmed common (in which case probing it again would
    /// be wasted round-trips).
    fn enqueue(&mut self, node: NodeId) {
        let flags = self.graph.flags(node);
        if flags.contains(Flags::IN_WORK_QUEUE) || flags.contains(Flags::COMMON) {
            return;
        }
        self.graph.insert_flags(node, Flags::IN_WORK_QUEUE);
        self.queue.push((self.graph.commit_time(node), node_index(node)));
    }

    /// Run the full negotiation over `wants` against `read`/`write`, which
    /// must already be positioned just after the ref advertisement.
    pub fn negotiate<R: Read, W: Write>(
        &mut self,
        wants: &[ObjectId],
        mut read: R,
        mut write: W,
    ) -> Result<NegotiationOutcome> {
        if wants.is_empty() {
            return Ok(NegotiationOutcome {
                common: Vec::new(),
                nothing_to_fetch: true,
            });
        }

        self.send_wants(wants, &mut write)?;

        loop {
            let batch = self.next_have_batch();
            if batch.is_empty() {
                self.send_done(&mut write)?;
                self.read_final_ack(&mut read)?;
                break;
            }
            self.send_haves(&batch, &mut write)?;
            let acks = self.read_acks(&mut read)?;
            let mut saw_continue = false;
            for ack in acks {
                match ack {
                    Ack::Nak => {}
                    Ack::Final(id) => {
                        // Classic single-ACK mode: the server is about to stream the
                        // pack directly, no `done` line is sent (spec.md §4.3 step 4).
                        self.mark_common(id)?;
                        return Ok(self.outcome());
                    }
                    Ack::Common(id) => {
                        self.mark_common(id)?;
                    }
                    Ack::Continue(id) => {
                        self.mark_common(id)?;
                        saw_continue = true;
                        self.haves_since_last_continue = 0;
                    }
                    Ack::Ready(id) => {
                        self.mark_common(id)?;
                        self.send_done(&mut write)?;
                        return Ok(self.outcome());
                    }
                }
            }
            if !saw_continue {
                self.haves_since_last_continue += batch.len();
            }
            if self.haves_since_last_continue > MAX_HAVES_SINCE_LAST_CONTINUE {
                self.send_done(&mut write)?;
                self.read_final_ack(&mut read)?;
                break;
            }
        }

        Ok(self.outcome())
    }

    fn outcome(&self) -> NegotiationOutcome {
        NegotiationOutcome {
            common: self.common.iter().copied().collect(),
            nothing_to_fetch: false,
        }
    }

    fn mark_common(&mut self, id: ObjectId) -> Result<()> {
        let node = self.graph.materialize(&id)?;
        self.graph.insert_flags(node, Flags::COMMON);
        self.graph.carry_to_ancestors(node, Flags::COMMON)?;
        self.common.insert(id);
        Ok(())
    }

    fn next_have_batch(&mut self) -> Vec<ObjectId> {
        let mut batch = Vec::with_capacity(HAVE_BATCH_SIZE);
        while batch.len() < HAVE_BATCH_SIZE {
            let Some((_, idx)) = self.queue.pop() else {
                break;
            };
            let node = NodeId::from_index(idx);
            if self.graph.flags(node).contains(Flags::COMMON) {
                continue;
            }
            batch.push(self.graph.id(node));
            // Walking commits alone would exhaust the ref tips after one batch;
            // push parents back onto the queue so the have-walk descends history
            // (spec.md §4.3 step 3).
            let parents: Vec<NodeId> = self.graph.parents(node).collect();
            for parent in parents {
                self.enqueue(parent);
            }
        }
        batch
    }

    fn send_wants<W: Write>(&self, wants: &[ObjectId], write: &mut W) -> Result<()> {
        let caps = self.capabilities.to_capability_string();
        for (i, want) in wants.iter().enumerate() {
            let line = if i == 0 && !caps.is_empty() {
                format!("want {want} {caps}\n")
            } else {
                format!("want {want}\n")
            };
            gix_packetline_blocking::encode::text_to_write(line.as_bytes(), write).map_err(Error::Io)?;
        }
        gix_packetline_blocking::encode::flush_to_write(write).map_err(Error::Io)?;
        Ok(())
    }

    fn send_haves<W: Write>(&self, haves: &[ObjectId], write: &mut W) -> Result<()> {
        for have in haves {
            let line = format!("have {have}\n");
            gix_packetline_blocking::encode::text_to_write(line.as_bytes(), write).map_err(Error::Io)?;
        }
        gix_packetline_blocking::encode::flush_to_write(write).map_err(Error::Io)?;
        Ok(())
    }

    fn send_done<W: Write>(&self, write: &mut W) -> Result<()> {
        if self.capabilities.no_done {
            return Ok(());
        }
        gix_packetline_blocking::encode::text_to_write(b"done\n", write).map_err(Error::Io)?;
        Ok(())
    }

    fn read_acks<R: Read>(&self, read: &mut R) -> Result<Vec<Ack>> {
        let mut iter = StreamingPeekableIter::new(read, &FLUSH_PKT_DELIMITERS, false);
        let mut acks = Vec::new();
        while let Some(line) = iter.read_line() {
            let line = line.map_err(Error::Io)?.map_err(Error::PacketlineDecode)?;
            match line {
                PacketLineRef::Flush => break,
                PacketLineRef::Data(data) => {
                    let text = std::str::from_utf8(data)
                        .map_err(|_| Error::ProtocolViolation("non utf-8 ack line".into()))?
                        .trim_end();
                    acks.push(parse_ack_line(text)?);
                }
                _ => {
                    return Err(Error::ProtocolViolation(
                        "expected ACK/NAK, got delimiter or response-end".into(),
                    ))
                }
            }
        }
        Ok(acks)
    }

    fn read_final_ack<R: Read>(&self, read: &mut R) -> Result<()> {
        let acks = self.read_acks(read)?;
        if acks
            .iter()
            .any(|a| matches!(a, Ack::Final(_) | Ack::Common(_) | Ack::Continue(_) | Ack::Ready(_)))
            || acks.is_empty()
        {
            Ok(())
        } else {
            Err(Error::ProtocolViolation("expected final ACK/NAK after done".into()))
        }
    }
}

fn parse_ack_line(text: &str) -> Result<Ack> {
    if text == "NAK" {
        return Ok(Ack::Nak);
    }
    let mut parts = text.split(' ');
    match parts.next() {
        Some("ACK") => {}
        _ => return Err(Error::ProtocolViolation(format!("unrecognized negotiation line: {text}"))),
    }
    let id_str = parts
        .next()
        .ok_or_else(|| Error::ProtocolViolation("ACK line missing object id".into()))?;
    let id = ObjectId::from_hex(id_str.as_bytes())
        .map_err(|e| Error::ProtocolViolation(format!("invalid object id in ACK line: {e}")))?;
    match parts.next() {
        None => Ok(Ack::Final(id)),
        Some("continue") => Ok(Ack::Continue(id)),
        Some("common") => Ok(Ack::Common(id)),
        Some("ready") => Ok(Ack::Ready(id)),
        Some(other) => Err(Error::ProtocolViolation(format!("unknown ACK qualifier: {other}"))),
    }
}

fn node_index(node: NodeId) -> u32 {
    node.as_index()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ParsedCommit;
    use smallvec::SmallVec;
    use std::collections::HashMap;

    struct FixedSource {
        commits: HashMap<ObjectId, ParsedCommit>,
    }

    impl CommitSource for FixedSource {
        fn parse_commit(&self, id: &ObjectId) -> Result<Option<ParsedCommit>> {
            Ok(self.commits.get(id).cloned())
        }
    }

    fn oid(b: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = b;
        ObjectId::from_bytes_or_panic(&bytes)
    }

    #[test]
    fn zero_wants_short_circuits_without_io() {
        let source = FixedSource {
            commits: HashMap::new(),
        };
        let mut negotiator = Negotiator::new(&source, ClientCapabilities::wanted_defaults());
        let mut no_read: &[u8] = &[];
        let mut no_write = Vec::new();
        let outcome = negotiator.negotiate(&[], &mut no_read, &mut no_write).unwrap();
        assert!(outcome.nothing_to_fetch);
        assert!(no_write.is_empty(), "must not open a pack channel for zero wants");
    }

    #[test]
    fn parses_ack_qualifiers() {
        let id = oid(1);
        let line = format!("ACK {id} continue");
        assert_eq!(parse_ack_line(&line).unwrap(), Ack::Continue(id));
        let line = format!("ACK {id} ready");
        assert_eq!(parse_ack_line(&line).unwrap(), Ack::Ready(id));
        let line = format!("ACK {id} common");
        assert_eq!(parse_ack_line(&line).unwrap(), Ack::Common(id));
        let line = format!("ACK {id}");
        assert_eq!(parse_ack_line(&line).unwrap(), Ack::Final(id));
        assert_eq!(parse_ack_line("NAK").unwrap(), Ack::Nak);
    }

    #[test]
    fn seed_orders_queue_by_descending_commit_time() {
        let a = oid(1);
        let b = oid(2);
        let mut commits = HashMap::new();
        commits.insert(
            a,
            ParsedCommit {
                parents: SmallVec::new(),
                commit_time: 10,
            },
        );
        commits.insert(
            b,
            ParsedCommit {
                parents: SmallVec::new(),
                commit_time: 200,
            },
        );
        let source = FixedSource { commits };
        let mut negotiator = Negotiator::new(&source, ClientCapabilities::wanted_defaults());
        negotiator.seed([a, b]).unwrap();
        let batch = negotiator.next_have_batch();
        assert_eq!(batch[0], b, "higher commit time must be queued first");
        assert_eq!(batch[1], a);
    }
}
