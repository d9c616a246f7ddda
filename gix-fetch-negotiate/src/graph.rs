//! Arena-based commit graph with carried flag bits.
//!
//! Per the design notes this replaces object-identity mutation with index-based
//! updates: commits are interned into a `Vec<Node>` keyed by [`gix_hash::ObjectId`],
//! and every reference to a commit elsewhere in the negotiator is a `u32` index
//! into that arena. Flags live on the node itself as a small bitset and are
//! carried to parents during materialization, never by walking back over
//! already-visited nodes.

use std::collections::HashMap;

use gix_hash::ObjectId;
use smallvec::SmallVec;

use crate::error::{Error, Result};

/// The narrow commit-graph contract the negotiator needs from the object store
/// (`spec.md` §6.2): decode a commit far enough to learn its parents and time.
pub trait CommitSource {
    /// Parse the commit named by `id`, returning its parents and commit time.
    ///
    /// Implementations may return `Ok(None)` if `id` does not name a commit
    /// (e.g. it is a tag or blob); the graph then treats it as a leaf with no
    /// parents and a minimal commit time.
    fn parse_commit(&self, id: &ObjectId) -> Result<Option<ParsedCommit>>;
}

/// The parts of a commit the negotiator cares about.
#[derive(Debug, Clone)]
pub struct ParsedCommit {
    /// Parent commit ids, in the order they appear in the commit object.
    pub parents: SmallVec<[ObjectId; 2]>,
    /// Commit time, seconds since epoch, used to order the priority queue.
    pub commit_time: i64,
}

/// Per-commit negotiation flags, carried to parents under the rules in
/// `spec.md` §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    /// Present in the server's advertisement.
    pub const ADVERTISED: Flags = Flags(1 << 0);
    /// Reachable from a local ref or an additional "already have".
    pub const REACHABLE: Flags = Flags(1 << 1);
    /// Known or inferred common to both sides.
    pub const COMMON: Flags = Flags(1 << 2);
    /// Currently queued for a have-batch or seed walk.
    pub const IN_WORK_QUEUE: Flags = Flags(1 << 3);
    /// Already materialized into the arena at least once.
    pub const LOCALLY_SEEN: Flags = Flags(1 << 4);

    /// The empty flag set.
    pub const fn empty() -> Self {
        Flags(0)
    }

    /// Whether `self` contains every bit set in `other`.
    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for Flags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Flags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::ops::BitAnd for Flags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Flags(self.0 & rhs.0)
    }
}

/// One interned commit.
#[derive(Debug, Clone)]
struct Node {
    id: ObjectId,
    parents: SmallVec<[u32; 2]>,
    commit_time: i64,
    flags: Flags,
}

/// Opaque index into the [`Graph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Recover the raw arena index, for callers that need to stash it outside
    /// the graph (e.g. in a priority queue keyed on commit time).
    pub fn as_index(self) -> u32 {
        self.0
    }

    /// Rebuild a `NodeId` from a raw arena index previously obtained via
    /// [`NodeId::as_index`].
    pub fn from_index(index: u32) -> Self {
        NodeId(index)
    }
}

/// Arena of interned commits with carried flag bits.
///
/// Materializing a commit that is already present is a no-op beyond flag
/// carrying; materializing a new one parses it via the [`CommitSource`] and
/// recurses is *not* performed eagerly — callers materialize parents lazily as
/// the negotiator's work queues pop them, so a single `want` does not force a
/// full-history parse up front.
pub struct Graph<'s, S: CommitSource> {
    source: &'s S,
    nodes: Vec<Node>,
    index: HashMap<ObjectId, NodeId>,
}

impl<'s, S: CommitSource> Graph<'s, S> {
    /// Create an empty graph backed by `source`.
    pub fn new(source: &'s S) -> Self {
        Self {
            source,
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Intern `id`, parsing it via the [`CommitSource`] the first time it is seen.
    pub fn materialize(&mut self, id: &ObjectId) -> Result<NodeId> {
        if let Some(existing) = self.index.get(id) {
            return Ok(*existing);
        }
        let parsed = self.source.parse_commit(id)?;
        let (parents, commit_time) = match parsed {
            Some(p) => (p.parents, p.commit_time),
            None => (SmallVec::new(), i64::MIN),
        };
        let node_idx = self.nodes.len() as u32;
        self.nodes.push(Node {
            id: *id,
            parents: SmallVec::new(),
            commit_time,
            flags: Flags::empty(),
        });
        self.index.insert(*id, NodeId(node_idx));

        let mut parent_indices = SmallVec::<[u32; 2]>::new();
        for parent in &parents {
            let parent_node = self.materialize(parent)?;
            parent_indices.push(parent_node.0);
        }
        self.nodes[node_idx as usize].parents = parent_indices;
        Ok(NodeId(node_idx))
    }

    /// The object id a node was interned for.
    pub fn id(&self, node: NodeId) -> ObjectId {
        self.nodes[node.0 as usize].id
    }

    /// Commit time used for priority-queue ordering.
    pub fn commit_time(&self, node: NodeId) -> i64 {
        self.nodes[node.0 as usize].commit_time
    }

    /// Current flags on a node.
    pub fn flags(&self, node: NodeId) -> Flags {
        self.nodes[node.0 as usize].flags
    }

    /// Look up an already-materialized node by id without parsing.
    pub fn find(&self, id: &ObjectId) -> Option<NodeId> {
        self.index.get(id).copied()
    }

    /// Parent node ids of `node`, in commit order, so a caller can feed them
    /// back onto a have-queue after popping `node` from it.
    pub fn parents(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[node.0 as usize].parents.iter().map(|&idx| NodeId(idx))
    }

    /// Set `flags` on `node`, returning the previous value.
    pub fn insert_flags(&mut self, node: NodeId, flags: Flags) -> Flags {
        let n = &mut self.nodes[node.0 as usize];
        let previous = n.flags;
        n.flags |= flags;
        previous
    }

    /// Carry `flags` to every ancestor of `node`, stopping at ancestors that
    /// already carry them (an already-carried flag implies its ancestors do
    /// too, so there is no need to re-walk past it).
    ///
    /// `ADVERTISED` and `REACHABLE` are carried unconditionally when a commit
    /// gains them; `COMMON` is carried only along the ancestry of a commit
    /// just confirmed common, per `spec.md` §4.3.
    pub fn carry_to_ancestors(&mut self, node: NodeId, flags: Flags) -> Result<()> {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let parents = self.nodes[current.0 as usize].parents.clone();
            for parent_idx in parents {
                let parent = NodeId(parent_idx);
                let previous = self.insert_flags(parent, flags);
                if !previous.contains(flags) {
                    stack.push(parent);
                }
            }
        }
        Ok(())
    }

    /// Number of interned commits.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn chain() -> (FixedSource, ObjectId, ObjectId, ObjectId) {
        let a = oid(1);
        let b = oid(2);
        let c = oid(3);
        let mut commits = HashMap::new();
        commits.insert(
            a,
            ParsedCommit {
                parents: SmallVec::new(),
                commit_time: 100,
            },
        );
        commits.insert(
            b,
            ParsedCommit {
                parents: SmallVec::from_slice(&[a]),
                commit_time: 200,
            },
        );
        commits.insert(
            c,
            ParsedCommit {
                parents: SmallVec::from_slice(&[b]),
                commit_time: 300,
            },
        );
        (FixedSource { commits }, a, b, c)
    }

    #[test]
    fn materialize_interns_ancestry_once() {
        let (source, a, b, c) = chain();
        let mut graph = Graph::new(&source);
        let node_c = graph.materialize(&c).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.id(node_c), c);
        let node_c_again = graph.materialize(&c).unwrap();
        assert_eq!(node_c, node_c_again);
        assert_eq!(graph.len(), 3, "re-materializing must not duplicate nodes");
        let _ = (a, b);
    }

    #[test]
    fn common_flag_carries_to_ancestors_only() {
        let (source, a, b, c) = chain();
        let mut graph = Graph::new(&source);
        let node_c = graph.materialize(&c).unwrap();
        graph.insert_flags(node_c, Flags::COMMON);
        graph.carry_to_ancestors(node_c, Flags::COMMON).unwrap();

        let node_b = graph.find(&b).unwrap();
        let node_a = graph.find(&a).unwrap();
        assert!(graph.flags(node_b).contains(Flags::COMMON));
        assert!(graph.flags(node_a).contains(Flags::COMMON));
    }

    #[test]
    fn carry_stops_once_already_marked() {
        let (source, _a, b, c) = chain();
        let mut graph = Graph::new(&source);
        let node_c = graph.materialize(&c).unwrap();
        let node_b = graph.find(&b).unwrap();
        // Pre-mark b as common, simulating a prior round.
        graph.insert_flags(node_b, Flags::COMMON);
        // Carrying from c should still reach b (idempotent) but the carry
        // terminates there instead of needlessly revisiting further ancestors
        // beyond what contains() already reports as covered.
        graph.carry_to_ancestors(node_c, Flags::COMMON).unwrap();
        assert!(graph.flags(node_b).contains(Flags::COMMON));
    }
}
