//! End-to-end negotiation scenarios driven against a canned remote response.

use std::collections::HashMap;

use gix_fetch_negotiate::{ClientCapabilities, CommitSource, Negotiator, ParsedCommit, Result};
use gix_hash::ObjectId;
use smallvec::SmallVec;

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

fn encode_lines(lines: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for line in lines {
        gix_packetline_blocking::encode::text_to_write(format!("{line}\n").as_bytes(), &mut out).unwrap();
    }
    gix_packetline_blocking::encode::flush_to_write(&mut out).unwrap();
    out
}

// Local history: a (oldest) -> b -> c (tip). `a` is also known to the remote.
fn local_chain() -> (FixedSource, ObjectId, ObjectId, ObjectId) {
    let a = oid(1);
    let b = oid(2);
    let c = oid(3);
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
            parents: SmallVec::from_slice(&[a]),
            commit_time: 20,
        },
    );
    commits.insert(
        c,
        ParsedCommit {
            parents: SmallVec::from_slice(&[b]),
            commit_time: 30,
        },
    );
    (FixedSource { commits }, a, b, c)
}

#[test]
fn single_common_ancestor_confirms_via_continue_then_final_ack() {
    let (source, a, _b, c) = local_chain();
    let remote_want = oid(9);

    let mut negotiator = Negotiator::new(&source, ClientCapabilities::wanted_defaults());
    negotiator.seed([c]).unwrap();

    let first_round = encode_lines(&[&format!("ACK {a} continue")]);
    let final_round = encode_lines(&[&format!("ACK {a}")]);
    let mut remote_bytes = first_round;
    remote_bytes.extend(final_round);
    let mut remote = remote_bytes.as_slice();

    let mut outbound = Vec::new();
    let outcome = negotiator
        .negotiate(&[remote_want], &mut remote, &mut outbound)
        .unwrap();

    assert!(!outcome.nothing_to_fetch);
    assert!(outcome.common.contains(&a));

    let sent = String::from_utf8(outbound).unwrap();
    assert!(sent.contains(&format!("want {remote_want}")));
    assert!(sent.contains(&format!("have {c}")));
    assert!(sent.contains("done"));
}

#[test]
fn zero_wants_never_touches_the_wire() {
    let (source, _a, _b, _c) = local_chain();
    let mut negotiator = Negotiator::new(&source, ClientCapabilities::wanted_defaults());
    let mut remote: &[u8] = &[];
    let mut outbound = Vec::new();
    let outcome = negotiator.negotiate(&[], &mut remote, &mut outbound).unwrap();
    assert!(outcome.nothing_to_fetch);
    assert!(outbound.is_empty());
}

#[test]
fn repeated_negotiation_with_same_tips_is_idempotent() {
    let (source, a, _b, c) = local_chain();
    let remote_want = oid(9);

    for _ in 0..2 {
        let mut negotiator = Negotiator::new(&source, ClientCapabilities::wanted_defaults());
        negotiator.seed([c]).unwrap();
        let remote_bytes = encode_lines(&[&format!("ACK {a}")]);
        let mut remote = remote_bytes.as_slice();
        let mut outbound = Vec::new();
        let outcome = negotiator
            .negotiate(&[remote_want], &mut remote, &mut outbound)
            .unwrap();
        assert!(outcome.common.contains(&a));
    }
}
