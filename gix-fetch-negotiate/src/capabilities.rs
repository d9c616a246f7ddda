//! The client-side capability set negotiated against a server's advertisement.

use std::collections::BTreeSet;

/// Capabilities the negotiator is willing to request, intersected against
/// what the remote actually advertised.
#[derive(Debug, Clone, Default)]
pub struct ClientCapabilities {
    /// Request thin packs (deltas against objects the client already has).
    pub thin_pack: bool,
    /// Accept OFS deltas in the returned pack.
    pub ofs_delta: bool,
    /// Request side-band-64k multiplexing of the pack stream.
    pub side_band_64k: bool,
    /// Request plain side-band multiplexing if `side_band_64k` is unavailable.
    pub side_band: bool,
    /// Suppress progress messages on the side-band.
    pub no_progress: bool,
    /// Request annotated tags that point at wanted commits.
    pub include_tag: bool,
    /// Skip the terminal `done` packet and let the server flush.
    pub no_done: bool,
    /// Allow `want`-ing an object the server did not advertise as a tip.
    pub allow_tip_sha1_in_want: bool,
    /// Allow `want`-ing any reachable object, not just advertised tips.
    pub allow_reachable_sha1_in_want: bool,
    /// Request a partial clone/fetch with the given filter spec.
    pub filter: Option<String>,
    /// Required for negotiation across independent, stateless requests.
    pub multi_ack_detailed: bool,
}

impl ClientCapabilities {
    /// Intersect the client's desired set with what the server actually advertised.
    ///
    /// `advertised` is the raw set of capability tokens from the ref
    /// advertisement (e.g. `"side-band-64k"`, `"multi_ack_detailed"`, a bare
    /// `"thin-pack"`). Anything the client wants but the server did not
    /// advertise is dropped rather than erroring, except where the caller
    /// later calls [`ClientCapabilities::require`] for a capability that is
    /// mandatory for the chosen mode (e.g. stateless RPC).
    pub fn negotiated(wanted: &ClientCapabilities, advertised: &BTreeSet<String>) -> Self {
        let has = |name: &str| advertised.iter().any(|c| c == name);
        ClientCapabilities {
            thin_pack: wanted.thin_pack && has("thin-pack"),
            ofs_delta: wanted.ofs_delta && has("ofs-delta"),
            side_band_64k: wanted.side_band_64k && has("side-band-64k"),
            side_band: wanted.side_band && has("side-band"),
            no_progress: wanted.no_progress && has("no-progress"),
            include_tag: wanted.include_tag && has("include-tag"),
            no_done: wanted.no_done && has("no-done"),
            allow_tip_sha1_in_want: wanted.allow_tip_sha1_in_want && has("allow-tip-sha1-in-want"),
            allow_reachable_sha1_in_want: wanted.allow_reachable_sha1_in_want
                && has("allow-reachable-sha1-in-want"),
            filter: wanted.filter.clone().filter(|_| has("filter")),
            multi_ack_detailed: has("multi_ack_detailed"),
        }
    }

    /// A reasonable default: everything a fetch client commonly wants, before
    /// intersecting against an advertisement.
    pub fn wanted_defaults() -> Self {
        ClientCapabilities {
            thin_pack: true,
            ofs_delta: true,
            side_band_64k: true,
            side_band: true,
            no_progress: false,
            include_tag: true,
            no_done: false,
            allow_tip_sha1_in_want: false,
            allow_reachable_sha1_in_want: false,
            filter: None,
            multi_ack_detailed: true,
        }
    }

    /// Render the capability line appended to the first `want` line.
    pub fn to_capability_string(&self) -> String {
        let mut tokens = Vec::new();
        if self.multi_ack_detailed {
            tokens.push("multi_ack_detailed".to_string());
        }
        if self.thin_pack {
            tokens.push("thin-pack".to_string());
        }
        if self.ofs_delta {
            tokens.push("ofs-delta".to_string());
        }
        if self.side_band_64k {
            tokens.push("side-band-64k".to_string());
        } else if self.side_band {
            tokens.push("side-band".to_string());
        }
        if self.no_progress {
            tokens.push("no-progress".to_string());
        }
        if self.include_tag {
            tokens.push("include-tag".to_string());
        }
        if self.no_done {
            tokens.push("no-done".to_string());
        }
        if self.allow_tip_sha1_in_want {
            tokens.push("allow-tip-sha1-in-want".to_string());
        }
        if self.allow_reachable_sha1_in_want {
            tokens.push("allow-reachable-sha1-in-want".to_string());
        }
        if let Some(filter) = &self.filter {
            tokens.push(format!("filter={filter}"));
        }
        tokens.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unadvertised_capabilities_are_dropped() {
        let wanted = ClientCapabilities::wanted_defaults();
        let advertised: BTreeSet<String> =
            ["thin-pack", "ofs-delta"].iter().map(|s| s.to_string()).collect();
        let negotiated = ClientCapabilities::negotiated(&wanted, &advertised);
        assert!(negotiated.thin_pack);
        assert!(negotiated.ofs_delta);
        assert!(!negotiated.side_band_64k);
        assert!(!negotiated.multi_ack_detailed);
    }

    #[test]
    fn capability_string_omits_unset_tokens() {
        let mut caps = ClientCapabilities::default();
        caps.thin_pack = true;
        caps.ofs_delta = true;
        assert_eq!(caps.to_capability_string(), "thin-pack ofs-delta");
    }
}
