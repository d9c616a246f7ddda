//! Wire-level session driver.
//!
//! Everything in [`engine`](crate::engine) and [`protocol`](crate::protocol) operates on
//! already-separated pieces: head-info text, a pack reader, a parsed [`CapabilitySet`].
//! This module is the glue that a transport (a TCP connection from `gix-daemon`, an SSH
//! session, an HTTP POST body) drives directly: it writes the ref advertisement, reads
//! command pkt-lines up to the terminating flush, decides whether a pack follows (it does
//! unless every command is a deletion, per `spec.md` §4.4), and writes the `report-status`
//! reply produced by [`ReceivePack::execute`].

use std::io::{self, Read, Write};

use gix_packetline_blocking::{PacketLineRef, StreamingPeekableIter};

use crate::engine::{PushRequest, RefUpdater};
use crate::hooks::Hooks;
use crate::protocol::{CapabilitySet, CommandList, CommandUpdate, HiddenRefPredicate, RefRecord, Report, UnpackStatus};
use crate::{Error, ReceivePack};

/// Repository-side context the transport supplies for one push session.
///
/// This is everything [`PushRequest`] needs plus the advertisement inputs; the session
/// driver borrows it for the lifetime of `serve`.
pub struct SessionContext<'a> {
    /// Every visible ref, used both for the advertisement and as the connectivity check's
    /// "haves" boundary.
    pub refs: &'a [RefRecord],
    /// Capabilities to advertise; must match what [`crate::protocol::options::Options::validate_against`]
    /// is later asked to validate the client's request against.
    pub capabilities: &'a CapabilitySet,
    /// Hidden-ref predicate applied to both the advertisement and the incoming commands.
    pub hidden: Option<&'a HiddenRefPredicate>,
    /// The repository's main object database.
    pub main_odb: &'a gix_odb::Handle,
    /// The repository's ref store.
    pub ref_store: &'a gix_ref::file::Store,
    /// Directory to quarantine an incoming pack in before migrating it into `main_odb`.
    pub main_objects_dir: std::path::PathBuf,
}

/// Drive one receive-pack session to completion over `input`/`output`.
///
/// Writes the advertisement, reads the command list (and pack, if any command is not a
/// pure deletion), runs it through `receive_pack`, and writes the status report. Returns
/// once the flush terminating the report has been written; the caller closes the
/// connection.
pub fn serve<R, W, H, U>(
    input: &mut R,
    output: &mut W,
    ctx: &SessionContext<'_>,
    receive_pack: &mut ReceivePack<H>,
    updater: &mut U,
) -> Result<(), Error>
where
    R: Read,
    W: Write,
    H: Hooks,
    U: RefUpdater,
{
    let mut advertiser = crate::protocol::Advertiser::new(&mut *output);
    advertiser.write_advertisement(ctx.refs, ctx.capabilities, ctx.hidden)?;

    let mut line_reader = StreamingPeekableIter::new(input, &[PacketLineRef::Flush], false);
    let mut head_info = String::new();
    while let Some(line) = line_reader.read_line() {
        let line = line
            .map_err(Error::Io)?
            .map_err(|e| Error::Protocol(format!("malformed head-info packet: {e}")))?;
        match line {
            PacketLineRef::Data(data) => {
                let text =
                    std::str::from_utf8(data).map_err(|e| Error::Protocol(format!("non-utf8 head-info line: {e}")))?;
                head_info.push_str(text.trim_end_matches(['\n', '\r']));
                head_info.push('\n');
            }
            PacketLineRef::Flush | PacketLineRef::Delimiter | PacketLineRef::ResponseEnd => break,
        }
    }

    if head_info.trim().is_empty() {
        // Nothing to do: no commands, so no pack follows and the report is trivially ok.
        let report = Report::new().unpack(UnpackStatus::Ok);
        report.write(output)?;
        return Ok(());
    }

    let wants_pack = {
        let (commands, _options) = CommandList::parse_from_text(&head_info)?;
        !commands.is_empty() && !all_deletions(&commands)
    };

    let report = if wants_pack {
        let mut pack_reader = io::BufReader::new(line_reader.into_inner());
        receive_pack.execute(
            PushRequest {
                head_info: &head_info,
                pack: Some(&mut pack_reader),
                main_odb: ctx.main_odb,
                ref_store: ctx.ref_store,
                visible_refs: ctx.refs,
                main_objects_dir: ctx.main_objects_dir.clone(),
            },
            updater,
        )?
    } else {
        receive_pack.execute(
            PushRequest::<'_, &[u8]> {
                head_info: &head_info,
                pack: None,
                main_odb: ctx.main_odb,
                ref_store: ctx.ref_store,
                visible_refs: ctx.refs,
                main_objects_dir: ctx.main_objects_dir.clone(),
            },
            updater,
        )?
    };

    report.write(output)?;
    Ok(())
}

fn all_deletions(commands: &CommandList) -> bool {
    commands.iter().all(|c| matches!(c, CommandUpdate::Delete { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::NoopHooks;
    use crate::protocol::CapabilitySet;
    use crate::ReceivePackBuilder;

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
    fn empty_request_reports_ok_without_reading_a_pack() {
        let mut rp = ReceivePackBuilder::new().blocking().build(NoopHooks::new());
        let odb = test_odb();
        let (_temp_dir, ref_store) = test_ref_store();
        let mut updater = crate::engine::LooseFileRefUpdater::new(&ref_store);

        // A client that has nothing to push sends just a flush after the advertisement.
        let mut input: &[u8] = b"0000";
        let mut output = Vec::new();
        let caps = CapabilitySet::modern_defaults();
        let ctx = SessionContext {
            refs: &[],
            capabilities: &caps,
            hidden: None,
            main_odb: &odb,
            ref_store: &ref_store,
            main_objects_dir: _temp_dir.path().join("objects"),
        };

        serve(&mut input, &mut output, &ctx, &mut rp, &mut updater).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("capabilities^{}"));
        assert!(text.contains("unpack ok"));
    }

    #[test]
    fn deletion_only_push_does_not_expect_a_pack() {
        let mut rp = ReceivePackBuilder::new().blocking().build(NoopHooks::new());
        let odb = test_odb();
        let (_temp_dir, ref_store) = test_ref_store();
        let mut updater = crate::engine::LooseFileRefUpdater::new(&ref_store);

        let oid = "1111111111111111111111111111111111111111";
        std::fs::create_dir_all(ref_store.git_dir().join("refs/heads")).unwrap();
        std::fs::write(ref_store.git_dir().join("refs/heads/doomed"), format!("{oid}\n")).unwrap();

        let refs = vec![RefRecord::new(
            gix_hash::ObjectId::from_hex(oid.as_bytes()).unwrap(),
            "refs/heads/doomed",
        )];
        let caps = CapabilitySet::modern_defaults();

        let command_line = format!("{oid} 0000000000000000000000000000000000000000 refs/heads/doomed\0report-status\n");
        let mut framed = Vec::new();
        gix_packetline_blocking::encode::text_to_write(command_line.as_bytes(), &mut framed).unwrap();
        gix_packetline_blocking::encode::flush_to_write(&mut framed).unwrap();
        let mut input: &[u8] = &framed;
        let mut output = Vec::new();

        let ctx = SessionContext {
            refs: &refs,
            capabilities: &caps,
            hidden: None,
            main_odb: &odb,
            ref_store: &ref_store,
            main_objects_dir: _temp_dir.path().join("objects"),
        };

        serve(&mut input, &mut output, &ctx, &mut rp, &mut updater).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("unpack ok"));
        assert!(text.contains("ok refs/heads/doomed"));
        assert!(!ref_store.git_dir().join("refs/heads/doomed").exists());
    }
}
