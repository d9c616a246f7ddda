//! `report-status` wire writer.
//!
//! After the pack has been ingested and every command has been evaluated, the
//! server reports one `unpack` line followed by one `ok`/`ng` line per
//! command, terminated by a flush packet.

use std::io;

use gix_packetline_blocking as pkt;

use crate::Error;

/// The outcome of unpacking the received pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnpackStatus {
    /// The pack was successfully unpacked/indexed.
    Ok,
    /// Unpacking failed; carries a human-readable reason.
    Failed(String),
}

/// The outcome of applying a single ref update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    /// The update for `refname` succeeded.
    Ok { refname: String },
    /// The update for `refname` failed for `reason`.
    Failed { refname: String, reason: String },
}

/// A complete report, ready to be written to the client.
#[derive(Debug, Clone, Default)]
pub struct Report {
    unpack: Option<UnpackStatus>,
    commands: Vec<CommandStatus>,
}

impl Report {
    /// Start a new, empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unpack status. Must be called before [`Report::write`].
    pub fn unpack(mut self, status: UnpackStatus) -> Self {
        self.unpack = Some(status);
        self
    }

    /// Record that `refname`'s update succeeded.
    pub fn ok(mut self, refname: impl Into<String>) -> Self {
        self.commands.push(CommandStatus::Ok {
            refname: refname.into(),
        });
        self
    }

    /// Record that `refname`'s update failed for `reason`.
    pub fn failed(mut self, refname: impl Into<String>, reason: impl Into<String>) -> Self {
        self.commands.push(CommandStatus::Failed {
            refname: refname.into(),
            reason: reason.into(),
        });
        self
    }

    /// Whether every recorded command succeeded and the pack unpacked cleanly.
    pub fn all_ok(&self) -> bool {
        matches!(self.unpack, Some(UnpackStatus::Ok))
            && self.commands.iter().all(|c| matches!(c, CommandStatus::Ok { .. }))
    }

    /// Write the `report-status` lines followed by a flush packet.
    pub fn write<W: io::Write>(&self, write: &mut W) -> Result<(), Error> {
        let unpack_line = match &self.unpack {
            Some(UnpackStatus::Ok) => "unpack ok\n".to_string(),
            Some(UnpackStatus::Failed(reason)) => format!("unpack {reason}\n"),
            None => "unpack ok\n".to_string(),
        };
        pkt::encode::text_to_write(unpack_line.as_bytes(), write).map_err(Error::Io)?;

        for command in &self.commands {
            let line = match command {
                CommandStatus::Ok { refname } => format!("ok {refname}\n"),
                CommandStatus::Failed { refname, reason } => format!("ng {refname} {reason}\n"),
            };
            pkt::encode::text_to_write(line.as_bytes(), write).map_err(Error::Io)?;
        }

        pkt::encode::flush_to_write(write).map_err(Error::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_push_reports_ok_for_every_ref() {
        let report = Report::new()
            .unpack(UnpackStatus::Ok)
            .ok("refs/heads/main")
            .ok("refs/heads/dev");
        assert!(report.all_ok());

        let mut out = Vec::new();
        report.write(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("unpack ok"));
        assert!(text.contains("ok refs/heads/main"));
        assert!(text.contains("ok refs/heads/dev"));
    }

    #[test]
    fn rejected_command_reports_ng_with_reason() {
        let report = Report::new()
            .unpack(UnpackStatus::Ok)
            .failed("refs/heads/main", "deny_non_fast_forwards");
        assert!(!report.all_ok());

        let mut out = Vec::new();
        report.write(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("ng refs/heads/main deny_non_fast_forwards"));
    }

    #[test]
    fn failed_unpack_is_reported_and_short_circuits_all_ok() {
        let report = Report::new().unpack(UnpackStatus::Failed("index-pack failed".into()));
        assert!(!report.all_ok());
        let mut out = Vec::new();
        report.write(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("unpack index-pack failed"));
    }
}
