//! Parses the single request line a client sends immediately after connecting, per
//! `spec.md` §6.4: `<service>\0host=<host>\0[<repo-path>\0]`. In practice (and per §4.7)
//! the service name is followed by the repository path before the first NUL:
//! `<service-name> <repository-path>\0host=<host>\0`; extra NUL-terminated
//! `key=value` segments (`version=1`, `object-format=sha1`) are accepted and ignored.

use std::io::Read;

use gix_packetline_blocking::{PacketLineRef, StreamingPeekableIter};

use crate::error::{Error, Result};

/// Which service a daemon connection was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// `git-upload-pack`: fetch/clone.
    UploadPack,
    /// `git-receive-pack`: push.
    ReceivePack,
}

impl ServiceKind {
    fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "git-upload-pack" => Some(Self::UploadPack),
            "git-receive-pack" => Some(Self::ReceivePack),
            _ => None,
        }
    }
}

/// A parsed request line.
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    /// Which service the client asked for.
    pub service: ServiceKind,
    /// Repository path, exactly as sent (leading `/` included, if any).
    pub repository_path: String,
    /// The `host=` extra parameter, if the client sent one.
    pub host: Option<String>,
}

/// Read and parse one request line from `input`. The line itself is framed as a single
/// pkt-line, matching the Pkt-Line Framer (`spec.md` §4.1); this function consumes
/// exactly that one packet and leaves `input` positioned at the start of whatever
/// protocol the resolved service speaks next.
pub fn read_request_line<R: Read>(input: &mut R) -> Result<ServiceRequest> {
    let mut reader = StreamingPeekableIter::new(input, &[PacketLineRef::Flush], false);
    let line = reader
        .read_line()
        .ok_or_else(|| Error::MalformedRequest("connection closed before a request line was sent".into()))?
        .map_err(Error::Io)?
        .map_err(|e| Error::MalformedRequest(e.to_string()))?;

    let PacketLineRef::Data(data) = line else {
        return Err(Error::MalformedRequest("expected a data packet, got a control packet".into()));
    };

    parse_request_line(data)
}

fn parse_request_line(data: &[u8]) -> Result<ServiceRequest> {
    let mut segments = data.split(|&b| b == 0).map(|s| String::from_utf8_lossy(s).into_owned());
    let head = segments
        .next()
        .ok_or_else(|| Error::MalformedRequest("empty request line".into()))?;
    let head = head.trim_end_matches(['\n', '\r']);

    let (service_name, repository_path) = head
        .split_once(' ')
        .ok_or_else(|| Error::MalformedRequest(format!("missing repository path in '{head}'")))?;

    let service =
        ServiceKind::from_wire_name(service_name).ok_or_else(|| Error::UnknownService(service_name.to_string()))?;

    let mut host = None;
    for extra in segments {
        if extra.is_empty() {
            continue;
        }
        if let Some(value) = extra.strip_prefix("host=") {
            host = Some(value.to_string());
        }
    }

    Ok(ServiceRequest {
        service,
        repository_path: repository_path.to_string(),
        host,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut writer = gix_packetline_blocking::Writer::new(&mut out);
        writer.write_all(payload).unwrap();
        out
    }

    #[test]
    fn parses_service_path_and_host() {
        let mut input: &[u8] = &framed(b"git-upload-pack /project.git\0host=example.com\0");
        let request = read_request_line(&mut input).unwrap();
        assert_eq!(request.service, ServiceKind::UploadPack);
        assert_eq!(request.repository_path, "/project.git");
        assert_eq!(request.host.as_deref(), Some("example.com"));
    }

    #[test]
    fn parses_receive_pack_with_extra_params() {
        let mut input: &[u8] = &framed(b"git-receive-pack /project.git\0host=example.com\0version=2\0");
        let request = read_request_line(&mut input).unwrap();
        assert_eq!(request.service, ServiceKind::ReceivePack);
        assert_eq!(request.host.as_deref(), Some("example.com"));
    }

    #[test]
    fn rejects_unknown_service() {
        let mut input: &[u8] = &framed(b"git-rm-rf / \0host=x\0");
        let err = read_request_line(&mut input).unwrap_err();
        assert!(matches!(err, Error::UnknownService(_)));
    }

    #[test]
    fn rejects_missing_repository_path() {
        let mut input: &[u8] = &framed(b"git-upload-pack\0host=x\0");
        let err = read_request_line(&mut input).unwrap_err();
        assert!(matches!(err, Error::MalformedRequest(_)));
    }

    #[test]
    fn host_is_optional() {
        let mut input: &[u8] = &framed(b"git-upload-pack /project.git\0");
        let request = read_request_line(&mut input).unwrap();
        assert_eq!(request.host, None);
    }
}
