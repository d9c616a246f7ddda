//! End-to-end smoke tests driving a real `Daemon` over a loopback TCP socket.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use gix_daemon::{Daemon, DaemonOptions, PathResolver};
use gix_receive_pack::hooks::NoopHooks;
use gix_receive_pack::policy::PolicySet;
use gix_upload_pack::config::ServerOptions;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn framed_request(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut writer = gix_packetline_blocking::Writer::new(&mut out);
    writer.write_all(payload).unwrap();
    out
}

fn read_all(stream: &mut TcpStream) -> Vec<u8> {
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf);
    buf
}

#[test]
fn rejects_unexported_repository_over_the_wire() {
    let temp = tempfile::tempdir().unwrap();
    let repo_dir = temp.path().join("closed.git");
    std::fs::create_dir_all(&repo_dir).unwrap();
    gix::init_bare(&repo_dir).unwrap();

    let port = free_port();
    let options = DaemonOptions::default().with_port(port).with_bind_address("127.0.0.1");
    let resolver = PathResolver::new(temp.path(), false);
    let mut daemon = Daemon::new(options, resolver, ServerOptions::default(), PolicySet::new(), NoopHooks::new());
    daemon.start().unwrap();

    std::thread::sleep(Duration::from_millis(100));

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .write_all(&framed_request(b"git-upload-pack /closed.git\0host=localhost\0"))
        .unwrap();

    let response = read_all(&mut stream);
    let text = String::from_utf8_lossy(&response);
    assert!(text.contains("ERR"), "expected an ERR packet, got: {text:?}");

    daemon.stop();
}

#[test]
fn rejects_receive_pack_when_not_enabled() {
    let temp = tempfile::tempdir().unwrap();
    let repo_dir = temp.path().join("repo.git");
    std::fs::create_dir_all(&repo_dir).unwrap();
    gix::init_bare(&repo_dir).unwrap();
    std::fs::write(repo_dir.join("git-daemon-export-ok"), b"").unwrap();

    let port = free_port();
    let options = DaemonOptions::default().with_port(port).with_bind_address("127.0.0.1");
    let resolver = PathResolver::new(temp.path(), false);
    let mut daemon = Daemon::new(options, resolver, ServerOptions::default(), PolicySet::new(), NoopHooks::new());
    daemon.start().unwrap();

    std::thread::sleep(Duration::from_millis(100));

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .write_all(&framed_request(b"git-receive-pack /repo.git\0host=localhost\0"))
        .unwrap();

    let response = read_all(&mut stream);
    let text = String::from_utf8_lossy(&response);
    assert!(text.contains("ERR"), "expected an ERR packet, got: {text:?}");

    daemon.stop();
}

#[test]
fn start_twice_without_stopping_fails() {
    let temp = tempfile::tempdir().unwrap();
    let port = free_port();
    let options = DaemonOptions::default().with_port(port).with_bind_address("127.0.0.1");
    let resolver = PathResolver::new(temp.path(), true);
    let mut daemon = Daemon::new(options, resolver, ServerOptions::default(), PolicySet::new(), NoopHooks::new());
    daemon.start().unwrap();

    let err = daemon.start().unwrap_err();
    assert!(matches!(err, gix_daemon::Error::AlreadyRunning));

    daemon.stop();
}

#[test]
fn stop_then_start_binds_a_fresh_socket() {
    let temp = tempfile::tempdir().unwrap();
    let port = free_port();
    let options = DaemonOptions::default().with_port(port).with_bind_address("127.0.0.1");
    let resolver = PathResolver::new(temp.path(), true);
    let mut daemon = Daemon::new(options, resolver, ServerOptions::default(), PolicySet::new(), NoopHooks::new());

    daemon.start().unwrap();
    daemon.stop();
    assert_eq!(daemon.state(), gix_daemon::DaemonState::Stopped);

    daemon.start().unwrap();
    daemon.stop();
}
