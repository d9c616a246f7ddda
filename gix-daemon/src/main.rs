use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use gix_daemon::{Daemon, DaemonOptions, PathResolver};
use gix_receive_pack::hooks::NoopHooks;
use gix_receive_pack::policy::PolicySet;
use gix_upload_pack::config::ServerOptions as UploadPackOptions;

/// A `git daemon`-compatible TCP server for anonymous read (and, if enabled, write)
/// access to a directory of repositories.
///
/// Listens on a TCP port and serves `git-upload-pack` (and optionally
/// `git-receive-pack`) to any client that connects, exactly like `git daemon`. This is
/// unauthenticated: use `--enable-receive-pack` only on networks you trust.
#[derive(Parser, Debug)]
#[command(
    name = "gix-daemon",
    version = "0.1.0",
    about = "git-daemon-compatible TCP server",
    override_usage = "gix-daemon [OPTIONS] <BASE_PATH>",
    after_help = "EXAMPLES:\n    \
                  gix-daemon /srv/git\n    \
                  gix-daemon --export-all /srv/git\n    \
                  gix-daemon --port=9999 --enable-receive-pack /srv/git"
)]
struct Args {
    /// Directory repositories are served from
    ///
    /// Requested repository paths are resolved relative to this directory; paths that
    /// would escape it (via `..`) are rejected.
    #[arg(value_name = "BASE_PATH")]
    base_path: PathBuf,

    /// Serve every repository under BASE_PATH, ignoring the git-daemon-export-ok marker
    #[arg(long = "export-all")]
    export_all: bool,

    /// Allow git-receive-pack (push) in addition to git-upload-pack (fetch)
    ///
    /// Disabled by default: the daemon protocol has no authentication, so anyone who
    /// can reach the port can push.
    #[arg(long = "enable-receive-pack")]
    enable_receive_pack: bool,

    /// Require every command in a push to succeed atomically, or none are applied
    #[arg(long = "atomic-receive")]
    atomic_receive: bool,

    /// TCP port to listen on
    #[arg(long, default_value_t = 9418)]
    port: u16,

    /// Address to bind the listening socket to
    #[arg(long = "bind-address", default_value = "0.0.0.0")]
    bind_address: String,

    /// Disconnect a connection after <n> seconds of inactivity (0 disables)
    #[arg(long, default_value_t = 180)]
    timeout: u64,

    /// Disconnect a connection that hasn't sent its request line within <n> seconds
    #[arg(long = "init-timeout", default_value_t = 180)]
    init_timeout: u64,

    /// Cap the number of simultaneously active connections
    #[arg(long = "max-connections")]
    max_connections: Option<usize>,

    /// Log each accepted connection and dispatch error to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if !args.base_path.is_dir() {
        eprintln!("Error: base path is not a directory: {}", args.base_path.display());
        std::process::exit(1);
    }

    let mut options = DaemonOptions::default()
        .with_port(args.port)
        .with_bind_address(args.bind_address.clone())
        .with_timeout(Duration::from_secs(args.timeout))
        .with_init_timeout(Duration::from_secs(args.init_timeout));
    options.verbose = args.verbose;
    if let Some(max) = args.max_connections {
        options = options.with_max_connections(max);
    }

    let resolver = PathResolver::new(args.base_path.clone(), args.export_all).with_receive_pack(args.enable_receive_pack);

    let mut daemon = Daemon::new(options, resolver, UploadPackOptions::default(), PolicySet::new(), NoopHooks::new())
        .with_atomic_receive(args.atomic_receive);

    daemon.start()?;
    println!(
        "gix-daemon listening on {}:{}, serving {}",
        args.bind_address,
        args.port,
        args.base_path.display()
    );

    // Block the main thread; the accept loop runs on its own thread and `stop()` is
    // only reachable in-process (e.g. from tests), matching git daemon's own
    // run-until-killed behavior for the foreground case.
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}
