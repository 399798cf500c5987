//! `fifsrv` — remote floppy controller daemon.
//!
//! Parses a diskmap, registers with the host, and serves the FIF callback
//! endpoint until killed, deregistering on exit. SIGHUP triggers a
//! diskmap reload.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use fif_remote_disk::bridge::HostBridge;
use fif_remote_disk::config::DiskMap;
use fif_remote_disk::engine::Engine;
use fif_remote_disk::server;

#[derive(Parser)]
#[command(name = "fifsrv")]
#[command(about = "Remote CP/M floppy controller", long_about = None)]
struct Cli {
    /// Path to the diskmap JSON file.
    #[arg(long, default_value = "diskmap.json")]
    diskmap: std::path::PathBuf,

    /// Host emulator address, e.g. `imsai8080` or `imsai8080:80`.
    #[arg(long, default_value = "imsai8080")]
    host: String,

    /// Local TCP port the callback server listens on.
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Path segment the callback is served under (defaults to the binary name).
    #[arg(long, default_value = "fifsrv")]
    srv: String,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

static RELOAD_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sighup(_sig: libc::c_int) {
    RELOAD_REQUESTED.store(true, Ordering::SeqCst);
}

fn install_sighup_handler() {
    unsafe {
        libc::signal(libc::SIGHUP, on_sighup as libc::sighandler_t);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto)
        .context("failed to initialize logger")?;

    let map = DiskMap::load(&cli.diskmap).context("loading diskmap")?;
    info!("loaded diskmap from {}", cli.diskmap.display());

    let hostname = hostname();
    let callback_url = format!("http://{hostname}:{}/{}", cli.port, cli.srv);
    let bridge = HostBridge::new(cli.host.clone(), callback_url);

    let mut engine = Engine::new(bridge);
    engine.load_diskmap(&map, &cli.diskmap).context("mounting drives")?;
    engine.register().context("registering with host")?;

    install_sighup_handler();

    let bind_addr = format!("0.0.0.0:{}", cli.port);
    let result = server::serve(engine, &bind_addr, &cli.srv, &RELOAD_REQUESTED);

    if let Err(e) = &result {
        error!("server exited: {e}");
    }
    result.map_err(anyhow::Error::from)
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
