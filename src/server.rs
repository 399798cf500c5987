//! Callback server: hosts the `/<srv>?p=FD` endpoint the emulator's host
//! calls back into.
//!
//! The accept loop runs on its own thread and hands parsed jobs to the
//! worker thread that owns the [`Engine`] via `std::sync::mpsc`.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use log::{error, info, warn};
use tiny_http::{Method, Response, Server};

use crate::engine::Engine;

enum Job {
    Byte(u8),
    Bulk([u8; 10]),
}

/// Outcome of a job, mapped to an HTTP status: 201 when a command was
/// fully serviced, 200 when the byte was merely consumed.
struct JobResult {
    executed: bool,
}

const WORKER_POLL: Duration = Duration::from_millis(200);

/// Run the callback server and the engine worker loop until the process is
/// killed. Blocks the calling thread in the accept loop; spawns one
/// worker thread that owns `engine` exclusively.
///
/// `reload_flag`, when set, is consumed once per poll interval and
/// triggers `Engine::reload_diskmap` — the worker-thread-side half of the
/// SIGHUP reload hook (the signal handler itself lives in the `fifsrv`
/// binary, since it is the only place a signal disposition should be
/// installed).
pub fn serve(
    engine: Engine,
    bind_addr: &str,
    srv_path: &str,
    reload_flag: &'static AtomicBool,
) -> crate::error::Result<()> {
    let server = Server::http(bind_addr)
        .map_err(|e| crate::error::EngineError::Io { path: None, source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()) })?;

    let (tx, rx) = mpsc::channel::<(Job, mpsc::Sender<JobResult>)>();

    std::thread::spawn(move || {
        let mut engine = engine;
        loop {
            match rx.recv_timeout(WORKER_POLL) {
                Ok((job, reply)) => {
                    let executed = match job {
                        Job::Byte(b) => engine.process_byte(b).unwrap_or_else(|e| {
                            error!("fif byte {b:#04x} failed: {e}");
                            false
                        }),
                        Job::Bulk(buf) => match engine.process_bulk(&buf) {
                            Ok(()) => true,
                            Err(e) => {
                                error!("fif bulk command failed: {e}");
                                false
                            }
                        },
                    };
                    let _ = reply.send(JobResult { executed });
                }
                Err(RecvTimeoutError::Timeout) => {
                    if reload_flag.swap(false, Ordering::SeqCst) {
                        info!("reloading diskmap on SIGHUP");
                        if let Err(e) = engine.reload_diskmap() {
                            error!("diskmap reload failed: {e}");
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    });

    for mut request in server.incoming_requests() {
        let url = request.url().to_string();
        if !path_matches(&url, srv_path) {
            let _ = request.respond(Response::empty(404));
            continue;
        }

        let job = match *request.method() {
            Method::Put => {
                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(Response::empty(400));
                    continue;
                }
                match parse_form_byte(&body) {
                    Some(b) => Job::Byte(b),
                    None => {
                        warn!("malformed PUT body: {body}");
                        let _ = request.respond(Response::empty(400));
                        continue;
                    }
                }
            }
            Method::Post => {
                let mut buf = [0u8; 10];
                if request.as_reader().read_exact(&mut buf).is_err() {
                    let _ = request.respond(Response::empty(400));
                    continue;
                }
                Job::Bulk(buf)
            }
            _ => {
                let _ = request.respond(Response::empty(405));
                continue;
            }
        };

        let (reply_tx, reply_rx) = mpsc::channel();
        if tx.send((job, reply_tx)).is_err() {
            let _ = request.respond(Response::empty(500));
            continue;
        }

        let status = match reply_rx.recv() {
            Ok(JobResult { executed: true }) => 201,
            Ok(JobResult { executed: false }) => 200,
            Err(_) => 500,
        };
        let _ = request.respond(Response::empty(status));
    }

    Ok(())
}

fn path_matches(url: &str, srv_path: &str) -> bool {
    let expected_prefix = format!("/{srv_path}");
    url.starts_with(&expected_prefix) && url.contains("p=FD")
}

/// Parse the `0xDD=` form body into the raw byte `DD`.
fn parse_form_byte(body: &str) -> Option<u8> {
    let hex = body.trim().trim_start_matches("0x").trim_end_matches('=');
    u8::from_str_radix(&hex[..2.min(hex.len())], 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_matches_requires_both_prefix_and_query() {
        assert!(path_matches("/fifsrv?p=FD", "fifsrv"));
        assert!(!path_matches("/other?p=FD", "fifsrv"));
        assert!(!path_matches("/fifsrv?p=XX", "fifsrv"));
    }

    #[test]
    fn parse_form_byte_reads_hex_prefix() {
        assert_eq!(parse_form_byte("0x1A="), Some(0x1A));
        assert_eq!(parse_form_byte("0xff="), Some(0xFF));
        assert_eq!(parse_form_byte("garbage"), None);
    }
}
