//! The accept loop (C7).
//!
//! Grounded on the teacher's `src/server/ftp_server.rs`: `FtpServer::build`/
//! `start`, the accept thread, and the `Arc<AtomicBool>` shutdown flag are
//! kept. Per connection, one task is submitted to the [`WorkerPool`] instead
//! of the teacher's raw `pool.execute(closure)` call, so that the task's id
//! (the session's [`Session::task_id`]) can later be targeted by
//! `WorkerPool::cancel`. See DESIGN.md for why this keeps a one-task-per-
//! connection shape rather than one task per command.

use std::error::Error;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::config::Config;
use crate::credentials::CredentialVerifier;
use crate::protocol::{self, Command, Token};
use crate::protocol::transport::{self, Reply};
use crate::server::handlers::{self, HandlerContext, Outcome};
use crate::session::{Session, SessionStore};
use crate::worker_pool::{CancellationToken, WorkerPool};

pub struct FtpServer {
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
}

impl FtpServer {
    /// Binds the listening socket described by `config`.
    pub fn build(config: &Config) -> Result<FtpServer, Box<dyn Error>> {
        let listener = TcpListener::bind(format!("{}:{}", config.get_hostname(), config.get_port()))?;

        Ok(FtpServer { listener, shutdown: Arc::new(AtomicBool::new(false)) })
    }

    /// Runs the accept loop until shutdown is requested, blocking the
    /// calling thread until the accept thread exits.
    pub fn start(&mut self, config: &Config, credentials: Arc<dyn CredentialVerifier>) -> Result<(), String> {
        let pool = WorkerPool::new(config.worker_count());
        let store = Arc::new(SessionStore::new());

        let hostname = config.get_hostname();
        let passive_range = config.passive_port_range();
        let root_dir = config.root_dir().clone();

        let server_shutdown = Arc::clone(&self.shutdown);
        let server =
            self.listener.try_clone().map_err(|err| format!("cannot clone server listener: {err}"))?;

        let server_thread = thread::spawn(move || {
            for client in server.incoming() {
                if server_shutdown.load(Ordering::Relaxed) {
                    return;
                }

                let stream = match client {
                    Ok(s) => s,
                    Err(err) => {
                        log::warn!("error establishing connection: {err}");
                        continue;
                    }
                };

                let peer = match stream.peer_addr() {
                    Ok(addr) => addr,
                    Err(err) => {
                        log::warn!("cannot read peer address: {err}");
                        continue;
                    }
                };

                let session = Session::new(peer, root_dir.clone());
                let task_id = session.task_id();
                if store.insert(session).is_err() {
                    log::warn!("duplicate session for {peer}, dropping connection");
                    continue;
                }

                let store = Arc::clone(&store);
                let credentials = Arc::clone(&credentials);
                let hostname = hostname.clone();

                pool.submit(task_id, move |token| {
                    handle_connection(stream, peer, store.as_ref(), credentials.as_ref(), &hostname, passive_range, token);
                    store.remove(&peer);
                });
            }
        });

        server_thread.join().map_err(|_| "server thread panicked".to_string())?;
        Ok(())
    }

    pub fn get_shutdown_rc(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }
}

/// Owns one client's control socket for the duration of the connection,
/// reading and dispatching commands until `QUIT`, a framing error, or
/// cancellation (pool shutdown).
fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    store: &SessionStore,
    credentials: &dyn CredentialVerifier,
    hostname: &str,
    passive_port_range: (u16, u16),
    token: CancellationToken,
) {
    log::info!("accepted connection from {peer}");

    if let Err(err) = transport::send_reply(&mut stream, &Reply::new(220, "ready")) {
        log::warn!("cannot send greeting to {peer}: {err}");
        return;
    }

    loop {
        if token.is_cancelled() {
            log::info!("session {peer} cancelled");
            break;
        }

        let request = match transport::recv_request(&mut stream) {
            Ok(r) => r,
            Err(err) => {
                log::info!("connection from {peer} ended: {err}");
                break;
            }
        };

        let tokens = protocol::lex(&request.payload);
        let command = protocol::parse(&tokens);

        let mut ctx = HandlerContext {
            session_id: peer,
            store,
            control: &mut stream,
            credentials,
            hostname,
            passive_port_range,
            token: token.clone(),
        };

        let outcome = match command {
            Command::Supported { kind, arg } => handlers::dispatch(&mut ctx, kind, arg),
            Command::Unsupported => {
                let _ = transport::send_reply(ctx.control, &Reply::new(502, "command not implemented"));
                Outcome::Continue
            }
            Command::Invalid => {
                // A recognised keyword with a malformed argument (e.g. an
                // out-of-range PORT octet) is a 501; an unrecognised command
                // word is a 500. See spec §8 scenario 4.
                let (code, text) = if matches!(tokens.first(), Some(Token::Keyword(_))) {
                    (501, "syntax error in parameters or arguments")
                } else {
                    (500, "syntax error, command unrecognized")
                };
                let _ = transport::send_reply(ctx.control, &Reply::new(code, text));
                Outcome::Continue
            }
        };

        if matches!(outcome, Outcome::Quit) {
            break;
        }
    }

    log::info!("closing connection from {peer}");
}
