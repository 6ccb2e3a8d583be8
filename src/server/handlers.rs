//! Command handlers (C6): one function per supported [`CommandKind`],
//! operating on a [`Session`] snapshot pulled from the shared store.
//!
//! Grounded on the teacher's `src/server/ftp_client.rs` for the overall
//! shape (`exec_*_command` functions returning a reply code/text pair) and
//! its `CWD`/`CDUP`/`PASV`/`LIST` bodies specifically, generalized from a
//! per-connection `Rc<RefCell<ClientOptions>>` to a [`Session`] snapshot
//! fetched from and persisted back into the shared [`SessionStore`]. The
//! teacher never implemented `PORT`/`RETR`/`STOR`/`RNFR`/`RNTO`/`DELE`/`RMD`/
//! `MKD`/`ABOR` (its `PASS` handler is commented out in
//! `src/server/ftp_server.rs`); those are new here, grounded on the
//! production shapes in `src/protocol/parser.rs` and the record shapes in
//! `src/protocol/transport.rs`.

use std::fs;
use std::io::{BufWriter, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

#[cfg(unix)]
use std::ffi::CStr;
#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use chrono::{DateTime, Local};

use crate::credentials::CredentialVerifier;
use crate::protocol::{self, Command, CommandKind};
use crate::protocol::transport::{self, DataBlock, Reply, TransportError};
use crate::session::{DataChannel, DataMode, PathError, Session, SessionState, SessionStore};
use crate::worker_pool::CancellationToken;

const DATA_BLOCK_MAX_LEN: usize = transport::MAX_DATA_BLOCK;
const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub enum Outcome {
    Continue,
    Quit,
}

/// Everything a handler needs, bundled the way spec.md's `task_args` groups
/// `{ session_id, session_store, reply_sink, credential_verifier, command }`
/// (here `reply_sink` is simply the owned control socket, and `hostname` /
/// `passive_port_range` are added for `PASV`'s reply).
pub struct HandlerContext<'a> {
    pub session_id: SocketAddr,
    pub store: &'a SessionStore,
    pub control: &'a mut TcpStream,
    pub credentials: &'a dyn CredentialVerifier,
    pub hostname: &'a str,
    pub passive_port_range: (u16, u16),
    pub token: CancellationToken,
}

fn reply(ctx: &mut HandlerContext, code: u16, text: impl Into<String>) {
    let r = Reply::new(code, text);
    if let Err(err) = transport::send_reply(ctx.control, &r) {
        log::warn!("cannot send reply to {}: {err}", ctx.session_id);
    }
}

fn persist(ctx: &mut HandlerContext, session: Session) {
    ctx.token.critical_section(|| {
        if ctx.store.update(&ctx.session_id, session).is_err() {
            log::warn!("session {} vanished before update could persist", ctx.session_id);
        }
    });
}

fn require_active(ctx: &mut HandlerContext, session: &Session) -> bool {
    if session.state != SessionState::Active {
        reply(ctx, 530, "not logged in");
        false
    } else {
        true
    }
}

fn reply_for_path_error(ctx: &mut HandlerContext, err: PathError) {
    match err {
        PathError::Absolute | PathError::Escapes => reply(ctx, 550, "path escapes session root"),
        PathError::TooLong => reply(ctx, 553, "path name too long"),
    }
}

/// Dispatches one parsed, supported command to its handler.
pub fn dispatch(ctx: &mut HandlerContext, kind: CommandKind, arg: String) -> Outcome {
    let Some(session) = ctx.store.get(&ctx.session_id) else {
        log::error!("no session found for {} while dispatching {:?}", ctx.session_id, kind);
        return Outcome::Quit;
    };

    if session.state == SessionState::Invalid {
        reply(ctx, 421, "service not available, closing control connection");
        return Outcome::Quit;
    }

    match kind {
        CommandKind::User => handle_user(ctx, session, arg),
        CommandKind::Pass => handle_pass(ctx, session, arg),
        CommandKind::Cwd => handle_cwd(ctx, session, arg),
        CommandKind::Cdup => handle_cwd(ctx, session, "..".to_string()),
        CommandKind::Quit => handle_quit(ctx),
        CommandKind::Port => handle_port(ctx, session, arg),
        CommandKind::Pasv => handle_pasv(ctx, session),
        CommandKind::Retr => handle_retr(ctx, session, arg),
        CommandKind::Stor => handle_stor(ctx, session, arg),
        CommandKind::Rnfr => handle_rnfr(ctx, session, arg),
        CommandKind::Rnto => handle_rnto(ctx, session, arg),
        CommandKind::Dele => handle_dele(ctx, session, arg),
        CommandKind::Rmd => handle_rmd(ctx, session, arg),
        CommandKind::Mkd => handle_mkd(ctx, session, arg),
        CommandKind::Pwd => handle_pwd(ctx, session),
        CommandKind::List => handle_list(ctx, session, arg),
        CommandKind::Abor => handle_abor(ctx),
    }
}

fn handle_user(ctx: &mut HandlerContext, mut session: Session, username: String) -> Outcome {
    // Session-monotonicity: a session already Active must never be driven
    // back to LoginRequired by a re-issued USER; only stash the name.
    if session.state != SessionState::Active {
        session.state = SessionState::LoginRequired;
    }
    session.username = Some(username);
    persist(ctx, session);
    reply(ctx, 331, "user name okay, need password");
    Outcome::Continue
}

fn handle_pass(ctx: &mut HandlerContext, mut session: Session, password: String) -> Outcome {
    let Some(username) = session.username.clone() else {
        reply(ctx, 503, "login with USER first");
        return Outcome::Continue;
    };

    if ctx.credentials.verify(&username, &password) {
        session.state = SessionState::Active;
        session.password = Some(password);
        persist(ctx, session);
        reply(ctx, 230, "user logged in, proceed");
    } else {
        session.state = SessionState::LoginRequired;
        session.password = None;
        persist(ctx, session);
        reply(ctx, 530, "login incorrect");
    }
    Outcome::Continue
}

fn handle_cwd(ctx: &mut HandlerContext, mut session: Session, arg: String) -> Outcome {
    if !require_active(ctx, &session) {
        return Outcome::Continue;
    }

    match session.resolve(&arg) {
        Ok((absolute, new_current)) => match fs::metadata(&absolute) {
            Ok(meta) if meta.is_dir() => {
                session.current_dir = new_current;
                persist(ctx, session);
                reply(ctx, 250, "directory changed");
            }
            Ok(_) => reply(ctx, 550, format!("{arg}: not a directory")),
            Err(_) => reply(ctx, 550, format!("{arg}: no such directory")),
        },
        Err(err) => reply_for_path_error(ctx, err),
    }
    Outcome::Continue
}

fn handle_quit(ctx: &mut HandlerContext) -> Outcome {
    reply(ctx, 221, "service closing control connection");
    Outcome::Quit
}

fn handle_port(ctx: &mut HandlerContext, mut session: Session, arg: String) -> Outcome {
    if !require_active(ctx, &session) {
        return Outcome::Continue;
    }

    match arg.parse::<SocketAddr>() {
        Ok(target) => {
            session.data = DataChannel { mode: DataMode::Active, active_target: Some(target), passive_listener: None };
            persist(ctx, session);
            reply(ctx, 200, "port command successful");
        }
        Err(_) => reply(ctx, 501, "malformed port argument"),
    }
    Outcome::Continue
}

fn handle_pasv(ctx: &mut HandlerContext, mut session: Session) -> Outcome {
    if !require_active(ctx, &session) {
        return Outcome::Continue;
    }

    let (low, high) = ctx.passive_port_range;
    let bound = (low..=high).find_map(|port| TcpListener::bind((ctx.hostname, port)).ok().map(|l| (l, port)));

    let Some((listener, port)) = bound else {
        reply(ctx, 425, "cannot open data connection");
        return Outcome::Continue;
    };

    session.data =
        DataChannel { mode: DataMode::Passive, active_target: None, passive_listener: Some(Arc::new(listener)) };
    persist(ctx, session);

    let p1 = port / 256;
    let p2 = port % 256;
    let octets = ctx.hostname.replace('.', ",");
    reply(ctx, 227, format!("entering passive mode ({octets},{p1},{p2})"));
    Outcome::Continue
}

/// Opens the data socket implied by the session's current [`DataChannel`]:
/// connects out for `Active` mode, accepts one connection for `Passive`.
fn acquire_data_stream(session: &Session) -> Result<TcpStream, ()> {
    match session.data.mode {
        DataMode::Active => {
            let target = session.data.active_target.ok_or(())?;
            TcpStream::connect(target).map_err(|_| ())
        }
        DataMode::Passive => {
            let listener = session.data.passive_listener.as_ref().ok_or(())?;
            listener.accept().map(|(stream, _)| stream).map_err(|_| ())
        }
    }
}

/// Non-blocking peek at the control socket for a pending `ABOR`, used by the
/// transfer loops in place of the source's `SIGUSR1` delivery. See
/// DESIGN.md's note on `src/server/ftp_server.rs` for why this replaces a
/// second concurrently-submitted task.
fn poll_for_abort(control: &mut TcpStream) -> bool {
    let _ = control.set_read_timeout(Some(ABORT_POLL_INTERVAL));
    let result = transport::recv_request(control);
    let _ = control.set_read_timeout(None);

    match result {
        Ok(request) => {
            let tokens = protocol::lex(&request.payload);
            matches!(protocol::parse(&tokens), Command::Supported { kind: CommandKind::Abor, .. })
        }
        Err(_) => false,
    }
}

fn handle_retr(ctx: &mut HandlerContext, session: Session, arg: String) -> Outcome {
    if !require_active(ctx, &session) {
        return Outcome::Continue;
    }

    let absolute = match session.resolve(&arg) {
        Ok((absolute, _)) => absolute,
        Err(err) => {
            reply_for_path_error(ctx, err);
            return Outcome::Continue;
        }
    };

    let mut file = match fs::File::open(&absolute) {
        Ok(f) => f,
        Err(_) => {
            reply(ctx, 550, format!("{arg}: file unavailable"));
            return Outcome::Continue;
        }
    };

    let mut data_stream = match acquire_data_stream(&session) {
        Ok(s) => s,
        Err(()) => {
            reply(ctx, 425, "cannot open data connection");
            return Outcome::Continue;
        }
    };

    reply(ctx, 125, "data connection already open, transfer starting");

    let mut buf = vec![0u8; DATA_BLOCK_MAX_LEN];
    loop {
        if ctx.token.is_cancelled() || poll_for_abort(ctx.control) {
            reply(ctx, 426, "connection closed; transfer aborted");
            reply(ctx, 226, "abor command successful");
            return Outcome::Continue;
        }

        let n = match file.read(&mut buf) {
            Ok(n) => n,
            Err(_) => {
                reply(ctx, 451, "local error reading file");
                return Outcome::Continue;
            }
        };

        let block = DataBlock { eof: n == 0, data: buf[..n].to_vec() };
        if transport::send_data(&mut data_stream, &block).is_err() {
            reply(ctx, 426, "connection closed; transfer aborted");
            return Outcome::Continue;
        }

        if n == 0 {
            break;
        }
    }

    reply(ctx, 250, "transfer complete");
    Outcome::Continue
}

fn handle_stor(ctx: &mut HandlerContext, session: Session, arg: String) -> Outcome {
    if !require_active(ctx, &session) {
        return Outcome::Continue;
    }

    let absolute = match session.resolve(&arg) {
        Ok((absolute, _)) => absolute,
        Err(err) => {
            reply_for_path_error(ctx, err);
            return Outcome::Continue;
        }
    };

    let mut file = match fs::File::create(&absolute) {
        Ok(f) => f,
        Err(_) => {
            reply(ctx, 550, format!("{arg}: cannot create file"));
            return Outcome::Continue;
        }
    };

    let mut data_stream = match acquire_data_stream(&session) {
        Ok(s) => s,
        Err(()) => {
            reply(ctx, 425, "cannot open data connection");
            return Outcome::Continue;
        }
    };
    let _ = data_stream.set_read_timeout(Some(ABORT_POLL_INTERVAL));

    reply(ctx, 125, "data connection already open, transfer starting");

    loop {
        if ctx.token.is_cancelled() || poll_for_abort(ctx.control) {
            reply(ctx, 426, "connection closed; transfer aborted");
            reply(ctx, 226, "abor command successful");
            return Outcome::Continue;
        }

        let block = match transport::recv_data(&mut data_stream) {
            Ok(b) => b,
            Err(TransportError::WouldBlock) => continue,
            Err(_) => {
                reply(ctx, 426, "connection closed; transfer aborted");
                return Outcome::Continue;
            }
        };

        if !block.data.is_empty() && file.write_all(&block.data).is_err() {
            reply(ctx, 451, "local error writing file");
            return Outcome::Continue;
        }

        if block.eof {
            break;
        }
    }

    reply(ctx, 250, "transfer complete");
    Outcome::Continue
}

fn handle_rnfr(ctx: &mut HandlerContext, mut session: Session, arg: String) -> Outcome {
    if !require_active(ctx, &session) {
        return Outcome::Continue;
    }

    match session.resolve(&arg) {
        Ok((absolute, _)) if absolute.exists() => {
            session.pending_rename = Some(absolute);
            persist(ctx, session);
            reply(ctx, 350, "file exists, ready for destination name");
        }
        Ok(_) => reply(ctx, 550, format!("{arg}: no such file or directory")),
        Err(err) => reply_for_path_error(ctx, err),
    }
    Outcome::Continue
}

fn handle_rnto(ctx: &mut HandlerContext, mut session: Session, arg: String) -> Outcome {
    if !require_active(ctx, &session) {
        return Outcome::Continue;
    }

    let Some(source) = session.pending_rename.take() else {
        reply(ctx, 503, "RNFR required first");
        return Outcome::Continue;
    };

    match session.resolve(&arg) {
        Ok((destination, _)) => {
            let outcome = fs::rename(&source, &destination);
            persist(ctx, session);
            match outcome {
                Ok(()) => reply(ctx, 250, "rename successful"),
                Err(_) => reply(ctx, 550, "rename failed"),
            }
        }
        Err(err) => {
            persist(ctx, session);
            reply_for_path_error(ctx, err);
        }
    }
    Outcome::Continue
}

fn handle_dele(ctx: &mut HandlerContext, session: Session, arg: String) -> Outcome {
    if !require_active(ctx, &session) {
        return Outcome::Continue;
    }

    match session.resolve(&arg) {
        Ok((absolute, _)) => match fs::remove_file(&absolute) {
            Ok(()) => reply(ctx, 250, "file deleted"),
            Err(_) => reply(ctx, 550, format!("{arg}: cannot delete file")),
        },
        Err(err) => reply_for_path_error(ctx, err),
    }
    Outcome::Continue
}

fn handle_rmd(ctx: &mut HandlerContext, session: Session, arg: String) -> Outcome {
    if !require_active(ctx, &session) {
        return Outcome::Continue;
    }

    match session.resolve(&arg) {
        Ok((absolute, _)) => match fs::remove_dir(&absolute) {
            Ok(()) => reply(ctx, 250, "directory removed"),
            Err(_) => reply(ctx, 550, format!("{arg}: cannot remove directory")),
        },
        Err(err) => reply_for_path_error(ctx, err),
    }
    Outcome::Continue
}

fn handle_mkd(ctx: &mut HandlerContext, session: Session, arg: String) -> Outcome {
    if !require_active(ctx, &session) {
        return Outcome::Continue;
    }

    match session.resolve(&arg) {
        Ok((absolute, _)) => match fs::create_dir(&absolute) {
            Ok(()) => reply(ctx, 257, format!("\"{arg}\" created")),
            Err(_) => reply(ctx, 550, format!("{arg}: cannot create directory")),
        },
        Err(err) => reply_for_path_error(ctx, err),
    }
    Outcome::Continue
}

fn handle_pwd(ctx: &mut HandlerContext, session: Session) -> Outcome {
    if !require_active(ctx, &session) {
        return Outcome::Continue;
    }
    let display = session.current_dir.display();
    reply(ctx, 257, format!("\"/{display}\""));
    Outcome::Continue
}

fn handle_list(ctx: &mut HandlerContext, session: Session, arg: String) -> Outcome {
    if !require_active(ctx, &session) {
        return Outcome::Continue;
    }

    let target = if arg.is_empty() { "." } else { &arg };
    let absolute = match session.resolve(target) {
        Ok((absolute, _)) => absolute,
        Err(err) => {
            reply_for_path_error(ctx, err);
            return Outcome::Continue;
        }
    };

    let entries = match fs::read_dir(&absolute) {
        Ok(e) => e,
        Err(_) => {
            reply(ctx, 550, "cannot access directory");
            return Outcome::Continue;
        }
    };

    let mut data_stream = match acquire_data_stream(&session) {
        Ok(s) => s,
        Err(()) => {
            reply(ctx, 425, "cannot open data connection");
            return Outcome::Continue;
        }
    };

    reply(ctx, 150, "here comes the directory listing");

    let mut writer = BufWriter::new(&mut data_stream);
    for entry in entries.flatten() {
        if let Some(line) = format_list_entry(&entry) {
            if writer.write_all(line.as_bytes()).is_err() {
                reply(ctx, 426, "connection closed; transfer aborted");
                return Outcome::Continue;
            }
        }
    }
    let _ = writer.flush();

    reply(ctx, 226, "directory send ok");
    reply(ctx, 250, "ok");
    Outcome::Continue
}

fn handle_abor(ctx: &mut HandlerContext) -> Outcome {
    reply(ctx, 225, "no transfer in progress");
    Outcome::Continue
}

/// `ls -l`-style line for one directory entry. Grounded on the teacher's
/// `exec_list_command`, unchanged in substance (permission bits, owner,
/// group, size, modification time, name via `libc`+`chrono`).
#[cfg(unix)]
fn format_list_entry(entry: &fs::DirEntry) -> Option<String> {
    let metadata = entry.metadata().ok()?;
    let name = entry.file_name().into_string().ok()?;
    let modified: DateTime<Local> = metadata.modified().ok()?.into();

    let perms = metadata.mode();
    let triplet = |read: u32, write: u32, exec: u32| {
        format!(
            "{}{}{}",
            if perms & read != 0 { 'r' } else { '-' },
            if perms & write != 0 { 'w' } else { '-' },
            if perms & exec != 0 { 'x' } else { '-' },
        )
    };

    let (owner, group) = unsafe {
        let passwd = libc::getpwuid(metadata.uid());
        let grp = libc::getgrgid(metadata.gid());
        if passwd.is_null() || grp.is_null() {
            return None;
        }
        (
            CStr::from_ptr((*passwd).pw_name).to_string_lossy().into_owned(),
            CStr::from_ptr((*grp).gr_name).to_string_lossy().into_owned(),
        )
    };

    let kind = if metadata.is_dir() { "d" } else { "-" };
    let perm_str = format!("{}{}{}", triplet(0o400, 0o200, 0o100), triplet(0o40, 0o20, 0o10), triplet(0o4, 0o2, 0o1));

    Some(format!(
        "{kind}{perm_str} {owner} {group} {:>10} {} {name}\r\n",
        metadata.len(),
        modified.format("%b %d %H:%M"),
    ))
}

/// Non-unix fallback: no portable owner/group/permission-bit lookup exists
/// in the dependency stack, so only the size and kind are reported.
#[cfg(not(unix))]
fn format_list_entry(entry: &fs::DirEntry) -> Option<String> {
    let metadata = entry.metadata().ok()?;
    let name = entry.file_name().into_string().ok()?;
    let kind = if metadata.is_dir() { "d" } else { "-" };
    Some(format!("{kind}--------- 1 owner group {:>10} {name}\r\n", metadata.len()))
}
