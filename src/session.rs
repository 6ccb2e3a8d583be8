//! The session state machine and its shared, concurrency-safe store (C4).
//!
//! Grounded on `server/lib/util/include/session.h` + `src/session.c` in the
//! retrieved C source (session fields, state enum, the one-of
//! active/passive data socket invariant) and on the teacher's
//! `src/options.rs`/`src/options/session.rs`, which hold the equivalent
//! per-client state for a single connection. The source's session key was a
//! formatted `"peer-ip:peer-port"` string; this uses `SocketAddr` directly,
//! per the source's own note that a fixed-size tuple is preferable.

use std::collections::HashMap;
use std::fmt;
use std::net::{SocketAddr, TcpListener};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// `PATH_MAX` on the platforms this server targets; mirrors
/// `REQUEST_MAX_LENGTH`/`PATH_MAX` in the C source's `requests.h`.
const MAX_PATH_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoginRequired,
    Active,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    Active,
    Passive,
}

/// The session's data-channel disposition. Exactly one field is populated at
/// a time, matching the `one of data_fd / listen_fd is valid` invariant.
#[derive(Clone)]
pub struct DataChannel {
    pub mode: DataMode,
    /// Set after `PORT`: the endpoint the server will connect out to.
    pub active_target: Option<SocketAddr>,
    /// Set after `PASV`: the listener the client is expected to connect into.
    pub passive_listener: Option<Arc<TcpListener>>,
}

impl DataChannel {
    fn none() -> DataChannel {
        DataChannel { mode: DataMode::Active, active_target: None, passive_listener: None }
    }
}

impl fmt::Debug for DataChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChannel")
            .field("mode", &self.mode)
            .field("active_target", &self.active_target)
            .field("has_passive_listener", &self.passive_listener.is_some())
            .finish()
    }
}

/// A snapshot of one client's state. Handlers pull a clone out of the
/// [`SessionStore`], mutate the clone, and persist it back via `update`.
#[derive(Debug, Clone)]
pub struct Session {
    pub peer: SocketAddr,
    pub state: SessionState,
    pub data: DataChannel,
    /// Absolute; the root this session's client can never escape upwards of.
    pub working_dir: PathBuf,
    /// Relative to `working_dir`.
    pub current_dir: PathBuf,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Set by `RNFR`, consumed by the following `RNTO`.
    pub pending_rename: Option<PathBuf>,
    pub last_seen: Instant,
}

#[derive(Debug)]
pub enum PathError {
    Absolute,
    Escapes,
    TooLong,
}

impl Session {
    pub fn new(peer: SocketAddr, working_dir: PathBuf) -> Session {
        Session {
            peer,
            state: SessionState::LoginRequired,
            data: DataChannel::none(),
            working_dir,
            current_dir: PathBuf::new(),
            username: None,
            password: None,
            pending_rename: None,
            last_seen: Instant::now(),
        }
    }

    /// A stable, hashable id for this session's in-flight worker-pool task;
    /// generalizes the source's "client's current task-id is the session's
    /// control-fd" rule to a value derived from the peer address instead of
    /// a raw file descriptor.
    pub fn task_id(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.peer.hash(&mut hasher);
        hasher.finish()
    }

    /// Resolves `arg` under `working_dir/current_dir`, rejecting absolute
    /// arguments, `..` components that would escape `working_dir`, and
    /// results exceeding the platform path length limit.
    ///
    /// Returns the resolved absolute path and the `current_dir` that would
    /// result from treating `arg` as a `CWD` target (callers that don't need
    /// to change directory simply ignore the second element).
    pub fn resolve(&self, arg: &str) -> Result<(PathBuf, PathBuf), PathError> {
        let arg_path = Path::new(arg);
        if arg_path.is_absolute() {
            return Err(PathError::Absolute);
        }

        let mut stack: Vec<&std::ffi::OsStr> =
            self.current_dir.components().map(|c| c.as_os_str()).collect();

        for component in arg_path.components() {
            match component {
                Component::ParentDir => {
                    if stack.pop().is_none() {
                        return Err(PathError::Escapes);
                    }
                }
                Component::CurDir => {}
                Component::Normal(part) => stack.push(part),
                Component::RootDir | Component::Prefix(_) => return Err(PathError::Escapes),
            }
        }

        let mut new_current = PathBuf::new();
        for part in &stack {
            new_current.push(part);
        }

        let absolute = self.working_dir.join(&new_current);
        if absolute.as_os_str().len() > MAX_PATH_LEN {
            return Err(PathError::TooLong);
        }

        Ok((absolute, new_current))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SessionStoreError {
    AlreadyExists,
    NotFound,
}

/// Concurrent `SocketAddr -> Session` table (C4). The mutex is held only
/// across the map operation itself; callers never hold it across I/O.
pub struct SessionStore {
    inner: Mutex<HashMap<SocketAddr, Session>>,
}

impl SessionStore {
    pub fn new() -> SessionStore {
        SessionStore { inner: Mutex::new(HashMap::new()) }
    }

    pub fn insert(&self, session: Session) -> Result<(), SessionStoreError> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(&session.peer) {
            return Err(SessionStoreError::AlreadyExists);
        }
        map.insert(session.peer, session);
        Ok(())
    }

    pub fn get(&self, id: &SocketAddr) -> Option<Session> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    pub fn update(&self, id: &SocketAddr, session: Session) -> Result<(), SessionStoreError> {
        let mut map = self.inner.lock().unwrap();
        if !map.contains_key(id) {
            return Err(SessionStoreError::NotFound);
        }
        map.insert(*id, session);
        Ok(())
    }

    pub fn remove(&self, id: &SocketAddr) -> Option<Session> {
        self.inner.lock().unwrap().remove(id)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        SessionStore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    #[test]
    fn resolves_relative_path_under_working_dir() {
        let session = Session::new(peer(1), PathBuf::from("/srv/ftp"));
        let (abs, rel) = session.resolve("foo.txt").unwrap();
        assert_eq!(abs, PathBuf::from("/srv/ftp/foo.txt"));
        assert_eq!(rel, PathBuf::from("foo.txt"));
    }

    #[test]
    fn rejects_absolute_argument() {
        let session = Session::new(peer(1), PathBuf::from("/srv/ftp"));
        assert!(matches!(session.resolve("/etc/passwd"), Err(PathError::Absolute)));
    }

    #[test]
    fn parent_dir_within_bounds_is_allowed() {
        let mut session = Session::new(peer(1), PathBuf::from("/srv/ftp"));
        session.current_dir = PathBuf::from("a/b");
        let (abs, rel) = session.resolve("..").unwrap();
        assert_eq!(abs, PathBuf::from("/srv/ftp/a"));
        assert_eq!(rel, PathBuf::from("a"));
    }

    #[test]
    fn parent_dir_escaping_working_dir_is_rejected() {
        let session = Session::new(peer(1), PathBuf::from("/srv/ftp"));
        assert!(matches!(session.resolve(".."), Err(PathError::Escapes)));
    }

    #[test]
    fn path_containment_holds_for_any_accepted_arg() {
        let mut session = Session::new(peer(1), PathBuf::from("/srv/ftp"));
        session.current_dir = PathBuf::from("pub");
        for arg in ["x", "y/z", ".", "../pub/w"] {
            if let Ok((abs, _)) = session.resolve(arg) {
                assert!(abs.starts_with(&session.working_dir));
            }
        }
    }

    #[test]
    fn store_insert_get_update_remove_round_trip() {
        let store = SessionStore::new();
        let id = peer(2121);
        let session = Session::new(id, PathBuf::from("/srv/ftp"));

        store.insert(session.clone()).unwrap();
        assert_eq!(store.insert(session.clone()), Err(SessionStoreError::AlreadyExists));

        let mut fetched = store.get(&id).unwrap();
        assert_eq!(fetched.state, SessionState::LoginRequired);

        fetched.state = SessionState::Active;
        store.update(&id, fetched).unwrap();
        assert_eq!(store.get(&id).unwrap().state, SessionState::Active);

        let removed = store.remove(&id);
        assert!(removed.is_some());
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn session_monotonicity_login_required_to_active_only_via_pass() {
        let mut session = Session::new(peer(1), PathBuf::from("/srv/ftp"));
        assert_eq!(session.state, SessionState::LoginRequired);

        // Simulates USER: stays LoginRequired.
        session.username = Some("alice".into());
        assert_eq!(session.state, SessionState::LoginRequired);

        // Simulates a matching PASS.
        session.state = SessionState::Active;
        assert_eq!(session.state, SessionState::Active);
    }
}
