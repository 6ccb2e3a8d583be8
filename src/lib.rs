pub mod config;
pub mod credentials;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod session;
pub mod worker_pool;

use std::sync::{Arc, OnceLock};

use config::Config;
use credentials::{CredentialVerifier, FileVerifier, OpenVerifier};
use server::FtpServer;

#[cfg(unix)]
use signal_hook::consts::{SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook::iterator::Signals;
#[cfg(unix)]
use std::net::TcpStream;
#[cfg(unix)]
use std::thread;

#[cfg(windows)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(windows)]
use winapi::shared::minwindef::{BOOL, DWORD, TRUE};
#[cfg(windows)]
use winapi::um::wincon::SetConsoleCtrlHandler;

static CONFIG: OnceLock<Config> = OnceLock::new();

#[cfg(windows)]
static WINDOWS_SHUTDOWN: OnceLock<Arc<AtomicBool>> = OnceLock::new();

#[cfg(windows)]
unsafe extern "system" fn console_ctrl_handler(_ctrl_type: DWORD) -> BOOL {
    if let Some(flag) = WINDOWS_SHUTDOWN.get() {
        flag.store(true, Ordering::Relaxed);
    }
    TRUE
}

pub fn run(config: Config) -> Result<(), String> {
    let log_path = config.log_file().cloned();

    if CONFIG.set(config).is_err() {
        return Err("cannot create singleton config".to_string());
    }
    let config = CONFIG.get().unwrap();

    if let Err(err) = logging::init(log_path.as_deref(), log::LevelFilter::Info) {
        eprintln!("warning: {err}");
    }

    let credentials: Arc<dyn CredentialVerifier> = match config.credentials_file() {
        Some(path) => Arc::new(FileVerifier::load(path)?),
        None => Arc::new(OpenVerifier),
    };

    let mut ftp_server = FtpServer::build(config).map_err(|err| format!("cannot build FTP server: {err}"))?;

    // Intercepts SIGINT/SIGTERM on Unix, same pattern as the teacher's `run()`
    // but logged through `log` instead of `println!`.
    #[cfg(unix)]
    {
        let server_shutdown = ftp_server.get_shutdown_rc();
        let hostname = config.get_hostname();
        let port = config.get_port();

        let mut signals =
            Signals::new([SIGINT, SIGTERM]).map_err(|err| format!("cannot create signals handler: {err}"))?;

        thread::spawn(move || {
            for _ in signals.forever() {
                log::info!("interrupt signal received, cleaning up...");

                server_shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
                // Wakes the accept loop's blocking `accept()` call so it can
                // observe the shutdown flag.
                let _ = TcpStream::connect(format!("{hostname}:{port}"));

                log::info!("server stopped.");
            }
        });
    }

    // The teacher declared `winapi` as a windows dependency but never used
    // it; this wires it to an actual `SetConsoleCtrlHandler` shutdown path.
    #[cfg(windows)]
    {
        let server_shutdown = ftp_server.get_shutdown_rc();
        let _ = WINDOWS_SHUTDOWN.set(server_shutdown);

        unsafe {
            SetConsoleCtrlHandler(Some(console_ctrl_handler), TRUE);
        }
    }

    ftp_server.start(config, credentials)
}

#[cfg(test)]
mod tests {}
