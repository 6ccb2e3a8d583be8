//! The accept loop (C7) and per-command handlers (C6).

pub mod ftp_server;
pub mod handlers;

pub use ftp_server::FtpServer;
