//! Server configuration: CLI-built core settings plus an optional flat
//! `key = value` config file for the settings the CLI does not expose.
//!
//! The `hostname`/`port` fields and their `check()` validation are kept from
//! the teacher's `Config`. The remaining fields are new: `worker_count`,
//! `log_file`, `credentials_file`, `passive_port_range` and `root_dir` are
//! required by the ambient stack (worker pool sizing, logging, credential
//! verification, `PASV` port allocation, and the filesystem root every
//! session is confined to) that spec.md's distillation left for the runtime
//! to decide. The config-file format itself has no counterpart in the
//! teacher; it is modeled on the simplicity of the teacher's own CLI parser
//! in `src/main.rs` rather than imported from another crate, since none of
//! the pack's dependencies include a config-file parser.

use std::fs;
use std::path::PathBuf;

#[derive(Clone)]
pub struct Config {
    hostname: String,
    port: String,
    worker_count: usize,
    log_file: Option<PathBuf>,
    credentials_file: Option<PathBuf>,
    passive_port_range: (u16, u16),
    root_dir: PathBuf,
}

const DEFAULT_WORKER_COUNT: usize = 10;
const DEFAULT_PASSIVE_PORT_RANGE: (u16, u16) = (7000, 7999);

impl Config {
    pub fn new(hostname: String, port: String) -> Config {
        Config {
            hostname,
            port,
            worker_count: DEFAULT_WORKER_COUNT,
            log_file: None,
            credentials_file: None,
            passive_port_range: DEFAULT_PASSIVE_PORT_RANGE,
            root_dir: PathBuf::from("."),
        }
    }

    /// Overlays settings found in a flat `key = value` file (blank lines and
    /// `#`-prefixed lines ignored) onto `self`. Unknown keys are rejected so
    /// that a typo'd setting does not silently fail to apply.
    pub fn apply_file(mut self, path: &PathBuf) -> Result<Config, String> {
        let text = fs::read_to_string(path).map_err(|err| format!("cannot read config file: {err}"))?;

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| format!("malformed config line {}: {line}", lineno + 1))?;
            let (key, value) = (key.trim(), value.trim());

            match key {
                "worker_count" => {
                    self.worker_count = value
                        .parse()
                        .map_err(|_| format!("invalid worker_count: {value}"))?;
                }
                "log_file" => self.log_file = Some(PathBuf::from(value)),
                "credentials_file" => self.credentials_file = Some(PathBuf::from(value)),
                "passive_port_range" => {
                    let (low, high) = value
                        .split_once('-')
                        .ok_or_else(|| format!("invalid passive_port_range: {value}"))?;
                    let low: u16 = low.trim().parse().map_err(|_| format!("invalid passive_port_range: {value}"))?;
                    let high: u16 =
                        high.trim().parse().map_err(|_| format!("invalid passive_port_range: {value}"))?;
                    if low > high {
                        return Err(format!("invalid passive_port_range: {value}"));
                    }
                    self.passive_port_range = (low, high);
                }
                "root_dir" => self.root_dir = PathBuf::from(value),
                other => return Err(format!("unknown config key: {other}")),
            }
        }

        Ok(self)
    }

    pub fn check(&self) -> Result<(), &'static str> {
        let host: Vec<_> = self.hostname.split('.').collect();

        if host.len() != 4 {
            return Err("invalid number of decimal in hostname");
        }

        for dec in host {
            if dec.parse::<i32>().is_err() {
                return Err("invalid format in hostname");
            }
        }

        if self.port.parse::<i32>().is_err() {
            return Err("invalid port format");
        }

        if self.worker_count == 0 {
            return Err("worker_count must be at least 1");
        }

        if self.passive_port_range.0 > self.passive_port_range.1 {
            return Err("passive_port_range low bound exceeds high bound");
        }

        Ok(())
    }

    pub fn get_hostname(&self) -> String {
        self.hostname.clone()
    }

    pub fn get_port(&self) -> String {
        self.port.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn log_file(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    pub fn credentials_file(&self) -> Option<&PathBuf> {
        self.credentials_file.as_ref()
    }

    pub fn passive_port_range(&self) -> (u16, u16) {
        self.passive_port_range
    }

    pub fn root_dir(&self) -> &PathBuf {
        &self.root_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_pass_check() {
        let config = Config::new("127.0.0.1".to_string(), "2121".to_string());
        assert!(config.check().is_ok());
    }

    #[test]
    fn rejects_malformed_hostname() {
        let config = Config::new("not-an-ip".to_string(), "2121".to_string());
        assert!(config.check().is_err());
    }

    #[test]
    fn apply_file_overlays_known_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "worker_count = 4").unwrap();
        writeln!(file, "passive_port_range = 8000-8100").unwrap();
        writeln!(file, "root_dir = /srv/ftp").unwrap();

        let config = Config::new("127.0.0.1".to_string(), "2121".to_string())
            .apply_file(&file.path().to_path_buf())
            .unwrap();

        assert_eq!(config.worker_count(), 4);
        assert_eq!(config.passive_port_range(), (8000, 8100));
        assert_eq!(config.root_dir(), &PathBuf::from("/srv/ftp"));
    }

    #[test]
    fn apply_file_rejects_unknown_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bogus_key = 1").unwrap();

        let result = Config::new("127.0.0.1".to_string(), "2121".to_string())
            .apply_file(&file.path().to_path_buf());
        assert!(result.is_err());
    }
}
