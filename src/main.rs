use std::{env, error::Error, path::PathBuf, process};

use ftp_paradise::config::Config;

static VERSION: &str = "0.2.0";

fn main() -> Result<(), Box<dyn Error>> {
    let parsed = parse_args(env::args()).unwrap_or_else(|err| {
        eprintln!("Error parsing arguments: {err}.");

        process::exit(1);
    });

    let mut config = Config::new(parsed.hostname, parsed.port);
    if let Some(path) = parsed.config_path {
        config = config.apply_file(&path).unwrap_or_else(|err| {
            eprintln!("Error in config file: {err}.");

            process::exit(1);
        });
    }

    if let Err(err) = config.check() {
        eprintln!("Error in config: {err}.");

        process::exit(1);
    }

    if let Err(err) = ftp_paradise::run(config) {
        eprintln!("Application error: {err}.");

        process::exit(1);
    }

    Ok(())
}

struct ParsedArgs {
    hostname: String,
    port: String,
    config_path: Option<PathBuf>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<ParsedArgs, &'static str> {
    // Skips argv[0].
    args.next();

    let mut hostname = String::new();
    let mut port = String::new();
    let mut config_path = None;

    while let Some(arg) = args.next() {
        match &arg[..] {
            "--hostname" | "-h" => {
                if let Some(h) = args.next() {
                    hostname = h;
                } else if hostname.is_empty() {
                    return Err("no hostname specified after --hostname argument");
                }
            }
            "--port" | "-p" => {
                if let Some(p) = args.next() {
                    port = p;
                } else if port.is_empty() {
                    return Err("no port number specified after --port argument");
                }
            }
            "--config" | "-c" => {
                if let Some(c) = args.next() {
                    config_path = Some(PathBuf::from(c));
                } else {
                    return Err("no path specified after --config argument");
                }
            }
            "--version" | "-v" => {
                eprintln!("FTP Paradise v{VERSION}");
                process::exit(0);
            }
            _ => (),
        }
    }

    if hostname.is_empty() {
        return Err("no hostname specified");
    }

    if port.is_empty() {
        return Err("no port specified");
    }

    Ok(ParsedArgs { hostname, port, config_path })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> impl Iterator<Item = String> {
        std::iter::once("ftp-paradise".to_string()).chain(raw.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_hostname_and_port() {
        let parsed = parse_args(args(&["-h", "127.0.0.1", "-p", "2121"])).unwrap();
        assert_eq!(parsed.hostname, "127.0.0.1");
        assert_eq!(parsed.port, "2121");
        assert!(parsed.config_path.is_none());
    }

    #[test]
    fn parses_config_flag() {
        let parsed = parse_args(args(&["-h", "127.0.0.1", "-p", "2121", "--config", "ftpd.conf"])).unwrap();
        assert_eq!(parsed.config_path, Some(PathBuf::from("ftpd.conf")));
    }

    #[test]
    fn missing_hostname_is_an_error() {
        assert!(parse_args(args(&["-p", "2121"])).is_err());
    }
}
