use chrono::{Duration, Local, Utc};
use log::{error, info, warn};
use std::path::{Path, PathBuf};

use voltalis::config::{AuthScheme, Config};
use voltalis::models::voltalis::Site;
use voltalis::services::{eco, switch};
use voltalis::transport::UreqTransport;
use voltalis::{ClientError, Queries, VoltalisClient};

const USAGE: &str = "usage: voltalis [--env-file PATH] <survey|all-on|all-off|all-eco>";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Command {
    Survey,
    AllOn,
    AllOff,
    AllEco,
}

impl Command {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "survey" => Some(Command::Survey),
            "all-on" => Some(Command::AllOn),
            "all-off" => Some(Command::AllOff),
            "all-eco" => Some(Command::AllEco),
            _ => None,
        }
    }
}

struct Args {
    env_file: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut env_file = None;
    let mut command = None;

    while let Some(arg) = args.next() {
        let path = if arg == "--env-file" {
            Some(args.next().ok_or("`--env-file` requires a path argument")?)
        } else {
            arg.strip_prefix("--env-file=").map(str::to_string)
        };
        if let Some(path) = path {
            if path.is_empty() {
                return Err("`--env-file` requires a path argument".to_string());
            }
            if env_file.replace(PathBuf::from(path)).is_some() {
                return Err("`--env-file` provided more than once".to_string());
            }
            continue;
        }
        match Command::parse(&arg) {
            Some(c) if command.is_none() => command = Some(c),
            _ => return Err(format!("unrecognised argument: {}\n{}", arg, USAGE)),
        }
    }

    Ok(Args {
        env_file,
        command: command.ok_or(USAGE)?,
    })
}

/// Returns the path of the env file that was loaded, if any.
fn load_env(explicit: Option<PathBuf>) -> Result<Option<PathBuf>, String> {
    let path = match explicit {
        Some(path) if !path.is_file() => return Err(format!("env file not found: {}", path.display())),
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let default_path = cwd.join(".env");
            if !default_path.is_file() {
                return Ok(None);
            }
            default_path
        }
    };
    load_env_file(&path)?;
    Ok(Some(path))
}

/// Load `KEY=value` lines from `path` into the process environment. Variables
/// already set in the process win.
fn load_env_file(path: &Path) -> Result<(), String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;

    for (index, line) in text.lines().enumerate() {
        let assignment = parse_env_assignment(line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?;
        if let Some((key, value)) = assignment
            && std::env::var_os(&key).is_none()
        {
            // set_var is unsafe on edition 2024; runs before logging or any thread starts
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

/// One dotenv line: blank lines and `#` comments yield `None`, `export ` is
/// accepted, values may be single- or double-quoted.
fn parse_env_assignment(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let trimmed = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);

    let (key, raw) = trimmed.split_once('=').ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("variable name cannot be empty".to_string());
    }
    if key.chars().any(char::is_whitespace) {
        return Err(format!("variable name contains whitespace: {}", key));
    }

    let raw = raw.trim();
    let value = if let Some(rest) = raw.strip_prefix('"') {
        unquote(rest, '"')?
    } else if let Some(rest) = raw.strip_prefix('\'') {
        unquote(rest, '\'')?
    } else {
        raw.split('#').next().unwrap_or_default().trim_end().to_string()
    };
    Ok(Some((key.to_string(), value)))
}

/// Body of a quoted value up to the closing `quote`. Backslash escapes apply to
/// double quotes only.
fn unquote(input: &str, quote: char) -> Result<String, String> {
    let mut out = String::new();
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if quote == '"' => {
                let escaped = chars.next().ok_or_else(|| "unterminated escape sequence".to_string())?;
                out.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
            }
            c if c == quote => {
                let rest = chars.as_str().trim();
                return if rest.is_empty() || rest.starts_with('#') {
                    Ok(out)
                } else {
                    Err(format!("unexpected characters after closing {}", quote))
                };
            }
            c => out.push(c),
        }
    }
    Err(format!("unterminated {}-quoted value", quote))
}

fn login(cfg: &Config) -> Result<VoltalisClient, ClientError> {
    let builder = VoltalisClient::builder(UreqTransport::new(cfg.http_timeout)).endpoints(cfg.endpoints.clone());
    match cfg.auth_scheme {
        AuthScheme::Cookie => builder.login_classic(&cfg.credentials),
        AuthScheme::Bearer => builder.login_bearer(&cfg.credentials),
    }
}

/// Hit every read endpoint once per site and log what came back.
fn survey(client: &VoltalisClient) -> Result<(), ClientError> {
    if client.token().is_none() {
        let me = client.me()?;
        let Some(site) = me.default_site else {
            warn!("Account has no default site");
            return Ok(());
        };
        let stats = client.consumption_stats_per_hour(site.uid, Local::now().date_naive())?;
        info!(
            "Site {}: total consumption {} today over {} step(s)",
            site.uid,
            stats.total_consumption,
            stats.consumptions.len()
        );
        return Ok(());
    }

    let now = Utc::now();
    let today = Local::now().date_naive();
    for site in client.sites() {
        info!("Site {}: {} modulator(s)", site.uid, site.modulators.len());
        client.last_minute_consumption(site.uid)?;
        client.immediate_consumption_in_kw(site.uid)?;
        client.site_max_power(site.uid, now - Duration::days(1), now)?;
        client.absence_mode_state(site.uid)?;
        if let Some(uid) = site.modulators.last().and_then(|m| m.uid) {
            client.on_off_state(site.uid, uid)?;
            client.modulator_state(site.uid, uid)?;
            client.absence_state(site.uid, uid)?;
        }
        client.available_programmation_mode(site.uid)?;
        client.mode_list(site.uid)?;
        client.scheduler_list(site.uid)?;
        client.immediate_consumption_charts(site.uid, today)?;
        client.annual_consumption_charts(site.uid)?;
        client.total_modulated_power(site.uid, now - Duration::days(365), now)?;
        client.country_consumption_map(site.uid)?;
    }
    Ok(())
}

fn all_eco(client: &VoltalisClient, site: &Site) -> Result<(), String> {
    let queries = Queries::new(client);
    let report =
        eco::apply_all_eco(&queries, site, Local::now().time()).map_err(|e| format!("site {}: {}", site.uid, e))?;
    info!(
        "Site {}: mode {} ({}), scheduler {:?} ({}), activated={}, {} device(s) skipped",
        report.site,
        report.mode_id,
        if report.mode_created { "created" } else { "reused" },
        report.scheduler_id,
        if report.scheduler_created { "created" } else { "reused" },
        report.activated,
        report.skipped().count()
    );
    Ok(())
}

fn run(command: Command) -> Result<(), String> {
    let cfg = Config::from_env().map_err(|e| e.to_string())?;
    info!(
        "Config loaded (auth_scheme={:?}, http_timeout={}s, base_url={})",
        cfg.auth_scheme,
        cfg.http_timeout.as_secs(),
        cfg.endpoints.base_url
    );

    let client = login(&cfg).map_err(|e| format!("Voltalis login failed: {}", e))?;
    if command != Command::Survey && cfg.auth_scheme != AuthScheme::Cookie {
        return Err(format!("{:?} needs VOLTALIS_AUTH_SCHEME=cookie", command));
    }

    match command {
        Command::Survey => survey(&client).map_err(|e| e.to_string())?,
        Command::AllOn | Command::AllOff => {
            for site in client.sites() {
                switch::switch_all(&client, site, command == Command::AllOn).map_err(|e| e.to_string())?;
            }
        }
        Command::AllEco => {
            for site in client.sites() {
                all_eco(&client, site)?;
            }
        }
    }
    Ok(())
}

fn main() {
    let setup = parse_args().and_then(|args| load_env(args.env_file.clone()).map(|loaded| (args, loaded)));
    let (args, loaded_env) = match setup {
        Ok(v) => v,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // after the env file so RUST_LOG from it is respected
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(path) = loaded_env.as_ref() {
        info!("Environment loaded from {}", path.display());
    }
    info!(
        "voltalis {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );

    if let Err(e) = run(args.command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_lines() {
        let kv = |k: &str, v: &str| -> Result<Option<(String, String)>, String> {
            Ok(Some((k.to_string(), v.to_string())))
        };
        assert_eq!(parse_env_assignment("  # comment"), Ok(None));
        assert_eq!(parse_env_assignment(""), Ok(None));
        assert_eq!(parse_env_assignment("A=1 # trailing"), kv("A", "1"));
        assert_eq!(parse_env_assignment("export B = two"), kv("B", "two"));
        assert_eq!(parse_env_assignment(r#"C="a \"q\"\tb""#), kv("C", "a \"q\"\tb"));
        assert_eq!(parse_env_assignment(r"D='raw \n' # x"), kv("D", r"raw \n"));
        assert_eq!(parse_env_assignment("E="), kv("E", ""));
        assert!(parse_env_assignment("no equals").is_err());
        assert!(parse_env_assignment("=v").is_err());
        assert!(parse_env_assignment(r#"F="open"#).is_err());
        assert!(parse_env_assignment(r#"G="x" y"#).is_err());
    }

    #[test]
    fn commands() {
        assert_eq!(Command::parse("all-eco"), Some(Command::AllEco));
        assert_eq!(Command::parse("survey"), Some(Command::Survey));
        assert_eq!(Command::parse("all_eco"), None);
    }
}
