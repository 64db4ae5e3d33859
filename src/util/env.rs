//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_ok() {
            return;
        }
        // Fallback to the Cargo project root so bins behave the same from any cwd.
        let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
        let _ = dotenv::from_filename(candidate);
    });
}

/// Common bootstrap for CLI binaries:
///   * initialize dotenv/env once
///   * log which database the tool is about to touch (redacted)
pub fn bootstrap_cli(bin_name: &str) {
    init_env();

    match db_url() {
        Ok(url) => info!(
            target = "bootstrap",
            bin = bin_name,
            dsn = %redact_value("DATABASE_URL", &url),
            "database DSN resolved"
        ),
        Err(_) => warn!(
            target = "bootstrap",
            bin = bin_name,
            "no database configured; set DATABASE_URL or DB_HOST/DB_USER/DB_NAME"
        ),
    }
}

/// Get required env var; error if missing.
pub fn env_req(key: &str) -> anyhow::Result<String> {
    init_env();
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing env var {key}"))
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Database URL: explicit `DATABASE_URL` wins, otherwise composed from the
/// `DB_*` variables the storefront itself uses.
pub fn db_url() -> anyhow::Result<String> {
    init_env();
    if let Some(v) = env_opt("DATABASE_URL") {
        return Ok(v);
    }
    if let Some(dsn) = build_dsn_from_db_vars() {
        return Ok(dsn);
    }
    Err(anyhow::anyhow!("no database URL env vars set"))
}

fn build_dsn_from_db_vars() -> Option<String> {
    let host = env_opt("DB_HOST").unwrap_or_else(|| "localhost".into());
    let user = env_opt("DB_USER")?;
    let password = env_opt("DB_PASSWORD");
    let database = env_opt("DB_NAME")?;
    let port = env_parse::<u16>("DB_PORT", 3306);
    compose_mysql_dsn(&host, port, &user, password.as_deref(), &database)
}

/// Build a `mysql://` DSN. Credentials may contain reserved URL characters,
/// so everything goes through `url::Url` to get percent-encoding right.
pub fn compose_mysql_dsn(
    host: &str,
    port: u16,
    user: &str,
    password: Option<&str>,
    database: &str,
) -> Option<String> {
    let mut out = url::Url::parse("mysql://localhost").ok()?;
    out.set_username(user).ok()?;
    if let Some(pass) = password.filter(|p| !p.is_empty()) {
        out.set_password(Some(pass)).ok()?;
    }
    let host_trimmed = host.trim().trim_matches(|c| c == '[' || c == ']');
    if host_trimmed.contains(':') {
        out.set_host(Some(&format!("[{host_trimmed}]"))).ok()?;
    } else {
        out.set_host(Some(host_trimmed)).ok()?;
    }
    out.set_port(Some(port)).ok()?;
    out.set_path(&format!("/{database}"));
    Some(out.to_string())
}

pub fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    if k.contains("PASS") || k.contains("SECRET") || k.contains("KEY") || k.contains("TOKEN") {
        return "***".to_string();
    }

    let val_trim = val.trim();

    // Always redact database DSNs even if the key isn't obviously sensitive.
    if let Ok(mut u) = url::Url::parse(val_trim) {
        if u.scheme().eq_ignore_ascii_case("mysql") {
            if !u.username().is_empty() {
                let _ = u.set_username("***");
            }
            if u.password().is_some() {
                let _ = u.set_password(Some("***"));
            }
            return u.to_string();
        }
    }

    val_trim.to_string()
}

/// Validate required keys and log a consolidated, redacted snapshot of configuration.
/// Returns error if any required key is missing.
pub fn preflight_check(title: &str, required: &[&str], also_log: &[&str]) -> anyhow::Result<()> {
    init_env();
    let missing = missing_keys(required);
    let mut snapshot: Vec<(String, String)> = Vec::new();
    for &k in required.iter().chain(also_log) {
        let v = env_opt(k).unwrap_or_default();
        snapshot.push((k.to_string(), redact_value(k, &v)));
    }
    info!(target = "preflight", title, snapshot = ?snapshot, "configuration snapshot");
    if !missing.is_empty() {
        return Err(anyhow::anyhow!("missing required env: {:?}", missing));
    }
    Ok(())
}

/// Keys from `required` that are unset or blank.
pub fn missing_keys<'a>(required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|k| env_opt(k).is_none())
        .collect()
}

/// One `KEY=value` assignment from a `.env` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvLine {
    pub line: usize,
    pub key: String,
    pub value: String,
}

/// Parse `.env` text the way dotenv reads it: `export` prefixes dropped,
/// surrounding quotes stripped, ` #` comments removed from unquoted values.
pub fn parse_env_file(contents: &str) -> Vec<EnvLine> {
    let mut out = Vec::new();
    for (idx, raw) in contents.lines().enumerate() {
        let mut line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("export ") {
            line = rest.trim();
        }
        let Some((key, val)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let mut val = val.trim();
        let quoted = val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')));
        if quoted {
            val = &val[1..val.len() - 1];
        } else if let Some(hash) = val.find(" #").or_else(|| val.find("\t#")) {
            // Only a `#` preceded by whitespace starts a comment.
            val = val[..hash].trim_end();
        }
        out.push(EnvLine {
            line: idx + 1,
            key: key.to_string(),
            value: val.to_string(),
        });
    }
    out
}
