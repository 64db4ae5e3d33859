//! Replace the local database with a dump of the live one.
//!
//! Export runs `mysqldump` on the live host over `ssh` (through `sshpass` when a
//! password is configured), the local side is rebuilt and loaded with the
//! `mysql` client, then sqlx counts the imported tables.

use std::fs::{self, File};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDateTime};
use tokio::process::Command;
use tracing::{info, warn};

use crate::database_ops::db::Db;
use crate::util::env as env_util;

pub const REQUIRED_KEYS: &[&str] = &[
    "LIVE_SSH_HOST",
    "LIVE_DB_NAME",
    "LIVE_DB_USER",
    "LIVE_DB_PASS",
    "DB_NAME",
    "DB_USER",
    "DB_HOST",
];

const MYSQLDUMP_FLAGS: &str = "--single-transaction --quick --lock-tables=false --no-tablespaces";

/// Where the XAMPP bundles install the client on developer machines.
const XAMPP_CLIENTS: &[&str] = &[
    r"C:\xampp\mysql\bin\mysql.exe",
    r"C:\XAMPP\mysql\bin\mysql.exe",
    r"D:\xampp\mysql\bin\mysql.exe",
    "/opt/lampp/bin/mysql",
    "/Applications/XAMPP/xamppfiles/bin/mysql",
];

#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Skip the interactive confirmation.
    pub assume_yes: bool,
    /// Keep the dump file after a successful import.
    pub keep_dump: bool,
    /// Directory for the dump file (defaults to the working directory).
    pub dump_dir: Option<PathBuf>,
    /// File name prefix (defaults to `DUMP_PREFIX` or the local DB name).
    pub dump_prefix: Option<String>,
}

#[derive(Clone)]
pub struct SyncSettings {
    pub ssh_user: String,
    pub ssh_host: String,
    pub ssh_pass: Option<String>,
    pub live_db: String,
    pub live_user: String,
    pub live_pass: String,
    pub local_db: String,
    pub local_user: String,
    pub local_pass: Option<String>,
    pub local_host: String,
    pub local_port: u16,
}

impl std::fmt::Debug for SyncSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSettings")
            .field("ssh", &format!("{}@{}", self.ssh_user, self.ssh_host))
            .field("live_db", &self.live_db)
            .field("local_db", &self.local_db)
            .field("local_host", &self.local_host)
            .finish_non_exhaustive()
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self> {
        env_util::preflight_check(
            "sync_db_from_live",
            REQUIRED_KEYS,
            &["LIVE_SSH_PASS", "DB_PASSWORD", "DB_PORT"],
        )?;
        let (ssh_user, ssh_host) = split_ssh_target(&env_util::env_req("LIVE_SSH_HOST")?)?;
        Ok(Self {
            ssh_user,
            ssh_host,
            ssh_pass: env_util::env_opt("LIVE_SSH_PASS").filter(|p| !p.is_empty()),
            live_db: env_util::env_req("LIVE_DB_NAME")?,
            live_user: env_util::env_req("LIVE_DB_USER")?,
            live_pass: env_util::env_req("LIVE_DB_PASS")?,
            local_db: env_util::env_req("DB_NAME")?,
            local_user: env_util::env_req("DB_USER")?,
            local_pass: env_util::env_opt("DB_PASSWORD"),
            local_host: env_util::env_req("DB_HOST")?,
            local_port: env_util::env_parse("DB_PORT", 3306u16),
        })
    }
}

/// `user@host` → (user, host).
pub fn split_ssh_target(raw: &str) -> Result<(String, String)> {
    match raw.trim().split_once('@') {
        Some((user, host)) if !user.is_empty() && !host.is_empty() && !host.contains('@') => {
            Ok((user.to_string(), host.to_string()))
        }
        _ => bail!("invalid LIVE_SSH_HOST {raw:?}; expected user@hostname"),
    }
}

/// POSIX single-quote a word for the remote shell.
pub fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r#"'\''"#))
}

/// The command line run on the live host. The password travels in `MYSQL_PWD`
/// so it never shows up in the remote process list as an argument.
pub fn remote_dump_command(s: &SyncSettings) -> String {
    format!(
        "MYSQL_PWD={} mysqldump -u {} {} {MYSQLDUMP_FLAGS}",
        shell_quote(&s.live_pass),
        shell_quote(&s.live_user),
        shell_quote(&s.live_db),
    )
}

pub fn dump_file_name(prefix: &str, at: NaiveDateTime) -> String {
    format!("{prefix}_live_backup_{}.sql", at.format("%Y%m%d_%H%M%S"))
}

/// Database names end up inside DDL, so only plain identifiers are accepted.
pub fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} TB")
}

/// `MYSQL_BIN_DIR/mysql`, then the XAMPP locations, then `mysql` on PATH.
pub fn find_mysql_client() -> PathBuf {
    if let Some(dir) = env_util::env_opt("MYSQL_BIN_DIR") {
        let exe = if cfg!(windows) { "mysql.exe" } else { "mysql" };
        return Path::new(&dir).join(exe);
    }
    XAMPP_CLIENTS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .unwrap_or_else(|| PathBuf::from("mysql"))
}

fn confirm(s: &SyncSettings) -> Result<bool> {
    println!("WARNING: this will REPLACE your local database!");
    println!("Live DB: {} @ {}", s.live_db, s.ssh_host);
    println!("Local DB: {} @ {}", s.local_db, s.local_host);
    print!("\nContinue? (yes/no): ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "yes" | "y"))
}

pub async fn run(cfg: SyncConfig) -> Result<()> {
    let settings = SyncSettings::from_env()?;
    for name in [&settings.local_db, &settings.live_db] {
        if !is_plain_identifier(name) {
            bail!("refusing to use database name {name:?}");
        }
    }

    if !cfg.assume_yes && !confirm(&settings)? {
        println!("cancelled.");
        return Ok(());
    }

    let prefix = cfg
        .dump_prefix
        .or_else(|| env_util::env_opt("DUMP_PREFIX"))
        .unwrap_or_else(|| settings.local_db.clone());
    let dump_path = cfg
        .dump_dir
        .unwrap_or_else(|| PathBuf::from("."))
        .join(dump_file_name(&prefix, Local::now().naive_local()));

    println!("\nexporting database from live server...");
    if let Err(err) = export_live(&settings, &dump_path).await {
        let _ = fs::remove_file(&dump_path);
        return Err(err);
    }
    let size = fs::metadata(&dump_path).map(|m| m.len()).unwrap_or(0);
    println!("  exported {} ({})", dump_path.display(), human_size(size));

    let client = find_mysql_client();
    let imported = async {
        println!("\nrecreating local database...");
        recreate_local(&client, &settings).await?;
        println!("\nimporting dump...");
        import_dump(&client, &settings, &dump_path).await
    }
    .await;
    if let Err(err) = imported {
        let _ = fs::remove_file(&dump_path);
        return Err(err);
    }

    println!("\nverifying import...");
    let dsn = env_util::compose_mysql_dsn(
        &settings.local_host,
        settings.local_port,
        &settings.local_user,
        settings.local_pass.as_deref(),
        &settings.local_db,
    )
    .ok_or_else(|| anyhow!("cannot build local DSN"))?;
    let db = Db::connect(&dsn, 1).await?;
    let tables = db.table_count().await?;
    println!("  tables imported: {tables}");

    if cfg.keep_dump {
        println!("\nkeeping dump at {}", dump_path.display());
    } else {
        fs::remove_file(&dump_path)
            .with_context(|| format!("removing {}", dump_path.display()))?;
        println!("\ntemporary dump removed");
    }
    info!(target = "sync", tables, db = %settings.local_db, "sync completed");
    Ok(())
}

/// `ssh user@host <mysqldump ...>`, wrapped in `sshpass -e` when a password is
/// set. Without one, ssh falls back to key or agent auth.
fn ssh_command(s: &SyncSettings) -> Command {
    let mut cmd = match &s.ssh_pass {
        Some(pass) => {
            let mut c = Command::new("sshpass");
            c.arg("-e").arg("ssh").env("SSHPASS", pass);
            c
        }
        None => Command::new("ssh"),
    };
    cmd.args(["-o", "StrictHostKeyChecking=accept-new", "-o", "ConnectTimeout=30"])
        .arg(format!("{}@{}", s.ssh_user, s.ssh_host))
        .arg(remote_dump_command(s));
    cmd
}

async fn export_live(s: &SyncSettings, dump_path: &Path) -> Result<()> {
    let out = File::create(dump_path).with_context(|| format!("creating {}", dump_path.display()))?;
    let mut cmd = ssh_command(s);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(out))
        .stderr(Stdio::piped());

    info!(target = "sync", host = %s.ssh_host, db = %s.live_db, "running remote mysqldump");
    let output = cmd
        .spawn()
        .context("failed to start ssh (is sshpass/ssh installed?)")?
        .wait_with_output()
        .await?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        bail!("remote export failed ({}): {}", output.status, stderr.trim());
    }
    if stderr.to_lowercase().contains("error") {
        bail!("mysqldump error: {}", stderr.trim());
    }
    if !stderr.trim().is_empty() {
        warn!(target = "sync", stderr = %stderr.trim(), "mysqldump wrote to stderr");
    }
    let size = fs::metadata(dump_path)?.len();
    if size == 0 {
        bail!("export failed: dump file is empty");
    }
    Ok(())
}

fn local_client(client: &Path, s: &SyncSettings) -> Command {
    let mut cmd = Command::new(client);
    cmd.arg("-u")
        .arg(&s.local_user)
        .arg("-h")
        .arg(&s.local_host)
        .arg("-P")
        .arg(s.local_port.to_string());
    if let Some(pass) = s.local_pass.as_deref().filter(|p| !p.is_empty()) {
        cmd.env("MYSQL_PWD", pass);
    }
    cmd
}

async fn recreate_local(client: &Path, s: &SyncSettings) -> Result<()> {
    let ddl = format!(
        "DROP DATABASE IF EXISTS `{db}`; CREATE DATABASE `{db}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci;",
        db = s.local_db
    );
    let status = local_client(client, s)
        .arg("-e")
        .arg(ddl)
        .status()
        .await
        .with_context(|| format!("failed to run {}", client.display()))?;
    if !status.success() {
        bail!("failed to prepare local database ({status})");
    }
    Ok(())
}

async fn import_dump(client: &Path, s: &SyncSettings, dump_path: &Path) -> Result<()> {
    let input = File::open(dump_path)?;
    let status = local_client(client, s)
        .arg(&s.local_db)
        .stdin(Stdio::from(input))
        .status()
        .await
        .with_context(|| format!("failed to run {}", client.display()))?;
    if !status.success() {
        bail!("failed to import database ({status})");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn settings() -> SyncSettings {
        SyncSettings {
            ssh_user: "deploy".into(),
            ssh_host: "shop.example.com".into(),
            ssh_pass: Some("ssh-secret".into()),
            live_db: "store".into(),
            live_user: "store_ro".into(),
            live_pass: "it's secret".into(),
            local_db: "store_local".into(),
            local_user: "root".into(),
            local_pass: None,
            local_host: "127.0.0.1".into(),
            local_port: 3306,
        }
    }

    #[test]
    fn splits_ssh_target() {
        assert_eq!(
            split_ssh_target("deploy@shop.example.com").unwrap(),
            ("deploy".to_string(), "shop.example.com".to_string())
        );
        assert!(split_ssh_target("shop.example.com").is_err());
        assert!(split_ssh_target("@host").is_err());
        assert!(split_ssh_target("a@b@c").is_err());
    }

    #[test]
    fn quotes_for_posix_shell() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r#"'it'\''s'"#);
    }

    #[test]
    fn remote_command_passes_password_via_env() {
        let cmd = remote_dump_command(&settings());
        assert!(cmd.starts_with(r#"MYSQL_PWD='it'\''s secret' mysqldump -u 'store_ro' 'store'"#));
        assert!(cmd.ends_with("--single-transaction --quick --lock-tables=false --no-tablespaces"));
        assert!(!cmd.contains("-p"));
    }

    #[test]
    fn dump_name_is_timestamped() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap();
        assert_eq!(dump_file_name("shop", at), "shop_live_backup_20240309_140507.sql");
    }

    #[test]
    fn identifier_check_rejects_injection() {
        assert!(is_plain_identifier("modfy_store"));
        assert!(!is_plain_identifier("store`; DROP DATABASE x; --"));
        assert!(!is_plain_identifier(""));
    }

    #[test]
    fn human_size_scales_units() {
        assert_eq!(human_size(512), "512.00 B");
        assert_eq!(human_size(2048), "2.00 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.00 MB");
    }

    fn program_and_args(cmd: &Command) -> (String, Vec<String>) {
        let std_cmd = cmd.as_std();
        (
            std_cmd.get_program().to_string_lossy().into_owned(),
            std_cmd
                .get_args()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
        )
    }

    #[test]
    fn ssh_password_is_optional() {
        assert!(!REQUIRED_KEYS.contains(&"LIVE_SSH_PASS"));

        let (program, args) = program_and_args(&ssh_command(&settings()));
        assert_eq!(program, "sshpass");
        assert_eq!(&args[..2], ["-e", "ssh"]);
        assert!(!args.iter().any(|a| a.contains("ssh-secret")));

        let key_auth = SyncSettings {
            ssh_pass: None,
            ..settings()
        };
        let (program, args) = program_and_args(&ssh_command(&key_auth));
        assert_eq!(program, "ssh");
        assert!(args.contains(&"deploy@shop.example.com".to_string()));
        assert!(args.last().unwrap().contains("mysqldump"));
    }

    #[test]
    fn debug_output_hides_passwords() {
        let dbg = format!("{:?}", settings());
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("deploy@shop.example.com"));
    }
}
