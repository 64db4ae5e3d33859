use std::collections::HashMap;
use std::{env, fs, path::Path};

use catalog_upkeep::cli::sync_db::REQUIRED_KEYS as SYNC_KEYS;
use catalog_upkeep::util::env::{parse_env_file, redact_value};

fn is_mysql_dsn(v: &str) -> bool {
    v.starts_with("mysql://") || v.starts_with("mariadb://")
}

fn main() {
    catalog_upkeep::util::env::init_env();
    // Optional arg: path to .env (default ".env")
    let path = env::args().nth(1).unwrap_or_else(|| ".env".to_string());
    if !Path::new(&path).exists() {
        eprintln!("No .env found at {}", path);
        std::process::exit(2);
    }
    let contents = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read {}: {}", path, e);
            std::process::exit(2);
        }
    };

    let mut first_seen: HashMap<String, (usize, String)> = HashMap::new();
    let mut duplicates = Vec::new();
    for entry in parse_env_file(&contents) {
        match first_seen.get(&entry.key) {
            Some((first_line, first_val)) => duplicates.push((
                entry.key.clone(),
                *first_line,
                first_val.clone(),
                entry.line,
                entry.value,
            )),
            None => {
                first_seen.insert(entry.key, (entry.line, entry.value));
            }
        }
    }
    let get = |k: &str| first_seen.get(k).filter(|(_, v)| !v.is_empty());

    let mut has_errors = false;

    // 1) Duplicates
    if !duplicates.is_empty() {
        println!("[WARN] Duplicate keys found (dotenv is first-value-wins; later values are ignored):");
        for (key, l1, v1, l2, v2) in &duplicates {
            let conflict = if v1 == v2 { "same" } else { "different" };
            println!(
                "  - {}: line {}='{}' vs line {}='{}' ({} values)",
                key,
                l1,
                redact_value(key, v1),
                l2,
                redact_value(key, v2),
                conflict
            );
        }
    }

    // 2) Local database: DATABASE_URL wins, else DB_USER + DB_NAME (+ DB_HOST/DB_PORT)
    match get("DATABASE_URL") {
        Some((line, val)) if is_mysql_dsn(val) => {
            println!("[OK] Using DATABASE_URL from line {}", line);
            if get("DB_NAME").is_some() {
                println!("[INFO] DB_* variables are also set; DATABASE_URL takes priority.");
            }
        }
        Some((line, val)) => {
            eprintln!(
                "[ERROR] DATABASE_URL at line {} is not a MySQL DSN (expected mysql://…): '{}'",
                line,
                redact_value("DATABASE_URL", val)
            );
            has_errors = true;
        }
        None => {
            let missing: Vec<&str> = ["DB_USER", "DB_NAME"]
                .into_iter()
                .filter(|k| get(k).is_none())
                .collect();
            if missing.is_empty() {
                println!("[OK] Using DB_HOST/DB_USER/DB_NAME");
                if get("DB_HOST").is_none() {
                    println!("[INFO] DB_HOST unset; defaulting to localhost.");
                }
            } else {
                eprintln!(
                    "[ERROR] No database configured: set DATABASE_URL or {:?}",
                    missing
                );
                has_errors = true;
            }
        }
    }

    // 3) Numeric knobs
    for key in ["DB_PORT", "DB_MAX_CONNS", "MAX_DIMENSION", "JPEG_QUALITY"] {
        if let Some((line, val)) = get(key) {
            if val.parse::<u32>().is_err() {
                eprintln!("[ERROR] {} at line {} is not a number: '{}'", key, line, val);
                has_errors = true;
            }
        }
    }

    // 4) Rules file
    if let Some((line, val)) = get("CATALOG_RULES") {
        if Path::new(val).is_file() {
            println!("[OK] CATALOG_RULES points at {}", val);
        } else {
            eprintln!("[ERROR] CATALOG_RULES at line {} does not exist: '{}'", line, val);
            has_errors = true;
        }
    }

    // 5) Live sync (informational: only needed for sync-from-live)
    let sync_missing: Vec<&str> = SYNC_KEYS.iter().copied().filter(|k| get(k).is_none()).collect();
    if sync_missing.is_empty() {
        match get("LIVE_SSH_HOST") {
            Some((line, val)) if !val.contains('@') => {
                eprintln!("[ERROR] LIVE_SSH_HOST at line {} must be user@hostname", line);
                has_errors = true;
            }
            _ => println!("[OK] Live sync configured"),
        }
    } else {
        println!("[INFO] Live sync disabled; missing {:?}", sync_missing);
    }

    if has_errors {
        println!("Validation: FAIL");
        std::process::exit(1);
    } else {
        println!("Validation: PASS");
        std::process::exit(0);
    }
}
