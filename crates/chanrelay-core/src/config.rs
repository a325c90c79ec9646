use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration for the relay, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub main_admin_id: i64,
    pub control_group_id: i64,

    // State files
    pub admin_file: PathBuf,
    pub replacement_file: PathBuf,
    pub settings_file: PathBuf,
    pub message_map_file: PathBuf,

    // Rule hot reload (`None` disables the watcher)
    pub rules_reload_interval: Option<Duration>,

    // Outbound throttling
    pub throttle_global_interval: Duration,
    pub throttle_per_chat_interval: Duration,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let main_admin_id = required_i64("MAIN_ADMIN_ID")?;
        let control_group_id = required_i64("CONTROL_GROUP_ID")?;

        let admin_file = env_path("ADMIN_FILE").unwrap_or_else(|| PathBuf::from("admins.json"));
        let replacement_file =
            env_path("REPLACEMENT_FILE").unwrap_or_else(|| PathBuf::from("replacements.json"));
        let settings_file =
            env_path("SETTINGS_FILE").unwrap_or_else(|| PathBuf::from("settings.json"));
        let message_map_file =
            env_path("MESSAGE_MAP_FILE").unwrap_or_else(|| PathBuf::from("message_map.json"));

        let rules_reload_interval = match env_u64("RULES_RELOAD_INTERVAL_MS").unwrap_or(2_000) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        let throttle_global_interval =
            Duration::from_millis(env_u64("THROTTLE_GLOBAL_MS").unwrap_or(40));
        let throttle_per_chat_interval =
            Duration::from_millis(env_u64("THROTTLE_PER_CHAT_MS").unwrap_or(1050));

        let audit_log_path = env_path("AUDIT_LOG_PATH")
            .unwrap_or_else(|| PathBuf::from("chanrelay-audit.log"));
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            main_admin_id,
            control_group_id,
            admin_file,
            replacement_file,
            settings_file,
            message_map_file,
            rules_reload_interval,
            throttle_global_interval,
            throttle_per_chat_interval,
            audit_log_path,
            audit_log_json,
        })
    }
}

fn required_i64(key: &str) -> Result<i64> {
    let Some(raw) = env_str(key).and_then(non_empty) else {
        return Err(Error::Config(format!(
            "{key} environment variable is required"
        )));
    };
    match raw.trim().parse::<i64>() {
        Ok(0) => Err(Error::Config(format!("{key} must be non-zero"))),
        Ok(v) => Ok(v),
        Err(_) => Err(Error::Config(format!("{key} must be an integer, got {raw:?}"))),
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_parsing_strips_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# comment\nTELEGRAM_BOT_TOKEN=\"abc:123\"\n\nMAIN_ADMIN_ID = 42\nbroken line\n=nokey\nX='y'\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TELEGRAM_BOT_TOKEN".to_string(), "abc:123".to_string()),
                ("MAIN_ADMIN_ID".to_string(), "42".to_string()),
                ("X".to_string(), "y".to_string()),
            ]
        );
    }

    #[test]
    fn required_i64_rejects_zero_and_garbage() {
        let key = format!("CHANRELAY_TEST_ID_{}", std::process::id());

        env::set_var(&key, "0");
        assert!(required_i64(&key).is_err());

        env::set_var(&key, "abc");
        assert!(required_i64(&key).is_err());

        env::set_var(&key, " -100123 ");
        assert_eq!(required_i64(&key).unwrap(), -100123);

        env::remove_var(&key);
        assert!(required_i64(&key).is_err());
    }
}
