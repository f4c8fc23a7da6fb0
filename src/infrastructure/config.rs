use crate::domain::models::SyncMode;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::firestore_client::{FirestoreConfig, DEFAULT_DATABASE_ID};
use crate::infrastructure::identity_client::IdentityConfig;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const DEFAULT_APP_NAME: &str = "Todo";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_SERVER_PORT: u16 = 5_000;
const DEFAULT_RETRY_MAX_ATTEMPTS: u8 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub app_name: String,
    pub sync_mode: SyncMode,
    pub poll_interval_ms: u64,
    pub server_port: u16,
    pub retry: RetrySettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            sync_mode: SyncMode::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            server_port: DEFAULT_SERVER_PORT,
            retry: RetrySettings {
                max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
                base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            },
        }
    }
}

fn default_app_json() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "appName": DEFAULT_APP_NAME,
        "syncMode": SyncMode::default().as_str(),
        "pollIntervalMs": DEFAULT_POLL_INTERVAL_MS,
        "server": {
            "port": DEFAULT_SERVER_PORT
        },
        "retry": {
            "maxAttempts": DEFAULT_RETRY_MAX_ATTEMPTS,
            "baseDelayMs": DEFAULT_RETRY_BASE_DELAY_MS
        }
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_json())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let app = read_config(&path)?;
    parse_app_config(&app).map_err(|message| {
        InfraError::InvalidConfig(format!("{message} in {}", path.display()))
    })
}

fn parse_app_config(app: &serde_json::Value) -> Result<AppConfig, String> {
    let defaults = AppConfig::default();

    let app_name = app
        .get("appName")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or(defaults.app_name);

    let sync_mode = match app.get("syncMode").and_then(serde_json::Value::as_str) {
        None => defaults.sync_mode,
        Some(raw) => SyncMode::parse(raw).ok_or_else(|| format!("unknown syncMode '{raw}'"))?,
    };

    let poll_interval_ms = app
        .get("pollIntervalMs")
        .and_then(serde_json::Value::as_u64)
        .filter(|value| *value > 0)
        .unwrap_or(defaults.poll_interval_ms);

    let server_port = match app.pointer("/server/port").and_then(serde_json::Value::as_u64) {
        None => defaults.server_port,
        Some(port) => u16::try_from(port).map_err(|_| format!("server.port {port} out of range"))?,
    };

    let max_attempts = app
        .pointer("/retry/maxAttempts")
        .and_then(serde_json::Value::as_u64)
        .map(|value| value.clamp(1, u64::from(u8::MAX)) as u8)
        .unwrap_or(defaults.retry.max_attempts);
    let base_delay_ms = app
        .pointer("/retry/baseDelayMs")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(defaults.retry.base_delay_ms);

    Ok(AppConfig {
        app_name,
        sync_mode,
        poll_interval_ms,
        server_port,
        retry: RetrySettings {
            max_attempts,
            base_delay_ms,
        },
    })
}

/// Project settings for the hosted identity provider and document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
    pub database_id: String,
    pub auth_domain: Option<String>,
    pub admin_token: Option<String>,
    pub firestore_emulator_host: Option<String>,
    pub auth_emulator_host: Option<String>,
}

impl FirebaseConfig {
    pub fn firestore(&self) -> FirestoreConfig {
        let mut config = FirestoreConfig::new(&self.project_id, &self.api_key);
        config.database_id = self.database_id.clone();
        if let Some(host) = self.firestore_emulator_host.as_deref() {
            config.api_base = format!("http://{host}/v1/");
        }
        config
    }

    pub fn identity(&self) -> IdentityConfig {
        let mut config = IdentityConfig::new(&self.api_key);
        if let Some(host) = self.auth_emulator_host.as_deref() {
            config.identity_base = format!("http://{host}/identitytoolkit.googleapis.com/v1/");
            config.token_base = format!("http://{host}/securetoken.googleapis.com/v1/");
        }
        config
    }
}

pub fn load_firebase_config_from_env() -> Result<FirebaseConfig, InfraError> {
    load_firebase_config_from_lookup(|key| std::env::var(key).ok())
}

pub fn load_firebase_config_from_lookup<F>(lookup: F) -> Result<FirebaseConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = required_lookup_value(
        &lookup,
        &["TODO_FIREBASE_API_KEY", "FIREBASE_API_KEY", "VITE_FIREBASE_API_KEY"],
        "firebase api key",
    )?;
    let project_id = required_lookup_value(
        &lookup,
        &[
            "TODO_FIREBASE_PROJECT_ID",
            "FIREBASE_PROJECT_ID",
            "VITE_FIREBASE_PROJECT_ID",
        ],
        "firebase project id",
    )?;
    let database_id = optional_lookup_value(&lookup, &["TODO_FIREBASE_DATABASE_ID"])
        .unwrap_or_else(|| DEFAULT_DATABASE_ID.to_string());
    let auth_domain = optional_lookup_value(
        &lookup,
        &["TODO_FIREBASE_AUTH_DOMAIN", "VITE_FIREBASE_AUTH_DOMAIN"],
    );
    let admin_token = optional_lookup_value(&lookup, &["TODO_FIREBASE_ADMIN_TOKEN"]);
    let firestore_emulator_host = optional_lookup_value(&lookup, &["FIRESTORE_EMULATOR_HOST"]);
    let auth_emulator_host = optional_lookup_value(&lookup, &["FIREBASE_AUTH_EMULATOR_HOST"]);

    Ok(FirebaseConfig {
        api_key,
        project_id,
        database_id,
        auth_domain,
        admin_token,
        firestore_emulator_host,
        auth_emulator_host,
    })
}

fn required_lookup_value<F>(
    lookup: &F,
    keys: &[&str],
    field_name: &str,
) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_lookup_value(lookup, keys).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "missing {} (set one of: {})",
            field_name,
            keys.join(", ")
        ))
    })
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new(label: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "todo-sync-config-{label}-{}-{}",
                std::process::id(),
                chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
            ));
            fs::create_dir_all(&path).expect("create temp config dir");
            Self { path }
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn default_app_config_is_written_and_loaded() {
        let dir = TempConfigDir::new("defaults");
        ensure_default_configs(&dir.path).expect("write defaults");
        let loaded = load_app_config(&dir.path).expect("load");
        assert_eq!(loaded, AppConfig::default());
        assert_eq!(loaded.server_port, 5000);
        assert_eq!(loaded.retry.max_attempts, 3);
    }

    #[test]
    fn existing_app_config_is_not_overwritten() {
        let dir = TempConfigDir::new("existing");
        fs::write(
            dir.path.join(APP_JSON),
            r#"{"schema":1,"appName":"Mine","syncMode":"confirmed","server":{"port":8080}}"#,
        )
        .expect("write config");
        ensure_default_configs(&dir.path).expect("ensure");

        let loaded = load_app_config(&dir.path).expect("load");
        assert_eq!(loaded.app_name, "Mine");
        assert_eq!(loaded.sync_mode, SyncMode::Confirmed);
        assert_eq!(loaded.server_port, 8080);
        assert_eq!(loaded.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = TempConfigDir::new("schema");
        fs::write(dir.path.join(APP_JSON), r#"{"schema":2}"#).expect("write config");
        assert!(matches!(
            load_app_config(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unknown_sync_mode_is_rejected() {
        let app = serde_json::json!({"schema": 1, "syncMode": "eventual"});
        assert!(parse_app_config(&app).is_err());
    }

    #[test]
    fn firebase_config_prefers_first_non_empty_key() {
        let config = load_firebase_config_from_lookup(|key| match key {
            "TODO_FIREBASE_API_KEY" => Some("  ".to_string()),
            "FIREBASE_API_KEY" => Some("api-key".to_string()),
            "VITE_FIREBASE_PROJECT_ID" => Some("demo-project".to_string()),
            _ => None,
        })
        .expect("config");

        assert_eq!(config.api_key, "api-key");
        assert_eq!(config.project_id, "demo-project");
        assert_eq!(config.database_id, DEFAULT_DATABASE_ID);
        assert_eq!(config.admin_token, None);
    }

    #[test]
    fn firebase_config_requires_api_key() {
        let result = load_firebase_config_from_lookup(|key| match key {
            "FIREBASE_PROJECT_ID" => Some("demo-project".to_string()),
            _ => None,
        });
        let Err(InfraError::InvalidConfig(message)) = result else {
            panic!("expected invalid config");
        };
        assert!(message.contains("firebase api key"));
        assert!(message.contains("TODO_FIREBASE_API_KEY"));
    }

    #[test]
    fn emulator_hosts_rewrite_api_bases() {
        let config = load_firebase_config_from_lookup(|key| match key {
            "FIREBASE_API_KEY" => Some("api-key".to_string()),
            "FIREBASE_PROJECT_ID" => Some("demo-project".to_string()),
            "FIRESTORE_EMULATOR_HOST" => Some("localhost:8080".to_string()),
            "FIREBASE_AUTH_EMULATOR_HOST" => Some("localhost:9099".to_string()),
            _ => None,
        })
        .expect("config");

        assert_eq!(config.firestore().api_base, "http://localhost:8080/v1/");
        assert_eq!(
            config.identity().identity_base,
            "http://localhost:9099/identitytoolkit.googleapis.com/v1/"
        );
    }
}
