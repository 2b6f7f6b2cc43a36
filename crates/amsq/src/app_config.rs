//! 🔧 App Configuration — the sacred env-to-struct pipeline.
//!
//! 📡 "Shared secret not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the function app settings. Nothing." -- every on-call engineer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of self-harm.
//!
//! Layers, lowest to highest precedence:
//! 1. serde defaults
//! 2. raw env: `shared_secret`, `workspace_id`, `provider_version`, `provider_instance`, `queue_sleep_time`
//! 3. legacy raw env: `laws_shared_key` → `shared_secret`, `laws_workspace_id` → `workspace_id`
//! 4. `AMSQ_*` env, nested with `__` (`AMSQ_SOURCE__BLOB_URL`, `AMSQ_RUNTIME__QUEUE_PARALLELISM`, ...)
//! 5. an optional TOML file. TOML wins on conflicts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::backends::laws::DEFAULT_ENDPOINT_TEMPLATE;
use crate::error::ConfigError;

/// 🔑 The env names the deployed function app has always used.
const RAW_ENV_KEYS: [&str; 5] = [
    "shared_secret",
    "workspace_id",
    "provider_version",
    "provider_instance",
    "queue_sleep_time",
];
const LEGACY_ENV_KEYS: [&str; 2] = ["laws_shared_key", "laws_workspace_id"];

/// 📦 Everything the process needs to know about itself.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🔒 base64 shared key for the workspace. Required, but validated where the credentials get
    /// built so the error says exactly what's wrong with it.
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub shared_secret: Option<String>,
    #[serde(default = "default_workspace_id", deserialize_with = "string_or_number")]
    pub workspace_id: String,
    #[serde(default = "default_provider_version", deserialize_with = "string_or_number")]
    pub provider_version: String,
    #[serde(default = "default_provider_instance", deserialize_with = "string_or_number")]
    pub provider_instance: String,
    #[serde(default = "default_provider_metadata")]
    pub provider_metadata: Value,
    /// ⏱️ Target cycle length in seconds.
    #[serde(default = "default_queue_sleep_time")]
    pub queue_sleep_time: f64,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 📡 Where the snapshot comes from, and where it comes from when that fails.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_blob_url")]
    pub blob_url: String,
    #[serde(default = "default_fallback_path")]
    pub fallback_path: PathBuf,
    #[serde(default = "default_source_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            blob_url: default_blob_url(),
            fallback_path: default_fallback_path(),
            timeout_ms: default_source_timeout_ms(),
        }
    }
}

/// 🚰 Where the records go.
#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// 🌍 `{workspace_id}` and `{resource}` are substituted. Swap the host for sovereign clouds.
    #[serde(default = "default_endpoint_template")]
    pub endpoint_template: String,
    #[serde(default = "default_ingestion_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_log_type_prefix")]
    pub log_type_prefix: String,
    #[serde(default = "default_log_type_pool_size")]
    pub log_type_pool_size: usize,
    /// 🧪 Ship into an in-memory sink instead of the network. Records are still built and logged.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            endpoint_template: default_endpoint_template(),
            timeout_ms: default_ingestion_timeout_ms(),
            log_type_prefix: default_log_type_prefix(),
            log_type_pool_size: default_log_type_pool_size(),
            dry_run: false,
        }
    }
}

/// 🧵 How many cycles may run at once, and how many messages may wait in line.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_queue_parallelism")]
    pub queue_parallelism: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_parallelism: default_queue_parallelism(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_workspace_id() -> String {
    "659eaa28-9f7e-4176-958d-a37f0ca99754".to_string()
}

fn default_provider_version() -> String {
    "8.1".to_string()
}

fn default_provider_instance() -> String {
    "foobar".to_string()
}

fn default_provider_metadata() -> Value {
    Value::Object(Default::default())
}

fn default_queue_sleep_time() -> f64 {
    10.0
}

fn default_blob_url() -> String {
    "https://nitinagarwalscalete95b0.blob.core.windows.net/dummy-data-1/mock_data.json".to_string()
}

fn default_fallback_path() -> PathBuf {
    PathBuf::from("dummy_data/mock_data.json")
}

fn default_source_timeout_ms() -> u64 {
    2_000
}

fn default_endpoint_template() -> String {
    DEFAULT_ENDPOINT_TEMPLATE.to_string()
}

fn default_ingestion_timeout_ms() -> u64 {
    3_000
}

fn default_log_type_prefix() -> String {
    "Table".to_string()
}

fn default_log_type_pool_size() -> usize {
    10
}

fn default_queue_parallelism() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    16
}

// ===== Env values that only look like numbers =====

/// 🔢 Env values get sniffed: `provider_version=8.1` arrives as a float, not the string it is.
/// Take it either way and keep the text. Floats go through `{:?}` so `9.0` stays `9.0`.
struct StringOrNumber(String);

impl<'de> Deserialize<'de> for StringOrNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TextVisitor;

        impl Visitor<'_> for TextVisitor {
            type Value = StringOrNumber;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a string or a number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(StringOrNumber(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(StringOrNumber(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(StringOrNumber(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(StringOrNumber(v.to_string()))
            }

            fn visit_i128<E: de::Error>(self, v: i128) -> Result<Self::Value, E> {
                Ok(StringOrNumber(v.to_string()))
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> Result<Self::Value, E> {
                Ok(StringOrNumber(v.to_string()))
            }

            fn visit_f32<E: de::Error>(self, v: f32) -> Result<Self::Value, E> {
                Ok(StringOrNumber(format!("{v:?}")))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(StringOrNumber(format!("{v:?}")))
            }
        }

        deserializer.deserialize_any(TextVisitor)
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    StringOrNumber::deserialize(deserializer).map(|text| text.0)
}

fn optional_string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Option::<StringOrNumber>::deserialize(deserializer).map(|text| text.map(|text| text.0))
}

impl AppConfig {
    /// ⏱️ The pacing target, after making sure it's a duration and not a philosophy.
    pub fn target_interval(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.queue_sleep_time).map_err(|err| ConfigError::InvalidSetting {
            key: "queue_sleep_time",
            reason: format!("{} is not a usable number of seconds: {err}", self.queue_sleep_time),
        })
    }

    /// 🔍 Reject the knobs that would make the process do something silly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.target_interval()?;
        let positive = [
            ("ingestion.log_type_pool_size", self.ingestion.log_type_pool_size),
            ("runtime.queue_parallelism", self.runtime.queue_parallelism),
            ("runtime.queue_capacity", self.runtime.queue_capacity),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidSetting {
                    key,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// 🧩 The figment, before extraction. Split out so tests can poke at it.
pub fn figment(config_file_name: Option<&Path>) -> Figment {
    let legacy = Env::raw().only(&LEGACY_ENV_KEYS).map(|key| match key.as_str() {
        "laws_shared_key" => "shared_secret".into(),
        "laws_workspace_id" => "workspace_id".into(),
        other => other.into(),
    });

    let config = Figment::new()
        .merge(Env::raw().only(&RAW_ENV_KEYS))
        .merge(legacy)
        .merge(Env::prefixed("AMSQ_").split("__"));

    match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    }
}

/// 🚀 Load the config. Env first, TOML on top if you handed us a file.
///
/// 💀 Returns an error if anything is unparseable or out of range. The error says which layer to
/// go look at.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new("<env only>"))
    );

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables. \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables. \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = figment(config_file_name).extract().context(context_msg)?;
    app_config
        .validate()
        .context("💀 Configuration parsed, but some of it makes no sense")?;
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn the_one_where_nothing_is_set_and_defaults_show_up() {
        Jail::expect_with(|_jail| {
            let config: AppConfig = figment(None).extract()?;
            assert_eq!(config.shared_secret, None);
            assert_eq!(config.workspace_id, "659eaa28-9f7e-4176-958d-a37f0ca99754");
            assert_eq!(config.provider_version, "8.1");
            assert_eq!(config.queue_sleep_time, 10.0);
            assert_eq!(config.source.timeout_ms, 2_000);
            assert_eq!(config.ingestion.timeout_ms, 3_000);
            assert_eq!(config.ingestion.log_type_pool_size, 10);
            assert_eq!(config.runtime.queue_parallelism, 4);
            assert!(!config.ingestion.dry_run);
            Ok(())
        });
    }

    #[test]
    fn the_one_where_the_function_app_settings_are_read() {
        Jail::expect_with(|jail| {
            jail.set_env("shared_secret", "c2VjcmV0");
            jail.set_env("workspace_id", "ws-1");
            jail.set_env("provider_version", "9.0");
            jail.set_env("queue_sleep_time", "7.5");
            let config: AppConfig = figment(None).extract()?;
            assert_eq!(config.shared_secret.as_deref(), Some("c2VjcmV0"));
            assert_eq!(config.workspace_id, "ws-1");
            assert_eq!(config.provider_version, "9.0");
            assert_eq!(config.queue_sleep_time, 7.5);
            Ok(())
        });
    }

    #[test]
    fn the_one_where_numeric_looking_settings_stay_strings() {
        Jail::expect_with(|jail| {
            jail.set_env("provider_version", "8.1");
            jail.set_env("workspace_id", "12345");
            jail.set_env("provider_instance", "42");
            jail.set_env("shared_secret", "1234");
            let config: AppConfig = figment(None).extract()?;
            assert_eq!(config.provider_version, "8.1");
            assert_eq!(config.workspace_id, "12345");
            assert_eq!(config.provider_instance, "42");
            assert_eq!(config.shared_secret.as_deref(), Some("1234"));
            Ok(())
        });
    }

    #[test]
    fn the_one_where_the_legacy_names_still_answer() {
        Jail::expect_with(|jail| {
            jail.set_env("laws_shared_key", "bGVnYWN5");
            jail.set_env("laws_workspace_id", "ws-legacy");
            let config: AppConfig = figment(None).extract()?;
            assert_eq!(config.shared_secret.as_deref(), Some("bGVnYWN5"));
            assert_eq!(config.workspace_id, "ws-legacy");
            Ok(())
        });
    }

    #[test]
    fn the_one_where_prefixed_env_reaches_the_nested_knobs() {
        Jail::expect_with(|jail| {
            jail.set_env("AMSQ_SOURCE__TIMEOUT_MS", "500");
            jail.set_env("AMSQ_RUNTIME__QUEUE_PARALLELISM", "2");
            jail.set_env("AMSQ_INGESTION__DRY_RUN", "true");
            let config: AppConfig = figment(None).extract()?;
            assert_eq!(config.source.timeout_ms, 500);
            assert_eq!(config.runtime.queue_parallelism, 2);
            assert!(config.ingestion.dry_run);
            Ok(())
        });
    }

    #[test]
    fn the_one_where_the_toml_file_wins() {
        Jail::expect_with(|jail| {
            jail.set_env("workspace_id", "from-env");
            jail.create_file(
                "amsq.toml",
                r#"
                workspace_id = "from-toml"
                queue_sleep_time = 3

                [ingestion]
                endpoint_template = "https://{workspace_id}.ods.opinsights.azure.us{resource}?api-version=2016-04-01"
                log_type_prefix = "SapHana"
                log_type_pool_size = 4
                "#,
            )?;
            let config: AppConfig = figment(Some(Path::new("amsq.toml"))).extract()?;
            assert_eq!(config.workspace_id, "from-toml");
            assert_eq!(config.queue_sleep_time, 3.0);
            assert!(config.ingestion.endpoint_template.contains("azure.us"));
            assert_eq!(config.ingestion.log_type_prefix, "SapHana");
            assert_eq!(config.ingestion.log_type_pool_size, 4);
            Ok(())
        });
    }

    #[test]
    fn the_one_where_nonsense_knobs_are_refused() {
        Jail::expect_with(|jail| {
            jail.set_env("queue_sleep_time", "-1");
            jail.set_env("AMSQ_RUNTIME__QUEUE_PARALLELISM", "0");
            let config: AppConfig = figment(None).extract()?;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidSetting { key: "queue_sleep_time", .. })
            ));
            let mut fixed = config.clone();
            fixed.queue_sleep_time = 1.0;
            assert!(matches!(
                fixed.validate(),
                Err(ConfigError::InvalidSetting { key: "runtime.queue_parallelism", .. })
            ));
            Ok(())
        });
    }
}
