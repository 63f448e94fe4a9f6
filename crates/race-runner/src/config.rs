use anyhow::{anyhow, Context, Result};
use race_core::{FieldNames, FlagChoice, HarnessError};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: &str = "race_config_v1";

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub trials: usize,
    pub op_timeout: Duration,
    pub fields: FieldNames,
    pub flag: FlagChoice,
    pub seed: Option<u64>,
    pub client_ids: [String; 2],
    pub database: String,
    pub collection: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            trials: 100,
            op_timeout: Duration::from_secs(10),
            fields: FieldNames::default(),
            flag: FlagChoice::Fixed(false),
            seed: None,
            client_ids: ["Test1".to_string(), "Test2".to_string()],
            database: "testdb".to_string(),
            collection: "users".to_string(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), HarnessError> {
        let invalid = |msg: String| -> Result<(), HarnessError> {
            Err(HarnessError::InvalidConfig(msg))
        };
        if self.trials == 0 {
            return invalid("trials must be at least 1".to_string());
        }
        if self.op_timeout.is_zero() {
            return invalid("operation timeout must be greater than zero".to_string());
        }
        let [a, b] = &self.client_ids;
        if a.trim().is_empty() || b.trim().is_empty() {
            return invalid("client ids cannot be empty".to_string());
        }
        if a == b {
            return invalid(format!("client ids must differ (both are {})", a));
        }
        if self.database.trim().is_empty() || self.collection.trim().is_empty() {
            return invalid("database and collection names cannot be empty".to_string());
        }
        self.fields.validate().map_err(HarnessError::InvalidConfig)
    }

    fn apply_file(&mut self, file: ConfigFile) -> Result<()> {
        if let Some(trials) = file.trials {
            self.trials = trials;
        }
        if let Some(ms) = file.op_timeout_ms {
            self.op_timeout = Duration::from_millis(ms);
        }
        if let Some(flag) = file.flag_field {
            self.fields.flag = flag;
        }
        if let Some(set) = file.set_field {
            self.fields.set = set;
        }
        if let Some(unset) = file.unset_field {
            self.fields.unset = unset;
        }
        if let Some(value) = file.flag_value {
            self.flag = match value {
                FlagValue::Fixed(v) => FlagChoice::Fixed(v),
                FlagValue::Named(name) if name == "random" => FlagChoice::Random,
                FlagValue::Named(name) => {
                    return Err(anyhow!(
                        "flag_value must be true, false or \"random\" (got \"{}\")",
                        name
                    ))
                }
            };
        }
        if file.seed.is_some() {
            self.seed = file.seed;
        }
        if let Some(ids) = file.client_ids {
            self.client_ids = ids;
        }
        if let Some(db) = file.database {
            self.database = db;
        }
        if let Some(coll) = file.collection {
            self.collection = coll;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlagValue {
    Fixed(bool),
    Named(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    schema_version: String,
    #[serde(default)]
    trials: Option<usize>,
    #[serde(default)]
    op_timeout_ms: Option<u64>,
    #[serde(default)]
    flag_field: Option<String>,
    #[serde(default)]
    set_field: Option<String>,
    #[serde(default)]
    unset_field: Option<String>,
    #[serde(default)]
    flag_value: Option<FlagValue>,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    client_ids: Option<[String; 2]>,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    collection: Option<String>,
}

pub fn load_config(path: &Path) -> Result<RunConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&data).with_context(|| format!("invalid config {}", path.display()))
}

pub fn parse_config(data: &str) -> Result<RunConfig> {
    let file: ConfigFile = serde_json::from_str(data)?;
    if file.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version: {}",
            file.schema_version
        ));
    }
    let mut config = RunConfig::default();
    config.apply_file(file)?;
    Ok(config)
}
