//! Brain configuration.
//!
//! Defaults match the historical brobbot SQLite brain. Every field can be
//! overridden from the environment with [`BrainConfig::from_env`].

use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{StoreError, StoreResult};
use crate::sequencer::FailurePolicy;

/// Environment variable for the key namespace prefix.
pub const ENV_PREFIX: &str = "BROBBOT_SQLITE_DATA_PREFIX";
/// Environment variable for the database file name.
pub const ENV_DB_NAME: &str = "BROBBOT_SQLITE_DB_NAME";
/// Environment variable for the table name.
pub const ENV_TABLE_NAME: &str = "BROBBOT_SQLITE_TABLE_NAME";
/// Environment variable selecting the MessagePack codec.
pub const ENV_USE_MSGPACK: &str = "BROBBOT_SQLITE_USE_MSGPACK";
/// Environment variable selecting rollback instead of commit on unit failure.
pub const ENV_ROLLBACK_ON_FAILURE: &str = "BROBBOT_SQLITE_ROLLBACK_ON_FAILURE";

/// Settings for one brain instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    /// Namespace prepended to every data key (`"<prefix>:<key>"`).
    pub prefix: String,
    /// Database file. `:memory:` opens a private in-memory database.
    pub db_name: String,
    /// Name of the single backing table.
    pub table_name: String,
    /// `true` for MessagePack values, `false` for JSON text.
    ///
    /// Must not change for an existing database: the two encodings cannot
    /// be told apart on read.
    pub use_msgpack: bool,
    /// What the sequencer does with an open transaction after a unit fails.
    pub failure_policy: FailurePolicy,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            prefix: "data".into(),
            db_name: "brobbot".into(),
            table_name: "brobbot".into(),
            use_msgpack: true,
            failure_policy: FailurePolicy::Commit,
        }
    }
}

impl BrainConfig {
    /// Build a configuration from the process environment.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Unset variables keep their defaults; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> StoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(prefix) = get(ENV_PREFIX) {
            config.prefix = prefix;
        }
        if let Some(db_name) = get(ENV_DB_NAME) {
            config.db_name = db_name;
        }
        if let Some(table_name) = get(ENV_TABLE_NAME) {
            config.table_name = table_name;
        }
        if let Some(flag) = get(ENV_USE_MSGPACK) {
            config.use_msgpack = parse_flag(ENV_USE_MSGPACK, &flag)?;
        }
        if let Some(flag) = get(ENV_ROLLBACK_ON_FAILURE)
            && parse_flag(ENV_ROLLBACK_ON_FAILURE, &flag)?
        {
            config.failure_policy = FailurePolicy::Rollback;
        }

        config.validate()?;
        Ok(config)
    }

    /// An in-memory configuration with the given codec, for tests and tools.
    pub fn in_memory(use_msgpack: bool) -> Self {
        Self {
            db_name: ":memory:".into(),
            use_msgpack,
            ..Self::default()
        }
    }

    /// Check the values that end up interpolated into SQL.
    pub fn validate(&self) -> StoreResult<()> {
        validate_identifier(&self.table_name)?;
        if self.db_name.is_empty() {
            return Err(StoreError::InvalidArgument(
                "database name must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// The value codec selected by [`BrainConfig::use_msgpack`].
    pub fn codec(&self) -> Codec {
        Codec::from_flag(self.use_msgpack)
    }
}

/// Accept only `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn validate_identifier(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidArgument(format!(
            "invalid table name: {name:?}"
        )))
    }
}

fn parse_flag(name: &str, raw: &str) -> StoreResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(StoreError::InvalidArgument(format!(
            "{name} must be a boolean, got {other:?}"
        ))),
    }
}

// ── tests ────────────────────────────────────────────────────────────
