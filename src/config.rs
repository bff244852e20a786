use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;
use validator::Validate;

pub const DATABASE_URL: &str = "KEEPSAKE_DATABASE_URL";
pub const MAX_CONNECTIONS: &str = "KEEPSAKE_MAX_CONNECTIONS";
pub const PURGE_INTERVAL_SECS: &str = "KEEPSAKE_PURGE_INTERVAL_SECS";
pub const PURGE_AFTER: &str = "KEEPSAKE_PURGE_AFTER";

const DEFAULT_DATABASE_URL: &str = "postgresql://postgres:postgres@db/postgres";
const DEFAULT_MAX_CONNECTIONS: u32 = 50;
const DEFAULT_PURGE_INTERVAL_SECS: u64 = 3600;

lazy_static! {
    static ref RE_COLLECTION_NAME: Regex = Regex::new(r"^[a-z][-a-z0-9]*$").unwrap();
}

/// Deleted documents of `collection` are purged `days` after their deletion.
#[derive(Clone, Debug, PartialEq, Validate)]
pub struct RetentionRule {
    #[validate(length(min = 1, max = 32), regex(path = *RE_COLLECTION_NAME))]
    pub collection: String,
    #[validate(range(min = 1, max = 3650))]
    pub days: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub purge_interval: Duration,
    pub retention: Vec<RetentionRule>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from a variable lookup. Unset variables fall
    /// back to their defaults.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = var(DATABASE_URL).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let max_connections = match var(MAX_CONNECTIONS) {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("Cannot parse {MAX_CONNECTIONS}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        let purge_interval_secs: u64 = match var(PURGE_INTERVAL_SECS) {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("Cannot parse {PURGE_INTERVAL_SECS}"))?,
            None => DEFAULT_PURGE_INTERVAL_SECS,
        };
        if purge_interval_secs == 0 {
            bail!("{PURGE_INTERVAL_SECS} must be positive");
        }
        let retention = match var(PURGE_AFTER) {
            Some(v) => parse_retention_rules(&v)?,
            None => Vec::new(),
        };

        Ok(Self {
            database_url,
            max_connections,
            purge_interval: Duration::from_secs(purge_interval_secs),
            retention,
        })
    }
}

/// Parses `(collection,days),(collection,days)`. Blank input has no rules.
pub fn parse_retention_rules(value: &str) -> Result<Vec<RetentionRule>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Vec::new());
    }

    let items: Vec<&str> = value
        .strip_prefix('(')
        .ok_or_else(|| anyhow!("{PURGE_AFTER} must start with an opening parenthesis."))?
        .strip_suffix(')')
        .ok_or_else(|| anyhow!("{PURGE_AFTER} must end with a closing parenthesis."))?
        .split("),(")
        .collect();

    let mut rules = Vec::with_capacity(items.len());
    for s in items {
        debug!("Processing {s}");
        let p: Vec<&str> = s.split(',').collect();
        if p.len() != 2 {
            bail!("Invalid value {s} inside {PURGE_AFTER}");
        }
        let collection = p[0].trim();
        let days: u16 = p[1]
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid number of days for {collection}: {e}"))?;
        let rule = RetentionRule {
            collection: collection.to_string(),
            days,
        };
        rule.validate()
            .with_context(|| format!("Invalid retention rule for {collection}"))?;
        if rules.iter().any(|r: &RetentionRule| r.collection == rule.collection) {
            bail!("Duplicate retention rule for {collection}");
        }
        rules.push(rule);
    }
    Ok(rules)
}
