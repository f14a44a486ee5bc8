//! Pool configuration.

use serde::Deserialize;

use crate::DbError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    3306
}

fn default_charset() -> String {
    "utf8".into()
}

fn default_autocommit() -> bool {
    true
}

fn default_min_size() -> usize {
    1
}

fn default_max_size() -> usize {
    10
}

// ---------------------------------------------------------------------------
// PoolConfig
// ---------------------------------------------------------------------------

/// Settings for [`Pool::create`](crate::Pool::create).
///
/// `user`, `password` and `database` are required; they are optional here so
/// that a partially-filled config can be rejected with a pool error instead
/// of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default = "default_charset")]
    pub charset: String,
    #[serde(default = "default_autocommit")]
    pub autocommit: bool,
    #[serde(default = "default_min_size")]
    pub min_size: usize,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

/// The required settings, borrowed from a validated [`PoolConfig`].
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub user: &'a str,
    pub password: &'a str,
    pub database: &'a str,
}

impl PoolConfig {
    /// Config with the required settings filled in and defaults elsewhere.
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            user: Some(user.into()),
            password: Some(password.into()),
            database: Some(database.into()),
            ..Self::default()
        }
    }

    /// Set the pool bounds.
    pub fn with_size(mut self, min_size: usize, max_size: usize) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    /// Check required settings and size bounds.
    ///
    /// # Errors
    /// [`DbError::InvalidConfig`] naming the first problem found.
    pub fn validate(&self) -> Result<Credentials<'_>, DbError> {
        let user = required(&self.user, "user")?;
        let password = required(&self.password, "password")?;
        let database = required(&self.database, "database")?;

        if self.max_size == 0 {
            return Err(DbError::InvalidConfig("max_size must be at least 1".into()));
        }
        if self.min_size > self.max_size {
            return Err(DbError::InvalidConfig(format!(
                "min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }

        Ok(Credentials { user, password, database })
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, DbError> {
    value
        .as_deref()
        .ok_or_else(|| DbError::InvalidConfig(format!("missing required setting '{name}'")))
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: None,
            password: None,
            database: None,
            charset: default_charset(),
            autocommit: default_autocommit(),
            min_size: default_min_size(),
            max_size: default_max_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_everything_but_credentials() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"user":"root","password":"pw","database":"blog"}"#).unwrap();
        assert_eq!(config, PoolConfig::new("root", "pw", "blog"));
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 3306);
        assert_eq!(config.charset, "utf8");
        assert!(config.autocommit);
        assert_eq!((config.min_size, config.max_size), (1, 10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_required_setting_is_rejected() {
        let config = PoolConfig {
            password: None,
            ..PoolConfig::new("root", "pw", "blog")
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_pool_init());
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let config = PoolConfig::new("root", "pw", "blog").with_size(5, 2);
        assert!(matches!(config.validate(), Err(DbError::InvalidConfig(_))));

        let config = PoolConfig::new("root", "pw", "blog").with_size(0, 0);
        assert!(matches!(config.validate(), Err(DbError::InvalidConfig(_))));
    }
}
