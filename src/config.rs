use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};
use crate::filter::KindSelection;

/// Immutable run configuration, constructed once from CLI arguments merged
/// with an optional `pgextract.toml` and passed to each component's entry
/// point.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Connection settings, exported to the engine processes as PG*
    /// environment variables.
    pub host: Option<String>,
    pub port: Option<String>,
    pub username: Option<String>,
    pub dbname: Option<String>,
    pub service: Option<String>,
    pub encoding: Option<String>,
    pub pgpass: Option<PathBuf>,

    /// Directory layout.
    pub basedir: PathBuf,
    pub hostnamedir: Option<String>,
    pub dbnamedir: Option<String>,
    pub nodbnamedir: bool,
    pub schemadir: bool,
    pub pgbin: Option<PathBuf>,
    pub temp: Option<PathBuf>,

    /// Object selection. Kinds gated by the filter engine live in `kinds`;
    /// sequences, roles and default privileges are handled at grouping and
    /// extraction time.
    pub kinds: KindSelection,
    pub sequences: bool,
    pub roles: bool,
    pub default_privs: bool,

    /// Dump engine options.
    pub data: bool,
    pub custom_format: bool,
    pub clean: bool,
    pub no_acl: bool,
    pub no_owner: bool,
    pub inserts: bool,
    pub column_inserts: bool,

    /// Schema lists handed straight to the dump engine, which owns the
    /// precedence rules when both are set.
    pub schema_include: Vec<String>,
    pub schema_exclude: Vec<String>,

    /// Scheduling.
    pub jobs: usize,
    pub wait: Duration,
    pub quiet: bool,

    /// Post-extraction passes.
    pub delete: bool,
    pub orreplace: bool,
    pub remove_passwords: bool,
    pub keep_dump: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            username: None,
            dbname: None,
            service: None,
            encoding: None,
            pgpass: None,
            basedir: PathBuf::from("."),
            hostnamedir: None,
            dbnamedir: None,
            nodbnamedir: false,
            schemadir: false,
            pgbin: None,
            temp: None,
            kinds: KindSelection::default(),
            sequences: false,
            roles: false,
            default_privs: false,
            data: false,
            custom_format: false,
            clean: false,
            no_acl: false,
            no_owner: false,
            inserts: false,
            column_inserts: false,
            schema_include: Vec::new(),
            schema_exclude: Vec::new(),
            jobs: 0,
            wait: Duration::ZERO,
            quiet: false,
            delete: false,
            orreplace: false,
            remove_passwords: false,
            keep_dump: false,
        }
    }
}

impl ExtractConfig {
    /// Effective output root: `basedir [/hostnamedir] [/dbname]`. The
    /// database-name level can be renamed with `dbnamedir` or suppressed
    /// entirely with `nodbnamedir`.
    pub fn output_base(&self) -> PathBuf {
        let mut base = self.basedir.clone();
        if let Some(hostnamedir) = &self.hostnamedir {
            base.push(hostnamedir);
        }
        if self.nodbnamedir {
            return base;
        }
        if let Some(dbnamedir) = &self.dbnamedir {
            base.push(dbnamedir);
        } else if let Some(dbname) = self
            .dbname
            .clone()
            .or_else(|| std::env::var("PGDATABASE").ok())
        {
            base.push(dbname);
        }
        base
    }

    /// True if any output would be produced at all.
    pub fn selects_anything(&self) -> bool {
        self.kinds.any() || self.sequences || self.roles || self.default_privs
    }

    pub fn validate(&self) -> Result<()> {
        if !self.selects_anything() {
            return Err(ExtractError::Configuration(
                "No extraction options set. Must set --getall or one of the other --get* arguments."
                    .to_string(),
            ));
        }
        if self.remove_passwords && !self.roles {
            return Err(ExtractError::Configuration(
                "Cannot set --remove-passwords without setting either --getroles or --getall"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Optional on-disk defaults, loaded from `pgextract.toml` in the current
/// directory. CLI arguments take precedence over file values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    pub basedir: Option<PathBuf>,
    pub pgbin: Option<PathBuf>,
    pub temp: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub wait: Option<f64>,
}

impl FileConfig {
    pub fn load_from_file() -> Result<Option<Self>> {
        let config_path = PathBuf::from("pgextract.toml");

        if !config_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&config_path).map_err(|err| ExtractError::ConfigLoad {
            path: config_path.clone(),
            message: err.to_string(),
        })?;
        let config: FileConfig =
            toml::from_str(&content).map_err(|err| ExtractError::ConfigLoad {
                path: config_path,
                message: err.to_string(),
            })?;

        Ok(Some(config))
    }
}
