use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{ExtractConfig, FileConfig};
use crate::error::{ExtractError, Result};
use crate::filter::{self, FilterEngine, FilterLists, KindSelection};

#[derive(Parser, Clone)]
#[command(name = "pgextract")]
#[command(about = "Extract PostgreSQL database objects into per-object SQL files")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// Increase verbosity level (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    // Database connection. All of these are handed to the postgres tools
    // as their usual PG* environment variables.
    /// Database server host or socket directory
    #[arg(long)]
    pub host: Option<String>,

    /// Database server port
    #[arg(short = 'p', long)]
    pub port: Option<String>,

    /// Database user name
    #[arg(short = 'U', long)]
    pub username: Option<String>,

    /// Database name to connect to. Also used as directory name under --basedir
    #[arg(short = 'd', long)]
    pub dbname: Option<String>,

    /// Defined connection service name
    #[arg(long)]
    pub service: Option<String>,

    /// Character set encoding for the dump files
    #[arg(long)]
    pub encoding: Option<String>,

    /// Full path to a .pgpass file if not in the default location
    #[arg(long)]
    pub pgpass: Option<PathBuf>,

    // Directories
    /// Base directory for the DDL export (default: current directory)
    #[arg(long)]
    pub basedir: Option<PathBuf>,

    /// Optional hostname of the database server used as a directory level
    /// under --basedir
    #[arg(long)]
    pub hostnamedir: Option<String>,

    /// Break each schema's content out into its own subdirectory
    #[arg(long)]
    pub schemadir: bool,

    /// Rename the database-name directory level
    #[arg(long)]
    pub dbnamedir: Option<String>,

    /// Do not create a directory level named after the database
    #[arg(long)]
    pub nodbnamedir: bool,

    /// Folder containing the postgres binaries if not in $PATH
    #[arg(long)]
    pub pgbin: Option<PathBuf>,

    /// Folder to use as temporary space for the archive and manifests
    #[arg(long)]
    pub temp: Option<PathBuf>,

    // Object selection
    /// Export tables, views, functions, types, extensions and roles
    #[arg(long)]
    pub getall: bool,

    /// Export schema DDL
    #[arg(long)]
    pub getschemata: bool,

    /// Export table DDL (includes foreign tables)
    #[arg(long)]
    pub gettables: bool,

    /// Export view DDL (includes materialized views)
    #[arg(long)]
    pub getviews: bool,

    /// Export function and aggregate DDL; overloads share one file
    #[arg(long)]
    pub getfuncs: bool,

    /// Export custom types and domains
    #[arg(long)]
    pub gettypes: bool,

    /// Export extensions
    #[arg(long)]
    pub getextensions: bool,

    /// Export all cluster roles to a single file
    #[arg(long)]
    pub getroles: bool,

    /// Export per-role default privileges
    #[arg(long)]
    pub getdefaultprivs: bool,

    /// Export foreign data wrapper servers
    #[arg(long)]
    pub getservers: bool,

    /// Export user mappings
    #[arg(long)]
    pub getusermappings: bool,

    /// Export sequences into their own folder
    #[arg(long)]
    pub getsequences: bool,

    /// Export trigger definitions into their own folder
    #[arg(long)]
    pub gettriggers: bool,

    /// Export rules into their own folder
    #[arg(long)]
    pub getrules: bool,

    /// Include data in the output files
    #[arg(long)]
    pub getdata: bool,

    /// Output tables and views in the custom dump format
    #[arg(long = "Fc")]
    pub fc: bool,

    // Filters. All object names must be fully schema qualified.
    /// CSV list of schemas to INCLUDE
    #[arg(short = 'n', long)]
    pub schema_include: Option<String>,

    /// File listing schemas to INCLUDE, one per line
    #[arg(long)]
    pub schema_include_file: Option<PathBuf>,

    /// CSV list of schemas to EXCLUDE
    #[arg(short = 'N', long)]
    pub schema_exclude: Option<String>,

    /// File listing schemas to EXCLUDE, one per line
    #[arg(long)]
    pub schema_exclude_file: Option<PathBuf>,

    /// CSV list of tables to INCLUDE
    #[arg(short = 't', long)]
    pub table_include: Option<String>,

    /// File listing tables to INCLUDE, one per line
    #[arg(long)]
    pub table_include_file: Option<PathBuf>,

    /// CSV list of tables to EXCLUDE
    #[arg(short = 'T', long)]
    pub table_exclude: Option<String>,

    /// File listing tables to EXCLUDE, one per line
    #[arg(long)]
    pub table_exclude_file: Option<PathBuf>,

    /// CSV list of views to INCLUDE
    #[arg(long)]
    pub view_include: Option<String>,

    /// File listing views to INCLUDE, one per line
    #[arg(long)]
    pub view_include_file: Option<PathBuf>,

    /// CSV list of views to EXCLUDE
    #[arg(long)]
    pub view_exclude: Option<String>,

    /// File listing views to EXCLUDE, one per line
    #[arg(long)]
    pub view_exclude_file: Option<PathBuf>,

    /// File listing functions to INCLUDE with full signatures, one per line
    #[arg(long)]
    pub function_include_file: Option<PathBuf>,

    /// File listing functions to EXCLUDE with full signatures, one per line
    #[arg(long)]
    pub function_exclude_file: Option<PathBuf>,

    /// CSV list of object owners to INCLUDE
    #[arg(short = 'o', long)]
    pub owner_include: Option<String>,

    /// File listing object owners to INCLUDE, one per line
    #[arg(long)]
    pub owner_include_file: Option<PathBuf>,

    /// CSV list of object owners to EXCLUDE
    #[arg(short = 'O', long)]
    pub owner_exclude: Option<String>,

    /// File listing object owners to EXCLUDE, one per line
    #[arg(long)]
    pub owner_exclude_file: Option<PathBuf>,

    /// File of regex patterns of object names to INCLUDE
    #[arg(long)]
    pub regex_include_file: Option<PathBuf>,

    /// File of regex patterns of object names to EXCLUDE; excludes are
    /// applied before includes
    #[arg(long)]
    pub regex_exclude_file: Option<PathBuf>,

    /// Do not set ownership of objects to match the original database
    #[arg(long)]
    pub no_owner: bool,

    /// Prevent dumping of access privileges (grant/revoke commands)
    #[arg(short = 'x', long, alias = "no-privileges")]
    pub no_acl: bool,

    // Misc
    /// Number of parallel extraction jobs (0 runs everything serially)
    #[arg(short = 'j', long, default_value_t = 0)]
    pub jobs: usize,

    /// Delete stale .sql files and empty directories from the output tree
    #[arg(long)]
    pub delete: bool,

    /// Add DROP commands to the SQL output of all objects
    #[arg(long)]
    pub clean: bool,

    /// Rewrite CREATE to CREATE OR REPLACE in function and view files
    #[arg(long)]
    pub orreplace: bool,

    /// Strip password hashes from the extracted roles file
    #[arg(long)]
    pub remove_passwords: bool,

    /// Dump data as INSERT commands rather than COPY
    #[arg(long)]
    pub inserts: bool,

    /// Dump data as INSERT commands with explicit column names
    #[arg(long, alias = "attribute-inserts")]
    pub column_inserts: bool,

    /// Keep a permanent copy of the archive the files were extracted from
    #[arg(long)]
    pub keep_dump: bool,

    /// Seconds to pause between object extractions to bound write load
    #[arg(short = 'w', long, default_value_t = 0.0)]
    pub wait: f64,

    /// Suppress program output
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Build the immutable run configuration and the filter engine from the
    /// parsed arguments merged with an optional pgextract.toml.
    pub fn into_settings(self) -> Result<(ExtractConfig, FilterEngine)> {
        let file_config = FileConfig::load_from_file()?.unwrap_or_default();

        self.check_list_conflicts()?;
        if self.wait < 0.0 {
            return Err(ExtractError::Configuration(
                "--wait must not be negative".to_string(),
            ));
        }

        let mut kinds = KindSelection {
            tables: self.gettables,
            views: self.getviews,
            functions: self.getfuncs,
            schemas: self.getschemata,
            types: self.gettypes,
            rules: self.getrules,
            triggers: self.gettriggers,
            extensions: self.getextensions,
            servers: self.getservers,
            user_mappings: self.getusermappings,
        };
        let mut roles = self.getroles;
        let mut default_privs = self.getdefaultprivs;
        if self.getall {
            // Shortcut for the common set. Separate sequence, trigger and
            // rule files still need their own flags.
            kinds.tables = true;
            kinds.views = true;
            kinds.functions = true;
            kinds.schemas = true;
            kinds.types = true;
            kinds.extensions = true;
            kinds.servers = true;
            kinds.user_mappings = true;
            roles = true;
            default_privs = true;
        }

        let lists = FilterLists {
            regex_exclude: resolve_list(&None, &self.regex_exclude_file)?,
            regex_include: resolve_list(&None, &self.regex_include_file)?,
            table_exclude: resolve_list(&self.table_exclude, &self.table_exclude_file)?,
            table_include: resolve_list(&self.table_include, &self.table_include_file)?,
            view_exclude: resolve_list(&self.view_exclude, &self.view_exclude_file)?,
            view_include: resolve_list(&self.view_include, &self.view_include_file)?,
            function_exclude: resolve_list(&None, &self.function_exclude_file)?,
            function_include: resolve_list(&None, &self.function_include_file)?,
            owner_exclude: resolve_list(&self.owner_exclude, &self.owner_exclude_file)?,
            owner_include: resolve_list(&self.owner_include, &self.owner_include_file)?,
        };
        let filters = FilterEngine::new(lists, kinds)?;

        let jobs = if self.jobs != 0 {
            self.jobs
        } else {
            file_config.jobs.unwrap_or(0)
        };
        let wait = if self.wait > 0.0 {
            self.wait
        } else {
            file_config.wait.unwrap_or(0.0)
        };

        let config = ExtractConfig {
            host: self.host,
            port: self.port,
            username: self.username,
            dbname: self.dbname,
            service: self.service,
            encoding: self.encoding,
            pgpass: self.pgpass,
            basedir: self
                .basedir
                .or(file_config.basedir)
                .unwrap_or_else(|| PathBuf::from(".")),
            hostnamedir: self.hostnamedir,
            dbnamedir: self.dbnamedir,
            nodbnamedir: self.nodbnamedir,
            schemadir: self.schemadir,
            pgbin: self.pgbin.or(file_config.pgbin),
            temp: self.temp.or(file_config.temp),
            kinds,
            sequences: self.getsequences,
            roles,
            default_privs,
            data: self.getdata,
            custom_format: self.fc,
            clean: self.clean,
            no_acl: self.no_acl,
            no_owner: self.no_owner,
            inserts: self.inserts,
            column_inserts: self.column_inserts,
            schema_include: resolve_list(&self.schema_include, &self.schema_include_file)?,
            schema_exclude: resolve_list(&self.schema_exclude, &self.schema_exclude_file)?,
            jobs,
            wait: Duration::from_secs_f64(wait),
            quiet: self.quiet,
            delete: self.delete,
            orreplace: self.orreplace,
            remove_passwords: self.remove_passwords,
            keep_dump: self.keep_dump,
        };
        config.validate()?;

        Ok((config, filters))
    }

    fn check_list_conflicts(&self) -> Result<()> {
        let conflicts = [
            (self.schema_include.is_some(), self.schema_include_file.is_some()),
            (self.schema_exclude.is_some(), self.schema_exclude_file.is_some()),
            (self.table_include.is_some(), self.table_include_file.is_some()),
            (self.table_exclude.is_some(), self.table_exclude_file.is_some()),
            (self.view_include.is_some(), self.view_include_file.is_some()),
            (self.view_exclude.is_some(), self.view_exclude_file.is_some()),
            (self.owner_include.is_some(), self.owner_include_file.is_some()),
            (self.owner_exclude.is_some(), self.owner_exclude_file.is_some()),
        ];
        if conflicts.iter().any(|(csv, file)| *csv && *file) {
            return Err(ExtractError::Configuration(
                "Cannot set both a csv and file filter at the same time for the same object type."
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve_list(csv: &Option<String>, file: &Option<PathBuf>) -> Result<Vec<String>> {
    if let Some(csv) = csv {
        Ok(filter::split_csv(csv))
    } else if let Some(path) = file {
        filter::read_filter_file(path)
    } else {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_extraction_parsing() {
        let cli = Cli::try_parse_from([
            "pgextract",
            "-U",
            "postgres",
            "-d",
            "mydb",
            "--getall",
            "--keep-dump",
        ])
        .unwrap();
        assert_eq!(cli.username.as_deref(), Some("postgres"));
        assert_eq!(cli.dbname.as_deref(), Some("mydb"));
        assert!(cli.getall);
        assert!(cli.keep_dump);
    }

    #[test]
    fn test_getall_expands_selection() {
        let cli = Cli::try_parse_from(["pgextract", "--getall"]).unwrap();
        let (config, _filters) = cli.into_settings().unwrap();
        assert!(config.kinds.tables);
        assert!(config.kinds.functions);
        assert!(config.kinds.extensions);
        assert!(config.roles);
        assert!(config.default_privs);
        // Separate sequence/trigger/rule files still need their own flags.
        assert!(!config.sequences);
        assert!(!config.kinds.triggers);
        assert!(!config.kinds.rules);
    }

    #[test]
    fn test_schema_filter_for_functions_only() {
        let cli =
            Cli::try_parse_from(["pgextract", "--getfuncs", "-n", "keith", "-d", "mydb"]).unwrap();
        let (config, _filters) = cli.into_settings().unwrap();
        assert!(config.kinds.functions);
        assert!(!config.kinds.tables);
        assert_eq!(config.schema_include, ["keith"]);
    }

    #[test]
    fn test_no_selection_is_config_error() {
        let cli = Cli::try_parse_from(["pgextract", "-d", "mydb"]).unwrap();
        let err = cli.into_settings().unwrap_err();
        assert!(matches!(err, ExtractError::Configuration(_)));
    }

    #[test]
    fn test_csv_and_file_conflict_is_rejected() {
        let cli = Cli::try_parse_from([
            "pgextract",
            "--gettables",
            "-t",
            "public.orders",
            "--table-include-file",
            "/tmp/tables.txt",
        ])
        .unwrap();
        let err = cli.into_settings().unwrap_err();
        assert!(matches!(err, ExtractError::Configuration(_)));
    }

    #[test]
    fn test_remove_passwords_without_roles_is_rejected() {
        let cli =
            Cli::try_parse_from(["pgextract", "--gettables", "--remove-passwords"]).unwrap();
        let err = cli.into_settings().unwrap_err();
        assert!(matches!(err, ExtractError::Configuration(_)));
    }

    #[test]
    fn test_jobs_and_wait_parsing() {
        let cli = Cli::try_parse_from([
            "pgextract",
            "--gettables",
            "-j",
            "4",
            "-w",
            "0.5",
        ])
        .unwrap();
        let (config, _filters) = cli.into_settings().unwrap();
        assert_eq!(config.jobs, 4);
        assert_eq!(config.wait, Duration::from_millis(500));
    }

    #[test]
    fn test_table_include_csv() {
        let cli = Cli::try_parse_from([
            "pgextract",
            "--gettables",
            "-t",
            "public.orders,public.customers",
        ])
        .unwrap();
        let (_config, filters) = cli.into_settings().unwrap();
        // The list is consumed by the filter engine; spot-check through it.
        let records = crate::listing::ListParser::new(false)
            .parse_listing(concat!(
                "1; 1259 1 TABLE public orders alice\n",
                "2; 1259 2 TABLE public audit_log alice\n",
            ))
            .unwrap();
        let kept = filters.apply(records);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name.as_deref(), Some("orders"));
    }
}
