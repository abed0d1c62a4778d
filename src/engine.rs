use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::config::ExtractConfig;
use crate::error::{ExtractError, Result};
use crate::group::{ExtractStrategy, ExtractionUnit};
use crate::scheduler::UnitRunner;

/// Major version of a postgres client binary. Prior to PG10 the major
/// version was the first two components of the version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgVersion {
    pub major: u32,
    pub minor: u32,
}

impl PgVersion {
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        if self.major < major {
            return false;
        }
        if self.major < 10 && self.major == major && self.minor < minor {
            return false;
        }
        true
    }
}

/// Parse the output of `<bin> --version`, formatted as
/// `bin_file (PostgreSQL) x.y.z`.
pub fn parse_version_output(program: &str, output: &str) -> Result<PgVersion> {
    let probe_error = || ExtractError::VersionProbe {
        program: program.to_string(),
        output: output.to_string(),
    };

    let (_, tail) = output.split_once(')').ok_or_else(probe_error)?;
    let mut components = tail.trim().split('.');
    let major: u32 = components
        .next()
        .and_then(|c| c.trim_matches(|ch: char| !ch.is_ascii_digit()).parse().ok())
        .ok_or_else(probe_error)?;
    let minor: u32 = components
        .next()
        .and_then(|c| c.trim_matches(|ch: char| !ch.is_ascii_digit()).parse().ok())
        .unwrap_or(0);
    Ok(PgVersion { major, minor })
}

/// Builds and runs the external dump/restore engine commands. Connection
/// settings travel as PG* environment variables on every invocation; the
/// invoker itself never touches the process-global environment.
pub struct EngineInvoker<'a> {
    config: &'a ExtractConfig,
    env: Vec<(OsString, OsString)>,
}

impl<'a> EngineInvoker<'a> {
    pub fn new(config: &'a ExtractConfig) -> Self {
        let mut env: Vec<(OsString, OsString)> = Vec::new();
        let mut push = |key: &str, value: Option<&str>| {
            if let Some(value) = value {
                env.push((key.into(), value.into()));
            }
        };
        push("PGDATABASE", config.dbname.as_deref());
        push("PGHOST", config.host.as_deref());
        push("PGPORT", config.port.as_deref());
        push("PGUSER", config.username.as_deref());
        push("PGCLIENTENCODING", config.encoding.as_deref());
        push("PGSERVICE", config.service.as_deref());
        if let Some(pgpass) = &config.pgpass {
            env.push(("PGPASSFILE".into(), pgpass.as_os_str().to_os_string()));
        }

        if let Some(pgbin) = &config.pgbin {
            let mut paths = vec![pgbin.clone()];
            if let Some(current) = std::env::var_os("PATH") {
                paths.extend(std::env::split_paths(&current));
            }
            if let Ok(joined) = std::env::join_paths(paths) {
                env.push(("PATH".into(), joined));
            }
        }

        Self { config, env }
    }

    /// Create the shared custom-format archive the replay units restore
    /// from. Schema include/exclude lists go straight to the dump engine,
    /// which owns the precedence rules when both are set.
    pub fn create_archive(&self, archive: &Path) -> Result<()> {
        let args = self.archive_dump_args(archive);
        self.run("pg_dump", &args)?;
        Ok(())
    }

    pub fn archive_dump_args(&self, archive: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--format=custom".into(),
            join_flag("--file=", archive),
        ];
        if !self.config.data {
            args.push("--schema-only".into());
        }
        if self.config.no_acl {
            args.push("--no-acl".into());
        }
        if self.config.no_owner {
            args.push("--no-owner".into());
        }
        if self.config.inserts {
            args.push("--inserts".into());
        }
        if self.config.column_inserts {
            args.push("--column-inserts".into());
        }
        for schema in &self.config.schema_include {
            args.push(format!("--schema={}", schema).into());
        }
        for schema in &self.config.schema_exclude {
            args.push(format!("--exclude-schema={}", schema).into());
        }
        args
    }

    /// Produce the archive listing the parser consumes.
    pub fn list_archive(&self, archive: &Path) -> Result<String> {
        let mut args: Vec<OsString> = vec!["--list".into()];
        args.push(archive.as_os_str().to_os_string());
        let output = self.run("pg_restore", &args)?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    /// Dump one table or view directly, with its indexes, constraints,
    /// comments, rules and triggers included by the engine itself.
    pub fn dump_object(&self, schema: &str, name: &str, out: &Path) -> Result<()> {
        let args = self.object_dump_args(schema, name, out);
        self.run("pg_dump", &args)?;
        Ok(())
    }

    pub fn object_dump_args(&self, schema: &str, name: &str, out: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            join_flag("--file=", out),
            format!("--table=\"{}\".\"{}\"", schema, name).into(),
        ];
        if self.config.custom_format {
            args.push("--format=custom".into());
        } else {
            args.push("--format=plain".into());
        }
        if !self.config.data {
            args.push("--schema-only".into());
        }
        if self.config.clean {
            args.push("--clean".into());
        }
        if self.config.no_acl {
            args.push("--no-acl".into());
        }
        if self.config.no_owner {
            args.push("--no-owner".into());
        }
        if self.config.inserts {
            args.push("--inserts".into());
        }
        if self.config.column_inserts {
            args.push("--column-inserts".into());
        }
        args
    }

    /// Replay one unit's manifest from the shared archive.
    pub fn restore_unit(&self, manifest: &Path, out: &Path, archive: &Path) -> Result<()> {
        let args = self.restore_args(manifest, out, archive);
        self.run("pg_restore", &args)?;
        Ok(())
    }

    pub fn restore_args(&self, manifest: &Path, out: &Path, archive: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            join_flag("--use-list=", manifest),
            join_flag("--file=", out),
        ];
        if self.config.clean {
            args.push("--clean".into());
        }
        if self.config.no_owner {
            args.push("--no-owner".into());
        }
        args.push(archive.as_os_str().to_os_string());
        args
    }

    /// Extract all cluster roles to a single file with pg_dumpall.
    pub fn dump_roles(&self, out: &Path) -> Result<()> {
        let with_database =
            self.config.dbname.is_some() && self.binary_version("pg_dumpall")?.at_least(9, 0);
        let args = self.roles_dump_args(out, with_database);
        self.run("pg_dumpall", &args)?;
        Ok(())
    }

    pub fn roles_dump_args(&self, out: &Path, with_database: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--roles-only".into()];
        if with_database {
            if let Some(dbname) = &self.config.dbname {
                args.push(format!("--database={}", dbname).into());
            }
        }
        args.push(join_flag("--file=", out));
        args
    }

    /// Probe one engine binary for its major version.
    pub fn binary_version(&self, program: &str) -> Result<PgVersion> {
        let args: Vec<OsString> = vec!["--version".into()];
        let output = self.run(program, &args)?;
        parse_version_output(program, String::from_utf8_lossy(&output).trim())
    }

    fn run(&self, program: &str, args: &[OsString]) -> Result<Vec<u8>> {
        let rendered = render_command(program, args);
        debug!(command = %rendered, "invoking engine");

        let mut cmd = Command::new(program);
        cmd.args(args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let output = cmd.output().map_err(|err| ExtractError::EngineSpawn {
            program: program.to_string(),
            command: rendered.clone(),
            message: err.to_string(),
            source: err,
        })?;

        if !output.status.success() {
            let mut captured = String::from_utf8_lossy(&output.stderr).into_owned();
            if !output.stdout.is_empty() {
                captured.push_str(&String::from_utf8_lossy(&output.stdout));
            }
            return Err(ExtractError::Engine {
                program: program.to_string(),
                command: rendered,
                status: output.status.to_string(),
                output: captured.trim_end().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

impl UnitRunner for EngineInvoker<'_> {
    fn run_unit(&self, unit: &ExtractionUnit, archive: &Path) -> Result<()> {
        if let Some(parent) = unit.path.parent() {
            fs::create_dir_all(parent).map_err(|err| ExtractError::CreateDir {
                path: parent.to_path_buf(),
                message: err.to_string(),
                source: err,
            })?;
        }

        match &unit.strategy {
            ExtractStrategy::DumpObject { schema, name } => {
                self.dump_object(schema, name, &unit.path)
            }
            ExtractStrategy::RestoreManifest { lines } => {
                let mut builder = tempfile::Builder::new();
                builder.prefix("pgextract_restore_list");
                let manifest_result = match &self.config.temp {
                    Some(dir) => builder.tempfile_in(dir),
                    None => builder.tempfile(),
                };
                let mut manifest = manifest_result.map_err(|err| ExtractError::FileWrite {
                    path: self
                        .config
                        .temp
                        .clone()
                        .unwrap_or_else(std::env::temp_dir),
                    message: err.to_string(),
                    source: err,
                })?;
                for line in lines {
                    writeln!(manifest, "{}", line).map_err(|err| ExtractError::FileWrite {
                        path: manifest.path().to_path_buf(),
                        message: err.to_string(),
                        source: err,
                    })?;
                }
                manifest.flush().map_err(|err| ExtractError::FileWrite {
                    path: manifest.path().to_path_buf(),
                    message: err.to_string(),
                    source: err,
                })?;
                // The manifest is private to this unit; dropping it at the
                // end of the block removes the file.
                self.restore_unit(manifest.path(), &unit.path, archive)
            }
        }
    }
}

fn join_flag(flag: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(flag);
    arg.push(path.as_os_str());
    arg
}

fn render_command(program: &str, args: &[OsString]) -> String {
    let mut rendered = String::from(program);
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}
