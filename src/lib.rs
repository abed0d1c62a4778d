//! pgextract splits a PostgreSQL database into one-object-per-file SQL
//! scripts suitable for version control. All DDL text is produced by the
//! database's own dump/restore tools; this crate parses the archive
//! listing, decides which objects go in which file, and drives those tools
//! under a bounded-parallelism policy.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use tracing::info;

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod group;
pub mod listing;
pub mod logging;
pub mod paths;
pub mod reconcile;
pub mod rewrite;
pub mod scheduler;

pub use config::ExtractConfig;
pub use error::{ExtractError, Result};
pub use filter::FilterEngine;

use engine::EngineInvoker;
use group::GroupBuilder;
use listing::ListParser;
use paths::PathLayout;
use scheduler::Scheduler;

/// What a completed run produced.
#[derive(Debug)]
pub struct RunSummary {
    /// Every output file written this run, in dispatch order.
    pub files: Vec<PathBuf>,
}

/// Run the full extraction pipeline: archive the database once, parse the
/// archive listing, filter and group the records, extract every unit, then
/// run the configured post passes.
pub fn run(config: &ExtractConfig, filters: &FilterEngine) -> Result<RunSummary> {
    config.validate()?;

    let base = config.output_base();
    fs::create_dir_all(&base).map_err(|err| ExtractError::CreateDir {
        path: base.clone(),
        message: err.to_string(),
        source: err,
    })?;

    let invoker = EngineInvoker::new(config);

    // The RULE listing layout changed in pg_restore 9.6; probe once per run.
    let rule_table_layout = invoker.binary_version("pg_restore")?.at_least(9, 6);

    info!("creating archive dump");
    let archive = create_archive_file(config)?;
    invoker.create_archive(archive.path())?;

    if config.keep_dump {
        let dump_dir = base.join("dump");
        fs::create_dir_all(&dump_dir).map_err(|err| ExtractError::CreateDir {
            path: dump_dir.clone(),
            message: err.to_string(),
            source: err,
        })?;
        let dest = dump_dir.join("pgextract_dump.pgr");
        fs::copy(archive.path(), &dest).map_err(|err| ExtractError::FileWrite {
            path: dest,
            message: err.to_string(),
            source: err,
        })?;
    }

    let listing_text = invoker.list_archive(archive.path())?;
    let parser = ListParser::new(rule_table_layout);
    let records = parser.parse_listing(&listing_text)?;
    info!(records = records.len(), "parsed archive listing");

    let filtered = filters.apply(records);
    let units = GroupBuilder::new(config).build_units(&filtered);

    Scheduler::new(config.jobs, config.wait).run(&units, archive.path(), &invoker)?;
    let mut files: Vec<PathBuf> = units.into_iter().map(|unit| unit.path).collect();

    if config.roles {
        let layout = PathLayout::new(&base, config.schemadir);
        let roles_file = layout.roles_file();
        if let Some(parent) = roles_file.parent() {
            fs::create_dir_all(parent).map_err(|err| ExtractError::CreateDir {
                path: parent.to_path_buf(),
                message: err.to_string(),
                source: err,
            })?;
        }
        info!("extracting cluster roles");
        invoker.dump_roles(&roles_file)?;
        if config.remove_passwords {
            rewrite::remove_role_passwords(&roles_file)?;
        }
        files.push(roles_file);
    }

    if config.orreplace {
        rewrite::apply_or_replace(&base)?;
    }

    if config.delete {
        let keep: HashSet<PathBuf> = files.iter().cloned().collect();
        reconcile::reconcile_tree(&base, &keep)?;
    }

    info!(files = files.len(), "extraction complete");
    Ok(RunSummary { files })
}

/// The shared archive is read-only for the rest of the run and is removed
/// when the handle drops at the end of it.
fn create_archive_file(config: &ExtractConfig) -> Result<tempfile::NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("pgextract").suffix(".pgr");
    let result = match &config.temp {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    };
    result.map_err(|err| ExtractError::FileWrite {
        path: config.temp.clone().unwrap_or_else(std::env::temp_dir),
        message: err.to_string(),
        source: err,
    })
}
