//! Integration tests for the on-disk half of a run: unit dispatch through
//! the scheduler, the OR REPLACE rewrite, and tree reconciliation. A
//! recording runner stands in for the external engines.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pgextract::config::ExtractConfig;
use pgextract::error::Result;
use pgextract::filter::{FilterEngine, KindSelection};
use pgextract::group::{ExtractStrategy, ExtractionUnit, GroupBuilder};
use pgextract::listing::ListParser;
use pgextract::reconcile::reconcile_tree;
use pgextract::rewrite::apply_or_replace;
use pgextract::scheduler::{Scheduler, UnitRunner};

/// Writes a plausible SQL file for each unit instead of invoking pg_dump
/// or pg_restore.
struct FileWritingRunner;

impl UnitRunner for FileWritingRunner {
    fn run_unit(&self, unit: &ExtractionUnit, _archive: &Path) -> Result<()> {
        fs::create_dir_all(unit.path.parent().unwrap()).unwrap();
        let body = match &unit.strategy {
            ExtractStrategy::DumpObject { schema, name } => {
                format!("CREATE TABLE {}.{} ();\n", schema, name)
            }
            ExtractStrategy::RestoreManifest { lines } => {
                let mut body = String::new();
                for line in lines {
                    if line.contains(" FUNCTION ") {
                        body.push_str("CREATE FUNCTION placeholder() RETURNS void;\n");
                    } else if line.contains(" VIEW ") {
                        body.push_str("CREATE VIEW placeholder AS SELECT 1;\n");
                    } else {
                        body.push_str("SELECT 1;\n");
                    }
                }
                body
            }
        };
        fs::write(&unit.path, body).unwrap();
        Ok(())
    }
}

fn units_for(base: &Path) -> Vec<ExtractionUnit> {
    let listing = concat!(
        "215; 1259 16386 TABLE public orders dbowner\n",
        "1234; 5678 90123 FUNCTION api place_order(integer) apiowner\n",
        "1235; 5678 90124 FUNCTION api place_order(integer, text) apiowner\n",
        "5; 2615 2200 SCHEMA - api apiowner\n",
    );
    let config = ExtractConfig {
        basedir: base.to_path_buf(),
        nodbnamedir: true,
        kinds: KindSelection {
            tables: true,
            functions: true,
            schemas: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let filters = FilterEngine::keep_all(config.kinds);
    let records = ListParser::new(false).parse_listing(listing).unwrap();
    GroupBuilder::new(&config).build_units(&filters.apply(records))
}

#[test]
fn scheduler_writes_every_unit_file() {
    let dir = tempfile::tempdir().unwrap();
    let units = units_for(dir.path());

    Scheduler::new(2, Duration::ZERO)
        .run(&units, Path::new("/tmp/fake.pgr"), &FileWritingRunner)
        .unwrap();

    assert!(dir.path().join("tables/public.orders.sql").is_file());
    assert!(dir.path().join("functions/api.place_order.sql").is_file());
    assert!(dir.path().join("schemata/api.sql").is_file());
    assert_eq!(units.len(), 3);
}

#[test]
fn or_replace_pass_rewrites_extracted_functions() {
    let dir = tempfile::tempdir().unwrap();
    let units = units_for(dir.path());
    Scheduler::new(0, Duration::ZERO)
        .run(&units, Path::new("/tmp/fake.pgr"), &FileWritingRunner)
        .unwrap();

    apply_or_replace(dir.path()).unwrap();

    let function_sql =
        fs::read_to_string(dir.path().join("functions/api.place_order.sql")).unwrap();
    assert!(function_sql.contains("CREATE OR REPLACE FUNCTION"));
    // Files outside functions/ and views/ are untouched.
    let table_sql = fs::read_to_string(dir.path().join("tables/public.orders.sql")).unwrap();
    assert!(table_sql.starts_with("CREATE TABLE public.orders"));
}

#[test]
fn reconciliation_removes_only_stale_files() {
    let dir = tempfile::tempdir().unwrap();
    let units = units_for(dir.path());
    Scheduler::new(0, Duration::ZERO)
        .run(&units, Path::new("/tmp/fake.pgr"), &FileWritingRunner)
        .unwrap();

    // A file from an earlier run whose object has since been dropped.
    let stale = dir.path().join("tables/public.dropped.sql");
    fs::write(&stale, "CREATE TABLE public.dropped ();\n").unwrap();
    let stale_dir_file = dir.path().join("types/public.gone.sql");
    fs::create_dir_all(stale_dir_file.parent().unwrap()).unwrap();
    fs::write(&stale_dir_file, "CREATE TYPE public.gone;\n").unwrap();

    let keep: HashSet<PathBuf> = units.iter().map(|u| u.path.clone()).collect();
    reconcile_tree(dir.path(), &keep).unwrap();

    assert!(!stale.exists());
    assert!(!stale_dir_file.exists());
    // The emptied types/ directory is removed, occupied ones stay.
    assert!(!dir.path().join("types").exists());
    assert!(dir.path().join("tables/public.orders.sql").is_file());
    assert!(dir.path().join("functions/api.place_order.sql").is_file());
}

#[test]
fn rerun_after_reconcile_is_stable() {
    let dir = tempfile::tempdir().unwrap();

    for _ in 0..2 {
        let units = units_for(dir.path());
        Scheduler::new(0, Duration::ZERO)
            .run(&units, Path::new("/tmp/fake.pgr"), &FileWritingRunner)
            .unwrap();
        let keep: HashSet<PathBuf> = units.iter().map(|u| u.path.clone()).collect();
        reconcile_tree(dir.path(), &keep).unwrap();
    }

    let mut found = Vec::new();
    collect_sql(dir.path(), &mut found);
    found.sort();
    assert_eq!(
        found,
        [
            dir.path().join("functions/api.place_order.sql"),
            dir.path().join("schemata/api.sql"),
            dir.path().join("tables/public.orders.sql"),
        ]
    );
}

fn collect_sql(dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_sql(&path, out);
        } else if path.extension().is_some_and(|e| e == "sql") {
            out.push(path);
        }
    }
}
