use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::error::{ExtractError, Result};

/// Rewrite `CREATE` to `CREATE OR REPLACE` in produced function and view
/// files. Materialized views cannot use the OR REPLACE syntax and are left
/// alone. Works for both the flat and the per-schema layout by keying off
/// the containing directory name.
pub fn apply_or_replace(root: &Path) -> Result<()> {
    // Static patterns; compilation cannot fail.
    let function_re = Regex::new(r"^CREATE FUNCTION\b").unwrap();
    let view_re = Regex::new(r"^CREATE VIEW\b").unwrap();

    visit_sql_files(root, &mut |path| {
        let dir_name = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str());
        match dir_name {
            Some("functions") => rewrite_lines(path, &function_re, "CREATE OR REPLACE FUNCTION"),
            Some("views") => rewrite_lines(path, &view_re, "CREATE OR REPLACE VIEW"),
            _ => Ok(()),
        }
    })
}

/// Strip the PASSWORD clause from ALTER ROLE lines in a role dump, leaving
/// the file as valid SQL.
pub fn remove_role_passwords(role_file: &Path) -> Result<()> {
    if !role_file.is_file() {
        return Ok(());
    }
    let password_re = Regex::new(r"(.*)\sPASSWORD\s.*(;)$").unwrap();

    let content = read(role_file)?;
    let mut rewritten = String::with_capacity(content.len());
    for line in content.lines() {
        if line.starts_with("ALTER ROLE") {
            rewritten.push_str(&password_re.replace(line, "$1$2"));
        } else {
            rewritten.push_str(line);
        }
        rewritten.push('\n');
    }
    write(role_file, &rewritten)
}

fn visit_sql_files(dir: &Path, visit: &mut dyn FnMut(&Path) -> Result<()>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    let entries = fs::read_dir(dir).map_err(|err| ExtractError::FileRead {
        path: dir.to_path_buf(),
        message: err.to_string(),
        source: err,
    })?;
    for entry in entries {
        let entry = entry.map_err(|err| ExtractError::FileRead {
            path: dir.to_path_buf(),
            message: err.to_string(),
            source: err,
        })?;
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            visit_sql_files(&path, visit)?;
        } else if path.extension().is_some_and(|ext| ext == "sql") {
            visit(&path)?;
        }
    }
    Ok(())
}

fn rewrite_lines(path: &Path, pattern: &Regex, replacement: &str) -> Result<()> {
    let content = read(path)?;
    let mut changed = false;
    let mut rewritten = String::with_capacity(content.len());
    for line in content.lines() {
        if pattern.is_match(line) {
            changed = true;
            rewritten.push_str(&pattern.replace(line, replacement));
        } else {
            rewritten.push_str(line);
        }
        rewritten.push('\n');
    }
    if changed {
        debug!(path = %path.display(), "rewrote CREATE to CREATE OR REPLACE");
        write(path, &rewritten)?;
    }
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|err| ExtractError::FileRead {
        path: path.to_path_buf(),
        message: err.to_string(),
        source: err,
    })
}

fn write(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|err| ExtractError::FileWrite {
        path: path.to_path_buf(),
        message: err.to_string(),
        source: err,
    })
}
