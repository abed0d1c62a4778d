use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::error::{ExtractError, Result};
use crate::listing::{ObjectRecord, ObjectType};

/// Per-kind enable flags. A kind that is off is never considered at all;
/// the include/exclude name lists then refine what remains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindSelection {
    pub tables: bool,
    pub views: bool,
    pub functions: bool,
    pub schemas: bool,
    pub types: bool,
    pub rules: bool,
    pub triggers: bool,
    pub extensions: bool,
    pub servers: bool,
    pub user_mappings: bool,
}

impl KindSelection {
    pub fn any(&self) -> bool {
        self.tables
            || self.views
            || self.functions
            || self.schemas
            || self.types
            || self.rules
            || self.triggers
            || self.extensions
            || self.servers
            || self.user_mappings
    }
}

/// Raw filter inputs as collected from the CLI, before regex compilation.
/// All object names must be fully schema qualified (`schema.name`); function
/// entries carry the full argument signature.
#[derive(Debug, Clone, Default)]
pub struct FilterLists {
    pub regex_exclude: Vec<String>,
    pub regex_include: Vec<String>,
    pub table_exclude: Vec<String>,
    pub table_include: Vec<String>,
    pub view_exclude: Vec<String>,
    pub view_include: Vec<String>,
    pub function_exclude: Vec<String>,
    pub function_include: Vec<String>,
    pub owner_exclude: Vec<String>,
    pub owner_include: Vec<String>,
}

/// Applies the inclusion/exclusion policy to a parsed record sequence.
///
/// Secondary records (ACL, COMMENT, DEFAULT ACL) are never filtered here;
/// they only take effect when grouped under a primary that survived.
#[derive(Debug)]
pub struct FilterEngine {
    regex_exclude: Vec<Regex>,
    regex_include: Vec<Regex>,
    lists: FilterLists,
    kinds: KindSelection,
}

impl FilterEngine {
    pub fn new(lists: FilterLists, kinds: KindSelection) -> Result<Self> {
        let regex_exclude = compile_patterns(&lists.regex_exclude)?;
        let regex_include = compile_patterns(&lists.regex_include)?;
        Ok(Self {
            regex_exclude,
            regex_include,
            lists,
            kinds,
        })
    }

    /// An engine that keeps every primary record; used when extracting with
    /// no filters configured.
    pub fn keep_all(kinds: KindSelection) -> Self {
        Self {
            regex_exclude: Vec::new(),
            regex_include: Vec::new(),
            lists: FilterLists::default(),
            kinds,
        }
    }

    pub fn apply(&self, records: Vec<ObjectRecord>) -> Vec<ObjectRecord> {
        records
            .into_iter()
            .filter(|record| {
                let keep = self.keeps(record);
                if !keep {
                    debug!(
                        object_type = %record.object_type,
                        name = record.name.as_deref().unwrap_or("-"),
                        "filtered out"
                    );
                }
                keep
            })
            .collect()
    }

    fn keeps(&self, record: &ObjectRecord) -> bool {
        if record.object_type.is_secondary() {
            return true;
        }

        // Regex excludes first; includes only apply when configured.
        // A record matching both is dropped.
        if let Some(name) = record.name.as_deref() {
            if self.regex_exclude.iter().any(|re| re.is_match(name)) {
                return false;
            }
            if !self.regex_include.is_empty()
                && !self.regex_include.iter().any(|re| re.is_match(name))
            {
                return false;
            }
        }

        let owner = record.owner.as_deref();
        if let Some(owner) = owner {
            if self.lists.owner_exclude.iter().any(|o| o == owner) {
                return false;
            }
        }
        if !self.lists.owner_include.is_empty()
            && !owner.is_some_and(|o| self.lists.owner_include.iter().any(|i| i == o))
        {
            return false;
        }

        let qualified = qualified_name(record);
        match record.object_type {
            ObjectType::Table | ObjectType::TableData | ObjectType::ForeignTable => {
                self.kinds.tables
                    && !self.lists.table_exclude.contains(&qualified)
                    && (self.lists.table_include.is_empty()
                        || self.lists.table_include.contains(&qualified))
            }
            ObjectType::View
            | ObjectType::MaterializedView
            | ObjectType::MaterializedViewData => {
                self.kinds.views
                    && !self.lists.view_exclude.contains(&qualified)
                    && (self.lists.view_include.is_empty()
                        || self.lists.view_include.contains(&qualified))
            }
            ObjectType::Function | ObjectType::Aggregate => {
                self.kinds.functions
                    && !self.lists.function_exclude.contains(&qualified)
                    && (self.lists.function_include.is_empty()
                        || self.lists.function_include.contains(&qualified))
            }
            ObjectType::Schema => self.kinds.schemas,
            ObjectType::Type | ObjectType::Domain => self.kinds.types,
            ObjectType::Rule => self.kinds.rules,
            ObjectType::Trigger => self.kinds.triggers,
            ObjectType::Extension => self.kinds.extensions,
            ObjectType::Server => self.kinds.servers,
            ObjectType::UserMapping => self.kinds.user_mappings,
            _ => true,
        }
    }
}

fn qualified_name(record: &ObjectRecord) -> String {
    format!(
        "{}.{}",
        record.schema.as_deref().unwrap_or("-"),
        record.name.as_deref().unwrap_or("-")
    )
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|err| ExtractError::FilterRegex {
                pattern: pattern.clone(),
                message: err.to_string(),
            })
        })
        .collect()
}

/// Split a CSV filter argument into its entries.
pub fn split_csv(value: &str) -> Vec<String> {
    value.split(',').map(|item| item.trim().to_string()).collect()
}

/// Read a newline-delimited filter file. Lines starting with `#` are
/// comments; blank lines are ignored.
pub fn read_filter_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|err| ExtractError::FilterList {
        path: path.to_path_buf(),
        message: err.to_string(),
        source: err,
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
