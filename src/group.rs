use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::ExtractConfig;
use crate::listing::{ObjectRecord, ObjectType};
use crate::paths::PathLayout;

/// How a unit's file is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractStrategy {
    /// The dump engine selects the object directly (tables and views).
    DumpObject { schema: String, name: String },
    /// Everything else is replayed from the shared archive through a
    /// per-unit manifest of identifying listing lines.
    RestoreManifest { lines: Vec<String> },
}

/// One primary object plus every secondary record that decorates it,
/// mapped to exactly one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionUnit {
    pub path: PathBuf,
    pub strategy: ExtractStrategy,
    /// Human-readable identity for logs and failure reports.
    pub label: String,
}

impl ExtractionUnit {
    pub fn manifest(&self) -> Option<&[String]> {
        match &self.strategy {
            ExtractStrategy::RestoreManifest { lines } => Some(lines),
            ExtractStrategy::DumpObject { .. } => None,
        }
    }
}

/// Groups filtered records into extraction units.
pub struct GroupBuilder<'a> {
    config: &'a ExtractConfig,
    layout: PathLayout,
}

impl<'a> GroupBuilder<'a> {
    pub fn new(config: &'a ExtractConfig) -> Self {
        let layout = PathLayout::new(config.output_base(), config.schemadir);
        Self { config, layout }
    }

    /// Build one unit per output file. Overloaded callables sharing a
    /// `(schema, basename)` collapse into a single unit, as do all
    /// default-privilege entries of one role; the path set is therefore
    /// duplicate-free and deterministic for a given record sequence.
    pub fn build_units(&self, records: &[ObjectRecord]) -> Vec<ExtractionUnit> {
        let acls: Vec<&ObjectRecord> = pool(records, ObjectType::Acl);
        let comments: Vec<&ObjectRecord> = pool(records, ObjectType::Comment);

        let mut units = Vec::new();
        let mut seen = HashSet::new();

        self.build_dump_units(records, &mut units, &mut seen);
        self.build_callable_units(records, &acls, &comments, &mut units, &mut seen);
        if self.config.sequences {
            self.build_sequence_units(records, &acls, &comments, &mut units, &mut seen);
        }
        if self.config.default_privs {
            self.build_default_priv_units(records, &mut units, &mut seen);
        }
        self.build_other_units(records, &acls, &comments, &mut units, &mut seen);

        info!(units = units.len(), "grouped listing into extraction units");
        units
    }

    /// Tables and views are dumped directly with an object selector; their
    /// ACLs, comments, indexes and triggers come along via the dump engine
    /// itself.
    fn build_dump_units(
        &self,
        records: &[ObjectRecord],
        units: &mut Vec<ExtractionUnit>,
        seen: &mut HashSet<PathBuf>,
    ) {
        for record in records {
            let kind_dir = match record.object_type {
                ObjectType::Table | ObjectType::ForeignTable => "tables",
                ObjectType::View | ObjectType::MaterializedView => "views",
                _ => continue,
            };
            let (Some(schema), Some(name)) = (record.schema.as_deref(), record.name.as_deref())
            else {
                continue;
            };
            let path = self.layout.object_path(kind_dir, Some(schema), name);
            if !seen.insert(path.clone()) {
                continue;
            }
            debug!(%record.object_type, schema, name, "direct dump unit");
            units.push(ExtractionUnit {
                path,
                strategy: ExtractStrategy::DumpObject {
                    schema: schema.to_string(),
                    name: name.to_string(),
                },
                label: format!("{} {}.{}", record.object_type, schema, name),
            });
        }
    }

    /// All overloads of a callable share one unit keyed on
    /// `(schema, basename)`, together with every ACL and comment whose
    /// basename matches.
    fn build_callable_units(
        &self,
        records: &[ObjectRecord],
        acls: &[&ObjectRecord],
        comments: &[&ObjectRecord],
        units: &mut Vec<ExtractionUnit>,
        seen: &mut HashSet<PathBuf>,
    ) {
        let callables: Vec<&ObjectRecord> = records
            .iter()
            .filter(|r| r.object_type.is_callable())
            .collect();

        for record in &callables {
            let kind_dir = match record.object_type {
                ObjectType::Function => "functions",
                _ => "aggregates",
            };
            let Some(basename) = record.basename.as_deref() else {
                continue;
            };
            let path = self
                .layout
                .object_path(kind_dir, record.schema.as_deref(), basename);
            if !seen.insert(path.clone()) {
                continue;
            }

            let mut lines = Vec::new();
            // Matching on basename also merges every overload's signature
            // variant into this one manifest.
            for overload in &callables {
                if overload.schema == record.schema
                    && overload.basename.as_deref() == Some(basename)
                {
                    lines.push(overload.manifest_line());
                }
            }
            for acl in acls {
                if acl.basename.is_some()
                    && acl.schema == record.schema
                    && acl.basename.as_deref() == Some(basename)
                {
                    lines.push(acl.manifest_line());
                }
            }
            for comment in comments {
                if matches!(comment.subtype.as_deref(), Some("FUNCTION") | Some("AGGREGATE"))
                    && comment.schema == record.schema
                    && comment.basename.as_deref() == Some(basename)
                {
                    lines.push(comment.manifest_line());
                }
            }

            units.push(ExtractionUnit {
                path,
                strategy: ExtractStrategy::RestoreManifest { lines },
                label: format!(
                    "{} {}.{}",
                    record.object_type,
                    record.schema.as_deref().unwrap_or("-"),
                    basename
                ),
            });
        }
    }

    /// A sequence unit needs its SEQUENCE SET and SEQUENCE OWNED BY entries
    /// to restore the current value and the ownership link.
    fn build_sequence_units(
        &self,
        records: &[ObjectRecord],
        acls: &[&ObjectRecord],
        comments: &[&ObjectRecord],
        units: &mut Vec<ExtractionUnit>,
        seen: &mut HashSet<PathBuf>,
    ) {
        for record in records {
            if record.object_type != ObjectType::Sequence {
                continue;
            }
            let Some(name) = record.name.as_deref() else {
                continue;
            };
            let path = self
                .layout
                .object_path("sequences", record.schema.as_deref(), name);
            if !seen.insert(path.clone()) {
                continue;
            }

            let mut lines = vec![record.manifest_line()];
            for extra in records {
                if matches!(
                    extra.object_type,
                    ObjectType::SequenceSet | ObjectType::SequenceOwnedBy
                ) && extra.schema == record.schema
                    && extra.name == record.name
                {
                    lines.push(extra.manifest_line());
                }
            }
            for acl in acls {
                if acl.schema == record.schema && acl.name == record.name {
                    lines.push(acl.manifest_line());
                }
            }
            for comment in comments {
                if comment
                    .subtype
                    .as_deref()
                    .is_some_and(|subtype| subtype.contains("SEQUENCE"))
                    && comment.schema == record.schema
                    && comment.name == record.name
                {
                    lines.push(comment.manifest_line());
                }
            }

            units.push(ExtractionUnit {
                path,
                strategy: ExtractStrategy::RestoreManifest { lines },
                label: format!(
                    "SEQUENCE {}.{}",
                    record.schema.as_deref().unwrap_or("-"),
                    name
                ),
            });
        }
    }

    /// Default privileges group by role, not by schema/name: all entries
    /// for one role merge into a single per-role unit.
    fn build_default_priv_units(
        &self,
        records: &[ObjectRecord],
        units: &mut Vec<ExtractionUnit>,
        seen: &mut HashSet<PathBuf>,
    ) {
        let default_acls: Vec<&ObjectRecord> = pool(records, ObjectType::DefaultAcl);
        for record in &default_acls {
            let Some(role) = record.role.as_deref() else {
                continue;
            };
            let path = self.layout.role_path(role);
            if !seen.insert(path.clone()) {
                continue;
            }
            let lines: Vec<String> = default_acls
                .iter()
                .filter(|other| other.role.as_deref() == Some(role))
                .map(|other| other.manifest_line())
                .collect();
            units.push(ExtractionUnit {
                path,
                strategy: ExtractStrategy::RestoreManifest { lines },
                label: format!("DEFAULT ACL {}", role),
            });
        }
    }

    /// Remaining standalone kinds, each replayed with its own ACLs and any
    /// comment whose subtype matches one of these kinds.
    fn build_other_units(
        &self,
        records: &[ObjectRecord],
        acls: &[&ObjectRecord],
        comments: &[&ObjectRecord],
        units: &mut Vec<ExtractionUnit>,
        seen: &mut HashSet<PathBuf>,
    ) {
        const COMMENT_SUBTYPES: &[&str] =
            &["RULE", "SCHEMA", "TRIGGER", "TYPE", "EXTENSION", "DOMAIN"];

        for record in records {
            let path = match record.object_type {
                ObjectType::Rule => self.layout.object_path(
                    "rules",
                    record.schema.as_deref(),
                    record.name.as_deref().unwrap_or("-"),
                ),
                ObjectType::Schema => self
                    .layout
                    .schema_path(record.name.as_deref().unwrap_or("-")),
                ObjectType::Trigger => self.layout.object_path(
                    "triggers",
                    record.schema.as_deref(),
                    record.name.as_deref().unwrap_or("-"),
                ),
                ObjectType::Type | ObjectType::Domain => self.layout.object_path(
                    "types",
                    record.schema.as_deref(),
                    record.name.as_deref().unwrap_or("-"),
                ),
                ObjectType::Extension => self.layout.object_path(
                    "extensions",
                    None,
                    record.name.as_deref().unwrap_or("-"),
                ),
                ObjectType::Server => self.layout.object_path(
                    "servers",
                    None,
                    record.name.as_deref().unwrap_or("-"),
                ),
                ObjectType::UserMapping => self.layout.user_mapping_path(
                    record.user_name.as_deref().unwrap_or("-"),
                    record.server_name.as_deref().unwrap_or("-"),
                ),
                _ => continue,
            };
            if !seen.insert(path.clone()) {
                continue;
            }

            let mut lines = vec![record.manifest_line()];
            for acl in acls {
                if acl.schema == record.schema && acl.name == record.name {
                    lines.push(acl.manifest_line());
                }
            }
            for comment in comments {
                if comment
                    .subtype
                    .as_deref()
                    .is_some_and(|subtype| COMMENT_SUBTYPES.contains(&subtype))
                    && comment.schema == record.schema
                    && comment.name == record.name
                {
                    lines.push(comment.manifest_line());
                }
            }

            units.push(ExtractionUnit {
                path,
                strategy: ExtractStrategy::RestoreManifest { lines },
                label: format!(
                    "{} {}.{}",
                    record.object_type,
                    record.schema.as_deref().unwrap_or("-"),
                    record.name.as_deref().unwrap_or("-")
                ),
            });
        }
    }
}

fn pool(records: &[ObjectRecord], object_type: ObjectType) -> Vec<&ObjectRecord> {
    records
        .iter()
        .filter(|r| r.object_type == object_type)
        .collect()
}
