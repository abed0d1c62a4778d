use std::fmt;

/// Object kinds that can appear in a `pg_restore --list` listing.
///
/// The set is wider than what ever gets its own output file: data entries,
/// indexes and constraints are parsed so the listing round-trips, but they
/// are folded into their owning object by the dump engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Table,
    TableData,
    View,
    MaterializedView,
    MaterializedViewData,
    ForeignTable,
    Function,
    Aggregate,
    Sequence,
    SequenceOwnedBy,
    SequenceSet,
    Trigger,
    Rule,
    Type,
    Domain,
    Schema,
    Extension,
    Server,
    UserMapping,
    Acl,
    Comment,
    DefaultAcl,
    Index,
    Constraint,
    FkConstraint,
    Database,
    Default,
}

impl ObjectType {
    /// Secondary records decorate a primary object and never appear
    /// standalone in output.
    pub fn is_secondary(&self) -> bool {
        matches!(
            self,
            ObjectType::Acl | ObjectType::Comment | ObjectType::DefaultAcl
        )
    }

    /// Callable objects carry a parenthesized argument signature in their
    /// listing name and can be overloaded.
    pub fn is_callable(&self) -> bool {
        matches!(self, ObjectType::Function | ObjectType::Aggregate)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self {
            ObjectType::Table => "TABLE",
            ObjectType::TableData => "TABLE DATA",
            ObjectType::View => "VIEW",
            ObjectType::MaterializedView => "MATERIALIZED VIEW",
            ObjectType::MaterializedViewData => "MATERIALIZED VIEW DATA",
            ObjectType::ForeignTable => "FOREIGN TABLE",
            ObjectType::Function => "FUNCTION",
            ObjectType::Aggregate => "AGGREGATE",
            ObjectType::Sequence => "SEQUENCE",
            ObjectType::SequenceOwnedBy => "SEQUENCE OWNED BY",
            ObjectType::SequenceSet => "SEQUENCE SET",
            ObjectType::Trigger => "TRIGGER",
            ObjectType::Rule => "RULE",
            ObjectType::Type => "TYPE",
            ObjectType::Domain => "DOMAIN",
            ObjectType::Schema => "SCHEMA",
            ObjectType::Extension => "EXTENSION",
            ObjectType::Server => "SERVER",
            ObjectType::UserMapping => "USER MAPPING",
            ObjectType::Acl => "ACL",
            ObjectType::Comment => "COMMENT",
            ObjectType::DefaultAcl => "DEFAULT ACL",
            ObjectType::Index => "INDEX",
            ObjectType::Constraint => "CONSTRAINT",
            ObjectType::FkConstraint => "FK CONSTRAINT",
            ObjectType::Database => "DATABASE",
            ObjectType::Default => "DEFAULT",
        };
        write!(f, "{}", keyword)
    }
}

/// One parsed line of the archive listing.
///
/// Field presence is determined by `object_type`; the parser only ever
/// constructs the combinations described in the per-type grammars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    /// The opaque `N; NNNN NNNNN` identifier prefix, verbatim. Needed to
    /// reconstruct a restore manifest.
    pub archive_id: String,
    pub object_type: ObjectType,
    /// Schema name; `None` for cluster-level objects (listed as `-`).
    pub schema: Option<String>,
    /// Display name. For callables this includes the full argument-type
    /// signature.
    pub name: Option<String>,
    /// `name` with the signature stripped; identical for all overloads of
    /// the same callable. Only present on callable-shaped records.
    pub basename: Option<String>,
    pub owner: Option<String>,
    /// COMMENT target kind, or the privilege-target class of a DEFAULT ACL.
    pub subtype: Option<String>,
    /// Role a DEFAULT ACL entry belongs to.
    pub role: Option<String>,
    /// Owning table on RULE records from pg_restore >= 9.6 listings.
    pub table: Option<String>,
    /// `ON <table>` clause on rule comments.
    pub source: Option<String>,
    /// USER MAPPING user and server names.
    pub user_name: Option<String>,
    pub server_name: Option<String>,
}

impl ObjectRecord {
    pub(crate) fn new(archive_id: &str, object_type: ObjectType) -> Self {
        Self {
            archive_id: archive_id.to_string(),
            object_type,
            schema: None,
            name: None,
            basename: None,
            owner: None,
            subtype: None,
            role: None,
            table: None,
            source: None,
            user_name: None,
            server_name: None,
        }
    }

    /// The name this record groups under: the signature-stripped basename
    /// for callable-shaped records, the display name otherwise.
    pub fn group_name(&self) -> Option<&str> {
        self.basename.as_deref().or(self.name.as_deref())
    }

    /// Reconstruct the identifying listing line for a restore manifest.
    /// The restore engine matches entries on the archive id prefix, but the
    /// full line is written so manifests stay human-readable.
    pub fn manifest_line(&self) -> String {
        let schema = self.schema.as_deref().unwrap_or("-");
        let type_keyword = self.object_type.to_string();
        let mut parts: Vec<&str> = vec![&self.archive_id, &type_keyword];

        match self.object_type {
            ObjectType::DefaultAcl => {
                parts.push(schema);
                parts.push("DEFAULT PRIVILEGES FOR");
                if let Some(subtype) = self.subtype.as_deref() {
                    parts.push(subtype);
                }
                if let Some(role) = self.role.as_deref() {
                    parts.push(role);
                }
            }
            ObjectType::UserMapping => {
                parts.push(schema);
                parts.push("USER MAPPING");
                if let Some(user) = self.user_name.as_deref() {
                    parts.push(user);
                }
                parts.push("SERVER");
                if let Some(server) = self.server_name.as_deref() {
                    parts.push(server);
                }
                if let Some(owner) = self.owner.as_deref() {
                    parts.push(owner);
                }
            }
            ObjectType::Rule if self.table.is_some() => {
                parts.push(schema);
                parts.push(self.table.as_deref().unwrap_or("-"));
                if let Some(name) = self.name.as_deref() {
                    parts.push(name);
                }
                if let Some(owner) = self.owner.as_deref() {
                    parts.push(owner);
                }
            }
            _ => {
                parts.push(schema);
                if let Some(subtype) = self.subtype.as_deref() {
                    parts.push(subtype);
                }
                if let Some(name) = self.name.as_deref() {
                    parts.push(name);
                }
                if let Some(source) = self.source.as_deref() {
                    parts.push(source);
                }
                if let Some(owner) = self.owner.as_deref() {
                    parts.push(owner);
                }
            }
        }

        parts.join(" ")
    }
}
