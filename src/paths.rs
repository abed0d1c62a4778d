use std::path::{Path, PathBuf};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything outside `[0-9A-Za-z_]` is percent-hex-escaped so path
/// segments stay filesystem-safe and collision-free regardless of what the
/// database allows in identifiers.
const SEGMENT_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'_');

/// Escape one path segment (a schema, object or role name).
pub fn escape_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT_SET).to_string()
}

/// Computes output file paths for extraction units.
///
/// With `per_schema` enabled, schema-qualified objects are nested under a
/// directory named after their schema, and schema DDL itself lands inside
/// that directory instead of `schemata/`.
#[derive(Debug, Clone)]
pub struct PathLayout {
    base: PathBuf,
    per_schema: bool,
}

impl PathLayout {
    pub fn new(base: impl Into<PathBuf>, per_schema: bool) -> Self {
        Self {
            base: base.into(),
            per_schema,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// `<base>[/<schema>]/<kind>/<schema>.<name>.sql`, or
    /// `<base>/<kind>/<name>.sql` for cluster-level objects.
    pub fn object_path(&self, kind_dir: &str, schema: Option<&str>, name: &str) -> PathBuf {
        let mut path = self.base.clone();
        if self.per_schema {
            if let Some(schema) = schema {
                path.push(escape_segment(schema));
            }
        }
        path.push(kind_dir);
        match schema {
            Some(schema) => path.push(format!(
                "{}.{}.sql",
                escape_segment(schema),
                escape_segment(name)
            )),
            None => path.push(format!("{}.sql", escape_segment(name))),
        }
        path
    }

    /// Schema DDL: `<base>/schemata/<name>.sql`, or `<base>/<name>/<name>.sql`
    /// in per-schema layout.
    pub fn schema_path(&self, name: &str) -> PathBuf {
        let mut path = self.base.clone();
        if self.per_schema {
            path.push(escape_segment(name));
        } else {
            path.push("schemata");
        }
        path.push(format!("{}.sql", escape_segment(name)));
        path
    }

    /// Per-role default-privilege files live next to the cluster roles file.
    pub fn role_path(&self, role: &str) -> PathBuf {
        let mut path = self.base.clone();
        path.push("roles");
        path.push(format!("{}.sql", escape_segment(role)));
        path
    }

    pub fn roles_file(&self) -> PathBuf {
        let mut path = self.base.clone();
        path.push("roles");
        path.push("roles.sql");
        path
    }

    /// `<base>/user_mappings/<user>_<server>.sql`.
    pub fn user_mapping_path(&self, user: &str, server: &str) -> PathBuf {
        let mut path = self.base.clone();
        path.push("user_mappings");
        path.push(format!(
            "{}_{}.sql",
            escape_segment(user),
            escape_segment(server)
        ));
        path
    }
}
