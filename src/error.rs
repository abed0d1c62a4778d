use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pgextract
#[derive(Error, Debug)]
pub enum ExtractError {
    // Configuration Errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to load configuration from {path}: {message}")]
    ConfigLoad {
        path: PathBuf,
        message: String,
    },

    #[error("Cannot access include/exclude file {path}: {message}")]
    FilterList {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid filter regex {pattern:?}: {message}")]
    FilterRegex {
        pattern: String,
        message: String,
    },

    // Listing Parse Errors
    #[error("Unparseable {object_type} entry in archive listing: {line:?}")]
    ListingParse {
        object_type: String,
        line: String,
    },

    #[error("Unrecognized output from {program} --version: {output:?}")]
    VersionProbe {
        program: String,
        output: String,
    },

    // External Engine Errors
    #[error("{program} failed with {status}\ncommand: {command}\n{output}")]
    Engine {
        program: String,
        command: String,
        status: String,
        output: String,
    },

    #[error("Failed to launch {program}: {message}\ncommand: {command}")]
    EngineSpawn {
        program: String,
        command: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    // File System Errors
    #[error("Unable to create directory {path}: {message}")]
    CreateDir {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {message}")]
    FileRead {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {message}")]
    FileWrite {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    /// Process exit status for this error kind. Each fatal class gets its
    /// own code so wrapper scripts can tell a parse failure from an engine
    /// failure without scraping stderr.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExtractError::Configuration(_)
            | ExtractError::ConfigLoad { .. }
            | ExtractError::FilterList { .. }
            | ExtractError::FilterRegex { .. } => 2,
            ExtractError::ListingParse { .. } | ExtractError::VersionProbe { .. } => 3,
            ExtractError::Engine { .. } | ExtractError::EngineSpawn { .. } => 4,
            ExtractError::CreateDir { .. }
            | ExtractError::FileRead { .. }
            | ExtractError::FileWrite { .. } => 5,
        }
    }
}

/// Result type alias for pgextract operations
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Helper function to format error with all its causes
pub fn format_error_chain(err: &ExtractError) -> String {
    use std::error::Error;

    let mut output = format!("Error: {}", err);

    let mut current_err: &dyn Error = err;
    while let Some(source) = current_err.source() {
        output.push_str(&format!("\n  Caused by: {}", source));
        current_err = source;
    }

    output
}

/// Helper function to suggest fixes for common errors
pub fn suggest_fix(err: &ExtractError) -> Option<String> {
    match err {
        ExtractError::EngineSpawn { program, .. } => Some(format!(
            "{} could not be started.\n\
             - Check that the PostgreSQL client tools are installed\n\
             - Use --pgbin to point at the folder containing pg_dump, pg_restore and pg_dumpall",
            program
        )),
        ExtractError::Engine { program, .. } => Some(format!(
            "Suggestions:\n\
             - Check the {} output above for the underlying cause\n\
             - Verify the connection settings (--host, --port, --username, --dbname)\n\
             - Ensure the role used has permission to read the objects being extracted",
            program
        )),
        ExtractError::FilterList { path, .. } => Some(format!(
            "Filter file not readable: {}\n\
             - Check if the path is correct\n\
             - Each entry goes on its own line; comments can be preceded with #",
            path.display()
        )),
        ExtractError::ListingParse { .. } => Some(
            "The archive listing contained an entry this version does not understand.\n\
             Please re-run with -vv and report the offending line."
                .to_string(),
        ),
        _ => None,
    }
}
