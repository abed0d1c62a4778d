use pgextract::cli::Cli;
use pgextract::error::{format_error_chain, suggest_fix, ExtractError};
use pgextract::logging::{self, output};

fn main() {
    let cli = Cli::parse_args();

    if let Err(err) = logging::init(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", err);
    }

    let quiet = cli.quiet;
    let started = std::time::Instant::now();

    let (config, filters) = match cli.into_settings() {
        Ok(settings) => settings,
        Err(err) => exit_with(err),
    };

    match pgextract::run(&config, &filters) {
        Ok(summary) => {
            if !quiet {
                output::success(format!(
                    "Done. Extracted {} files to {} in {}",
                    summary.files.len(),
                    config.output_base().display(),
                    logging::format_duration(started.elapsed())
                ));
            }
        }
        Err(err) => exit_with(err),
    }
}

fn exit_with(err: ExtractError) -> ! {
    output::error(format_error_chain(&err));
    if let Some(suggestion) = suggest_fix(&err) {
        eprintln!("{}", suggestion);
    }
    std::process::exit(err.exit_code());
}
