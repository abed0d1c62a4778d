use std::io::IsTerminal;
use tracing::Level;
use tracing_subscriber::{
    fmt::{format::FmtSpan, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize the logging and error reporting infrastructure
pub fn init(verbosity: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Install color-eyre panic and error handlers if available
    #[cfg(feature = "cli")]
    color_eyre::install()?;

    // Set up the logging level based on verbosity
    let log_level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // Create the env filter, allowing RUST_LOG to override
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pgextract={}", log_level)));

    // Check if we're running in a terminal for color output
    let is_terminal = std::io::stdout().is_terminal();

    // Set up the formatting layer
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_ansi(is_terminal)
        .with_timer(UtcTime::rfc_3339())
        .with_span_events(FmtSpan::CLOSE);

    // Combine layers and set as global subscriber
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

/// Format output for CLI with colors
pub mod output {
    #[cfg(feature = "cli")]
    use console::{style, Emoji};
    use std::fmt::Display;

    #[cfg(feature = "cli")]
    static CHECKMARK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
    #[cfg(feature = "cli")]
    static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[FAIL] ");
    #[cfg(feature = "cli")]
    static ARROW: Emoji<'_, '_> = Emoji("→ ", "-> ");

    #[cfg(feature = "cli")]
    pub fn success(message: impl Display) {
        println!("{} {}", style(CHECKMARK).green(), message);
    }

    #[cfg(feature = "cli")]
    pub fn error(message: impl Display) {
        eprintln!("{} {}", style(CROSS).red(), style(message).red());
    }

    #[cfg(feature = "cli")]
    pub fn step(message: impl Display) {
        println!("{} {}", style(ARROW).cyan(), message);
    }

    #[cfg(not(feature = "cli"))]
    pub fn success(message: impl Display) {
        println!("[OK] {}", message);
    }

    #[cfg(not(feature = "cli"))]
    pub fn error(message: impl Display) {
        eprintln!("[FAIL] {}", message);
    }

    #[cfg(not(feature = "cli"))]
    pub fn step(message: impl Display) {
        println!("-> {}", message);
    }
}

/// Helper to format durations in human-readable format
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs == 0 {
        format!("{}ms", millis)
    } else if secs < 60 {
        format!("{}.{:03}s", secs, millis)
    } else {
        let mins = secs / 60;
        let secs = secs % 60;
        format!("{}m {}s", mins, secs)
    }
}
