// Logging setup
//
// env_logger with the engine's own line format:
//   <file>(<line>) <Level>: <message>
// coloured per level on the terminal, plain when written to a log file.

use crate::config::DebugConfig;
use env_logger::{Builder, Target};
use log::{Level, LevelFilter};
use std::fs::File;
use std::io::Write;

const RESET: &str = "\x1b[0;0m";

fn level_colour(level: Level) -> &'static str {
    match level {
        Level::Trace | Level::Debug => "\x1b[0;34m",
        Level::Info => "\x1b[0;37m",
        Level::Warn => "\x1b[0;33m",
        Level::Error => "\x1b[0;31m",
    }
}

fn level_label(level: Level) -> &'static str {
    match level {
        Level::Trace => "Trace",
        Level::Debug => "Debug",
        Level::Info => "Info",
        Level::Warn => "Warning",
        Level::Error => "Error",
    }
}

fn format_line(record: &log::Record, colour: bool) -> String {
    let file = record.file().unwrap_or_else(|| record.target());
    let line = record.line().unwrap_or(0);
    let label = level_label(record.level());

    if colour {
        format!(
            "{}{}({}) {}: {}{}",
            level_colour(record.level()),
            file,
            line,
            label,
            record.args(),
            RESET
        )
    } else {
        format!("{}({}) {}: {}", file, line, label, record.args())
    }
}

/// The configured log file, truncated, and whether lines get terminal
/// colours. An unopenable file falls back to coloured stderr.
fn open_sink(config: &DebugConfig) -> (Option<File>, bool) {
    let file = config.log_file.as_ref().and_then(|path| {
        File::create(path)
            .map_err(|e| eprintln!("Could not open log file {:?}: {}", path, e))
            .ok()
    });
    let colour = file.is_none();
    (file, colour)
}

/// Initialise the global logger. `RUST_LOG` still overrides the configured
/// level.
pub fn init(config: &DebugConfig) {
    let level = config
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);

    let mut builder = Builder::new();
    builder.filter_level(level);
    builder.parse_default_env();

    let (file, colour) = open_sink(config);
    if let Some(file) = file {
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.format(move |buf, record| writeln!(buf, "{}", format_line(record, colour)));

    // A second init (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(level: Level, colour: bool) -> String {
        format_line(
            &log::Record::builder()
                .args(format_args!("swap chain ready"))
                .level(level)
                .file(Some("src/backend/swapchain.rs"))
                .line(Some(42))
                .build(),
            colour,
        )
    }

    #[test]
    fn plain_line_layout() {
        assert_eq!(
            render(Level::Warn, false),
            "src/backend/swapchain.rs(42) Warning: swap chain ready"
        );
    }

    #[test]
    fn coloured_lines_are_wrapped_and_reset() {
        let line = render(Level::Error, true);
        assert!(line.starts_with("\x1b[0;31m"));
        assert!(line.ends_with(RESET));
        assert!(line.contains("Error: swap chain ready"));
    }

    #[test]
    fn each_level_has_its_colour() {
        assert_eq!(level_colour(Level::Debug), "\x1b[0;34m");
        assert_eq!(level_colour(Level::Info), "\x1b[0;37m");
        assert_eq!(level_colour(Level::Warn), "\x1b[0;33m");
        assert_eq!(level_colour(Level::Error), "\x1b[0;31m");
    }

    #[test]
    fn stderr_sink_is_coloured() {
        let config = DebugConfig {
            log_file: None,
            ..Default::default()
        };
        let (file, colour) = open_sink(&config);
        assert!(file.is_none());
        assert!(colour);
    }

    #[test]
    fn log_file_is_truncated_and_plain() {
        let path = std::env::temp_dir().join(format!("cube-realms-log-{}.txt", std::process::id()));
        std::fs::write(&path, "previous run\n").unwrap();

        let config = DebugConfig {
            log_file: Some(path.clone()),
            ..Default::default()
        };
        let (file, colour) = open_sink(&config);

        assert!(file.is_some());
        assert!(!colour);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        drop(file);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unopenable_log_file_falls_back_to_stderr() {
        let config = DebugConfig {
            log_file: Some(std::env::temp_dir().join("cube-realms-missing-dir").join("engine.log")),
            ..Default::default()
        };
        let (file, colour) = open_sink(&config);
        assert!(file.is_none());
        assert!(colour);
    }
}
