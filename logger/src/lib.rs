use std::fs::File;

use colored::Colorize;
use common::env_config::Config;

/// Installs the global logger: colored lines on stdout when console logging
/// is enabled, plain copies of every line in `config.log_file`.
pub fn setup(config: &Config) -> Result<(), fern::InitError> {
    File::create(&config.log_file).map_err(fern::InitError::Io)?;

    let level = if config.is_production() {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Debug
    };

    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Utc::now().format("[%Y-%m-%dT%H:%M:%S%.3fZ]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .chain(fern::log_file(&config.log_file)?);

    let mut dispatch = fern::Dispatch::new()
        .level(level)
        .level_for("sqlx", log::LevelFilter::Warn)
        .level_for("redis", log::LevelFilter::Warn)
        .chain(file);

    if config.console_logging_enabled {
        let console = fern::Dispatch::new()
            .format(|out, message, record| {
                let color = match record.level() {
                    log::Level::Info => "green",
                    log::Level::Warn => "yellow",
                    log::Level::Error => "red",
                    log::Level::Debug => "magenta",
                    log::Level::Trace => "bright black",
                };
                out.finish(format_args!(
                    "{}[{}][{}] {}",
                    chrono::Local::now().format("[%H:%M:%S]"),
                    record.target(),
                    record.level().to_string().color(color),
                    message
                ))
            })
            .chain(std::io::stdout());
        dispatch = dispatch.chain(console);
    }

    dispatch.apply()?;
    Ok(())
}
