use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, TermLogger, TerminalMode, WriteLogger,
};
use std::path::Path;

const MAX_LOG_SIZE_BYTES: u64 = 5 * 1024 * 1024;

fn trim_log_file_if_oversized(log_path: &Path, max_log_size: u64) {
    if let Ok(metadata) = std::fs::metadata(log_path)
        && metadata.len() > max_log_size
        && let Ok(contents) = std::fs::read(log_path)
    {
        let half = contents.len() / 2;
        let keep_from = contents[half..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(half, |pos| half + pos + 1);
        let _ = std::fs::write(log_path, &contents[keep_from..]);
    }
}

/// Terminal logger on stderr (subprocess output owns stdout) plus a debug
/// file log under the data directory.
pub fn init_logging(debug_enabled: bool, log_path: &Path) {
    trim_log_file_if_oversized(log_path, MAX_LOG_SIZE_BYTES);

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("djvupress")
        .build();

    let term_level = if debug_enabled {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let term_logger = TermLogger::new(
        term_level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );

    let file_logger = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .ok()
        .map(|file| WriteLogger::new(LevelFilter::Debug, config, file));

    if let Some(file_logger) = file_logger {
        let _ = CombinedLogger::init(vec![term_logger, file_logger]);
    } else {
        let _ = CombinedLogger::init(vec![term_logger]);
    }
}
