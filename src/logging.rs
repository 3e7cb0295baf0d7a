use flexi_logger::{opt_format, Logger};

/// Initializes logging for binaries and long-running experiments.
///
/// Library code only emits through the `log` facade; embedding applications
/// may install any logger they like instead of calling this.
pub fn setup_logging() {
    Logger::try_with_env_or_str("info") // Use the log level from the environment or fallback to "info"
        .unwrap()
        .format(opt_format)
        .start()
        .unwrap();
}
