use helios::config::LoggingConfig;
use helios::logging::{LogContext, get_logger, get_logger_with_context, init_logging};

#[test]
fn file_logging_initializes_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoggingConfig {
        file: dir.path().join("helios.log").to_string_lossy().to_string(),
        console_output: false,
        ..LoggingConfig::default()
    };

    init_logging(&config).unwrap();
    // second call is a no-op even with a different config
    init_logging(&LoggingConfig::default()).unwrap();

    get_logger("test").info("file logging works");
    let logger = get_logger_with_context(
        LogContext::new("poller").with_session_id("run-1".to_string()),
    );
    logger.warn("with context");
    assert_eq!(logger.component(), "poller");
}
