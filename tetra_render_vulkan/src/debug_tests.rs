use super::*;
use serial_test::serial;

#[test]
fn test_severity_mapping() {
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    assert_eq!(severity_of(S::ERROR), LogSeverity::Error);
    assert_eq!(severity_of(S::WARNING), LogSeverity::Warn);
    assert_eq!(severity_of(S::INFO), LogSeverity::Debug);
    assert_eq!(severity_of(S::VERBOSE), LogSeverity::Trace);
    assert_eq!(severity_of(S::WARNING | S::ERROR), LogSeverity::Error);
}

#[test]
fn test_message_type_names() {
    use vk::DebugUtilsMessageTypeFlagsEXT as T;
    assert_eq!(message_type_name(T::VALIDATION), "Validation");
    assert_eq!(message_type_name(T::PERFORMANCE), "Performance");
    assert_eq!(message_type_name(T::GENERAL), "General");
}

#[test]
#[serial]
fn test_report_message_counts_by_severity() {
    reset_validation_stats();
    report_message(LogSeverity::Error, "Validation", "VUID-1", "bad");
    report_message(LogSeverity::Warn, "Performance", "PERF-1", "slow");
    report_message(LogSeverity::Warn, "Performance", "PERF-1", "slow");
    report_message(LogSeverity::Trace, "General", "loader", "hello");

    let stats = get_validation_stats();
    assert_eq!(stats, ValidationStats { errors: 1, warnings: 2, info: 0, verbose: 1 });
    assert_eq!(stats.total(), 4);

    reset_validation_stats();
    assert_eq!(get_validation_stats().total(), 0);
}

#[test]
#[serial]
fn test_repeated_messages_are_grouped() {
    reset_validation_stats();
    assert_eq!(track_message("VUID-2"), 1);
    assert_eq!(track_message("VUID-2"), 2);
    assert_eq!(track_message("VUID-3"), 1);
    reset_validation_stats();
    assert_eq!(track_message("VUID-2"), 1);
}
