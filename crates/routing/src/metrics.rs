//! Metric names recorded through the `metrics` facade.
//!
//! Nothing is exported unless the binary installs a recorder.

/// Inbound events, labelled by `kind` (response, command, message).
pub const EVENTS_INGESTED_TOTAL: &str = "tunegrab_events_ingested_total";
/// Button presses that were not queued, labelled by `reason`.
pub const RESPONSES_DROPPED_TOTAL: &str = "tunegrab_responses_dropped_total";
/// Handler tasks that returned an error.
pub const HANDLER_ERRORS_TOTAL: &str = "tunegrab_handler_errors_total";
/// Finished choice waits, labelled by `outcome` (matched, timeout, canceled, busy).
pub const CHOICE_OUTCOMES_TOTAL: &str = "tunegrab_choice_outcomes_total";
/// Stray presses discarded while waiting for a choice.
pub const STRAY_RESPONSES_TOTAL: &str = "tunegrab_stray_responses_total";
/// Finished deadline-bound tasks, labelled by `outcome`.
pub const TASK_OUTCOMES_TOTAL: &str = "tunegrab_task_outcomes_total";
/// Deadline-bound task duration in seconds.
pub const TASK_DURATION_SECONDS: &str = "tunegrab_task_duration_seconds";
