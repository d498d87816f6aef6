//! Plain-text log export.
//!
//! The rendering is consumed by "download log" features and must stay
//! byte-exact:
//!
//! ```text
//! Command: {command}
//! Execution Time: {execution_time}
//! Status: {status}
//!
//! Standard Output:
//! {stdout}
//!
//! Standard Error:
//! {stderr}
//! ```

use std::fmt::Display;

use chrono::{DateTime, TimeZone, Timelike};

use crate::types::Execution;

/// Render an execution as a downloadable text log, with the execution
/// time shown as wall-clock time in `tz`.
pub fn render_log<Tz>(command: &str, execution: &Execution, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "Command: {}\nExecution Time: {}\nStatus: {}\n\nStandard Output:\n{}\n\nStandard Error:\n{}\n",
        command,
        format_execution_time(&execution.execution_time.with_timezone(tz)),
        execution.status,
        execution.stdout,
        execution.stderr,
    )
}

/// File name offered for a downloaded log.
pub fn log_file_name(execution: &Execution) -> String {
    format!("job_{}_execution_{}.txt", execution.job_id, execution.id)
}

/// `YYYY-MM-DD HH:MM:SS`, with `.ffffff` only when microseconds are non-zero.
fn format_execution_time<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if time.nanosecond() / 1_000 == 0 {
        time.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        time.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionStatus;
    use chrono::{FixedOffset, Utc};

    fn execution(time: DateTime<Utc>) -> Execution {
        Execution {
            id: 12,
            job_id: 5,
            execution_time: time,
            status: ExecutionStatus::Success,
            stdout: "hi\n".to_string(),
            stderr: String::new(),
        }
    }

    #[test]
    fn test_render_log_exact_template() {
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let log = render_log("echo hi", &execution(time), &Utc);

        assert_eq!(
            log,
            "Command: echo hi\n\
             Execution Time: 2024-01-01 00:00:00\n\
             Status: Success\n\
             \n\
             Standard Output:\n\
             hi\n\
             \n\
             \n\
             Standard Error:\n\
             \n"
        );
    }

    #[test]
    fn test_render_log_failed_with_stderr() {
        let time = Utc.with_ymd_and_hms(2023, 6, 15, 13, 45, 30).unwrap();
        let mut exec = execution(time);
        exec.status = ExecutionStatus::Failed;
        exec.stdout = String::new();
        exec.stderr = "boom".to_string();

        let log = render_log("false", &exec, &Utc);
        let lines: Vec<&str> = log.split('\n').collect();
        assert_eq!(
            lines,
            vec![
                "Command: false",
                "Execution Time: 2023-06-15 13:45:30",
                "Status: Failed",
                "",
                "Standard Output:",
                "",
                "",
                "Standard Error:",
                "boom",
                "",
            ]
        );
    }

    #[test]
    fn test_execution_time_microseconds() {
        let time = Utc
            .with_ymd_and_hms(2024, 2, 29, 23, 59, 59)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        assert_eq!(format_execution_time(&time), "2024-02-29 23:59:59.123456");

        let whole = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap();
        assert_eq!(format_execution_time(&whole), "2024-02-29 23:59:59");
    }

    #[test]
    fn test_render_log_in_offset_zone() {
        let time = Utc
            .with_ymd_and_hms(2023, 12, 31, 23, 30, 0)
            .unwrap()
            .with_nanosecond(5_000)
            .unwrap();
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();

        let log = render_log("echo hi", &execution(time), &plus_two);
        assert!(log.contains("\nExecution Time: 2024-01-01 01:30:00.000005\n"));

        let minus_five = FixedOffset::west_opt(5 * 3600).unwrap();
        let log = render_log("echo hi", &execution(time), &minus_five);
        assert!(log.contains("\nExecution Time: 2023-12-31 18:30:00.000005\n"));
    }

    #[test]
    fn test_log_file_name() {
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(log_file_name(&execution(time)), "job_5_execution_12.txt");
    }
}
