//! Cron expression evaluation.
//!
//! Accepted grammar:
//!
//! - five fields `minute hour day-of-month month day-of-week`, or six with
//!   a leading `second` field
//! - nicknames `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`,
//!   `@midnight`, `@hourly`
//! - per field: `*`, `N`, `A-B`, `*/S`, `A-B/S`, `N/S` and comma lists
//! - month and weekday names (`JAN`, `mon`), weekday `7` meaning Sunday,
//!   weekday ranges that wrap (`FRI-MON`)
//!
//! When both day-of-month and day-of-week are restricted (neither starts
//! with `*`), a time matches if either day field matches.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use cron::Schedule;

use crate::error::CronError;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Longest length of each month, leap years included.
const MAX_MONTH_DAYS: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

struct Field {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const SECOND: Field = Field {
    name: "second",
    min: 0,
    max: 59,
    names: &[],
};

const MINUTE: Field = Field {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
};

const HOUR: Field = Field {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
};

const DAY_OF_MONTH: Field = Field {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
};

const MONTH: Field = Field {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
};

const DAY_OF_WEEK: Field = Field {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &WEEKDAY_NAMES,
};

impl Field {
    fn is_weekday(&self) -> bool {
        self.name == DAY_OF_WEEK.name
    }

    /// Largest value `*` covers. Sunday is only counted once.
    fn last(&self) -> u32 {
        if self.is_weekday() { 6 } else { self.max }
    }

    fn all(&self) -> BTreeSet<u32> {
        (self.min..=self.last()).collect()
    }

    fn value(&self, text: &str) -> Result<u32, String> {
        let value = match text.parse::<u32>() {
            Ok(value) => value,
            Err(_) => self
                .names
                .iter()
                .position(|name| name.eq_ignore_ascii_case(text))
                .map(|index| index as u32 + self.min)
                .ok_or_else(|| format!("invalid {} value '{}'", self.name, text))?,
        };

        if value < self.min || value > self.max {
            return Err(format!(
                "{} value {} out of range {}-{}",
                self.name, value, self.min, self.max
            ));
        }
        Ok(value)
    }

    fn step(&self, text: &str) -> Result<usize, String> {
        let step: u32 = text
            .parse()
            .map_err(|_| format!("invalid step '{}' in {} field", text, self.name))?;
        let span = self.last() - self.min + 1;
        if step == 0 || step > span {
            return Err(format!(
                "{} step {} out of range 1-{}",
                self.name, step, span
            ));
        }
        Ok(step as usize)
    }

    fn parse(&self, text: &str) -> Result<BTreeSet<u32>, String> {
        let mut values = BTreeSet::new();
        for item in text.split(',') {
            if item.is_empty() {
                return Err(format!("empty list item in {} field '{}'", self.name, text));
            }
            values.extend(self.parse_item(item)?);
        }

        if self.is_weekday() && values.remove(&7) {
            values.insert(0);
        }
        if values.is_empty() {
            return Err(format!("{} field '{}' matches nothing", self.name, text));
        }
        Ok(values)
    }

    fn parse_item(&self, item: &str) -> Result<Vec<u32>, String> {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, self.step(step)?),
            None => (item, 1),
        };

        let sequence: Vec<u32> = if range == "*" {
            self.all().into_iter().collect()
        } else if let Some((start, end)) = range.split_once('-') {
            let (start, end) = (self.value(start)?, self.value(end)?);
            if start <= end {
                (start..=end).collect()
            } else if self.is_weekday() {
                (start..=6).chain(0..=end).collect()
            } else {
                return Err(format!(
                    "{} range {}-{} has start after end",
                    self.name, start, end
                ));
            }
        } else {
            let start = self.value(range)?;
            if item.contains('/') {
                let start = if self.is_weekday() && start == 7 { 0 } else { start };
                (start..=self.last()).collect()
            } else {
                vec![start]
            }
        };

        Ok(sequence.into_iter().step_by(step).collect())
    }

    /// Render a value set in the `cron` crate's syntax.
    fn render(&self, values: &BTreeSet<u32>) -> String {
        if *values == self.all() {
            return "*".to_string();
        }
        values
            .iter()
            .map(|value| {
                if self.is_weekday() {
                    WEEKDAY_NAMES[*value as usize].to_string()
                } else {
                    value.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn expand_nickname(text: &str) -> Option<&'static str> {
    match text.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => Some("0 0 1 1 *"),
        "@monthly" => Some("0 0 1 * *"),
        "@weekly" => Some("0 0 * * 0"),
        "@daily" | "@midnight" => Some("0 0 * * *"),
        "@hourly" => Some("0 * * * *"),
        _ => None,
    }
}

/// A parsed, validated cron expression.
#[derive(Debug, Clone)]
pub struct CronExpression {
    source: String,
    /// One schedule, or two when the day fields combine by union.
    schedules: Vec<Schedule>,
}

impl CronExpression {
    /// Parse and validate an expression.
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let invalid = |reason: String| CronError::InvalidExpression {
            expr: expr.to_string(),
            reason,
        };

        let trimmed = expr.trim();
        let expanded = if trimmed.starts_with('@') {
            expand_nickname(trimmed).ok_or_else(|| invalid(format!("unknown nickname '{}'", trimmed)))?
        } else {
            trimmed
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        let (second, fields) = match fields.len() {
            5 => ("0", &fields[..]),
            6 => (fields[0], &fields[1..]),
            n => return Err(invalid(format!("expected 5 or 6 fields, found {}", n))),
        };

        let seconds = SECOND.parse(second).map_err(&invalid)?;
        let minutes = MINUTE.parse(fields[0]).map_err(&invalid)?;
        let hours = HOUR.parse(fields[1]).map_err(&invalid)?;
        let days = DAY_OF_MONTH.parse(fields[2]).map_err(&invalid)?;
        let months = MONTH.parse(fields[3]).map_err(&invalid)?;
        let weekdays = DAY_OF_WEEK.parse(fields[4]).map_err(&invalid)?;

        let days_restricted = !fields[2].starts_with('*');
        let weekdays_restricted = !fields[4].starts_with('*');
        let days_possible = months.iter().any(|month| {
            days.iter()
                .any(|day| *day <= MAX_MONTH_DAYS[(*month - 1) as usize])
        });

        let time = format!(
            "{} {} {}",
            SECOND.render(&seconds),
            MINUTE.render(&minutes),
            HOUR.render(&hours)
        );
        let month = MONTH.render(&months);
        let line = |day: &str, weekday: &str| format!("{} {} {} {}", time, day, month, weekday);

        let lines = match (days_restricted, weekdays_restricted) {
            (true, true) => {
                let mut lines = vec![line("*", &DAY_OF_WEEK.render(&weekdays))];
                if days_possible {
                    lines.push(line(&DAY_OF_MONTH.render(&days), "*"));
                }
                lines
            }
            (true, false) if !days_possible => {
                return Err(invalid(
                    "day-of-month never occurs in the selected months".to_string(),
                ));
            }
            _ => vec![line(
                &DAY_OF_MONTH.render(&days),
                &DAY_OF_WEEK.render(&weekdays),
            )],
        };

        let schedules = lines
            .iter()
            .map(|line| Schedule::from_str(line).map_err(|e| invalid(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: expr.to_string(),
            schedules,
        })
    }

    /// The text this expression was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Smallest matching time strictly after `from`, in `from`'s zone.
    pub fn next_after<Tz: TimeZone>(&self, from: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedules
            .iter()
            .filter_map(|schedule| schedule.after(from).next())
            .min()
    }

    /// Up to `count` successive fire times after `from`.
    pub fn upcoming<Tz: TimeZone>(&self, from: &DateTime<Tz>, count: usize) -> Vec<DateTime<Tz>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = from.clone();
        while times.len() < count {
            match self.next_after(&cursor) {
                Some(next) => {
                    cursor = next.clone();
                    times.push(next);
                }
                None => break,
            }
        }
        times
    }
}

impl FromStr for CronExpression {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Check whether `expr` is a supported cron expression.
pub fn validate(expr: &str) -> bool {
    CronExpression::parse(expr).is_ok()
}

/// Smallest time strictly after `from` matching `expr`.
pub fn next_fire_time<Tz: TimeZone>(
    expr: &str,
    from: &DateTime<Tz>,
) -> Result<DateTime<Tz>, CronError> {
    CronExpression::parse(expr)?
        .next_after(from)
        .ok_or_else(|| CronError::NoUpcomingFire(expr.to_string()))
}

#[cfg(test)]
#[path = "cron_expr_tests.rs"]
mod tests;
