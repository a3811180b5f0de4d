//! CLI argument validation functions
//!
//! Value parsers for arguments clap cannot validate on its own.

use std::fs;
use std::path::PathBuf;

use crate::jobs::recurrence::DAY_NAMES;

/// Upper bound for `migrate --rollback`
const MAX_ROLLBACK_STEPS: u32 = 100;

/// Upper bound for `history --limit`
const MAX_HISTORY_LIMIT: i64 = 1000;

/// Validate that a file path is accessible (exists and is readable)
pub fn validate_config_file_path(path_str: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(format!("Configuration file does not exist: '{}'", path_str));
    }

    if !path.is_file() {
        return Err(format!("Configuration path is not a file: '{}'", path_str));
    }

    match fs::File::open(&path) {
        Ok(_) => Ok(path),
        Err(e) => Err(format!("Cannot read configuration file '{}': {}", path_str, e)),
    }
}

pub fn validate_rollback_steps(steps_str: &str) -> Result<u32, String> {
    let steps: u32 = steps_str
        .parse()
        .map_err(|_| format!("Rollback steps must be a number, got: '{}'", steps_str))?;

    if steps == 0 || steps > MAX_ROLLBACK_STEPS {
        return Err(format!(
            "Rollback steps must be between 1 and {}, got: {}",
            MAX_ROLLBACK_STEPS, steps
        ));
    }

    Ok(steps)
}

pub fn validate_history_limit(limit_str: &str) -> Result<i64, String> {
    let limit: i64 = limit_str
        .parse()
        .map_err(|_| format!("Limit must be a number, got: '{}'", limit_str))?;

    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(format!("Limit must be between 1 and {}", MAX_HISTORY_LIMIT));
    }

    Ok(limit)
}

/// Parses `mon,wed,fri` (or `daily`) into Sunday..Saturday flags.
///
/// Day names match on their first three letters, case-insensitively, so
/// `Monday` and `MON` are both accepted.
pub fn parse_days(days_str: &str) -> Result<[bool; 7], String> {
    if days_str.trim().eq_ignore_ascii_case("daily") {
        return Ok([true; 7]);
    }

    let mut days = [false; 7];
    for token in days_str.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let index = token
            .get(..3)
            .and_then(|prefix| DAY_NAMES.iter().position(|d| d.eq_ignore_ascii_case(prefix)))
            .ok_or_else(|| {
                format!("Unknown day '{}'. Use sun, mon, tue, wed, thu, fri, sat", token)
            })?;
        days[index] = true;
    }

    if !days.contains(&true) {
        return Err("At least one day is required".to_string());
    }

    Ok(days)
}

/// Parses `HH:MM` on a 24-hour clock.
///
/// Hours outside 0..=23 and minutes outside 0..=59 are clamped, as stored
/// schedules are.
pub fn parse_time_of_day(time_str: &str) -> Result<(i32, i32), String> {
    let invalid = || format!("Time must be HH:MM, got: '{}'", time_str);

    let (hour, minute) = time_str.trim().split_once(':').ok_or_else(invalid)?;
    let hour: i32 = hour.trim().parse().map_err(|_| invalid())?;
    let minute: i32 = minute.trim().parse().map_err(|_| invalid())?;

    Ok((hour.clamp(0, 23), minute.clamp(0, 59)))
}
