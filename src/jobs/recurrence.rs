//! Weekly recurrence and its trigger descriptor.
//!
//! A descriptor is exactly 11 ASCII characters: `HH`, `MM`, then one `Y`/`N`
//! flag per day from Sunday to Saturday. `"0930YNNNNNN"` is 09:30 on Sundays.
//! The descriptor is attached to every live trigger so the scheduler's
//! current state can be read back without consulting the store.

use std::fmt;

use crate::error::{AppError, AppResult};
use crate::models::Schedule;

pub const DESCRIPTOR_LEN: usize = 11;

/// Day abbreviations in Sunday..Saturday order, as understood by the cron backend.
pub const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Hour and minute in UTC plus Sunday..Saturday flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Recurrence {
    hour: u8,
    minute: u8,
    days: [bool; 7],
}

impl Recurrence {
    /// Builds a recurrence, clamping hour into 0..=23 and minute into 0..=59.
    pub fn new(hour: i64, minute: i64, days: [bool; 7]) -> Self {
        Self {
            hour: hour.clamp(0, 23) as u8,
            minute: minute.clamp(0, 59) as u8,
            days,
        }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn days(&self) -> [bool; 7] {
        self.days
    }

    pub fn has_any_day(&self) -> bool {
        self.days.iter().any(|d| *d)
    }

    pub fn encode(&self) -> String {
        let mut descriptor = format!("{:02}{:02}", self.hour, self.minute);
        descriptor.extend(self.days.iter().map(|d| if *d { 'Y' } else { 'N' }));
        descriptor
    }

    pub fn decode(descriptor: &str) -> AppResult<Self> {
        let invalid = |reason: String| AppError::validation("descriptor", reason);

        if descriptor.len() != DESCRIPTOR_LEN || !descriptor.is_ascii() {
            return Err(invalid(format!(
                "expected {} ASCII characters, got {:?}",
                DESCRIPTOR_LEN, descriptor
            )));
        }

        let (time, flags) = descriptor.split_at(4);
        if !time.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(format!("time part {:?} is not HHMM", time)));
        }
        // ASCII digits only, so both parses succeed.
        let hour: i64 = time[..2].parse().map_err(|_| invalid(time.to_string()))?;
        let minute: i64 = time[2..].parse().map_err(|_| invalid(time.to_string()))?;

        let mut days = [false; 7];
        for (i, flag) in flags.chars().enumerate() {
            days[i] = match flag.to_ascii_uppercase() {
                'Y' => true,
                'N' => false,
                other => {
                    return Err(invalid(format!(
                        "day flag {:?} for {} is not Y or N",
                        other, DAY_NAMES[i]
                    )));
                }
            };
        }

        Ok(Self::new(hour, minute, days))
    }

    /// Six-field cron expression (`sec min hour dom month dow`), or `None`
    /// when no day is selected.
    pub fn cron_expression(&self) -> Option<String> {
        let days: Vec<&str> = DAY_NAMES
            .iter()
            .zip(self.days)
            .filter_map(|(name, on)| on.then_some(*name))
            .collect();

        if days.is_empty() {
            return None;
        }

        Some(format!("0 {} {} * * {}", self.minute, self.hour, days.join(",")))
    }
}

impl From<&Schedule> for Recurrence {
    fn from(schedule: &Schedule) -> Self {
        Self::new(schedule.hour as i64, schedule.minute as i64, schedule.days())
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days: Vec<&str> = DAY_NAMES
            .iter()
            .zip(self.days)
            .filter_map(|(name, on)| on.then_some(*name))
            .collect();
        let days = if days.is_empty() {
            "never".to_string()
        } else {
            days.join(",")
        };
        write!(f, "{:02}:{:02} UTC on {}", self.hour, self.minute, days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(hour in 0i64..24, minute in 0i64..60, days in any::<[bool; 7]>()) {
            let recurrence = Recurrence::new(hour, minute, days);
            let encoded = recurrence.encode();
            prop_assert_eq!(encoded.len(), DESCRIPTOR_LEN);
            prop_assert_eq!(Recurrence::decode(&encoded).unwrap(), recurrence);
        }

        #[test]
        fn prop_wrong_length_is_rejected(s in "[0-9YN]{0,10}|[0-9YN]{12,20}") {
            prop_assert!(Recurrence::decode(&s).is_err());
        }
    }

    #[test]
    fn test_decode_sunday_morning() {
        let recurrence = Recurrence::decode("0930YNNNNNN").unwrap();
        assert_eq!(recurrence.hour(), 9);
        assert_eq!(recurrence.minute(), 30);
        assert_eq!(recurrence.days(), [true, false, false, false, false, false, false]);
    }

    #[test]
    fn test_encode_is_fixed_width() {
        let recurrence = Recurrence::new(7, 5, [false, true, false, true, false, true, false]);
        assert_eq!(recurrence.encode(), "0705NYNYNYN");
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let recurrence = Recurrence::new(25, -3, [true; 7]);
        assert_eq!((recurrence.hour(), recurrence.minute()), (23, 0));

        let decoded = Recurrence::decode("9999NNNNNNY").unwrap();
        assert_eq!((decoded.hour(), decoded.minute()), (23, 59));
    }

    #[test]
    fn test_day_flags_are_case_insensitive() {
        let recurrence = Recurrence::decode("1200ynnnnnY").unwrap();
        assert_eq!(recurrence.days(), [true, false, false, false, false, false, true]);
    }

    #[test]
    fn test_malformed_descriptors_are_validation_errors() {
        for descriptor in ["", "0930YNNNNN", "0930YNNNNNNN", "09a0YNNNNNN", "0930YNXNNNN", "0930YNNNNNé"] {
            let err = Recurrence::decode(descriptor).unwrap_err();
            assert!(
                matches!(err, AppError::Validation { ref field, .. } if field == "descriptor"),
                "{:?} should be rejected, got {:?}",
                descriptor,
                err
            );
        }
    }

    #[test]
    fn test_cron_expression_uses_day_names() {
        let recurrence = Recurrence::new(9, 30, [false, true, false, false, false, true, false]);
        assert_eq!(recurrence.cron_expression().as_deref(), Some("0 30 9 * * Mon,Fri"));
    }

    #[test]
    fn test_no_days_has_no_cron_expression() {
        let recurrence = Recurrence::new(9, 30, [false; 7]);
        assert!(!recurrence.has_any_day());
        assert_eq!(recurrence.cron_expression(), None);
        assert_eq!(recurrence.to_string(), "09:30 UTC on never");
    }

    #[test]
    fn test_from_schedule() {
        let schedule = Schedule {
            id: 1,
            job_id: 1,
            sunday: false,
            monday: true,
            tuesday: false,
            wednesday: false,
            thursday: false,
            friday: false,
            saturday: false,
            hour: 9,
            minute: 0,
            enabled: true,
        };
        assert_eq!(Recurrence::from(&schedule).encode(), "0900NYNNNNN");
    }
}
