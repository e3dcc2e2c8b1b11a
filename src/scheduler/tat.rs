//! Turnaround-time budgets.
//!
//! A budget is derived from the file type and the declared audio length:
//! fixed-duration files get a flat 90 minutes overall, everything else gets
//! first-review at 0.5x, second-review at 1.5x and overall at 2x the length.

use crate::error::{DispatchError, Result};
use crate::scheduler::FileType;

/// Overall budget for fixed-duration file types, in seconds.
pub const FIXED_OVERALL_SECS: u64 = 90 * 60;

/// Longest declared length accepted, so that every budget fits in a `u64`.
pub const MAX_DURATION_SECS: u64 = u64::MAX / 2;

/// Rendered in place of a budget that does not apply.
pub const NOT_APPLICABLE: &str = "N/A";

/// Time budgets in whole seconds. `None` means not applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    pub fr_tat: Option<u64>,
    pub sv_tat: Option<u64>,
    pub overall_tat: u64,
}

impl TimeBudget {
    pub fn compute(file_type: FileType, total_seconds: u64) -> Self {
        if file_type.is_fixed_duration() {
            return Self {
                fr_tat: None,
                sv_tat: None,
                overall_tat: FIXED_OVERALL_SECS,
            };
        }

        Self {
            fr_tat: Some(total_seconds / 2),
            sv_tat: Some(total_seconds.saturating_add(total_seconds / 2)),
            overall_tat: total_seconds.saturating_mul(2),
        }
    }

    pub fn fr(&self) -> String {
        format_hms(self.fr_tat)
    }

    pub fn sv(&self) -> String {
        format_hms(self.sv_tat)
    }

    pub fn overall(&self) -> String {
        format_hms(Some(self.overall_tat))
    }

    /// Multi-line summary used in assignment records and the TAT command.
    pub fn describe(&self) -> String {
        format!(
            "FR TAT: `{}`\nSV TAT: `{}`\nOverall TAT: `{}`",
            self.fr(),
            self.sv(),
            self.overall()
        )
    }
}

/// Parses `HH:MM:SS` or `MM:SS` into seconds.
///
/// The leading component may be any size up to [`MAX_DURATION_SECS`] in
/// total; trailing minute/second components must be below 60. Signs, blanks
/// and extra components are rejected.
pub fn parse_duration(text: &str) -> Result<u64> {
    let invalid = || DispatchError::InvalidDuration(text.to_string());

    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() != 2 && parts.len() != 3 {
        return Err(invalid());
    }

    let mut values = Vec::with_capacity(parts.len());
    for part in &parts {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        values.push(part.parse::<u64>().map_err(|_| invalid())?);
    }

    if values[1..].iter().any(|&v| v >= 60) {
        return Err(invalid());
    }

    let (h, m, s) = match values.as_slice() {
        [m, s] => (0, *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return Err(invalid()),
    };

    h.checked_mul(3600)
        .and_then(|h| m.checked_mul(60).and_then(|m| h.checked_add(m)))
        .and_then(|hm| hm.checked_add(s))
        .filter(|&total| total <= MAX_DURATION_SECS)
        .ok_or_else(invalid)
}

/// Renders seconds as `HH:MM:SS`; zero and not-applicable render as "N/A".
pub fn format_hms(seconds: Option<u64>) -> String {
    match seconds {
        None | Some(0) => NOT_APPLICABLE.to_string(),
        Some(total) => format!(
            "{:02}:{:02}:{:02}",
            total / 3600,
            (total % 3600) / 60,
            total % 60
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_budget_for_one_hour() {
        let ft: FileType = "QUARTR BATCH FILE".parse().unwrap();
        let budget = TimeBudget::compute(ft, 3600);
        assert_eq!(budget.fr(), "00:30:00");
        assert_eq!(budget.sv(), "01:30:00");
        assert_eq!(budget.overall(), "02:00:00");
    }

    #[test]
    fn fixed_budget_ignores_length() {
        for secs in [0, 60, 3600, 36_000] {
            let budget = TimeBudget::compute(FileType::Hp, secs);
            assert_eq!(budget.overall(), "01:30:00");
            assert_eq!(budget.fr(), "N/A");
            assert_eq!(budget.sv(), "N/A");
        }
    }

    #[test]
    fn odd_lengths_round_down() {
        let budget = TimeBudget::compute(FileType::AieraLive, 61);
        assert_eq!(budget.fr_tat, Some(30));
        assert_eq!(budget.sv_tat, Some(91));
        assert_eq!(budget.overall_tat, 122);
    }

    #[test]
    fn parse_accepts_both_shapes() {
        assert_eq!(parse_duration("01:30:00").unwrap(), 5400);
        assert_eq!(parse_duration("05:00").unwrap(), 300);
        assert_eq!(parse_duration(" 90:00 ").unwrap(), 5400);
        assert_eq!(parse_duration("100:00:01").unwrap(), 360_001);
    }

    #[test]
    fn parse_rejects_bad_input() {
        for bad in ["abc", "1:2:3:4", "", "10", "-1:00", "01::00", "1:60", "1:00:75", "+5:00"] {
            assert!(
                matches!(parse_duration(bad), Err(DispatchError::InvalidDuration(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn parse_rejects_lengths_too_large_to_budget() {
        let err = parse_duration("5000000000000000:00:00").unwrap_err();
        assert!(matches!(err, DispatchError::InvalidDuration(_)));
        assert!(matches!(
            parse_duration("99999999999999999999:00:00"),
            Err(DispatchError::InvalidDuration(_))
        ));
    }

    #[test]
    fn largest_accepted_length_budgets_without_overflow() {
        let budget = TimeBudget::compute(FileType::QuartrBatch, MAX_DURATION_SECS);
        assert_eq!(budget.fr_tat, Some(MAX_DURATION_SECS / 2));
        assert_eq!(budget.sv_tat, Some(MAX_DURATION_SECS + MAX_DURATION_SECS / 2));
        assert_eq!(budget.overall_tat, MAX_DURATION_SECS * 2);

        let budget = TimeBudget::compute(FileType::AieraBatch, u64::MAX);
        assert_eq!(budget.overall_tat, u64::MAX);
    }

    #[test]
    fn invalid_duration_message_names_the_limit() {
        let err = parse_duration("1:75").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid duration \"1:75\", expected HH:MM:SS or MM:SS with minutes and seconds below 60"
        );
    }

    #[test]
    fn format_renders_sentinel_for_zero() {
        assert_eq!(format_hms(Some(0)), "N/A");
        assert_eq!(format_hms(None), "N/A");
        assert_eq!(format_hms(Some(3661)), "01:01:01");
        assert_eq!(format_hms(Some(360_000)), "100:00:00");
    }
}
