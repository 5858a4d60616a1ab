//! # Accounting Periods
//!
//! Calendar arithmetic for invoice and load confirmation periods.
//!
//! ## Period Nesting
//! ```text
//! ┌─────────────────────────── invoice (calendar month) ───────────────────┐
//! │ 2023-03-01                                                 2023-03-31  │
//! │                                                                        │
//! │  monthly LC, split 16:  [03-01 ........ 03-15][03-16 ........ 03-31]   │
//! │  weekly LC, Sunday:        ... [03-26 .. 04-01] → clipped to 03-31     │
//! │  daily LC:                      [03-28]                                │
//! └────────────────────────────────────────────────────────────────────────┘
//!
//! End-of-job invoices have no end date; nested windows are then only
//! clipped at the start.
//! ```

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::error::{CoreError, CoreResult};
use crate::types::{window_covers, LoadConfirmationFrequency};

/// A date range, inclusive on both ends. `end = None` is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl Period {
    pub fn closed(start: NaiveDate, end: NaiveDate) -> Self {
        Period {
            start,
            end: Some(end),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        window_covers(Some(self.start), self.end, date)
    }
}

/// A load confirmation window; always closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

// =============================================================================
// Calendar helpers
// =============================================================================

pub fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// Operating day a load belongs to.
///
/// ```text
/// cutoff 07:00, time out 2023-03-05 06:30 → 2023-03-04
/// cutoff 07:00, time out 2023-03-05 07:00 → 2023-03-05
/// no time out                             → load date
/// ```
pub fn effective_date(
    time_out: Option<NaiveDateTime>,
    load_date: NaiveDate,
    cutoff: Option<NaiveTime>,
) -> NaiveDate {
    let Some(time_out) = time_out else {
        return load_date;
    };
    let day = time_out.date();
    match cutoff {
        Some(cutoff) if time_out.time() < cutoff => day.pred_opt().unwrap_or(day),
        _ => day,
    }
}

// =============================================================================
// Invoice period
// =============================================================================

/// Calendar month containing the load date; open-ended for end-of-job
/// invoicing.
pub fn invoice_period(load_date: NaiveDate, end_of_job: bool) -> Period {
    Period {
        start: first_day_of_month(load_date),
        end: if end_of_job {
            None
        } else {
            Some(last_day_of_month(load_date))
        },
    }
}

// =============================================================================
// Load confirmation period
// =============================================================================

/// Policy fields that shape a batch load confirmation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcPolicy {
    pub frequency: LoadConfirmationFrequency,
    pub first_day_of_week: Weekday,
    pub first_day_of_month: u32,
}

impl Default for LcPolicy {
    fn default() -> Self {
        LcPolicy {
            frequency: LoadConfirmationFrequency::Monthly,
            first_day_of_week: Weekday::Sun,
            first_day_of_month: 1,
        }
    }
}

/// Unclipped window for the load date under the given policy.
pub fn frequency_window(load_date: NaiveDate, policy: &LcPolicy) -> LcPeriod {
    match policy.frequency {
        LoadConfirmationFrequency::Daily => LcPeriod {
            start: load_date,
            end: load_date,
        },
        LoadConfirmationFrequency::Weekly => {
            let days_back = (load_date.weekday().num_days_from_sunday() + 7
                - policy.first_day_of_week.num_days_from_sunday())
                % 7;
            let start = load_date - Duration::days(days_back as i64);
            LcPeriod {
                start,
                end: start + Duration::days(6),
            }
        }
        LoadConfirmationFrequency::Monthly => {
            let split = policy.first_day_of_month.clamp(1, 31);
            let month_start = first_day_of_month(load_date);
            let month_end = last_day_of_month(load_date);

            if load_date.day() >= split {
                LcPeriod {
                    start: load_date.with_day(split).unwrap_or(month_start),
                    end: month_end,
                }
            } else {
                let end_day = (split - 1).min(month_end.day());
                LcPeriod {
                    start: month_start,
                    end: load_date.with_day(end_day).unwrap_or(month_end),
                }
            }
        }
    }
}

/// Load confirmation window clipped to the parent invoice.
///
/// Fails when the load date lies outside the invoice period.
pub fn load_confirmation_period(
    load_date: NaiveDate,
    policy: &LcPolicy,
    invoice: &Period,
) -> CoreResult<LcPeriod> {
    if !invoice.contains(load_date) {
        return Err(CoreError::InvalidPeriod(format!(
            "load date {} is outside invoice period starting {}",
            load_date, invoice.start
        )));
    }

    let window = frequency_window(load_date, policy);
    let start = window.start.max(invoice.start);
    let end = match invoice.end {
        Some(invoice_end) => window.end.min(invoice_end),
        None => window.end,
    };
    Ok(LcPeriod { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn monthly(split: u32) -> LcPolicy {
        LcPolicy {
            first_day_of_month: split,
            ..LcPolicy::default()
        }
    }

    fn weekly() -> LcPolicy {
        LcPolicy {
            frequency: LoadConfirmationFrequency::Weekly,
            ..LcPolicy::default()
        }
    }

    #[test]
    fn test_month_bounds() {
        assert_eq!(last_day_of_month(d(2023, 2, 10)), d(2023, 2, 28));
        assert_eq!(last_day_of_month(d(2024, 2, 10)), d(2024, 2, 29));
        assert_eq!(last_day_of_month(d(2023, 12, 31)), d(2023, 12, 31));
        assert_eq!(first_day_of_month(d(2023, 12, 31)), d(2023, 12, 1));
    }

    #[test]
    fn test_invoice_period() {
        let p = invoice_period(d(2023, 3, 18), false);
        assert_eq!(p, Period::closed(d(2023, 3, 1), d(2023, 3, 31)));
        assert!(!p.contains(d(2023, 4, 1)));

        let eoj = invoice_period(d(2023, 3, 18), true);
        assert_eq!(eoj.start, d(2023, 3, 1));
        assert_eq!(eoj.end, None);
        assert!(eoj.contains(d(2024, 1, 1)));
    }

    #[test]
    fn test_monthly_split() {
        let invoice = invoice_period(d(2023, 3, 5), false);

        let early = load_confirmation_period(d(2023, 3, 5), &monthly(16), &invoice).unwrap();
        assert_eq!((early.start, early.end), (d(2023, 3, 1), d(2023, 3, 15)));

        let late = load_confirmation_period(d(2023, 3, 18), &monthly(16), &invoice).unwrap();
        assert_eq!((late.start, late.end), (d(2023, 3, 16), d(2023, 3, 31)));

        let whole = load_confirmation_period(d(2023, 3, 18), &monthly(1), &invoice).unwrap();
        assert_eq!((whole.start, whole.end), (d(2023, 3, 1), d(2023, 3, 31)));
    }

    #[test]
    fn test_monthly_split_past_month_end() {
        let invoice = invoice_period(d(2023, 2, 20), false);
        let p = load_confirmation_period(d(2023, 2, 20), &monthly(31), &invoice).unwrap();
        assert_eq!((p.start, p.end), (d(2023, 2, 1), d(2023, 2, 28)));
    }

    #[test]
    fn test_weekly_default_sunday() {
        let w = frequency_window(d(2022, 11, 24), &weekly());
        assert_eq!((w.start, w.end), (d(2022, 11, 20), d(2022, 11, 26)));

        // Load date on the first day of week starts the window
        let w = frequency_window(d(2022, 11, 20), &weekly());
        assert_eq!(w.start, d(2022, 11, 20));
    }

    #[test]
    fn test_weekly_custom_first_day() {
        let policy = LcPolicy {
            first_day_of_week: Weekday::Mon,
            ..weekly()
        };
        let w = frequency_window(d(2022, 11, 24), &policy);
        assert_eq!((w.start, w.end), (d(2022, 11, 21), d(2022, 11, 27)));
    }

    #[test]
    fn test_weekly_clipped_to_invoice() {
        let invoice = invoice_period(d(2023, 3, 28), false);
        let p = load_confirmation_period(d(2023, 3, 28), &weekly(), &invoice).unwrap();
        assert_eq!(p.start, d(2023, 3, 26));
        assert_eq!(p.end, d(2023, 3, 31));

        let invoice = invoice_period(d(2023, 3, 2), false);
        let p = load_confirmation_period(d(2023, 3, 2), &weekly(), &invoice).unwrap();
        assert_eq!(p.start, d(2023, 3, 1));
    }

    #[test]
    fn test_open_invoice_leaves_end_unclipped() {
        let invoice = invoice_period(d(2023, 3, 28), true);
        let p = load_confirmation_period(d(2023, 3, 28), &weekly(), &invoice).unwrap();
        assert_eq!(p.end, d(2023, 4, 1));
    }

    #[test]
    fn test_daily() {
        let policy = LcPolicy {
            frequency: LoadConfirmationFrequency::Daily,
            ..LcPolicy::default()
        };
        let invoice = invoice_period(d(2023, 3, 28), false);
        let p = load_confirmation_period(d(2023, 3, 28), &policy, &invoice).unwrap();
        assert_eq!((p.start, p.end), (d(2023, 3, 28), d(2023, 3, 28)));
    }

    #[test]
    fn test_load_date_outside_invoice() {
        let invoice = invoice_period(d(2023, 3, 1), false);
        let err = load_confirmation_period(d(2023, 4, 2), &weekly(), &invoice).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPeriod(_)));
    }

    #[test]
    fn test_effective_date() {
        let cutoff = NaiveTime::from_hms_opt(7, 0, 0);
        let early = d(2023, 3, 5).and_hms_opt(6, 30, 0);
        let late = d(2023, 3, 5).and_hms_opt(7, 0, 0);

        assert_eq!(effective_date(early, d(2023, 3, 5), cutoff), d(2023, 3, 4));
        assert_eq!(effective_date(late, d(2023, 3, 5), cutoff), d(2023, 3, 5));
        assert_eq!(effective_date(early, d(2023, 3, 5), None), d(2023, 3, 5));
        assert_eq!(effective_date(None, d(2023, 3, 9), cutoff), d(2023, 3, 9));
    }
}
