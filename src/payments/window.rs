use chrono::{Datelike, NaiveDate};

use crate::config::LoanConfig;
use crate::errors::{LoanError, Result};
use crate::model::LoanInstallment;

use super::schedule::add_months;

/// first date that is no longer payable
///
/// The cutoff is `day_of_payment` in the month `max_allowed_due_month_count`
/// months after today's month. A day past the end of a short month
/// (e.g. the 30th in February) clamps to that month's last day.
pub fn payment_window_cutoff(today: NaiveDate, config: &LoanConfig) -> Result<NaiveDate> {
    let month_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).ok_or_else(|| {
        LoanError::InvalidDate {
            message: format!("no month start for {today}"),
        }
    })?;
    let cutoff_month = add_months(month_start, config.max_allowed_due_month_count)?;
    let day = config.day_of_payment.clamp(1, days_in_month(cutoff_month));

    cutoff_month.with_day(day).ok_or_else(|| LoanError::InvalidDate {
        message: format!("day {day} does not exist in {cutoff_month}"),
    })
}

/// due strictly before the cutoff
pub fn is_within_window(installment: &LoanInstallment, cutoff: NaiveDate) -> bool {
    installment.due_date < cutoff
}

fn days_in_month(month_start: NaiveDate) -> u32 {
    add_months(month_start, 1)
        .ok()
        .and_then(|next| next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}
