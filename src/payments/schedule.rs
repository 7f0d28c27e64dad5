use chrono::{Datelike, Months, NaiveDate};
use tracing::debug;

use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::model::LoanInstallment;
use crate::types::LoanId;

/// installment amount split for a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallmentSplit {
    /// amount of every installment but the last
    pub base: Money,
    /// last installment, absorbs the rounding residue
    pub last: Money,
}

impl InstallmentSplit {
    pub fn calculate(total: Money, count: u32) -> Self {
        let base = total.split(count);
        let last = total - base * rust_decimal::Decimal::from(count.saturating_sub(1));
        Self { base, last }
    }
}

/// generates the installments of a freshly created loan
pub struct InstallmentScheduler;

impl InstallmentScheduler {
    /// one installment per month, first due on the 1st of the month after `created`
    pub fn generate(
        loan_id: LoanId,
        total: Money,
        count: u32,
        created: NaiveDate,
    ) -> Result<Vec<LoanInstallment>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let split = InstallmentSplit::calculate(total, count);
        let first_due = first_due_date(created)?;

        debug!(
            loan_id = %loan_id,
            base_installment = %split.base,
            last_installment = %split.last,
            first_due_date = %first_due,
            "calculated installment schedule"
        );

        (0..count)
            .map(|index| {
                let amount = if index == count - 1 { split.last } else { split.base };
                let due_date = add_months(first_due, index)?;
                Ok(LoanInstallment::new(loan_id, amount, due_date))
            })
            .collect()
    }
}

/// first day of the month following `created`
pub fn first_due_date(created: NaiveDate) -> Result<NaiveDate> {
    let month_start = NaiveDate::from_ymd_opt(created.year(), created.month(), 1)
        .ok_or_else(|| date_error(format!("no month start for {created}")))?;
    add_months(month_start, 1)
}

pub(crate) fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| date_error(format!("{date} plus {months} months is out of range")))
}

fn date_error(message: String) -> LoanError {
    LoanError::InvalidDate { message }
}
