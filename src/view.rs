use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::model::{Loan, LoanInstallment};

/// loan with its schedule and repayment totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanView {
    pub loan: Loan,
    pub installments: Vec<LoanInstallment>,
    pub summary: LoanSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanSummary {
    /// scheduled amounts of the unpaid installments
    pub outstanding_amount: Money,
    /// what was actually paid, adjustments included
    pub total_paid: Money,
    pub paid_installments: u32,
    pub remaining_installments: u32,
    pub next_due_date: Option<NaiveDate>,
}

impl LoanView {
    /// `installments` are expected in due-date order
    pub fn from_parts(loan: Loan, installments: Vec<LoanInstallment>) -> Self {
        let (paid, unpaid): (Vec<&LoanInstallment>, Vec<&LoanInstallment>) =
            installments.iter().partition(|i| i.is_paid);

        let summary = LoanSummary {
            outstanding_amount: unpaid.iter().map(|i| i.amount).sum(),
            total_paid: paid.iter().map(|i| i.paid_amount).sum(),
            paid_installments: paid.len() as u32,
            remaining_installments: unpaid.len() as u32,
            next_due_date: unpaid.iter().map(|i| i.due_date).min(),
        };

        Self {
            loan,
            installments,
            summary,
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
