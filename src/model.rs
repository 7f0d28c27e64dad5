use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{CustomerId, InstallmentId, LoanId};

/// customer record with its credit ledger
///
/// Loans are not embedded; they are looked up by `customer_id` in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub surname: String,
    /// unique, links the authenticated identity to this record
    pub username: String,
    pub credit_limit: Money,
    pub used_credit_limit: Money,
}

impl Customer {
    pub fn new(name: String, surname: String, username: String, credit_limit: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            surname,
            username,
            credit_limit,
            used_credit_limit: Money::ZERO,
        }
    }

    /// credit still available for new loans
    pub fn available_credit(&self) -> Money {
        (self.credit_limit - self.used_credit_limit).max(Money::ZERO)
    }
}

/// loan header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub customer_id: CustomerId,
    /// principal plus interest
    pub loan_amount: Money,
    pub number_of_installments: u32,
    pub create_date: NaiveDate,
    pub is_paid: bool,
}

impl Loan {
    pub fn new(
        customer_id: CustomerId,
        loan_amount: Money,
        number_of_installments: u32,
        create_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            loan_amount,
            number_of_installments,
            create_date,
            is_paid: false,
        }
    }

    pub fn mark_as_paid(&mut self) {
        self.is_paid = true;
    }
}

/// one scheduled repayment of a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanInstallment {
    pub id: InstallmentId,
    pub loan_id: LoanId,
    pub amount: Money,
    pub paid_amount: Money,
    pub due_date: NaiveDate,
    pub payment_date: Option<NaiveDate>,
    pub is_paid: bool,
}

impl LoanInstallment {
    pub fn new(loan_id: LoanId, amount: Money, due_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            amount,
            paid_amount: Money::ZERO,
            due_date,
            payment_date: None,
            is_paid: false,
        }
    }

    /// settle the installment; only unpaid installments transition
    pub fn mark_paid(&mut self, paid_amount: Money, payment_date: NaiveDate) {
        debug_assert!(!self.is_paid, "installment {} settled twice", self.id);
        self.paid_amount = paid_amount;
        self.payment_date = Some(payment_date);
        self.is_paid = true;
    }

    /// signed days from `date` until the due date; negative when overdue
    pub fn days_until_due(&self, date: NaiveDate) -> i64 {
        (self.due_date - date).num_days()
    }
}
