use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decimal::Money;
use crate::model::LoanInstallment;

/// adjustment per day between payment and due date, as a fraction of the installment
pub const DAILY_ADJUSTMENT_RATE: Decimal = dec!(0.001);

/// totals of one allocation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub paid_installments: u32,
    pub total_paid: Money,
    pub remaining_funds: Money,
    /// the whole supplied amount was consumed
    pub funds_exhausted: bool,
}

/// amount required to settle `installment` on `payment_date`
///
/// Paying before the due date earns a discount of 0.1% of the installment per
/// day early; paying after it costs the same per day late.
pub fn effective_payment(installment: &LoanInstallment, payment_date: NaiveDate) -> Money {
    let days = installment.days_until_due(payment_date);
    let adjustment = installment.amount * (DAILY_ADJUSTMENT_RATE * Decimal::from(days.unsigned_abs()));

    match days {
        d if d > 0 => installment.amount - adjustment,
        d if d < 0 => installment.amount + adjustment,
        _ => installment.amount,
    }
}

/// greedily settles installments front to back from a single payment
#[derive(Debug)]
pub struct PaymentAllocator {
    remaining_funds: Money,
    total_paid: Money,
    paid_installments: u32,
}

impl PaymentAllocator {
    pub fn new(payment_amount: Money) -> Self {
        debug!(amount = %payment_amount, "initializing payment allocator");
        Self {
            remaining_funds: payment_amount,
            total_paid: Money::ZERO,
            paid_installments: 0,
        }
    }

    pub fn has_remaining_funds(&self) -> bool {
        self.remaining_funds.is_positive()
    }

    /// walk `installments` (due date ascending) while funds remain
    ///
    /// An installment is either paid in full at its effective amount or left
    /// untouched; a later, cheaper installment may still be paid after an
    /// unaffordable one.
    pub fn allocate(&mut self, installments: &mut [LoanInstallment], payment_date: NaiveDate) {
        for installment in installments.iter_mut() {
            if !self.has_remaining_funds() {
                break;
            }
            self.process_installment(installment, payment_date);
        }
    }

    /// pay one installment if the remaining funds cover its effective amount
    pub fn process_installment(&mut self, installment: &mut LoanInstallment, payment_date: NaiveDate) -> bool {
        if installment.is_paid {
            return false;
        }

        let required = effective_payment(installment, payment_date);
        debug!(
            installment_id = %installment.id,
            amount = %installment.amount,
            due_date = %installment.due_date,
            required = %required,
            remaining_funds = %self.remaining_funds,
            "processing installment"
        );

        if self.remaining_funds < required {
            debug!(
                installment_id = %installment.id,
                needed = %required,
                available = %self.remaining_funds,
                "insufficient funds for installment"
            );
            return false;
        }

        self.remaining_funds -= required;
        self.total_paid += required;
        self.paid_installments += 1;
        installment.mark_paid(required, payment_date);
        true
    }

    pub fn result(&self) -> AllocationResult {
        AllocationResult {
            paid_installments: self.paid_installments,
            total_paid: self.total_paid,
            remaining_funds: self.remaining_funds,
            funds_exhausted: self.remaining_funds.is_zero(),
        }
    }
}
