use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{CustomerId, InstallmentId, LoanId};

/// audit events recorded alongside each committed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoanEvent {
    // customer events
    CustomerRegistered {
        customer_id: CustomerId,
        username: String,
        credit_limit: Money,
        timestamp: DateTime<Utc>,
    },

    // lifecycle events
    LoanCreated {
        loan_id: LoanId,
        customer_id: CustomerId,
        principal: Money,
        loan_amount: Money,
        installments: u32,
        first_due_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    LoanSettled {
        loan_id: LoanId,
        customer_id: CustomerId,
        loan_amount: Money,
        timestamp: DateTime<Utc>,
    },

    // payment events
    InstallmentPaid {
        loan_id: LoanId,
        installment_id: InstallmentId,
        amount: Money,
        paid_amount: Money,
        due_date: NaiveDate,
        payment_date: NaiveDate,
    },
    PaymentProcessed {
        loan_id: LoanId,
        amount: Money,
        total_paid: Money,
        paid_installments: u32,
        remaining_funds: Money,
        timestamp: DateTime<Utc>,
    },

    // credit ledger events
    CreditReserved {
        customer_id: CustomerId,
        amount: Money,
        new_used_credit: Money,
        timestamp: DateTime<Utc>,
    },
    CreditReleased {
        customer_id: CustomerId,
        amount: Money,
        new_used_credit: Money,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<LoanEvent>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: LoanEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<LoanEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[LoanEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
