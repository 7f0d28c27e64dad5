use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};

/// unique identifier for a customer
pub type CustomerId = Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for a loan installment
pub type InstallmentId = Uuid;

/// loan creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRequest {
    /// target customer; ignored for non-admin callers
    pub customer_id: CustomerId,
    /// principal before interest
    pub amount: Money,
    pub interest_rate: Rate,
    pub installments: u32,
}

/// customer onboarding request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub surname: String,
    pub username: String,
    pub credit_limit: Money,
}

/// outcome of a payment against a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub paid_installments: u32,
    pub total_paid: Money,
    pub remaining_funds: Money,
    /// the whole supplied amount was consumed
    pub funds_exhausted: bool,
    /// the loan is fully settled after this payment
    pub is_loan_paid: bool,
}
