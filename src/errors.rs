use thiserror::Error;
use uuid::Uuid;

use crate::decimal::{Money, Rate};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoanError {
    #[error("customer not found: {customer}")]
    CustomerNotFound {
        customer: String,
    },

    #[error("loan not found: {loan_id}")]
    LoanNotFound {
        loan_id: Uuid,
    },

    #[error("invalid installment count {requested}, allowed: {allowed:?}")]
    InvalidInstallment {
        requested: u32,
        allowed: Vec<u32>,
    },

    #[error("interest rate {rate} must be between {min} and {max}")]
    InvalidInterestRate {
        rate: Rate,
        min: Rate,
        max: Rate,
    },

    #[error("credit limit exceeded: limit {limit}, requested {requested}")]
    CreditLimitExceeded {
        limit: Money,
        requested: Money,
    },

    #[error("no pending installments within payment window for loan {loan_id}")]
    NoInstallmentsDue {
        loan_id: Uuid,
    },

    #[error("access denied")]
    UnauthorizedAccess,

    #[error("payment not permitted for this loan")]
    UnauthorizedPayment,

    #[error("no authenticated caller")]
    Unauthenticated,

    #[error("invalid amount: {amount}")]
    InvalidAmount {
        amount: Money,
    },

    #[error("username already registered: {username}")]
    DuplicateUsername {
        username: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("invalid date: {message}")]
    InvalidDate {
        message: String,
    },

    #[error("credit ledger invariant violated: {message}")]
    LedgerInvariant {
        message: String,
    },

    #[error("storage error: {message}")]
    Storage {
        message: String,
    },
}

/// coarse classification used by the request-handling boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Forbidden,
    Unauthenticated,
    Conflict,
    Internal,
}

impl LoanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoanError::CustomerNotFound { .. } | LoanError::LoanNotFound { .. } => ErrorKind::NotFound,
            LoanError::InvalidInstallment { .. }
            | LoanError::InvalidInterestRate { .. }
            | LoanError::CreditLimitExceeded { .. }
            | LoanError::NoInstallmentsDue { .. }
            | LoanError::InvalidAmount { .. } => ErrorKind::BadRequest,
            LoanError::UnauthorizedAccess | LoanError::UnauthorizedPayment => ErrorKind::Forbidden,
            LoanError::Unauthenticated => ErrorKind::Unauthenticated,
            LoanError::DuplicateUsername { .. } => ErrorKind::Conflict,
            LoanError::InvalidConfiguration { .. }
            | LoanError::InvalidDate { .. }
            | LoanError::LedgerInvariant { .. }
            | LoanError::Storage { .. } => ErrorKind::Internal,
        }
    }

    /// message safe to hand back to a caller; internal faults stay opaque
    pub fn client_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }

    pub(crate) fn storage(message: impl Into<String>) -> Self {
        LoanError::Storage {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoanError>;
