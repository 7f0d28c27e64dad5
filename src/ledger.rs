use tracing::{debug, warn};

use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::model::Customer;

/// reject a new loan that would push used credit past the limit
pub fn check_credit(customer: &Customer, loan_amount: Money) -> Result<()> {
    let available = customer.available_credit();
    debug!(
        customer_id = %customer.id,
        credit_limit = %customer.credit_limit,
        used_credit = %customer.used_credit_limit,
        available = %available,
        requested = %loan_amount,
        "checking credit limit"
    );

    if loan_amount > available {
        warn!(
            customer_id = %customer.id,
            credit_limit = %customer.credit_limit,
            new_used_credit = %(customer.used_credit_limit + loan_amount),
            "credit limit exceeded"
        );
        return Err(LoanError::CreditLimitExceeded {
            limit: customer.credit_limit,
            requested: loan_amount,
        });
    }

    Ok(())
}

/// consume credit for a newly created loan
pub fn reserve(customer: &mut Customer, loan_amount: Money) -> Result<()> {
    check_credit(customer, loan_amount)?;
    customer.used_credit_limit += loan_amount;
    verify(customer)
}

/// give back the credit held by a settled loan
pub fn release(customer: &mut Customer, loan_amount: Money) -> Result<()> {
    let old_used = customer.used_credit_limit;
    customer.used_credit_limit -= loan_amount;
    debug!(
        customer_id = %customer.id,
        old_used_credit = %old_used,
        new_used_credit = %customer.used_credit_limit,
        "released credit"
    );
    verify(customer)
}

/// `0 <= used <= limit`, holds after every committed operation
pub fn verify(customer: &Customer) -> Result<()> {
    if customer.used_credit_limit.is_negative() {
        return Err(LoanError::LedgerInvariant {
            message: format!(
                "customer {} used credit {} is negative",
                customer.id, customer.used_credit_limit
            ),
        });
    }
    if customer.used_credit_limit > customer.credit_limit {
        return Err(LoanError::LedgerInvariant {
            message: format!(
                "customer {} used credit {} exceeds limit {}",
                customer.id, customer.used_credit_limit, customer.credit_limit
            ),
        });
    }
    Ok(())
}
