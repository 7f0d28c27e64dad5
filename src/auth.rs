use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{LoanError, Result};
use crate::store::LoanTransaction;
use crate::types::CustomerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Customer,
}

/// authenticated caller as reported by the upstream identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub username: String,
    pub role: Role,
}

impl Caller {
    pub fn admin(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: Role::Admin,
        }
    }

    pub fn customer(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: Role::Customer,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// source of the current caller for a request
pub trait IdentityProvider {
    fn current_caller(&self) -> Option<Caller>;
}

impl IdentityProvider for Caller {
    fn current_caller(&self) -> Option<Caller> {
        Some(self.clone())
    }
}

impl IdentityProvider for Option<Caller> {
    fn current_caller(&self) -> Option<Caller> {
        self.clone()
    }
}

/// caller resolved against the customer records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub is_admin: bool,
    /// customer record linked to the username, if any
    pub customer_id: Option<CustomerId>,
}

impl Principal {
    /// admin, or the caller is the given customer
    pub fn can_act_for(&self, customer_id: CustomerId) -> bool {
        self.is_admin || self.customer_id == Some(customer_id)
    }
}

/// authenticate and map the username to a customer id
///
/// Non-admin callers must have a customer record; admins may exist without one.
pub fn resolve<T: LoanTransaction>(identity: &impl IdentityProvider, tx: &T) -> Result<Principal> {
    let caller = identity.current_caller().ok_or_else(|| {
        warn!("request without an authenticated caller");
        LoanError::Unauthenticated
    })?;

    let customer_id = tx.customer_by_username(&caller.username)?.map(|c| c.id);
    if !caller.is_admin() && customer_id.is_none() {
        warn!(username = %caller.username, "no customer linked to caller");
        return Err(LoanError::CustomerNotFound {
            customer: caller.username,
        });
    }

    Ok(Principal {
        is_admin: caller.is_admin(),
        username: caller.username,
        customer_id,
    })
}

pub fn require_admin(principal: &Principal) -> Result<()> {
    if principal.is_admin {
        return Ok(());
    }
    warn!(username = %principal.username, "admin role required");
    Err(LoanError::UnauthorizedAccess)
}

/// read access to a customer's loan data
pub fn authorize_access(principal: &Principal, customer_id: CustomerId) -> Result<()> {
    if principal.can_act_for(customer_id) {
        return Ok(());
    }
    warn!(
        username = %principal.username,
        customer_id = %customer_id,
        "unauthorized access to customer data"
    );
    Err(LoanError::UnauthorizedAccess)
}

/// payment against a loan owned by `customer_id`
pub fn authorize_payment(principal: &Principal, customer_id: CustomerId) -> Result<()> {
    if principal.can_act_for(customer_id) {
        return Ok(());
    }
    warn!(
        username = %principal.username,
        customer_id = %customer_id,
        "unauthorized payment attempt"
    );
    Err(LoanError::UnauthorizedPayment)
}
