use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::errors::{LoanError, Result};
use crate::events::LoanEvent;
use crate::model::{Customer, Loan, LoanInstallment};
use crate::types::{CustomerId, LoanId};

use super::{LoanStore, LoanTransaction};

#[derive(Debug, Clone, Default)]
struct Tables {
    customers: Vec<Customer>,
    loans: Vec<Loan>,
    installments: Vec<LoanInstallment>,
    events: Vec<LoanEvent>,
}

/// process-local store
///
/// A transaction holds the table lock until it is committed or dropped, so
/// transactions run one at a time. Writes go to a staged copy of the tables.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// committed events, oldest first
    pub fn events(&self) -> Result<Vec<LoanEvent>> {
        Ok(self.lock()?.events.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| LoanError::storage("in-memory store lock poisoned"))
    }
}

impl LoanStore for InMemoryStore {
    type Tx<'a> = MemoryTransaction<'a>
    where
        Self: 'a;

    fn begin(&self) -> Result<MemoryTransaction<'_>> {
        let guard = self.lock()?;
        let staged = guard.clone();
        Ok(MemoryTransaction { guard, staged })
    }
}

pub struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, Tables>,
    staged: Tables,
}

impl MemoryTransaction<'_> {
    fn customer_mut(&mut self, id: CustomerId) -> Result<&mut Customer> {
        self.staged
            .customers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| LoanError::storage(format!("customer {id} is not stored")))
    }

    fn loan_mut(&mut self, id: LoanId) -> Result<&mut Loan> {
        self.staged
            .loans
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| LoanError::storage(format!("loan {id} is not stored")))
    }
}

impl LoanTransaction for MemoryTransaction<'_> {
    fn customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.staged.customers.iter().find(|c| c.id == id).cloned())
    }

    fn customer_by_username(&self, username: &str) -> Result<Option<Customer>> {
        Ok(self
            .staged
            .customers
            .iter()
            .find(|c| c.username == username)
            .cloned())
    }

    fn customer_exists(&self, id: CustomerId) -> Result<bool> {
        Ok(self.staged.customers.iter().any(|c| c.id == id))
    }

    fn insert_customer(&mut self, customer: &Customer) -> Result<()> {
        if self.staged.customers.iter().any(|c| c.username == customer.username) {
            return Err(LoanError::DuplicateUsername {
                username: customer.username.clone(),
            });
        }
        if self.customer_exists(customer.id)? {
            return Err(LoanError::storage(format!("customer {} already stored", customer.id)));
        }
        self.staged.customers.push(customer.clone());
        Ok(())
    }

    fn update_customer(&mut self, customer: &Customer) -> Result<()> {
        *self.customer_mut(customer.id)? = customer.clone();
        Ok(())
    }

    fn loan(&self, id: LoanId) -> Result<Option<Loan>> {
        Ok(self.staged.loans.iter().find(|l| l.id == id).cloned())
    }

    fn loans_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Loan>> {
        Ok(self
            .staged
            .loans
            .iter()
            .filter(|l| l.customer_id == customer_id)
            .cloned()
            .collect())
    }

    fn all_loans(&self) -> Result<Vec<Loan>> {
        Ok(self.staged.loans.clone())
    }

    fn insert_loan(&mut self, loan: &Loan) -> Result<()> {
        if !self.customer_exists(loan.customer_id)? {
            return Err(LoanError::storage(format!(
                "loan {} references unknown customer {}",
                loan.id, loan.customer_id
            )));
        }
        self.staged.loans.push(loan.clone());
        Ok(())
    }

    fn update_loan(&mut self, loan: &Loan) -> Result<()> {
        *self.loan_mut(loan.id)? = loan.clone();
        Ok(())
    }

    fn installments_by_loan(&self, loan_id: LoanId) -> Result<Vec<LoanInstallment>> {
        let mut installments: Vec<LoanInstallment> = self
            .staged
            .installments
            .iter()
            .filter(|i| i.loan_id == loan_id)
            .cloned()
            .collect();
        // stable: equal due dates keep insertion order
        installments.sort_by_key(|i| i.due_date);
        Ok(installments)
    }

    fn insert_installments(&mut self, installments: &[LoanInstallment]) -> Result<()> {
        for installment in installments {
            if self.loan(installment.loan_id)?.is_none() {
                return Err(LoanError::storage(format!(
                    "installment {} references unknown loan {}",
                    installment.id, installment.loan_id
                )));
            }
        }
        self.staged.installments.extend_from_slice(installments);
        Ok(())
    }

    fn update_installments(&mut self, installments: &[LoanInstallment]) -> Result<()> {
        for updated in installments {
            let stored = self
                .staged
                .installments
                .iter_mut()
                .find(|i| i.id == updated.id)
                .ok_or_else(|| LoanError::storage(format!("installment {} is not stored", updated.id)))?;
            *stored = updated.clone();
        }
        Ok(())
    }

    fn append_events(&mut self, events: Vec<LoanEvent>) -> Result<()> {
        self.staged.events.extend(events);
        Ok(())
    }

    fn commit(mut self) -> Result<()> {
        debug!(
            customers = self.staged.customers.len(),
            loans = self.staged.loans.len(),
            installments = self.staged.installments.len(),
            "committing in-memory transaction"
        );
        *self.guard = std::mem::take(&mut self.staged);
        Ok(())
    }
}
