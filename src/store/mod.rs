pub mod memory;

pub use memory::InMemoryStore;

use crate::errors::Result;
use crate::events::LoanEvent;
use crate::model::{Customer, Loan, LoanInstallment};
use crate::types::{CustomerId, LoanId};

pub trait LoanStore {
    type Tx<'a>: LoanTransaction
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Tx<'_>>;
}

/// unit of work for one service operation
///
/// Writes become visible only on `commit`; dropping an uncommitted transaction
/// discards them. Implementations must serialize transactions that touch the
/// same customer or loan.
pub trait LoanTransaction {
    // customers
    fn customer(&self, id: CustomerId) -> Result<Option<Customer>>;
    fn customer_by_username(&self, username: &str) -> Result<Option<Customer>>;
    fn customer_exists(&self, id: CustomerId) -> Result<bool>;
    fn insert_customer(&mut self, customer: &Customer) -> Result<()>;
    fn update_customer(&mut self, customer: &Customer) -> Result<()>;

    // loans
    fn loan(&self, id: LoanId) -> Result<Option<Loan>>;
    /// in creation order
    fn loans_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Loan>>;
    fn all_loans(&self) -> Result<Vec<Loan>>;
    fn insert_loan(&mut self, loan: &Loan) -> Result<()>;
    fn update_loan(&mut self, loan: &Loan) -> Result<()>;

    // installments
    /// ordered by due date ascending
    fn installments_by_loan(&self, loan_id: LoanId) -> Result<Vec<LoanInstallment>>;
    fn insert_installments(&mut self, installments: &[LoanInstallment]) -> Result<()>;
    fn update_installments(&mut self, installments: &[LoanInstallment]) -> Result<()>;

    fn append_events(&mut self, events: Vec<LoanEvent>) -> Result<()>;

    fn commit(self) -> Result<()>;
}
