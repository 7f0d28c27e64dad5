pub mod auth;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod model;
pub mod payments;
pub mod service;
pub mod store;
pub mod types;
pub mod view;

// re-export key types
pub use auth::{Caller, IdentityProvider, Principal, Role};
pub use config::LoanConfig;
pub use decimal::{Money, Rate};
pub use errors::{ErrorKind, LoanError, Result};
pub use events::{EventStore, LoanEvent};
pub use model::{Customer, Loan, LoanInstallment};
pub use payments::{AllocationResult, InstallmentScheduler, InstallmentSplit, PaymentAllocator};
pub use service::LoanService;
pub use store::{InMemoryStore, LoanStore, LoanTransaction};
pub use types::{CustomerId, InstallmentId, LoanId, LoanRequest, NewCustomer, PaymentResult};
pub use view::{LoanSummary, LoanView};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
