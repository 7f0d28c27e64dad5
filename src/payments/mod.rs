pub mod allocator;
pub mod schedule;
pub mod window;

pub use allocator::{effective_payment, AllocationResult, PaymentAllocator};
pub use schedule::{first_due_date, InstallmentScheduler, InstallmentSplit};
pub use window::{is_within_window, payment_window_cutoff};
