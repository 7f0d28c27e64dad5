use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use tracing::{debug, info, instrument, warn};

use crate::auth::{self, IdentityProvider};
use crate::config::LoanConfig;
use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::events::{EventStore, LoanEvent};
use crate::ledger;
use crate::model::{Customer, Loan, LoanInstallment};
use crate::payments::{
    is_within_window, payment_window_cutoff, InstallmentScheduler, InstallmentSplit,
    PaymentAllocator,
};
use crate::store::{LoanStore, LoanTransaction};
use crate::types::{CustomerId, LoanId, LoanRequest, NewCustomer, PaymentResult};
use crate::view::LoanView;

/// loan lifecycle controller
///
/// Each operation authenticates the caller, then runs as a single store
/// transaction: every write and event commits together or not at all.
pub struct LoanService<S: LoanStore> {
    store: S,
    config: LoanConfig,
    time: SafeTimeProvider,
}

impl<S: LoanStore> LoanService<S> {
    pub fn new(store: S, config: LoanConfig, time: SafeTimeProvider) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config, time })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LoanConfig {
        &self.config
    }

    pub fn time(&self) -> &SafeTimeProvider {
        &self.time
    }

    fn today(&self) -> NaiveDate {
        self.time.now().date_naive()
    }

    /// register a customer (admin only)
    #[instrument(name = "loans.create_customer", skip(self, identity, request), fields(username = %request.username), err)]
    pub fn create_customer(
        &self,
        identity: &impl IdentityProvider,
        request: NewCustomer,
    ) -> Result<Customer> {
        let mut tx = self.store.begin()?;
        let principal = auth::resolve(identity, &tx)?;
        auth::require_admin(&principal)?;

        if request.credit_limit.is_negative() {
            return Err(LoanError::InvalidAmount {
                amount: request.credit_limit,
            });
        }

        let customer = Customer::new(
            request.name,
            request.surname,
            request.username,
            request.credit_limit,
        );
        tx.insert_customer(&customer)?;
        tx.append_events(vec![LoanEvent::CustomerRegistered {
            customer_id: customer.id,
            username: customer.username.clone(),
            credit_limit: customer.credit_limit,
            timestamp: self.time.now(),
        }])?;
        tx.commit()?;

        info!(customer_id = %customer.id, credit_limit = %customer.credit_limit, "customer registered");
        Ok(customer)
    }

    /// create a loan, schedule its installments and reserve the customer's credit
    #[instrument(name = "loans.create_loan", skip(self, identity, request), fields(customer_id = %request.customer_id), err)]
    pub fn create_loan(
        &self,
        identity: &impl IdentityProvider,
        mut request: LoanRequest,
    ) -> Result<Loan> {
        let mut tx = self.store.begin()?;
        let principal = auth::resolve(identity, &tx)?;

        if !principal.is_admin {
            // non-admins always borrow for themselves
            if let Some(own_id) = principal.customer_id {
                if own_id != request.customer_id {
                    debug!(
                        requested = %request.customer_id,
                        own = %own_id,
                        "overriding target customer for non-admin caller"
                    );
                }
                request.customer_id = own_id;
            }
        }

        self.validate_request(&request, &tx)?;
        let mut customer = tx
            .customer(request.customer_id)?
            .ok_or_else(|| customer_not_found(request.customer_id))?;

        let total_amount = request.amount.with_rate(request.interest_rate);
        debug!(
            principal = %request.amount,
            interest_rate = %request.interest_rate,
            total = %total_amount,
            "calculated total loan amount"
        );
        check_split(&request, total_amount)?;
        ledger::check_credit(&customer, total_amount)?;

        let today = self.today();
        let loan = Loan::new(customer.id, total_amount, request.installments, today);
        tx.insert_loan(&loan)?;

        let installments =
            InstallmentScheduler::generate(loan.id, total_amount, request.installments, today)?;
        tx.insert_installments(&installments)?;

        ledger::reserve(&mut customer, total_amount)?;
        tx.update_customer(&customer)?;

        let now = self.time.now();
        let mut events = EventStore::new();
        events.emit(LoanEvent::LoanCreated {
            loan_id: loan.id,
            customer_id: customer.id,
            principal: request.amount,
            loan_amount: total_amount,
            installments: request.installments,
            first_due_date: installments.first().map(|i| i.due_date).unwrap_or(today),
            timestamp: now,
        });
        events.emit(LoanEvent::CreditReserved {
            customer_id: customer.id,
            amount: total_amount,
            new_used_credit: customer.used_credit_limit,
            timestamp: now,
        });
        tx.append_events(events.take_events())?;
        tx.commit()?;

        info!(
            loan_id = %loan.id,
            amount = %loan.loan_amount,
            installments = loan.number_of_installments,
            new_used_credit = %customer.used_credit_limit,
            "loan created"
        );
        Ok(loan)
    }

    /// apply a payment to the loan's due installments, oldest first
    #[instrument(name = "loans.process_payment", skip(self, identity, amount), fields(amount = %amount), err)]
    pub fn process_payment(
        &self,
        identity: &impl IdentityProvider,
        loan_id: LoanId,
        amount: Money,
    ) -> Result<PaymentResult> {
        let mut tx = self.store.begin()?;
        let principal = auth::resolve(identity, &tx)?;

        if amount.is_negative() {
            return Err(LoanError::InvalidAmount { amount });
        }

        let mut loan = load_loan(&tx, loan_id)?;
        auth::authorize_payment(&principal, loan.customer_id)?;

        let today = self.today();
        let mut pending = self.pending_installments(&tx, loan_id, today)?;
        if pending.is_empty() {
            info!(loan_id = %loan_id, "no pending installments within payment window");
            return Err(LoanError::NoInstallmentsDue { loan_id });
        }
        debug!(loan_id = %loan_id, pending = pending.len(), "found pending installments");

        let mut allocator = PaymentAllocator::new(amount);
        allocator.allocate(&mut pending, today);
        let allocation = allocator.result();
        tx.update_installments(&pending)?;

        let mut events = EventStore::new();
        for installment in pending.iter().filter(|i| i.is_paid) {
            events.emit(LoanEvent::InstallmentPaid {
                loan_id,
                installment_id: installment.id,
                amount: installment.amount,
                paid_amount: installment.paid_amount,
                due_date: installment.due_date,
                payment_date: today,
            });
        }
        events.emit(LoanEvent::PaymentProcessed {
            loan_id,
            amount,
            total_paid: allocation.total_paid,
            paid_installments: allocation.paid_installments,
            remaining_funds: allocation.remaining_funds,
            timestamp: self.time.now(),
        });

        self.settle_if_paid(&mut tx, &mut loan, &mut events)?;
        tx.append_events(events.take_events())?;
        tx.commit()?;

        let result = PaymentResult {
            paid_installments: allocation.paid_installments,
            total_paid: allocation.total_paid,
            remaining_funds: allocation.remaining_funds,
            funds_exhausted: allocation.funds_exhausted,
            is_loan_paid: loan.is_paid,
        };
        info!(
            loan_id = %loan_id,
            paid_installments = result.paid_installments,
            total_paid = %result.total_paid,
            remaining_funds = %result.remaining_funds,
            is_loan_paid = result.is_loan_paid,
            "payment processed"
        );
        Ok(result)
    }

    #[instrument(name = "loans.get_loans_by_customer", skip(self, identity), err)]
    pub fn get_loans_by_customer(
        &self,
        identity: &impl IdentityProvider,
        customer_id: CustomerId,
    ) -> Result<Vec<Loan>> {
        let tx = self.store.begin()?;
        let principal = auth::resolve(identity, &tx)?;
        auth::authorize_access(&principal, customer_id)?;

        if !tx.customer_exists(customer_id)? {
            return Err(customer_not_found(customer_id));
        }
        let loans = tx.loans_by_customer(customer_id)?;
        debug!(customer_id = %customer_id, count = loans.len(), "retrieved loans");
        Ok(loans)
    }

    #[instrument(name = "loans.get_all_loans", skip(self, identity), err)]
    pub fn get_all_loans(&self, identity: &impl IdentityProvider) -> Result<Vec<Loan>> {
        let tx = self.store.begin()?;
        let principal = auth::resolve(identity, &tx)?;
        auth::require_admin(&principal)?;

        let loans = tx.all_loans()?;
        debug!(count = loans.len(), "retrieved all loans");
        Ok(loans)
    }

    #[instrument(name = "loans.get_loan", skip(self, identity), err)]
    pub fn get_loan(&self, identity: &impl IdentityProvider, loan_id: LoanId) -> Result<Loan> {
        let tx = self.store.begin()?;
        let principal = auth::resolve(identity, &tx)?;
        let loan = load_loan(&tx, loan_id)?;
        auth::authorize_access(&principal, loan.customer_id)?;
        Ok(loan)
    }

    /// all installments of a loan, due date ascending
    #[instrument(name = "loans.get_installments_by_loan", skip(self, identity), err)]
    pub fn get_installments_by_loan(
        &self,
        identity: &impl IdentityProvider,
        loan_id: LoanId,
    ) -> Result<Vec<LoanInstallment>> {
        let tx = self.store.begin()?;
        let principal = auth::resolve(identity, &tx)?;
        let loan = load_loan(&tx, loan_id)?;
        auth::authorize_access(&principal, loan.customer_id)?;

        let installments = tx.installments_by_loan(loan_id)?;
        debug!(loan_id = %loan_id, count = installments.len(), "retrieved installments");
        Ok(installments)
    }

    #[instrument(name = "loans.loan_view", skip(self, identity), err)]
    pub fn loan_view(&self, identity: &impl IdentityProvider, loan_id: LoanId) -> Result<LoanView> {
        let tx = self.store.begin()?;
        let principal = auth::resolve(identity, &tx)?;
        let loan = load_loan(&tx, loan_id)?;
        auth::authorize_access(&principal, loan.customer_id)?;

        let installments = tx.installments_by_loan(loan_id)?;
        Ok(LoanView::from_parts(loan, installments))
    }

    fn validate_request<T: LoanTransaction>(&self, request: &LoanRequest, tx: &T) -> Result<()> {
        if request.amount.is_negative() {
            warn!(amount = %request.amount, "negative loan amount");
            return Err(LoanError::InvalidAmount {
                amount: request.amount,
            });
        }

        if !self.config.is_installment_allowed(request.installments) {
            warn!(
                installments = request.installments,
                allowed = ?self.config.installments_allowed,
                "invalid installment count"
            );
            return Err(LoanError::InvalidInstallment {
                requested: request.installments,
                allowed: self.config.installments_allowed.clone(),
            });
        }

        if !self.config.is_rate_allowed(request.interest_rate) {
            warn!(
                rate = %request.interest_rate,
                min = %self.config.interest_min,
                max = %self.config.interest_max,
                "invalid interest rate"
            );
            return Err(LoanError::InvalidInterestRate {
                rate: request.interest_rate,
                min: self.config.interest_min,
                max: self.config.interest_max,
            });
        }

        if !tx.customer_exists(request.customer_id)? {
            warn!(customer_id = %request.customer_id, "customer not found");
            return Err(customer_not_found(request.customer_id));
        }

        Ok(())
    }

    /// unpaid installments due before the payment window closes
    fn pending_installments<T: LoanTransaction>(
        &self,
        tx: &T,
        loan_id: LoanId,
        today: NaiveDate,
    ) -> Result<Vec<LoanInstallment>> {
        let cutoff = payment_window_cutoff(today, &self.config)?;
        debug!(loan_id = %loan_id, cutoff = %cutoff, "payment window");

        Ok(tx
            .installments_by_loan(loan_id)?
            .into_iter()
            .filter(|i| !i.is_paid && is_within_window(i, cutoff))
            .collect())
    }

    /// mark the loan paid and release its credit once every installment is settled
    fn settle_if_paid<T: LoanTransaction>(
        &self,
        tx: &mut T,
        loan: &mut Loan,
        events: &mut EventStore,
    ) -> Result<()> {
        let installments = tx.installments_by_loan(loan.id)?;
        let all_paid = installments.iter().all(|i| i.is_paid);
        debug!(
            loan_id = %loan.id,
            total_installments = installments.len(),
            all_paid,
            "loan status check"
        );
        if !all_paid {
            return Ok(());
        }

        loan.mark_as_paid();
        let mut customer = tx
            .customer(loan.customer_id)?
            .ok_or_else(|| customer_not_found(loan.customer_id))?;
        let old_used = customer.used_credit_limit;
        ledger::release(&mut customer, loan.loan_amount)?;
        tx.update_customer(&customer)?;
        tx.update_loan(loan)?;

        let now = self.time.now();
        events.emit(LoanEvent::LoanSettled {
            loan_id: loan.id,
            customer_id: customer.id,
            loan_amount: loan.loan_amount,
            timestamp: now,
        });
        events.emit(LoanEvent::CreditReleased {
            customer_id: customer.id,
            amount: loan.loan_amount,
            new_used_credit: customer.used_credit_limit,
            timestamp: now,
        });

        info!(
            loan_id = %loan.id,
            customer_id = %customer.id,
            old_used_credit = %old_used,
            new_used_credit = %customer.used_credit_limit,
            "loan paid off, credit released"
        );
        Ok(())
    }
}

/// every installment of the schedule must be at least one cent
fn check_split(request: &LoanRequest, total_amount: Money) -> Result<()> {
    let split = InstallmentSplit::calculate(total_amount, request.installments);
    if split.base.is_positive() && split.last.is_positive() {
        return Ok(());
    }
    warn!(
        total = %total_amount,
        installments = request.installments,
        base_installment = %split.base,
        last_installment = %split.last,
        "loan amount too small for installment count"
    );
    Err(LoanError::InvalidAmount {
        amount: request.amount,
    })
}

fn load_loan<T: LoanTransaction>(tx: &T, loan_id: LoanId) -> Result<Loan> {
    tx.loan(loan_id)?.ok_or_else(|| {
        warn!(loan_id = %loan_id, "loan not found");
        LoanError::LoanNotFound { loan_id }
    })
}

fn customer_not_found(customer_id: CustomerId) -> LoanError {
    LoanError::CustomerNotFound {
        customer: customer_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Caller;
    use crate::decimal::Rate;
    use crate::events::LoanEvent;
    use crate::store::memory::MemoryTransaction;
    use crate::store::InMemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_config() -> LoanConfig {
        LoanConfig {
            installments_allowed: vec![3, 6, 9, 12, 24],
            interest_min: Rate::from_decimal(dec!(0.01)),
            interest_max: Rate::from_decimal(dec!(0.5)),
            day_of_payment: 1,
            max_allowed_due_month_count: 3,
        }
    }

    fn test_time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
        ))
    }

    fn admin() -> Caller {
        Caller::admin("admin")
    }

    fn service_with<S: LoanStore>(store: S) -> LoanService<S> {
        LoanService::new(store, test_config(), test_time()).unwrap()
    }

    fn register<S: LoanStore>(service: &LoanService<S>, username: &str, limit: i64) -> Customer {
        service
            .create_customer(
                &admin(),
                NewCustomer {
                    name: "Test".to_string(),
                    surname: username.to_uppercase(),
                    username: username.to_string(),
                    credit_limit: Money::from_major(limit),
                },
            )
            .unwrap()
    }

    fn request(customer_id: CustomerId, amount: i64, rate: rust_decimal::Decimal, installments: u32) -> LoanRequest {
        LoanRequest {
            customer_id,
            amount: Money::from_major(amount),
            interest_rate: Rate::from_decimal(rate),
            installments,
        }
    }

    fn used_credit<S: LoanStore>(service: &LoanService<S>, customer_id: CustomerId) -> Money {
        let tx = service.store().begin().unwrap();
        let customer = tx.customer(customer_id).unwrap().unwrap();
        customer.used_credit_limit
    }

    fn advance<S: LoanStore>(service: &LoanService<S>, days: i64) {
        service.time().test_control().unwrap().advance(Duration::days(days));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = LoanConfig {
            installments_allowed: Vec::new(),
            ..test_config()
        };
        let result = LoanService::new(InMemoryStore::new(), config, test_time());
        assert!(matches!(result, Err(LoanError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_create_loan_as_admin() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);

        let loan = service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.05), 12)).unwrap();

        assert_eq!(loan.customer_id, ada.id);
        assert_eq!(loan.loan_amount.as_decimal(), dec!(1050.00));
        assert_eq!(loan.number_of_installments, 12);
        assert_eq!(loan.create_date, date(2024, 1, 15));
        assert!(!loan.is_paid);
        assert_eq!(used_credit(&service, ada.id).as_decimal(), dec!(1050.00));

        let installments = service.get_installments_by_loan(&admin(), loan.id).unwrap();
        assert_eq!(installments.len(), 12);
        assert_eq!(installments[0].due_date, date(2024, 2, 1));
        assert_eq!(installments[11].due_date, date(2025, 1, 1));
        assert!(installments.iter().all(|i| i.amount.as_decimal() == dec!(87.50)));
    }

    #[test]
    fn test_non_admin_borrows_for_self() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);
        let bob = register(&service, "bob", 10_000);

        let loan = service
            .create_loan(&Caller::customer("ada"), request(bob.id, 1_000, dec!(0.05), 6))
            .unwrap();

        assert_eq!(loan.customer_id, ada.id);
        assert_eq!(used_credit(&service, ada.id).as_decimal(), dec!(1050.00));
        assert_eq!(used_credit(&service, bob.id), Money::ZERO);
    }

    #[test]
    fn test_create_loan_validation_errors() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);

        let err = service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.05), 7)).unwrap_err();
        assert_eq!(
            err,
            LoanError::InvalidInstallment {
                requested: 7,
                allowed: vec![3, 6, 9, 12, 24],
            }
        );

        let err = service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.75), 12)).unwrap_err();
        assert!(matches!(err, LoanError::InvalidInterestRate { .. }));

        let err = service.create_loan(&admin(), request(Uuid::new_v4(), 1_000, dec!(0.05), 12)).unwrap_err();
        assert!(matches!(err, LoanError::CustomerNotFound { .. }));

        let err = service.create_loan(&admin(), request(ada.id, -1, dec!(0.05), 12)).unwrap_err();
        assert!(matches!(err, LoanError::InvalidAmount { .. }));

        // nothing was persisted
        assert!(service.get_all_loans(&admin()).unwrap().is_empty());
        assert_eq!(used_credit(&service, ada.id), Money::ZERO);
    }

    #[test]
    fn test_installment_check_precedes_rate_check() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);

        let err = service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.99), 5)).unwrap_err();
        assert!(matches!(err, LoanError::InvalidInstallment { .. }));
    }

    #[test]
    fn test_credit_limit_exceeded() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);

        // 7600 * 1.25 = 9500
        service.create_loan(&admin(), request(ada.id, 7_600, dec!(0.25), 12)).unwrap();
        assert_eq!(used_credit(&service, ada.id), Money::from_major(9_500));

        // 480 * 1.25 = 600, 9500 + 600 > 10000
        let err = service.create_loan(&admin(), request(ada.id, 480, dec!(0.25), 12)).unwrap_err();
        assert_eq!(
            err,
            LoanError::CreditLimitExceeded {
                limit: Money::from_major(10_000),
                requested: Money::from_major(600),
            }
        );
        assert_eq!(used_credit(&service, ada.id), Money::from_major(9_500));
        assert_eq!(service.get_loans_by_customer(&admin(), ada.id).unwrap().len(), 1);
    }

    #[test]
    fn test_unauthenticated_and_unknown_callers() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);
        let nobody: Option<Caller> = None;

        let err = service.create_loan(&nobody, request(ada.id, 1_000, dec!(0.05), 12)).unwrap_err();
        assert_eq!(err, LoanError::Unauthenticated);
        assert_eq!(service.get_all_loans(&nobody).unwrap_err(), LoanError::Unauthenticated);

        // authenticated, but no linked customer record
        let err = service
            .create_loan(&Caller::customer("mallory"), request(ada.id, 1_000, dec!(0.05), 12))
            .unwrap_err();
        assert!(matches!(err, LoanError::CustomerNotFound { .. }));
    }

    #[test]
    fn test_payment_applies_early_discount_in_due_order() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);
        let loan = service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.05), 12)).unwrap();

        // window closes 2024-04-01: Feb and Mar are payable
        // Feb 1 is 17 days out: 87.50 - 1.49 = 86.01
        // Mar 1 is 46 days out: 87.50 - 4.03 = 83.47
        let result = service
            .process_payment(&Caller::customer("ada"), loan.id, Money::from_major(200))
            .unwrap();

        assert_eq!(result.paid_installments, 2);
        assert_eq!(result.total_paid.as_decimal(), dec!(169.48));
        assert_eq!(result.remaining_funds.as_decimal(), dec!(30.52));
        assert!(!result.funds_exhausted);
        assert!(!result.is_loan_paid);

        let installments = service.get_installments_by_loan(&admin(), loan.id).unwrap();
        assert_eq!(installments[0].paid_amount.as_decimal(), dec!(86.01));
        assert_eq!(installments[0].payment_date, Some(date(2024, 1, 15)));
        assert_eq!(installments[1].paid_amount.as_decimal(), dec!(83.47));
        assert!(installments[2..].iter().all(|i| !i.is_paid));

        // only the in-window installments were open, the rest are outside
        let err = service
            .process_payment(&admin(), loan.id, Money::from_major(200))
            .unwrap_err();
        assert_eq!(err, LoanError::NoInstallmentsDue { loan_id: loan.id });
    }

    #[test]
    fn test_late_payment_penalty() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);
        let loan = service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.05), 3)).unwrap();

        // 2024-02-11, ten days after the first due date
        advance(&service, 27);

        // 350.00 + 3.50
        let result = service
            .process_payment(&admin(), loan.id, Money::from_decimal(dec!(353.50)))
            .unwrap();

        assert_eq!(result.paid_installments, 1);
        assert_eq!(result.total_paid.as_decimal(), dec!(353.50));
        assert_eq!(result.remaining_funds, Money::ZERO);
        assert!(result.funds_exhausted);

        let installments = service.get_installments_by_loan(&admin(), loan.id).unwrap();
        assert_eq!(installments[0].payment_date, Some(date(2024, 2, 11)));
        assert!(!installments[1].is_paid);
    }

    #[test]
    fn test_full_payoff_releases_credit() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);
        let ada_caller = Caller::customer("ada");
        let loan = service.create_loan(&ada_caller, request(ada.id, 1_000, dec!(0.05), 3)).unwrap();

        // Feb 1: 350 - 5.95, Mar 1: 350 - 16.10; Apr 1 is outside the window
        let first = service
            .process_payment(&ada_caller, loan.id, Money::from_major(1_000))
            .unwrap();
        assert_eq!(first.paid_installments, 2);
        assert_eq!(first.total_paid.as_decimal(), dec!(677.95));
        assert_eq!(first.remaining_funds.as_decimal(), dec!(322.05));
        assert!(!first.is_loan_paid);
        assert_eq!(used_credit(&service, ada.id).as_decimal(), dec!(1050.00));

        // 2024-04-01, last installment due today
        advance(&service, 77);
        let last = service
            .process_payment(&ada_caller, loan.id, Money::from_major(350))
            .unwrap();
        assert_eq!(last.paid_installments, 1);
        assert_eq!(last.total_paid, Money::from_major(350));
        assert!(last.funds_exhausted);
        assert!(last.is_loan_paid);

        assert!(service.get_loan(&ada_caller, loan.id).unwrap().is_paid);
        assert_eq!(used_credit(&service, ada.id), Money::ZERO);

        // paying a settled loan finds nothing to pay
        let err = service
            .process_payment(&ada_caller, loan.id, Money::from_major(350))
            .unwrap_err();
        assert_eq!(err, LoanError::NoInstallmentsDue { loan_id: loan.id });
        assert_eq!(used_credit(&service, ada.id), Money::ZERO);
    }

    #[test]
    fn test_insufficient_payment_changes_nothing_but_succeeds() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);
        let loan = service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.05), 3)).unwrap();

        let result = service.process_payment(&admin(), loan.id, Money::from_major(100)).unwrap();
        assert_eq!(result.paid_installments, 0);
        assert_eq!(result.total_paid, Money::ZERO);
        assert_eq!(result.remaining_funds, Money::from_major(100));
        assert!(!result.funds_exhausted);
    }

    #[test]
    fn test_payment_errors() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);
        register(&service, "bob", 10_000);
        let loan = service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.05), 3)).unwrap();

        let err = service
            .process_payment(&admin(), Uuid::new_v4(), Money::from_major(100))
            .unwrap_err();
        assert!(matches!(err, LoanError::LoanNotFound { .. }));

        let err = service
            .process_payment(&Caller::customer("bob"), loan.id, Money::from_major(400))
            .unwrap_err();
        assert_eq!(err, LoanError::UnauthorizedPayment);

        let err = service
            .process_payment(&admin(), loan.id, Money::from_major(-5))
            .unwrap_err();
        assert!(matches!(err, LoanError::InvalidAmount { .. }));

        // none of the rejected payments touched the schedule
        let installments = service.get_installments_by_loan(&admin(), loan.id).unwrap();
        assert!(installments.iter().all(|i| !i.is_paid));
    }

    #[test]
    fn test_zero_window_has_nothing_due() {
        let config = LoanConfig {
            max_allowed_due_month_count: 0,
            ..test_config()
        };
        let service = LoanService::new(InMemoryStore::new(), config, test_time()).unwrap();
        let ada = register(&service, "ada", 10_000);
        let loan = service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.05), 3)).unwrap();

        let err = service.process_payment(&admin(), loan.id, Money::from_major(400)).unwrap_err();
        assert_eq!(err, LoanError::NoInstallmentsDue { loan_id: loan.id });
    }

    #[test]
    fn test_read_authorization() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);
        let bob = register(&service, "bob", 10_000);
        let loan = service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.05), 6)).unwrap();
        service.create_loan(&admin(), request(bob.id, 2_000, dec!(0.05), 6)).unwrap();

        let ada_caller = Caller::customer("ada");
        let bob_caller = Caller::customer("bob");

        assert_eq!(service.get_all_loans(&admin()).unwrap().len(), 2);
        assert_eq!(service.get_all_loans(&ada_caller).unwrap_err(), LoanError::UnauthorizedAccess);

        let own = service.get_loans_by_customer(&ada_caller, ada.id).unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].id, loan.id);
        assert_eq!(
            service.get_loans_by_customer(&bob_caller, ada.id).unwrap_err(),
            LoanError::UnauthorizedAccess
        );
        assert!(matches!(
            service.get_loans_by_customer(&admin(), Uuid::new_v4()),
            Err(LoanError::CustomerNotFound { .. })
        ));

        assert_eq!(service.get_installments_by_loan(&ada_caller, loan.id).unwrap().len(), 6);
        assert_eq!(
            service.get_installments_by_loan(&bob_caller, loan.id).unwrap_err(),
            LoanError::UnauthorizedAccess
        );
        assert!(matches!(
            service.get_installments_by_loan(&admin(), Uuid::new_v4()),
            Err(LoanError::LoanNotFound { .. })
        ));
        assert_eq!(service.get_loan(&bob_caller, loan.id).unwrap_err(), LoanError::UnauthorizedAccess);
    }

    #[test]
    fn test_customer_onboarding() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 5_000);
        assert_eq!(ada.used_credit_limit, Money::ZERO);

        let new_customer = NewCustomer {
            name: "Ada".to_string(),
            surname: "Again".to_string(),
            username: "ada".to_string(),
            credit_limit: Money::from_major(1_000),
        };

        let err = service
            .create_customer(&Caller::customer("ada"), new_customer.clone())
            .unwrap_err();
        assert_eq!(err, LoanError::UnauthorizedAccess);

        let err = service.create_customer(&admin(), new_customer.clone()).unwrap_err();
        assert!(matches!(err, LoanError::DuplicateUsername { .. }));

        let err = service
            .create_customer(
                &admin(),
                NewCustomer {
                    username: "neg".to_string(),
                    credit_limit: Money::from_major(-1),
                    ..new_customer
                },
            )
            .unwrap_err();
        assert!(matches!(err, LoanError::InvalidAmount { .. }));
    }

    #[test]
    fn test_loan_view() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);
        let loan = service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.05), 3)).unwrap();
        service.process_payment(&admin(), loan.id, Money::from_decimal(dec!(344.05))).unwrap();

        let view = service.loan_view(&Caller::customer("ada"), loan.id).unwrap();
        assert_eq!(view.summary.paid_installments, 1);
        assert_eq!(view.summary.total_paid.as_decimal(), dec!(344.05));
        assert_eq!(view.summary.outstanding_amount, Money::from_major(700));
        assert_eq!(view.summary.next_due_date, Some(date(2024, 3, 1)));
        assert!(view.to_json_pretty().unwrap().contains(&loan.id.to_string()));
    }

    #[test]
    fn test_events_follow_commits() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);
        let loan = service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.05), 3)).unwrap();
        let _ = service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.05), 7));

        let events = service.store().events().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], LoanEvent::CustomerRegistered { .. }));
        assert!(matches!(events[1], LoanEvent::LoanCreated { loan_id, .. } if loan_id == loan.id));
        assert!(matches!(events[2], LoanEvent::CreditReserved { .. }));

        advance(&service, 77);
        service.process_payment(&admin(), loan.id, Money::from_major(1_100)).unwrap();

        let events = service.store().events().unwrap();
        let paid = events
            .iter()
            .filter(|e| matches!(e, LoanEvent::InstallmentPaid { .. }))
            .count();
        assert_eq!(paid, 3);
        assert!(events.iter().any(|e| matches!(e, LoanEvent::LoanSettled { .. })));
        assert!(matches!(
            events.last(),
            Some(LoanEvent::CreditReleased { new_used_credit, .. }) if new_used_credit.is_zero()
        ));
    }

    #[test]
    fn test_credit_ledger_stays_within_bounds() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 3_000);
        let limit = Money::from_major(3_000);

        let mut loans = Vec::new();
        for principal in [1_000, 900, 1_500] {
            match service.create_loan(&admin(), request(ada.id, principal, dec!(0.05), 3)) {
                Ok(loan) => loans.push(loan),
                Err(err) => assert!(matches!(err, LoanError::CreditLimitExceeded { .. })),
            }
            let used = used_credit(&service, ada.id);
            assert!(used >= Money::ZERO && used <= limit);
        }
        assert_eq!(loans.len(), 2);

        advance(&service, 77);
        for loan in &loans {
            service.process_payment(&admin(), loan.id, Money::from_major(5_000)).unwrap();
            let used = used_credit(&service, ada.id);
            assert!(used >= Money::ZERO && used <= limit);
        }
        assert_eq!(used_credit(&service, ada.id), Money::ZERO);
    }

    #[test]
    fn test_rejects_loan_too_small_for_schedule() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);

        // 1.10 over 24: base 0.05, last would be -0.05
        let err = service.create_loan(&admin(), request(ada.id, 1, dec!(0.1), 24)).unwrap_err();
        assert_eq!(
            err,
            LoanError::InvalidAmount {
                amount: Money::from_major(1),
            }
        );

        let err = service.create_loan(&admin(), request(ada.id, 0, dec!(0.1), 3)).unwrap_err();
        assert!(matches!(err, LoanError::InvalidAmount { .. }));

        assert!(service.get_all_loans(&admin()).unwrap().is_empty());
        assert_eq!(used_credit(&service, ada.id), Money::ZERO);

        // 12.00 over 12 splits into whole units
        let loan = service.create_loan(&admin(), request(ada.id, 10, dec!(0.2), 12)).unwrap();
        let installments = service.get_installments_by_loan(&admin(), loan.id).unwrap();
        assert!(installments.iter().all(|i| i.amount == Money::from_major(1)));
    }

    #[test]
    fn test_concurrent_creates_respect_credit_limit() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);

        // 1000 * 1.25 = 1250, eight of twelve fit in 10000
        let results: Vec<Result<Loan>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..12)
                .map(|_| {
                    let service = &service;
                    s.spawn(move || service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.25), 12)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let created: Vec<&Loan> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(created.len(), 8);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(err, LoanError::CreditLimitExceeded { .. }));
        }

        let reserved: Money = created.iter().map(|l| l.loan_amount).sum();
        assert_eq!(reserved, Money::from_major(10_000));
        assert_eq!(used_credit(&service, ada.id), reserved);
        assert_eq!(service.get_loans_by_customer(&admin(), ada.id).unwrap().len(), 8);

        let created_events = service
            .store()
            .events()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, LoanEvent::LoanCreated { .. }))
            .count();
        assert_eq!(created_events, 8);
    }

    #[test]
    fn test_concurrent_payoffs_release_all_credit() {
        let service = service_with(InMemoryStore::new());
        let ada = register(&service, "ada", 10_000);
        let loans: Vec<Loan> = (0..6)
            .map(|_| service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.05), 3)).unwrap())
            .collect();

        // 2024-04-01, every installment is in the window
        advance(&service, 77);

        let results: Vec<Result<PaymentResult>> = std::thread::scope(|s| {
            let handles: Vec<_> = loans
                .iter()
                .map(|loan| {
                    let service = &service;
                    let loan_id = loan.id;
                    s.spawn(move || {
                        service.process_payment(&Caller::customer("ada"), loan_id, Money::from_major(2_000))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for result in results {
            let result = result.unwrap();
            assert_eq!(result.paid_installments, 3);
            assert!(result.is_loan_paid);
        }
        assert_eq!(used_credit(&service, ada.id), Money::ZERO);
        assert!(service.get_all_loans(&admin()).unwrap().iter().all(|l| l.is_paid));
    }

    /// in-memory store whose customer updates fail, to observe rollback
    struct FailingStore {
        inner: InMemoryStore,
    }

    struct FailingTx<'a> {
        inner: MemoryTransaction<'a>,
    }

    impl LoanStore for FailingStore {
        type Tx<'a> = FailingTx<'a>
        where
            Self: 'a;

        fn begin(&self) -> Result<FailingTx<'_>> {
            Ok(FailingTx {
                inner: self.inner.begin()?,
            })
        }
    }

    impl LoanTransaction for FailingTx<'_> {
        fn customer(&self, id: CustomerId) -> Result<Option<Customer>> {
            self.inner.customer(id)
        }
        fn customer_by_username(&self, username: &str) -> Result<Option<Customer>> {
            self.inner.customer_by_username(username)
        }
        fn customer_exists(&self, id: CustomerId) -> Result<bool> {
            self.inner.customer_exists(id)
        }
        fn insert_customer(&mut self, customer: &Customer) -> Result<()> {
            self.inner.insert_customer(customer)
        }
        fn update_customer(&mut self, _customer: &Customer) -> Result<()> {
            Err(LoanError::storage("customer table is read-only"))
        }
        fn loan(&self, id: LoanId) -> Result<Option<Loan>> {
            self.inner.loan(id)
        }
        fn loans_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Loan>> {
            self.inner.loans_by_customer(customer_id)
        }
        fn all_loans(&self) -> Result<Vec<Loan>> {
            self.inner.all_loans()
        }
        fn insert_loan(&mut self, loan: &Loan) -> Result<()> {
            self.inner.insert_loan(loan)
        }
        fn update_loan(&mut self, loan: &Loan) -> Result<()> {
            self.inner.update_loan(loan)
        }
        fn installments_by_loan(&self, loan_id: LoanId) -> Result<Vec<LoanInstallment>> {
            self.inner.installments_by_loan(loan_id)
        }
        fn insert_installments(&mut self, installments: &[LoanInstallment]) -> Result<()> {
            self.inner.insert_installments(installments)
        }
        fn update_installments(&mut self, installments: &[LoanInstallment]) -> Result<()> {
            self.inner.update_installments(installments)
        }
        fn append_events(&mut self, events: Vec<LoanEvent>) -> Result<()> {
            self.inner.append_events(events)
        }
        fn commit(self) -> Result<()> {
            self.inner.commit()
        }
    }

    #[test]
    fn test_failed_create_rolls_back_loan_and_installments() {
        let service = service_with(FailingStore {
            inner: InMemoryStore::new(),
        });
        let ada = register(&service, "ada", 10_000);

        let err = service.create_loan(&admin(), request(ada.id, 1_000, dec!(0.05), 12)).unwrap_err();
        assert!(matches!(err, LoanError::Storage { .. }));
        assert_eq!(err.client_message(), "internal error");

        assert!(service.get_all_loans(&admin()).unwrap().is_empty());
        assert_eq!(used_credit(&service, ada.id), Money::ZERO);
        assert_eq!(service.store().inner.events().unwrap().len(), 1);
    }
}
