/// quick start - onboard a customer, borrow, and pay the loan off
use chrono::{Duration, TimeZone, Utc};
use consumer_loans_rs::{
    Caller, InMemoryStore, LoanConfig, LoanRequest, LoanService, Money, NewCustomer, Rate,
    SafeTimeProvider, TimeSource,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=consumer_loans_rs=debug shows the loan spans
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
    ));
    let controller = time.test_control().unwrap();

    let service = LoanService::new(InMemoryStore::new(), LoanConfig::default(), time)?;
    let admin = Caller::admin("admin");
    let ada = Caller::customer("ada");

    let customer = service.create_customer(
        &admin,
        NewCustomer {
            name: "Ada".to_string(),
            surname: "Lovelace".to_string(),
            username: "ada".to_string(),
            credit_limit: Money::from_major(5_000),
        },
    )?;
    println!("registered {} with limit {}", customer.username, customer.credit_limit);

    // $1,200 at 20% over 6 months
    let loan = service.create_loan(
        &ada,
        LoanRequest {
            customer_id: customer.id,
            amount: Money::from_major(1_200),
            interest_rate: Rate::from_percentage(20),
            installments: 6,
        },
    )?;
    println!("loan {} total {}", loan.id, loan.loan_amount);

    // early payment earns a discount on the first installments
    let early = service.process_payment(&ada, loan.id, Money::from_major(500))?;
    println!(
        "paid {} installments for {}, {} left over",
        early.paid_installments, early.total_paid, early.remaining_funds
    );

    // pay the rest on each due date, where no adjustment applies
    while let Some(due) = service.loan_view(&ada, loan.id)?.summary.next_due_date {
        let today = service.time().now().date_naive();
        controller.advance(Duration::days((due - today).num_days()));
        let result = service.process_payment(&ada, loan.id, Money::from_major(240))?;
        println!(
            "{}: paid {} installments for {}",
            service.time().now().format("%Y-%m-%d"),
            result.paid_installments,
            result.total_paid
        );
    }

    println!("{}", service.loan_view(&ada, loan.id)?.to_json_pretty()?);
    Ok(())
}
