/// quick start - generate a payment plan and collect the down payment
use sale_plan_rs::{
    ContractRequest, CurrencyCode, EngineConfig, MemoryStore, Money, PaymentRequest, PlanTerms,
    Project, RateTable, SafeTimeProvider, SalesEngine, TimeSource, Unit,
};
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()
    ));
    let lira = CurrencyCode::new("TRY")?;

    // inventory
    let project = Project::new("Marina Park", lira.clone()).with_city("Izmir");
    let mut unit = Unit::new(&project, None, "A-12", Money::from_major(120_000))?;

    let mut engine = SalesEngine::new(EngineConfig::baseline(), MemoryStore::new(), RateTable::new(lira.clone()))?;

    // 10% down, 12 monthly installments
    let first = NaiveDate::from_ymd_opt(2025, 1, 1).ok_or("bad date")?;
    let terms = PlanTerms::builder()
        .sale_price(Money::from_major(120_000))
        .down_payment_percentage(dec!(10))
        .down_payment_date(first)
        .installments(12)
        .first_installment_date(first)
        .build_with_time(&time)?;

    let contract_id = engine.create_contract(
        &unit,
        ContractRequest {
            customer_id: "CUST-001".to_string(),
            terms,
            date_sale: None,
        },
        &time,
    )?;
    engine.confirm_contract(contract_id, &mut unit, &time)?;

    // collect the down payment
    let payment_id = engine.register_payment(
        PaymentRequest::new(contract_id, Money::from_major(12_000), lira, first),
        &time,
    )?;
    engine.post_payment(payment_id, &time)?;

    println!("{}", engine.view(contract_id)?.to_json_pretty()?);

    Ok(())
}
