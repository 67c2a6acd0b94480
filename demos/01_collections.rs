/// collections - partial payments, status sweeps, rebalancing and reversals
use sale_plan_rs::{
    ContractRequest, CurrencyCode, EngineConfig, InstallmentCorrection, MemoryStore, Money,
    PaymentMethod, PaymentRequest, PlanTerms, Project, RateTable, SafeTimeProvider, SalesEngine,
    TimeSource, Unit,
};
use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== collections example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();
    let lira = CurrencyCode::new("TRY")?;

    let project = Project::new("Koru Evleri", lira.clone());
    let mut unit = Unit::new(&project, None, "C-3", Money::from_major(2_400_000))?;

    // reversible payments, overpayments held as credit
    let mut engine = SalesEngine::new(
        EngineConfig::with_allocation_trail(),
        MemoryStore::new(),
        RateTable::new(lira.clone()),
    )?;

    let terms = PlanTerms::builder()
        .sale_price(Money::from_major(2_400_000))
        .maturity_difference(Money::from_major(120_000))
        .discount(Money::from_major(20_000))
        .down_payment_percentage(dec!(25))
        .installments(24)
        .balloon_percentage(dec!(10))
        .build_with_time(&time)?;

    let contract_id = engine.create_contract(
        &unit,
        ContractRequest {
            customer_id: "CUST-417".to_string(),
            terms,
            date_sale: None,
        },
        &time,
    )?;
    engine.confirm_contract(contract_id, &mut unit, &time)?;

    let contract = engine.contract(contract_id)?;
    println!("contract {} for {}", contract.reference, contract.sale_price());
    println!("plan has {} entries", contract.installments().len());

    // down payment in two transfers
    for amount in [400_000, 225_000] {
        let today = time.now().date_naive();
        let payment_id = engine.register_payment(
            PaymentRequest::new(contract_id, Money::from_major(amount), lira.clone(), today)
                .method(PaymentMethod::BankTransfer),
            &time,
        )?;
        let result = engine.post_payment(payment_id, &time)?;
        println!(
            "posted {}: {} installments touched, {} settled",
            amount,
            result.lines.len(),
            result.settled_count()
        );
    }

    // two months pass without payment
    controller.advance(Duration::days(62));
    let report = engine.refresh_statuses(&time)?;
    println!("\nsweep on {}: {} status changes", report.date, report.transitions.len());

    let view = engine.view(contract_id)?;
    println!(
        "overdue: {} across {} installments",
        view.collections.overdue_amount, view.collections.overdue_count
    );

    // a promissory note that bounces
    let today = time.now().date_naive();
    let note = engine.register_payment(
        PaymentRequest::new(contract_id, Money::from_major(150_000), lira.clone(), today)
            .method(PaymentMethod::PromissoryNote),
        &time,
    )?;
    engine.post_payment(note, &time)?;
    let reversed = engine.cancel_payment(note, &time)?;
    println!("\nreversed bounced note: {}", reversed);

    // renegotiated last installment, then bring the plan back to the price
    let contract = engine.contract(contract_id)?;
    if let Some(last) = contract.installments().iter().max_by_key(|i| i.allocation_key()) {
        engine.correct_installment(
            contract_id,
            last.id,
            InstallmentCorrection {
                amount: Some(last.amount() - Money::from_major(10_000)),
                ..Default::default()
            },
            &time,
        )?;
    }
    if let Some(id) = engine.rebalance(contract_id, &time)? {
        let contract = engine.contract(contract_id)?;
        let entry = contract.installment(id)?;
        println!("added {} of {} due {}", entry.name, entry.amount(), entry.date_due());
    }

    let metrics = engine.unit_metrics(&unit)?;
    println!(
        "\nunit {}: sold {}, collected {}, receivable {}",
        unit.name, metrics.sold_value, metrics.collected, metrics.receivable
    );
    println!("{} events recorded", engine.events.len());

    Ok(())
}
