/// foreign currency - sync central-bank rates and collect a dollar payment on a lira contract
use sale_plan_rs::{
    CentralBankFeed, ContractRequest, CurrencyCode, EngineConfig, EventStore, FeedTransport,
    MemoryStore, Money, PaymentMethod, PaymentRequest, PlanTerms, Project, RateTable,
    SafeTimeProvider, SalesEngine, TimeSource, Unit,
};
use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;

const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Tarih_Date Tarih="10.03.2025" Date="03/10/2025" Bulten_No="2025/47">
  <Currency CrossOrder="0" Kod="USD" CurrencyCode="USD">
    <Unit>1</Unit>
    <Isim>ABD DOLARI</Isim>
    <CurrencyName>US DOLLAR</CurrencyName>
    <ForexBuying>36.4520</ForexBuying>
    <ForexSelling>36.5177</ForexSelling>
  </Currency>
  <Currency CrossOrder="9" Kod="EUR" CurrencyCode="EUR">
    <Unit>1</Unit>
    <Isim>EURO</Isim>
    <CurrencyName>EURO</CurrencyName>
    <ForexBuying>39.5012</ForexBuying>
    <ForexSelling>39.5724</ForexSelling>
  </Currency>
</Tarih_Date>"#;

/// serves the same sheet for every url
struct OfflineTransport;

impl FeedTransport for OfflineTransport {
    fn fetch(&self, url: &str) -> Option<Vec<u8>> {
        println!("fetching {}", url);
        Some(SHEET.as_bytes().to_vec())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== foreign currency example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2025, 3, 10, 16, 0, 0).unwrap()
    ));
    let today = time.now().date_naive();
    let lira = CurrencyCode::new("TRY")?;
    let dollar = CurrencyCode::new("USD")?;

    let project = Project::new("Bosphorus Heights", lira.clone()).with_city("Istanbul");
    let mut unit = Unit::new(&project, None, "T-801", Money::from_major(9_000_000))?;

    let mut rates = RateTable::new(lira.clone());
    rates.track(dollar.clone());

    let config = EngineConfig::baseline();
    let feed = CentralBankFeed::new(&config.feed, OfflineTransport);
    let mut feed_events = EventStore::new();
    let synced = feed.sync(today, &mut rates, &time, &mut feed_events)?;
    println!("synced {:?} using {:?} rates", synced, feed.rate_side());

    let mut engine = SalesEngine::new(config, MemoryStore::new(), rates)?;

    let terms = PlanTerms::builder()
        .sale_price(Money::from_major(9_000_000))
        .down_payment_percentage(dec!(30))
        .installments(36)
        .build_with_time(&time)?;
    let contract_id = engine.create_contract(
        &unit,
        ContractRequest {
            customer_id: "CUST-US-09".to_string(),
            terms,
            date_sale: None,
        },
        &time,
    )?;
    engine.confirm_contract(contract_id, &mut unit, &time)?;

    // down payment wired in dollars, converted at today's rate
    let payment_id = engine.register_payment(
        PaymentRequest::new(contract_id, Money::from_major(50_000), dollar.clone(), today)
            .method(PaymentMethod::BankTransfer),
        &time,
    )?;
    let payment = engine.payment(payment_id)?;
    println!(
        "\n{} {} at {} covers {} {}",
        payment.amount,
        payment.currency,
        payment.exchange_rate(),
        payment.covered_amount(),
        lira
    );

    let result = engine.post_payment(payment_id, &time)?;
    for line in &result.lines {
        println!(
            "  #{} due {}: applied {}, residual {}",
            line.sequence, line.date_due, line.amount_applied, line.residual_after
        );
    }

    let view = engine.view(contract_id)?;
    println!(
        "\npaid {} of {}, balance {}",
        view.collections.total_paid, view.pricing.sale_price, view.collections.balance
    );

    Ok(())
}
