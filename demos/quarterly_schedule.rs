use amc_schedule_builder::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("📅 AMC Quarterly Schedule Demo\n");

    let config = Configuration::default();
    println!("📋 Configuration:");
    println!("  Rates: {:?}", config.rates);
    println!("  Maintenance fraction: {}", config.maintenance_fraction);
    println!("  Tax rate: {}\n", config.tax_rate);

    // A reference date mid-JFM makes every contract year straddle two JFM occurrences.
    let record = ContractRecord::new("INV-2023-014", "2023-03-15", 250_000.0)
        .with_product_name("Core Router")
        .with_location("Mumbai DC");

    let schedule = try_build_schedule(&record, &config)?;
    println!(
        "🧾 {} (AMC starts {}, billable {:.2})",
        record.product_name.as_deref().unwrap_or_default(),
        schedule.amc_start_date.format("%Y-%m-%d"),
        schedule.total_billable_value
    );

    for quarter in &schedule.quarters {
        println!(
            "  {:<9} {} to {}  {:>12.2}  {:>12.2}",
            quarter.key.to_string(),
            quarter.start_date.format("%d %b %Y"),
            quarter.end_date.format("%d %b %Y"),
            quarter.amount_without_tax,
            quarter.amount_with_tax
        );
        for entry in &quarter.contributions {
            println!(
                "      year {} @ {:.3}: {:?} {:.2} of {:.2} ({} / {} days)",
                entry.contract_year,
                entry.rate,
                entry.classification,
                entry.actual_amount,
                entry.full_amount,
                entry.overlap_days,
                entry.total_days
            );
        }
    }
    println!(
        "  Total: {:.2} (with tax {:.2})\n",
        schedule.totals.total_without_tax, schedule.totals.total_with_tax
    );

    println!("⚙️  Running a batch on the worker thread...");
    let records: Vec<ContractRecord> = (0..240)
        .map(|i| {
            let month = i % 12 + 1;
            let base_value = 10_000.0 + i as f64 * 125.0;
            let mut record = ContractRecord::new(
                format!("INV-{:04}", i),
                format!("2022-{:02}-10", month),
                base_value,
            )
            .with_location(if i % 2 == 0 { "Pune" } else { "Chennai" });
            if i == 17 {
                record.reference_date = Some("not a date".to_string());
            }
            record
        })
        .collect();

    let batch_config = Configuration {
        chunk_size: 100,
        ..config.clone()
    };

    let mut worker = BatchWorker::spawn()?;
    let outcome = run_dataset(&mut worker, records, &batch_config, |progress| {
        println!(
            "  chunk {}/{}: {}/{} records",
            progress.chunk_id + 1,
            progress.chunk_total,
            progress.completed_records,
            progress.total_records
        );
    })
    .await?;
    worker.shutdown()?;

    println!(
        "\n✅ {} processed, {} succeeded, {} failed",
        outcome.summary.processed, outcome.summary.succeeded, outcome.summary.failed
    );
    for result in outcome.results.iter().filter(|r| !r.is_success()) {
        if let Some((kind, message)) = result.error() {
            println!("  ❌ {} [{:?}] {}", result.identity.id, kind, message);
        }
    }

    println!("\n📊 Portfolio by year:");
    let totals = PortfolioTotals::from_results(&outcome.results);
    for (year, amount) in &totals.by_year {
        println!(
            "  {}: {:>14.2}  {:>14.2}",
            year, amount.without_tax, amount.with_tax
        );
    }

    println!("\n📍 By location:");
    for (location, rollup) in PortfolioTotals::by_location(&outcome.results) {
        println!(
            "  {:<10} {:>14.2} ({} contracts)",
            location, rollup.grand_total.with_tax, rollup.scheduled
        );
    }

    Ok(())
}
