use crate::calendar::{add_years_clamped, parse_reference_date};
use crate::engine::QuarterCalculator;
use crate::error::{AmcError, Result};
use crate::resolver::ResidualResolver;
use crate::schema::{
    Configuration, ContractRecord, ContractSchedule, QuarterSchedule, ScheduleOutcome,
    ScheduleResult, ScheduleTotals,
};
use crate::tax::TaxedAmount;
use chrono::NaiveDateTime;
use log::{debug, warn};

/// Builds the quarterly schedule of one contract record.
pub struct ScheduleBuilder<'a> {
    config: &'a Configuration,
}

/// Record fields after validation.
struct ValidatedRecord {
    reference: NaiveDateTime,
    base_value: f64,
    rates: Vec<f64>,
}

impl<'a> ScheduleBuilder<'a> {
    pub fn new(config: &'a Configuration) -> Self {
        Self { config }
    }

    /// Builds the schedule or folds the failure into a placeholder. Never errors.
    ///
    /// `position` is the record's index in its dataset, used to name records without an id.
    pub fn build(&self, record: &ContractRecord, position: usize) -> ScheduleResult {
        let identity = record.identity(position);

        match self.try_build(record) {
            Ok(schedule) => {
                debug!(
                    "Scheduled {} ({}): {} quarters, total with tax {:.2}",
                    identity.id,
                    identity.product_name,
                    schedule.quarters.len(),
                    schedule.totals.total_with_tax
                );
                ScheduleResult {
                    identity,
                    outcome: ScheduleOutcome::Scheduled(schedule),
                }
            }
            Err(e) => {
                warn!("Failed to schedule {}: {}", identity.id, e);
                ScheduleResult::failed(identity, e.kind(), e.to_string())
            }
        }
    }

    pub fn try_build(&self, record: &ContractRecord) -> Result<ContractSchedule> {
        self.config.validate()?;
        let validated = self.validate_record(record)?;

        let amc_start = add_years_clamped(
            validated.reference.date(),
            self.config.start_offset_years,
        )?
        .and_time(validated.reference.time());

        let calculator = QuarterCalculator::new(validated.base_value, self.config.maintenance_fraction);
        let table = calculator.calculate(amc_start, &validated.rates)?;
        let resolved = ResidualResolver::new(&table).resolve();

        let mut quarters = Vec::with_capacity(resolved.len());
        for quarter in resolved {
            let range = quarter.key.quarter.range(quarter.key.year)?;
            let taxed = TaxedAmount::from_total(quarter.total_amount, self.config.tax_rate);

            quarters.push(QuarterSchedule {
                key: quarter.key,
                start_date: range.start,
                end_date: range.end,
                total_amount: quarter.total_amount,
                amount_without_tax: taxed.without_tax,
                amount_with_tax: taxed.with_tax,
                tax_amount: taxed.tax(),
                contributions: quarter.contributions,
            });
        }
        quarters.sort_by_key(|q| q.key);

        let totals = ScheduleTotals {
            total_without_tax: quarters.iter().map(|q| q.amount_without_tax).sum(),
            total_with_tax: quarters.iter().map(|q| q.amount_with_tax).sum(),
        };

        if !totals.total_with_tax.is_finite() || !totals.total_without_tax.is_finite() {
            return Err(AmcError::ComputationFault(format!(
                "Schedule totals are not finite (base value {})",
                validated.base_value
            )));
        }

        Ok(ContractSchedule {
            reference_date: validated.reference.date(),
            amc_start_date: amc_start.date(),
            base_value: validated.base_value,
            total_billable_value: calculator.total_billable(),
            quarters,
            totals,
        })
    }

    fn validate_record(&self, record: &ContractRecord) -> Result<ValidatedRecord> {
        let name = record
            .product_name
            .as_deref()
            .or(record.id.as_deref())
            .unwrap_or("Unknown");

        let raw_date = record.reference_date.as_deref().ok_or_else(|| {
            AmcError::InvalidInput(format!("Missing reference date for product: {}", name))
        })?;
        let reference = parse_reference_date(raw_date)?;

        let base_value = match record.base_value {
            Some(value) if value.is_finite() && value > 0.0 => value,
            other => {
                return Err(AmcError::InvalidInput(format!(
                    "Invalid base value for product {}: {:?}",
                    name, other
                )))
            }
        };

        let rates = match &record.rates {
            Some(rates) => rates.clone(),
            None => self.config.effective_rates(),
        };
        if rates.is_empty() {
            return Err(AmcError::InvalidInput(format!(
                "Empty rate sequence for product: {}",
                name
            )));
        }

        Ok(ValidatedRecord {
            reference,
            base_value,
            rates,
        })
    }
}

pub fn build_schedule(record: &ContractRecord, config: &Configuration) -> ScheduleResult {
    ScheduleBuilder::new(config).build(record, 0)
}

pub fn try_build_schedule(record: &ContractRecord, config: &Configuration) -> Result<ContractSchedule> {
    ScheduleBuilder::new(config).try_build(record)
}
