use crate::engine::{ContributionTable, QuarterContribution};
use crate::schema::{Classification, ContributionEntry, DisplayQuarterKey};

/// A display quarter after reconciliation, before tax and rounding.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuarter {
    pub key: DisplayQuarterKey,
    pub total_amount: f64,
    pub contributions: Vec<ContributionEntry>,
}

/// Reconciles contract years that contribute to the same display quarter.
///
/// A contract year touches a given quarter name at most twice: once where its window
/// starts and once where it ends. The earlier touch bills its day-prorated share. The
/// later touch bills what is left of that contract year's full quarter amount, so each
/// contract year bills exactly one full quarter per quarter name and the day count of
/// the tail is never recomputed.
pub struct ResidualResolver<'a> {
    table: &'a ContributionTable,
}

impl<'a> ResidualResolver<'a> {
    pub fn new(table: &'a ContributionTable) -> Self {
        Self { table }
    }

    pub fn resolve(&self) -> Vec<ResolvedQuarter> {
        self.table
            .display_groups()
            .into_iter()
            .map(|(key, members)| {
                let contributions: Vec<ContributionEntry> =
                    members.into_iter().map(|c| self.entry_for(c)).collect();
                let total_amount = contributions.iter().map(|e| e.actual_amount).sum();

                ResolvedQuarter {
                    key,
                    total_amount,
                    contributions,
                }
            })
            .collect()
    }

    fn entry_for(&self, contribution: &QuarterContribution) -> ContributionEntry {
        let series = self
            .table
            .series(contribution.quarter, contribution.contract_year);
        let (actual_amount, classification) = attribute(&series, contribution.year);

        ContributionEntry {
            contract_year: contribution.contract_year,
            rate: contribution.rate,
            full_amount: contribution.full_amount,
            prorated_amount: contribution.prorated_amount,
            actual_amount,
            classification,
            overlap_days: contribution.overlap_days,
            total_days: contribution.total_days,
        }
    }
}

/// Actual amount for the occurrence in `year` of a chronologically ordered series.
///
/// Later occurrences receive `max(0, full - already billed)`; with two occurrences this
/// is `full - first.prorated`.
fn attribute(series: &[&QuarterContribution], year: i32) -> (f64, Classification) {
    let mut billed = 0.0;

    for (position, occurrence) in series.iter().enumerate() {
        let (actual, classification) = if position == 0 {
            (occurrence.prorated_amount.max(0.0), Classification::Prorated)
        } else {
            (
                (occurrence.full_amount - billed).max(0.0),
                Classification::Residual,
            )
        };

        if occurrence.year == year {
            return (actual, classification);
        }
        billed += actual;
    }

    (0.0, Classification::Prorated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::FiscalQuarter;
    use crate::engine::QuarterCalculator;
    use chrono::NaiveDate;

    fn contribution(year: i32, prorated: f64, full: f64) -> QuarterContribution {
        QuarterContribution {
            quarter: FiscalQuarter::Jfm,
            contract_year: 0,
            year,
            rate: 0.25,
            prorated_amount: prorated,
            full_amount: full,
            overlap_days: 0,
            total_days: 90,
        }
    }

    #[test]
    fn test_straddled_quarter_reconciles() {
        let start = NaiveDate::from_ymd_opt(2027, 3, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let table = QuarterCalculator::new(100_000.0, 0.4)
            .calculate(start, &[0.2, 0.3])
            .unwrap();
        let resolved = ResidualResolver::new(&table).resolve();

        let shared = resolved
            .iter()
            .find(|q| q.key == DisplayQuarterKey::new(2028, FiscalQuarter::Jfm))
            .unwrap();
        assert_eq!(shared.contributions.len(), 2);

        let ending = &shared.contributions[0];
        assert_eq!(ending.contract_year, 0);
        assert_eq!(ending.classification, Classification::Residual);
        let first_touch = 2_000.0 * 21.0 / 90.0;
        assert!((ending.actual_amount - (2_000.0 - first_touch)).abs() < 1e-9);
        assert!(ending.actual_amount >= 0.0);
        assert!(ending.actual_amount <= ending.full_amount);

        let starting = &shared.contributions[1];
        assert_eq!(starting.contract_year, 1);
        assert_eq!(starting.classification, Classification::Prorated);
        assert!((starting.actual_amount - 3_000.0 * 21.0 / 91.0).abs() < 1e-9);

        let expected_total = ending.actual_amount + starting.actual_amount;
        assert!((shared.total_amount - expected_total).abs() < 1e-12);
    }

    #[test]
    fn test_each_contract_year_bills_its_full_amount() {
        let start = NaiveDate::from_ymd_opt(2026, 11, 20)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let rates = [0.2, 0.225, 0.275, 0.3];
        let calculator = QuarterCalculator::new(250_000.0, 0.4);
        let table = calculator.calculate(start, &rates).unwrap();
        let resolved = ResidualResolver::new(&table).resolve();

        for (year, rate) in rates.iter().enumerate() {
            let billed: f64 = resolved
                .iter()
                .flat_map(|q| q.contributions.iter())
                .filter(|e| e.contract_year == year)
                .map(|e| e.actual_amount)
                .sum();
            let expected = calculator.total_billable() * rate;
            assert!(
                (billed - expected).abs() < 1e-6,
                "Contract year {} billed {}, expected {}",
                year,
                billed,
                expected
            );
        }
    }

    #[test]
    fn test_single_occurrence_is_prorated() {
        let mut table = ContributionTable::new();
        table.insert(contribution(2027, 40.0, 100.0));
        let resolved = ResidualResolver::new(&table).resolve();

        assert_eq!(resolved.len(), 1);
        assert_eq!(
            resolved[0].contributions[0].classification,
            Classification::Prorated
        );
        assert_eq!(resolved[0].total_amount, 40.0);
    }

    #[test]
    fn test_residual_never_negative() {
        let mut table = ContributionTable::new();
        table.insert(contribution(2027, 120.0, 100.0));
        table.insert(contribution(2028, 10.0, 100.0));
        let resolved = ResidualResolver::new(&table).resolve();

        let tail = &resolved[1].contributions[0];
        assert_eq!(tail.classification, Classification::Residual);
        assert_eq!(tail.actual_amount, 0.0);
    }

    #[test]
    fn test_longer_series_allocates_cumulatively() {
        let mut table = ContributionTable::new();
        table.insert(contribution(2027, 30.0, 100.0));
        table.insert(contribution(2028, 50.0, 100.0));
        table.insert(contribution(2029, 40.0, 100.0));
        let resolved = ResidualResolver::new(&table).resolve();

        let actuals: Vec<f64> = resolved
            .iter()
            .map(|q| q.contributions[0].actual_amount)
            .collect();
        assert_eq!(actuals, vec![30.0, 70.0, 0.0]);
    }
}
