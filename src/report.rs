use crate::schema::{DisplayQuarterKey, ScheduleResult};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AmountPair {
    pub without_tax: f64,
    pub with_tax: f64,
}

impl AmountPair {
    fn add(&mut self, without_tax: f64, with_tax: f64) {
        self.without_tax += without_tax;
        self.with_tax += with_tax;
    }
}

/// Billing roll-ups across many contracts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioTotals {
    pub by_quarter: BTreeMap<DisplayQuarterKey, AmountPair>,
    pub by_year: BTreeMap<i32, AmountPair>,
    pub grand_total: AmountPair,
    pub scheduled: usize,
    pub failed: usize,
}

impl PortfolioTotals {
    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a ScheduleResult>,
    {
        let mut totals = Self::default();

        for result in results {
            if !result.is_success() {
                totals.failed += 1;
                continue;
            }
            totals.scheduled += 1;

            for quarter in result.quarters() {
                let (without, with) = (quarter.amount_without_tax, quarter.amount_with_tax);
                totals.by_quarter.entry(quarter.key).or_default().add(without, with);
                totals.by_year.entry(quarter.key.year).or_default().add(without, with);
                totals.grand_total.add(without, with);
            }
        }

        totals
    }

    /// One roll-up per location, keyed by the location echoed on each result.
    pub fn by_location(results: &[ScheduleResult]) -> BTreeMap<String, PortfolioTotals> {
        let mut grouped: BTreeMap<String, Vec<&ScheduleResult>> = BTreeMap::new();
        for result in results {
            grouped
                .entry(result.identity.location.clone())
                .or_default()
                .push(result);
        }

        grouped
            .into_iter()
            .map(|(location, members)| (location, Self::from_results(members)))
            .collect()
    }
}
