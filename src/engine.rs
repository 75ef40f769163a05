use crate::calendar::{quarter_dates, FiscalQuarter};
use crate::contract_year::ContractYearWindow;
use crate::error::Result;
use crate::schema::DisplayQuarterKey;
use chrono::NaiveDateTime;
use log::{debug, warn};
use std::collections::BTreeMap;

/// One contract year's share of one fiscal-quarter occurrence. Never rounded.
#[derive(Debug, Clone, PartialEq)]
pub struct QuarterContribution {
    pub quarter: FiscalQuarter,
    pub contract_year: usize,
    /// Calendar year in which the quarter occurrence starts.
    pub year: i32,
    pub rate: f64,
    pub prorated_amount: f64,
    pub full_amount: f64,
    pub overlap_days: i64,
    pub total_days: i64,
}

impl QuarterContribution {
    pub fn display_key(&self) -> DisplayQuarterKey {
        DisplayQuarterKey::new(self.year, self.quarter)
    }

    fn series_key(&self) -> SeriesKey {
        (self.quarter, self.contract_year, self.year)
    }
}

/// (quarter, contract year, calendar year)
type SeriesKey = (FiscalQuarter, usize, i32);

/// Arena of contributions with two indices: by composite key and by display quarter.
#[derive(Debug, Clone, Default)]
pub struct ContributionTable {
    arena: Vec<QuarterContribution>,
    by_key: BTreeMap<SeriesKey, usize>,
    by_display: BTreeMap<DisplayQuarterKey, Vec<usize>>,
}

impl ContributionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a contribution. A second insert for the same composite key replaces the first.
    pub fn insert(&mut self, contribution: QuarterContribution) {
        let key = contribution.series_key();
        if let Some(&slot) = self.by_key.get(&key) {
            self.arena[slot] = contribution;
            return;
        }

        let slot = self.arena.len();
        self.by_display
            .entry(contribution.display_key())
            .or_default()
            .push(slot);
        self.by_key.insert(key, slot);
        self.arena.push(contribution);
    }

    pub fn get(
        &self,
        quarter: FiscalQuarter,
        contract_year: usize,
        year: i32,
    ) -> Option<&QuarterContribution> {
        self.by_key
            .get(&(quarter, contract_year, year))
            .map(|&slot| &self.arena[slot])
    }

    /// Every occurrence of `quarter` touched by `contract_year`, earliest calendar year first.
    pub fn series(&self, quarter: FiscalQuarter, contract_year: usize) -> Vec<&QuarterContribution> {
        self.by_key
            .range((quarter, contract_year, i32::MIN)..=(quarter, contract_year, i32::MAX))
            .map(|(_, &slot)| &self.arena[slot])
            .collect()
    }

    /// Contributions grouped by display quarter, chronologically. Members are in
    /// ascending contract-year order.
    pub fn display_groups(&self) -> Vec<(DisplayQuarterKey, Vec<&QuarterContribution>)> {
        self.by_display
            .iter()
            .map(|(key, slots)| {
                let mut members: Vec<&QuarterContribution> =
                    slots.iter().map(|&slot| &self.arena[slot]).collect();
                members.sort_by_key(|c| c.contract_year);
                (*key, members)
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuarterContribution> {
        self.arena.iter()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

/// Prorates each contract year's quarterly amount across the fiscal quarters it overlaps.
pub struct QuarterCalculator {
    base_value: f64,
    maintenance_fraction: f64,
}

impl QuarterCalculator {
    pub fn new(base_value: f64, maintenance_fraction: f64) -> Self {
        Self {
            base_value,
            maintenance_fraction,
        }
    }

    pub fn total_billable(&self) -> f64 {
        self.base_value * self.maintenance_fraction
    }

    pub fn full_quarter_amount(&self, rate: f64) -> f64 {
        self.total_billable() * rate / 4.0
    }

    pub fn calculate(
        &self,
        contract_start: NaiveDateTime,
        rates: &[f64],
    ) -> Result<ContributionTable> {
        let mut table = ContributionTable::new();

        for (contract_year, &rate) in rates.iter().enumerate() {
            if !rate.is_finite() || rate < 0.0 {
                warn!(
                    "Skipping invalid rate {} for contract year {}",
                    rate,
                    contract_year + 1
                );
                continue;
            }

            let window = ContractYearWindow::new(contract_start, contract_year)?;
            let window_days = window.date_range();
            let full_amount = self.full_quarter_amount(rate);

            for year in window.calendar_years() {
                for (quarter, range) in quarter_dates(year)? {
                    if !range.intersects(&window_days) {
                        continue;
                    }

                    let overlap_days = range.overlap_days(&window_days);
                    let total_days = range.days();
                    let prorated_amount = full_amount * (overlap_days as f64 / total_days as f64);

                    table.insert(QuarterContribution {
                        quarter,
                        contract_year,
                        year,
                        rate,
                        prorated_amount,
                        full_amount,
                        overlap_days,
                        total_days,
                    });
                }
            }
        }

        debug!(
            "Calculated {} quarter contributions across {} contract years",
            table.len(),
            rates.len()
        );

        Ok(table)
    }
}
