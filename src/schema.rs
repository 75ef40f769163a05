use crate::calendar::FiscalQuarter;
use crate::error::{AmcError, ErrorKind, Result};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_RATES: [f64; 4] = [0.20, 0.225, 0.275, 0.30];
pub const DEFAULT_MAINTENANCE_FRACTION: f64 = 0.4;
pub const DEFAULT_TAX_RATE: f64 = 0.18;
pub const DEFAULT_CONTRACT_YEARS: usize = 4;
pub const DEFAULT_PROGRESS_INTERVAL: usize = 50;
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_START_OFFSET_YEARS: i32 = 3;

/// Step added per extra year when the rate sequence is shorter than the contract.
const RATE_EXTENSION_STEP: f64 = 0.025;
const RATE_EXTENSION_FALLBACK: f64 = 0.30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Configuration {
    #[schemars(
        description = "Default per-year rates as fractions of the total billable value, one per contract year (e.g. [0.2, 0.225, 0.275, 0.3])."
    )]
    pub rates: Vec<f64>,

    #[schemars(
        description = "Fraction of a contract's base value that is billable across all contract years."
    )]
    pub maintenance_fraction: f64,

    #[schemars(description = "Tax rate applied on top of the tax-exclusive quarter amount.")]
    pub tax_rate: f64,

    #[schemars(
        description = "Number of contract years. The default rate sequence is truncated or extended to this length."
    )]
    pub contract_years: usize,

    #[schemars(description = "Emit a progress event after every N processed records.")]
    pub progress_interval: usize,

    #[schemars(description = "Maximum number of records per dispatched batch.")]
    pub chunk_size: usize,

    #[schemars(
        description = "Years between a record's reference date and the start of billing."
    )]
    pub start_offset_years: i32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            rates: DEFAULT_RATES.to_vec(),
            maintenance_fraction: DEFAULT_MAINTENANCE_FRACTION,
            tax_rate: DEFAULT_TAX_RATE,
            contract_years: DEFAULT_CONTRACT_YEARS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
            start_offset_years: DEFAULT_START_OFFSET_YEARS,
        }
    }
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        if !self.maintenance_fraction.is_finite() || self.maintenance_fraction < 0.0 {
            return Err(AmcError::InvalidConfiguration(format!(
                "maintenance_fraction must be a non-negative number, got {}",
                self.maintenance_fraction
            )));
        }
        if !self.tax_rate.is_finite() || self.tax_rate < 0.0 {
            return Err(AmcError::InvalidConfiguration(format!(
                "tax_rate must be a non-negative number, got {}",
                self.tax_rate
            )));
        }
        if self.contract_years == 0 {
            return Err(AmcError::InvalidConfiguration(
                "contract_years must be at least 1".to_string(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(AmcError::InvalidConfiguration(
                "progress_interval must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(AmcError::InvalidConfiguration(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The default rate sequence resized to exactly `contract_years` entries.
    ///
    /// Missing years continue from the last configured rate, adding 2.5 points per year.
    pub fn effective_rates(&self) -> Vec<f64> {
        let mut rates: Vec<f64> = self.rates.iter().take(self.contract_years).copied().collect();
        let last = rates.last().copied().unwrap_or(RATE_EXTENSION_FALLBACK);
        let existing = rates.len();

        for extra in 1..=self.contract_years.saturating_sub(existing) {
            rates.push(last + extra as f64 * RATE_EXTENSION_STEP);
        }
        rates
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Configuration)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContractRecord {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub product_name: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub invoice_number: Option<String>,

    #[serde(default)]
    #[schemars(
        description = "Reference date (e.g. go-live) in YYYY-MM-DD format. Billing starts a fixed number of years later."
    )]
    pub reference_date: Option<String>,

    #[serde(default)]
    #[schemars(description = "Positive monetary base value (invoice value) of the asset.")]
    pub base_value: Option<f64>,

    #[serde(default = "default_quantity")]
    #[schemars(description = "Informational unit count. Never scales amounts.")]
    pub quantity: u32,

    #[serde(default)]
    #[schemars(
        description = "Per-year rates for this contract. When absent the configuration's rates apply."
    )]
    pub rates: Option<Vec<f64>>,
}

fn default_quantity() -> u32 {
    1
}

impl Default for ContractRecord {
    fn default() -> Self {
        Self {
            id: None,
            product_name: None,
            location: None,
            invoice_number: None,
            reference_date: None,
            base_value: None,
            quantity: default_quantity(),
            rates: None,
        }
    }
}

impl ContractRecord {
    pub fn new(id: impl Into<String>, reference_date: impl Into<String>, base_value: f64) -> Self {
        Self {
            id: Some(id.into()),
            reference_date: Some(reference_date.into()),
            base_value: Some(base_value),
            ..Default::default()
        }
    }

    pub fn with_rates(mut self, rates: Vec<f64>) -> Self {
        self.rates = Some(rates);
        self
    }

    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Identity echoed on results. `position` names records that carry no id.
    pub fn identity(&self, position: usize) -> ContractIdentity {
        ContractIdentity {
            id: self
                .id
                .clone()
                .unwrap_or_else(|| format!("record-{}", position)),
            product_name: self
                .product_name
                .clone()
                .unwrap_or_else(|| "Unknown Product".to_string()),
            location: self
                .location
                .clone()
                .unwrap_or_else(|| "Unknown Location".to_string()),
            invoice_number: self
                .invoice_number
                .clone()
                .unwrap_or_else(|| "Unknown Invoice".to_string()),
            quantity: self.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContractIdentity {
    pub id: String,
    pub product_name: String,
    pub location: String,
    pub invoice_number: String,
    pub quantity: u32,
}

/// A (calendar year, fiscal quarter) billing bucket. Orders chronologically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct DisplayQuarterKey {
    pub year: i32,
    pub quarter: FiscalQuarter,
}

impl DisplayQuarterKey {
    pub fn new(year: i32, quarter: FiscalQuarter) -> Self {
        Self { year, quarter }
    }
}

impl fmt::Display for DisplayQuarterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.quarter, self.year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum Classification {
    #[schemars(
        description = "First touch of a quarter by a contract year: billed for the overlapping share of its days."
    )]
    Prorated,

    #[schemars(
        description = "Later touch of the same quarter by the same contract year: billed for whatever the earlier touch left of the full quarter amount."
    )]
    Residual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContributionEntry {
    /// 0-based contract-year index.
    pub contract_year: usize,
    pub rate: f64,
    pub full_amount: f64,
    pub prorated_amount: f64,
    pub actual_amount: f64,
    pub classification: Classification,
    pub overlap_days: i64,
    pub total_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuarterSchedule {
    pub key: DisplayQuarterKey,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Unrounded sum of the ledger's actual amounts.
    pub total_amount: f64,
    pub amount_without_tax: f64,
    pub amount_with_tax: f64,
    pub tax_amount: f64,
    pub contributions: Vec<ContributionEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleTotals {
    pub total_without_tax: f64,
    pub total_with_tax: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContractSchedule {
    pub reference_date: NaiveDate,
    pub amc_start_date: NaiveDate,
    pub base_value: f64,
    /// Base value times the maintenance fraction.
    pub total_billable_value: f64,
    pub quarters: Vec<QuarterSchedule>,
    pub totals: ScheduleTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScheduleOutcome {
    Scheduled(ContractSchedule),
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleResult {
    pub identity: ContractIdentity,
    pub outcome: ScheduleOutcome,
}

impl ScheduleResult {
    pub fn failed(identity: ContractIdentity, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            identity,
            outcome: ScheduleOutcome::Failed {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ScheduleOutcome::Scheduled(_))
    }

    pub fn schedule(&self) -> Option<&ContractSchedule> {
        match &self.outcome {
            ScheduleOutcome::Scheduled(schedule) => Some(schedule),
            ScheduleOutcome::Failed { .. } => None,
        }
    }

    pub fn quarters(&self) -> &[QuarterSchedule] {
        self.schedule().map(|s| s.quarters.as_slice()).unwrap_or(&[])
    }

    pub fn total_with_tax(&self) -> f64 {
        self.schedule().map(|s| s.totals.total_with_tax).unwrap_or(0.0)
    }

    pub fn error(&self) -> Option<(ErrorKind, &str)> {
        match &self.outcome {
            ScheduleOutcome::Failed { kind, message } => Some((*kind, message.as_str())),
            ScheduleOutcome::Scheduled(_) => None,
        }
    }
}
