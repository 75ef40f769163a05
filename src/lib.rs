//! # AMC Schedule Builder
//!
//! A library for turning multi-year maintenance contracts into quarterly billing
//! schedules on a fixed, non-calendar fiscal-quarter convention.
//!
//! ## Core Concepts
//!
//! - **Fiscal quarters**: JFM (Jan 5 - Apr 4), AMJ (Apr 5 - Jul 4), JAS (Jul 5 - Oct 4) and
//!   OND (Oct 5 - Jan 4 of the next year)
//! - **Contract years**: one-year windows anchored on the billing start date, each with its
//!   own rate
//! - **Proration**: a contract year's quarterly amount is split by the days it shares with
//!   each quarter occurrence
//! - **Residuals**: when a contract year touches the same quarter twice, the later touch bills
//!   what the earlier one left of the full quarter
//! - **Batches**: many records are processed off the caller's thread with progress events and
//!   per-record failure isolation
//!
//! ## Example
//!
//! ```rust
//! use amc_schedule_builder::*;
//!
//! let config = Configuration::default();
//! let record = ContractRecord::new("INV-001", "2024-01-05", 100_000.0)
//!     .with_product_name("Core Switch");
//!
//! let result = build_schedule(&record, &config);
//! assert!(result.is_success());
//!
//! for quarter in result.quarters() {
//!     println!("{}: {:.2}", quarter.key, quarter.amount_with_tax);
//! }
//! ```

pub mod builder;
pub mod calendar;
pub mod contract_year;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod processor;
pub mod protocol;
pub mod report;
pub mod resolver;
pub mod schema;
pub mod tax;
pub mod worker;

pub use builder::{build_schedule, try_build_schedule, ScheduleBuilder};
pub use calendar::{overlap_days, quarter_dates, DateRange, FiscalQuarter};
pub use contract_year::{contract_year_windows, ContractYearWindow};
pub use dispatch::{partition, run_dataset, DatasetOutcome, DatasetProgress};
pub use engine::{ContributionTable, QuarterCalculator, QuarterContribution};
pub use error::{AmcError, ErrorKind, Result};
pub use processor::{BatchProcessor, EventSink};
pub use protocol::{decode_command, BatchSummary, Command, Event};
pub use report::{AmountPair, PortfolioTotals};
pub use resolver::{ResidualResolver, ResolvedQuarter};
pub use schema::*;
pub use tax::{round_currency, TaxedAmount};
pub use worker::BatchWorker;
