//! Prorated billing from server prices and lifecycle timestamps.

mod calculator;

pub use calculator::{BillingCalculator, BillingSummary, ServerCost, days_in_month, start_of_month};
