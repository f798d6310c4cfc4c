//! Billing calculator.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Server, ServerStatus};
use crate::utils::money::round_cents;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Cost of one billable server for the current month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCost {
    pub server_id: String,
    pub name: String,
    pub status: ServerStatus,
    pub monthly_price: f64,
    /// Whole days (rounded up) billed this month.
    pub days_used: u32,
    pub prorated_cost: f64,
}

/// Month-to-date billing for a set of servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSummary {
    pub period_start: DateTime<Utc>,
    pub days_in_month: u32,
    pub days_elapsed: u32,
    /// Sum of full monthly prices.
    pub estimated_monthly_cost: f64,
    /// Sum of prorated costs so far.
    pub current_month_usage: f64,
    /// Usage extrapolated to the whole month.
    pub projected_monthly_cost: f64,
    pub servers: Vec<ServerCost>,
}

/// First instant of the UTC month containing `now`.
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Number of days in the UTC month containing `now`.
pub fn days_in_month(now: DateTime<Utc>) -> u32 {
    let (year, month) = (now.year(), now.month());
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 30,
    }
}

/// Whole days from `from` to `to`, rounded up; zero if `to` is not after `from`.
fn whole_days_ceil(from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
    let elapsed = (to - from).num_milliseconds();
    if elapsed <= 0 {
        return 0;
    }
    u32::try_from((elapsed + MS_PER_DAY - 1) / MS_PER_DAY).unwrap_or(u32::MAX)
}

/// Stateless cost calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct BillingCalculator;

impl BillingCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Whether a server accrues cost.
    pub fn is_billable(server: &Server) -> bool {
        server.status.is_billable()
    }

    /// Month-to-date costs for `servers` as of `now`.
    pub fn calculate(&self, servers: &[Server], now: DateTime<Utc>) -> BillingSummary {
        let period_start = start_of_month(now);
        let days_in_month = days_in_month(now);
        let days_elapsed = whole_days_ceil(period_start, now);

        let mut estimated = 0.0;
        let mut usage = 0.0;
        let mut costs = Vec::new();

        for server in servers.iter().filter(|s| Self::is_billable(s)) {
            let billed_from = server.created_at.max(period_start);
            let days_used = whole_days_ceil(billed_from, now).min(days_elapsed);
            let prorated = server.monthly_price() / f64::from(days_in_month) * f64::from(days_used);

            estimated += server.monthly_price();
            usage += prorated;
            costs.push(ServerCost {
                server_id: server.id.clone(),
                name: server.name.clone(),
                status: server.status,
                monthly_price: server.monthly_price(),
                days_used,
                prorated_cost: round_cents(prorated),
            });
        }

        let projected = if days_elapsed == 0 {
            0.0
        } else {
            usage / f64::from(days_elapsed) * f64::from(days_in_month)
        };

        BillingSummary {
            period_start,
            days_in_month,
            days_elapsed,
            estimated_monthly_cost: round_cents(estimated),
            current_month_usage: round_cents(usage),
            projected_monthly_cost: round_cents(projected),
            servers: costs,
        }
    }

    /// Prorated cost of a single server, rounded to cents.
    pub fn prorated_cost(&self, server: &Server, now: DateTime<Utc>) -> f64 {
        if !Self::is_billable(server) {
            return 0.0;
        }
        let summary = self.calculate(std::slice::from_ref(server), now);
        summary.current_month_usage
    }

    /// Projected end-of-month total if nothing changes.
    pub fn project_remaining(&self, summary: &BillingSummary) -> f64 {
        round_cents((summary.projected_monthly_cost - summary.current_month_usage).max(0.0))
    }
}
