//! crates/nexus_core/src/finance.rs
//!
//! Bookkeeping rollups for the finance dashboard: per-product totals, lifetime
//! totals, and VAT owed per quarter. Everything here is a pure function of the
//! loaded products, expenses, and revenues.
//!
//! Revenue amounts are stored excluding VAT. Entry-time conversion rounds to two
//! decimals; the rollups below do not round, so the VAT summed from individual
//! entries can differ from `total_vat_owed` by a trailing cent.

use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::{Expense, Product, Revenue};

/// Danish standard VAT (moms).
pub const VAT_RATE: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRollup {
    pub product_id: Uuid,
    pub name: String,
    pub price: f64,
    pub total_expense: f64,
    pub total_revenue: f64,
    pub profit: f64,
    /// Profit as a percentage of revenue, one decimal; `0` without revenue.
    pub margin_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarterVat {
    /// `YYYY-Qn`.
    pub key: String,
    pub revenue: f64,
    pub vat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinanceSummary {
    pub per_product: Vec<ProductRollup>,
    pub lifetime_revenue: f64,
    pub lifetime_profit: f64,
    pub total_vat_owed: f64,
    /// Most recent quarter first.
    pub quarterly_vat: Vec<QuarterVat>,
    /// Expenses and revenues whose product is not among the loaded products.
    pub unattributed_expense: f64,
    pub unattributed_revenue: f64,
}

/// A VAT-inclusive amount split into the stored (exclusive) part and the tax.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VatSplit {
    pub stored_amount: f64,
    pub vat_amount: f64,
}

pub fn aggregate(products: &[Product], expenses: &[Expense], revenues: &[Revenue]) -> FinanceSummary {
    let per_product = products
        .iter()
        .map(|p| {
            let total_expense: f64 = expenses
                .iter()
                .filter(|e| e.product_id == p.id)
                .map(|e| e.amount)
                .sum();
            let total_revenue: f64 = revenues
                .iter()
                .filter(|r| r.product_id == p.id)
                .map(|r| r.amount)
                .sum();
            let profit = total_revenue - total_expense;
            ProductRollup {
                product_id: p.id,
                name: p.name.clone(),
                price: p.price,
                total_expense,
                total_revenue,
                profit,
                margin_percent: margin_percent(profit, total_revenue),
            }
        })
        .collect();

    let lifetime_revenue: f64 = revenues.iter().map(|r| r.amount).sum();
    let lifetime_expense: f64 = expenses.iter().map(|e| e.amount).sum();

    let known = |id: &Uuid| products.iter().any(|p| &p.id == id);
    let unattributed_expense = expenses
        .iter()
        .filter(|e| !known(&e.product_id))
        .map(|e| e.amount)
        .sum();
    let unattributed_revenue = revenues
        .iter()
        .filter(|r| !known(&r.product_id))
        .map(|r| r.amount)
        .sum();

    FinanceSummary {
        per_product,
        lifetime_revenue,
        lifetime_profit: lifetime_revenue - lifetime_expense,
        total_vat_owed: lifetime_revenue * VAT_RATE,
        quarterly_vat: quarterly_vat(revenues),
        unattributed_expense,
        unattributed_revenue,
    }
}

fn margin_percent(profit: f64, revenue: f64) -> f64 {
    if revenue > 0.0 {
        round_to(profit / revenue * 100.0, 1)
    } else {
        0.0
    }
}

/// `YYYY-Qn` for a revenue date. January through March is Q1.
pub fn quarter_key(date: chrono::NaiveDate) -> String {
    format!("{:04}-Q{}", date.year(), date.month0() / 3 + 1)
}

/// Buckets revenue (and the VAT on it) by quarter, most recent first.
///
/// Keys are fixed-width, so sorting them as strings is chronological.
pub fn quarterly_vat(revenues: &[Revenue]) -> Vec<QuarterVat> {
    let mut buckets: BTreeMap<String, f64> = BTreeMap::new();
    for revenue in revenues {
        *buckets.entry(quarter_key(revenue.date)).or_insert(0.0) += revenue.amount;
    }
    buckets
        .into_iter()
        .rev()
        .map(|(key, revenue)| QuarterVat {
            key,
            revenue,
            vat: revenue * VAT_RATE,
        })
        .collect()
}

/// Converts an amount entered including VAT into the amount to store.
///
/// The stored amount is `entered / 1.25` rounded to øre; the VAT shown to the user
/// is whatever remains.
pub fn split_vat_inclusive(entered: f64) -> VatSplit {
    let stored_amount = round_to(entered / (1.0 + VAT_RATE), 2);
    VatSplit {
        stored_amount,
        vat_amount: round_to(entered - stored_amount, 2),
    }
}

/// Rounds half away from zero, so the result is symmetric in sign:
/// `-12.25` becomes `-12.3` just as `12.25` becomes `12.3`. Negative margins
/// therefore display with the same magnitude as the matching positive ones.
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
