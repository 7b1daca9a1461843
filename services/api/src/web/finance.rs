//! services/api/src/web/finance.rs
//!
//! Admin bookkeeping endpoints: products, expenses, revenues, and the
//! aggregated dashboard summary.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDate, Utc};
use nexus_core::domain::{NewExpense, NewProduct, NewRevenue, Revenue};
use nexus_core::finance::{self, FinanceSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::web::port_failure;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub price: f64,
    pub description: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateExpenseRequest {
    pub product_id: Uuid,
    pub amount: f64,
    pub description: String,
    /// Defaults to today.
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateRevenueRequest {
    pub product_id: Uuid,
    pub amount: f64,
    pub description: Option<String>,
    /// Defaults to today.
    pub date: Option<NaiveDate>,
    /// When set, `amount` includes VAT and is converted before storing.
    #[serde(default)]
    pub vat_inclusive: bool,
}

#[derive(Serialize)]
pub struct CreatedRevenue {
    pub revenue: Revenue,
    /// The VAT split off an amount entered including VAT.
    pub vat_amount: Option<f64>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductFilter {
    pub product_id: Option<Uuid>,
}

type HandlerError = (StatusCode, String);

fn check_amount(amount: f64) -> Result<(), HandlerError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err((StatusCode::BAD_REQUEST, "Beløb skal være et positivt tal".to_string()));
    }
    Ok(())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

//=========================================================================================
// Products
//=========================================================================================

#[utoipa::path(
    get,
    path = "/finance/products",
    responses((status = 200, description = "All products, newest first"))
)]
pub async fn list_products_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HandlerError> {
    let products = state
        .db
        .list_products()
        .await
        .map_err(|e| port_failure("Failed to list products", e))?;
    Ok(Json(products))
}

#[utoipa::path(
    post,
    path = "/finance/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created"),
        (status = 400, description = "Invalid product")
    )
)]
pub async fn create_product_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    if req.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Produktnavn mangler".to_string()));
    }
    check_amount(req.price)?;

    let product = state
        .db
        .create_product(NewProduct {
            name: req.name.trim().to_string(),
            price: req.price,
            description: optional_text(req.description),
        })
        .await
        .map_err(|e| port_failure("Failed to create product", e))?;
    info!(product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

#[utoipa::path(
    delete,
    path = "/finance/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 204, description = "Product deleted with its expenses and revenues"),
        (status = 404, description = "No such product")
    )
)]
pub async fn delete_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    state
        .db
        .delete_product(id)
        .await
        .map_err(|e| port_failure("Failed to delete product", e))?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Expenses
//=========================================================================================

#[utoipa::path(
    get,
    path = "/finance/expenses",
    params(ProductFilter),
    responses((status = 200, description = "Expenses, most recent first"))
)]
pub async fn list_expenses_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ProductFilter>,
) -> Result<impl IntoResponse, HandlerError> {
    let expenses = state
        .db
        .list_expenses(filter.product_id)
        .await
        .map_err(|e| port_failure("Failed to list expenses", e))?;
    Ok(Json(expenses))
}

#[utoipa::path(
    post,
    path = "/finance/expenses",
    request_body = CreateExpenseRequest,
    responses(
        (status = 201, description = "Expense recorded"),
        (status = 400, description = "Invalid expense")
    )
)]
pub async fn create_expense_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateExpenseRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    check_amount(req.amount)?;
    if req.description.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Beskrivelse mangler".to_string()));
    }

    let expense = state
        .db
        .create_expense(NewExpense {
            product_id: req.product_id,
            amount: req.amount,
            description: req.description.trim().to_string(),
            date: req.date.unwrap_or_else(|| Utc::now().date_naive()),
        })
        .await
        .map_err(|e| port_failure("Failed to record expense", e))?;
    Ok((StatusCode::CREATED, Json(expense)))
}

#[utoipa::path(
    delete,
    path = "/finance/expenses/{id}",
    params(("id" = Uuid, Path, description = "Expense id")),
    responses(
        (status = 204, description = "Expense deleted"),
        (status = 404, description = "No such expense")
    )
)]
pub async fn delete_expense_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    state
        .db
        .delete_expense(id)
        .await
        .map_err(|e| port_failure("Failed to delete expense", e))?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Revenues
//=========================================================================================

#[utoipa::path(
    get,
    path = "/finance/revenues",
    params(ProductFilter),
    responses((status = 200, description = "Revenues excluding VAT, most recent first"))
)]
pub async fn list_revenues_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ProductFilter>,
) -> Result<impl IntoResponse, HandlerError> {
    let revenues = state
        .db
        .list_revenues(filter.product_id)
        .await
        .map_err(|e| port_failure("Failed to list revenues", e))?;
    Ok(Json(revenues))
}

#[utoipa::path(
    post,
    path = "/finance/revenues",
    request_body = CreateRevenueRequest,
    responses(
        (status = 201, description = "Revenue recorded excluding VAT"),
        (status = 400, description = "Invalid revenue")
    )
)]
pub async fn create_revenue_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRevenueRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    check_amount(req.amount)?;

    let (amount, vat_amount) = if req.vat_inclusive {
        let split = finance::split_vat_inclusive(req.amount);
        (split.stored_amount, Some(split.vat_amount))
    } else {
        (req.amount, None)
    };

    let revenue = state
        .db
        .create_revenue(NewRevenue {
            product_id: req.product_id,
            amount,
            description: optional_text(req.description),
            date: req.date.unwrap_or_else(|| Utc::now().date_naive()),
        })
        .await
        .map_err(|e| port_failure("Failed to record revenue", e))?;
    Ok((StatusCode::CREATED, Json(CreatedRevenue { revenue, vat_amount })))
}

#[utoipa::path(
    delete,
    path = "/finance/revenues/{id}",
    params(("id" = Uuid, Path, description = "Revenue id")),
    responses(
        (status = 204, description = "Revenue deleted"),
        (status = 404, description = "No such revenue")
    )
)]
pub async fn delete_revenue_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    state
        .db
        .delete_revenue(id)
        .await
        .map_err(|e| port_failure("Failed to delete revenue", e))?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Summary
//=========================================================================================

#[utoipa::path(
    get,
    path = "/finance/summary",
    responses((status = 200, description = "Per-product rollups, lifetime totals, and quarterly VAT"))
)]
pub async fn summary_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FinanceSummary>, HandlerError> {
    let (products, expenses, revenues) = tokio::try_join!(
        state.db.list_products(),
        state.db.list_expenses(None),
        state.db.list_revenues(None),
    )
    .map_err(|e| port_failure("Failed to load finance data", e))?;

    Ok(Json(finance::aggregate(&products, &expenses, &revenues)))
}
