//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use nexus_core::domain::{
    ContactMessage, Document, DocumentCategory, Expense, NewContactMessage, NewDocument,
    NewExpense, NewProduct, NewRevenue, Product, Revenue, Role,
};
use nexus_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Deletes return `NotFound` when no row matched.
fn expect_deleted(result: sqlx::postgres::PgQueryResult, what: &str, id: Uuid) -> PortResult<()> {
    if result.rows_affected() == 0 {
        return Err(PortError::NotFound(format!("{} {} not found", what, id)));
    }
    Ok(())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProductRecord {
    id: Uuid,
    name: String,
    price: f64,
    description: Option<String>,
}
impl ProductRecord {
    fn to_domain(self) -> Product {
        Product {
            id: self.id,
            name: self.name,
            price: self.price,
            description: self.description,
        }
    }
}

#[derive(FromRow)]
struct ExpenseRecord {
    id: Uuid,
    product_id: Uuid,
    amount: f64,
    description: String,
    date: NaiveDate,
}
impl ExpenseRecord {
    fn to_domain(self) -> Expense {
        Expense {
            id: self.id,
            product_id: self.product_id,
            amount: self.amount,
            description: self.description,
            date: self.date,
        }
    }
}

#[derive(FromRow)]
struct RevenueRecord {
    id: Uuid,
    product_id: Uuid,
    amount: f64,
    description: Option<String>,
    date: NaiveDate,
}
impl RevenueRecord {
    fn to_domain(self) -> Revenue {
        Revenue {
            id: self.id,
            product_id: self.product_id,
            amount: self.amount,
            description: self.description,
            date: self.date,
        }
    }
}

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    title: String,
    description: Option<String>,
    file_name: String,
    file_type: String,
    file_size: i64,
    download_count: i64,
    is_public: bool,
    created_at: DateTime<Utc>,
    category: Option<String>,
    file_url: String,
    uploaded_by: Option<Uuid>,
}
impl DocumentRecord {
    fn to_domain(self) -> Document {
        Document {
            id: self.id,
            title: self.title,
            description: self.description.unwrap_or_default(),
            file_name: self.file_name,
            file_type: self.file_type,
            file_size: self.file_size,
            download_count: self.download_count,
            is_public: self.is_public,
            created_at: self.created_at,
            category: DocumentCategory::from_label(self.category.as_deref().unwrap_or_default()),
            file_url: self.file_url,
            uploaded_by: self.uploaded_by,
        }
    }
}

#[derive(FromRow)]
struct ContactMessageRecord {
    id: Uuid,
    name: String,
    email: String,
    phone: Option<String>,
    company: Option<String>,
    subject: Option<String>,
    message: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}
impl ContactMessageRecord {
    fn to_domain(self) -> ContactMessage {
        ContactMessage {
            id: self.id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            subject: self.subject,
            message: self.message,
            is_read: self.is_read,
            created_at: self.created_at,
        }
    }
}

const DOCUMENT_COLUMNS: &str = "id, title, description, file_name, file_type, file_size, \
     download_count, is_public, created_at, category, file_url, uploaded_by";

const MESSAGE_COLUMNS: &str =
    "id, name, email, phone, company, subject, message, is_read, created_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn has_role(&self, user_id: Uuid, role: Role) -> PortResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM user_roles WHERE user_id = $1 AND role = $2)",
        )
        .bind(user_id)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unavailable(e.to_string()))?;
        Ok(exists)
    }

    // --- Products ---

    async fn create_product(&self, product: NewProduct) -> PortResult<Product> {
        let record = sqlx::query_as::<_, ProductRecord>(
            "INSERT INTO products (id, name, price, description) VALUES ($1, $2, $3, $4) \
             RETURNING id, name, price, description",
        )
        .bind(Uuid::new_v4())
        .bind(&product.name)
        .bind(product.price)
        .bind(&product.description)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_products(&self) -> PortResult<Vec<Product>> {
        let records = sqlx::query_as::<_, ProductRecord>(
            "SELECT id, name, price, description FROM products ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_product(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        expect_deleted(result, "Product", id)
    }

    // --- Expenses ---

    async fn create_expense(&self, expense: NewExpense) -> PortResult<Expense> {
        let record = sqlx::query_as::<_, ExpenseRecord>(
            "INSERT INTO expenses (id, product_id, amount, description, date) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, product_id, amount, description, date",
        )
        .bind(Uuid::new_v4())
        .bind(expense.product_id)
        .bind(expense.amount)
        .bind(&expense.description)
        .bind(expense.date)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_expenses(&self, product_id: Option<Uuid>) -> PortResult<Vec<Expense>> {
        let records = sqlx::query_as::<_, ExpenseRecord>(
            "SELECT id, product_id, amount, description, date FROM expenses \
             WHERE $1::uuid IS NULL OR product_id = $1 ORDER BY date DESC",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_expense(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        expect_deleted(result, "Expense", id)
    }

    // --- Revenues ---

    async fn create_revenue(&self, revenue: NewRevenue) -> PortResult<Revenue> {
        let record = sqlx::query_as::<_, RevenueRecord>(
            "INSERT INTO revenues (id, product_id, amount, description, date) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, product_id, amount, description, date",
        )
        .bind(Uuid::new_v4())
        .bind(revenue.product_id)
        .bind(revenue.amount)
        .bind(&revenue.description)
        .bind(revenue.date)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_revenues(&self, product_id: Option<Uuid>) -> PortResult<Vec<Revenue>> {
        let records = sqlx::query_as::<_, RevenueRecord>(
            "SELECT id, product_id, amount, description, date FROM revenues \
             WHERE $1::uuid IS NULL OR product_id = $1 ORDER BY date DESC",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_revenue(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM revenues WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        expect_deleted(result, "Revenue", id)
    }

    // --- Documents ---

    async fn create_document(&self, document: NewDocument) -> PortResult<Document> {
        let sql = format!(
            "INSERT INTO documents (id, title, description, file_name, file_type, file_size, \
             file_url, category, is_public, uploaded_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
            DOCUMENT_COLUMNS
        );
        let record = sqlx::query_as::<_, DocumentRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&document.title)
            .bind(&document.description)
            .bind(&document.file_name)
            .bind(&document.file_type)
            .bind(document.file_size)
            .bind(&document.file_url)
            .bind(document.category.as_str())
            .bind(document.is_public)
            .bind(document.uploaded_by)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_documents(&self) -> PortResult<Vec<Document>> {
        let sql = format!(
            "SELECT {} FROM documents ORDER BY created_at DESC",
            DOCUMENT_COLUMNS
        );
        let records = sqlx::query_as::<_, DocumentRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_document(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        expect_deleted(result, "Document", id)
    }

    // --- Contact Messages ---

    async fn create_message(&self, message: NewContactMessage) -> PortResult<ContactMessage> {
        let sql = format!(
            "INSERT INTO contact_messages (id, name, email, phone, company, subject, message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            MESSAGE_COLUMNS
        );
        let record = sqlx::query_as::<_, ContactMessageRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(message.name.trim())
            .bind(message.email.trim())
            .bind(&message.phone)
            .bind(&message.company)
            .bind(&message.subject)
            .bind(&message.message)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_messages(&self) -> PortResult<Vec<ContactMessage>> {
        let sql = format!(
            "SELECT {} FROM contact_messages ORDER BY created_at DESC",
            MESSAGE_COLUMNS
        );
        let records = sqlx::query_as::<_, ContactMessageRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn mark_message_read(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("UPDATE contact_messages SET is_read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Message {} not found", id)));
        }
        Ok(())
    }
}
