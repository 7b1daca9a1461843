//! crates/nexus_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or HTTP client; the `Serialize`
//! derives exist so the service layer can hand them straight to JSON responses.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//=========================================================================================
// Identity & Session
//=========================================================================================

/// The authenticated principal returned by the hosted auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
    /// Profile metadata (`full_name`) supplied at sign-up.
    pub full_name: Option<String>,
}

/// A token-bearing wrapper around an [`Identity`]. The tokens are opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub identity: Identity,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Values of the `role` column in the `user_roles` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

//=========================================================================================
// Finance Records
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: f64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: f64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expense {
    pub id: Uuid,
    pub product_id: Uuid,
    pub amount: f64,
    pub description: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub product_id: Uuid,
    pub amount: f64,
    pub description: String,
    pub date: NaiveDate,
}

/// A sale. `amount` is always stored excluding VAT.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Revenue {
    pub id: Uuid,
    pub product_id: Uuid,
    pub amount: f64,
    pub description: Option<String>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRevenue {
    pub product_id: Uuid,
    pub amount: f64,
    pub description: Option<String>,
    pub date: NaiveDate,
}

//=========================================================================================
// Documents
//=========================================================================================

/// The folder a document is filed under in the admin area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DocumentCategory {
    Billeder,
    Faktura,
    Kontrakt,
    Andre,
}

impl DocumentCategory {
    pub const ALL: [DocumentCategory; 4] = [
        DocumentCategory::Billeder,
        DocumentCategory::Faktura,
        DocumentCategory::Kontrakt,
        DocumentCategory::Andre,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::Billeder => "Billeder",
            DocumentCategory::Faktura => "Faktura",
            DocumentCategory::Kontrakt => "Kontrakt",
            DocumentCategory::Andre => "Andre",
        }
    }

    /// Parses a stored category label. Unknown or empty labels file under `Andre`.
    pub fn from_label(label: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(label.trim()))
            .unwrap_or(DocumentCategory::Andre)
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub download_count: i64,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub category: DocumentCategory,
    pub file_url: String,
    pub uploaded_by: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub title: String,
    pub description: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub file_url: String,
    pub category: DocumentCategory,
    pub is_public: bool,
    pub uploaded_by: Uuid,
}

//=========================================================================================
// Contact Messages
//=========================================================================================

/// A message submitted through the public contact form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactMessage {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub subject: Option<String>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewContactMessage {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub subject: Option<String>,
    pub message: String,
}

impl NewContactMessage {
    /// Checks the fields the contact form marks as required.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Navn mangler".to_string());
        }
        if self.message.trim().is_empty() {
            return Err("Besked mangler".to_string());
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err("Ugyldig email".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_category_labels_fall_back_to_andre() {
        assert_eq!(DocumentCategory::from_label("faktura"), DocumentCategory::Faktura);
        assert_eq!(DocumentCategory::from_label(""), DocumentCategory::Andre);
        assert_eq!(DocumentCategory::from_label("Receipts"), DocumentCategory::Andre);
    }

    #[test]
    fn contact_message_requires_name_message_and_email() {
        let mut msg = NewContactMessage {
            name: "Ida".to_string(),
            email: "ida@example.dk".to_string(),
            phone: None,
            company: None,
            subject: None,
            message: "Hej".to_string(),
        };
        assert!(msg.validate().is_ok());

        msg.email = "not-an-email".to_string();
        assert!(msg.validate().is_err());

        msg.email = "ida@example.dk".to_string();
        msg.message = "   ".to_string();
        assert!(msg.validate().is_err());
    }
}
