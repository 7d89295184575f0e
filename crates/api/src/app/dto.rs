use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campusops_core::{DomainId, FacultyId, ItemId, RequestId, StudentId};
use campusops_infra::{RequestDetails, SubmitRequest};
use campusops_lending::{Item, ItemKind, LendingRequest, NewItem, RequestStatus, StatusChange};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateItemBody {
    pub name: String,
    pub total_quantity: i64,
    pub domain_id: Option<String>,
}

impl CreateItemBody {
    pub fn into_new_item(self, kind: ItemKind) -> Result<NewItem, axum::response::Response> {
        let domain_id = self.domain_id.as_deref().map(parse_id::<DomainId>).transpose()?;
        Ok(NewItem {
            kind,
            name: self.name,
            total_quantity: self.total_quantity,
            domain_id,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequestBody {
    pub item_id: String,
    pub quantity: i64,
    pub required_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl SubmitRequestBody {
    pub fn into_submission(self) -> Result<SubmitRequest, axum::response::Response> {
        Ok(SubmitRequest {
            item_id: parse_id::<ItemId>(&self.item_id)?,
            quantity: self.quantity,
            required_date: self.required_date,
            notes: self.notes,
        })
    }
}

/// Body of `PATCH /<requests>/:id`.
#[derive(Debug, Deserialize)]
pub struct ChangeStatusBody {
    pub status: String,
    pub faculty_notes: Option<String>,
    pub payment_proof: Option<String>,
    pub payment_verified: Option<bool>,
}

impl ChangeStatusBody {
    pub fn into_change(self) -> Result<StatusChange, axum::response::Response> {
        Ok(StatusChange {
            target: parse_status(&self.status)?,
            faculty_notes: self.faculty_notes,
            payment_proof: self.payment_proof,
            payment_verified: self.payment_verified.unwrap_or(false),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<String>,
}

impl ListRequestsQuery {
    pub fn status(&self) -> Result<Option<RequestStatus>, axum::response::Response> {
        self.status.as_deref().map(parse_status).transpose()
    }
}

// -------------------------
// Response views
// -------------------------

#[derive(Debug, Serialize)]
pub struct ItemView {
    pub id: ItemId,
    pub kind: ItemKind,
    pub name: String,
    pub total_quantity: i64,
    pub available_quantity: i64,
    pub domain_id: Option<DomainId>,
}

impl From<&Item> for ItemView {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id_typed(),
            kind: item.kind(),
            name: item.name().to_string(),
            total_quantity: item.total_quantity(),
            available_quantity: item.available_quantity(),
            domain_id: item.domain_id(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestView {
    pub id: RequestId,
    pub item_id: ItemId,
    pub student_id: StudentId,
    pub faculty_id: Option<FacultyId>,
    pub quantity: i64,
    pub status: RequestStatus,
    pub request_date: DateTime<Utc>,
    pub required_date: Option<DateTime<Utc>>,
    pub approval_date: Option<DateTime<Utc>>,
    pub collection_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    /// Decimal string, e.g. `"15.00"`.
    pub fine_amount: Option<String>,
    pub fine_paid: bool,
    pub payment_proof: Option<String>,
    pub notes: Option<String>,
    pub faculty_notes: Option<String>,
    pub version: u64,
    pub item: ItemView,
}

impl RequestView {
    fn new(request: &LendingRequest, item: &Item) -> Self {
        Self {
            id: request.id,
            item_id: request.item_id,
            student_id: request.student_id,
            faculty_id: request.faculty_id,
            quantity: request.quantity,
            status: request.status,
            request_date: request.request_date,
            required_date: request.required_date,
            approval_date: request.approval_date,
            collection_date: request.collection_date,
            due_date: request.due_date,
            return_date: request.return_date,
            fine_amount: request.fine_amount.map(|f| f.to_string()),
            fine_paid: request.fine_paid,
            payment_proof: request.payment_proof.clone(),
            notes: request.notes.clone(),
            faculty_notes: request.faculty_notes.clone(),
            version: request.version,
            item: ItemView::from(item),
        }
    }
}

impl From<&RequestDetails> for RequestView {
    fn from(details: &RequestDetails) -> Self {
        Self::new(&details.request, &details.item)
    }
}

// -------------------------
// Parsing helpers
// -------------------------

/// Unwrap a JSON body, answering malformed input with the standard error body.
pub fn body<T>(payload: Result<axum::Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    payload
        .map(|axum::Json(v)| v)
        .map_err(|rejection| errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text()))
}

pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}

fn parse_status(raw: &str) -> Result<RequestStatus, axum::response::Response> {
    raw.trim().to_ascii_uppercase().parse::<RequestStatus>().map_err(|_| {
        let allowed: Vec<&str> = RequestStatus::ALL.iter().map(RequestStatus::as_str).collect();
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_status",
            format!("status must be one of: {}", allowed.join(", ")),
        )
    })
}
