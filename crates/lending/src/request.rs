use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campusops_core::{AggregateRoot, DomainError, FacultyId, ItemId, Money, RequestId, StudentId};

use crate::{Item, LendingError};

/// Lifecycle status of a lending request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Submitted, awaiting a faculty/admin decision.
    Pending,
    /// Accepted; `quantity` units are reserved.
    Approved,
    /// Picked up; due date running.
    Collected,
    /// Student asked to return; fine assessed if late.
    PendingReturn,
    /// Physically returned; reservation released.
    Returned,
    /// Denied.
    Rejected,
    /// Reservation expired before pickup, or loan past its due date.
    Overdue,
    /// Withdrawn by the student before any decision.
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 8] = [
        RequestStatus::Pending,
        RequestStatus::Approved,
        RequestStatus::Collected,
        RequestStatus::PendingReturn,
        RequestStatus::Returned,
        RequestStatus::Rejected,
        RequestStatus::Overdue,
        RequestStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Collected => "COLLECTED",
            RequestStatus::PendingReturn => "PENDING_RETURN",
            RequestStatus::Returned => "RETURNED",
            RequestStatus::Rejected => "REJECTED",
            RequestStatus::Overdue => "OVERDUE",
            RequestStatus::Cancelled => "CANCELLED",
        }
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown request status '{s}'")))
    }
}

/// Input for a student's new request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
    pub item_id: ItemId,
    pub student_id: StudentId,
    pub quantity: i64,
    pub required_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// A request to borrow `quantity` units of an item.
///
/// Fields are public for storage mapping; state changes go through
/// [`crate::transition`] so every inventory adjustment is accounted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LendingRequest {
    pub id: RequestId,
    pub item_id: ItemId,
    pub student_id: StudentId,
    /// Faculty member who last handled the request.
    pub faculty_id: Option<FacultyId>,
    pub quantity: i64,
    pub status: RequestStatus,
    pub request_date: DateTime<Utc>,
    pub required_date: Option<DateTime<Utc>>,
    pub approval_date: Option<DateTime<Utc>>,
    pub collection_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub fine_amount: Option<Money>,
    pub fine_paid: bool,
    pub payment_proof: Option<String>,
    pub notes: Option<String>,
    pub faculty_notes: Option<String>,
    pub version: u64,
}

impl LendingRequest {
    pub fn submit(id: RequestId, new: NewRequest, item: &Item, now: DateTime<Utc>) -> Result<Self, LendingError> {
        if new.item_id != item.id_typed() {
            return Err(DomainError::invariant("item_id mismatch").into());
        }
        if new.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive").into());
        }
        if new.quantity > item.total_quantity() {
            return Err(LendingError::InsufficientInventory {
                requested: new.quantity,
                available: item.total_quantity(),
            });
        }
        if let Some(required) = new.required_date {
            if required < now {
                return Err(DomainError::validation("required date cannot be in the past").into());
            }
        }

        Ok(Self {
            id,
            item_id: new.item_id,
            student_id: new.student_id,
            faculty_id: None,
            quantity: new.quantity,
            status: RequestStatus::Pending,
            request_date: now,
            required_date: new.required_date,
            approval_date: None,
            collection_date: None,
            due_date: None,
            return_date: None,
            fine_amount: None,
            fine_paid: false,
            payment_proof: None,
            notes: new.notes.filter(|n| !n.trim().is_empty()),
            faculty_notes: None,
            version: 0,
        })
    }

    /// Units this request currently keeps out of the available pool.
    ///
    /// An approved reservation holds stock until collection; a collected loan
    /// holds it until return, including while pending return or overdue. An
    /// overdue request that was never collected is an expired reservation and
    /// has already released its stock.
    pub fn held_quantity(&self) -> i64 {
        if self.is_reserved() || self.is_on_loan() {
            self.quantity
        } else {
            0
        }
    }

    pub fn is_reserved(&self) -> bool {
        self.status == RequestStatus::Approved
    }

    /// Collected and not yet returned.
    pub fn is_on_loan(&self) -> bool {
        match self.status {
            RequestStatus::Collected | RequestStatus::PendingReturn => true,
            RequestStatus::Overdue => self.collection_date.is_some(),
            _ => false,
        }
    }

    /// Whether the fine is outstanding (assessed, positive, not yet paid).
    pub fn has_unpaid_fine(&self) -> bool {
        !self.fine_paid && self.fine_amount.is_some_and(|f| f.is_positive())
    }
}

impl AggregateRoot for LendingRequest {
    type Id = RequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ItemKind, NewItem};

    fn five_projectors() -> Item {
        Item::new(
            ItemId::new(),
            NewItem {
                kind: ItemKind::LabComponent,
                name: "Projector".to_string(),
                total_quantity: 5,
                domain_id: None,
            },
        )
        .unwrap()
    }

    fn new_request(item: &Item, quantity: i64) -> NewRequest {
        NewRequest {
            item_id: item.id_typed(),
            student_id: StudentId::new(),
            quantity,
            required_date: None,
            notes: Some("  ".to_string()),
        }
    }

    #[test]
    fn submitted_requests_start_pending_and_hold_nothing() {
        let item = five_projectors();
        let req = LendingRequest::submit(RequestId::new(), new_request(&item, 2), &item, Utc::now()).unwrap();
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.held_quantity(), 0);
        assert_eq!(req.version, 0);
        assert_eq!(req.notes, None);
    }

    #[test]
    fn rejects_non_positive_quantities() {
        let item = five_projectors();
        let err = LendingRequest::submit(RequestId::new(), new_request(&item, 0), &item, Utc::now()).unwrap_err();
        assert!(matches!(err, LendingError::Domain(DomainError::Validation(_))));
    }

    #[test]
    fn rejects_quantities_beyond_total_stock() {
        let item = five_projectors();
        let err = LendingRequest::submit(RequestId::new(), new_request(&item, 6), &item, Utc::now()).unwrap_err();
        assert!(matches!(err, LendingError::InsufficientInventory { requested: 6, available: 5 }));
    }

    #[test]
    fn rejects_required_dates_in_the_past() {
        let item = five_projectors();
        let now = Utc::now();
        let mut new = new_request(&item, 1);
        new.required_date = Some(now - chrono::Duration::days(1));
        let err = LendingRequest::submit(RequestId::new(), new, &item, now).unwrap_err();
        assert!(matches!(err, LendingError::Domain(DomainError::Validation(_))));
    }

    #[test]
    fn status_parses_from_wire_names() {
        for st in RequestStatus::ALL {
            assert_eq!(st.as_str().parse::<RequestStatus>().unwrap(), st);
        }
        assert!("pending".parse::<RequestStatus>().is_err());
    }
}
