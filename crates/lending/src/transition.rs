//! Request lifecycle: one transition table for every actor.
//!
//! Each edge is keyed by (actor role, current status, target status) and
//! names the effect applied along it. Applying an edge never touches storage;
//! it returns a [`TransitionOutcome`] carrying the next request state and the
//! exact inventory delta, which the caller must persist together.
//!
//! | Role | From | To | Inventory |
//! |---|---|---|---|
//! | student | APPROVED (window since request elapsed) | OVERDUE | +qty |
//! | student | COLLECTED, OVERDUE loan, PENDING_RETURN | PENDING_RETURN | 0 (fine assessed, proof stored) |
//! | student | PENDING | CANCELLED | 0 |
//! | staff | PENDING | APPROVED | -qty |
//! | staff | APPROVED | COLLECTED | 0 (due date set) |
//! | staff | COLLECTED, PENDING_RETURN, OVERDUE loan | RETURNED | +qty |
//! | staff | APPROVED | OVERDUE | +qty |
//! | staff | PENDING, APPROVED | REJECTED | +qty if APPROVED |

use chrono::{DateTime, Utc};

use campusops_auth::{Actor, Role};

use crate::{Item, LendingError, LendingPolicy, LendingRequest, RequestStatus};

use crate::RequestStatus::{
    Approved, Cancelled, Collected, Overdue, Pending, PendingReturn, Rejected, Returned,
};

/// A requested status change, as submitted by an actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub target: RequestStatus,
    pub faculty_notes: Option<String>,
    pub payment_proof: Option<String>,
    pub payment_verified: bool,
}

impl StatusChange {
    pub fn to(target: RequestStatus) -> Self {
        Self {
            target,
            faculty_notes: None,
            payment_proof: None,
            payment_verified: false,
        }
    }
}

/// Result of applying one or more edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: RequestStatus,
    pub to: RequestStatus,
    /// Change to the item's available quantity (negative reserves).
    pub inventory_delta: i64,
    /// Next request state. The version is left for the store to bump.
    pub request: LendingRequest,
}

impl TransitionOutcome {
    /// Compose with an outcome computed from this one's resulting state.
    pub fn then(self, next: TransitionOutcome) -> TransitionOutcome {
        TransitionOutcome {
            from: self.from,
            to: next.to,
            inventory_delta: self.inventory_delta + next.inventory_delta,
            request: next.request,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    ExpireReservation,
    RequestReturn,
    Cancel,
    Approve,
    Collect,
    Return,
    MarkOverdue,
    Reject,
}

struct Edge {
    roles: &'static [Role],
    from: &'static [RequestStatus],
    to: RequestStatus,
    effect: Effect,
}

const STUDENT: &[Role] = &[Role::Student];
const STAFF: &[Role] = &[Role::Faculty, Role::Admin];

const TABLE: &[Edge] = &[
    Edge { roles: STUDENT, from: &[Approved], to: Overdue, effect: Effect::ExpireReservation },
    Edge { roles: STUDENT, from: &[Collected, Overdue, PendingReturn], to: PendingReturn, effect: Effect::RequestReturn },
    Edge { roles: STUDENT, from: &[Pending], to: Cancelled, effect: Effect::Cancel },
    Edge { roles: STAFF, from: &[Pending], to: Approved, effect: Effect::Approve },
    Edge { roles: STAFF, from: &[Approved], to: Collected, effect: Effect::Collect },
    Edge { roles: STAFF, from: &[Collected, PendingReturn, Overdue], to: Returned, effect: Effect::Return },
    Edge { roles: STAFF, from: &[Approved], to: Overdue, effect: Effect::MarkOverdue },
    Edge { roles: STAFF, from: &[Pending, Approved], to: Rejected, effect: Effect::Reject },
];

fn find_edge(role: Role, from: RequestStatus, to: RequestStatus) -> Option<&'static Edge> {
    TABLE
        .iter()
        .find(|e| e.to == to && e.from.contains(&from) && e.roles.contains(&role))
}

/// Targets the table lists for this actor from the request's current status.
///
/// Preconditions (reservation window, stock, payment) are not evaluated here.
pub fn allowed_targets(role: Role, request: &LendingRequest) -> Vec<RequestStatus> {
    TABLE
        .iter()
        .filter(|e| e.roles.contains(&role) && e.from.contains(&request.status))
        .map(|e| e.to)
        .collect()
}

fn no_edge_reason(role: Role, from: RequestStatus, to: RequestStatus) -> String {
    let reachable_by_other_role = Role::ALL
        .into_iter()
        .any(|r| r != role && find_edge(r, from, to).is_some());

    if from == to {
        format!("request is already {to}")
    } else if reachable_by_other_role {
        format!("role {role} may not make this change")
    } else {
        "transition is not part of the request lifecycle".to_string()
    }
}

/// Decide what happens when `actor` asks to move `request` to `change.target`.
///
/// `item` must be the request's item as currently stored; it is only read.
pub fn decide(
    actor: &Actor,
    request: &LendingRequest,
    item: &Item,
    change: &StatusChange,
    policy: &LendingPolicy,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, LendingError> {
    let role = actor.role();
    let from = request.status;
    let to = change.target;

    let edge = find_edge(role, from, to)
        .ok_or_else(|| LendingError::illegal(from, to, no_edge_reason(role, from, to)))?;

    let mut next = request.clone();
    let inventory_delta = match edge.effect {
        Effect::ExpireReservation => {
            if !policy.reservation_expired(request.request_date, now) {
                return Err(LendingError::illegal(from, to, "reservation window has not elapsed"));
            }
            request.quantity
        }
        Effect::RequestReturn => {
            ensure_on_loan(request, to)?;
            assess_fine(&mut next, policy, now);
            if let Some(proof) = change.payment_proof.as_ref().filter(|p| !p.trim().is_empty()) {
                next.payment_proof = Some(proof.clone());
            }
            0
        }
        Effect::Cancel => 0,
        Effect::Approve => {
            if item.available_quantity() < request.quantity {
                return Err(LendingError::InsufficientInventory {
                    requested: request.quantity,
                    available: item.available_quantity(),
                });
            }
            next.approval_date = Some(now);
            -request.quantity
        }
        Effect::Collect => {
            next.collection_date = Some(now);
            next.due_date = Some(policy.due_date_from(now));
            0
        }
        Effect::Return => {
            ensure_on_loan(request, to)?;
            assess_fine(&mut next, policy, now);
            if next.has_unpaid_fine() {
                if !change.payment_verified {
                    return Err(LendingError::PaymentNotVerified {
                        fine: next.fine_amount.unwrap_or_default(),
                    });
                }
                next.fine_paid = true;
            }
            next.return_date = Some(now);
            request.quantity
        }
        Effect::MarkOverdue => request.quantity,
        Effect::Reject => {
            if from == Approved {
                request.quantity
            } else {
                0
            }
        }
    };

    next.status = to;
    if let Actor::Faculty { faculty_id, .. } = actor {
        next.faculty_id = Some(*faculty_id);
    }
    if role.is_staff() {
        if let Some(notes) = change.faculty_notes.as_ref().filter(|n| !n.trim().is_empty()) {
            next.faculty_notes = Some(notes.clone());
        }
    }

    Ok(TransitionOutcome {
        from,
        to,
        inventory_delta,
        request: next,
    })
}

/// Read-triggered overdue detection.
///
/// - An approved reservation past its window becomes OVERDUE and releases its stock.
/// - A collected loan past its due date becomes OVERDUE and is fined; its stock
///   stays out until the item is returned.
/// - A loan already pending return or overdue has its fine brought up to date.
///
/// Returns `None` when nothing changes.
pub fn refresh_overdue(
    request: &LendingRequest,
    policy: &LendingPolicy,
    now: DateTime<Utc>,
) -> Option<TransitionOutcome> {
    let from = request.status;
    let mut next = request.clone();

    let inventory_delta = match from {
        Approved => {
            if !policy.reservation_expired(request.request_date, now) {
                return None;
            }
            next.status = Overdue;
            request.quantity
        }
        Collected | PendingReturn | Overdue if request.is_on_loan() => {
            let due = request.due_date?;
            if now <= due {
                return None;
            }
            assess_fine(&mut next, policy, now);
            if from == Collected {
                next.status = Overdue;
            }
            0
        }
        _ => return None,
    };

    if next == *request {
        return None;
    }

    Some(TransitionOutcome {
        from,
        to: next.status,
        inventory_delta,
        request: next,
    })
}

/// Deletion guard: only expired reservations may be removed.
///
/// An overdue loan still has the item out; deleting it would lose track of
/// stock that has to come back.
pub fn ensure_deletable(request: &LendingRequest) -> Result<(), LendingError> {
    match request.status {
        Overdue if !request.is_on_loan() => Ok(()),
        Overdue => Err(LendingError::NotDeletable {
            status: request.status,
            reason: "the item must be returned first".to_string(),
        }),
        status => Err(LendingError::NotDeletable {
            status,
            reason: "only overdue requests can be deleted".to_string(),
        }),
    }
}

fn ensure_on_loan(request: &LendingRequest, to: RequestStatus) -> Result<(), LendingError> {
    if request.is_on_loan() {
        Ok(())
    } else {
        Err(LendingError::illegal(
            request.status,
            to,
            "item was never collected",
        ))
    }
}

fn assess_fine(request: &mut LendingRequest, policy: &LendingPolicy, now: DateTime<Utc>) {
    if request.fine_paid {
        return;
    }
    if let Some(fine) = request.due_date.and_then(|due| policy.fine_for(due, now)) {
        request.fine_amount = Some(fine);
    }
}
