use core::str::FromStr;

use serde::{Deserialize, Serialize};

use campusops_core::{DomainError, DomainId, Entity, ItemId};

use crate::LendingError;

/// Which catalogue an item belongs to.
///
/// Library items and lab components follow the same lending rules; the kind
/// only decides which routes and listings they appear under.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    LibraryItem,
    LabComponent,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::LibraryItem => "library_item",
            ItemKind::LabComponent => "lab_component",
        }
    }
}

impl core::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "library_item" => Ok(ItemKind::LibraryItem),
            "lab_component" => Ok(ItemKind::LabComponent),
            other => Err(DomainError::validation(format!("unknown item kind '{other}'"))),
        }
    }
}

/// Input for stocking a new item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub kind: ItemKind,
    pub name: String,
    pub total_quantity: i64,
    pub domain_id: Option<DomainId>,
}

/// Inventory item with a reservation counter.
///
/// Invariant: `0 <= available_quantity <= total_quantity`, always.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    id: ItemId,
    kind: ItemKind,
    name: String,
    total_quantity: i64,
    available_quantity: i64,
    domain_id: Option<DomainId>,
}

impl Item {
    pub fn new(id: ItemId, new: NewItem) -> Result<Self, DomainError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if new.total_quantity < 0 {
            return Err(DomainError::validation("total quantity cannot be negative"));
        }

        Ok(Self {
            id,
            kind: new.kind,
            name: name.to_string(),
            total_quantity: new.total_quantity,
            available_quantity: new.total_quantity,
            domain_id: new.domain_id,
        })
    }

    /// Rehydrate a stored item, rejecting rows that break the quantity bounds.
    pub fn restore(
        id: ItemId,
        kind: ItemKind,
        name: String,
        total_quantity: i64,
        available_quantity: i64,
        domain_id: Option<DomainId>,
    ) -> Result<Self, DomainError> {
        if available_quantity < 0 || available_quantity > total_quantity {
            return Err(DomainError::invariant(format!(
                "item {id}: available quantity {available_quantity} outside 0..={total_quantity}"
            )));
        }

        Ok(Self {
            id,
            kind,
            name,
            total_quantity,
            available_quantity,
            domain_id,
        })
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_quantity(&self) -> i64 {
        self.total_quantity
    }

    pub fn available_quantity(&self) -> i64 {
        self.available_quantity
    }

    pub fn domain_id(&self) -> Option<DomainId> {
        self.domain_id
    }

    /// Whether `delta` keeps the counter within bounds.
    pub fn can_apply(&self, delta: i64) -> bool {
        let next = self.available_quantity + delta;
        (0..=self.total_quantity).contains(&next)
    }

    /// Move the available counter by `delta` (negative reserves, positive restores).
    pub fn apply_delta(&mut self, delta: i64) -> Result<(), LendingError> {
        if delta < 0 && self.available_quantity + delta < 0 {
            return Err(LendingError::InsufficientInventory {
                requested: -delta,
                available: self.available_quantity,
            });
        }
        if !self.can_apply(delta) {
            return Err(DomainError::invariant(format!(
                "available quantity cannot exceed total ({} + {delta} > {})",
                self.available_quantity, self.total_quantity
            ))
            .into());
        }

        self.available_quantity += delta;
        Ok(())
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
