// Verification checklist: the second scanning pass that confirms physically
// picked quantities match what was recorded during picking. Pure local logic;
// it only reconciles against data already pulled from the server.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::types::ScannedItem;

/// One checklist entry per distinct SKU across the session, aggregated over
/// every bin the SKU was picked from. Always a projection of scanned items,
/// never primary data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationItem {
    pub sku: String,
    pub product_name: String,
    pub total_quantity: u32,
    pub verified_quantity: u32,
    pub bins: BTreeSet<String>,
}

impl VerificationItem {
    pub fn is_verified(&self) -> bool {
        self.verified_quantity >= self.total_quantity
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerificationError {
    #[error("product {sku} is not part of this session")]
    ProductNotFound { sku: String },
    #[error("product {sku} is already fully verified")]
    AlreadyVerified { sku: String },
}

/// Per-SKU verification state for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationChecklist {
    items: BTreeMap<String, VerificationItem>,
}

impl VerificationChecklist {
    /// Deterministic aggregation: sum quantities per SKU, union bins, start
    /// verification counts at zero.
    pub fn build<'a>(scanned: impl IntoIterator<Item = &'a ScannedItem>) -> Self {
        let mut items: BTreeMap<String, VerificationItem> = BTreeMap::new();
        for scan in scanned {
            let entry = items
                .entry(scan.sku.clone())
                .or_insert_with(|| VerificationItem {
                    sku: scan.sku.clone(),
                    product_name: scan.product_name.clone(),
                    total_quantity: 0,
                    verified_quantity: 0,
                    bins: BTreeSet::new(),
                });
            entry.total_quantity += scan.quantity;
            entry.bins.insert(scan.bin_code.clone());
        }
        Self { items }
    }

    /// Rebuild for a session whose persisted status was already completed:
    /// every entry is marked fully verified, trusting prior completion.
    pub fn build_fully_verified<'a>(scanned: impl IntoIterator<Item = &'a ScannedItem>) -> Self {
        let mut checklist = Self::build(scanned);
        for item in checklist.items.values_mut() {
            item.verified_quantity = item.total_quantity;
        }
        checklist
    }

    /// Apply one verification scan for `sku`. Increments by exactly one;
    /// never lets `verified_quantity` pass `total_quantity`.
    pub fn record_scan(&mut self, sku: &str) -> Result<VerificationItem, VerificationError> {
        let item = self
            .items
            .get_mut(sku)
            .ok_or_else(|| VerificationError::ProductNotFound {
                sku: sku.to_string(),
            })?;
        if item.verified_quantity >= item.total_quantity {
            return Err(VerificationError::AlreadyVerified {
                sku: sku.to_string(),
            });
        }
        item.verified_quantity += 1;
        Ok(item.clone())
    }

    pub fn get(&self, sku: &str) -> Option<&VerificationItem> {
        self.items.get(sku)
    }

    pub fn items(&self) -> impl Iterator<Item = &VerificationItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn all_verified(&self) -> bool {
        !self.items.is_empty() && self.items.values().all(VerificationItem::is_verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mocks::server_item;

    #[test]
    fn build_sums_quantities_per_sku_and_unions_bins() {
        let scans = vec![
            server_item("SKU-1", "B1", 2),
            server_item("SKU-1", "B2", 3),
            server_item("SKU-2", "B1", 1),
        ];
        let checklist = VerificationChecklist::build(&scans);

        let item = checklist.get("SKU-1").unwrap();
        assert_eq!(item.total_quantity, 5);
        assert_eq!(item.verified_quantity, 0);
        assert_eq!(
            item.bins.iter().cloned().collect::<Vec<_>>(),
            vec!["B1".to_string(), "B2".to_string()]
        );
        assert_eq!(checklist.get("SKU-2").unwrap().total_quantity, 1);
        assert_eq!(checklist.len(), 2);
    }

    #[test]
    fn record_scan_increments_until_total_then_rejects() {
        let scans = vec![server_item("SKU-1", "B1", 3)];
        let mut checklist = VerificationChecklist::build(&scans);

        let after_two = {
            checklist.record_scan("SKU-1").unwrap();
            checklist.record_scan("SKU-1").unwrap()
        };
        assert_eq!(after_two.verified_quantity, 2);
        assert!(!after_two.is_verified());

        let after_three = checklist.record_scan("SKU-1").unwrap();
        assert_eq!(after_three.verified_quantity, 3);
        assert!(after_three.is_verified());

        assert_eq!(
            checklist.record_scan("SKU-1"),
            Err(VerificationError::AlreadyVerified {
                sku: "SKU-1".to_string()
            })
        );
        // Rejection never pushes the count past the total.
        assert_eq!(checklist.get("SKU-1").unwrap().verified_quantity, 3);
    }

    #[test]
    fn unknown_sku_is_rejected() {
        let scans = vec![server_item("SKU-1", "B1", 1)];
        let mut checklist = VerificationChecklist::build(&scans);
        assert_eq!(
            checklist.record_scan("SKU-9"),
            Err(VerificationError::ProductNotFound {
                sku: "SKU-9".to_string()
            })
        );
    }

    #[test]
    fn all_verified_iff_every_item_verified() {
        let scans = vec![server_item("SKU-1", "B1", 1), server_item("SKU-2", "B1", 2)];
        let mut checklist = VerificationChecklist::build(&scans);

        assert!(!checklist.all_verified());
        checklist.record_scan("SKU-1").unwrap();
        assert!(!checklist.all_verified());
        checklist.record_scan("SKU-2").unwrap();
        assert!(!checklist.all_verified());
        checklist.record_scan("SKU-2").unwrap();
        assert!(checklist.all_verified());
    }

    #[test]
    fn fully_verified_rebuild_marks_every_item() {
        let scans = vec![server_item("SKU-1", "B1", 2), server_item("SKU-2", "B2", 1)];
        let checklist = VerificationChecklist::build_fully_verified(&scans);
        assert!(checklist.all_verified());
        assert_eq!(checklist.get("SKU-1").unwrap().verified_quantity, 2);
    }
}
