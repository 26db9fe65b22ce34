//! Registry of synchronized tables.
//!
//! A [`Table`] names both the local store table and the remote collection
//! served at `/api/{name}`.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every entity table the sync layer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Products,
    Categories,
    Warehouses,
    Locations,
    Stock,
    Contacts,
    Receipts,
    ReceiptItems,
    Deliveries,
    DeliveryItems,
    Transfers,
    TransferItems,
    Adjustments,
}

impl Table {
    /// All tables, in schema order.
    pub const ALL: [Table; 13] = [
        Table::Products,
        Table::Categories,
        Table::Warehouses,
        Table::Locations,
        Table::Stock,
        Table::Contacts,
        Table::Receipts,
        Table::ReceiptItems,
        Table::Deliveries,
        Table::DeliveryItems,
        Table::Transfers,
        Table::TransferItems,
        Table::Adjustments,
    ];

    /// Tables refreshed from the server on every cycle unless configured otherwise.
    pub const DEFAULT_PULL: [Table; 8] = [
        Table::Products,
        Table::Categories,
        Table::Warehouses,
        Table::Locations,
        Table::Stock,
        Table::Contacts,
        Table::Receipts,
        Table::Deliveries,
    ];

    /// Canonical name: local table name and API path segment.
    pub const fn name(self) -> &'static str {
        match self {
            Table::Products => "products",
            Table::Categories => "categories",
            Table::Warehouses => "warehouses",
            Table::Locations => "locations",
            Table::Stock => "stock",
            Table::Contacts => "contacts",
            Table::Receipts => "receipts",
            Table::ReceiptItems => "receipt_items",
            Table::Deliveries => "deliveries",
            Table::DeliveryItems => "delivery_items",
            Table::Transfers => "transfers",
            Table::TransferItems => "transfer_items",
            Table::Adjustments => "adjustments",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Table::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::UnknownTable(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for table in Table::ALL {
            assert_eq!(table.name().parse::<Table>().unwrap(), table);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let result = "widgets".parse::<Table>();
        assert_eq!(result, Err(Error::UnknownTable("widgets".into())));
    }

    #[test]
    fn default_pull_is_subset_of_all() {
        for table in Table::DEFAULT_PULL {
            assert!(Table::ALL.contains(&table));
        }
        assert!(!Table::DEFAULT_PULL.contains(&Table::ReceiptItems));
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&Table::DeliveryItems).unwrap();
        assert_eq!(json, "\"delivery_items\"");
        assert_eq!(Table::DeliveryItems.to_string(), "delivery_items");
    }
}
