//! Typed domain entities.
//!
//! These structs carry domain fields only. Synchronization attributes
//! (`server_id`, `local_id`, `synced`, timestamps) live on
//! [`EntityRecord`](crate::EntityRecord), which stores an entity as a JSON
//! object in its `fields`.

use crate::{error::Result, Error, Fields, ServerId, Table, Timestamp};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A domain type stored in exactly one [`Table`].
pub trait Entity: Serialize + DeserializeOwned {
    const TABLE: Table;
}

/// Serialize an entity into the field map stored on a record.
pub fn to_fields<E: Entity>(entity: &E) -> Result<Fields> {
    match serde_json::to_value(entity) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::NotAnObject {
            table: E::TABLE.name().to_string(),
        }),
        Err(e) => Err(Error::Decode(e.to_string())),
    }
}

/// Lifecycle of receipts, deliveries and transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DocumentStatus {
    #[default]
    Draft,
    Waiting,
    Ready,
    Done,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactType {
    Vendor,
    Customer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub sku: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<ServerId>,
    pub unit_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub unit_of_measure: String,
    pub reorder_level: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warehouse {
    pub name: String,
    pub short_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub short_code: String,
    pub warehouse_id: ServerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub product_id: ServerId,
    pub warehouse_id: ServerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<ServerId>,
    pub on_hand: f64,
    pub free_to_use: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub contact_type: ContactType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub reference: String,
    #[serde(default)]
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_contact_id: Option<ServerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_warehouse_id: Option<ServerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<ServerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub receipt_id: ServerId,
    pub product_id: ServerId,
    pub quantity: f64,
    pub unit_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub reference: String,
    #[serde(default)]
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_warehouse_id: Option<ServerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_contact_id: Option<ServerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<ServerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryItem {
    pub delivery_id: ServerId,
    pub product_id: ServerId,
    pub quantity: f64,
    pub unit_cost: f64,
    #[serde(default)]
    pub alert_out_of_stock: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub reference: String,
    #[serde(default)]
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_warehouse_id: Option<ServerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_warehouse_id: Option<ServerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_location_id: Option<ServerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_location_id: Option<ServerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<ServerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferItem {
    pub transfer_id: ServerId,
    pub product_id: ServerId,
    pub quantity: f64,
}

/// A physical count that corrects the system quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub reference: String,
    pub product_id: ServerId,
    pub warehouse_id: ServerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<ServerId>,
    pub counted_quantity: f64,
    pub system_quantity: f64,
    pub difference: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<ServerId>,
    pub date: Timestamp,
}

macro_rules! impl_entity {
    ($($ty:ty => $table:expr),* $(,)?) => {
        $(impl Entity for $ty {
            const TABLE: Table = $table;
        })*
    };
}

impl_entity! {
    Product => Table::Products,
    Category => Table::Categories,
    Warehouse => Table::Warehouses,
    Location => Table::Locations,
    Stock => Table::Stock,
    Contact => Table::Contacts,
    Receipt => Table::Receipts,
    ReceiptItem => Table::ReceiptItems,
    Delivery => Table::Deliveries,
    DeliveryItem => Table::DeliveryItems,
    Transfer => Table::Transfers,
    TransferItem => Table::TransferItems,
    StockAdjustment => Table::Adjustments,
}
