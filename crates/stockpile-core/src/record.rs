//! Record types: the typed business rows an import owns.
//!
//! A record is immutable once created. Its identity across imports is its
//! [`RecordKey`], a content hash of the typed payload, so the same business
//! fact uploaded twice compares equal even though the rows have different ids.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::Result;

// ─── Vocabulary ──────────────────────────────────────────────────────────────

/// Item codes. Tightly controlled to keep stored data clean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Item {
  Faceshield,
  Gown,
  GownMaterial,
  Coveralls,
  #[serde(rename = "n95_mask")]
  N95MaskNonSurgical,
  #[serde(rename = "n95_mask_surgical")]
  N95MaskSurgical,
  #[serde(rename = "kn95_mask")]
  Kn95Mask,
  SurgicalMask,
  MaskOther,
  Goggles,
  Gloves,
  #[serde(rename = "ventilators_full")]
  VentilatorsFullService,
  #[serde(rename = "ventilators_non_full")]
  VentilatorsNonFullService,
  PpeOther,
  Unknown,
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
  #[default]
  Each,
  Yard,
  Lb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
  Purchase,
  Make,
}

// ─── Payloads ────────────────────────────────────────────────────────────────

/// An order placed with (or a make request sent to) a vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseValue {
  pub order_id:    String,
  pub order_type:  OrderType,
  pub item:        Item,
  #[serde(default)]
  pub description: String,
  pub quantity:    i64,
  #[serde(default)]
  pub unit:        Unit,
  pub vendor:      String,
  /// Total cost in cents, when known.
  #[serde(default)]
  pub cost:        Option<i64>,
}

/// A stock count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryValue {
  pub item:     Item,
  pub quantity: i64,
  #[serde(default)]
  pub unit:     Unit,
  #[serde(default)]
  pub location: Option<String>,
}

/// A delivery expected against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledDeliveryValue {
  pub order_id:      String,
  pub item:          Item,
  pub quantity:      i64,
  pub vendor:        String,
  /// `None` when the vendor has not committed to a date.
  #[serde(default)]
  pub delivery_date: Option<NaiveDate>,
}

/// Goods received at the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptValue {
  pub order_id:      String,
  pub item:          Item,
  pub quantity:      i64,
  pub vendor:        String,
  pub received_date: NaiveDate,
}

/// Goods sent out from the warehouse to a facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityDeliveryValue {
  pub facility:      String,
  pub item:          Item,
  pub quantity:      i64,
  pub delivery_date: NaiveDate,
}

// ─── Kind ────────────────────────────────────────────────────────────────────

/// The record type discriminant. Ordered so reports list kinds stably.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordKind {
  Purchase,
  Inventory,
  ScheduledDelivery,
  Receipt,
  FacilityDelivery,
}

// ─── RecordValue ─────────────────────────────────────────────────────────────

/// The typed payload of a record. The variant name is the [`RecordKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RecordValue {
  Purchase(PurchaseValue),
  Inventory(InventoryValue),
  ScheduledDelivery(ScheduledDeliveryValue),
  Receipt(ReceiptValue),
  FacilityDelivery(FacilityDeliveryValue),
}

impl RecordValue {
  pub fn kind(&self) -> RecordKind {
    match self {
      Self::Purchase(_) => RecordKind::Purchase,
      Self::Inventory(_) => RecordKind::Inventory,
      Self::ScheduledDelivery(_) => RecordKind::ScheduledDelivery,
      Self::Receipt(_) => RecordKind::Receipt,
      Self::FacilityDelivery(_) => RecordKind::FacilityDelivery,
    }
  }

  pub fn item(&self) -> Item {
    match self {
      Self::Purchase(v) => v.item,
      Self::Inventory(v) => v.item,
      Self::ScheduledDelivery(v) => v.item,
      Self::Receipt(v) => v.item,
      Self::FacilityDelivery(v) => v.item,
    }
  }

  pub fn quantity(&self) -> i64 {
    match self {
      Self::Purchase(v) => v.quantity,
      Self::Inventory(v) => v.quantity,
      Self::ScheduledDelivery(v) => v.quantity,
      Self::Receipt(v) => v.quantity,
      Self::FacilityDelivery(v) => v.quantity,
    }
  }

  /// Serialise the inner payload (without the kind tag) for storage.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Rebuild from a kind and the stored JSON payload.
  pub fn from_parts(kind: RecordKind, data: serde_json::Value) -> Result<Self> {
    let wrapped = serde_json::json!({ "kind": kind, "data": data });
    Ok(serde_json::from_value(wrapped)?)
  }

  /// Content key: SHA-256 over the kind and the canonical JSON payload.
  ///
  /// The payload passes through `serde_json::Value`, whose object keys are
  /// sorted, so equal payloads always produce equal keys.
  pub fn record_key(&self) -> Result<RecordKey> {
    let mut hasher = Sha256::new();
    hasher.update(<&'static str>::from(self.kind()).as_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(&self.to_json()?)?);
    Ok(RecordKey(hex::encode(hasher.finalize())))
  }
}

// ─── Key ─────────────────────────────────────────────────────────────────────

/// Identity of a record's business content, independent of its owning import.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
  /// Wrap a previously computed key, e.g. one read back from storage.
  pub fn from_stored(hex: impl Into<String>) -> Self { Self(hex.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for RecordKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A persisted record. Never updated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
  pub record_id:  Uuid,
  /// The owning import.
  pub import_id:  Uuid,
  pub record_key: RecordKey,
  pub value:      RecordValue,
  /// The source row as ingested; kept for audit, not part of the key.
  pub raw_data:   Option<serde_json::Value>,
  pub created_at: DateTime<Utc>,
}

impl Record {
  pub fn kind(&self) -> RecordKind { self.value.kind() }
}

/// Input to [`crate::store::ImportStore::attach_records`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecord {
  pub value:    RecordValue,
  #[serde(default)]
  pub raw_data: Option<serde_json::Value>,
}

impl NewRecord {
  pub fn new(value: RecordValue) -> Self { Self { value, raw_data: None } }

  /// Materialise the record for `import_id`, assigning id, key and timestamp.
  pub fn into_record(self, import_id: Uuid) -> Result<Record> {
    Ok(Record {
      record_id: Uuid::new_v4(),
      import_id,
      record_key: self.value.record_key()?,
      value: self.value,
      raw_data: self.raw_data,
      created_at: Utc::now(),
    })
  }
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator;

  use super::*;

  fn purchase(order_id: &str, quantity: i64) -> RecordValue {
    RecordValue::Purchase(PurchaseValue {
      order_id: order_id.into(),
      order_type: OrderType::Purchase,
      item: Item::N95MaskNonSurgical,
      description: "3M 1860".into(),
      quantity,
      unit: Unit::Each,
      vendor: "Acme Medical".into(),
      cost: Some(125_000),
    })
  }

  #[test]
  fn equal_payloads_share_a_key() {
    let a = purchase("PO-1", 100).record_key().unwrap();
    let b = purchase("PO-1", 100).record_key().unwrap();
    assert_eq!(a, b);
    assert_eq!(a.as_str().len(), 64);
  }

  #[test]
  fn any_field_change_changes_the_key() {
    let base = purchase("PO-1", 100).record_key().unwrap();
    assert_ne!(base, purchase("PO-1", 101).record_key().unwrap());
    assert_ne!(base, purchase("PO-2", 100).record_key().unwrap());
  }

  #[test]
  fn raw_data_is_not_part_of_the_key() {
    let mut with_raw = NewRecord::new(purchase("PO-1", 100));
    with_raw.raw_data = Some(serde_json::json!({ "row": 12 }));
    let a = with_raw.into_record(Uuid::new_v4()).unwrap();
    let b = NewRecord::new(purchase("PO-1", 100))
      .into_record(Uuid::new_v4())
      .unwrap();
    assert_ne!(a.record_id, b.record_id);
    assert_eq!(a.record_key, b.record_key);
  }

  #[test]
  fn identical_fields_of_different_kinds_do_not_collide() {
    let scheduled = RecordValue::ScheduledDelivery(ScheduledDeliveryValue {
      order_id:      "PO-1".into(),
      item:          Item::Gloves,
      quantity:      10,
      vendor:        "Acme".into(),
      delivery_date: None,
    });
    let receipt_date = NaiveDate::from_ymd_opt(2020, 4, 14).unwrap();
    let receipt = RecordValue::Receipt(ReceiptValue {
      order_id:      "PO-1".into(),
      item:          Item::Gloves,
      quantity:      10,
      vendor:        "Acme".into(),
      received_date: receipt_date,
    });
    assert_ne!(
      scheduled.record_key().unwrap(),
      receipt.record_key().unwrap()
    );
  }

  #[test]
  fn stored_parts_rebuild_the_value() {
    let value = RecordValue::FacilityDelivery(FacilityDeliveryValue {
      facility:      "Bellevue".into(),
      item:          Item::SurgicalMask,
      quantity:      2_000,
      delivery_date: NaiveDate::from_ymd_opt(2020, 4, 10).unwrap(),
    });
    let data = value.to_json().unwrap();
    assert!(data.get("kind").is_none());
    let rebuilt = RecordValue::from_parts(value.kind(), data).unwrap();
    assert_eq!(rebuilt, value);
  }

  #[test]
  fn new_record_reads_ingestion_json() {
    let json = serde_json::json!({
      "value": {
        "kind": "inventory",
        "data": { "item": "n95_mask", "quantity": 40 }
      },
      "raw_data": { "sheet": "Inventory" }
    });
    let record: NewRecord = serde_json::from_value(json).unwrap();
    assert_eq!(record.value.kind(), RecordKind::Inventory);
    assert_eq!(record.value.item(), Item::N95MaskNonSurgical);
    assert_eq!(record.value.quantity(), 40);
    assert!(record.raw_data.is_some());
  }

  #[test]
  fn kind_names_are_snake_case() {
    let names: Vec<String> = RecordKind::iter().map(|k| k.to_string()).collect();
    assert_eq!(names, [
      "purchase",
      "inventory",
      "scheduled_delivery",
      "receipt",
      "facility_delivery",
    ]);
  }
}
