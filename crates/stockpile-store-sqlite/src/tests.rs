//! Integration tests for `SqliteStore` and the `Ledger` against an in-memory
//! database.

use std::sync::Arc;

use chrono::NaiveDate;
use stockpile_core::{
  Error as CoreError,
  import::{DataSource, ImportFilter, ImportStatus, Provenance, RetentionPolicy},
  ledger::Ledger,
  record::{
    InventoryValue, Item, NewRecord, OrderType, PurchaseValue, ReceiptValue,
    RecordKind, RecordValue, Unit,
  },
  store::ImportStore,
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn ledger() -> (SqliteStore, Ledger<SqliteStore>) {
  let s = store().await;
  (s.clone(), Ledger::new(s))
}

fn provenance(file_name: &str) -> Provenance {
  Provenance {
    uploaded_by:   Some("ops@example.org".into()),
    file_name:     file_name.into(),
    file_checksum: format!("sha256-of-{file_name}"),
  }
}

fn purchase(order_id: &str) -> NewRecord {
  NewRecord::new(RecordValue::Purchase(PurchaseValue {
    order_id:    order_id.into(),
    order_type:  OrderType::Purchase,
    item:        Item::N95MaskNonSurgical,
    description: "NIOSH N95".into(),
    quantity:    10_000,
    unit:        Unit::Each,
    vendor:      "Acme Medical".into(),
    cost:        Some(1_250_000),
  }))
}

fn inventory(item: Item, quantity: i64) -> NewRecord {
  NewRecord::new(RecordValue::Inventory(InventoryValue {
    item,
    quantity,
    unit: Unit::Each,
    location: Some("Brooklyn Navy Yard".into()),
  }))
}

fn receipt(order_id: &str) -> NewRecord {
  NewRecord::new(RecordValue::Receipt(ReceiptValue {
    order_id:      order_id.into(),
    item:          Item::Gloves,
    quantity:      400,
    vendor:        "Acme Medical".into(),
    received_date: NaiveDate::from_ymd_opt(2020, 4, 14).unwrap(),
  }))
}

/// Ingest and promote, returning the now-active import id.
async fn active_with(
  ledger: &Ledger<SqliteStore>,
  source: DataSource,
  records: Vec<NewRecord>,
) -> Uuid {
  let (import, _) = ledger
    .ingest(source, provenance("seed.xlsx"), records)
    .await
    .unwrap();
  ledger.promote(import.import_id).await.unwrap();
  import.import_id
}

async fn status_of(ledger: &Ledger<SqliteStore>, id: Uuid) -> ImportStatus {
  ledger.get_import(id).await.unwrap().status
}

// ─── Imports ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_candidate_persists_provenance() {
  let (_, l) = ledger().await;

  let import = l
    .create_candidate(DataSource::EdcPpe, provenance("ppe.xlsx"))
    .await
    .unwrap();
  assert_eq!(import.status, ImportStatus::Candidate);

  let fetched = l.get_import(import.import_id).await.unwrap();
  assert_eq!(fetched, import);
  assert_eq!(fetched.provenance.uploaded_by.as_deref(), Some("ops@example.org"));
  assert_eq!(fetched.provenance.file_name, "ppe.xlsx");
}

#[tokio::test]
async fn get_missing_import_is_not_found() {
  let (s, l) = ledger().await;
  let id = Uuid::new_v4();

  assert!(s.get_import(id).await.unwrap().is_none());
  assert!(matches!(
    l.get_import(id).await,
    Err(CoreError::ImportNotFound(missing)) if missing == id
  ));
}

#[tokio::test]
async fn candidates_do_not_count_as_active() {
  let (_, l) = ledger().await;
  l.create_candidate(DataSource::Inventory, provenance("a.xlsx"))
    .await
    .unwrap();
  l.create_candidate(DataSource::Inventory, provenance("b.xlsx"))
    .await
    .unwrap();

  assert!(l.sanity_check().await.unwrap());
  assert!(l.current_active(DataSource::Inventory).await.unwrap().is_none());
  assert!(l.active_counts().await.unwrap().values().all(|&n| n == 0));
}

#[tokio::test]
async fn list_imports_filters_and_orders_newest_first() {
  let (_, l) = ledger().await;
  let first = active_with(&l, DataSource::EdcPpe, vec![purchase("P1")]).await;
  let (second, _) = l
    .ingest(DataSource::EdcPpe, provenance("b.xlsx"), vec![])
    .await
    .unwrap();
  l.create_candidate(DataSource::Inventory, provenance("c.xlsx"))
    .await
    .unwrap();

  let all = l.list_imports(ImportFilter::default()).await.unwrap();
  assert_eq!(all.len(), 3);

  let ppe = l
    .list_imports(ImportFilter {
      data_source: Some(DataSource::EdcPpe),
      status:      None,
    })
    .await
    .unwrap();
  let ids: Vec<Uuid> = ppe.iter().map(|i| i.import_id).collect();
  assert_eq!(ids, vec![second.import_id, first]);

  let candidates = l
    .list_imports(ImportFilter {
      data_source: None,
      status:      Some(ImportStatus::Candidate),
    })
    .await
    .unwrap();
  assert_eq!(candidates.len(), 2);
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn records_roundtrip_by_kind() {
  let (_, l) = ledger().await;
  let mut with_raw = inventory(Item::Gown, 12);
  with_raw.raw_data = Some(serde_json::json!({ "Item": "Gowns", "Qty": "12" }));

  let (import, attached) = l
    .ingest(
      DataSource::Inventory,
      provenance("inv.xlsx"),
      vec![with_raw, purchase("P1"), receipt("P1")],
    )
    .await
    .unwrap();
  assert_eq!(attached.len(), 3);

  let all = l.records_for_import(import.import_id, None).await.unwrap();
  assert_eq!(all.len(), 3);

  let inv = l
    .records_for_import(import.import_id, Some(RecordKind::Inventory))
    .await
    .unwrap();
  assert_eq!(inv.len(), 1);
  assert_eq!(inv[0].record_key, attached[0].record_key);
  assert_eq!(inv[0].value, attached[0].value);
  assert_eq!(inv[0].raw_data.as_ref().unwrap()["Qty"], "12");
  assert_eq!(inv[0].import_id, import.import_id);
}

#[tokio::test]
async fn records_cannot_be_added_to_an_active_import() {
  let (_, l) = ledger().await;
  let active = active_with(&l, DataSource::EdcPpe, vec![purchase("P1")]).await;

  let err = l.attach_records(active, vec![purchase("P2")]).await.unwrap_err();
  assert!(matches!(
    err,
    CoreError::InvalidState { status: ImportStatus::Active, .. }
  ));
  assert_eq!(l.records_for_import(active, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn attach_to_missing_import_is_not_found() {
  let s = store().await;
  let err = s
    .attach_records(Uuid::new_v4(), vec![purchase("P1")])
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::ImportNotFound(_))));
}

#[tokio::test]
async fn active_records_exclude_candidates_and_replaced() {
  let (_, l) = ledger().await;
  active_with(&l, DataSource::EdcPpe, vec![purchase("P1"), purchase("P2")]).await;
  active_with(&l, DataSource::EdcPpe, vec![purchase("P3")]).await;
  active_with(&l, DataSource::Inventory, vec![inventory(Item::Gloves, 5)]).await;
  l.ingest(DataSource::EdcMake, provenance("make.xlsx"), vec![purchase("M1")])
    .await
    .unwrap();

  let purchases = l.active_records(Some(RecordKind::Purchase)).await.unwrap();
  assert_eq!(purchases.len(), 1);
  assert!(matches!(
    &purchases[0].value,
    RecordValue::Purchase(p) if p.order_id == "P3"
  ));

  assert_eq!(l.active_records(None).await.unwrap().len(), 2);
}

// ─── Delta ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delta_against_active_reports_new_purchases() {
  let (_, l) = ledger().await;
  let a = active_with(&l, DataSource::EdcPpe, vec![purchase("P1"), purchase("P2")]).await;
  let (b, _) = l
    .ingest(DataSource::EdcPpe, provenance("b.xlsx"), vec![purchase("P1"), purchase("P3")])
    .await
    .unwrap();

  let delta = l.compute_delta(b.import_id).await.unwrap();

  assert_eq!(delta.previous.as_ref().map(|p| p.import_id), Some(a));
  assert_eq!(delta.active_stats.get(&RecordKind::Purchase), Some(&2));
  assert_eq!(delta.candidate_stats.get(&RecordKind::Purchase), Some(&2));
  let fresh = &delta.new_objects[&RecordKind::Purchase];
  assert_eq!(fresh.len(), 1);
  assert!(matches!(&fresh[0].value, RecordValue::Purchase(p) if p.order_id == "P3"));

  l.promote(b.import_id).await.unwrap();
  assert_eq!(status_of(&l, a).await, ImportStatus::Replaced);
  assert_eq!(status_of(&l, b.import_id).await, ImportStatus::Active);
  assert_eq!(
    l.current_active(DataSource::EdcPpe).await.unwrap().unwrap().import_id,
    b.import_id
  );
}

#[tokio::test]
async fn first_import_delta_has_no_previous() {
  let (_, l) = ledger().await;
  let (c, _) = l
    .ingest(DataSource::FacilityDeliveries, provenance("c.xlsx"), vec![inventory(Item::Gloves, 1)])
    .await
    .unwrap();

  let delta = l.compute_delta(c.import_id).await.unwrap();

  assert!(delta.previous.is_none());
  assert!(delta.active_stats.is_empty());
  assert_eq!(delta.candidate_stats.get(&RecordKind::Inventory), Some(&1));
  assert_eq!(delta.new_objects.len(), 1);
  assert_eq!(delta.new_objects[&RecordKind::Inventory].len(), 1);
}

#[tokio::test]
async fn identical_reupload_yields_empty_delta() {
  let (_, l) = ledger().await;
  let records = || vec![purchase("P1"), inventory(Item::Goggles, 30), receipt("P1")];
  active_with(&l, DataSource::DcasDailySourcing, records()).await;
  let (again, _) = l
    .ingest(DataSource::DcasDailySourcing, provenance("same.xlsx"), records())
    .await
    .unwrap();

  let delta = l.promote(again.import_id).await.unwrap();

  assert!(delta.is_unchanged());
  assert_eq!(delta.new_objects.len(), 3);
  assert_eq!(delta.active_stats, delta.candidate_stats);
}

#[tokio::test]
async fn delta_uses_other_sources_independently() {
  let (_, l) = ledger().await;
  active_with(&l, DataSource::EdcPpe, vec![purchase("P1")]).await;
  let (make, _) = l
    .ingest(DataSource::EdcMake, provenance("make.xlsx"), vec![purchase("P1")])
    .await
    .unwrap();

  let delta = l.compute_delta(make.import_id).await.unwrap();
  assert!(delta.previous.is_none());
  assert_eq!(delta.new_objects[&RecordKind::Purchase].len(), 1);
}

#[tokio::test]
async fn delta_on_non_candidate_is_invalid_state() {
  let (_, l) = ledger().await;
  let a = active_with(&l, DataSource::EdcPpe, vec![purchase("P1")]).await;

  let err = l.compute_delta(a).await.unwrap_err();
  assert!(matches!(err, CoreError::InvalidState { status: ImportStatus::Active, .. }));
}

// ─── Promotion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn promotion_records_replacement_link() {
  let (s, l) = ledger().await;
  let a = active_with(&l, DataSource::Inventory, vec![inventory(Item::Gown, 1)]).await;
  let (b, _) = l
    .ingest(DataSource::Inventory, provenance("b.xlsx"), vec![inventory(Item::Gown, 2)])
    .await
    .unwrap();

  let promotion = s.commit_promotion(b.import_id, Some(a)).await.unwrap();

  assert_eq!(promotion.promoted.status, ImportStatus::Active);
  let replaced = promotion.replaced.unwrap();
  assert_eq!(replaced.import_id, a);
  assert_eq!(replaced.status, ImportStatus::Replaced);
  assert_eq!(replaced.replaced_by, Some(b.import_id));
  assert!(replaced.status_changed_at >= replaced.imported_at);
}

#[tokio::test]
async fn promote_rejects_non_candidates_without_change() {
  let (_, l) = ledger().await;
  let a = active_with(&l, DataSource::EdcPpe, vec![purchase("P1")]).await;
  let b = active_with(&l, DataSource::EdcPpe, vec![purchase("P2")]).await;
  let (c, _) = l
    .ingest(DataSource::EdcPpe, provenance("c.xlsx"), vec![])
    .await
    .unwrap();
  l.cancel(c.import_id).await.unwrap();

  for (id, status) in [
    (a, ImportStatus::Replaced),
    (b, ImportStatus::Active),
    (c.import_id, ImportStatus::Cancelled),
  ] {
    let err = l.promote(id).await.unwrap_err();
    assert!(
      matches!(err, CoreError::InvalidState { status: s, operation: "promote", .. } if s == status),
      "unexpected error for {status}: {err}"
    );
    assert_eq!(status_of(&l, id).await, status);
  }
  assert_eq!(
    l.current_active(DataSource::EdcPpe).await.unwrap().unwrap().import_id,
    b
  );
}

#[tokio::test]
async fn promote_missing_import_is_not_found() {
  let (_, l) = ledger().await;
  assert!(matches!(
    l.promote(Uuid::new_v4()).await,
    Err(CoreError::ImportNotFound(_))
  ));
}

#[tokio::test]
async fn delta_and_cancel_on_missing_import_are_not_found() {
  let (_, l) = ledger().await;
  let id = Uuid::new_v4();

  assert!(matches!(
    l.compute_delta(id).await,
    Err(CoreError::ImportNotFound(missing)) if missing == id
  ));
  assert!(matches!(
    l.cancel(id).await,
    Err(CoreError::ImportNotFound(missing)) if missing == id
  ));
  assert!(l.list_imports(ImportFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_promotion_is_a_conflict() {
  let (s, l) = ledger().await;
  let a = active_with(&l, DataSource::EdcPpe, vec![purchase("P1")]).await;
  let (b1, _) = l
    .ingest(DataSource::EdcPpe, provenance("b1.xlsx"), vec![purchase("P2")])
    .await
    .unwrap();
  let (b2, _) = l
    .ingest(DataSource::EdcPpe, provenance("b2.xlsx"), vec![purchase("P3")])
    .await
    .unwrap();

  // Both reviewed against `a`; only the first commit may land.
  s.commit_promotion(b1.import_id, Some(a)).await.unwrap();
  let err = s.commit_promotion(b2.import_id, Some(a)).await.unwrap_err();

  let core: CoreError = err.into();
  assert!(core.is_retryable());
  assert!(matches!(core, CoreError::Conflict { data_source: DataSource::EdcPpe }));
  assert_eq!(status_of(&l, b2.import_id).await, ImportStatus::Candidate);
  assert_eq!(status_of(&l, b1.import_id).await, ImportStatus::Active);
}

#[tokio::test]
async fn concurrent_promotions_for_one_source_admit_one_winner() {
  let (_, l) = ledger().await;
  let l = Arc::new(l);
  active_with(&l, DataSource::EdcPpe, vec![purchase("P1")]).await;
  let (b1, _) = l
    .ingest(DataSource::EdcPpe, provenance("b1.xlsx"), vec![purchase("P2")])
    .await
    .unwrap();
  let (b2, _) = l
    .ingest(DataSource::EdcPpe, provenance("b2.xlsx"), vec![purchase("P3")])
    .await
    .unwrap();

  let (r1, r2) = tokio::join!(l.promote(b1.import_id), l.promote(b2.import_id));

  let outcomes = [r1.is_ok(), r2.is_ok()];
  assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1, "{outcomes:?}");
  let loser = r1.err().or(r2.err()).unwrap();
  assert!(matches!(loser, CoreError::Conflict { .. }), "{loser}");

  assert!(l.sanity_check().await.unwrap());
  assert_eq!(
    l.active_counts().await.unwrap()[&DataSource::EdcPpe],
    1
  );
}

#[tokio::test]
async fn promotions_of_different_sources_do_not_conflict() {
  let (_, l) = ledger().await;
  let (a, _) = l
    .ingest(DataSource::EdcPpe, provenance("a.xlsx"), vec![purchase("P1")])
    .await
    .unwrap();
  let (b, _) = l
    .ingest(DataSource::Inventory, provenance("b.xlsx"), vec![inventory(Item::Gloves, 2)])
    .await
    .unwrap();

  let (ra, rb) = tokio::join!(l.promote(a.import_id), l.promote(b.import_id));
  ra.unwrap();
  rb.unwrap();
}

#[tokio::test]
async fn at_most_one_active_after_many_promotions() {
  let (_, l) = ledger().await;
  for round in 0..5 {
    active_with(&l, DataSource::Inventory, vec![inventory(Item::Gown, round)]).await;
  }

  assert!(l.sanity_check().await.unwrap());
  let replaced = l
    .list_imports(ImportFilter {
      data_source: Some(DataSource::Inventory),
      status:      Some(ImportStatus::Replaced),
    })
    .await
    .unwrap();
  assert_eq!(replaced.len(), 4);
  assert!(replaced.iter().all(|i| i.replaced_by.is_some()));
}

// ─── Cancellation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_leaves_active_untouched_and_retains_records() {
  let (_, l) = ledger().await;
  let a = active_with(&l, DataSource::EdcPpe, vec![purchase("P1")]).await;
  let (c, _) = l
    .ingest(DataSource::EdcPpe, provenance("c.xlsx"), vec![purchase("P9")])
    .await
    .unwrap();

  let cancelled = l.cancel(c.import_id).await.unwrap();

  assert_eq!(cancelled.status, ImportStatus::Cancelled);
  assert_eq!(
    l.current_active(DataSource::EdcPpe).await.unwrap().unwrap().import_id,
    a
  );
  assert_eq!(l.records_for_import(c.import_id, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn cancel_with_purge_policy_drops_records() {
  let s = store().await;
  let l = Ledger::new(s).with_retention(RetentionPolicy::PurgeCancelled);
  let (c, _) = l
    .ingest(DataSource::Inventory, provenance("c.xlsx"), vec![inventory(Item::Gloves, 3)])
    .await
    .unwrap();

  l.cancel(c.import_id).await.unwrap();

  assert_eq!(status_of(&l, c.import_id).await, ImportStatus::Cancelled);
  assert!(l.records_for_import(c.import_id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancel_is_irreversible_and_candidate_only() {
  let (_, l) = ledger().await;
  let a = active_with(&l, DataSource::EdcPpe, vec![purchase("P1")]).await;
  let (c, _) = l
    .ingest(DataSource::EdcPpe, provenance("c.xlsx"), vec![])
    .await
    .unwrap();
  l.cancel(c.import_id).await.unwrap();

  assert!(matches!(
    l.cancel(c.import_id).await,
    Err(CoreError::InvalidState { status: ImportStatus::Cancelled, operation: "cancel", .. })
  ));
  assert!(matches!(
    l.cancel(a).await,
    Err(CoreError::InvalidState { status: ImportStatus::Active, .. })
  ));
  assert_eq!(status_of(&l, a).await, ImportStatus::Active);
}

// ─── Sanity ──────────────────────────────────────────────────────────────────

/// Force two active imports for one source, bypassing the unique index.
async fn break_invariant(s: &SqliteStore, extra: Uuid) {
  let id = extra.hyphenated().to_string();
  s.conn
    .call(move |conn| {
      conn.execute_batch("DROP INDEX imports_one_active_idx;")?;
      conn.execute(
        "UPDATE imports SET status = 'active' WHERE import_id = ?1",
        rusqlite::params![id],
      )?;
      Ok(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn unique_index_rejects_a_second_active() {
  let (s, l) = ledger().await;
  active_with(&l, DataSource::EdcPpe, vec![]).await;
  let (c, _) = l
    .ingest(DataSource::EdcPpe, provenance("c.xlsx"), vec![])
    .await
    .unwrap();
  let id = c.import_id.hyphenated().to_string();

  let result = s
    .conn
    .call(move |conn| {
      conn.execute(
        "UPDATE imports SET status = 'active' WHERE import_id = ?1",
        rusqlite::params![id],
      )?;
      Ok(())
    })
    .await;

  assert!(result.is_err());
  assert!(l.sanity_check().await.unwrap());
}

#[tokio::test]
async fn broken_invariant_refuses_delta_and_promotion() {
  let (s, l) = ledger().await;
  active_with(&l, DataSource::EdcPpe, vec![purchase("P1")]).await;
  let (twin, _) = l
    .ingest(DataSource::EdcPpe, provenance("twin.xlsx"), vec![])
    .await
    .unwrap();
  let (c, _) = l
    .ingest(DataSource::EdcPpe, provenance("c.xlsx"), vec![purchase("P2")])
    .await
    .unwrap();
  break_invariant(&s, twin.import_id).await;

  assert!(!l.sanity_check().await.unwrap());
  assert!(matches!(
    l.compute_delta(c.import_id).await,
    Err(CoreError::DomainInvariantViolation { data_source: DataSource::EdcPpe, active: 2 })
  ));
  assert!(matches!(
    l.promote(c.import_id).await,
    Err(CoreError::DomainInvariantViolation { .. })
  ));
  assert_eq!(status_of(&l, c.import_id).await, ImportStatus::Candidate);

  // The store's own guard refuses as well.
  let err = s.commit_promotion(c.import_id, None).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::DomainInvariantViolation { .. })));
}

#[tokio::test]
async fn store_errors_convert_into_core_errors() {
  let err = Error::DateParse("not a date".into());
  assert!(matches!(CoreError::from(err), CoreError::Store(_)));

  let err = Error::Core(CoreError::ImportNotFound(Uuid::nil()));
  assert!(matches!(CoreError::from(err), CoreError::ImportNotFound(_)));
}
