//! 覆盖存储往返与 Runner 热重建

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::{billing_registry, runner_handle};
use concierge::core::RegistryError;
use concierge::llm::MockBackend;
use concierge::store::{ConfigStore, LocalFileStore, OverrideRecord};

fn full_record(name: &str) -> OverrideRecord {
    OverrideRecord {
        name: name.to_string(),
        routing_hint: Some("Invoices and receipts".to_string()),
        instruction: Some("You handle invoices. Respond in {lang_name}.".to_string()),
        model_ref: Some("gpt-4o".to_string()),
        is_fallback: Some(false),
        tools: Some(vec!["lookup_reservation".to_string()]),
        source: String::new(),
        updated_at: None,
    }
}

#[tokio::test]
async fn saved_record_round_trips_through_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent_configs.json");
    let store = LocalFileStore::new(&path);

    let record = full_record("Invoices");
    let before = Utc::now();
    store.save(record.clone()).await.unwrap();

    // 新实例从磁盘读取
    let loaded = LocalFileStore::new(&path).load_all().await;
    let stored = loaded.get("Invoices").expect("record persisted");
    assert!(stored.same_fields(&record));
    assert_eq!(stored.source, "local");
    assert!(stored.updated_at.unwrap() >= before);

    assert!(store.delete("Invoices").await.unwrap());
    assert!(!store.delete("Invoices").await.unwrap());
    assert!(store.load_all().await.is_empty());
}

#[tokio::test]
async fn rebuild_applies_store_changes_and_rejects_bad_sets() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalFileStore::new(dir.path().join("agent_configs.json")));
    let handle = runner_handle(billing_registry(store.clone()), Arc::new(MockBackend)).await;
    let first = handle.get().await;
    assert_eq!(first.generation, 1);

    store.save(full_record("Invoices")).await.unwrap();
    let second = handle.rebuild().await.unwrap();
    assert_eq!(second.generation, 2);
    let invoices = second.tree.find("Invoices").unwrap();
    assert_eq!(invoices.model_ref, "gpt-4o");
    assert!(second.tree.router().has_tool("transfer_to_invoices"));
    assert!(second
        .tree
        .router()
        .instruction
        .contains("Invoices and receipts → transfer to Invoices"));
    // 旧快照保持不变
    assert!(first.tree.find("Invoices").is_none());

    // 第二个 fallback：重建失败，当前 Runner 不变
    let mut second_fallback = OverrideRecord::named("Billing");
    second_fallback.is_fallback = Some(true);
    store.save(second_fallback).await.unwrap();
    let err = handle.rebuild().await.unwrap_err();
    assert!(matches!(err, RegistryError::FallbackCount { count: 2, .. }));
    assert_eq!(handle.get().await.generation, 2);

    // 恢复后重建成功
    assert!(store.delete("Billing").await.unwrap());
    assert_eq!(handle.rebuild().await.unwrap().generation, 3);
}

#[tokio::test]
async fn rebuild_twice_gives_same_routing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalFileStore::new(dir.path().join("agent_configs.json")));
    store.save(full_record("Invoices")).await.unwrap();
    let handle = runner_handle(billing_registry(store), Arc::new(MockBackend)).await;

    let a = handle.rebuild().await.unwrap();
    let b = handle.rebuild().await.unwrap();
    assert_eq!(a.tree.router().instruction, b.tree.router().instruction);
    assert_eq!(a.tree.router().tool_names(), b.tree.router().tool_names());
}
