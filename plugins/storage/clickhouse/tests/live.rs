//! Runs against a live ClickHouse when `TRIBUTARY_CLICKHOUSE_URL` is set,
//! e.g. `TRIBUTARY_CLICKHOUSE_URL=http://localhost:8123`.

use std::collections::HashMap;

use tributary_api::Store;
use tributary_store_clickhouse::{ClickHouseConfig, ClickHouseStore, open};

async fn live_store(table: &str) -> Option<ClickHouseStore> {
    let url = std::env::var("TRIBUTARY_CLICKHOUSE_URL").ok()?;
    let config = ClickHouseConfig {
        url,
        user: std::env::var("TRIBUTARY_CLICKHOUSE_USER").unwrap_or_else(|_| "default".into()),
        password: std::env::var("TRIBUTARY_CLICKHOUSE_PASSWORD").unwrap_or_default(),
        table: table.into(),
        ..ClickHouseConfig::default()
    };
    Some(open(&config).await.unwrap())
}

#[tokio::test]
async fn get_put_delete() {
    let Some(store) = live_store("tributary_test_get_put").await else {
        return;
    };
    store.delete("vorgansharax").await.unwrap();
    assert_eq!(store.get("vorgansharax").await.unwrap(), None);

    store.put("vorgansharax", b"green\0dragon").await.unwrap();
    assert_eq!(store.get("vorgansharax").await.unwrap(), Some(b"green\0dragon".to_vec()));

    store.delete("vorgansharax").await.unwrap();
    assert_eq!(store.get("vorgansharax").await.unwrap(), None);
}

#[tokio::test]
async fn large_put_all() {
    let Some(store) = live_store("tributary_test_put_all").await else {
        return;
    };
    let mut entries = HashMap::new();
    for i in 1..=1000 {
        entries.insert(format!("vorgansharax_{i}"), b"green".to_vec());
        entries.insert(format!("saphira_{i}"), b"blue".to_vec());
        entries.insert(format!("falkor_{i}"), b"white".to_vec());
    }
    store.put_all(&entries).await.unwrap();

    let keys = vec![
        "vorgansharax_1".to_string(),
        "saphira_787".to_string(),
        "falkor_1001".to_string(),
    ];
    let found = store.get_all(&keys).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found["vorgansharax_1"], b"green".to_vec());
    assert_eq!(found["saphira_787"], b"blue".to_vec());
}
