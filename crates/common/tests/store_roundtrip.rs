use common::store::{JsonStore, StoredData};
use common::types::RawItem;

const LOCK: &str = r#"{
    "tx_hash": "0xaaa",
    "log_index": 12,
    "timestamp": "2024-06-01T08:30:00.000000Z",
    "total": {"decimals": "18", "value": "2500000000000000000"},
    "from": {"hash": "0x1111111111111111111111111111111111111111", "is_contract": false},
    "token": {"address": "0x7b7C000000000000000000000000000000000000", "symbol": "BTC"},
    "method": "createLock"
}"#;

const VOTE: &str = r#"{
    "transaction_hash": "0xbbb",
    "index": 3,
    "block_number": 123456,
    "topics": ["0x452d440efc30dfa14a0ef803ccb55936af860ec6a6960ed27f129bef913f296a", null, null, null],
    "data": "0x00",
    "decoded": {"method_call": "Voted(...)", "parameters": [{"name": "weight", "type": "uint256", "value": "5000000000000000000", "indexed": false}]}
}"#;

#[test]
fn saved_store_reloads_identical_raw_items() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::new(dir.path().join("vebtc_data.json"));

    let data = StoredData {
        locks: vec![serde_json::from_str::<RawItem>(LOCK).unwrap()],
        votes: vec![serde_json::from_str::<RawItem>(VOTE).unwrap()],
    };
    store.save(&data).unwrap();

    let reloaded = store.load().unwrap();
    assert_eq!(reloaded, data);

    // The on-disk layout keeps the two named collections.
    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert!(doc["locks"].is_array());
    assert!(doc["votes"].is_array());
    assert_eq!(doc["locks"][0]["method"], "createLock");
}
