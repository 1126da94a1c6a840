//! End-to-end adapter scenarios.
//!
//! The in-memory scenarios always run. `live_cosmos_round_trip` talks to a
//! real account given by `TEST_COSMOS_URL` (a connection string) and is
//! ignored by default: `cargo test -- --ignored`.

use cosmos_policy_adapter::{
    Adapter, AdapterError, AdapterOptions, CosmosAdapter, DefaultModel, DocumentStore,
    MemoryStore, Model, SqlQuerySpec,
};

fn rule(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn sorted(mut rules: Vec<Vec<String>>) -> Vec<Vec<String>> {
    rules.sort();
    rules
}

/// The RBAC sample policy: four permissions and one role assignment.
fn rbac_model() -> DefaultModel {
    let mut model = DefaultModel::new();
    model.add_policy("p", "p", rule(&["alice", "data1", "read"]));
    model.add_policy("p", "p", rule(&["bob", "data2", "write"]));
    model.add_policy("p", "p", rule(&["data2_admin", "data2", "read"]));
    model.add_policy("p", "p", rule(&["data2_admin", "data2", "write"]));
    model.add_policy("g", "g", rule(&["alice", "data2_admin"]));
    model
}

fn reload<S: DocumentStore>(adapter: &mut CosmosAdapter<S>) -> DefaultModel {
    let mut model = DefaultModel::new();
    adapter.load_policy(&mut model).expect("load_policy");
    model
}

#[test]
fn save_then_load_reproduces_rules() {
    let mut adapter = CosmosAdapter::from_store(MemoryStore::new()).unwrap();

    let mut model = DefaultModel::new();
    model.add_policy("p", "p", rule(&["alice", "data1", "read"]));
    model.add_policy("p", "p", rule(&["bob", "data2", "write"]));
    adapter.save_policy(&model).unwrap();

    let loaded = reload(&mut adapter);
    assert_eq!(
        sorted(loaded.get_policy("p", "p")),
        vec![rule(&["alice", "data1", "read"]), rule(&["bob", "data2", "write"])]
    );
    assert_eq!(loaded.rule_count(), 2);
}

#[test]
fn auto_save_style_lifecycle() {
    let mut adapter = CosmosAdapter::from_store(MemoryStore::new()).unwrap();
    adapter.save_policy(&rbac_model()).unwrap();

    let loaded = reload(&mut adapter);
    assert_eq!(loaded.get_policy("p", "p").len(), 4);
    assert_eq!(loaded.get_policy("g", "g"), vec![rule(&["alice", "data2_admin"])]);

    adapter
        .add_policy("p", "p", &rule(&["alice", "data1", "write"]))
        .unwrap();
    assert!(reload(&mut adapter)
        .get_policy("p", "p")
        .contains(&rule(&["alice", "data1", "write"])));

    adapter
        .remove_policy("p", "p", &rule(&["alice", "data1", "write"]))
        .unwrap();
    assert_eq!(reload(&mut adapter).get_policy("p", "p").len(), 4);

    adapter
        .remove_filtered_policy("p", "p", 0, &rule(&["data2_admin"]))
        .unwrap();
    assert_eq!(
        sorted(reload(&mut adapter).get_policy("p", "p")),
        vec![rule(&["alice", "data1", "read"]), rule(&["bob", "data2", "write"])]
    );

    adapter
        .remove_filtered_policy("p", "p", 1, &rule(&["data1"]))
        .unwrap();
    assert_eq!(
        reload(&mut adapter).get_policy("p", "p"),
        vec![rule(&["bob", "data2", "write"])]
    );

    adapter
        .remove_filtered_policy("p", "p", 2, &rule(&["write"]))
        .unwrap();
    let remaining = reload(&mut adapter);
    assert!(remaining.get_policy("p", "p").is_empty());
    assert_eq!(remaining.get_policy("g", "g").len(), 1);
}

#[test]
fn filtered_load_then_save_is_refused() {
    let mut adapter = CosmosAdapter::from_store(MemoryStore::new()).unwrap();
    adapter.save_policy(&rbac_model()).unwrap();

    let filter = SqlQuerySpec::new("SELECT * FROM c WHERE c.pType = @pType AND c.v1 = @v1")
        .with_parameter("@pType", "p")
        .with_parameter("@v1", "data2");
    let mut partial = DefaultModel::new();
    adapter.load_filtered_policy(&mut partial, &filter).unwrap();

    assert!(adapter.is_filtered());
    assert_eq!(partial.get_policy("p", "p").len(), 3);
    assert!(partial.get_policy("g", "g").is_empty());

    assert!(matches!(
        adapter.save_policy(&partial),
        Err(AdapterError::FilteredState)
    ));
    assert_eq!(adapter.store().len(), 5);
    assert_eq!(adapter.store().recreate_count(), 1);

    let full = reload(&mut adapter);
    assert!(!adapter.is_filtered());
    adapter.save_policy(&full).unwrap();
    assert_eq!(adapter.store().len(), 5);
}

#[test]
#[ignore]
fn live_cosmos_round_trip() {
    let connection_string =
        std::env::var("TEST_COSMOS_URL").expect("TEST_COSMOS_URL must hold a connection string");
    let options = AdapterOptions::default()
        .with_database("casbin_test")
        .with_container(format!("casbin_rule_{}", uuid::Uuid::new_v4().simple()));

    let mut adapter = CosmosAdapter::from_connection_string(&connection_string, options).unwrap();
    adapter.save_policy(&rbac_model()).unwrap();

    let loaded = reload(&mut adapter);
    assert_eq!(
        sorted(loaded.get_policy("p", "p")),
        sorted(rbac_model().get_policy("p", "p"))
    );
    assert_eq!(loaded.get_policy("g", "g"), vec![rule(&["alice", "data2_admin"])]);

    adapter
        .remove_filtered_policy("p", "p", 0, &rule(&["data2_admin"]))
        .unwrap();
    assert_eq!(reload(&mut adapter).get_policy("p", "p").len(), 2);

    adapter.clear_policy().unwrap();
    assert_eq!(reload(&mut adapter).rule_count(), 0);
}
