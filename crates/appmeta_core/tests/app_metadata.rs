use appmeta_core::db::{open_db, open_db_in_memory};
use appmeta_core::{
    AppMetadata, MetadataError, MetadataRepository, MetadataValue, SqliteMetadataRepository,
};
use rusqlite::Connection;
use serde_json::json;

const APP: &str = "canvas-lti";

fn load(conn: &Connection) -> AppMetadata<SqliteMetadataRepository<'_>> {
    AppMetadata::load(SqliteMetadataRepository::new(conn), APP).unwrap()
}

fn text<R: MetadataRepository>(metadata: &AppMetadata<R>, key: &str) -> String {
    metadata
        .get(key)
        .unwrap()
        .as_text()
        .unwrap()
        .to_string()
}

#[test]
fn reference_lifecycle_follows_updates_deletes_and_recreation() {
    let conn = open_db_in_memory().unwrap();
    let mut metadata = load(&conn);

    metadata.set("A", "foo").unwrap();
    assert!(matches!(metadata.get("B"), Err(MetadataError::NotFound(key)) if key == "B"));

    metadata.set("B", "@A/bar").unwrap();
    assert_eq!(text(&metadata, "A"), "foo");
    assert_eq!(text(&metadata, "B"), "foo/bar");

    metadata.set("A", "rutabaga").unwrap();
    assert_eq!(text(&metadata, "B"), "rutabaga/bar");

    metadata.delete("A").unwrap();
    assert!(matches!(metadata.get("A"), Err(MetadataError::NotFound(_))));
    assert!(!metadata.exists("A"));
    assert_eq!(text(&metadata, "B"), "@A/bar");

    metadata.set("A", "watermelon").unwrap();
    assert_eq!(text(&metadata, "B"), "watermelon/bar");
    assert!(metadata.unresolved().is_empty());
}

#[test]
fn plain_values_are_untouched_by_unrelated_operations() {
    let conn = open_db_in_memory().unwrap();
    let mut metadata = load(&conn);

    metadata.set("PLAIN", "just text").unwrap();
    metadata.set("A", "1").unwrap();
    metadata.set("B", "@A+@PLAIN").unwrap();
    metadata.set("A", "2").unwrap();
    metadata.delete("B").unwrap();

    assert_eq!(text(&metadata, "PLAIN"), "just text");
}

#[test]
fn non_string_values_pass_through() {
    let conn = open_db_in_memory().unwrap();
    let mut metadata = load(&conn);

    metadata.set("A", "foo").unwrap();
    metadata.set("C", false).unwrap();
    metadata
        .set("D", json!({"consumer_key": "@A", "scopes": ["read"]}))
        .unwrap();

    assert_eq!(metadata.get("C").unwrap(), &MetadataValue::Bool(false));
    assert_eq!(
        metadata.get("D").unwrap(),
        &MetadataValue::Blob(json!({"consumer_key": "@A", "scopes": ["read"]}))
    );
}

#[test]
fn boolean_referent_renders_as_literal() {
    let conn = open_db_in_memory().unwrap();
    let mut metadata = load(&conn);

    metadata.set("DEBUG", true).unwrap();
    metadata.set("LABEL", "debug=@DEBUG").unwrap();
    assert_eq!(text(&metadata, "LABEL"), "debug=TRUE");

    metadata.set("DEBUG", false).unwrap();
    assert_eq!(text(&metadata, "LABEL"), "debug=FALSE");
}

#[test]
fn transitive_chain_resolves_in_any_write_order() {
    let forward = open_db_in_memory().unwrap();
    let mut metadata = load(&forward);
    metadata.set("X", "1").unwrap();
    metadata.set("Y", "@X-2").unwrap();
    metadata.set("Z", "@Y-3").unwrap();
    assert_eq!(text(&metadata, "Z"), "1-2-3");

    let backward = open_db_in_memory().unwrap();
    let mut metadata = load(&backward);
    metadata.set("Z", "@Y-3").unwrap();
    assert_eq!(text(&metadata, "Z"), "@Y-3");
    metadata.set("Y", "@X-2").unwrap();
    assert_eq!(text(&metadata, "Z"), "@X-2-3");
    metadata.set("X", "1").unwrap();
    assert_eq!(text(&metadata, "Y"), "1-2");
    assert_eq!(text(&metadata, "Z"), "1-2-3");
}

#[test]
fn updating_root_of_chain_reaches_indirect_dependents() {
    let conn = open_db_in_memory().unwrap();
    let mut metadata = load(&conn);

    metadata.set("APP_URL", "https://old.example.org").unwrap();
    metadata.set("ASSETS", "@APP_URL/assets").unwrap();
    metadata.set("ICON", "@ASSETS/icon.png").unwrap();
    metadata.set("LAUNCH", "@APP_URL/launch?icon=@ICON").unwrap();

    metadata.set("APP_URL", "https://new.example.org").unwrap();
    assert_eq!(text(&metadata, "ICON"), "https://new.example.org/assets/icon.png");
    assert_eq!(
        text(&metadata, "LAUNCH"),
        "https://new.example.org/launch?icon=https://new.example.org/assets/icon.png"
    );
}

#[test]
fn cycle_terminates_with_residual_tokens() {
    let conn = open_db_in_memory().unwrap();
    let mut metadata = load(&conn);

    metadata.set("P", "@Q").unwrap();
    assert_eq!(text(&metadata, "P"), "@Q");
    assert!(metadata.unresolved().is_empty());

    metadata.set("Q", "@P").unwrap();
    assert_eq!(text(&metadata, "P"), "@Q");
    assert_eq!(text(&metadata, "Q"), "@P");
    assert_eq!(metadata.unresolved(), ["P".to_string(), "Q".to_string()]);

    // Breaking the cycle re-binds both entries.
    metadata.set("Q", "done").unwrap();
    assert_eq!(text(&metadata, "P"), "done");
    assert!(metadata.unresolved().is_empty());
}

#[test]
fn reference_into_cycle_matches_reloaded_view() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.db");

    let (session_values, session_unresolved) = {
        let conn = open_db(&path).unwrap();
        let mut metadata = load(&conn);
        metadata.set("P", "@Q").unwrap();
        metadata.set("Q", "@P").unwrap();
        metadata.set("R", "r-@P").unwrap();

        assert_eq!(text(&metadata, "R"), "r-@P");
        assert_eq!(
            metadata.unresolved(),
            ["P".to_string(), "Q".to_string(), "R".to_string()]
        );
        let values = metadata
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect::<Vec<_>>();
        (values, metadata.unresolved())
    };

    let conn = open_db(&path).unwrap();
    let reloaded = load(&conn);
    let reloaded_values = reloaded
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect::<Vec<_>>();
    assert_eq!(reloaded_values, session_values);
    assert_eq!(reloaded.unresolved(), session_unresolved);
}

#[test]
fn breaking_cycle_releases_entries_referencing_it() {
    let conn = open_db_in_memory().unwrap();
    let mut metadata = load(&conn);
    metadata.set("P", "@Q").unwrap();
    metadata.set("Q", "@P").unwrap();
    metadata.set("R", "r-@P").unwrap();

    metadata.set("Q", "done").unwrap();
    assert_eq!(text(&metadata, "P"), "done");
    assert_eq!(text(&metadata, "R"), "r-done");
    assert!(metadata.unresolved().is_empty());
}

#[test]
fn references_to_longer_keys_are_not_confused_with_prefixes() {
    let conn = open_db_in_memory().unwrap();
    let mut metadata = load(&conn);

    metadata.set("A", "short").unwrap();
    metadata.set("AB", "long").unwrap();
    metadata.set("C", "@AB|@A").unwrap();
    assert_eq!(text(&metadata, "C"), "long|short");

    metadata.set("A", "changed").unwrap();
    assert_eq!(text(&metadata, "C"), "long|changed");
}

#[test]
fn load_resolves_persisted_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.db");

    {
        let conn = open_db(&path).unwrap();
        let mut metadata = load(&conn);
        metadata.set("Z", "@Y-3").unwrap();
        metadata.set("Y", "@X-2").unwrap();
        metadata.set("X", "1").unwrap();
        metadata.set("ENABLED", true).unwrap();
        metadata.set("LOOP", "@LOOP").unwrap();
    }

    let conn = open_db(&path).unwrap();
    let metadata = load(&conn);
    assert_eq!(metadata.len(), 5);
    assert_eq!(text(&metadata, "Z"), "1-2-3");
    assert_eq!(metadata.get("ENABLED").unwrap(), &MetadataValue::Bool(true));
    assert_eq!(text(&metadata, "LOOP"), "@LOOP");
    assert_eq!(metadata.unresolved(), ["LOOP".to_string()]);
}

#[test]
fn raw_values_are_persisted_not_resolved_values() {
    let conn = open_db_in_memory().unwrap();
    let mut metadata = load(&conn);
    metadata.set("A", "foo").unwrap();
    metadata.set("B", "@A/bar").unwrap();

    let raw: String = conn
        .query_row(
            "SELECT raw_value FROM app_metadata WHERE app = ?1 AND entry_key = 'B';",
            [APP],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(raw, "@A/bar");
}

#[test]
fn namespaces_sharing_a_table_are_isolated() {
    let conn = open_db_in_memory().unwrap();
    let mut first = AppMetadata::load(SqliteMetadataRepository::new(&conn), "first").unwrap();
    first.set("A", "first-a").unwrap();
    first.set("B", "@A").unwrap();

    let mut second = AppMetadata::load(SqliteMetadataRepository::new(&conn), "second").unwrap();
    assert!(second.is_empty());
    second.set("A", "second-a").unwrap();

    assert_eq!(text(&first, "B"), "first-a");
    let reloaded = AppMetadata::load(SqliteMetadataRepository::new(&conn), "first").unwrap();
    assert_eq!(text(&reloaded, "B"), "first-a");
}

#[test]
fn derive_value_resolves_ad_hoc_templates() {
    let conn = open_db_in_memory().unwrap();
    let mut metadata = load(&conn);
    metadata.set("A", "watermelon").unwrap();
    metadata.set("C", false).unwrap();
    metadata.set("D", json!({"k": 1})).unwrap();

    assert_eq!(
        metadata.derive_value("@A foo @B bar@C @D"),
        r#"watermelon foo @B barFALSE {"k":1}"#
    );
    assert!(!metadata.exists("B"));
}

#[test]
fn iteration_is_ordered_and_resolved() {
    let conn = open_db_in_memory().unwrap();
    let mut metadata = load(&conn);
    metadata.set("b", "@a!").unwrap();
    metadata.set("a", "hi").unwrap();

    let entries = metadata
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect::<Vec<_>>();
    assert_eq!(
        entries,
        vec![
            ("a".to_string(), "hi".to_string()),
            ("b".to_string(), "hi!".to_string())
        ]
    );
    assert_eq!(metadata.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(metadata.app(), APP);
}

#[test]
fn empty_key_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let mut metadata = load(&conn);
    let err = metadata.set("", "value").unwrap_err();
    assert!(matches!(err, MetadataError::InvalidKey(_)));
    assert!(metadata.is_empty());
}
