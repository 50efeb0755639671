//! Unit tests for catalog loading and plan resolution.

use super::*;
use crate::test_support::SAMPLE_CATALOG_JSON;
use camino::Utf8PathBuf;
use rstest::{fixture, rstest};

#[fixture]
fn catalog() -> Catalog {
    Catalog::from_json_str(SAMPLE_CATALOG_JSON).expect("sample catalog should parse")
}

#[rstest]
fn resolves_quota_from_string_metadata(catalog: Catalog) {
    assert_eq!(catalog.resolve_quota("plan-small").expect("quota"), 100);
}

#[rstest]
fn resolves_quota_from_integer_metadata(catalog: Catalog) {
    assert_eq!(catalog.resolve_quota("plan-large").expect("quota"), 1000);
}

#[rstest]
fn unknown_plan_is_reported_as_not_found(catalog: Catalog) {
    let err = catalog
        .resolve_plan("missing")
        .expect_err("plan should be absent");
    assert_eq!(
        err,
        CatalogError::PlanNotFound {
            plan_id: String::from("missing")
        }
    );
}

#[rstest]
#[case::missing(r#"{}"#, "entry is missing")]
#[case::not_numeric(r#"{"quotaMB": "lots"}"#, "invalid digit")]
#[case::negative(r#"{"quotaMB": -5}"#, "non-negative")]
#[case::wrong_type(r#"{"quotaMB": true}"#, "string or integer")]
fn invalid_quota_metadata_is_rejected(#[case] metadata: &str, #[case] fragment: &str) {
    let document = format!(
        r#"[{{"id":"svc","name":"svc","description":"d","plans":[{{"id":"p","name":"p","description":"d","metadata":{metadata}}}]}}]"#
    );
    let err = Catalog::from_json_str(&document).expect_err("quota should be rejected");
    let CatalogError::InvalidQuota { plan_id, message } = err else {
        panic!("expected InvalidQuota, got {err}");
    };
    assert_eq!(plan_id, "p");
    assert!(message.contains(fragment), "unexpected message: {message}");
}

#[rstest]
fn empty_catalog_is_rejected() {
    assert_eq!(Catalog::from_json_str("[]"), Err(CatalogError::Empty));
}

#[rstest]
fn duplicate_plan_ids_are_rejected() {
    let document = r#"[{"id":"svc","name":"svc","description":"d","plans":[
        {"id":"p","name":"a","description":"d","metadata":{"quotaMB":"1"}},
        {"id":"p","name":"b","description":"d","metadata":{"quotaMB":"2"}}]}]"#;
    assert_eq!(
        Catalog::from_json_str(document),
        Err(CatalogError::DuplicatePlan {
            plan_id: String::from("p")
        })
    );
}

#[rstest]
fn unknown_fields_survive_serialisation(catalog: Catalog) {
    let value = serde_json::to_value(&catalog).expect("serialise");
    let plan = &value["services"][0]["plans"][0];
    assert_eq!(plan["metadata"]["displayName"], "Small");
    assert_eq!(plan["maintenance_info"]["version"], "1.0.0");
}

#[rstest]
fn load_reads_catalog_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("catalog.json")).expect("utf8 path");
    std::fs::write(&path, SAMPLE_CATALOG_JSON).expect("write catalog");

    let loaded = Catalog::load(&path).expect("catalog should load");
    assert_eq!(loaded.services().len(), 1);
}

#[rstest]
fn load_reports_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.json")).expect("utf8 path");

    let err = Catalog::load(&path).expect_err("missing file should fail");
    assert!(matches!(err, CatalogError::Io { .. }), "unexpected: {err}");
}
