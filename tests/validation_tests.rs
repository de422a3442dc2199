//! Selection validity checks against fake grid rasters.

mod common;

use std::path::PathBuf;

use cm_orchestrator::geo::{SelectionError, SelectionValidator};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::{projected_raster, raster_bytes, rect_selection, FakeGeo};

fn write_raster(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn selection_outside_raster_is_invalid_with_no_coverage() {
    let dir = tempfile::tempdir().unwrap();
    let raster = write_raster(&dir, "r.tif", &projected_raster([0.0, 30.0, 10.0, 60.0]));
    let geo = FakeGeo::new();

    let report = SelectionValidator::new(geo.as_ref())
        .validate(&rect_selection(50.0, 0.0, 55.0, 5.0), &raster, None)
        .unwrap();

    assert!(!report.valid);
    assert_eq!(report.count, 0.0);
    assert_eq!(Value::Object(report.values), json!({"No count found:": 0}));
}

#[test]
fn single_pixel_without_ceiling_is_valid() {
    let dir = tempfile::tempdir().unwrap();
    let raster = write_raster(&dir, "r.tif", &projected_raster([0.0, 0.0, 10.0, 10.0]));
    let geo = FakeGeo::new();

    let report = SelectionValidator::new(geo.as_ref())
        .validate(&rect_selection(2.2, 2.2, 2.8, 2.8), &raster, None)
        .unwrap();

    assert!(report.valid);
    assert_eq!(report.count, 1.0);
    assert!(report.values.is_empty());
}

#[test]
fn selection_over_ceiling_reports_actual_count() {
    let dir = tempfile::tempdir().unwrap();
    let raster = write_raster(&dir, "r.tif", &projected_raster([0.0, 30.0, 10.0, 60.0]));
    let geo = FakeGeo::new();

    let report = SelectionValidator::new(geo.as_ref())
        .validate(&rect_selection(5.0, 40.0, 8.0, 45.0), &raster, Some(10))
        .unwrap();

    assert!(!report.valid);
    assert_eq!(report.count, 15.0);
    assert_eq!(report.max_count, Some(10));
    assert_eq!(
        Value::Object(report.values),
        json!({"Too many count found (max.10):": "15"})
    );
}

#[test]
fn overlapping_features_do_not_double_count() {
    let dir = tempfile::tempdir().unwrap();
    let raster = write_raster(&dir, "r.tif", &projected_raster([0.0, 0.0, 10.0, 10.0]));
    let geo = FakeGeo::new();

    let selection = json!({
        "features": [
            {"geometry": {"coordinates": [[[0, 0], [4, 0], [4, 4], [0, 4], [0, 0]]]}},
            {"geometry": {"coordinates": [[[2, 2], [6, 2], [6, 6], [2, 6], [2, 2]]]}}
        ]
    });
    let report = SelectionValidator::new(geo.as_ref())
        .validate(&selection, &raster, None)
        .unwrap();

    assert_eq!(report.count, 28.0);
}

#[test]
fn transform_is_built_once_per_raster_crs() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_raster(&dir, "a.tif", &projected_raster([0.0, 0.0, 10.0, 10.0]));
    let b = write_raster(&dir, "b.tif", &projected_raster([10.0, 0.0, 20.0, 10.0]));
    let geo = FakeGeo::new();

    let selection = json!({
        "features": [
            {"geometry": {"coordinates": [[[8, 0], [12, 0], [12, 1], [8, 1], [8, 0]]]}},
            {"geometry": {"coordinates": [[[0, 5], [1, 5], [1, 6], [0, 6], [0, 5]]]}},
            {"geometry": {"coordinates": [[[15, 5], [16, 5], [16, 6], [15, 6], [15, 5]]]}}
        ]
    });
    let report = SelectionValidator::new(geo.as_ref())
        .validate_all(&selection, &[a, b], None)
        .unwrap();

    assert!(report.valid);
    assert_eq!(report.count, 6.0);
    assert_eq!(geo.transformers_built(), 1);
}

#[test]
fn missing_features_is_malformed_input() {
    let dir = tempfile::tempdir().unwrap();
    let raster = write_raster(&dir, "r.tif", &projected_raster([0.0, 0.0, 1.0, 1.0]));
    let geo = FakeGeo::new();

    let err = SelectionValidator::new(geo.as_ref())
        .validate(&json!({"type": "FeatureCollection"}), &raster, None)
        .unwrap_err();
    assert!(matches!(err, SelectionError::MissingFeatures));
    assert!(err.is_malformed_input());
}

#[test]
fn feature_without_geometry_is_malformed_input() {
    let dir = tempfile::tempdir().unwrap();
    let raster = write_raster(&dir, "r.tif", &projected_raster([0.0, 0.0, 1.0, 1.0]));
    let geo = FakeGeo::new();

    let err = SelectionValidator::new(geo.as_ref())
        .validate(&json!({"features": [{"type": "Feature"}]}), &raster, None)
        .unwrap_err();
    assert!(matches!(err, SelectionError::MissingGeometry { index: 0 }));
}

#[test]
fn missing_count_statistic_is_a_computation_fault() {
    let dir = tempfile::tempdir().unwrap();
    let raster = write_raster(&dir, "r.tif", &projected_raster([0.0, 0.0, 10.0, 10.0]));
    let geo = FakeGeo::without_count();

    let err = SelectionValidator::new(geo.as_ref())
        .validate(&rect_selection(1.0, 1.0, 3.0, 3.0), &raster, None)
        .unwrap_err();
    assert!(matches!(err, SelectionError::StatNotComputed { .. }));
    assert!(!err.is_malformed_input());
}

#[test]
fn raster_without_projection_cannot_be_validated() {
    let dir = tempfile::tempdir().unwrap();
    let raster = write_raster(&dir, "r.tif", &raster_bytes(None, [0.0, 0.0, 10.0, 10.0], 1.0));
    let geo = FakeGeo::new();

    let err = SelectionValidator::new(geo.as_ref())
        .validate(&rect_selection(1.0, 1.0, 3.0, 3.0), &raster, None)
        .unwrap_err();
    assert!(matches!(err, SelectionError::MissingProjection { .. }));
}
