//! Selection validity check.
//!
//! Runs before a task is submitted: counts the non-null raster cells covered
//! by the selection and rejects selections that cover nothing or more than
//! the calculation module accepts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{CoordTransform, Crs, GeoEngine, Polygon, Selection, SelectionError};
use crate::constants::{COUNT_STAT, SELECTION_CRS};

/// Outcome of a validity check.
///
/// `values` follows the result contract of calculation modules so the
/// report can be surfaced as-is to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionReport {
    /// Whether the selection may proceed.
    pub valid: bool,
    /// Non-null cells covered by the selection.
    pub count: f64,
    /// Ceiling the count was checked against, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u64>,
    /// Human-readable indicators for a rejected selection.
    pub values: Map<String, Value>,
}

impl SelectionReport {
    /// Classifies a cell count.
    ///
    /// ```
    /// use cm_orchestrator::geo::SelectionReport;
    ///
    /// assert!(!SelectionReport::classify(0.0, None).valid);
    /// assert!(SelectionReport::classify(1.0, None).valid);
    /// assert!(!SelectionReport::classify(11.0, Some(10)).valid);
    /// ```
    pub fn classify(count: f64, max_count: Option<u64>) -> Self {
        let mut values = Map::new();
        let valid = if count <= 0.0 {
            values.insert("No count found:".to_string(), Value::from(0));
            false
        } else if let Some(max) = max_count.filter(|max| count > *max as f64) {
            values.insert(
                format!("Too many count found (max.{max}):"),
                Value::String(format_count(count)),
            );
            false
        } else {
            true
        };

        Self {
            valid,
            count,
            max_count,
            values,
        }
    }
}

fn format_count(count: f64) -> String {
    if count.fract() == 0.0 && count.abs() < 1e15 {
        format!("{}", count as i64)
    } else {
        count.to_string()
    }
}

/// Checks selections against rasters through a [`GeoEngine`].
pub struct SelectionValidator<'a> {
    geo: &'a dyn GeoEngine,
}

impl<'a> SelectionValidator<'a> {
    /// Creates a validator over the given engine.
    pub fn new(geo: &'a dyn GeoEngine) -> Self {
        Self { geo }
    }

    /// Validates a GeoJSON selection against one raster.
    ///
    /// # Errors
    ///
    /// - [`SelectionError::MissingFeatures`] / [`SelectionError::MissingGeometry`]
    ///   for a malformed selection.
    /// - [`SelectionError::MissingProjection`] when the raster has no CRS.
    /// - [`SelectionError::StatNotComputed`] when the statistics backend
    ///   returns no usable count.
    pub fn validate(
        &self,
        selection: &Value,
        raster: &Path,
        max_count: Option<u64>,
    ) -> Result<SelectionReport, SelectionError> {
        self.validate_all(selection, std::slice::from_ref(&raster.to_path_buf()), max_count)
    }

    /// Validates a selection against a set of rasters, summing their counts.
    ///
    /// The selection is parsed once and each distinct raster CRS gets one
    /// transform, reused for every feature.
    pub fn validate_all(
        &self,
        selection: &Value,
        rasters: &[PathBuf],
        max_count: Option<u64>,
    ) -> Result<SelectionReport, SelectionError> {
        let selection = Selection::from_geojson(selection)?;
        let source = Crs::new(SELECTION_CRS);
        let mut transforms: HashMap<Crs, Box<dyn CoordTransform>> = HashMap::new();

        let mut count = 0.0;
        for raster in rasters {
            let target = self
                .geo
                .raster_crs(raster)?
                .ok_or_else(|| SelectionError::MissingProjection {
                    raster: raster.clone(),
                })?;

            if !transforms.contains_key(&target) {
                let transform = self.geo.transformer(&source, &target)?;
                transforms.insert(target.clone(), transform);
            }
            let Some(transform) = transforms.get(&target) else {
                continue;
            };

            let projected = selection
                .polygons()
                .iter()
                .map(|polygon| polygon.try_map_coords(|c| transform.transform(c)))
                .collect::<Result<Vec<Polygon>, _>>()?;
            let zone = self.geo.union(&projected)?;

            let stats = self.geo.zonal_stats(&zone, raster, &[COUNT_STAT])?;
            let raster_count = stats
                .get(COUNT_STAT)
                .copied()
                .filter(|c| !c.is_nan())
                .ok_or_else(|| SelectionError::StatNotComputed {
                    stats: format!("{stats:?}"),
                })?;
            tracing::debug!(raster = %raster.display(), crs = %target, count = raster_count, "zonal count");
            count += raster_count;
        }

        let report = SelectionReport::classify(count, max_count);
        if !report.valid {
            tracing::info!(count, ?max_count, "selection rejected");
        }
        Ok(report)
    }
}
