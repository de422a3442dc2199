//! Shared fixtures: a grid-raster geospatial engine and filesystem helpers.
//!
//! Fake rasters are small text files:
//!
//! ```text
//! EPSG:4326              projection line, omitted for an unprojected raster
//! 0 30 10 60 1           min_x min_y max_x max_y cell_size
//! ```
//!
//! Every cell holds a value; a cell is covered by a zone when its center is.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cm_orchestrator::config::StorageConfig;
use cm_orchestrator::geo::{
    Coord, CoordTransform, Crs, GeoEngine, GeoError, MultiPolygon, Polygon, ZonalStats,
};
use cm_orchestrator::storage::ArtifactStore;
use serde_json::{json, Value};

pub const TASK_ID: &str = "01234567-0000-0000-0000-000000000000";

/// Text content of a fake raster.
pub fn raster_bytes(crs: Option<&str>, extent: [f64; 4], cell: f64) -> Vec<u8> {
    let mut text = String::new();
    if let Some(crs) = crs {
        text.push_str(crs);
        text.push('\n');
    }
    text.push_str(&format!(
        "{} {} {} {} {}\n",
        extent[0], extent[1], extent[2], extent[3], cell
    ));
    text.into_bytes()
}

/// A projected raster covering `extent` with unit cells.
pub fn projected_raster(extent: [f64; 4]) -> Vec<u8> {
    raster_bytes(Some("EPSG:4326"), extent, 1.0)
}

/// Feature collection with one rectangular polygon.
pub fn rect_selection(x0: f64, y0: f64, x1: f64, y1: f64) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {
                "coordinates": [[[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]]
            }
        }]
    })
}

/// Store rooted in a fresh temporary directory.
pub fn temp_store() -> (tempfile::TempDir, ArtifactStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(StorageConfig::rooted_at(dir.path()));
    (dir, store)
}

struct Grid {
    extent: [f64; 4],
    cell: f64,
}

fn read_raster(path: &Path) -> Result<(Option<Crs>, Grid), GeoError> {
    let text = std::fs::read_to_string(path).map_err(|source| GeoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty()).peekable();

    let crs = match lines.peek() {
        Some(line) if line.starts_with("EPSG:") => {
            let crs = Crs::new(line.trim());
            lines.next();
            Some(crs)
        },
        _ => None,
    };

    let numbers: Vec<f64> = lines
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .filter_map(|n| n.parse().ok())
        .collect();
    match numbers.as_slice() {
        [x0, y0, x1, y1, cell] => Ok((
            crs,
            Grid {
                extent: [*x0, *y0, *x1, *y1],
                cell: *cell,
            },
        )),
        _ => Err(GeoError::Backend(format!(
            "'{}' is not a raster",
            path.display()
        ))),
    }
}

struct Identity;

impl CoordTransform for Identity {
    fn transform(&self, coord: Coord) -> Result<Coord, GeoError> {
        Ok(coord)
    }
}

/// Grid-raster engine. Transforms are identities.
#[derive(Default)]
pub struct FakeGeo {
    transformers_built: AtomicUsize,
    drop_count_stat: bool,
}

impl FakeGeo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// An engine whose zonal statistics never carry `count`.
    pub fn without_count() -> Arc<Self> {
        Arc::new(Self {
            drop_count_stat: true,
            ..Self::default()
        })
    }

    pub fn transformers_built(&self) -> usize {
        self.transformers_built.load(Ordering::SeqCst)
    }
}

impl GeoEngine for FakeGeo {
    fn raster_crs(&self, raster: &Path) -> Result<Option<Crs>, GeoError> {
        Ok(read_raster(raster)?.0)
    }

    fn transformer(&self, _from: &Crs, _to: &Crs) -> Result<Box<dyn CoordTransform>, GeoError> {
        self.transformers_built.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Identity))
    }

    fn union(&self, polygons: &[Polygon]) -> Result<MultiPolygon, GeoError> {
        Ok(MultiPolygon(polygons.to_vec()))
    }

    fn zonal_stats(
        &self,
        zone: &MultiPolygon,
        raster: &Path,
        stats: &[&str],
    ) -> Result<ZonalStats, GeoError> {
        let (_, grid) = read_raster(raster)?;
        let [x0, y0, x1, y1] = grid.extent;

        let mut count = 0.0;
        let mut y = y0 + grid.cell / 2.0;
        while y < y1 {
            let mut x = x0 + grid.cell / 2.0;
            while x < x1 {
                if zone.contains([x, y]) {
                    count += 1.0;
                }
                x += grid.cell;
            }
            y += grid.cell;
        }

        let mut result = ZonalStats::new();
        if !self.drop_count_stat && stats.contains(&"count") {
            result.insert("count".to_string(), count);
        }
        Ok(result)
    }
}
