//! Geometry types and the geospatial capability consumed by the validator.
//!
//! Raster I/O, reprojection, polygon union and zonal statistics are not
//! implemented here. They are reached through [`GeoEngine`], a capability
//! supplied by the embedding application (GDAL/PROJ bindings in production,
//! a grid fake in tests). This module only owns the client-facing
//! [`Selection`] format and the small amount of planar math needed to filter
//! raster footprints.

pub mod footprint;
pub mod validate;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use validate::{SelectionReport, SelectionValidator};

/// A planar coordinate (`[x, y]`, longitude first for geographic CRSs).
pub type Coord = [f64; 2];

/// Named zonal statistics as returned by the statistics backend.
pub type ZonalStats = BTreeMap<String, f64>;

/// Errors raised by a [`GeoEngine`] implementation.
#[derive(Debug, Error)]
pub enum GeoError {
    /// The raster could not be opened or read.
    #[error("failed to read raster '{}': {source}", path.display())]
    Io {
        /// The raster path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// No transform exists between the two reference systems, or a
    /// coordinate could not be transformed.
    #[error("transform failed: {0}")]
    Transform(String),

    /// Any other backend failure.
    #[error("geospatial backend error: {0}")]
    Backend(String),
}

/// Errors raised while checking a selection.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// The selection has no `features` array.
    #[error("selection does not have any feature")]
    MissingFeatures,

    /// A feature has no `geometry` key.
    #[error("feature {index} does not have a geometry")]
    MissingGeometry {
        /// Position of the feature in the collection.
        index: usize,
    },

    /// A geometry is present but not a readable polygon.
    #[error("feature {index} has a malformed geometry: {reason}")]
    MalformedGeometry {
        /// Position of the feature in the collection.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// The raster has no coordinate reference system to project into.
    #[error("raster '{}' has no projection", raster.display())]
    MissingProjection {
        /// The raster path.
        raster: PathBuf,
    },

    /// The statistics backend returned no usable `count`.
    #[error("statistics not computed: {stats}")]
    StatNotComputed {
        /// Debug rendering of what the backend did return.
        stats: String,
    },

    /// The geospatial backend failed.
    #[error(transparent)]
    Geo(#[from] GeoError),
}

impl SelectionError {
    /// `true` for errors caused by the request itself rather than by the
    /// computation backend.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::MissingFeatures | Self::MissingGeometry { .. } | Self::MalformedGeometry { .. }
        )
    }
}

/// A coordinate reference system identifier (e.g. `EPSG:3035`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Crs(String);

impl Crs {
    /// Wraps an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    /// Minimum x.
    pub min_x: f64,
    /// Minimum y.
    pub min_y: f64,
    /// Maximum x.
    pub max_x: f64,
    /// Maximum y.
    pub max_y: f64,
}

impl Bbox {
    /// Bounding box of a set of coordinates, `None` if empty.
    pub fn of(coords: impl IntoIterator<Item = Coord>) -> Option<Self> {
        coords.into_iter().fold(None, |acc, [x, y]| {
            Some(match acc {
                None => Self {
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                },
                Some(b) => Self {
                    min_x: b.min_x.min(x),
                    min_y: b.min_y.min(y),
                    max_x: b.max_x.max(x),
                    max_y: b.max_y.max(y),
                },
            })
        })
    }

    /// Smallest box covering both.
    pub fn merge(self, other: Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// `true` when the boxes overlap with a positive area.
    ///
    /// Boxes that only share an edge do not intersect.
    pub fn intersects(&self, other: &Self) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }
}

/// A polygon with an exterior ring and optional holes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    /// Exterior ring.
    pub exterior: Vec<Coord>,
    /// Interior rings.
    pub holes: Vec<Vec<Coord>>,
}

impl Polygon {
    /// A polygon without holes.
    pub fn new(exterior: Vec<Coord>) -> Self {
        Self {
            exterior,
            holes: Vec::new(),
        }
    }

    /// Bounding box of the exterior ring.
    pub fn bbox(&self) -> Option<Bbox> {
        Bbox::of(self.exterior.iter().copied())
    }

    /// Even-odd containment test: inside the exterior and outside every hole.
    pub fn contains(&self, point: Coord) -> bool {
        ring_contains(&self.exterior, point) && !self.holes.iter().any(|h| ring_contains(h, point))
    }

    /// Applies a fallible coordinate mapping to every ring.
    pub fn try_map_coords<E>(
        &self,
        mut f: impl FnMut(Coord) -> Result<Coord, E>,
    ) -> Result<Self, E> {
        let mut map_ring = |ring: &Vec<Coord>| ring.iter().map(|c| f(*c)).collect::<Result<Vec<_>, E>>();
        let exterior = map_ring(&self.exterior)?;
        let holes = self
            .holes
            .iter()
            .map(&mut map_ring)
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Self { exterior, holes })
    }
}

/// A set of polygons treated as one zone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiPolygon(pub Vec<Polygon>);

impl MultiPolygon {
    /// `true` when the point is inside any member polygon.
    pub fn contains(&self, point: Coord) -> bool {
        self.0.iter().any(|p| p.contains(point))
    }

    /// Bounding box of all members.
    pub fn bbox(&self) -> Option<Bbox> {
        self.0.iter().filter_map(Polygon::bbox).reduce(Bbox::merge)
    }
}

fn ring_contains(ring: &[Coord], [px, py]: Coord) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Coordinate transform between two reference systems.
pub trait CoordTransform: Send + Sync {
    /// Transforms one coordinate.
    fn transform(&self, coord: Coord) -> Result<Coord, GeoError>;
}

/// The geospatial math capability: raster introspection, reprojection,
/// union and zonal statistics.
pub trait GeoEngine: Send + Sync {
    /// Native reference system of a raster; `None` when the raster carries
    /// no projection.
    fn raster_crs(&self, raster: &Path) -> Result<Option<Crs>, GeoError>;

    /// Builds a transform from `from` to `to`.
    fn transformer(&self, from: &Crs, to: &Crs) -> Result<Box<dyn CoordTransform>, GeoError>;

    /// Merges polygons so that overlapping areas appear once.
    fn union(&self, polygons: &[Polygon]) -> Result<MultiPolygon, GeoError>;

    /// Computes the requested statistics over the cells of `raster`
    /// intersecting `zone`.
    fn zonal_stats(
        &self,
        zone: &MultiPolygon,
        raster: &Path,
        stats: &[&str],
    ) -> Result<ZonalStats, GeoError>;
}

/// A client-drawn selection: polygon features in the selection CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    polygons: Vec<Polygon>,
}

impl Selection {
    /// Reads the polygons of a GeoJSON-like feature collection.
    ///
    /// Each feature must carry a `geometry` with `coordinates`. The geometry
    /// `type` may be `Polygon` or `MultiPolygon`; when it is absent the shape
    /// is inferred from the nesting depth of the coordinates.
    ///
    /// ```
    /// use cm_orchestrator::geo::Selection;
    /// use serde_json::json;
    ///
    /// let selection = Selection::from_geojson(&json!({
    ///     "features": [{"geometry": {"coordinates": [[[5, 40], [8, 40], [8, 45], [5, 45], [5, 40]]]}}]
    /// })).unwrap();
    /// assert_eq!(selection.polygons().len(), 1);
    /// ```
    pub fn from_geojson(value: &Value) -> Result<Self, SelectionError> {
        let features = value
            .get("features")
            .and_then(Value::as_array)
            .ok_or(SelectionError::MissingFeatures)?;

        let mut polygons = Vec::new();
        for (index, feature) in features.iter().enumerate() {
            let geometry = feature
                .get("geometry")
                .ok_or(SelectionError::MissingGeometry { index })?;
            let malformed = |reason: &str| SelectionError::MalformedGeometry {
                index,
                reason: reason.to_string(),
            };
            let coordinates = geometry
                .get("coordinates")
                .ok_or_else(|| malformed("missing coordinates"))?;

            let is_multi = match geometry.get("type").and_then(Value::as_str) {
                Some("Polygon") => false,
                Some("MultiPolygon") => true,
                Some(other) => return Err(malformed(&format!("unsupported type {other}"))),
                None => coordinates
                    .pointer("/0/0/0")
                    .is_some_and(Value::is_array),
            };

            if is_multi {
                let parts = coordinates
                    .as_array()
                    .ok_or_else(|| malformed("coordinates are not an array"))?;
                for part in parts {
                    polygons.push(parse_polygon(part).map_err(|r| malformed(&r))?);
                }
            } else {
                polygons.push(parse_polygon(coordinates).map_err(|r| malformed(&r))?);
            }
        }

        Ok(Self { polygons })
    }

    /// Builds a selection from polygons already in the selection CRS.
    pub fn from_polygons(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    /// The selected polygons.
    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    /// Bounding box of the whole selection, `None` when empty.
    pub fn bbox(&self) -> Option<Bbox> {
        self.polygons.iter().filter_map(Polygon::bbox).reduce(Bbox::merge)
    }
}

fn parse_polygon(value: &Value) -> Result<Polygon, String> {
    let rings = value
        .as_array()
        .ok_or_else(|| "polygon is not an array of rings".to_string())?;
    let mut rings = rings.iter().map(parse_ring);
    let exterior = rings
        .next()
        .ok_or_else(|| "polygon has no exterior ring".to_string())??;
    let holes = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon { exterior, holes })
}

fn parse_ring(value: &Value) -> Result<Vec<Coord>, String> {
    let positions = value
        .as_array()
        .ok_or_else(|| "ring is not an array of positions".to_string())?;
    let ring = positions
        .iter()
        .map(|position| {
            let x = position.get(0).and_then(Value::as_f64);
            let y = position.get(1).and_then(Value::as_f64);
            match (x, y) {
                (Some(x), Some(y)) => Ok([x, y]),
                _ => Err(format!("invalid position {position}")),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    if ring.len() < 3 {
        return Err(format!("ring has {} positions, need at least 3", ring.len()));
    }
    Ok(ring)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon {
        Polygon::new(vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]])
    }

    #[test]
    fn missing_features_is_malformed() {
        let err = Selection::from_geojson(&json!({"type": "FeatureCollection"})).unwrap_err();
        assert!(matches!(err, SelectionError::MissingFeatures));
        assert!(err.is_malformed_input());
    }

    #[test]
    fn missing_geometry_names_the_feature() {
        let err = Selection::from_geojson(&json!({
            "features": [
                {"geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}},
                {"properties": {}}
            ]
        }))
        .unwrap_err();
        assert!(matches!(err, SelectionError::MissingGeometry { index: 1 }));
    }

    #[test]
    fn multipolygon_is_flattened() {
        let selection = Selection::from_geojson(&json!({
            "features": [{"geometry": {"coordinates": [
                [[[0, 0], [1, 0], [1, 1], [0, 0]]],
                [[[5, 5], [6, 5], [6, 6], [5, 5]]]
            ]}}]
        }))
        .unwrap();
        assert_eq!(selection.polygons().len(), 2);
        let bbox = selection.bbox().unwrap();
        assert_eq!((bbox.min_x, bbox.max_x), (0.0, 6.0));
    }

    #[test]
    fn non_polygon_geometry_is_malformed() {
        let err = Selection::from_geojson(&json!({
            "features": [{"geometry": {"type": "Point", "coordinates": [1, 2]}}]
        }))
        .unwrap_err();
        assert!(matches!(err, SelectionError::MalformedGeometry { index: 0, .. }));
    }

    #[test]
    fn containment_respects_holes() {
        let mut polygon = square(0.0, 0.0, 10.0, 10.0);
        polygon.holes.push(square(4.0, 4.0, 6.0, 6.0).exterior);
        assert!(polygon.contains([1.0, 1.0]));
        assert!(!polygon.contains([5.0, 5.0]));
        assert!(!polygon.contains([11.0, 5.0]));
    }

    #[test]
    fn touching_boxes_do_not_intersect() {
        let a = square(0.0, 30.0, 10.0, 60.0).bbox().unwrap();
        let b = square(10.0, 30.0, 20.0, 60.0).bbox().unwrap();
        let c = square(5.0, 40.0, 8.0, 45.0).bbox().unwrap();
        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
        assert!(!b.intersects(&c));
    }
}
