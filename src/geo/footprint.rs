//! Raster footprints of a dataset layer.
//!
//! A layer directory may carry a `geometries.json` sidecar mapping each
//! raster filename to the outline of the area it covers, in the selection
//! CRS. It lets a task skip rasters that cannot intersect the selection.

use std::collections::BTreeMap;

use super::{Bbox, Coord, Selection};

/// Raster filename to footprint outline.
pub type Footprints = BTreeMap<String, Vec<Coord>>;

/// Rasters whose footprint bounding box overlaps the selection, sorted by
/// filename.
///
/// An empty selection selects nothing. Footprints with no coordinates are
/// skipped.
pub fn select_rasters(footprints: &Footprints, selection: &Selection) -> Vec<String> {
    let Some(area) = selection.bbox() else {
        return Vec::new();
    };

    footprints
        .iter()
        .filter(|(_, outline)| {
            Bbox::of(outline.iter().copied()).is_some_and(|bbox| bbox.intersects(&area))
        })
        .map(|(name, _)| name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Polygon;

    fn outline(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Coord> {
        vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]
    }

    #[test]
    fn only_overlapping_rasters_are_selected() {
        let footprints: Footprints = [
            ("west.tif".to_string(), outline(0.0, 30.0, 10.0, 60.0)),
            ("east.tif".to_string(), outline(10.0, 30.0, 20.0, 60.0)),
            ("empty.tif".to_string(), Vec::new()),
        ]
        .into_iter()
        .collect();

        let selection = Selection::from_polygons(vec![Polygon::new(outline(5.0, 40.0, 8.0, 45.0))]);
        assert_eq!(select_rasters(&footprints, &selection), vec!["west.tif"]);

        let straddling =
            Selection::from_polygons(vec![Polygon::new(outline(8.0, 40.0, 12.0, 45.0))]);
        assert_eq!(
            select_rasters(&footprints, &straddling),
            vec!["east.tif", "west.tif"]
        );
    }

    #[test]
    fn empty_selection_selects_nothing() {
        let footprints: Footprints =
            [("a.tif".to_string(), outline(0.0, 0.0, 1.0, 1.0))].into_iter().collect();
        assert!(select_rasters(&footprints, &Selection::from_polygons(Vec::new())).is_empty());
    }
}
