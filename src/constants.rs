//! Naming and storage constants shared by the codec, the artifact store and
//! the task registry.

/// Separator joining the slots of a layer name.
pub const SEPARATOR: char = '/';

/// Token occupying an optional slot (variable, time period) that was not given.
pub const PLACEHOLDER: &str = "-";

/// Namespace prefix of every task layer name (`cm/<cm_name>/<task_id>`).
pub const CM_NAMESPACE: &str = "cm";

/// Legend extracted from a successful task payload.
pub const LEGEND_FILE: &str = "legend.json";

/// Raster footprint sidecar of a dataset layer (filename -> ring).
pub const GEOMETRIES_FILE: &str = "geometries.json";

/// CM parameters dumped next to the task artifacts at submission time.
pub const PARAMETERS_FILE: &str = "parameters.json";

/// Staging area for uploads, relative to the CM outputs root.
///
/// The leading dot keeps it out of the CM-name namespace, which only admits
/// `[A-Za-z0-9_-]`.
pub const STAGING_DIR: &str = ".staging";

/// Key of the legend sub-object inside a CM result payload.
pub const LEGEND_KEY: &str = "legend";

/// Prefix that marks a task failure caused by an implementation fault rather
/// than an expected domain failure.
pub const UNEXPECTED_ERROR_PREFIX: &str = "An unexpected error happened: ";

/// Content type of downloadable task archives.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Coordinate reference system of client-drawn selections.
pub const SELECTION_CRS: &str = "EPSG:4326";

/// Zonal statistic used by the selection validity check.
pub const COUNT_STAT: &str = "count";
