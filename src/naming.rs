//! Canonical layer and task names.
//!
//! A [`LayerName`] identifies a dataset layer from its semantic identifiers
//! (geometry kind, dataset id, optional variable, optional time period). A
//! [`TaskLayer`] identifies the artifact set of one calculation module task.
//! Both are used opaquely as storage keys and URL path segments; they are
//! never decoded back into their parts except through [`LayerRef::parse`].
//!
//! # Encoding
//!
//! ```text
//! raster/42                      no variable, no time period
//! raster/42/var name/-           variable only
//! raster/42/-/2015               time period only
//! raster/42/var name/2015        both
//! cm/<cm_name>/<task_id>         task artifact set
//! ```
//!
//! Once either optional slot is present both slots are written, with
//! [`PLACEHOLDER`] standing in for the absent one, so a slot never shifts
//! position. Slot values are joined with [`SEPARATOR`], which is therefore
//! rejected inside a variable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{CM_NAMESPACE, PLACEHOLDER, SEPARATOR};

/// Errors raised while building or parsing a layer name.
///
/// These are caller contract violations: the codec fails fast and never
/// coerces a malformed input into some other name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamingError {
    /// The geometry kind is not one of the recognized kinds.
    #[error("unknown layer kind '{0}' (expected 'raster' or 'vector')")]
    UnknownKind(String),

    /// A variable cannot be represented without ambiguity.
    #[error("invalid variable '{variable}': {reason}")]
    InvalidVariable {
        /// The rejected variable.
        variable: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A path segment that should hold an integer does not.
    #[error("invalid {slot} '{value}': not an integer")]
    InvalidNumber {
        /// Name of the slot (`dataset id`, `time period`).
        slot: &'static str,
        /// The offending raw value.
        value: String,
    },

    /// A percent-encoded segment does not decode to UTF-8.
    #[error("segment '{0}' is not valid percent-encoded UTF-8")]
    InvalidEncoding(String),

    /// A calculation module name contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid calculation module name '{0}'")]
    InvalidCmName(String),

    /// A task id contains characters outside `[0-9A-Fa-f-]`.
    #[error("invalid task id '{0}'")]
    InvalidTaskId(String),

    /// Shard parameters cannot split a task id (zero or overflowing).
    #[error("invalid sharding {depth} x {width}")]
    InvalidSharding {
        /// Shard directory levels.
        depth: usize,
        /// Hex digits per level.
        width: usize,
    },

    /// The layer reference string does not have a recognized shape.
    #[error("malformed layer reference '{0}'")]
    Malformed(String),
}

/// Geometry kind of a dataset layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// Gridded raster data.
    Raster,
    /// Vector geometries.
    Vector,
}

impl LayerKind {
    /// The slot value of this kind inside a layer name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raster => "raster",
            Self::Vector => "vector",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayerKind {
    type Err = NamingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raster" => Ok(Self::Raster),
            "vector" => Ok(Self::Vector),
            other => Err(NamingError::UnknownKind(other.to_string())),
        }
    }
}

/// Canonical name of a dataset layer.
///
/// # Examples
///
/// ```
/// use cm_orchestrator::naming::{LayerKind, LayerName};
///
/// let name = LayerName::new(LayerKind::Raster, 42, None, None).unwrap();
/// assert_eq!(name.as_str(), "raster/42");
///
/// let name = LayerName::new(LayerKind::Vector, 42, Some("var name"), None).unwrap();
/// assert_eq!(name.as_str(), "vector/42/var name/-");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerName {
    kind: LayerKind,
    dataset_id: u64,
    variable: Option<String>,
    time_period: Option<i32>,
    encoded: String,
}

impl LayerName {
    /// Builds the canonical name from its semantic identifiers.
    ///
    /// # Errors
    ///
    /// [`NamingError::InvalidVariable`] if the variable is empty, equals the
    /// placeholder, or contains the separator.
    pub fn new(
        kind: LayerKind,
        dataset_id: u64,
        variable: Option<&str>,
        time_period: Option<i32>,
    ) -> Result<Self, NamingError> {
        if let Some(variable) = variable {
            validate_variable(variable)?;
        }

        let mut encoded = format!("{kind}{SEPARATOR}{dataset_id}");
        if variable.is_some() || time_period.is_some() {
            encoded.push(SEPARATOR);
            encoded.push_str(variable.unwrap_or(PLACEHOLDER));
            encoded.push(SEPARATOR);
            match time_period {
                Some(period) => encoded.push_str(&period.to_string()),
                None => encoded.push_str(PLACEHOLDER),
            }
        }

        Ok(Self {
            kind,
            dataset_id,
            variable: variable.map(str::to_string),
            time_period,
            encoded,
        })
    }

    /// Builds a name from the raw URL path segments of the boundary layer.
    ///
    /// The variable segment is percent-decoded; a segment equal to `-`
    /// stands for an absent slot.
    ///
    /// ```
    /// use cm_orchestrator::naming::LayerName;
    ///
    /// let name = LayerName::from_path_segments("raster", "42", Some("var%20name"), Some("2015")).unwrap();
    /// assert_eq!(name.as_str(), "raster/42/var name/2015");
    /// ```
    pub fn from_path_segments(
        kind: &str,
        dataset_id: &str,
        variable: Option<&str>,
        time_period: Option<&str>,
    ) -> Result<Self, NamingError> {
        let kind = kind.parse::<LayerKind>()?;
        let dataset_id = parse_number::<u64>("dataset id", dataset_id)?;
        let variable = match variable.filter(|v| *v != PLACEHOLDER) {
            Some(raw) => Some(
                urlencoding::decode(raw)
                    .map_err(|_| NamingError::InvalidEncoding(raw.to_string()))?
                    .into_owned(),
            ),
            None => None,
        };
        let time_period = time_period
            .filter(|p| *p != PLACEHOLDER)
            .map(|p| parse_number::<i32>("time period", p))
            .transpose()?;

        Self::new(kind, dataset_id, variable.as_deref(), time_period)
    }

    /// Geometry kind.
    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    /// Dataset id.
    pub fn dataset_id(&self) -> u64 {
        self.dataset_id
    }

    /// Variable, if the layer is restricted to one.
    pub fn variable(&self) -> Option<&str> {
        self.variable.as_deref()
    }

    /// Time period, if the layer is restricted to one.
    pub fn time_period(&self) -> Option<i32> {
        self.time_period
    }

    /// The encoded name.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// The encoded name without its leading `<kind>/` slot.
    pub fn without_kind(&self) -> &str {
        &self.encoded[self.kind.as_str().len() + 1..]
    }
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

/// Builds a dataset layer name from a kind string.
///
/// Thin wrapper over [`LayerName::new`] for callers holding the kind as text.
///
/// # Errors
///
/// [`NamingError::UnknownKind`] for any kind other than `raster`/`vector`.
pub fn make_name(
    kind: &str,
    dataset_id: u64,
    variable: Option<&str>,
    time_period: Option<i32>,
) -> Result<LayerName, NamingError> {
    LayerName::new(kind.parse()?, dataset_id, variable, time_period)
}

/// Name of the artifact set of one calculation module task.
///
/// ```
/// use cm_orchestrator::naming::TaskLayer;
///
/// let task = TaskLayer::new("mock_cm", "01234567-0000-0000-0000-000000000000").unwrap();
/// assert_eq!(task.to_string(), "cm/mock_cm/01234567-0000-0000-0000-000000000000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TaskLayerParts")]
pub struct TaskLayer {
    cm_name: String,
    task_id: String,
}

#[derive(Deserialize)]
struct TaskLayerParts {
    cm_name: String,
    task_id: String,
}

impl TryFrom<TaskLayerParts> for TaskLayer {
    type Error = NamingError;

    fn try_from(parts: TaskLayerParts) -> Result<Self, Self::Error> {
        Self::new(parts.cm_name, parts.task_id)
    }
}

impl TaskLayer {
    /// Builds a task layer, validating both identifiers.
    ///
    /// # Errors
    ///
    /// - [`NamingError::InvalidCmName`] unless the name matches `[A-Za-z0-9_-]+`.
    /// - [`NamingError::InvalidTaskId`] unless the id matches `[0-9A-Fa-f-]+`.
    pub fn new(
        cm_name: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Result<Self, NamingError> {
        let cm_name = cm_name.into();
        let task_id = task_id.into();

        let cm_ok = !cm_name.is_empty()
            && cm_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !cm_ok {
            return Err(NamingError::InvalidCmName(cm_name));
        }

        let id_ok = task_id.chars().any(|c| c.is_ascii_hexdigit())
            && task_id.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
        if !id_ok {
            return Err(NamingError::InvalidTaskId(task_id));
        }

        Ok(Self { cm_name, task_id })
    }

    /// Owning calculation module.
    pub fn cm_name(&self) -> &str {
        &self.cm_name
    }

    /// Engine-assigned task id.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl fmt::Display for TaskLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{CM_NAMESPACE}{SEPARATOR}{}{SEPARATOR}{}",
            self.cm_name, self.task_id
        )
    }
}

/// Either kind of layer reference a caller may target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LayerRef {
    /// A dataset layer.
    Dataset(LayerName),
    /// The outputs of a previous task.
    Task(TaskLayer),
}

impl LayerRef {
    /// Parses an encoded layer name back into its reference.
    ///
    /// ```
    /// use cm_orchestrator::naming::{LayerKind, LayerRef};
    ///
    /// match LayerRef::parse("raster/42").unwrap() {
    ///     LayerRef::Dataset(name) => assert_eq!(name.kind(), LayerKind::Raster),
    ///     LayerRef::Task(_) => unreachable!(),
    /// }
    /// ```
    pub fn parse(encoded: &str) -> Result<Self, NamingError> {
        let parts: Vec<&str> = encoded.split(SEPARATOR).collect();
        match parts.as_slice() {
            [CM_NAMESPACE, cm_name, task_id] => Ok(Self::Task(TaskLayer::new(*cm_name, *task_id)?)),
            [kind, id] => Ok(Self::Dataset(LayerName::new(
                kind.parse()?,
                parse_number("dataset id", id)?,
                None,
                None,
            )?)),
            [kind, id, variable, period] => {
                let variable = Some(*variable).filter(|v| *v != PLACEHOLDER);
                let period = Some(*period)
                    .filter(|p| *p != PLACEHOLDER)
                    .map(|p| parse_number::<i32>("time period", p))
                    .transpose()?;
                Ok(Self::Dataset(LayerName::new(
                    kind.parse()?,
                    parse_number("dataset id", id)?,
                    variable,
                    period,
                )?))
            },
            _ => Err(NamingError::Malformed(encoded.to_string())),
        }
    }
}

impl fmt::Display for LayerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dataset(name) => name.fmt(f),
            Self::Task(task) => task.fmt(f),
        }
    }
}

impl From<LayerName> for LayerRef {
    fn from(name: LayerName) -> Self {
        Self::Dataset(name)
    }
}

impl From<TaskLayer> for LayerRef {
    fn from(task: TaskLayer) -> Self {
        Self::Task(task)
    }
}

fn validate_variable(variable: &str) -> Result<(), NamingError> {
    let reason = if variable.is_empty() {
        Some("empty")
    } else if variable == PLACEHOLDER {
        Some("reserved placeholder")
    } else if variable.contains(SEPARATOR) {
        Some("contains the slot separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(NamingError::InvalidVariable {
            variable: variable.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn parse_number<T: FromStr>(slot: &'static str, value: &str) -> Result<T, NamingError> {
    value.parse::<T>().map_err(|_| NamingError::InvalidNumber {
        slot,
        value: value.to_string(),
    })
}
