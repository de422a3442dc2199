//! Wire types returned to the HTTP layer.

pub mod task;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use task::{TaskResult, TaskStatus, TaskView};

/// A calculation module as advertised to clients.
///
/// `max_pixel_count` is internal configuration and is not serialized.
///
/// # Examples
///
/// ```
/// use cm_orchestrator::CmDescriptor;
///
/// let cm = CmDescriptor::new("mock_cm", "Mock CM").with_max_pixel_count(1_000);
/// let json = serde_json::to_value(&cm).unwrap();
/// assert_eq!(json["pretty_name"], "Mock CM");
/// assert!(json.get("max_pixel_count").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmDescriptor {
    /// Unique name, used in task layer names.
    pub name: String,
    /// Display name.
    pub pretty_name: String,
    /// Positional arguments the module expects.
    #[serde(default)]
    pub parameters: Vec<String>,
    /// JSON schema of the module parameters.
    #[serde(default)]
    pub schema: Value,
    /// Layers the module may run on.
    #[serde(default)]
    pub input_layers: Vec<String>,
    /// Documentation link.
    #[serde(default)]
    pub wiki: String,
    /// Largest selection, in raster cells, the module accepts.
    #[serde(skip)]
    pub max_pixel_count: Option<u64>,
}

impl CmDescriptor {
    /// A descriptor with the usual `selection, rasters, params` arguments
    /// and an empty schema.
    pub fn new(name: impl Into<String>, pretty_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pretty_name: pretty_name.into(),
            parameters: vec![
                "selection".to_string(),
                "rasters".to_string(),
                "params".to_string(),
            ],
            schema: Value::Object(Default::default()),
            input_layers: Vec::new(),
            wiki: String::new(),
            max_pixel_count: None,
        }
    }

    /// Sets the selection ceiling.
    pub fn with_max_pixel_count(mut self, max: u64) -> Self {
        self.max_pixel_count = Some(max);
        self
    }

    /// Sets the parameter schema.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }
}
