//! Task orchestration and sharded artifact storage for geospatial
//! calculation modules.
//!
//! A client submits a selection, a target layer and parameters to a
//! calculation module (CM). This crate checks the selection, forwards the
//! job to an external execution engine, tracks its status, stores its
//! artifacts under a sharded directory tree and packages them for download.
//!
//! # Module Organization
//!
//! - [`naming`] - canonical layer and task names
//! - [`storage`] - on-disk layout, uploads ([`storage::upload`]) and archives
//!   ([`storage::archive`])
//! - [`geo`] - selections, the [`GeoEngine`] capability and the validity check
//! - [`engine`] - the [`ExecutionEngine`] capability and an in-memory engine
//! - [`registry`] - task status resolution
//! - [`service`] - the operations exposed to the HTTP layer
//! - [`config`] - storage roots and sharding
//!
//! # Example
//!
//! ```
//! use cm_orchestrator::config::StorageConfig;
//! use cm_orchestrator::naming::{make_name, TaskLayer};
//! use cm_orchestrator::storage::ArtifactStore;
//!
//! let store = ArtifactStore::new(StorageConfig::rooted_at("/srv/data"));
//! let layer = make_name("raster", 42, None, None).unwrap();
//! assert!(store.dir_for(&layer).unwrap().ends_with("rasters/42"));
//!
//! let task = TaskLayer::new("mock_cm", "01234567-0000-0000-0000-000000000000").unwrap();
//! assert!(store
//!     .dir_for(&task)
//!     .unwrap()
//!     .ends_with("mock_cm/01/23/45/67/01234567-0000-0000-0000-000000000000"));
//! ```

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod geo;
#[cfg(feature = "logging")]
pub mod logging;
pub mod naming;
pub mod registry;
pub mod service;
pub mod storage;
pub mod types;

pub use config::{ConfigError, StorageConfig};
pub use engine::{EngineError, EngineState, ExecutionEngine, InMemoryEngine, JobArgs};
pub use error::{ErrorKind, TaskError};
pub use geo::{GeoEngine, Selection, SelectionError, SelectionReport, SelectionValidator};
pub use naming::{make_name, LayerKind, LayerName, LayerRef, NamingError, TaskLayer};
pub use registry::{normalize_outcome, TaskOutcome, TaskRegistry};
pub use service::{CmService, CreateTaskRequest};
pub use storage::{Archive, ArchiveAssembler, ArtifactStore, StorageError, UploadError, UploadIngestor};
pub use types::{CmDescriptor, TaskResult, TaskStatus, TaskView};
