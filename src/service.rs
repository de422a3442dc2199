//! The operations exposed to the HTTP layer.
//!
//! [`CmService`] wires the codec, the artifact store, the selection
//! validator, the upload ingestor, the archive assembler and the task
//! registry together. Every operation returns a [`TaskError`] whose
//! [`kind`](TaskError::kind) tells the routing layer how to answer.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::StorageConfig;
use crate::constants::PARAMETERS_FILE;
use crate::engine::{ExecutionEngine, JobArgs};
use crate::error::TaskError;
use crate::geo::footprint::select_rasters;
use crate::geo::{GeoEngine, Selection, SelectionReport, SelectionValidator};
use crate::naming::{LayerRef, TaskLayer};
use crate::registry::TaskRegistry;
use crate::storage::upload::is_raster_filename;
use crate::storage::{Archive, ArchiveAssembler, ArtifactStore, UploadIngestor};
use crate::types::{CmDescriptor, TaskView};

/// Body of a task creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    /// Feature collection drawn by the client.
    pub selection: Value,
    /// Encoded name of the layer to run on (`raster/42`, `cm/<cm>/<id>`).
    pub layer: String,
    /// Module parameters, forwarded verbatim.
    #[serde(default)]
    pub parameters: Value,
}

/// Task orchestration over a store, an engine and a geospatial backend.
pub struct CmService {
    store: Arc<ArtifactStore>,
    registry: TaskRegistry,
    geo: Arc<dyn GeoEngine>,
    catalog: BTreeMap<String, CmDescriptor>,
}

impl CmService {
    /// Creates a service with an empty module catalog.
    pub fn new(
        config: StorageConfig,
        engine: Arc<dyn ExecutionEngine>,
        geo: Arc<dyn GeoEngine>,
    ) -> Self {
        let store = Arc::new(ArtifactStore::new(config));
        Self {
            registry: TaskRegistry::new(engine, Arc::clone(&store)),
            store,
            geo,
            catalog: BTreeMap::new(),
        }
    }

    /// Adds a module to the catalog, replacing one with the same name.
    pub fn with_cm(mut self, cm: CmDescriptor) -> Self {
        self.register_cm(cm);
        self
    }

    /// Adds a module to the catalog, replacing one with the same name.
    pub fn register_cm(&mut self, cm: CmDescriptor) {
        self.catalog.insert(cm.name.clone(), cm);
    }

    /// Registered modules, sorted by name.
    pub fn list_cms(&self) -> Vec<&CmDescriptor> {
        self.catalog.values().collect()
    }

    /// A registered module.
    pub fn cm(&self, cm_name: &str) -> Result<&CmDescriptor, TaskError> {
        self.catalog.get(cm_name).ok_or_else(|| TaskError::UnknownCm {
            cm_name: cm_name.to_string(),
        })
    }

    /// The artifact store.
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// The task registry.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Validates a selection against a layer without submitting anything.
    pub fn check_selection(
        &self,
        cm_name: &str,
        selection: &Value,
        layer: &str,
    ) -> Result<SelectionReport, TaskError> {
        let cm = self.cm(cm_name)?;
        let parsed = Selection::from_geojson(selection)?;
        let layer = LayerRef::parse(layer)?;
        let rasters = self.resolve_rasters(&layer, &parsed)?;
        if rasters.is_empty() {
            return Ok(SelectionReport::classify(0.0, cm.max_pixel_count));
        }
        Ok(SelectionValidator::new(self.geo.as_ref()).validate_all(
            selection,
            &rasters,
            cm.max_pixel_count,
        )?)
    }

    /// Validates the selection, submits the job and dumps its parameters
    /// next to its future artifacts.
    ///
    /// # Errors
    ///
    /// - [`TaskError::UnknownCm`] / [`TaskError::LayerNotFound`]
    /// - [`TaskError::MalformedInput`] for an unreadable selection or layer name
    /// - [`TaskError::ValidationRejected`] when the selection covers no cell,
    ///   or more cells than the module accepts
    /// - [`TaskError::StorageFault`] when the parameters cannot be stored; the
    ///   submitted job is terminated first
    pub async fn create_task(
        &self,
        cm_name: &str,
        request: CreateTaskRequest,
    ) -> Result<TaskLayer, TaskError> {
        let cm = self.cm(cm_name)?;
        let selection = Selection::from_geojson(&request.selection)?;
        let layer = LayerRef::parse(&request.layer)?;

        let rasters = self.resolve_rasters(&layer, &selection)?;
        let report = if rasters.is_empty() {
            SelectionReport::classify(0.0, cm.max_pixel_count)
        } else {
            SelectionValidator::new(self.geo.as_ref()).validate_all(
                &request.selection,
                &rasters,
                cm.max_pixel_count,
            )?
        };
        if !report.valid {
            return Err(TaskError::ValidationRejected { report });
        }

        let args = JobArgs {
            selection: request.selection,
            rasters: rasters
                .iter()
                .map(|path| path.to_string_lossy().into_owned())
                .collect(),
            parameters: request.parameters,
        };
        let parameters = args.parameters.clone();
        let task = self.registry.submit(&cm.name, args).await?;
        if let Err(err) = self.store.write_json(&task, PARAMETERS_FILE, &parameters) {
            self.registry
                .abandon(task.task_id(), &format!("failed to store parameters: {err}"))
                .await;
            return Err(err.into());
        }
        Ok(task)
    }

    /// Rasters of a layer a selection may touch.
    ///
    /// A dataset layer with a `geometries.json` sidecar contributes the
    /// rasters whose footprint overlaps the selection; otherwise every
    /// `.tif`/`.tiff` file of the layer directory is used.
    ///
    /// # Errors
    ///
    /// [`TaskError::LayerNotFound`] when the layer directory is missing or
    /// holds no raster at all, [`TaskError::StorageFault`] when the sidecar
    /// names a file outside the layer directory.
    pub fn resolve_rasters(
        &self,
        layer: &LayerRef,
        selection: &Selection,
    ) -> Result<Vec<PathBuf>, TaskError> {
        let not_found = || TaskError::LayerNotFound {
            layer: layer.to_string(),
        };
        if !self.store.exists(layer) {
            return Err(not_found());
        }

        if let LayerRef::Dataset(name) = layer {
            if let Some(footprints) = self.store.read_footprints(name)? {
                if footprints.is_empty() {
                    return Err(not_found());
                }
                let selected = select_rasters(&footprints, selection);
                tracing::debug!(layer = %layer, selected = selected.len(), total = footprints.len(), "filtered rasters by footprint");
                return selected
                    .into_iter()
                    .map(|file| self.store.file_path_for(name, &file).map_err(TaskError::from))
                    .collect();
            }
        }

        let rasters: Vec<PathBuf> = self
            .store
            .list_files(layer)?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(is_raster_filename)
            })
            .collect();
        if rasters.is_empty() {
            return Err(not_found());
        }
        Ok(rasters)
    }

    /// Status and result of a task.
    pub async fn task(&self, cm_name: &str, task_id: &str) -> Result<TaskView, TaskError> {
        let task = TaskLayer::new(cm_name, task_id)?;
        self.registry.view(&task).await
    }

    /// Cancels a task; finished tasks are returned unchanged.
    pub async fn cancel_task(&self, cm_name: &str, task_id: &str) -> Result<TaskView, TaskError> {
        let task = TaskLayer::new(cm_name, task_id)?;
        self.registry.revoke(&task).await
    }

    /// Stores one uploaded input file of a task.
    pub fn stage_upload(
        &self,
        cm_name: &str,
        task_id: &str,
        raw_filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, TaskError> {
        let task = TaskLayer::new(cm_name, task_id)?;
        Ok(UploadIngestor::new(&self.store, self.geo.as_ref()).ingest(
            &task,
            raw_filename,
            content,
        )?)
    }

    /// Archive of every artifact of a task.
    pub fn download(&self, cm_name: &str, task_id: &str) -> Result<Archive, TaskError> {
        let task = TaskLayer::new(cm_name, task_id)?;
        Ok(ArchiveAssembler::new(&self.store).build(&task)?)
    }

    /// Whether a task has artifacts, without building the archive.
    pub fn probe(&self, cm_name: &str, task_id: &str) -> Result<(), TaskError> {
        let task = TaskLayer::new(cm_name, task_id)?;
        if ArchiveAssembler::new(&self.store).exists(&task) {
            Ok(())
        } else {
            Err(TaskError::NotFound {
                task_id: task.to_string(),
            })
        }
    }

    /// Legend stored for a successful task, if its result carried one.
    pub fn legend(&self, cm_name: &str, task_id: &str) -> Result<Option<Value>, TaskError> {
        let task = TaskLayer::new(cm_name, task_id)?;
        Ok(self.store.read_legend(&task)?)
    }
}
