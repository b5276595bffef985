//! Client for the dashboard packaging service.
//!
//! The service takes the uploaded value/volume data plus a project name and
//! answers with a zip archive. Everything beyond that exchange lives on the
//! other side of the wire.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use thiserror::Error;

use crate::data::model::{DataType, Dataset};

pub const VALUE_FILE_FIELD: &str = "valueFile";
pub const VOLUME_FILE_FIELD: &str = "volumeFile";
pub const PROJECT_NAME_FIELD: &str = "projectName";
const GENERATE_PATH: &str = "/api/generate-dashboard";
const DEFAULT_FAILURE: &str = "Failed to generate dashboard";

#[derive(Debug, Error)]
pub enum ExportError {
    /// The service answered with a non-success status.
    #[error("{message}")]
    Service { status: u16, message: String },
    #[error("packaging request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("writing archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoding upload payload: {0}")]
    Encode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Request payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn read(path: &Path) -> Result<Self, ExportError> {
        let bytes = std::fs::read(path).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(UploadFile { file_name, bytes })
    }
}

/// What the packaging service expects in one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    pub value_file: Option<UploadFile>,
    pub volume_file: Option<UploadFile>,
    pub project_name: String,
}

impl PackageRequest {
    /// Generate the upload from an in-memory dataset: one JSON document per
    /// data type, each carrying the shared dimensions and metadata. The
    /// volume file is omitted when the dataset has no volume records.
    pub fn from_dataset(dataset: &Dataset, project_name: &str) -> Result<Self, ExportError> {
        let document = |data_type: DataType| -> Result<UploadFile, ExportError> {
            let mut single = Dataset {
                dimensions: dataset.dimensions.clone(),
                metadata: dataset.metadata.clone(),
                ..Dataset::default()
            };
            let matrix = dataset.matrix(data_type).to_vec();
            match data_type {
                DataType::Value => single.data.value.geography_segment_matrix = matrix,
                DataType::Volume => single.data.volume.geography_segment_matrix = matrix,
            }
            Ok(UploadFile {
                file_name: format!("{project_name}_{data_type}.json"),
                bytes: serde_json::to_vec_pretty(&single)?,
            })
        };

        let volume_file = if dataset.matrix(DataType::Volume).is_empty() {
            None
        } else {
            Some(document(DataType::Volume)?)
        };

        Ok(PackageRequest {
            value_file: Some(document(DataType::Value)?),
            volume_file,
            project_name: project_name.to_string(),
        })
    }

    /// Name the downloaded archive is saved under.
    pub fn archive_file_name(&self) -> String {
        format!("{}.zip", self.project_name)
    }

    fn to_form(&self) -> Form {
        let mut form = Form::new();
        if let Some(value) = &self.value_file {
            form = form.part(
                VALUE_FILE_FIELD,
                Part::bytes(value.bytes.clone()).file_name(value.file_name.clone()),
            );
        }
        if let Some(volume) = &self.volume_file {
            form = form.part(
                VOLUME_FILE_FIELD,
                Part::bytes(volume.bytes.clone()).file_name(volume.file_name.clone()),
            );
        }
        form.text(PROJECT_NAME_FIELD, self.project_name.clone())
    }
}

// ---------------------------------------------------------------------------
// Service error body
// ---------------------------------------------------------------------------

/// Structured error body of a failed request. Both fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

impl ServiceErrorBody {
    /// Lenient parse: an unreadable body is an empty one.
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// Most specific human-readable message available.
    pub fn message(&self) -> String {
        self.details
            .as_deref()
            .or(self.error.as_deref())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_FAILURE)
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Packager
// ---------------------------------------------------------------------------

/// Anything that can turn a [`PackageRequest`] into archive bytes.
pub trait Packager {
    fn generate(&self, request: &PackageRequest) -> Result<Vec<u8>, ExportError>;
}

/// Packager talking to the HTTP packaging service.
pub struct HttpPackager {
    client: HttpClient,
    base_url: String,
}

impl HttpPackager {
    pub fn new(base_url: &str) -> Result<Self, ExportError> {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}{GENERATE_PATH}", self.base_url)
    }
}

impl Packager for HttpPackager {
    fn generate(&self, request: &PackageRequest) -> Result<Vec<u8>, ExportError> {
        let response = self
            .client
            .post(self.endpoint())
            .multipart(request.to_form())
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().map(|b| b.to_vec()).unwrap_or_default();
            let message = ServiceErrorBody::parse(&body).message();
            log::error!("Error generating dashboard ({status}): {message}");
            return Err(ExportError::Service {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.bytes()?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Download control
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadStatus {
    #[default]
    Idle,
    Generating,
    Success,
}

/// The "download package" control: runs one packaging exchange at a time
/// and always lands back in a state from which the action can be retried.
#[derive(Debug, Default)]
pub struct DownloadButton {
    pub status: DownloadStatus,
    /// Dismissable failure message from the last attempt.
    pub message: Option<String>,
}

impl DownloadButton {
    pub fn is_busy(&self) -> bool {
        self.status == DownloadStatus::Generating
    }

    pub fn dismiss(&mut self) {
        self.message = None;
    }

    /// Clear a shown success so the control reads as ready again.
    pub fn reset(&mut self) {
        if self.status == DownloadStatus::Success {
            self.status = DownloadStatus::Idle;
        }
    }

    /// Generate the package and save it as `<project>.zip` in `out_dir`.
    ///
    /// Returns `Ok(None)` without contacting the service when there is no
    /// value file to upload or another download is still running.
    pub fn download(
        &mut self,
        packager: &dyn Packager,
        request: &PackageRequest,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>, ExportError> {
        if request.value_file.is_none() || self.is_busy() {
            return Ok(None);
        }

        self.status = DownloadStatus::Generating;
        self.message = None;

        let result = packager.generate(request).and_then(|archive| {
            let path = out_dir.join(request.archive_file_name());
            std::fs::write(&path, archive).map_err(|source| ExportError::Io {
                path: path.clone(),
                source,
            })?;
            Ok(path)
        });

        match result {
            Ok(path) => {
                log::info!("Saved dashboard package to {}", path.display());
                self.status = DownloadStatus::Success;
                Ok(Some(path))
            }
            Err(err) => {
                self.status = DownloadStatus::Idle;
                self.message = Some(err.to_string());
                Err(err)
            }
        }
    }
}
