//! Curator settings, which are configurable using environment variables.
use camino::Utf8PathBuf;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CuratorEnvOptions {
    /// Folder containing one subfolder per patient.
    pub patients_folder: Utf8PathBuf,
    /// Registry document to load, then save again after every patient.
    #[serde(default)]
    pub series_descriptions: Option<Utf8PathBuf>,
    /// Where to save the registry after every patient.
    #[serde(default)]
    pub persist_registry: Option<Utf8PathBuf>,
    #[serde(default)]
    pub erase_unused_dicom_files: bool,
    /// Where to write the patients who failed, as JSON, at the end of the run.
    #[serde(default)]
    pub failures_report: Option<Utf8PathBuf>,
}
