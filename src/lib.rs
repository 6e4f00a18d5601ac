//! Curation of multi-patient DICOM datasets.
//!
//! A dataset is a folder with one subfolder per patient. [PatientsDataGenerator]
//! visits those subfolders one at a time and, for each, selects the image series
//! named by a [SeriesDescriptionRegistry] (or every series when there is none),
//! attaches the segmentations drawn on them, and hands out a [PatientRecord].
mod config;
mod data_model;
mod dicom_header;
mod error;
mod imaging;
mod patient_resolver;
mod patients_data_generator;
mod query_strategy;
mod run_from_env;
mod sanitize;
mod series_descriptions;
mod settings;
mod transforms;
mod types;

pub use config::get_config;
pub use data_model::{
    ImagePayload, ImageRecord, PatientImage, PatientRecord, SegmentationKind, SegmentationRecord,
};
pub use dicom_header::DicomHeader;
pub use error::{CurationError, MissingRequiredTag, OverlappingSeriesDescriptions, RegistryDocumentError};
pub use imaging::{DicomFolderReader, ImagingSource};
pub use patient_resolver::{PatientResolver, Resolution};
pub use patients_data_generator::{GeneratorState, PatientWhoFailed, PatientsDataGenerator};
pub use query_strategy::{QueryResult, QueryStrategy, UnmatchedImage};
pub use run_from_env::{run, run_from_env};
pub use series_descriptions::{SeriesDescriptionRegistry, SeriesDescriptionSource, SeriesDescriptions};
pub use settings::CuratorEnvOptions;
pub use transforms::ImageTransform;
pub use types::{ImageKey, ImageKeyRef};
