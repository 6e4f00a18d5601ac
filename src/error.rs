use camino::Utf8PathBuf;
use dicom::core::{DataDictionary, Tag};
use dicom::dictionary_std::StandardDataDictionary;

use crate::types::ImageKey;

#[derive(thiserror::Error, Debug)]
pub enum CurationError {
    #[error(transparent)]
    Configuration(#[from] OverlappingSeriesDescriptions),

    #[error(transparent)]
    RegistryDocument(#[from] RegistryDocumentError),

    #[error("Patient folder \"{path}\" does not contain any readable DICOM data")]
    PatientFolder { path: Utf8PathBuf },

    #[error("No image series found in patient folder \"{path}\", only segmentations")]
    NoImagesFound { path: Utf8PathBuf },

    #[error("The patients data generator was resumed after it had already terminated")]
    ExhaustedSequence,

    #[error(transparent)]
    Transform(anyhow::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

/// Two consecutive image keys of a series descriptions mapping share series names.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error(
    "The dictionary of series descriptions should not contain the same series names for \
    different images/modalities. However, here we find the series names {previous_series:?} \
    for the {previous_key} image and {current_series:?} for the {current_key} image. \
    Clearly, the images series values are overlapping because of the series named {shared:?}."
)]
pub struct OverlappingSeriesDescriptions {
    pub previous_key: ImageKey,
    pub previous_series: Vec<String>,
    pub current_key: ImageKey,
    pub current_series: Vec<String>,
    pub shared: Vec<String>,
}

/// Error reading or writing a series descriptions JSON document.
#[derive(thiserror::Error, Debug)]
pub enum RegistryDocumentError {
    #[error("Series descriptions document not found: \"{0}\"")]
    NotFound(Utf8PathBuf),

    #[error("Malformed series descriptions document \"{path}\"")]
    Malformed {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
#[error("DICOM file does not have the required tag: \"{}\"", name_of(.0))]
pub struct MissingRequiredTag(pub Tag);

/// Get the standard name of a tag.
pub(crate) fn name_of(tag: &Tag) -> &'static str {
    StandardDataDictionary
        .by_tag(*tag)
        .map(|e| e.alias)
        .unwrap_or("UnknownTag")
}
