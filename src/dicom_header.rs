#![allow(non_snake_case)]

use dicom::dictionary_std::tags;
use dicom::object::{InMemDicomObject, Tag};
use serde::{Deserialize, Serialize};

use crate::error::MissingRequiredTag;

/// The DICOM header fields used to identify and match a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DicomHeader {
    pub PatientID: String,
    pub SeriesInstanceUID: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub StudyInstanceUID: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub Modality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub SeriesDescription: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub FrameOfReferenceUID: Option<String>,
}

impl DicomHeader {
    pub fn new(dcm: &InMemDicomObject) -> Result<Self, MissingRequiredTag> {
        Ok(Self {
            PatientID: ttr(dcm, tags::PATIENT_ID)?,
            SeriesInstanceUID: ttr(dcm, tags::SERIES_INSTANCE_UID)?,
            StudyInstanceUID: tts(dcm, tags::STUDY_INSTANCE_UID),
            Modality: tts(dcm, tags::MODALITY),
            SeriesDescription: tts(dcm, tags::SERIES_DESCRIPTION),
            FrameOfReferenceUID: tts(dcm, tags::FRAME_OF_REFERENCE_UID),
        })
    }

    /// The name this series is matched by: its SeriesDescription, or its
    /// SeriesInstanceUID when the description is missing.
    pub fn series_name(&self) -> &str {
        self.SeriesDescription
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(self.SeriesInstanceUID.as_str())
    }
}

/// Required string tag
pub(crate) fn ttr(dcm: &InMemDicomObject, tag: Tag) -> Result<String, MissingRequiredTag> {
    tt(dcm, tag)
        .map(|s| s.to_string())
        .ok_or(MissingRequiredTag(tag))
}

/// Optional string tag
pub(crate) fn tts(dcm: &InMemDicomObject, tag: Tag) -> Option<String> {
    tt(dcm, tag).map(|s| s.to_string())
}

/// Try to get the trimmed string value of a DICOM object.
///
/// Odd-length values are padded to an even length, with `\0` for UIDs and a
/// space otherwise. Both are removed.
fn tt(dcm: &InMemDicomObject, tag: Tag) -> Option<&str> {
    dcm.element(tag)
        .ok()
        .and_then(|e| e.string().map(|s| s.trim_end_matches('\0').trim()).ok())
        .filter(|s| !s.is_empty())
}

/// The items of a sequence element, or nothing if absent.
pub(crate) fn items(dcm: &InMemDicomObject, tag: Tag) -> &[InMemDicomObject] {
    dcm.element(tag)
        .ok()
        .and_then(|e| e.items())
        .unwrap_or(&[])
}
