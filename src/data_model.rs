//! The structures produced while resolving a patient folder.
use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use dicom::object::{DefaultDicomObject, InMemDicomObject};
use serde::Serialize;

use crate::dicom_header::DicomHeader;
use crate::types::{ImageKey, ImageKeyRef};

/// The decoded image data of a series. Its content is not interpreted here,
/// only carried through to transforms and to the caller.
#[derive(Debug, Clone, Default)]
pub struct ImagePayload {
    pub instances: Vec<DefaultDicomObject>,
}

impl ImagePayload {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// One image series found in a patient folder.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub header: DicomHeader,
    pub payload: ImagePayload,
    /// Files the series was read from.
    pub paths: Vec<Utf8PathBuf>,
}

impl ImageRecord {
    pub fn series_name(&self) -> &str {
        self.header.series_name()
    }
}

/// Supported kinds of segmentation files, identified by their DICOM Modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SegmentationKind {
    DicomSeg,
    RtStruct,
}

impl SegmentationKind {
    pub const ALL: [SegmentationKind; 2] = [SegmentationKind::DicomSeg, SegmentationKind::RtStruct];

    pub fn modality(&self) -> &'static str {
        match self {
            SegmentationKind::DicomSeg => "SEG",
            SegmentationKind::RtStruct => "RTSTRUCT",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SegmentationKind::DicomSeg => "dicom_seg",
            SegmentationKind::RtStruct => "rt_struct",
        }
    }

    pub fn from_modality(modality: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.modality() == modality)
    }

    /// Modalities which are read as segmentations rather than images.
    pub fn available_modalities() -> Vec<&'static str> {
        Self::ALL.iter().map(SegmentationKind::modality).collect()
    }
}

/// A segmentation file and the series it annotates.
#[derive(Debug, Clone)]
pub struct SegmentationRecord {
    pub kind: SegmentationKind,
    pub label: String,
    /// SeriesInstanceUIDs of the image series this segmentation was drawn on.
    pub referenced_series: Vec<String>,
    /// Names of the segmented structures.
    pub roi_names: Vec<String>,
    pub path: Utf8PathBuf,
    /// The segmentation's dataset, for reading its masks or contours.
    pub object: InMemDicomObject,
}

impl SegmentationRecord {
    pub fn references(&self, image: &ImageRecord) -> bool {
        self.referenced_series
            .iter()
            .any(|uid| *uid == image.header.SeriesInstanceUID)
    }
}

/// An image selected for a patient, with the segmentations drawn on it.
#[derive(Debug, Clone)]
pub struct PatientImage {
    pub key: ImageKey,
    pub image: ImageRecord,
    pub segmentations: Vec<SegmentationRecord>,
}

/// Everything kept for one patient.
#[derive(Debug, Clone)]
pub struct PatientRecord {
    pub patient_id: String,
    pub data: Vec<PatientImage>,
}

impl PatientRecord {
    pub fn get(&self, key: &ImageKeyRef) -> Option<&PatientImage> {
        self.data.iter().find(|d| d.key.as_str() == key.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &ImageKey> {
        self.data.iter().map(|d| &d.key)
    }

    /// Paths of every file the record was built from.
    pub fn source_paths(&self) -> HashSet<&Utf8Path> {
        self.data
            .iter()
            .flat_map(|d| {
                d.image
                    .paths
                    .iter()
                    .map(|p| p.as_path())
                    .chain(d.segmentations.iter().map(|s| s.path.as_path()))
            })
            .collect()
    }
}
