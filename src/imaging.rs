//! Discovery of the image series and segmentation files of a patient folder.
use std::io::ErrorKind;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use dicom::dictionary_std::tags;
use dicom::object::{DefaultDicomObject, InMemDicomObject};
use walkdir::WalkDir;

use crate::data_model::{ImagePayload, ImageRecord, SegmentationKind, SegmentationRecord};
use crate::dicom_header::{items, tts, DicomHeader};
use crate::error::CurationError;

/// Reads what a patient folder contains. Enumeration order must be deterministic.
///
/// [ImagingSource::discover] is what a patient is read with. Implementations
/// which can only find images and segmentations in the same pass over the
/// folder should override it, since calling the other two methods in turn
/// reads the folder twice.
pub trait ImagingSource {
    fn discover_images(&self, folder: &Utf8Path) -> Result<Vec<ImageRecord>, CurationError>;

    fn discover_segmentations(
        &self,
        folder: &Utf8Path,
    ) -> Result<Vec<SegmentationRecord>, CurationError>;

    /// Discover both images and segmentations.
    fn discover(
        &self,
        folder: &Utf8Path,
    ) -> Result<(Vec<ImageRecord>, Vec<SegmentationRecord>), CurationError> {
        Ok((
            self.discover_images(folder)?,
            self.discover_segmentations(folder)?,
        ))
    }
}

/// Reads every DICOM file under a folder, recursively.
///
/// [ImagingSource::discover] reads the folder once. `discover_images` and
/// `discover_segmentations` each open and decode every file.
///
/// Files of a `SEG` or `RTSTRUCT` modality are segmentations, everything else is
/// grouped into image series by SeriesInstanceUID, in the order series are first
/// seen. Files are visited in sorted path order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomFolderReader;

impl DicomFolderReader {
    fn read_folder(
        &self,
        folder: &Utf8Path,
    ) -> Result<(Vec<ImageRecord>, Vec<SegmentationRecord>), CurationError> {
        if !folder.is_dir() {
            return Err(CurationError::PatientFolder {
                path: folder.to_path_buf(),
            });
        }
        let files = list_files(folder)?;

        let mut images: Vec<ImageRecord> = Vec::new();
        let mut segmentations = Vec::new();
        for path in files {
            let dcm = match dicom::object::open_file(&path) {
                Ok(dcm) => dcm,
                Err(e) => {
                    tracing::debug!(event = "skip", path = path.as_str(), error = e.to_string());
                    continue;
                }
            };
            let modality = tts(&dcm, tags::MODALITY);
            if let Some(kind) = modality.as_deref().and_then(SegmentationKind::from_modality) {
                segmentations.push(segmentation_record(kind, dcm.into_inner(), path));
                continue;
            }
            let header = match DicomHeader::new(&dcm) {
                Ok(header) => header,
                Err(e) => {
                    tracing::warn!(event = "skip", path = path.as_str(), error = e.to_string());
                    continue;
                }
            };
            add_instance(&mut images, header, dcm, path);
        }
        Ok((images, segmentations))
    }
}

impl ImagingSource for DicomFolderReader {
    fn discover_images(&self, folder: &Utf8Path) -> Result<Vec<ImageRecord>, CurationError> {
        self.read_folder(folder).map(|(images, _)| images)
    }

    fn discover_segmentations(
        &self,
        folder: &Utf8Path,
    ) -> Result<Vec<SegmentationRecord>, CurationError> {
        self.read_folder(folder).map(|(_, segmentations)| segmentations)
    }

    fn discover(
        &self,
        folder: &Utf8Path,
    ) -> Result<(Vec<ImageRecord>, Vec<SegmentationRecord>), CurationError> {
        self.read_folder(folder)
    }
}

/// Append the instance to the series it belongs to, creating the series if needed.
fn add_instance(
    images: &mut Vec<ImageRecord>,
    header: DicomHeader,
    dcm: DefaultDicomObject,
    path: Utf8PathBuf,
) {
    if let Some(image) = images
        .iter_mut()
        .find(|i| i.header.SeriesInstanceUID == header.SeriesInstanceUID)
    {
        image.payload.instances.push(dcm);
        image.paths.push(path);
    } else {
        images.push(ImageRecord {
            header,
            payload: ImagePayload {
                instances: vec![dcm],
            },
            paths: vec![path],
        });
    }
}

fn segmentation_record(
    kind: SegmentationKind,
    dcm: InMemDicomObject,
    path: Utf8PathBuf,
) -> SegmentationRecord {
    let label = tts(&dcm, tags::SERIES_DESCRIPTION)
        .or_else(|| path.file_stem().map(|s| s.to_string()))
        .unwrap_or_else(|| kind.name().to_string());
    SegmentationRecord {
        kind,
        label,
        referenced_series: referenced_series(kind, &dcm),
        roi_names: roi_names(kind, &dcm),
        path,
        object: dcm,
    }
}

/// SeriesInstanceUIDs of the image series a segmentation was drawn on.
fn referenced_series(kind: SegmentationKind, dcm: &InMemDicomObject) -> Vec<String> {
    let mut uids: Vec<String> = match kind {
        SegmentationKind::DicomSeg => items(dcm, tags::REFERENCED_SERIES_SEQUENCE)
            .iter()
            .filter_map(|series| tts(series, tags::SERIES_INSTANCE_UID))
            .collect(),
        SegmentationKind::RtStruct => items(dcm, tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE)
            .iter()
            .flat_map(|frame| items(frame, tags::RT_REFERENCED_STUDY_SEQUENCE))
            .flat_map(|study| items(study, tags::RT_REFERENCED_SERIES_SEQUENCE))
            .filter_map(|series| tts(series, tags::SERIES_INSTANCE_UID))
            .collect(),
    };
    uids.dedup();
    uids
}

fn roi_names(kind: SegmentationKind, dcm: &InMemDicomObject) -> Vec<String> {
    let (sequence, name) = match kind {
        SegmentationKind::DicomSeg => (tags::SEGMENT_SEQUENCE, tags::SEGMENT_LABEL),
        SegmentationKind::RtStruct => (tags::STRUCTURE_SET_ROI_SEQUENCE, tags::ROI_NAME),
    };
    items(dcm, sequence)
        .iter()
        .filter_map(|item| tts(item, name))
        .collect()
}

/// Recursively list the files under `dir`, sorted by name at each level.
fn list_files(dir: &Utf8Path) -> std::io::Result<Vec<Utf8PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        files.push(utf8(entry.into_path())?);
    }
    Ok(files)
}

pub(crate) fn utf8(path: PathBuf) -> std::io::Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path).map_err(|p| {
        std::io::Error::new(
            ErrorKind::InvalidData,
            format!("path is not valid UTF-8: {}", p.display()),
        )
    })
}
