//! The policies deciding which of a patient's images and segmentations are kept.
use serde::Serialize;

use crate::data_model::{ImageRecord, PatientImage, PatientRecord, SegmentationRecord};
use crate::sanitize::sanitize;
use crate::series_descriptions::SeriesDescriptionRegistry;
use crate::types::ImageKey;

/// How a patient's data is queried, chosen from whether a registry was given and
/// whether the patient has segmentation files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryStrategy {
    /// Every available series, keyed by its own series name.
    Default,
    /// The series referenced by the segmentation files.
    Segmentation,
    /// For each image key, the first series whose name is accepted for it.
    SeriesDescription,
    /// Series description matching, plus the segmented series.
    SegmentationAndSeriesDescription,
}

/// An image key which could not be satisfied for a patient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedImage {
    pub key: ImageKey,
    /// What was looked for: the accepted series names, or the SeriesInstanceUIDs
    /// referenced by an orphan segmentation.
    pub expected: Vec<String>,
}

/// Output of [QueryStrategy::resolve].
#[derive(Debug)]
pub struct QueryResult {
    pub record: PatientRecord,
    pub unmatched: Vec<UnmatchedImage>,
    /// Images which were read but are not part of the record.
    pub unused: Vec<ImageRecord>,
}

impl QueryStrategy {
    pub fn select(registry_present: bool, segmentations_present: bool) -> Self {
        match (registry_present, segmentations_present) {
            (false, false) => QueryStrategy::Default,
            (true, false) => QueryStrategy::SeriesDescription,
            (false, true) => QueryStrategy::Segmentation,
            (true, true) => QueryStrategy::SegmentationAndSeriesDescription,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueryStrategy::Default => "Default",
            QueryStrategy::Segmentation => "Segmentation",
            QueryStrategy::SeriesDescription => "Series description",
            QueryStrategy::SegmentationAndSeriesDescription => {
                "Segmentation and series description"
            }
        }
    }

    /// Build a patient's record out of the available images and segmentations.
    pub fn resolve(
        self,
        patient_id: String,
        images: Vec<ImageRecord>,
        segmentations: Vec<SegmentationRecord>,
        requested: &SeriesDescriptionRegistry,
    ) -> QueryResult {
        let mut available: Vec<Option<ImageRecord>> = images.into_iter().map(Some).collect();
        let mut data = Vec::new();
        let mut unmatched = Vec::new();
        match self {
            QueryStrategy::Default => take_all(&mut available, &mut data),
            QueryStrategy::SeriesDescription => {
                take_series_descriptions(requested, &mut available, &mut data, &mut unmatched)
            }
            QueryStrategy::Segmentation => {
                attach_segmentations(segmentations, &mut available, &mut data, &mut unmatched)
            }
            QueryStrategy::SegmentationAndSeriesDescription => {
                take_series_descriptions(requested, &mut available, &mut data, &mut unmatched);
                attach_segmentations(segmentations, &mut available, &mut data, &mut unmatched);
            }
        }
        QueryResult {
            record: PatientRecord { patient_id, data },
            unmatched,
            unused: available.into_iter().flatten().collect(),
        }
    }
}

/// Take every image. When two series share a name, the first one wins.
fn take_all(available: &mut [Option<ImageRecord>], data: &mut Vec<PatientImage>) {
    for slot in available.iter_mut() {
        let duplicate = slot
            .as_ref()
            .is_some_and(|image| data.iter().any(|d| d.key.as_str() == image.series_name()));
        if duplicate {
            continue;
        }
        if let Some(image) = slot.take() {
            data.push(PatientImage {
                key: ImageKey::from(image.series_name()),
                image,
                segmentations: Vec::new(),
            });
        }
    }
}

/// For each requested key, take the first available image whose series name it accepts.
fn take_series_descriptions(
    requested: &SeriesDescriptionRegistry,
    available: &mut [Option<ImageRecord>],
    data: &mut Vec<PatientImage>,
    unmatched: &mut Vec<UnmatchedImage>,
) {
    for (key, series_names) in requested.series_descriptions().iter() {
        let found = available.iter_mut().find(|slot| {
            slot.as_ref()
                .is_some_and(|image| series_names.iter().any(|s| s == image.series_name()))
        });
        match found.and_then(Option::take) {
            Some(image) => data.push(PatientImage {
                key: key.clone(),
                image,
                segmentations: Vec::new(),
            }),
            None => unmatched.push(UnmatchedImage {
                key: key.clone(),
                expected: series_names.to_vec(),
            }),
        }
    }
}

/// Give each segmentation to the image it references, taking that image from
/// `available` if it is not already part of `data`. Segmentations referencing
/// none of the patient's images are reported as unmatched.
fn attach_segmentations(
    segmentations: Vec<SegmentationRecord>,
    available: &mut [Option<ImageRecord>],
    data: &mut Vec<PatientImage>,
    unmatched: &mut Vec<UnmatchedImage>,
) {
    for segmentation in segmentations {
        if let Some(entry) = data.iter_mut().find(|d| segmentation.references(&d.image)) {
            entry.segmentations.push(segmentation);
            continue;
        }
        let found = available.iter_mut().find(|slot| {
            slot.as_ref()
                .is_some_and(|image| segmentation.references(image))
        });
        match found.and_then(Option::take) {
            Some(image) => {
                let key = unique_key(data, &image);
                data.push(PatientImage {
                    key,
                    image,
                    segmentations: vec![segmentation],
                })
            }
            None => {
                let key = orphan_key(&segmentation);
                tracing::warn!(
                    event = "orphan_segmentation",
                    path = segmentation.path.as_str(),
                    referenced_series = format!("{:?}", segmentation.referenced_series),
                    "Segmentation does not reference any available image series"
                );
                if !unmatched.iter().any(|u| u.key == key) {
                    unmatched.push(UnmatchedImage {
                        key,
                        expected: segmentation.referenced_series,
                    });
                }
            }
        }
    }
}

/// The series name of the image, or its SeriesInstanceUID if the name is taken.
fn unique_key(data: &[PatientImage], image: &ImageRecord) -> ImageKey {
    let name = image.series_name();
    if data.iter().any(|d| d.key.as_str() == name) {
        ImageKey::from(image.header.SeriesInstanceUID.as_str())
    } else {
        ImageKey::from(name)
    }
}

/// Key under which a segmentation without its image series is reported.
fn orphan_key(segmentation: &SegmentationRecord) -> ImageKey {
    ImageKey::from(format!(
        "{}-{}",
        segmentation.kind.modality(),
        sanitize(&segmentation.label)
    ))
}
