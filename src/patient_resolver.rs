//! Resolution of a single patient folder into a [PatientRecord].
use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};

use crate::data_model::{ImageRecord, PatientRecord, SegmentationRecord};
use crate::error::CurationError;
use crate::imaging::ImagingSource;
use crate::query_strategy::{QueryResult, QueryStrategy, UnmatchedImage};
use crate::series_descriptions::SeriesDescriptionRegistry;
use crate::transforms::{apply_transforms, ImageTransform};

/// The images and segmentations of one patient folder, ready to be resolved.
pub struct PatientResolver {
    folder: Utf8PathBuf,
    images: Vec<ImageRecord>,
    segmentations: Vec<SegmentationRecord>,
}

/// Outcome of [PatientResolver::resolve].
#[derive(Debug)]
pub struct Resolution {
    pub record: PatientRecord,
    pub strategy: QueryStrategy,
    pub unmatched: Vec<UnmatchedImage>,
    pub available_series_descriptions: Vec<String>,
    /// The registry given to the resolver, extended with the series names of this
    /// patient which no key accepted yet.
    pub proposed_registry: SeriesDescriptionRegistry,
}

impl PatientResolver {
    /// Read the folder through `source`.
    pub fn discover<S: ImagingSource + ?Sized>(
        source: &S,
        folder: &Utf8Path,
    ) -> Result<Self, CurationError> {
        let (images, segmentations) = source.discover(folder)?;
        if images.is_empty() {
            let path = folder.to_path_buf();
            return if segmentations.is_empty() {
                Err(CurationError::PatientFolder { path })
            } else {
                Err(CurationError::NoImagesFound { path })
            };
        }
        Ok(Self {
            folder: folder.to_path_buf(),
            images,
            segmentations,
        })
    }

    /// PatientID of the first image found in the folder.
    pub fn patient_id(&self) -> &str {
        self.images[0].header.PatientID.as_str()
    }

    pub fn folder(&self) -> &Utf8Path {
        &self.folder
    }

    /// Series names of every image series in the folder.
    pub fn available_series_descriptions(&self) -> Vec<String> {
        self.images
            .iter()
            .map(|image| image.series_name().to_string())
            .collect()
    }

    pub fn strategy(&self, registry: &SeriesDescriptionRegistry) -> QueryStrategy {
        QueryStrategy::select(!registry.is_empty(), !self.segmentations.is_empty())
    }

    /// Build the patient's record, apply `transforms` to it, then, if
    /// `erase_unused_dicom_files` is set, delete the files of the images which
    /// were left out.
    pub fn resolve(
        self,
        registry: SeriesDescriptionRegistry,
        transforms: &[Box<dyn ImageTransform>],
        erase_unused_dicom_files: bool,
    ) -> Result<Resolution, CurationError> {
        let strategy = self.strategy(&registry);
        tracing::debug!(
            event = "strategy",
            folder = self.folder.as_str(),
            strategy = strategy.name(),
            "Chosen patient data query strategy"
        );
        let patient_id = self.patient_id().to_string();
        let available_series_descriptions = self.available_series_descriptions();
        let proposed_registry =
            registry.extended_with(available_series_descriptions.iter().map(String::as_str));

        let QueryResult {
            mut record,
            unmatched,
            unused,
        } = strategy.resolve(patient_id, self.images, self.segmentations, &registry);

        for u in &unmatched {
            tracing::error!(
                event = "unmatched",
                patient_id = record.patient_id.as_str(),
                image = u.key.as_str(),
                expected = format!("{:?}", u.expected),
                available = format!("{available_series_descriptions:?}"),
                "Patient has no series available that correlates with the image"
            );
        }

        apply_transforms(transforms, &mut record)?;
        log_record(&record);

        if erase_unused_dicom_files {
            erase_unused(&record, &unused)?;
        }

        Ok(Resolution {
            record,
            strategy,
            unmatched,
            available_series_descriptions,
            proposed_registry,
        })
    }
}

fn log_record(record: &PatientRecord) {
    tracing::info!(
        event = "patient_record",
        patient_id = record.patient_id.as_str(),
        images = record.data.len(),
        "Images added to the patient record"
    );
    for entry in &record.data {
        let segmented: Vec<&str> = entry
            .segmentations
            .iter()
            .flat_map(|s| s.roi_names.iter().map(String::as_str))
            .collect();
        tracing::info!(
            event = "image",
            key = entry.key.as_str(),
            series_description = entry.image.series_name(),
            modality = entry.image.header.Modality.as_deref().unwrap_or(""),
            segmentation_available = !entry.segmentations.is_empty(),
            segmented_organs = format!("{segmented:?}"),
        );
    }
}

/// Delete the files of `unused` images, except those the record still refers to.
fn erase_unused(record: &PatientRecord, unused: &[ImageRecord]) -> Result<(), CurationError> {
    let kept: HashSet<&Utf8Path> = record.source_paths();
    let mut erased: HashSet<&Utf8Path> = HashSet::new();
    for path in unused.iter().flat_map(|image| image.paths.iter()) {
        if kept.contains(path.as_path()) || !erased.insert(path.as_path()) {
            continue;
        }
        fs_err::remove_file(path)?;
        tracing::warn!(event = "erase", path = path.as_str());
    }
    Ok(())
}
