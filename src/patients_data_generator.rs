//! Iteration over every patient folder of a dataset.
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::data_model::PatientRecord;
use crate::error::{CurationError, RegistryDocumentError};
use crate::imaging::{utf8, DicomFolderReader, ImagingSource};
use crate::patient_resolver::{PatientResolver, Resolution};
use crate::series_descriptions::{
    SeriesDescriptionRegistry, SeriesDescriptionSource, SeriesDescriptions,
};
use crate::transforms::ImageTransform;

/// A patient with one or more requested images missing from its folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientWhoFailed {
    pub id: String,
    /// The missing image keys, with the series names which were looked for.
    pub failed_images: SeriesDescriptions,
    pub available_series_descriptions: Vec<String>,
}

/// Where a [PatientsDataGenerator] is in its single pass over the patients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Nothing produced yet.
    Idle,
    /// Some patients produced, some left.
    Active,
    /// No patient left. The next resumption signals the end of the sequence.
    Exhausted,
    /// The end was signalled. Resuming again is an error.
    Terminated,
}

/// Produces the [PatientRecord] of each patient folder, one per resumption.
///
/// The pass is lazy and cannot be restarted. A patient is completely processed,
/// including file deletion and registry persistence, before its record is
/// returned. An error aborts the pass: the following resumption signals the end.
pub struct PatientsDataGenerator<S: ImagingSource = DicomFolderReader> {
    source: S,
    paths_to_patients_folders: Vec<Utf8PathBuf>,
    series_descriptions: SeriesDescriptionRegistry,
    /// Whether the registry was unset at construction, in which case it is grown
    /// from the series found in the patient folders.
    grow_series_descriptions: bool,
    path_to_series_description_json: Option<Utf8PathBuf>,
    transforms: Vec<Box<dyn ImageTransform>>,
    erase_unused_dicom_files: bool,
    current_index: usize,
    state: GeneratorState,
    patients_who_failed: Vec<PatientWhoFailed>,
}

impl PatientsDataGenerator<DicomFolderReader> {
    /// Iterate over the subfolders of `path_to_patients_folder`, reading them
    /// with a [DicomFolderReader].
    pub fn new<P: AsRef<Utf8Path>>(
        path_to_patients_folder: P,
        series_descriptions: impl Into<SeriesDescriptionSource>,
        transforms: Vec<Box<dyn ImageTransform>>,
        erase_unused_dicom_files: bool,
    ) -> Result<Self, CurationError> {
        Self::with_source(
            DicomFolderReader,
            path_to_patients_folder,
            series_descriptions,
            transforms,
            erase_unused_dicom_files,
        )
    }
}

impl<S: ImagingSource> PatientsDataGenerator<S> {
    pub fn with_source<P: AsRef<Utf8Path>>(
        source: S,
        path_to_patients_folder: P,
        series_descriptions: impl Into<SeriesDescriptionSource>,
        transforms: Vec<Box<dyn ImageTransform>>,
        erase_unused_dicom_files: bool,
    ) -> Result<Self, CurationError> {
        let (series_descriptions, grow_series_descriptions, path_to_series_description_json) =
            match series_descriptions.into() {
                SeriesDescriptionSource::Unset => (SeriesDescriptionRegistry::new(), true, None),
                SeriesDescriptionSource::Registry(registry) => (registry, false, None),
                SeriesDescriptionSource::Path(path) => {
                    (SeriesDescriptionRegistry::load(&path)?, false, Some(path))
                }
            };
        let paths_to_patients_folders = list_patients_folders(path_to_patients_folder.as_ref())?;
        tracing::info!(
            event = "start",
            total = paths_to_patients_folders.len(),
            "Downloading all patients"
        );
        Ok(Self {
            source,
            paths_to_patients_folders,
            series_descriptions,
            grow_series_descriptions,
            path_to_series_description_json,
            transforms,
            erase_unused_dicom_files,
            current_index: 0,
            state: GeneratorState::Idle,
            patients_who_failed: Vec::new(),
        })
    }

    /// Also save the registry to `path` after every patient.
    pub fn persist_series_descriptions_to(mut self, path: Utf8PathBuf) -> Self {
        self.path_to_series_description_json = Some(path);
        self
    }

    /// Total number of patients.
    pub fn len(&self) -> usize {
        self.paths_to_patients_folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths_to_patients_folders.is_empty()
    }

    pub fn paths_to_patients_folders(&self) -> &[Utf8PathBuf] {
        &self.paths_to_patients_folders
    }

    pub fn series_descriptions(&self) -> &SeriesDescriptionRegistry {
        &self.series_descriptions
    }

    pub fn path_to_series_description_json(&self) -> Option<&Utf8Path> {
        self.path_to_series_description_json.as_deref()
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    /// Patients with one or more images which could not be found, so far.
    pub fn patients_who_failed(&self) -> &[PatientWhoFailed] {
        &self.patients_who_failed
    }

    pub fn into_patients_who_failed(self) -> Vec<PatientWhoFailed> {
        self.patients_who_failed
    }

    pub fn save_series_descriptions_to_json<P: AsRef<Utf8Path>>(
        &self,
        path: P,
    ) -> Result<(), RegistryDocumentError> {
        self.series_descriptions.save(path)
    }

    /// Process the next patient.
    ///
    /// Returns `Ok(None)` once after the last patient, then
    /// [CurationError::ExhaustedSequence] on any later call.
    pub fn resume(&mut self) -> Result<Option<PatientRecord>, CurationError> {
        match self.state {
            GeneratorState::Terminated => return Err(CurationError::ExhaustedSequence),
            GeneratorState::Exhausted => {
                self.state = GeneratorState::Terminated;
                return Ok(None);
            }
            GeneratorState::Idle | GeneratorState::Active => {}
        }
        if self.current_index >= self.len() {
            self.state = GeneratorState::Terminated;
            return Ok(None);
        }
        match self.next_patient() {
            Ok(record) => {
                self.current_index += 1;
                self.state = if self.current_index == self.len() {
                    GeneratorState::Exhausted
                } else {
                    GeneratorState::Active
                };
                Ok(Some(record))
            }
            Err(e) => {
                self.state = GeneratorState::Exhausted;
                Err(e)
            }
        }
    }

    fn next_patient(&mut self) -> Result<PatientRecord, CurationError> {
        let folder = &self.paths_to_patients_folders[self.current_index];
        tracing::info!(
            event = "patient",
            patient = self.current_index + 1,
            folder = folder.as_str(),
            "Downloading patient"
        );
        let resolver = PatientResolver::discover(&self.source, folder)?;
        // a growing registry adopts this patient's new series before resolving,
        // so that the record keeps every series the registry now has a key for
        let snapshot = if self.grow_series_descriptions {
            let names = resolver.available_series_descriptions();
            self.series_descriptions
                .extended_with(names.iter().map(String::as_str))
        } else {
            self.series_descriptions.clone()
        };
        let Resolution {
            record,
            unmatched,
            available_series_descriptions,
            proposed_registry,
            ..
        } = resolver.resolve(snapshot, &self.transforms, self.erase_unused_dicom_files)?;

        if self.grow_series_descriptions {
            self.series_descriptions = proposed_registry;
        }
        if let Some(path) = &self.path_to_series_description_json {
            self.series_descriptions.save(path)?;
            tracing::debug!(event = "save_series_descriptions", path = path.as_str());
        }
        if !unmatched.is_empty() {
            let failed_images = unmatched
                .into_iter()
                .map(|u| {
                    let expected = self
                        .series_descriptions
                        .get(&u.key)
                        .map(<[String]>::to_vec)
                        .unwrap_or(u.expected);
                    (u.key, expected)
                })
                .collect();
            self.patients_who_failed.push(PatientWhoFailed {
                id: record.patient_id.clone(),
                failed_images,
                available_series_descriptions,
            });
        }
        Ok(record)
    }
}

impl<S: ImagingSource> Iterator for PatientsDataGenerator<S> {
    type Item = Result<PatientRecord, CurationError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.resume().transpose()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.state {
            GeneratorState::Idle | GeneratorState::Active => self.len() - self.current_index,
            GeneratorState::Exhausted | GeneratorState::Terminated => 0,
        };
        (remaining, Some(remaining))
    }
}

/// Subfolders of `path`, sorted by name.
fn list_patients_folders(path: &Utf8Path) -> Result<Vec<Utf8PathBuf>, CurationError> {
    let mut folders = Vec::new();
    let entries = WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in entries {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_dir() {
            folders.push(utf8(entry.into_path())?);
        }
    }
    Ok(folders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_model::{ImagePayload, ImageRecord, SegmentationRecord};
    use crate::dicom_header::DicomHeader;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// Serves images by folder name: `{"p1": [("P1", "CT"), ...]}`.
    struct InMemory(HashMap<&'static str, Vec<(&'static str, &'static str)>>);

    impl ImagingSource for InMemory {
        fn discover_images(&self, folder: &Utf8Path) -> Result<Vec<ImageRecord>, CurationError> {
            let name = folder.file_name().unwrap();
            let series = self.0.get(name).cloned().unwrap_or_default();
            Ok(series
                .into_iter()
                .enumerate()
                .map(|(i, (patient_id, description))| ImageRecord {
                    header: DicomHeader {
                        PatientID: patient_id.to_string(),
                        SeriesInstanceUID: format!("{name}.{i}"),
                        StudyInstanceUID: None,
                        Modality: None,
                        SeriesDescription: Some(description.to_string()),
                        FrameOfReferenceUID: None,
                    },
                    payload: ImagePayload::default(),
                    paths: vec![],
                })
                .collect())
        }

        fn discover_segmentations(
            &self,
            _folder: &Utf8Path,
        ) -> Result<Vec<SegmentationRecord>, CurationError> {
            Ok(vec![])
        }
    }

    struct Dataset {
        _temp_dir: tempfile::TempDir,
        root: Utf8PathBuf,
        source: InMemory,
    }

    fn dataset(patients: &[(&'static str, Vec<(&'static str, &'static str)>)]) -> Dataset {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(temp_dir.path()).unwrap().to_path_buf();
        for (folder, _) in patients {
            fs_err::create_dir(root.join(folder)).unwrap();
        }
        fs_err::write(root.join("README.txt"), "not a patient").unwrap();
        Dataset {
            _temp_dir: temp_dir,
            root,
            source: InMemory(patients.iter().cloned().collect()),
        }
    }

    #[test]
    fn test_states() {
        let Dataset {
            _temp_dir,
            root,
            source,
        } = dataset(&[
            ("p2", vec![("P2", "CT")]),
            ("p1", vec![("P1", "CT")]),
        ]);
        let mut generator = PatientsDataGenerator::with_source(
            source,
            &root,
            SeriesDescriptionSource::Unset,
            vec![],
            false,
        )
        .unwrap();
        assert_eq!(generator.len(), 2);
        assert_eq!(generator.state(), GeneratorState::Idle);
        assert_eq!(generator.size_hint(), (2, Some(2)));

        let first = generator.resume().unwrap().unwrap();
        assert_eq!(first.patient_id, "P1");
        assert_eq!(generator.state(), GeneratorState::Active);
        let second = generator.resume().unwrap().unwrap();
        assert_eq!(second.patient_id, "P2");
        assert_eq!(generator.state(), GeneratorState::Exhausted);

        assert!(generator.resume().unwrap().is_none());
        assert_eq!(generator.state(), GeneratorState::Terminated);
        assert!(matches!(
            generator.resume(),
            Err(CurationError::ExhaustedSequence)
        ));
        assert!(matches!(
            generator.next(),
            Some(Err(CurationError::ExhaustedSequence))
        ));
    }

    #[test]
    fn test_no_patients() {
        let Dataset {
            _temp_dir,
            root,
            source,
        } = dataset(&[]);
        let mut generator =
            PatientsDataGenerator::with_source(source, &root, SeriesDescriptionSource::Unset, vec![], false)
                .unwrap();
        assert!(generator.is_empty());
        assert!(generator.next().is_none());
        assert!(matches!(
            generator.next(),
            Some(Err(CurationError::ExhaustedSequence))
        ));
    }

    #[test]
    fn test_unset_registry_grows() {
        let Dataset {
            _temp_dir,
            root,
            source,
        } = dataset(&[
            ("p1", vec![("P1", "A"), ("P1", "B")]),
            ("p2", vec![("P2", "B"), ("P2", "C")]),
            ("p3", vec![("P3", "A")]),
        ]);
        let mut generator =
            PatientsDataGenerator::with_source(source, &root, SeriesDescriptionSource::Unset, vec![], false)
                .unwrap();
        let keys = |g: &PatientsDataGenerator<InMemory>| -> Vec<String> {
            g.series_descriptions()
                .series_descriptions()
                .keys()
                .map(|k| k.to_string())
                .collect()
        };

        let p1 = generator.resume().unwrap().unwrap();
        assert_eq!(p1.keys().map(|k| k.as_str()).collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(keys(&generator), vec!["A", "B"]);
        assert!(generator.patients_who_failed().is_empty());

        let p2 = generator.resume().unwrap().unwrap();
        assert_eq!(p2.keys().map(|k| k.as_str()).collect::<Vec<_>>(), vec!["B", "C"]);
        assert_eq!(keys(&generator), vec!["A", "B", "C"]);

        generator.resume().unwrap().unwrap();
        assert_eq!(keys(&generator), vec!["A", "B", "C"]);

        let expected = vec![
            PatientWhoFailed {
                id: "P2".to_string(),
                failed_images: [("A", vec!["A"])].into_iter().collect(),
                available_series_descriptions: vec!["B".to_string(), "C".to_string()],
            },
            PatientWhoFailed {
                id: "P3".to_string(),
                failed_images: [("B", vec!["B"]), ("C", vec!["C"])].into_iter().collect(),
                available_series_descriptions: vec!["A".to_string()],
            },
        ];
        assert_eq!(generator.patients_who_failed(), expected.as_slice());
    }

    #[test]
    fn test_given_registry_is_not_replaced() {
        let Dataset {
            _temp_dir,
            root,
            source,
        } = dataset(&[("p1", vec![("P1", "CT_AX"), ("P1", "T2")])]);
        let registry: SeriesDescriptionRegistry = [("image", vec!["CT_AX"])]
            .into_iter()
            .collect::<SeriesDescriptions>()
            .try_into()
            .unwrap();
        let mut generator =
            PatientsDataGenerator::with_source(source, &root, registry.clone(), vec![], false)
                .unwrap();
        let record = generator.resume().unwrap().unwrap();
        assert_eq!(record.keys().map(|k| k.as_str()).collect::<Vec<_>>(), vec!["image"]);
        assert_eq!(generator.series_descriptions(), &registry);
    }

    #[test]
    fn test_empty_registry_takes_everything() {
        let Dataset {
            _temp_dir,
            root,
            source,
        } = dataset(&[("p1", vec![("P1", "A"), ("P1", "B")])]);
        let mut generator = PatientsDataGenerator::with_source(
            source,
            &root,
            SeriesDescriptionRegistry::new(),
            vec![],
            false,
        )
        .unwrap();
        let record = generator.resume().unwrap().unwrap();
        assert_eq!(record.keys().map(|k| k.as_str()).collect::<Vec<_>>(), vec!["A", "B"]);
        assert!(generator.series_descriptions().is_empty());
        assert!(generator.patients_who_failed().is_empty());
    }

    #[test]
    fn test_error_aborts_the_pass() {
        let Dataset {
            _temp_dir,
            root,
            source,
        } = dataset(&[("p1", vec![]), ("p2", vec![("P2", "CT")])]);
        let mut generator =
            PatientsDataGenerator::with_source(source, &root, SeriesDescriptionSource::Unset, vec![], false)
                .unwrap();
        assert!(matches!(
            generator.resume(),
            Err(CurationError::PatientFolder { .. })
        ));
        assert_eq!(generator.state(), GeneratorState::Exhausted);
        assert!(generator.resume().unwrap().is_none());
        assert!(matches!(
            generator.resume(),
            Err(CurationError::ExhaustedSequence)
        ));
    }

    #[test]
    fn test_missing_registry_document() {
        let Dataset {
            _temp_dir,
            root,
            source,
        } = dataset(&[("p1", vec![("P1", "CT")])]);
        let result = PatientsDataGenerator::with_source(
            source,
            &root,
            root.join("series_descriptions.json"),
            vec![],
            false,
        );
        assert!(matches!(
            result,
            Err(CurationError::RegistryDocument(RegistryDocumentError::NotFound(_)))
        ));
    }
}
