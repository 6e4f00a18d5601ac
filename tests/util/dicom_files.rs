//! Synthetic DICOM files.
use camino::{Utf8Path, Utf8PathBuf};
use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, VR};
use dicom::dictionary_std::{tags, uids};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};

/// An image series to write into a patient folder.
pub(crate) struct Series<'a> {
    pub patient_id: &'a str,
    pub series_instance_uid: &'a str,
    pub series_description: &'a str,
    pub modality: &'a str,
    pub instances: usize,
}

/// Write the instances of `series` as `{folder}/{series_description}/{n}.dcm`.
///
/// An empty description is left out of the files, which are then written under
/// the SeriesInstanceUID.
pub(crate) fn write_series(folder: &Utf8Path, series: &Series) -> Vec<Utf8PathBuf> {
    let dir = if series.series_description.is_empty() {
        folder.join(series.series_instance_uid)
    } else {
        folder.join(series.series_description)
    };
    fs_err::create_dir_all(&dir).unwrap();
    (0..series.instances)
        .map(|n| {
            let sop_instance_uid = format!("{}.{}", series.series_instance_uid, n + 1);
            let mut dcm = InMemDicomObject::from_element_iter([
                DataElement::new(tags::SOP_CLASS_UID, VR::UI, uids::CT_IMAGE_STORAGE),
                DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, sop_instance_uid.as_str()),
                DataElement::new(tags::PATIENT_ID, VR::LO, series.patient_id),
                DataElement::new(tags::STUDY_INSTANCE_UID, VR::UI, "2.25.1"),
                DataElement::new(
                    tags::SERIES_INSTANCE_UID,
                    VR::UI,
                    series.series_instance_uid,
                ),
                DataElement::new(tags::MODALITY, VR::CS, series.modality),
                DataElement::new(tags::INSTANCE_NUMBER, VR::IS, (n + 1).to_string().as_str()),
            ]);
            if !series.series_description.is_empty() {
                dcm.put(DataElement::new(
                    tags::SERIES_DESCRIPTION,
                    VR::LO,
                    series.series_description,
                ));
            }
            let path = dir.join(format!("{}.dcm", n + 1));
            write(dcm, uids::CT_IMAGE_STORAGE, &sop_instance_uid, &path);
            path
        })
        .collect()
}

/// Write a DICOM-SEG object drawn on `referenced_series`.
pub(crate) fn write_seg(
    path: &Utf8Path,
    patient_id: &str,
    label: &str,
    referenced_series: &str,
    segments: &[&str],
) {
    let referenced = InMemDicomObject::from_element_iter([DataElement::new(
        tags::SERIES_INSTANCE_UID,
        VR::UI,
        referenced_series,
    )]);
    let segment_items: Vec<InMemDicomObject> = segments
        .iter()
        .map(|name| {
            InMemDicomObject::from_element_iter([DataElement::new(
                tags::SEGMENT_LABEL,
                VR::LO,
                *name,
            )])
        })
        .collect();
    let sop_instance_uid = "2.25.900.1";
    let dcm = InMemDicomObject::from_element_iter([
        DataElement::new(tags::SOP_CLASS_UID, VR::UI, uids::SEGMENTATION_STORAGE),
        DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, sop_instance_uid),
        DataElement::new(tags::PATIENT_ID, VR::LO, patient_id),
        DataElement::new(tags::SERIES_INSTANCE_UID, VR::UI, "2.25.900"),
        DataElement::new(tags::SERIES_DESCRIPTION, VR::LO, label),
        DataElement::new(tags::MODALITY, VR::CS, "SEG"),
        DataElement::new(
            tags::REFERENCED_SERIES_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![referenced]),
        ),
        DataElement::new(
            tags::SEGMENT_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(segment_items),
        ),
    ]);
    write(dcm, uids::SEGMENTATION_STORAGE, sop_instance_uid, path);
}

/// Write an RTSTRUCT object drawn on `referenced_series`.
pub(crate) fn write_rtstruct(
    path: &Utf8Path,
    patient_id: &str,
    label: &str,
    referenced_series: &str,
    rois: &[&str],
) {
    let series = InMemDicomObject::from_element_iter([DataElement::new(
        tags::SERIES_INSTANCE_UID,
        VR::UI,
        referenced_series,
    )]);
    let study = InMemDicomObject::from_element_iter([DataElement::new(
        tags::RT_REFERENCED_SERIES_SEQUENCE,
        VR::SQ,
        DataSetSequence::from(vec![series]),
    )]);
    let frame = InMemDicomObject::from_element_iter([DataElement::new(
        tags::RT_REFERENCED_STUDY_SEQUENCE,
        VR::SQ,
        DataSetSequence::from(vec![study]),
    )]);
    let roi_items: Vec<InMemDicomObject> = rois
        .iter()
        .map(|name| {
            InMemDicomObject::from_element_iter([DataElement::new(tags::ROI_NAME, VR::LO, *name)])
        })
        .collect();
    let sop_instance_uid = "2.25.901.1";
    let dcm = InMemDicomObject::from_element_iter([
        DataElement::new(tags::SOP_CLASS_UID, VR::UI, uids::RT_STRUCTURE_SET_STORAGE),
        DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, sop_instance_uid),
        DataElement::new(tags::PATIENT_ID, VR::LO, patient_id),
        DataElement::new(tags::SERIES_INSTANCE_UID, VR::UI, "2.25.901"),
        DataElement::new(tags::SERIES_DESCRIPTION, VR::LO, label),
        DataElement::new(tags::MODALITY, VR::CS, "RTSTRUCT"),
        DataElement::new(
            tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![frame]),
        ),
        DataElement::new(
            tags::STRUCTURE_SET_ROI_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(roi_items),
        ),
    ]);
    write(dcm, uids::RT_STRUCTURE_SET_STORAGE, sop_instance_uid, path);
}

fn write(dcm: InMemDicomObject, sop_class_uid: &str, sop_instance_uid: &str, path: &Utf8Path) {
    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
        .media_storage_sop_class_uid(sop_class_uid)
        .media_storage_sop_instance_uid(sop_instance_uid);
    dcm.with_meta(meta).unwrap().write_to_file(path).unwrap();
}
