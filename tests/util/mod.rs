pub mod dicom_files;
pub mod helpers;
