use camino::Utf8Path;
use serde::Serialize;

use crate::config::get_config;
use crate::patients_data_generator::{PatientWhoFailed, PatientsDataGenerator};
use crate::series_descriptions::SeriesDescriptionSource;
use crate::settings::CuratorEnvOptions;

/// Calls [run] using configuration from environment variables.
pub fn run_from_env() -> anyhow::Result<Vec<PatientWhoFailed>> {
    let options = get_config().extract()?;
    run(options)
}

/// Curates every patient of the configured folder, returning the patients who
/// failed. Stops at the first patient which cannot be processed.
pub fn run(
    CuratorEnvOptions {
        patients_folder,
        series_descriptions,
        persist_registry,
        erase_unused_dicom_files,
        failures_report,
    }: CuratorEnvOptions,
) -> anyhow::Result<Vec<PatientWhoFailed>> {
    let run_id = ulid::Ulid::new();
    let span = tracing::info_span!("curation", run_id = run_id.to_string());
    let _enter = span.enter();

    let source = series_descriptions
        .map(SeriesDescriptionSource::from)
        .unwrap_or_default();
    let mut generator =
        PatientsDataGenerator::new(&patients_folder, source, vec![], erase_unused_dicom_files)?;
    if let Some(path) = persist_registry {
        generator = generator.persist_series_descriptions_to(path);
    }

    let total = generator.len();
    for (i, record) in (&mut generator).enumerate() {
        let record = record?;
        tracing::info!(
            event = "progress",
            patient_id = record.patient_id.as_str(),
            "{}/{} patients curated",
            i + 1,
            total
        );
    }

    let failures = generator.into_patients_who_failed();
    if !failures.is_empty() {
        tracing::warn!(
            event = "failures",
            count = failures.len(),
            "Some patients are missing images"
        );
    }
    if let Some(path) = failures_report {
        write_json(&path, &failures)?;
        tracing::info!(event = "failures_report", path = path.as_str());
    }
    Ok(failures)
}

fn write_json<T: Serialize>(path: &Utf8Path, value: &T) -> anyhow::Result<()> {
    let file = fs_err::File::create(path)?;
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(file, formatter);
    value.serialize(&mut serializer)?;
    Ok(())
}
