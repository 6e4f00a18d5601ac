use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .finish(),
    )
    .unwrap_or_else(|e| eprintln!("Could not set up global logger: {e}"));

    let failures = dicom_curator::run_from_env()?;
    if !failures.is_empty() {
        eprintln!("{} patient(s) are missing images", failures.len());
    }
    Ok(())
}
