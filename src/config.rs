use figment::providers::Env;
use figment::Figment;
use std::sync::OnceLock;

static CONFIG: OnceLock<Figment> = OnceLock::new();

/// Configuration read from `CURATOR_*` environment variables, cached after the first call.
pub fn get_config() -> &'static Figment {
    CONFIG.get_or_init(figment)
}

pub(crate) fn figment() -> Figment {
    Figment::new().merge(Env::prefixed("CURATOR_"))
}
