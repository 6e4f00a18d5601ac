use aliri_braid::braid;

/// Caller-chosen name for a logical image slot, e.g. "CT" or "PET", which one or
/// more series descriptions may satisfy.
#[braid(serde)]
pub struct ImageKey;
