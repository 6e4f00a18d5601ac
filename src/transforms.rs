use crate::data_model::{ImagePayload, PatientRecord};
use crate::error::CurationError;

/// An operation applied to every kept image before a record is handed out.
pub trait ImageTransform {
    fn apply(&self, payload: ImagePayload) -> anyhow::Result<ImagePayload>;
}

impl<F> ImageTransform for F
where
    F: Fn(ImagePayload) -> anyhow::Result<ImagePayload>,
{
    fn apply(&self, payload: ImagePayload) -> anyhow::Result<ImagePayload> {
        self(payload)
    }
}

/// Apply `transforms`, in order, to each image of the record.
pub(crate) fn apply_transforms(
    transforms: &[Box<dyn ImageTransform>],
    record: &mut PatientRecord,
) -> Result<(), CurationError> {
    for entry in record.data.iter_mut() {
        for transform in transforms {
            let payload = std::mem::take(&mut entry.image.payload);
            entry.image.payload = transform.apply(payload).map_err(CurationError::Transform)?;
        }
    }
    Ok(())
}
