//! The series descriptions registry: which series names satisfy which image key.
use std::fmt;
use std::io::{BufWriter, ErrorKind, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CurationError, OverlappingSeriesDescriptions, RegistryDocumentError};
use crate::types::{ImageKey, ImageKeyRef};

/// An ordered mapping of image key to the series names accepted for it.
///
/// Insertion order is kept, both in memory and in the JSON document, because
/// overlap validation and failure reporting depend on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesDescriptions(Vec<(ImageKey, Vec<String>)>);

impl SeriesDescriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the series names of `key`. An existing key keeps its position and
    /// its previous value is returned.
    pub fn insert(&mut self, key: ImageKey, series: Vec<String>) -> Option<Vec<String>> {
        if let Some((_, current)) = self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(std::mem::replace(current, series))
        } else {
            self.0.push((key, series));
            None
        }
    }

    pub fn get(&self, key: &ImageKeyRef) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(k, _)| k.as_str() == key.as_str())
            .map(|(_, series)| series.as_slice())
    }

    pub fn contains_key(&self, key: &ImageKeyRef) -> bool {
        self.get(key).is_some()
    }

    /// Whether any key accepts the given series name.
    pub fn covers(&self, series_name: &str) -> bool {
        self.0
            .iter()
            .any(|(_, series)| series.iter().any(|s| s == series_name))
    }

    pub fn keys(&self) -> impl Iterator<Item = &ImageKey> {
        self.0.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ImageKey, &[String])> {
        self.0.iter().map(|(k, series)| (k, series.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<ImageKey>, S: Into<String>> FromIterator<(K, Vec<S>)> for SeriesDescriptions {
    fn from_iter<T: IntoIterator<Item = (K, Vec<S>)>>(iter: T) -> Self {
        let mut series_descriptions = Self::new();
        for (key, series) in iter {
            series_descriptions.insert(key.into(), series.into_iter().map(Into::into).collect());
        }
        series_descriptions
    }
}

impl IntoIterator for SeriesDescriptions {
    type Item = (ImageKey, Vec<String>);
    type IntoIter = std::vec::IntoIter<(ImageKey, Vec<String>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Serialize for SeriesDescriptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, series) in &self.0 {
            map.serialize_entry(key, series)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SeriesDescriptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SeriesDescriptionsVisitor)
    }
}

struct SeriesDescriptionsVisitor;

impl<'de> Visitor<'de> for SeriesDescriptionsVisitor {
    type Value = SeriesDescriptions;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of image names to lists of series descriptions")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries: Vec<(ImageKey, Vec<String>)> =
            Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, series)) = access.next_entry::<ImageKey, Vec<String>>()? {
            if entries.iter().any(|(k, _)| *k == key) {
                return Err(serde::de::Error::custom(format!(
                    "duplicate image name \"{key}\""
                )));
            }
            entries.push((key, series));
        }
        Ok(SeriesDescriptions(entries))
    }
}

/// The validated series descriptions used to select a patient's images.
///
/// Assignment only succeeds when no image key shares series names with the key
/// preceding it. Only adjacent keys are compared, so an overlap between keys
/// further apart is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesDescriptionRegistry {
    series_descriptions: SeriesDescriptions,
}

impl SeriesDescriptionRegistry {
    /// Create an empty registry, which means "take every available series".
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_new(
        series_descriptions: SeriesDescriptions,
    ) -> Result<Self, OverlappingSeriesDescriptions> {
        let mut registry = Self::new();
        registry.set(series_descriptions)?;
        Ok(registry)
    }

    /// Replace the whole mapping. On error, the registry is left untouched.
    pub fn set(
        &mut self,
        series_descriptions: SeriesDescriptions,
    ) -> Result<(), OverlappingSeriesDescriptions> {
        check_adjacent_overlap(&series_descriptions)?;
        self.series_descriptions = series_descriptions;
        Ok(())
    }

    /// Read a registry from a JSON document.
    pub fn load<P: AsRef<Utf8Path>>(path: P) -> Result<Self, CurationError> {
        let path = path.as_ref();
        let content = fs_err::read_to_string(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                RegistryDocumentError::NotFound(path.to_path_buf())
            } else {
                RegistryDocumentError::IO(e)
            }
        })?;
        let series_descriptions =
            serde_json::from_str(&content).map_err(|source| RegistryDocumentError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::try_new(series_descriptions)?)
    }

    /// Write the registry as a JSON document, keys in registry order.
    ///
    /// The document is written next to `path` then renamed over it, so an
    /// existing document is either kept whole or replaced whole.
    pub fn save<P: AsRef<Utf8Path>>(&self, path: P) -> Result<(), RegistryDocumentError> {
        let path = path.as_ref();
        let dir = path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
            let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
            self.series_descriptions
                .serialize(&mut serializer)
                .map_err(std::io::Error::from)?;
            writer.flush()?;
        }
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn series_descriptions(&self) -> &SeriesDescriptions {
        &self.series_descriptions
    }

    pub fn get(&self, key: &ImageKeyRef) -> Option<&[String]> {
        self.series_descriptions.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.series_descriptions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.series_descriptions.len()
    }

    /// A copy of this registry with one `name → [name]` entry appended for every
    /// series name which no key accepts yet. Existing entries are never removed.
    ///
    /// A series name which is already the key of other series names is not
    /// added, and stays uncovered.
    pub(crate) fn extended_with<'a, I>(&self, series_names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut series_descriptions = self.series_descriptions.clone();
        for name in series_names {
            if series_descriptions.covers(name) {
                continue;
            }
            let key = ImageKey::from(name);
            if let Some(accepted) = series_descriptions.get(&key) {
                tracing::warn!(
                    event = "uncovered_series",
                    series_description = name,
                    accepted = format!("{accepted:?}"),
                    "Series name is already an image key for other series, it will not be selected"
                );
                continue;
            }
            series_descriptions.insert(key, vec![name.to_string()]);
        }
        Self {
            series_descriptions,
        }
    }
}

impl TryFrom<SeriesDescriptions> for SeriesDescriptionRegistry {
    type Error = OverlappingSeriesDescriptions;

    fn try_from(value: SeriesDescriptions) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

/// Compare the series names of each key against the key before it.
fn check_adjacent_overlap(
    series_descriptions: &SeriesDescriptions,
) -> Result<(), OverlappingSeriesDescriptions> {
    for pair in series_descriptions.0.windows(2) {
        let (previous_key, previous_series) = &pair[0];
        let (current_key, current_series) = &pair[1];
        let mut shared: Vec<String> = Vec::new();
        for name in current_series {
            if previous_series.contains(name) && !shared.contains(name) {
                shared.push(name.clone());
            }
        }
        if !shared.is_empty() {
            return Err(OverlappingSeriesDescriptions {
                previous_key: previous_key.clone(),
                previous_series: previous_series.clone(),
                current_key: current_key.clone(),
                current_series: current_series.clone(),
                shared,
            });
        }
    }
    Ok(())
}

/// Where the generator gets its registry from.
#[derive(Debug, Clone, Default)]
pub enum SeriesDescriptionSource {
    /// No registry: every available series is taken, and the registry is grown
    /// from what the patients contain.
    #[default]
    Unset,
    /// A registry given by the caller.
    Registry(SeriesDescriptionRegistry),
    /// A JSON document, loaded up front and re-saved after every patient.
    Path(Utf8PathBuf),
}

impl From<SeriesDescriptionRegistry> for SeriesDescriptionSource {
    fn from(value: SeriesDescriptionRegistry) -> Self {
        Self::Registry(value)
    }
}

impl From<Utf8PathBuf> for SeriesDescriptionSource {
    fn from(value: Utf8PathBuf) -> Self {
        Self::Path(value)
    }
}
