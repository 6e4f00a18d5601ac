use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Once;
use walkdir::WalkDir;

static INIT_LOGGING: Once = Once::new();

pub(crate) fn init_logging() {
    INIT_LOGGING.call_once(|| {
        tracing::subscriber::set_global_default(
            tracing_subscriber::FmtSubscriber::builder()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .finish(),
        )
        .unwrap()
    })
}

/// A temporary folder containing patient subfolders.
pub(crate) struct Dataset {
    _temp_dir: tempfile::TempDir,
    pub root: Utf8PathBuf,
}

impl Dataset {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(temp_dir.path()).unwrap().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    /// Folder of the patient, created if needed.
    pub fn patient(&self, name: &str) -> Utf8PathBuf {
        let folder = self.root.join("patients").join(name);
        fs_err::create_dir_all(&folder).unwrap();
        folder
    }

    pub fn patients_folder(&self) -> Utf8PathBuf {
        self.root.join("patients")
    }

    /// A path outside of the patients folder.
    pub fn output(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }
}

/// Every file under `dir`, relative to it, sorted.
pub(crate) fn find_files(dir: &Utf8Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .map(Result::unwrap)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let path = Utf8PathBuf::from_path_buf(entry.into_path()).unwrap();
            path.strip_prefix(dir).unwrap().to_string()
        })
        .collect();
    files.sort();
    files
}
