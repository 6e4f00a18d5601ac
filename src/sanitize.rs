use regex::Regex;
use std::sync::OnceLock;

/// Replace characters which do not belong in an image key with "_".
///
/// Also, it's necessary to handle NUL bytes...
pub(crate) fn sanitize<S: AsRef<str>>(s: S) -> String {
    let s_nonull = s.as_ref().replace('\0', "");
    VALID_CHARS_RE
        .get_or_init(|| Regex::new(r#"[^A-Za-z0-9\.\-]+"#).unwrap())
        .replace_all(s_nonull.trim(), "_")
        .to_string()
}

static VALID_CHARS_RE: OnceLock<Regex> = OnceLock::new();
