use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use super::record::RecordKind;

pub const GRAPH_DIR: &str = "graph";
pub const INDEX_DIR: &str = "index";
pub const SUMMARY_FILE: &str = "summary.json";

const MANIFEST_EXT: &str = "manifest";

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("static regex"))
}

/// Make a step id or `_type` usable as a single path segment.
pub fn sanitize_segment(name: &str) -> String {
    let cleaned = unsafe_chars().replace_all(name, "_");
    match cleaned.as_ref() {
        "" | "." | ".." => format!("_{}", cleaned),
        _ => cleaned.into_owned(),
    }
}

/// Path of a batch file relative to the store root, always `/`-separated so
/// manifests stay portable.
pub(crate) fn batch_relative_path(step_id: &str, kind: RecordKind, batch_id: &str) -> String {
    format!(
        "{}/{}/{}/{}.json",
        GRAPH_DIR,
        sanitize_segment(step_id),
        kind.as_str(),
        batch_id
    )
}

pub(crate) fn manifest_path(root: &Path, kind: RecordKind, record_type: &str) -> PathBuf {
    root.join(INDEX_DIR)
        .join(kind.as_str())
        .join(format!("{}.{}", sanitize_segment(record_type), MANIFEST_EXT))
}

pub(crate) fn resolve_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_path_characters() {
        assert_eq!(sanitize_segment("acme_user"), "acme_user");
        assert_eq!(sanitize_segment("a/b\\c d"), "a_b_c_d");
        assert_eq!(sanitize_segment(".."), "_..");
        assert_eq!(sanitize_segment(""), "_");
    }

    #[test]
    fn batch_paths_are_slash_separated() {
        let rel = batch_relative_path("fetch-users", RecordKind::Entities, "abc");
        assert_eq!(rel, "graph/fetch-users/entities/abc.json");
        let resolved = resolve_relative(Path::new("/tmp/run"), &rel);
        assert_eq!(
            resolved,
            Path::new("/tmp/run/graph/fetch-users/entities/abc.json")
        );
    }
}
