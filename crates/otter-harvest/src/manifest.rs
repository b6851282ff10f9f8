//! The JSON image manifest consumed by the gallery front end.
//!
//! The document is a pretty-printed array of `{ src, tags, sourceUrl }`
//! records and is always rewritten whole.

use crate::download::{parse_asset_filename, PARTIAL_SUFFIX};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Errors reading or writing the manifest.
#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ManifestError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One cataloged asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Site-relative path of the asset, e.g. `/otters/otter-1-0.jpg`.
    pub src: String,
    pub tags: Vec<String>,
    /// Where the asset was fetched from; empty when unknown.
    #[serde(default)]
    pub source_url: String,
}

impl ManifestEntry {
    pub fn new(src: impl Into<String>, tags: Vec<String>, source_url: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            tags,
            source_url: source_url.into(),
        }
    }
}

/// Site-relative `src` for a file name under `prefix`.
pub fn src_for(prefix: &str, filename: &str) -> String {
    format!("{}/{filename}", prefix.trim_end_matches('/'))
}

/// Ordered list of manifest entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, src: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.src == src)
    }

    /// Read a manifest; a missing file is an empty manifest.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ManifestError::io(path, e)),
        };
        serde_json::from_str(&raw).map_err(|source| ManifestError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the whole document, creating the parent directory if needed.
    ///
    /// The JSON goes to a sibling temp file first and is renamed over the
    /// target, so readers never observe a half-written manifest.
    pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ManifestError::io(parent, e))?;
        }

        let mut json = serde_json::to_string_pretty(self).map_err(|source| ManifestError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        json.push('\n');

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        std::fs::write(&tmp, json).map_err(|e| ManifestError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            ManifestError::io(path, e)
        })
    }

    /// Union with `batch`, keyed by `src`.
    ///
    /// An entry whose `src` is already present replaces the earlier one in
    /// place; new keys are appended in batch order.
    pub fn merge(mut self, batch: impl IntoIterator<Item = ManifestEntry>) -> Self {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut deduped: Vec<ManifestEntry> = Vec::with_capacity(self.entries.len());

        // Duplicates inside the prior document collapse too.
        for entry in self.entries.drain(..) {
            upsert(&mut deduped, &mut index, entry);
        }
        for entry in batch {
            upsert(&mut deduped, &mut index, entry);
        }

        self.entries = deduped;
        self
    }
}

fn upsert(entries: &mut Vec<ManifestEntry>, index: &mut HashMap<String, usize>, entry: ManifestEntry) {
    match index.get(&entry.src) {
        Some(&i) => entries[i] = entry,
        None => {
            index.insert(entry.src.clone(), entries.len());
            entries.push(entry);
        }
    }
}

/// Names of the asset files in `dir`, in download order.
///
/// Names following the `<prefix>-<timestamp>-<index>` pattern sort by run
/// timestamp then discovery index; any other names come after them in string
/// order. Hidden files, subdirectories and unfinished `.part` downloads are
/// not assets.
pub fn scan_assets(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            tracing::warn!("skipping non UTF-8 file name in {}", dir.display());
            continue;
        };
        if name.starts_with('.') || name.ends_with(PARTIAL_SUFFIX) {
            continue;
        }
        names.push(name);
    }
    names.sort_by_cached_key(|name| {
        let key = parse_asset_filename(name);
        (key.is_none(), key, name.clone())
    });
    Ok(names)
}

/// Settings for deriving entries from the asset directory.
#[derive(Debug, Clone)]
pub struct BuildOptions<'a> {
    /// Site-relative prefix for `src`.
    pub src_prefix: &'a str,
    /// Tags for assets the prior manifest does not know.
    pub default_tags: &'a [String],
    /// Best-effort provenance: `src` -> source URL.
    pub provenance: &'a HashMap<String, String>,
    /// Previous manifest; its tags and provenance are carried forward.
    pub prior: Option<&'a Manifest>,
}

/// Catalog every asset currently in `dir`.
///
/// Returns `Ok(None)` when the directory does not exist. Each file yields one
/// entry; tags come from the prior manifest when it has the same `src`,
/// otherwise the defaults. `sourceUrl` is filled from `provenance`, then the
/// prior manifest, and left empty when neither knows it.
pub fn build_from_dir(dir: &Path, options: &BuildOptions<'_>) -> Result<Option<Manifest>, ManifestError> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let names = scan_assets(dir).map_err(|e| ManifestError::io(dir, e))?;
    let entries = names
        .iter()
        .map(|name| {
            let src = src_for(options.src_prefix, name);
            let previous = options.prior.and_then(|m| m.get(&src));

            let tags = previous
                .map(|p| p.tags.clone())
                .filter(|tags| !tags.is_empty())
                .unwrap_or_else(|| options.default_tags.to_vec());

            let source_url = options
                .provenance
                .get(&src)
                .cloned()
                .or_else(|| previous.map(|p| p.source_url.clone()))
                .unwrap_or_default();

            ManifestEntry {
                src,
                tags,
                source_url,
            }
        })
        .collect();

    Ok(Some(Manifest::new(entries)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn no_provenance() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = ManifestEntry::new("/otters/a.jpg", tags(&["otter"]), "https://x/a.jpg");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"src": "/otters/a.jpg", "tags": ["otter"], "sourceUrl": "https://x/a.jpg"})
        );
    }

    #[test]
    fn test_missing_source_url_reads_as_empty() {
        let manifest: Manifest =
            serde_json::from_str(r#"[{"src": "/otters/a.jpg", "tags": ["otter"]}]"#).unwrap();
        assert_eq!(manifest.entries[0].source_url, "");
    }

    #[test]
    fn test_src_for_handles_trailing_slash() {
        assert_eq!(src_for("/otters", "a.jpg"), "/otters/a.jpg");
        assert_eq!(src_for("/otters/", "a.jpg"), "/otters/a.jpg");
    }

    #[test]
    fn test_merge_later_entries_win() {
        let prior = Manifest::new(vec![
            ManifestEntry::new("A", tags(&["a"]), ""),
            ManifestEntry::new("B", tags(&["old"]), ""),
        ]);
        let merged = prior.merge(vec![
            ManifestEntry::new("B", tags(&["new"]), "https://x/b"),
            ManifestEntry::new("C", tags(&["c"]), ""),
        ]);

        let srcs: Vec<&str> = merged.entries.iter().map(|e| e.src.as_str()).collect();
        assert_eq!(srcs, vec!["A", "B", "C"]);
        assert_eq!(merged.get("B").unwrap().tags, tags(&["new"]));
        assert_eq!(merged.get("B").unwrap().source_url, "https://x/b");
    }

    #[test]
    fn test_merge_collapses_duplicates_in_prior() {
        let prior = Manifest::new(vec![
            ManifestEntry::new("A", tags(&["1"]), ""),
            ManifestEntry::new("A", tags(&["2"]), ""),
        ]);
        let merged = prior.merge(Vec::new());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.entries[0].tags, tags(&["2"]));
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::load(&dir.path().join("nope.json")).unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_load_malformed_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("images.json");
        std::fs::write(&path, "const allImages = [];").unwrap();
        assert!(matches!(
            Manifest::load(&path).unwrap_err(),
            ManifestError::Json { .. }
        ));
    }

    #[test]
    fn test_write_creates_parent_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src/lib/images.json");
        let manifest = Manifest::new(vec![ManifestEntry::new("/otters/a.jpg", tags(&["otter"]), "")]);

        manifest.write(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("[\n  {"));
        assert!(raw.contains("\"sourceUrl\": \"\""));
        assert_eq!(Manifest::load(&path).unwrap(), manifest);
        assert!(!dir.path().join("src/lib/images.json.tmp").exists());
    }

    #[test]
    fn test_scan_skips_partials_hidden_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("otter-2-1.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("otter-2-0.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("otter-2-2.jpg.part"), b"x").unwrap();
        std::fs::write(dir.path().join(".DS_Store"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("thumbs")).unwrap();

        assert_eq!(
            scan_assets(dir.path()).unwrap(),
            vec!["otter-2-0.jpg", "otter-2-1.jpg"]
        );
    }

    #[test]
    fn test_scan_orders_by_timestamp_then_index() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..12 {
            std::fs::write(dir.path().join(format!("otter-5-{i}.jpg")), b"x").unwrap();
        }
        std::fs::write(dir.path().join("otter-40-0.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("hand-picked.jpg"), b"x").unwrap();

        let names = scan_assets(dir.path()).unwrap();
        let mut expected: Vec<String> = (0..12).map(|i| format!("otter-5-{i}.jpg")).collect();
        expected.push("otter-40-0.jpg".to_string());
        expected.push("hand-picked.jpg".to_string());
        assert_eq!(names, expected);
    }

    #[test]
    fn test_build_one_entry_per_file() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let defaults = tags(&["otter"]);
        let provenance = no_provenance();
        let manifest = build_from_dir(
            dir.path(),
            &BuildOptions {
                src_prefix: "/otters",
                default_tags: &defaults,
                provenance: &provenance,
                prior: None,
            },
        )
        .unwrap()
        .unwrap();

        assert_eq!(manifest.len(), 3);
        let srcs: Vec<&str> = manifest.entries.iter().map(|e| e.src.as_str()).collect();
        assert_eq!(srcs, vec!["/otters/a.jpg", "/otters/b.jpg", "/otters/c.jpg"]);
        assert!(manifest.entries.iter().all(|e| e.tags == defaults && e.source_url.is_empty()));
    }

    #[test]
    fn test_build_carries_prior_tags_and_provenance() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"x").unwrap();

        let prior = Manifest::new(vec![
            ManifestEntry::new("/otters/a.jpg", tags(&["otter", "river"]), "https://x/a"),
            ManifestEntry::new("/otters/gone.jpg", tags(&["otter"]), ""),
        ]);
        let mut provenance = HashMap::new();
        provenance.insert("/otters/b.jpg".to_string(), "https://x/b".to_string());
        let defaults = tags(&["otter"]);

        let manifest = build_from_dir(
            dir.path(),
            &BuildOptions {
                src_prefix: "/otters",
                default_tags: &defaults,
                provenance: &provenance,
                prior: Some(&prior),
            },
        )
        .unwrap()
        .unwrap();

        assert_eq!(manifest.len(), 2);
        let a = manifest.get("/otters/a.jpg").unwrap();
        assert_eq!(a.tags, tags(&["otter", "river"]));
        assert_eq!(a.source_url, "https://x/a");
        let b = manifest.get("/otters/b.jpg").unwrap();
        assert_eq!(b.tags, defaults);
        assert_eq!(b.source_url, "https://x/b");
        assert!(manifest.get("/otters/gone.jpg").is_none());
    }

    #[test]
    fn test_build_missing_dir_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let provenance = no_provenance();
        let result = build_from_dir(
            &dir.path().join("otters"),
            &BuildOptions {
                src_prefix: "/otters",
                default_tags: &[],
                provenance: &provenance,
                prior: None,
            },
        )
        .unwrap();
        assert!(result.is_none());
    }
}
