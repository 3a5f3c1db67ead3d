//! Loading configuration files and source documents from disk.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::Config;
use crate::source::{Source, Sources, SrcType};

/// File extensions collected when walking a directory.
pub const SOURCE_EXTENSIONS: [&str; 3] = ["html", "htm", "css"];

/// Errors raised while reading from disk.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// A JSON configuration file is malformed.
    #[error("invalid JSON configuration {}: {source}", .path.display())]
    Json {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
    /// A TOML configuration file is malformed.
    #[error("invalid TOML configuration {}: {source}", .path.display())]
    Toml {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
}

/// Reads a configuration file. `.toml` files are TOML; anything else is JSON.
///
/// # Errors
///
/// Returns a [`LoadError`] if the file cannot be read or parsed.
pub fn read_config(path: &Path) -> Result<Config, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&text).map_err(|source| LoadError::Toml {
            path: path.to_path_buf(),
            source,
        })
    } else {
        serde_json::from_str(&text).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Reads source documents, caching file contents by path.
#[derive(Debug, Default)]
pub struct SourceLoader {
    cache: HashMap<PathBuf, String>,
}

impl SourceLoader {
    /// Creates a loader with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every cached file.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Number of cached files.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Returns the contents of `path`, reading it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Io`] if the file cannot be read.
    pub fn read(&mut self, path: &Path) -> Result<&str, LoadError> {
        if !self.cache.contains_key(path) {
            let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            self.cache.insert(path.to_path_buf(), text);
        }
        Ok(self.cache.get(path).map_or("", String::as_str))
    }

    /// Expands `paths` into files. Directories are walked for
    /// [`SOURCE_EXTENSIONS`] files in name order; files are kept as given.
    /// Duplicates are dropped.
    pub fn expand(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for path in paths {
            if path.is_dir() {
                for entry in WalkDir::new(path)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && has_source_extension(e.path()))
                {
                    if seen.insert(entry.path().to_path_buf()) {
                        files.push(entry.into_path());
                    }
                }
            } else if seen.insert(path.clone()) {
                files.push(path.clone());
            }
        }
        files
    }

    /// Expands and reads `paths`. Each source is identified by its path and
    /// typed by its extension when it has a known one.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Io`] for the first file that cannot be read.
    pub fn load(&mut self, paths: &[PathBuf]) -> Result<Sources, LoadError> {
        let mut sources = Sources::new();
        for path in self.expand(paths) {
            let source = Source::new(self.read(&path)?).with_id(path.display().to_string());
            let source = match extension_type(&path) {
                Some(src_type) => source.with_src_type(src_type),
                None => source,
            };
            sources.push(source);
        }
        debug!(files = sources.len(), "loaded sources");
        Ok(sources)
    }
}

fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn extension_type(path: &Path) -> Option<SrcType> {
    match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "html" | "htm" => Some(SrcType::Html),
        "css" => Some(SrcType::Css),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Severity;
    use std::fs;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("checkup-loader-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let _ = fs::create_dir_all(&dir);
        dir
    }

    #[test]
    fn reads_json_and_toml_configs() {
        let dir = scratch("config");
        let json = dir.join("checkup.json");
        let toml = dir.join("checkup.toml");
        let _ = fs::write(&json, r#"{"severity": "ERROR", "rules": {"wai-img": {}}}"#);
        let _ = fs::write(&toml, "severity = \"WARNING\"\n[rules.wai-img]\nminWidth = 3\n");

        let from_json = read_config(&json).ok();
        assert_eq!(from_json.as_ref().and_then(|c| c.severity), Some(Severity::Error));
        let from_toml = read_config(&toml).ok();
        assert_eq!(from_toml.as_ref().and_then(|c| c.severity), Some(Severity::Warning));
        assert_eq!(
            from_toml.and_then(|c| c.rules.get("wai-img").and_then(|r| r.get("minWidth")).cloned()),
            Some(serde_json::json!(3))
        );
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_config_is_an_io_error() {
        let missing = scratch("missing").join("nope.json");
        assert!(matches!(read_config(&missing), Err(LoadError::Io { .. })));
    }

    #[test]
    fn directories_expand_to_source_files() {
        let dir = scratch("expand");
        let _ = fs::create_dir_all(dir.join("nested"));
        let _ = fs::write(dir.join("b.html"), "<p>b</p>");
        let _ = fs::write(dir.join("a.css"), "a {}");
        let _ = fs::write(dir.join("notes.txt"), "skip me");
        let _ = fs::write(dir.join("nested").join("c.htm"), "<p>c</p>");

        let mut loader = SourceLoader::new();
        let files = loader.expand(&[dir.clone(), dir.join("b.html")]);
        let names: Vec<String> = files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.css", "b.html", "c.htm"]);

        let sources = loader.load(&[dir.clone()]).unwrap_or_default();
        assert_eq!(sources.len(), 3);
        let kinds: Vec<Option<SrcType>> = sources.iter().map(Source::src_type).collect();
        assert_eq!(kinds, vec![Some(SrcType::Css), Some(SrcType::Html), Some(SrcType::Html)]);
        assert_eq!(loader.cached(), 3);
        loader.clear_cache();
        assert_eq!(loader.cached(), 0);
        let _ = fs::remove_dir_all(&dir);
    }
}
