//! File-backed sources: dotenv files and mounted secret directories.

use crate::crypto::Cipher;
use crate::error::CollectionError;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Something that yields raw `KEY=VALUE` pairs from disk.
pub trait FileSource: Send + Sync + fmt::Debug {
    /// Identity used for failure policies and provenance.
    fn name(&self) -> String;

    /// Read the source. A missing file contributes nothing.
    fn load(&self) -> Result<BTreeMap<String, String>, CollectionError>;
}

/// A `.env` style file, optionally encrypted.
#[derive(Debug, Clone)]
pub struct DotenvFile {
    path: PathBuf,
    cipher: Option<Arc<dyn Cipher>>,
    key: Option<String>,
}

impl DotenvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cipher: None,
            key: None,
        }
    }

    /// Decrypt the file with `cipher` before parsing.
    pub fn encrypted(mut self, cipher: Arc<dyn Cipher>, key: Option<String>) -> Self {
        self.cipher = Some(cipher);
        self.key = key;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The env-specific sibling of a base file: `.env` + `prod` -> `.env.prod`.
    pub fn env_specific_path(base: &Path, env: &str) -> PathBuf {
        let mut name = base
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| ".env".into());
        name.push(".");
        name.push(env);
        base.with_file_name(name)
    }
}

impl FileSource for DotenvFile {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<BTreeMap<String, String>, CollectionError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Dotenv file not found, skipping");
            return Ok(BTreeMap::new());
        }

        let content = match &self.cipher {
            Some(cipher) => {
                let decrypt_err = |reason: String| CollectionError::Decrypt {
                    name: self.name(),
                    tool: cipher.name().to_string(),
                    reason,
                };
                let bytes = cipher
                    .decrypt(&self.path, self.key.as_deref())
                    .map_err(|e| decrypt_err(e.to_string()))?;
                String::from_utf8(bytes)
                    .map_err(|_| decrypt_err("plaintext is not valid UTF-8".to_string()))?
            }
            None => std::fs::read_to_string(&self.path).map_err(|e| CollectionError::Read {
                name: self.name(),
                path: self.name(),
                reason: e.to_string(),
            })?,
        };

        let values = parse_dotenv(&content);
        debug!(path = %self.path.display(), keys = values.len(), "Loaded dotenv file");
        Ok(values)
    }
}

/// Parse dotenv text.
///
/// Blank lines and `#` comments are skipped, an `export ` prefix is allowed,
/// and one pair of matching surrounding quotes is removed. Lines without `=`
/// are ignored. A later line for the same key wins.
pub fn parse_dotenv(content: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        out.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    out
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Mounted secret directories (Docker `/run/secrets`, Kubernetes volumes).
///
/// Each regular file is one key named after the file, its content trimmed.
/// Directories are read in order; a later directory wins on duplicates.
#[derive(Debug, Clone)]
pub struct SecretsDir {
    dirs: Vec<PathBuf>,
}

impl SecretsDir {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    fn read_dir(dir: &Path, out: &mut BTreeMap<String, String>) -> Result<(), CollectionError> {
        let read_err = |e: std::io::Error| CollectionError::Read {
            name: "container_secret".to_string(),
            path: dir.display().to_string(),
            reason: e.to_string(),
        };
        for entry in std::fs::read_dir(dir).map_err(read_err)? {
            let entry = entry.map_err(read_err)?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // Kubernetes mounts carry `..data` style bookkeeping entries.
            if name.starts_with('.') {
                continue;
            }
            let value = std::fs::read_to_string(&path).map_err(read_err)?;
            out.insert(name.to_string(), value.trim().to_string());
        }
        Ok(())
    }
}

impl FileSource for SecretsDir {
    fn name(&self) -> String {
        "container_secret".to_string()
    }

    fn load(&self) -> Result<BTreeMap<String, String>, CollectionError> {
        let mut out = BTreeMap::new();
        for dir in &self.dirs {
            if !dir.is_dir() {
                continue;
            }
            Self::read_dir(dir, &mut out)?;
        }
        if !out.is_empty() {
            debug!(keys = out.len(), "Loaded mounted secrets");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoError;
    use tempfile::TempDir;

    #[test]
    fn test_parse_dotenv() {
        let parsed = parse_dotenv(
            "# comment\n\nPORT=8080\nexport HOST = localhost \nQUOTED=\"a b\"\nSINGLE='x=y'\nNOEQUALS\nURL=http://h/?a=b\nPORT=9000\n",
        );
        assert_eq!(parsed["PORT"], "9000");
        assert_eq!(parsed["HOST"], "localhost");
        assert_eq!(parsed["QUOTED"], "a b");
        assert_eq!(parsed["SINGLE"], "x=y");
        assert_eq!(parsed["URL"], "http://h/?a=b");
        assert!(!parsed.contains_key("NOEQUALS"));
    }

    #[test]
    fn test_unbalanced_quote_kept() {
        let parsed = parse_dotenv("A=\"open\nB=\"\n");
        assert_eq!(parsed["A"], "\"open");
        assert_eq!(parsed["B"], "\"");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let file = DotenvFile::new("/nonexistent/.env");
        assert!(file.load().unwrap().is_empty());
    }

    #[test]
    fn test_env_specific_path() {
        assert_eq!(
            DotenvFile::env_specific_path(Path::new("config/.env"), "prod"),
            PathBuf::from("config/.env.prod")
        );
    }

    #[derive(Debug)]
    struct Reverse;

    impl Cipher for Reverse {
        fn name(&self) -> &str {
            "reverse"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn decrypt(&self, path: &Path, key: Option<&str>) -> Result<Vec<u8>, CryptoError> {
            if key != Some("k") {
                return Err(CryptoError::Failed {
                    tool: "reverse".into(),
                    message: "bad key".into(),
                });
            }
            let raw = std::fs::read_to_string(path)?;
            Ok(raw.chars().rev().collect::<String>().into_bytes())
        }
        fn encrypt(&self, _path: &Path, _recipient: &str) -> Result<Vec<u8>, CryptoError> {
            unimplemented!()
        }
    }

    #[test]
    fn test_encrypted_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env.enc");
        std::fs::write(&path, "terces=NEKOT_BD").unwrap();

        let file = DotenvFile::new(&path).encrypted(Arc::new(Reverse), Some("k".into()));
        assert_eq!(file.load().unwrap()["DB_TOKEN"], "secret");

        let wrong = DotenvFile::new(&path).encrypted(Arc::new(Reverse), Some("x".into()));
        let err = wrong.load().unwrap_err();
        assert!(matches!(err, CollectionError::Decrypt { ref tool, .. } if tool == "reverse"));
        assert_eq!(err.source_name(), path.display().to_string());
    }

    #[test]
    fn test_secrets_dir_later_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(first.path().join("DB_PASSWORD"), "one\n").unwrap();
        std::fs::write(first.path().join("API_TOKEN"), "tok").unwrap();
        std::fs::write(second.path().join("DB_PASSWORD"), "two\n").unwrap();
        std::fs::write(second.path().join("..data"), "ignored").unwrap();

        let source = SecretsDir::new([first.path(), second.path(), Path::new("/nonexistent")]);
        let values = source.load().unwrap();
        assert_eq!(values["DB_PASSWORD"], "two");
        assert_eq!(values["API_TOKEN"], "tok");
        assert_eq!(values.len(), 2);
    }
}
