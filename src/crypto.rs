//! Encrypted dotenv support through external `age` or `gpg` executables.
//!
//! Plaintext only ever lives in memory: decryption reads the tool's stdout,
//! encryption writes the ciphertext the caller asked for and nothing else.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("{0} not found on PATH")]
    ToolNotFound(String),

    #[error("{tool} failed: {message}")]
    Failed { tool: String, message: String },

    #[error("{tool} needs a {what}")]
    MissingKey { tool: String, what: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decrypts (and optionally encrypts) whole files.
pub trait Cipher: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Decrypt `path`. `key` is tool specific: an identity file for age, a
    /// passphrase for gpg.
    fn decrypt(&self, path: &Path, key: Option<&str>) -> Result<Vec<u8>, CryptoError>;

    /// Encrypt `path` for `recipient`, returning the ciphertext.
    fn encrypt(&self, path: &Path, recipient: &str) -> Result<Vec<u8>, CryptoError>;
}

/// Which executable an [`ExternalCipher`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherTool {
    Age,
    Gpg,
}

impl CipherTool {
    pub fn program(self) -> &'static str {
        match self {
            CipherTool::Age => "age",
            CipherTool::Gpg => "gpg",
        }
    }
}

impl std::str::FromStr for CipherTool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "age" => Ok(CipherTool::Age),
            "gpg" | "pgp" => Ok(CipherTool::Gpg),
            _ => Err(format!("Unknown cipher '{}'. Valid: age, gpg", s)),
        }
    }
}

/// [`Cipher`] backed by a command-line tool.
#[derive(Debug, Clone)]
pub struct ExternalCipher {
    tool: CipherTool,
}

impl ExternalCipher {
    pub fn new(tool: CipherTool) -> Self {
        Self { tool }
    }

    /// The first installed tool, age preferred.
    pub fn detect() -> Option<Self> {
        [CipherTool::Age, CipherTool::Gpg]
            .into_iter()
            .map(Self::new)
            .find(|c| c.is_available())
    }

    pub fn tool(&self) -> CipherTool {
        self.tool
    }

    fn run(&self, mut cmd: Command, stdin: Option<&str>) -> Result<Vec<u8>, CryptoError> {
        let program = self.tool.program();
        cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CryptoError::ToolNotFound(program.to_string()),
            _ => CryptoError::Io(e),
        })?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(CryptoError::Failed {
                tool: program.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

impl Cipher for ExternalCipher {
    fn name(&self) -> &str {
        self.tool.program()
    }

    fn is_available(&self) -> bool {
        Command::new(self.tool.program())
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn decrypt(&self, path: &Path, key: Option<&str>) -> Result<Vec<u8>, CryptoError> {
        let mut cmd = Command::new(self.tool.program());
        match self.tool {
            CipherTool::Age => {
                cmd.arg("--decrypt");
                if let Some(identity) = key {
                    cmd.arg("-i").arg(identity);
                }
                cmd.arg(path);
                self.run(cmd, None)
            }
            CipherTool::Gpg => {
                cmd.args(["--decrypt", "--quiet", "--yes"]);
                // The passphrase goes through stdin, never argv.
                if key.is_some() {
                    cmd.args(["--batch", "--pinentry-mode", "loopback", "--passphrase-fd", "0"]);
                }
                cmd.arg(path);
                self.run(cmd, key)
            }
        }
    }

    fn encrypt(&self, path: &Path, recipient: &str) -> Result<Vec<u8>, CryptoError> {
        if recipient.trim().is_empty() {
            return Err(CryptoError::MissingKey {
                tool: self.tool.program().to_string(),
                what: "recipient",
            });
        }
        let mut cmd = Command::new(self.tool.program());
        match self.tool {
            CipherTool::Age => {
                cmd.args(["--encrypt", "--armor", "-r", recipient]);
            }
            CipherTool::Gpg => {
                cmd.args(["--encrypt", "--armor", "--batch", "--yes", "--recipient", recipient]);
                cmd.args(["--output", "-"]);
            }
        }
        cmd.arg(path);
        self.run(cmd, None)
    }
}
