//! Encrypt and decrypt subcommands.

use crate::crypto::{CipherTool, ExternalCipher};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// Plaintext dotenv file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// age recipient or gpg key id
    #[arg(short, long)]
    pub recipient: String,

    /// age or gpg (default: first one installed)
    #[arg(long)]
    pub tool: Option<String>,

    /// Output file (default: `<FILE>.enc`)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DecryptArgs {
    /// Encrypted dotenv file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// age identity file or gpg passphrase
    #[arg(short, long)]
    pub key: Option<String>,

    /// age or gpg (default: first one installed)
    #[arg(long)]
    pub tool: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Pick the cipher: the named tool, or whichever is installed.
pub fn select_cipher(tool: Option<&str>) -> Result<ExternalCipher, String> {
    match tool {
        Some(name) => name.parse::<CipherTool>().map(ExternalCipher::new),
        None => ExternalCipher::detect().ok_or_else(|| "Neither age nor gpg found on PATH".to_string()),
    }
}

impl EncryptArgs {
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let mut name = self.file.as_os_str().to_os_string();
            name.push(".enc");
            PathBuf::from(name)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_encrypt_output() {
        let args = EncryptArgs {
            file: PathBuf::from("config/.env.prod"),
            recipient: "age1xyz".to_string(),
            tool: None,
            output: None,
        };
        assert_eq!(args.output_path(), PathBuf::from("config/.env.prod.enc"));
    }

    #[test]
    fn test_named_tool() {
        assert_eq!(select_cipher(Some("gpg")).unwrap().tool(), CipherTool::Gpg);
        assert!(select_cipher(Some("rot13")).is_err());
    }
}
