//! Typed invocation options for the external extraction tool
//!
//! The tool takes `(input, output_dir, mode, language, device, backend,
//! formula flag, table flag)` on its command line. Building the argv from a
//! struct keeps the invocation testable and rules out ad hoc string assembly.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Extraction mode passed as `-m`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractMode {
    /// Full layout analysis (default)
    #[default]
    Auto,
    /// Text-only fast path
    Txt,
    /// Force OCR
    Ocr,
}

impl ExtractMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractMode::Auto => "auto",
            ExtractMode::Txt => "txt",
            ExtractMode::Ocr => "ocr",
        }
    }
}

/// Options for one extraction tool invocation
#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    /// Tool binary; overridable for tests and non-PATH deployments
    pub program: PathBuf,
    pub mode: ExtractMode,
    pub language: String,
    pub device: String,
    pub backend: String,
    pub formula_parsing: bool,
    pub table_parsing: bool,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from("mineru"),
            mode: ExtractMode::Auto,
            language: "en".to_string(),
            device: "cpu".to_string(),
            backend: "pipeline".to_string(),
            formula_parsing: true,
            table_parsing: true,
        }
    }
}

impl ExtractorOptions {
    /// Load the tool binary from MINERU_BIN if set
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(bin) = std::env::var("MINERU_BIN") {
            options.program = PathBuf::from(bin);
        }
        options
    }

    /// Build the subprocess command for one input document
    ///
    /// Stdout/stderr are discarded: the process outlives any reader we could
    /// attach, and a full pipe buffer would wedge the tool mid-run.
    pub fn command(&self, input: &Path, output_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-p")
            .arg(input)
            .arg("-o")
            .arg(output_dir)
            .arg("-m")
            .arg(self.mode.as_str())
            .arg("-l")
            .arg(&self.language)
            .arg("-d")
            .arg(&self.device)
            .arg("-b")
            .arg(&self.backend)
            .arg("-f")
            .arg(flag(self.formula_parsing))
            .arg("-t")
            .arg(flag(self.table_parsing))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn test_command_argv() {
        let options = ExtractorOptions::default();
        let cmd = options.command(Path::new("/tmp/doc.pdf"), Path::new("/tmp/out"));

        let args: Vec<&OsStr> = cmd.as_std().get_args().collect();
        assert_eq!(
            args,
            vec![
                "-p", "/tmp/doc.pdf", "-o", "/tmp/out", "-m", "auto", "-l", "en", "-d", "cpu",
                "-b", "pipeline", "-f", "true", "-t", "true",
            ]
        );
        assert_eq!(cmd.as_std().get_program(), "mineru");
    }

    #[test]
    fn test_command_argv_txt_mode_no_tables() {
        let options = ExtractorOptions {
            mode: ExtractMode::Txt,
            table_parsing: false,
            ..Default::default()
        };
        let cmd = options.command(Path::new("a.pdf"), Path::new("out"));

        let args: Vec<&OsStr> = cmd.as_std().get_args().collect();
        assert!(args.windows(2).any(|w| w == ["-m", "txt"]));
        assert!(args.windows(2).any(|w| w == ["-t", "false"]));
    }
}
