//! Wrapping PowerShell scripts for cmd.exe shells.
//!
//! Scripts are sent as `-EncodedCommand`, base64 over UTF-16LE, which
//! sidesteps cmd.exe quoting entirely.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Disables progress bars, which PowerShell would otherwise write to stderr.
const PROGRESS_PREAMBLE: &str = "$ProgressPreference = 'SilentlyContinue';";

/// Switches passed to `powershell.exe`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerShellOptions {
    /// Add `-NoProfile`
    pub no_profile: bool,
    /// Value for `-OutputFormat` (`Text` or `XML`)
    pub output_format: Option<String>,
}

impl PowerShellOptions {
    pub fn with_no_profile(mut self, no_profile: bool) -> Self {
        self.no_profile = no_profile;
        self
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = Some(format.into());
        self
    }
}

/// Command line running `script` with default options.
pub fn encode(script: &str) -> String {
    with_options(script, &PowerShellOptions::default())
}

/// Command line running `script` with `options`.
pub fn with_options(script: &str, options: &PowerShellOptions) -> String {
    let script = format!("{}{}", PROGRESS_PREAMBLE, script);
    let utf16: Vec<u8> = script.encode_utf16().flat_map(u16::to_le_bytes).collect();

    let mut parts = vec!["powershell.exe".to_string()];
    if options.no_profile {
        parts.push("-NoProfile".to_string());
    }
    if let Some(format) = options.output_format.as_deref().filter(|f| !f.is_empty()) {
        parts.push(format!("-OutputFormat {}", format));
    }
    parts.push(format!("-EncodedCommand {}", STANDARD.encode(utf16)));
    parts.join(" ")
}
