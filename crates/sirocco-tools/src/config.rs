use serde::Deserialize;

fn default_true() -> bool {
    true
}

fn default_shell_timeout() -> u64 {
    7200
}

fn default_audit_destination() -> String {
    "stdout".into()
}

/// Top-level configuration for tool execution.
#[derive(Debug, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub file: FileConfig,
}

/// Shell-specific configuration.
#[derive(Debug, Deserialize)]
pub struct ShellConfig {
    /// Wall-clock limit per command, in seconds.
    #[serde(default = "default_shell_timeout")]
    pub timeout: u64,
}

/// File tool configuration.
///
/// `allowed_paths` lists the directories writes and edits may touch.
/// An empty list leaves the tools unrestricted.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub allowed_paths: Vec<String>,
}

/// Audit trail configuration. `destination` is `"stdout"` or a file path.
#[derive(Debug, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_audit_destination")]
    pub destination: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell: ShellConfig::default(),
            file: FileConfig::default(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout: default_shell_timeout(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            destination: default_audit_destination(),
        }
    }
}
