//! External discovery tool invocation.
//!
//! The scheduler talks to tools through the [`DiscoveryTool`] trait;
//! production uses [`CommandTool`], tests substitute instrumented mocks.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::model::UnitKey;

/// Substrings in tool output that mark a run as error-tainted even on a
/// zero exit code.
const ERROR_PATTERNS: &[&str] = &[
    "!!!",
    "Error:",
    "ERROR:",
    "Failed:",
    "FAILED:",
    "Exception:",
    "EXCEPTION:",
];

/// Per-unit tool failures. Non-fatal to the run; the owning unit is marked
/// `failed_denovo`.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool binary could not be started.
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool exited non-zero.
    #[error("Tool exited with {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// The tool exited zero but an expected output file is missing.
    #[error("Expected output missing: {0}")]
    MissingOutput(PathBuf),
}

/// One tool invocation, fully resolved from a work unit.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub key: UnitKey,
    pub test_fasta: PathBuf,
    pub background_fasta: PathBuf,
    pub output_dir: PathBuf,
    pub genome: Option<PathBuf>,
    pub ncpus: u32,
    /// Runner binary name, normally `gimme`.
    pub command: String,
}

impl ToolRequest {
    /// Expected discovered-motif file.
    pub fn motif_file(&self) -> PathBuf {
        self.output_dir.join("gimme.denovo.pfm")
    }

    /// Expected per-background stats file.
    pub fn stats_file(&self) -> PathBuf {
        self.output_dir
            .join(format!("stats.{}.txt", self.key.background))
    }
}

/// What a successful invocation produced.
#[derive(Debug, Clone)]
pub struct ToolOutputs {
    pub motif_file: PathBuf,
    pub stats_file: PathBuf,
    /// Error patterns were seen in the tool log despite a zero exit.
    pub errors_detected: bool,
    /// First matched log line, for the unit's error detail.
    pub log_excerpt: Option<String>,
}

/// Capability interface for a de novo discovery runner.
#[async_trait]
pub trait DiscoveryTool: Send + Sync {
    async fn run(&self, request: &ToolRequest) -> Result<ToolOutputs, ToolError>;
}

/// Runs the external runner binary via the OS process API.
#[derive(Debug, Default)]
pub struct CommandTool;

impl CommandTool {
    pub fn new() -> Self {
        Self
    }

    fn build_command(request: &ToolRequest) -> Command {
        let mut cmd = Command::new(&request.command);
        cmd.arg("motifs")
            .arg(&request.test_fasta)
            .arg(&request.output_dir)
            .arg("--denovo")
            .arg("--tools")
            .arg(&request.key.tool)
            .arg("-b")
            .arg(request.key.background.to_string())
            .arg("-N")
            .arg(request.ncpus.to_string())
            .arg("--keep-intermediate");
        if request.key.background == crate::model::BackgroundType::Custom {
            cmd.arg("--custom-background").arg(&request.background_fasta);
        }
        if let Some(genome) = &request.genome {
            cmd.arg("-g").arg(genome);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl DiscoveryTool for CommandTool {
    async fn run(&self, request: &ToolRequest) -> Result<ToolOutputs, ToolError> {
        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|source| ToolError::Spawn {
                command: request.command.clone(),
                source,
            })?;

        let mut cmd = Self::build_command(request);
        debug!(unit = %request.key, "Spawning discovery tool");

        let output = cmd.output().await.map_err(|source| ToolError::Spawn {
            command: request.command.clone(),
            source,
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(ToolError::NonZeroExit {
                code: output.status.code(),
                stderr: truncate(&stderr, 2000),
            });
        }

        let motif_file = request.motif_file();
        if !motif_file.is_file() {
            return Err(ToolError::MissingOutput(motif_file));
        }
        let stats_file = request.stats_file();
        if !stats_file.is_file() {
            return Err(ToolError::MissingOutput(stats_file));
        }

        // Some tools report failures in their log while still exiting zero.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let log_excerpt = scan_for_errors(&stdout).or_else(|| scan_for_errors(&stderr));
        if let Some(line) = &log_excerpt {
            warn!(unit = %request.key, line = %line, "Error pattern in tool log");
        }

        Ok(ToolOutputs {
            motif_file,
            stats_file,
            errors_detected: log_excerpt.is_some(),
            log_excerpt,
        })
    }
}

/// First log line containing a known error pattern.
fn scan_for_errors(log: &str) -> Option<String> {
    log.lines()
        .find(|line| ERROR_PATTERNS.iter().any(|p| line.contains(p)))
        .map(|line| truncate(line, 200))
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackgroundType;

    fn request(background: BackgroundType) -> ToolRequest {
        ToolRequest {
            key: UnitKey::new(100, 0.5, 1, background, "MEME"),
            test_fasta: PathBuf::from("/data/test.fa"),
            background_fasta: PathBuf::from("/data/background.fa"),
            output_dir: PathBuf::from("/data/out"),
            genome: None,
            ncpus: 2,
            command: "gimme".to_string(),
        }
    }

    #[test]
    fn test_expected_output_paths() {
        let req = request(BackgroundType::Gc);
        assert_eq!(req.motif_file(), PathBuf::from("/data/out/gimme.denovo.pfm"));
        assert_eq!(req.stats_file(), PathBuf::from("/data/out/stats.gc.txt"));
    }

    #[test]
    fn test_command_shape() {
        let cmd = CommandTool::build_command(&request(BackgroundType::Custom));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(cmd.as_std().get_program().to_string_lossy(), "gimme");
        assert_eq!(args[0], "motifs");
        assert!(args.contains(&"--denovo".to_string()));
        assert!(args.contains(&"MEME".to_string()));
        assert!(args.contains(&"custom".to_string()));
        // Custom background passes the generated FASTA through
        assert!(args.contains(&"--custom-background".to_string()));

        // Random background omits it
        let cmd = CommandTool::build_command(&request(BackgroundType::Random));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(!args.contains(&"--custom-background".to_string()));
    }

    #[test]
    fn test_error_pattern_scan() {
        assert!(scan_for_errors("all good\nfinished").is_none());

        let hit = scan_for_errors("starting\n!!! something broke\ndone").unwrap();
        assert!(hit.contains("!!!"));

        let hit = scan_for_errors("ERROR: tool crashed").unwrap();
        assert!(hit.contains("ERROR:"));

        // lowercase "error" is not a pattern
        assert!(scan_for_errors("no error here").is_none());
    }

    #[tokio::test]
    async fn test_spawn_failure_for_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(BackgroundType::Random);
        req.command = "definitely-not-a-real-binary-7f3a".to_string();
        req.output_dir = dir.path().join("out");

        let result = CommandTool::new().run(&req).await;
        assert!(matches!(result, Err(ToolError::Spawn { .. })));
    }
}
