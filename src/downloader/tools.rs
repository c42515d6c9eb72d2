// External binary discovery (yt-dlp, ffmpeg, ffprobe)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
    Ffprobe,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
            ToolType::Ffprobe => "ffprobe",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            // ffmpeg and ffprobe use a single dash
            ToolType::Ffmpeg | ToolType::Ffprobe => "-version",
        }
    }

    pub fn all() -> [ToolType; 3] {
        [ToolType::YtDlp, ToolType::Ffmpeg, ToolType::Ffprobe]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

/// Resolves tool locations, honouring configured overrides
#[derive(Debug, Clone, Default)]
pub struct ToolManager {
    ytdlp: Option<String>,
    ffmpeg: Option<String>,
    ffprobe: Option<String>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(
        ytdlp: Option<String>,
        ffmpeg: Option<String>,
        ffprobe: Option<String>,
    ) -> Self {
        Self {
            ytdlp,
            ffmpeg,
            ffprobe,
        }
    }

    fn override_for(&self, tool_type: ToolType) -> Option<&str> {
        match tool_type {
            ToolType::YtDlp => self.ytdlp.as_deref(),
            ToolType::Ffmpeg => self.ffmpeg.as_deref(),
            ToolType::Ffprobe => self.ffprobe.as_deref(),
        }
    }

    /// Path to invoke; falls back to the bare name so PATH lookup happens at spawn
    pub fn resolve(&self, tool_type: ToolType) -> String {
        self.locate(tool_type)
            .unwrap_or_else(|| tool_type.as_str().to_string())
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.locate(tool_type);
        let version = path
            .as_deref()
            .and_then(|p| self.get_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            is_available: version.is_some(),
            version,
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        ToolType::all()
            .into_iter()
            .map(|t| self.get_tool_info(t))
            .collect()
    }

    fn locate(&self, tool_type: ToolType) -> Option<String> {
        if let Some(path) = self.override_for(tool_type) {
            return Some(path.to_string());
        }

        let binary_name = tool_type.as_str();

        // 1. Try common paths first
        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];

        for path in common_paths {
            if Path::new(&path).exists() {
                return Some(path);
            }
        }

        // 2. Try PATH
        if let Ok(output) = Command::new("which").arg(binary_name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }

        None
    }

    fn get_version(&self, path: &str, tool_type: ToolType) -> Option<String> {
        match Command::new(path).arg(tool_type.version_arg()).output() {
            Ok(output) if output.status.success() => {
                // ffmpeg prints a long banner; the first line carries the version
                String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .map(|l| l.trim().to_string())
            }
            _ => None,
        }
    }
}
