//! Media duration probing via `ffprobe`.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use clipdeck_common::error::{ClipdeckError, ClipdeckResult};
use clipdeck_project_model::project::local_path;
use clipdeck_timeline::import::MediaProbe;

/// [`MediaProbe`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: String,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self {
            binary: "ffprobe".to_string(),
        }
    }
}

impl FfprobeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_probe_duration(json: &str) -> ClipdeckResult<f64> {
    let parsed: ProbeOutput = serde_json::from_str(json)?;
    let raw = parsed
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| ClipdeckError::media("ffprobe reported no duration"))?;
    match raw.trim().parse::<f64>() {
        Ok(d) if d.is_finite() && d > 0.0 => Ok(d),
        _ => Err(ClipdeckError::media(format!("Unusable media duration '{raw}'"))),
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe_duration(&self, url: &str) -> ClipdeckResult<f64> {
        let input = local_path(url)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| url.to_string());

        let output = Command::new(&self.binary)
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "json"])
            .arg(&input)
            .output()
            .await
            .map_err(|e| ClipdeckError::media(format!("Failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(ClipdeckError::media(format!(
                "ffprobe failed for {url}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let duration = parse_probe_duration(&String::from_utf8_lossy(&output.stdout))?;
        tracing::debug!(url, duration, "Probed media duration");
        Ok(duration)
    }
}
