use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use sop_verify::core_modules::source::{HandLandmark, LandmarkFrame};
use std::io::BufRead;
use std::time::Duration;
use tracing::warn;

/// One line of a recording: the landmark estimator's output for a single frame.
///
/// `{"t": 0.033, "hands": [{"x": 0.15, "y": 0.21}]}`, coordinates relative to the frame.
#[derive(Debug, Deserialize)]
struct FrameRecord {
    /// Seconds since the start of the recording.
    t: f64,
    #[serde(default)]
    hands: Vec<HandLandmark>,
}

impl FrameRecord {
    fn into_frame(self) -> Result<LandmarkFrame> {
        let timestamp = Duration::try_from_secs_f64(self.t).map_err(|e| anyhow!("bad timestamp {}: {}", self.t, e))?;
        Ok(LandmarkFrame::new(timestamp, self.hands))
    }
}

fn parse_line(line: &str) -> Result<LandmarkFrame> {
    serde_json::from_str::<FrameRecord>(line)
        .context("malformed frame record")?
        .into_frame()
}

/// Reads a JSON-lines recording. Blank lines and `#` comments are skipped; malformed
/// records are logged and dropped so one bad line does not end the replay.
pub fn read_frames(reader: impl BufRead) -> Result<Vec<LandmarkFrame>> {
    let mut frames = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line.context("failed to read recording")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Ok(frame) => frames.push(frame),
            Err(e) => warn!(line = number + 1, "skipping record: {:#}", e),
        }
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_frames_and_skips_noise() {
        let recording = r#"
# reference station, one full cycle
{"t": 0.0, "hands": [{"x": 0.15, "y": 0.2}]}
{"t": 0.04}
not json
{"t": -1.0, "hands": []}
{"t": 0.08, "hands": [{"x": 0.15, "y": 0.8}, {"x": 0.6, "y": 0.2}]}
"#;
        let frames = read_frames(Cursor::new(recording)).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].hands, vec![HandLandmark::new(0.15, 0.2)]);
        assert!(frames[1].hands.is_empty());
        assert_eq!(frames[2].timestamp, Duration::from_millis(80));
        assert_eq!(frames[2].hands.len(), 2);
    }
}
