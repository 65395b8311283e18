//! crates/doomlearn_core/src/captions.rs
//!
//! Narration lines and WebVTT caption tracks for generated reels.

use std::time::Duration;

use crate::domain::ReelScript;

/// Every narration line is shown for this long.
pub const CUE_DURATION: Duration = Duration::from_secs(3);

const HEADER: &str = "WEBVTT";

/// Flattens a script into narration lines: hook, each step, then the call-to-action.
/// Blank entries are skipped.
pub fn narration_lines(script: &ReelScript) -> Vec<String> {
    script
        .hook
        .iter()
        .chain(script.steps.iter())
        .chain(script.cta.iter())
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Renders one cue per line, laid out back to back from time zero.
pub fn render_vtt<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::from(HEADER);
    out.push_str("\n\n");

    let mut start = Duration::ZERO;
    for line in lines {
        let end = start + CUE_DURATION;
        out.push_str(&format!(
            "{} --> {}\n{}\n\n",
            timestamp(start),
            timestamp(end),
            line.as_ref().trim()
        ));
        start = end;
    }
    out
}

/// `HH:MM:SS.mmm`, zero padded.
pub fn timestamp(at: Duration) -> String {
    let millis = at.as_millis();
    let (hours, rest) = (millis / 3_600_000, millis % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (seconds, millis) = (rest / 1000, rest % 1000);
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}
