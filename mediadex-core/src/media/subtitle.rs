//! Subtitle parsing and reconstruction for SRT, WebVTT, and ASS dialogue.
//! Parse -> format -> parse round-trips preserve the cue sequence exactly.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CatalogError, Result};

/// One subtitle cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleCue {
    pub index: u32,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

/// Subtitle container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    Srt,
    Vtt,
    Ass,
}

static SRT_CUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^(\d+)\s*\r?\n(\d{2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2})[,.](\d{3})[^\r\n]*\r?\n((?s:.*?))(?:\r?\n\s*\r?\n|\s*\z)",
    )
    .expect("SRT cue regex")
});

static VTT_CUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^(?:(\d+)\s*\r?\n)?(?:(\d{2}):)?(\d{2}):(\d{2})\.(\d{3})\s*-->\s*(?:(\d{2}):)?(\d{2}):(\d{2})\.(\d{3})[^\r\n]*\r?\n((?s:.*?))(?:\r?\n\s*\r?\n|\s*\z)",
    )
    .expect("VTT cue regex")
});

static ASS_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+):(\d{2}):(\d{2})\.(\d{2})$").expect("ASS timestamp regex")
});

/// Parse an SRT document into its cue sequence.
pub fn parse_srt(input: &str) -> Result<Vec<SubtitleCue>> {
    let mut cues = Vec::new();
    for captures in SRT_CUE.captures_iter(input) {
        let index: u32 = captures[1]
            .parse()
            .map_err(|_| CatalogError::InvalidInput("bad SRT cue index".to_string()))?;
        let start = hms_millis(&captures[2], &captures[3], &captures[4], &captures[5])?;
        let end = hms_millis(&captures[6], &captures[7], &captures[8], &captures[9])?;
        let text = captures[10].trim_end().replace("\r\n", "\n");

        cues.push(SubtitleCue { index, start, end, text });
    }

    if cues.is_empty() && !input.trim().is_empty() {
        return Err(CatalogError::InvalidInput(
            "no SRT cues recognized".to_string(),
        ));
    }
    Ok(cues)
}

/// Reconstruct an SRT document, one blank line after every entry.
pub fn format_srt(cues: &[SubtitleCue]) -> String {
    let mut out = String::new();
    for cue in cues {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            cue.index,
            srt_timestamp(cue.start),
            srt_timestamp(cue.end),
            cue.text,
        ));
    }
    out
}

/// Parse a WebVTT document. Numeric cue identifiers are honored; unnumbered
/// cues are indexed sequentially.
pub fn parse_vtt(input: &str) -> Result<Vec<SubtitleCue>> {
    let body = input
        .split_once('\n')
        .filter(|(header, _)| header.trim_start_matches('\u{feff}').starts_with("WEBVTT"))
        .map(|(_, rest)| rest)
        .unwrap_or(input);

    let mut cues = Vec::new();
    for (position, captures) in VTT_CUE.captures_iter(body).enumerate() {
        let index = captures
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(position as u32 + 1);
        let start = hms_millis(
            captures.get(2).map_or("0", |m| m.as_str()),
            &captures[3],
            &captures[4],
            &captures[5],
        )?;
        let end = hms_millis(
            captures.get(6).map_or("0", |m| m.as_str()),
            &captures[7],
            &captures[8],
            &captures[9],
        )?;
        let text = captures[10].trim_end().replace("\r\n", "\n");

        cues.push(SubtitleCue { index, start, end, text });
    }

    if cues.is_empty() && !body.trim().is_empty() {
        return Err(CatalogError::InvalidInput(
            "no VTT cues recognized".to_string(),
        ));
    }
    Ok(cues)
}

/// Reconstruct a WebVTT document.
pub fn format_vtt(cues: &[SubtitleCue]) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for cue in cues {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            cue.index,
            vtt_timestamp(cue.start),
            vtt_timestamp(cue.end),
            cue.text,
        ));
    }
    out
}

/// Parse the `Dialogue:` events of an ASS script. `\N` breaks become
/// newlines; styling fields are dropped.
pub fn parse_ass(input: &str) -> Result<Vec<SubtitleCue>> {
    let mut cues = Vec::new();
    for line in input.lines() {
        let Some(event) = line.trim_start().strip_prefix("Dialogue:") else {
            continue;
        };

        let fields: Vec<&str> = event.splitn(10, ',').collect();
        if fields.len() != 10 {
            return Err(CatalogError::InvalidInput(format!(
                "malformed ASS dialogue line: {line}"
            )));
        }

        let start = ass_time(fields[1].trim())?;
        let end = ass_time(fields[2].trim())?;
        let text = fields[9].replace("\\N", "\n");

        cues.push(SubtitleCue {
            index: cues.len() as u32 + 1,
            start,
            end,
            text,
        });
    }

    Ok(cues)
}

/// Reconstruct a minimal ASS script around the dialogue events.
pub fn format_ass(cues: &[SubtitleCue]) -> String {
    let mut out = String::from(
        "[Script Info]\nScriptType: v4.00+\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n",
    );
    for cue in cues {
        out.push_str(&format!(
            "Dialogue: 0,{},{},Default,,0,0,0,,{}\n",
            ass_timestamp(cue.start),
            ass_timestamp(cue.end),
            cue.text.replace('\n', "\\N"),
        ));
    }
    out
}

/// Estimated subtitle overrun against the video, from a sample of the last
/// cues. Zero means the track ends within the video; a positive value is
/// how far past the end the subtitles keep going.
pub fn measure_sync_offset(cues: &[SubtitleCue], video_duration: Duration) -> Option<Duration> {
    if cues.is_empty() {
        return None;
    }

    let sample = &cues[cues.len().saturating_sub(5)..];
    let overrun = sample
        .iter()
        .map(|cue| cue.end.saturating_sub(video_duration))
        .max()
        .unwrap_or(Duration::ZERO);

    Some(overrun)
}

fn hms_millis(hours: &str, minutes: &str, seconds: &str, millis: &str) -> Result<Duration> {
    let parse = |part: &str| {
        part.parse::<u64>()
            .map_err(|_| CatalogError::InvalidInput(format!("bad timestamp field: {part}")))
    };
    Ok(Duration::from_millis(
        parse(hours)? * 3_600_000 + parse(minutes)? * 60_000 + parse(seconds)? * 1_000
            + parse(millis)?,
    ))
}

fn ass_time(raw: &str) -> Result<Duration> {
    let captures = ASS_TIME
        .captures(raw)
        .ok_or_else(|| CatalogError::InvalidInput(format!("bad ASS timestamp: {raw}")))?;
    let hours: u64 = captures[1].parse().unwrap_or(0);
    let minutes: u64 = captures[2].parse().unwrap_or(0);
    let seconds: u64 = captures[3].parse().unwrap_or(0);
    let centis: u64 = captures[4].parse().unwrap_or(0);

    Ok(Duration::from_millis(
        hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + centis * 10,
    ))
}

fn srt_timestamp(duration: Duration) -> String {
    let total = duration.as_millis();
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total / 3_600_000,
        total / 60_000 % 60,
        total / 1_000 % 60,
        total % 1_000,
    )
}

fn vtt_timestamp(duration: Duration) -> String {
    let total = duration.as_millis();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total / 3_600_000,
        total / 60_000 % 60,
        total / 1_000 % 60,
        total % 1_000,
    )
}

fn ass_timestamp(duration: Duration) -> String {
    let total = duration.as_millis();
    format!(
        "{}:{:02}:{:02}.{:02}",
        total / 3_600_000,
        total / 60_000 % 60,
        total / 1_000 % 60,
        total % 1_000 / 10,
    )
}
