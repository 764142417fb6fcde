//! SRT / WebVTT subtitle codec.
//!
//! Format detection sniffs the content itself (WEBVTT header, or an SRT-style
//! index + `-->` timing line) and never trusts file extensions. Cues keep
//! their timing in integer milliseconds, so converting between the two
//! formats preserves cue count and timing values exactly.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    Srt,
    Vtt,
}

impl SubtitleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SubtitleFormat::Srt => "srt",
            SubtitleFormat::Vtt => "vtt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubtitleError {
    #[error("unrecognized subtitle format")]
    UnknownFormat,
    #[error("missing WEBVTT header")]
    MissingHeader,
    #[error("malformed timing line `{0}`")]
    BadTiming(String),
    #[error("subtitle file contains no cues")]
    Empty,
}

/// Detect the format from content structure alone.
pub fn sniff(input: &str) -> Result<SubtitleFormat, SubtitleError> {
    let body = normalize(input);
    let trimmed = body.trim_start();
    if trimmed.starts_with("WEBVTT") {
        return Ok(SubtitleFormat::Vtt);
    }
    let mut lines = trimmed.lines().filter(|l| !l.trim().is_empty());
    if let Some(first) = lines.next() {
        let srt_shaped = first.trim().parse::<u64>().is_ok() || first.contains("-->");
        if srt_shaped && (first.contains("-->") || lines.any(|l| l.contains("-->"))) {
            return Ok(SubtitleFormat::Srt);
        }
    }
    Err(SubtitleError::UnknownFormat)
}

/// Sniff and parse in one step.
pub fn parse(input: &str) -> Result<(SubtitleFormat, Vec<Cue>), SubtitleError> {
    let format = sniff(input)?;
    let cues = match format {
        SubtitleFormat::Srt => parse_srt(input)?,
        SubtitleFormat::Vtt => parse_vtt(input)?,
    };
    Ok((format, cues))
}

pub fn parse_srt(input: &str) -> Result<Vec<Cue>, SubtitleError> {
    let body = normalize(input);
    let mut cues = Vec::new();

    for block in body.split("\n\n") {
        let lines: Vec<&str> = block.lines().skip_while(|l| l.trim().is_empty()).collect();
        if lines.is_empty() {
            continue;
        }
        // Optional numeric index line.
        let mut idx = 0;
        if lines[0].trim().parse::<u64>().is_ok() {
            idx = 1;
        }
        let timing = lines
            .get(idx)
            .ok_or_else(|| SubtitleError::BadTiming(lines[0].to_string()))?;
        let (start_ms, end_ms) = parse_timing_line(timing)?;
        let text = lines[idx + 1..].join("\n");
        cues.push(Cue {
            start_ms,
            end_ms,
            text,
        });
    }

    if cues.is_empty() {
        return Err(SubtitleError::Empty);
    }
    Ok(cues)
}

pub fn parse_vtt(input: &str) -> Result<Vec<Cue>, SubtitleError> {
    let body = normalize(input);
    let mut blocks = body.split("\n\n");

    let header = blocks.next().unwrap_or_default();
    if !header.trim_start().starts_with("WEBVTT") {
        return Err(SubtitleError::MissingHeader);
    }

    let mut cues = Vec::new();
    for block in blocks {
        let lines: Vec<&str> = block.lines().skip_while(|l| l.trim().is_empty()).collect();
        if lines.is_empty() {
            continue;
        }
        // NOTE / STYLE / REGION blocks carry no cues.
        let first = lines[0].trim_start();
        if first.starts_with("NOTE") || first.starts_with("STYLE") || first.starts_with("REGION") {
            continue;
        }
        // Optional cue identifier line.
        let mut idx = 0;
        if !lines[0].contains("-->") {
            idx = 1;
        }
        let timing = lines
            .get(idx)
            .ok_or_else(|| SubtitleError::BadTiming(lines[0].to_string()))?;
        let (start_ms, end_ms) = parse_timing_line(timing)?;
        let text = lines[idx + 1..].join("\n");
        cues.push(Cue {
            start_ms,
            end_ms,
            text,
        });
    }

    if cues.is_empty() {
        return Err(SubtitleError::Empty);
    }
    Ok(cues)
}

pub fn to_srt(cues: &[Cue]) -> String {
    let blocks: Vec<String> = cues
        .iter()
        .enumerate()
        .map(|(i, cue)| {
            format!(
                "{}\n{} --> {}\n{}",
                i + 1,
                format_timestamp(cue.start_ms, ','),
                format_timestamp(cue.end_ms, ','),
                cue.text
            )
        })
        .collect();
    format!("{}\n", blocks.join("\n\n"))
}

pub fn to_vtt(cues: &[Cue]) -> String {
    let blocks: Vec<String> = cues
        .iter()
        .map(|cue| {
            format!(
                "{} --> {}\n{}",
                format_timestamp(cue.start_ms, '.'),
                format_timestamp(cue.end_ms, '.'),
                cue.text
            )
        })
        .collect();
    format!("WEBVTT\n\n{}\n", blocks.join("\n\n"))
}

/// Parse any supported input and render it in `target` format.
pub fn convert(input: &str, target: SubtitleFormat) -> Result<String, SubtitleError> {
    let (_, cues) = parse(input)?;
    Ok(match target {
        SubtitleFormat::Srt => to_srt(&cues),
        SubtitleFormat::Vtt => to_vtt(&cues),
    })
}

fn normalize(input: &str) -> String {
    input.trim_start_matches('\u{feff}').replace("\r\n", "\n")
}

fn parse_timing_line(line: &str) -> Result<(u64, u64), SubtitleError> {
    let bad = || SubtitleError::BadTiming(line.trim().to_string());
    let (start, rest) = line.split_once("-->").ok_or_else(bad)?;
    // VTT allows cue settings after the end timestamp.
    let end = rest.split_whitespace().next().ok_or_else(bad)?;
    let start_ms = parse_timestamp(start.trim()).ok_or_else(bad)?;
    let end_ms = parse_timestamp(end.trim()).ok_or_else(bad)?;
    Ok((start_ms, end_ms))
}

/// `HH:MM:SS.mmm`, `MM:SS.mmm`, comma or dot before the milliseconds.
fn parse_timestamp(s: &str) -> Option<u64> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    let (sec_str, ms_str) = parts
        .last()?
        .split_once(',')
        .or_else(|| parts.last().and_then(|p| p.split_once('.')))?;
    if ms_str.len() != 3 || !ms_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut units: Vec<u64> = Vec::with_capacity(3);
    for p in &parts[..parts.len() - 1] {
        units.push(p.trim().parse().ok()?);
    }
    let secs: u64 = sec_str.parse().ok()?;
    let ms: u64 = ms_str.parse().ok()?;

    let (hours, minutes) = match units.as_slice() {
        [m] => (0, *m),
        [h, m] => (*h, *m),
        _ => return None,
    };
    Some(((hours * 60 + minutes) * 60 + secs) * 1000 + ms)
}

fn format_timestamp(ms: u64, sep: char) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let secs = (ms % 60_000) / 1000;
    let frac = ms % 1000;
    format!("{hours:02}:{minutes:02}:{secs:02}{sep}{frac:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRT: &str = "1\n00:00:01,000 --> 00:00:04,250\nWear your helmet.\n\n2\n00:00:05,500 --> 00:00:09,999\nKeep clear of the crane\nat all times.\n";

    const VTT: &str = "WEBVTT - safety course\nKind: captions\n\nNOTE generated upstream\n\nintro\n00:01.000 --> 00:04.250 align:start\nWear your helmet.\n\n00:00:05.500 --> 00:00:09.999\nKeep clear of the crane\nat all times.\n";

    #[test]
    fn sniffs_srt_by_structure() {
        assert_eq!(sniff(SRT).unwrap(), SubtitleFormat::Srt);
    }

    #[test]
    fn sniffs_vtt_by_header_with_bom() {
        let input = format!("\u{feff}{VTT}");
        assert_eq!(sniff(&input).unwrap(), SubtitleFormat::Vtt);
    }

    #[test]
    fn rejects_plain_text() {
        assert_eq!(sniff("hello there\n"), Err(SubtitleError::UnknownFormat));
    }

    #[test]
    fn parses_srt_cues_and_timing() {
        let cues = parse_srt(SRT).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start_ms, 1_000);
        assert_eq!(cues[0].end_ms, 4_250);
        assert_eq!(cues[0].text, "Wear your helmet.");
        assert_eq!(cues[1].end_ms, 9_999);
        assert_eq!(cues[1].text, "Keep clear of the crane\nat all times.");
    }

    #[test]
    fn srt_tolerates_dot_millisecond_separator() {
        let input = "1\n00:00:01.000 --> 00:00:02.000\nhi\n";
        let cues = parse_srt(input).unwrap();
        assert_eq!(cues[0].start_ms, 1_000);
        assert_eq!(cues[0].end_ms, 2_000);
    }

    #[test]
    fn parses_vtt_with_metadata_ids_and_notes() {
        let cues = parse_vtt(VTT).unwrap();
        assert_eq!(cues.len(), 2);
        // MM:SS.mmm form, plus cue settings after the end timestamp.
        assert_eq!(cues[0].start_ms, 1_000);
        assert_eq!(cues[0].end_ms, 4_250);
        assert_eq!(cues[1].start_ms, 5_500);
    }

    #[test]
    fn vtt_requires_header() {
        let input = "00:01.000 --> 00:04.000\nhi\n";
        assert_eq!(parse_vtt(input), Err(SubtitleError::MissingHeader));
    }

    #[test]
    fn srt_to_vtt_round_trip_preserves_count_and_timing() {
        let original = parse_srt(SRT).unwrap();
        let vtt = convert(SRT, SubtitleFormat::Vtt).unwrap();
        let back = convert(&vtt, SubtitleFormat::Srt).unwrap();
        let round_tripped = parse_srt(&back).unwrap();

        assert_eq!(round_tripped.len(), original.len());
        for (a, b) in original.iter().zip(&round_tripped) {
            assert_eq!(a.start_ms, b.start_ms);
            assert_eq!(a.end_ms, b.end_ms);
            assert_eq!(a.text, b.text);
        }
    }

    #[test]
    fn vtt_to_srt_round_trip_preserves_count_and_timing() {
        let original = parse_vtt(VTT).unwrap();
        let srt = convert(VTT, SubtitleFormat::Srt).unwrap();
        let back = convert(&srt, SubtitleFormat::Vtt).unwrap();
        let round_tripped = parse_vtt(&back).unwrap();

        assert_eq!(round_tripped.len(), original.len());
        for (a, b) in original.iter().zip(&round_tripped) {
            assert_eq!(a.start_ms, b.start_ms);
            assert_eq!(a.end_ms, b.end_ms);
        }
    }

    #[test]
    fn timestamps_render_with_hours() {
        let cue = Cue {
            start_ms: 3_661_001,
            end_ms: 3_662_002,
            text: "late cue".into(),
        };
        let srt = to_srt(std::slice::from_ref(&cue));
        assert!(srt.contains("01:01:01,001 --> 01:01:02,002"));
        let vtt = to_vtt(std::slice::from_ref(&cue));
        assert!(vtt.contains("01:01:01.001 --> 01:01:02.002"));
    }

    #[test]
    fn malformed_timing_is_an_error() {
        let input = "1\n00:00:01,000 -> 00:00:04,000\nhi\n";
        assert!(matches!(
            parse_srt(input),
            Err(SubtitleError::BadTiming(_))
        ));
        let bad_ms = "1\n00:00:01,00 --> 00:00:04,000\nhi\n";
        assert!(matches!(
            parse_srt(bad_ms),
            Err(SubtitleError::BadTiming(_))
        ));
    }

    #[test]
    fn empty_input_has_no_cues() {
        assert_eq!(parse_srt("\n\n"), Err(SubtitleError::Empty));
    }

    #[test]
    fn crlf_input_parses_identically() {
        let crlf = SRT.replace('\n', "\r\n");
        assert_eq!(parse_srt(&crlf).unwrap(), parse_srt(SRT).unwrap());
    }
}
