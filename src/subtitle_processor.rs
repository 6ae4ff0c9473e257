use std::fmt;
use regex::Regex;
use once_cell::sync::Lazy;
use log::{warn, debug};

use crate::errors::SubtitleError;

// @module: SRT parsing, formatting and track handling

// @const: SRT timestamp regex
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{3})").unwrap()
});

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

// @struct: Single subtitle entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    // @field: Sequence number
    pub seq_num: usize,

    // @field: Start time in ms
    pub start_time_ms: u64,

    // @field: End time in ms
    pub end_time_ms: u64,

    // @field: Subtitle text
    pub text: String,
}

impl SubtitleEntry {
    pub fn new(seq_num: usize, start_time_ms: u64, end_time_ms: u64, text: impl Into<String>) -> Self {
        SubtitleEntry {
            seq_num,
            start_time_ms,
            end_time_ms,
            text: text.into(),
        }
    }

    // @creates: Validated subtitle entry
    // @validates: Time range and non-empty text
    pub fn new_validated(seq_num: usize, start_time_ms: u64, end_time_ms: u64, text: &str) -> Result<Self, SubtitleError> {
        if end_time_ms <= start_time_ms {
            return Err(SubtitleError::ParseError(format!(
                "Invalid time range in entry {}: end time {} <= start time {}",
                seq_num, end_time_ms, start_time_ms
            )));
        }

        let trimmed_text = text.trim();
        if trimmed_text.is_empty() {
            return Err(SubtitleError::ParseError(format!("Empty subtitle text for entry {}", seq_num)));
        }

        Ok(SubtitleEntry::new(seq_num, start_time_ms, end_time_ms, trimmed_text))
    }

    /// Parse an SRT timestamp (HH:MM:SS,mmm) to milliseconds
    pub fn parse_timestamp(timestamp: &str) -> Result<u64, SubtitleError> {
        let parts: Vec<&str> = timestamp.trim().split(&[':', ',', '.'][..]).collect();

        if parts.len() != 4 {
            return Err(SubtitleError::ParseError(format!("Invalid timestamp format: {}", timestamp)));
        }

        let mut values = [0u64; 4];
        for (slot, part) in values.iter_mut().zip(parts.iter()) {
            *slot = part
                .parse()
                .map_err(|_| SubtitleError::ParseError(format!("Invalid timestamp component in {}", timestamp)))?;
        }
        let [hours, minutes, seconds, millis] = values;

        if minutes >= 60 || seconds >= 60 || millis >= 1000 {
            return Err(SubtitleError::ParseError(format!("Invalid time components in timestamp: {}", timestamp)));
        }

        Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_time_ms.saturating_sub(self.start_time_ms)
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.seq_num)?;
        writeln!(
            f,
            "{} --> {}",
            Self::format_timestamp(self.start_time_ms),
            Self::format_timestamp(self.end_time_ms)
        )?;
        writeln!(f, "{}", self.text)?;
        writeln!(f)
    }
}

/// An ordered, renumbered subtitle track
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleTrack {
    pub entries: Vec<SubtitleEntry>,
}

impl SubtitleTrack {
    pub fn new(entries: Vec<SubtitleEntry>) -> Self {
        Self { entries }
    }

    /// Parse SRT text into a track. A track without a single valid entry
    /// is an error, never an empty success.
    pub fn parse(content: &str) -> Result<Self, SubtitleError> {
        let entries = parse_srt_string(content)?;
        Ok(Self { entries })
    }

    /// Parse raw downloaded bytes: strips a UTF-8 BOM and falls back to a
    /// lossy decode for legacy encodings.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SubtitleError> {
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let text = match std::str::from_utf8(body) {
            Ok(text) => std::borrow::Cow::Borrowed(text),
            Err(_) => {
                debug!("Subtitle is not valid UTF-8, decoding lossily");
                String::from_utf8_lossy(body)
            }
        };
        Self::parse(&text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total characters of subtitle text, used for cost projection
    pub fn total_chars(&self) -> usize {
        self.entries.iter().map(|e| e.text.chars().count()).sum()
    }

    pub fn to_srt_string(&self) -> String {
        self.to_string()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_srt_string().into_bytes()
    }
}

impl fmt::Display for SubtitleTrack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for entry in &self.entries {
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// Parse SRT format string into subtitle entries, sorted by start time and
/// renumbered from 1
pub fn parse_srt_string(content: &str) -> Result<Vec<SubtitleEntry>, SubtitleError> {
    let mut entries = Vec::new();

    let mut current_seq_num: Option<usize> = None;
    let mut current_times: Option<(u64, u64)> = None;
    let mut current_text = String::new();

    let mut flush = |seq_num: usize, (start_ms, end_ms): (u64, u64), text: &str| {
        match SubtitleEntry::new_validated(seq_num, start_ms, end_ms, text) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("Skipping invalid subtitle entry {}: {}", seq_num, e),
        }
    };

    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim().trim_start_matches('\u{feff}');

        if trimmed.is_empty() {
            if let (Some(seq_num), Some(times)) = (current_seq_num, current_times) {
                if !current_text.is_empty() {
                    flush(seq_num, times, &current_text);
                    current_seq_num = None;
                    current_times = None;
                    current_text.clear();
                }
            }
            continue;
        }

        if current_seq_num.is_none() && current_text.is_empty() {
            if let Ok(num) = trimmed.parse::<usize>() {
                current_seq_num = Some(num);
                continue;
            }
        }

        if current_seq_num.is_some() && current_times.is_none() {
            if let Some(caps) = TIMESTAMP_REGEX.captures(trimmed) {
                current_times = Some((timestamp_from_captures(&caps, 1), timestamp_from_captures(&caps, 5)));
                continue;
            }
        }

        if current_times.is_some() {
            if !current_text.is_empty() {
                current_text.push('\n');
            }
            current_text.push_str(trimmed);
        } else {
            warn!("Unexpected text at line {} before sequence number or timestamp: {}", line_no + 1, trimmed);
        }
    }

    if let (Some(seq_num), Some(times)) = (current_seq_num, current_times) {
        if !current_text.is_empty() {
            flush(seq_num, times, &current_text);
        }
    }

    if entries.is_empty() {
        return Err(SubtitleError::EmptyTrack);
    }

    entries.sort_by_key(|entry| entry.start_time_ms);
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.seq_num = i + 1;
    }

    Ok(entries)
}

fn timestamp_from_captures(caps: &regex::Captures, start_idx: usize) -> u64 {
    let part = |offset: usize| -> u64 {
        caps.get(start_idx + offset)
            .map_or(0, |m| m.as_str().parse().unwrap_or(0))
    };
    (part(0) * 3600 + part(1) * 60 + part(2)) * 1000 + part(3)
}
