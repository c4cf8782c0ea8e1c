//! Shifting of subtitle cue timestamps.
//!
//! Cue lines carry their start and end times in comma fields 1 and 2
//! (`Dialogue: 0,0:00:02.00,0:00:04.00,Default,,0,0,0,,text`). Every other line,
//! including the style header, is passed through untouched.

use regex::Regex;
use std::sync::OnceLock;

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+):(\d{1,2}):(\d{1,2})(?:\.(\d+))?\s*$").unwrap())
}

/// Parses `H:MM:SS.ss` into hundredths of a second. Hour values too large
/// to represent are rejected.
pub fn parse_centis(ts: &str) -> Option<u64> {
    let caps = timestamp_re().captures(ts)?;
    let hours: u64 = caps[1].parse().ok()?;
    let minutes: u64 = caps[2].parse().ok()?;
    let seconds: u64 = caps[3].parse().ok()?;
    let centis = match caps.get(4) {
        Some(frac) => {
            // Pad or cut the fraction to two digits, rounding on the third.
            let digits = frac.as_str();
            let mut padded = format!("{:0<3}", digits);
            padded.truncate(3);
            let thousandths: u64 = padded.parse().ok()?;
            (thousandths + 5) / 10
        }
        None => 0,
    };
    let total = hours
        .checked_mul(60)?
        .checked_add(minutes)?
        .checked_mul(60)?
        .checked_add(seconds)?
        .checked_mul(100)?
        .checked_add(centis)?;
    i64::try_from(total).ok()?;
    Some(total)
}

/// Formats hundredths of a second as `HH:MM:SS.ss`.
pub fn format_centis(total: u64) -> String {
    let centis = total % 100;
    let total_secs = total / 100;
    let s = total_secs % 60;
    let total_min = total_secs / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{:02}:{:02}:{:02}.{:02}", h, m, s, centis)
}

fn offset_centis(offset_secs: f64) -> i64 {
    (offset_secs * 100.0).round() as i64
}

fn shift_centis(centis: u64, offset: i64) -> u64 {
    (centis as i64).saturating_add(offset).max(0) as u64
}

/// Shifts one timestamp by `offset_secs`. Returns `None` if `ts` is not a timestamp.
pub fn shift(ts: &str, offset_secs: f64) -> Option<String> {
    let centis = parse_centis(ts)?;
    Some(format_centis(shift_centis(centis, offset_centis(offset_secs))))
}

/// Shifts the start and end of every cue line in `contents` by `offset_secs`.
pub fn adjust(contents: &str, offset_secs: f64) -> String {
    let offset = offset_centis(offset_secs);
    contents
        .split('\n')
        .map(|line| adjust_line(line, offset).unwrap_or_else(|| line.to_string()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn adjust_line(line: &str, offset: i64) -> Option<String> {
    let mut fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 3 {
        return None;
    }
    let start = format_centis(shift_centis(parse_centis(fields[1])?, offset));
    let end = format_centis(shift_centis(parse_centis(fields[2])?, offset));
    fields[1] = &start;
    fields[2] = &end;
    Some(fields.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "[Script Info]\nScriptType: v4.00+\n\n[V4+ Styles]\nFormat: Name, Fontname, Fontsize\nStyle: Default,Arial,20\n\n[Events]\nFormat: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\nDialogue: 0,0:00:01.20,0:00:01.90,Default,,0,0,0,,Hello, world\nDialogue: 0,0:00:58.75,0:01:02.10,Default,,0,0,0,,again\n";

    #[test]
    fn oversized_hours_leave_the_line_untouched() {
        let line = "Dialogue: 0,99999999999999999:00:00.00,99999999999999999:00:01.00,Default,,0,0,0,,x\n";
        assert_eq!(parse_centis("99999999999999999:00:00.00"), None);
        assert_eq!(adjust(line, 1.0), line);
    }

    #[test]
    fn carries_seconds_into_minutes() {
        assert_eq!(shift("00:00:59.50", 1.0).unwrap(), "00:01:00.50");
    }

    #[test]
    fn carries_minutes_into_hours() {
        assert_eq!(shift("00:59:59.99", 0.02).unwrap(), "01:00:00.01");
    }

    #[test]
    fn hours_are_unbounded() {
        assert_eq!(shift("99:59:59.00", 1.0).unwrap(), "100:00:00.00");
    }

    #[test]
    fn zero_offset_keeps_cue_lines() {
        let line = "Dialogue: 0,00:00:02.00,00:00:04.00,Default,,0,0,0,,text";
        assert_eq!(adjust(line, 0.0), line);
    }

    #[test]
    fn non_cue_lines_pass_through() {
        let text = "Style: Default,Arial,20\nFormat: Layer, Start, End\njust text\na,b\n; comment\n";
        assert_eq!(adjust(text, 12.5), text);
    }

    #[test]
    fn shifts_only_the_timestamp_fields() {
        let out = adjust(SAMPLE, 3.0);
        assert!(out.contains("Dialogue: 0,00:00:04.20,00:00:04.90,Default,,0,0,0,,Hello, world"));
        assert!(out.contains("Dialogue: 0,00:01:01.75,00:01:05.10,Default,,0,0,0,,again"));
        assert!(out.contains("Style: Default,Arial,20"));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn composition_matches_single_shift() {
        assert_eq!(adjust(&adjust(SAMPLE, 5.0), 10.0), adjust(SAMPLE, 15.0));
    }

    #[test]
    fn shifted_times_never_move_backwards() {
        for ts in ["0:00:00.00", "0:00:00.01", "0:12:34.56", "3:59:59.99"] {
            let before = parse_centis(ts).unwrap();
            let after = parse_centis(&shift(ts, 0.37).unwrap()).unwrap();
            assert!(after >= before);
        }
    }

    #[test]
    fn cue_lands_after_title_audio() {
        let cue = "Dialogue: 0,00:00:02.00,00:00:04.00,Default,,0,0,0,,Once";
        assert_eq!(
            adjust(cue, 3.0),
            "Dialogue: 0,00:00:05.00,00:00:07.00,Default,,0,0,0,,Once"
        );
    }

    #[test]
    fn crlf_endings_survive() {
        let text = "Dialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,hi\r\n";
        assert_eq!(adjust(text, 1.0), "Dialogue: 0,00:00:02.00,00:00:03.00,Default,,0,0,0,,hi\r\n");
    }

    #[test]
    fn negative_offsets_clamp_at_zero() {
        assert_eq!(shift("00:00:01.00", -5.0).unwrap(), "00:00:00.00");
    }

    #[test]
    fn rejects_non_timestamps() {
        assert!(shift("Arial", 1.0).is_none());
        assert!(shift(" Start", 1.0).is_none());
        assert!(shift("00:00", 1.0).is_none());
    }
}
