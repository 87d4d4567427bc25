use super::hour::{normalize_hour, Clock24, HourError, Jornada};
use std::fmt;
use time::macros::format_description;
use time::{Duration, PrimitiveDateTime};
use tracing::{info, warn};

/// How long a hearing slot lasts.
pub const HEARING_DURATION: Duration = Duration::hours(1);

const ISO_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// The derived appointment window for a hearing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HearingWindow {
    pub start: PrimitiveDateTime,
    pub end: PrimitiveDateTime,
    pub clock: Clock24,
    /// The jornada after inference; `None` when neither the record nor the
    /// hour text gave one.
    pub jornada: Option<Jornada>,
}

impl HearingWindow {
    pub fn start_iso(&self) -> String {
        format_iso(self.start)
    }

    pub fn end_iso(&self) -> String {
        format_iso(self.end)
    }
}

/// Why no window was derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingDate,
    MissingHour,
    HourNotRecognized(HourError),
    InvalidDate { candidate: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingDate => f.write_str("fecha_conciliacion is empty"),
            SkipReason::MissingHour => f.write_str("hora_conciliacion is empty"),
            SkipReason::HourNotRecognized(e) => write!(f, "hour not recognized: {e}"),
            SkipReason::InvalidDate { candidate } => {
                write!(f, "'{candidate}' is not a valid calendar timestamp")
            }
        }
    }
}

fn format_iso(dt: PrimitiveDateTime) -> String {
    // Formatting a PrimitiveDateTime with this description cannot fail.
    dt.format(ISO_FORMAT).unwrap_or_default()
}

/// Resolve the jornada the way the form is usually filled in: a valid
/// `AM`/`PM` wins, otherwise guess from the hour text.
pub fn resolve_jornada(hora_text: &str, jornada: &str) -> Option<Jornada> {
    if let Some(j) = Jornada::parse(jornada) {
        return Some(j);
    }
    let inferred = Jornada::infer(hora_text);
    match inferred {
        Some(j) => info!(jornada = %j, hora = %hora_text, "Jornada inferred from hour"),
        None => warn!(jornada = %jornada, hora = %hora_text, "Could not infer jornada"),
    }
    inferred
}

/// Build the hearing window from the date, hour text and jornada exactly
/// as they came out of the document.
pub fn assemble(date: &str, hora_text: &str, jornada: &str) -> Result<HearingWindow, SkipReason> {
    let date = date.trim();
    let hora_text = hora_text.trim();
    if date.is_empty() {
        return Err(SkipReason::MissingDate);
    }
    if hora_text.is_empty() {
        return Err(SkipReason::MissingHour);
    }

    let resolved = resolve_jornada(hora_text, jornada);
    let jornada_for_clock = resolved.map(Jornada::as_str).unwrap_or(jornada);
    let clock = normalize_hour(hora_text, jornada_for_clock).map_err(SkipReason::HourNotRecognized)?;

    let candidate = format!("{date}T{clock}:00");
    let start = PrimitiveDateTime::parse(&candidate, ISO_FORMAT)
        .map_err(|_| SkipReason::InvalidDate { candidate })?;
    let end = start + HEARING_DURATION;

    Ok(HearingWindow {
        start,
        end,
        clock,
        jornada: resolved,
    })
}

/// Parse a `YYYY-MM-DDTHH:MM:SS` timestamp as written into a record.
pub fn parse_iso(text: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(text.trim(), ISO_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(date: &str, hora: &str, jornada: &str) -> (String, String) {
        let w = assemble(date, hora, jornada).unwrap();
        (w.start_iso(), w.end_iso())
    }

    #[test]
    fn test_morning_slot() {
        assert_eq!(
            window("2024-03-15", "10:00", "AM"),
            ("2024-03-15T10:00:00".into(), "2024-03-15T11:00:00".into())
        );
    }

    #[test]
    fn test_afternoon_slot() {
        assert_eq!(
            window("2024-03-15", "2:30", "PM"),
            ("2024-03-15T14:30:00".into(), "2024-03-15T15:30:00".into())
        );
    }

    #[test]
    fn test_jornada_inferred_from_24h_hour() {
        let w = assemble("2024-03-15", "14:30", "").unwrap();
        assert_eq!(w.jornada, Some(Jornada::Pm));
        assert_eq!(w.start_iso(), "2024-03-15T14:30:00");
        assert_eq!(w.end_iso(), "2024-03-15T15:30:00");
    }

    #[test]
    fn test_end_rolls_over_midnight() {
        assert_eq!(
            window("2024-12-31", "11:30", "PM"),
            ("2024-12-31T23:30:00".into(), "2025-01-01T00:30:00".into())
        );
    }

    #[test]
    fn test_skips() {
        assert_eq!(assemble("", "10:00", "AM"), Err(SkipReason::MissingDate));
        assert_eq!(assemble("2024-03-15", " ", "AM"), Err(SkipReason::MissingHour));
        assert!(matches!(
            assemble("2024-03-15", "25:99", "AM"),
            Err(SkipReason::HourNotRecognized(_))
        ));
        assert!(matches!(
            assemble("2024-03-32", "10:00", "AM"),
            Err(SkipReason::InvalidDate { .. })
        ));
        assert!(matches!(
            assemble("01/06/2025", "09:00", "AM"),
            Err(SkipReason::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_uninferable_jornada_keeps_hour() {
        let w = assemble("2024-03-15", "3.15", "").unwrap();
        assert_eq!(w.jornada, None);
        assert_eq!(w.start_iso(), "2024-03-15T03:15:00");
    }

    #[test]
    fn test_parse_iso() {
        let dt = parse_iso("2024-03-15T10:00:00").unwrap();
        assert_eq!(format_iso(dt + HEARING_DURATION), "2024-03-15T11:00:00");
        assert!(parse_iso("2024-03-15 10:00").is_none());
    }
}
