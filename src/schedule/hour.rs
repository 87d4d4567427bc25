use regex::Regex;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Morning or afternoon half of a 12-hour clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jornada {
    Am,
    Pm,
}

impl Jornada {
    /// Accepts exactly `AM` or `PM`, ignoring case and surrounding whitespace.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "AM" => Some(Jornada::Am),
            "PM" => Some(Jornada::Pm),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Jornada::Am => "AM",
            Jornada::Pm => "PM",
        }
    }

    /// Guess the jornada from the leading hour of `hora_text`.
    ///
    /// Only the text before the first `:` is considered and it must be a
    /// plain integer, so `"14:30"` gives `PM`, `"9"` gives `AM`, and
    /// `"2.30"` or `"a las 3"` give nothing.
    pub fn infer(hora_text: &str) -> Option<Self> {
        let lead = hora_text.split(':').next()?.trim();
        let hour: u32 = lead.parse().ok()?;
        Some(if hour >= 12 { Jornada::Pm } else { Jornada::Am })
    }
}

impl fmt::Display for Jornada {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated 24-hour wall clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock24 {
    pub hour: u8,
    pub minute: u8,
}

impl fmt::Display for Clock24 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HourError {
    #[error("no hour found in '{0}'")]
    NoDigits(String),
    #[error("hour out of range: {hour}:{minute:02} (from '{input}')")]
    OutOfRange { input: String, hour: u32, minute: u32 },
}

fn in_24h_range(hour: u32, minute: u32) -> bool {
    hour <= 23 && minute <= 59
}

/// Pull the first `H:MM` (or bare `H`) out of free text. `.` counts as `:`.
fn find_hour_minute(text: &str) -> Option<(u32, u32)> {
    let clean = text.trim().replace('.', ":");

    let hh_mm = Regex::new(r"(\d{1,2}):(\d{2})").ok()?;
    if let Some(cap) = hh_mm.captures(&clean) {
        return Some((cap[1].parse().ok()?, cap[2].parse().ok()?));
    }

    let hh = Regex::new(r"(\d{1,2})").ok()?;
    let cap = hh.captures(&clean)?;
    Some((cap[1].parse().ok()?, 0))
}

/// Convert an hour as written on the form plus its jornada into a 24-hour
/// clock time.
///
/// Hours above 12 are taken as already 24-hour and the jornada is
/// ignored. An unrecognised jornada leaves the hour as written.
pub fn normalize_hour(hora_text: &str, jornada: &str) -> Result<Clock24, HourError> {
    let Some((mut hour, minute)) = find_hour_minute(hora_text) else {
        warn!(hora = %hora_text, "No hour found in text");
        return Err(HourError::NoDigits(hora_text.to_string()));
    };
    let out_of_range = |hour, minute| HourError::OutOfRange {
        input: hora_text.to_string(),
        hour,
        minute,
    };

    if hour > 12 {
        if !in_24h_range(hour, minute) {
            warn!(hour, minute, "24h hour out of range");
            return Err(out_of_range(hour, minute));
        }
        debug!(hour, minute, "Hour already in 24h format");
        return Ok(Clock24 {
            hour: hour as u8,
            minute: minute as u8,
        });
    }

    if !(1..=12).contains(&hour) || minute > 59 {
        if in_24h_range(hour, minute) {
            info!(hour, minute, "Hour outside 12h range, reading it as 24h");
            return Ok(Clock24 {
                hour: hour as u8,
                minute: minute as u8,
            });
        }
        warn!(hour, minute, "Hour out of range");
        return Err(out_of_range(hour, minute));
    }

    match Jornada::parse(jornada) {
        Some(Jornada::Pm) if hour != 12 => hour += 12,
        Some(Jornada::Am) if hour == 12 => hour = 0,
        Some(_) => {}
        None => {
            warn!(jornada = %jornada, hour, "Unrecognised jornada, keeping hour as written");
        }
    }

    if !in_24h_range(hour, minute) {
        return Err(out_of_range(hour, minute));
    }

    let clock = Clock24 {
        hour: hour as u8,
        minute: minute as u8,
    };
    debug!(hora = %hora_text, jornada = %jornada, result = %clock, "Hour normalized");
    Ok(clock)
}
