// src/schedule/mod.rs

mod hour;
mod window;

pub use hour::{normalize_hour, Clock24, HourError, Jornada};
pub use window::{assemble, HearingWindow, SkipReason, HEARING_DURATION};

use crate::record::{non_empty, ExtractedRecord};
use tracing::{info, warn};

/// Result of deriving `fecha_inicio`/`fecha_fin` for a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled(HearingWindow),
    Skipped(SkipReason),
}

/// Derive the hearing window and write it into the record.
///
/// On success `fecha_inicio`, `fecha_fin` and the resolved `jornada` are
/// written. On skip the date/time fields are left as the model returned
/// them; only an inconsistent `fecha_inicio`/`fecha_fin` pair is dropped.
pub fn apply_schedule(record: &mut ExtractedRecord) -> ScheduleOutcome {
    info!(
        fecha = ?record.fecha_conciliacion,
        hora = ?record.hora_conciliacion,
        jornada = ?record.jornada,
        "Processing hearing date/time"
    );

    let date = non_empty(&record.fecha_conciliacion).unwrap_or_default();
    let hora = non_empty(&record.hora_conciliacion).unwrap_or_default();
    let jornada = record.jornada.as_deref().unwrap_or_default();

    match assemble(date, hora, jornada) {
        Ok(window) => {
            record.fecha_inicio = Some(window.start_iso());
            record.fecha_fin = Some(window.end_iso());
            if let Some(j) = window.jornada {
                record.jornada = Some(j.as_str().to_string());
            }
            info!(
                inicio = %window.start_iso(),
                fin = %window.end_iso(),
                jornada = ?window.jornada,
                "Hearing window derived"
            );
            ScheduleOutcome::Scheduled(window)
        }
        Err(reason) => {
            warn!(reason = %reason, "No hearing window derived");
            drop_inconsistent_window(record);
            ScheduleOutcome::Skipped(reason)
        }
    }
}

/// `fecha_inicio` and `fecha_fin` must both be present and one hour apart,
/// or both absent.
fn drop_inconsistent_window(record: &mut ExtractedRecord) {
    if record.fecha_inicio.is_none() && record.fecha_fin.is_none() {
        return;
    }
    let consistent = match (&record.fecha_inicio, &record.fecha_fin) {
        (Some(start), Some(end)) => match (window::parse_iso(start), window::parse_iso(end)) {
            (Some(s), Some(e)) => e - s == HEARING_DURATION,
            _ => false,
        },
        _ => false,
    };
    if !consistent {
        warn!(
            inicio = ?record.fecha_inicio,
            fin = ?record.fecha_fin,
            "Dropping inconsistent fecha_inicio/fecha_fin"
        );
        record.fecha_inicio = None;
        record.fecha_fin = None;
    }
}
