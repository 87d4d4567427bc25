// src/record.rs

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A requesting party. The contact field is `email` on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Convocante {
    #[serde(default, deserialize_with = "lenient_string")]
    pub rol: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nombre: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub telefono: String,
}

/// A summoned party. The contact field is `mail` on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Convocado {
    #[serde(default, deserialize_with = "lenient_string")]
    pub rol: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nombre: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mail: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub telefono: String,
}

/// Common view over both party kinds.
pub trait Party {
    fn nombre(&self) -> &str;
    fn contact(&self) -> &str;
}

impl Party for Convocante {
    fn nombre(&self) -> &str {
        &self.nombre
    }

    fn contact(&self) -> &str {
        &self.email
    }
}

impl Party for Convocado {
    fn nombre(&self) -> &str {
        &self.nombre
    }

    fn contact(&self) -> &str {
        &self.mail
    }
}

/// Everything extracted from one hearing request, plus the derived
/// appointment window once scheduling has run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub expediente: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub ciudad: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub hechos: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub peticiones: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub cuantia: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub convocantes: Vec<Convocante>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub convocados: Vec<Convocado>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub fecha_conciliacion: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub hora_conciliacion: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub jornada: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub fecha_inicio: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub fecha_fin: Option<String>,
    /// Keys the model returned that we don't model explicitly.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExtractedRecord {
    /// Parse a collaborator response into a record.
    ///
    /// Older schemas asked the model for `"jornada AM/PM"`; that key fills
    /// `jornada` when it is absent and is never written back.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let mut record: Self = serde_json::from_value(value)?;
        if let Some(legacy) = record.extra.remove(LEGACY_JORNADA_KEY) {
            if record.jornada.is_none() {
                record.jornada = text_of(legacy);
            }
        }
        Ok(record)
    }

    /// How many of the scalar case fields carry a non-empty value.
    pub fn coverage(&self) -> (usize, usize) {
        let fields = [
            &self.expediente,
            &self.ciudad,
            &self.hechos,
            &self.peticiones,
            &self.cuantia,
            &self.fecha_conciliacion,
            &self.hora_conciliacion,
            &self.jornada,
        ];
        let filled = fields
            .iter()
            .filter(|f| f.as_deref().is_some_and(|s| !s.trim().is_empty()))
            .count();
        (filled, fields.len())
    }
}

const LEGACY_JORNADA_KEY: &str = "jornada AM/PM";

/// Text form of a scalar the model returned. Numbers and booleans are
/// stringified, string lists are comma joined, `null` has no text.
fn text_of(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(text_of)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(other.to_string()),
    }
}

/// Models answer `3001234567` or `null` where the schema asks for a string.
fn lenient_string<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_string(de)?.unwrap_or_default())
}

fn lenient_opt_string<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(de)?.and_then(text_of))
}

/// Models sometimes answer `null` where the schema asks for a list.
fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// Treat `None`, `""` and whitespace-only strings alike.
pub(crate) fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_party_contact_names_survive_round_trip() {
        let raw = json!({
            "convocantes": [{"rol": "Conductor", "nombre": "FELIPE PARDO", "email": "f@x.co", "telefono": ""}],
            "convocados": [{"rol": "Propietario", "nombre": "CHECO PEREZ", "mail": "c@y.co", "telefono": "787878"}]
        });
        let record = ExtractedRecord::from_value(raw).unwrap();
        assert_eq!(record.convocantes[0].contact(), "f@x.co");
        assert_eq!(record.convocados[0].contact(), "c@y.co");

        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["convocantes"][0]["email"], "f@x.co");
        assert_eq!(out["convocados"][0]["mail"], "c@y.co");
        assert!(out["convocados"][0].get("email").is_none());
    }

    #[test]
    fn test_legacy_jornada_key() {
        let record = ExtractedRecord::from_value(json!({"jornada AM/PM": "PM"})).unwrap();
        assert_eq!(record.jornada.as_deref(), Some("PM"));
        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["jornada"], "PM");
        assert!(out.get("jornada AM/PM").is_none());
    }

    #[test]
    fn test_legacy_and_current_jornada_together() {
        let record =
            ExtractedRecord::from_value(json!({"jornada": "AM", "jornada AM/PM": "PM"})).unwrap();
        assert_eq!(record.jornada.as_deref(), Some("AM"));
        assert!(record.extra.is_empty());
    }

    #[test]
    fn test_numeric_scalars_are_stringified() {
        let record = ExtractedRecord::from_value(json!({
            "convocantes": [{"nombre": "ANA", "email": "a@b.co", "telefono": 3001234567u64}],
            "convocados": [{"nombre": "LUIS", "mail": ["l@x.co", "m@y.co"], "telefono": true}],
            "cuantia": 5000000,
            "expediente": 3020,
            "hora_conciliacion": 10
        }))
        .unwrap();
        assert_eq!(record.convocantes[0].telefono, "3001234567");
        assert_eq!(record.convocados[0].mail, "l@x.co, m@y.co");
        assert_eq!(record.convocados[0].telefono, "true");
        assert_eq!(record.cuantia.as_deref(), Some("5000000"));
        assert_eq!(record.expediente.as_deref(), Some("3020"));
        assert_eq!(record.hora_conciliacion.as_deref(), Some("10"));

        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["cuantia"], "5000000");
    }

    #[test]
    fn test_null_scalar_is_absent() {
        let record = ExtractedRecord::from_value(json!({"ciudad": null})).unwrap();
        assert_eq!(record.ciudad, None);
    }

    #[test]
    fn test_unknown_keys_are_forwarded() {
        let record = ExtractedRecord::from_value(json!({"ciudad": "CALI", "radicado": "R-17"})).unwrap();
        assert_eq!(record.extra.get("radicado"), Some(&json!("R-17")));
        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["radicado"], "R-17");
    }

    #[test]
    fn test_missing_party_lists_default_to_empty() {
        let record = ExtractedRecord::from_value(json!({"expediente": "CA-3020"})).unwrap();
        assert!(record.convocantes.is_empty());
        assert!(record.convocados.is_empty());
        assert_eq!(record.coverage(), (1, 8));
    }

    #[test]
    fn test_null_lists_and_fields() {
        let record = ExtractedRecord::from_value(json!({
            "convocantes": null,
            "convocados": [{"nombre": "ANA", "mail": null}]
        }))
        .unwrap();
        assert!(record.convocantes.is_empty());
        assert_eq!(record.convocados[0].mail, "");
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(&None), None);
        assert_eq!(non_empty(&Some("  ".into())), None);
        assert_eq!(non_empty(&Some(" 10:00 ".into())), Some("10:00"));
    }
}
