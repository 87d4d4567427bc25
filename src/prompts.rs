// src/prompts.rs
//
// One definition of the prompt, system instruction and response schema,
// shared by every backend and entry point.

use crate::config::PromptsSection;
use serde_json::{json, Value};

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = r#"Eres un experto en análisis de documentos legales colombianos.
Tu tarea es extraer información de formularios de solicitud de audiencia de conciliación.

REGLAS IMPORTANTES:
1. Diferencia claramente entre CONVOCANTE y CONVOCADO usando las etiquetas verticales.
2. Mantén formato de fecha YYYY-MM-DD.
3. Concatena múltiples emails con comas.
4. Identifica roles específicos: CONDUCTOR, PROPIETARIO, OTROS.
5. Responde SIEMPRE en formato JSON válido."#;

pub const DEFAULT_PROMPT: &str = r#"Analiza el documento adjunto (solo las páginas del formulario, no los anexos), que es una solicitud de audiencia de conciliación.

CONVOCANTE vs CONVOCADO:
- Las etiquetas "CONVOCANTE" y "CONVOCADO" (o "CONVOCANDO") aparecen en vertical en el lado izquierdo.
- Todo lo que está bajo "CONVOCANTE" pertenece a convocantes; todo lo que está bajo "CONVOCADO" pertenece a convocados.
- Cada sección puede tener CONDUCTOR, PROPIETARIO y OTROS, con nombre, email y teléfono.

EMAILS: si un campo tiene varias direcciones, concaténalas separadas por comas.

CIUDAD: la casilla marcada entre Bogotá, Cali, Medellín y Barranquilla.

HORA Y JORNADA:
- Extrae la hora tal como aparece (ej: 10:00, 2:30, 14:00) en hora_conciliacion.
- La jornada es la casilla marcada AM [x] o PM [x]; responde exactamente "AM" o "PM".
- Si no hay casilla marcada y la hora está en formato 24h, deja la jornada vacía.

FECHA: fecha_conciliacion en formato YYYY-MM-DD.

Extrae la información según el schema JSON proporcionado. Analiza ÚNICAMENTE este documento."#;

fn party_schema(contact_field: &str) -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "rol": { "type": "STRING", "description": "Rol de la persona (CONDUCTOR, PROPIETARIO, OTROS)" },
            "nombre": { "type": "STRING", "description": "Nombre completo de la persona" },
            contact_field: { "type": "STRING", "description": "Dirección(es) de correo electrónico separadas por comas" },
            "telefono": { "type": "STRING", "description": "Número(s) de teléfono" }
        },
        "required": ["nombre", contact_field]
    })
}

/// The JSON schema the extraction collaborator must answer with.
///
/// `fecha_inicio`/`fecha_fin` are absent; they are derived
/// locally from the date, hour and jornada.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "expediente": { "type": "STRING", "description": "Número de expediente del documento" },
            "ciudad": { "type": "STRING", "description": "Ciudad donde se presenta la solicitud (Bogotá, Cali, Medellín, Barranquilla)" },
            "hechos": { "type": "STRING", "description": "Descripción detallada de los hechos" },
            "peticiones": { "type": "STRING", "description": "Peticiones realizadas en la solicitud" },
            "cuantia": { "type": "STRING", "description": "Valor económico de la cuantía" },
            "convocantes": {
                "type": "ARRAY",
                "description": "Lista de personas que convocan",
                "items": party_schema("email")
            },
            "convocados": {
                "type": "ARRAY",
                "description": "Lista de personas convocadas",
                "items": party_schema("mail")
            },
            "fecha_conciliacion": { "type": "STRING", "description": "Fecha de la audiencia en formato YYYY-MM-DD" },
            "hora_conciliacion": { "type": "STRING", "description": "Hora de la audiencia" },
            "jornada": { "type": "STRING", "description": "Jornada de la audiencia (AM/PM)" }
        },
        "required": ["convocantes", "convocados"]
    })
}

/// Prompt text resolved against configuration overrides.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub prompt: String,
    pub system_instruction: String,
    pub schema: Value,
}

impl PromptSet {
    pub fn from_config(section: &PromptsSection) -> Self {
        let pick = |custom: &Option<String>, fallback: &str| {
            custom
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        Self {
            prompt: pick(&section.prompt, DEFAULT_PROMPT),
            system_instruction: pick(&section.system_instruction, DEFAULT_SYSTEM_INSTRUCTION),
            schema: response_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_keeps_asymmetric_contact_fields() {
        let schema = response_schema();
        let props = &schema["properties"];
        assert!(props["convocantes"]["items"]["properties"].get("email").is_some());
        assert!(props["convocados"]["items"]["properties"].get("mail").is_some());
        assert!(props.get("fecha_inicio").is_none());
    }

    #[test]
    fn test_blank_override_falls_back() {
        let set = PromptSet::from_config(&PromptsSection {
            prompt: Some("   ".into()),
            system_instruction: Some("solo JSON".into()),
        });
        assert_eq!(set.prompt, DEFAULT_PROMPT);
        assert_eq!(set.system_instruction, "solo JSON");
    }
}
