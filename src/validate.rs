// src/validate.rs

use crate::config::ValidationSection;
use crate::record::{ExtractedRecord, Party};
use regex::Regex;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Which side of the hearing a party sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Convocante,
    Convocado,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Convocante => f.write_str("convocante"),
            Side::Convocado => f.write_str("convocado"),
        }
    }
}

/// Advisory findings about an extracted record. None of these stop delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationWarning {
    #[error("no convocantes found in the extracted record")]
    MissingConvocantes,
    #[error("no convocados found in the extracted record")]
    MissingConvocados,
    #[error("possibly invalid email for {side} #{index} ({nombre}): '{address}'")]
    SuspiciousEmail {
        side: Side,
        index: usize,
        nombre: String,
        address: String,
    },
}

/// Soft schema checks over extracted records.
pub struct ResponseValidator {
    settings: ValidationSection,
    email: Option<Regex>,
}

impl ResponseValidator {
    pub fn new(settings: ValidationSection) -> Self {
        let email = Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").ok();
        Self { settings, email }
    }

    /// Check the record and log every finding. Never fails.
    pub fn validate(&self, record: &ExtractedRecord) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if self.settings.require_convocantes && record.convocantes.is_empty() {
            warnings.push(ValidationWarning::MissingConvocantes);
        }
        if self.settings.require_convocados && record.convocados.is_empty() {
            warnings.push(ValidationWarning::MissingConvocados);
        }

        if self.settings.validate_email_format {
            self.check_contacts(Side::Convocante, &record.convocantes, &mut warnings);
            self.check_contacts(Side::Convocado, &record.convocados, &mut warnings);
        }

        for w in &warnings {
            warn!(warning = %w, "Validation");
        }
        warnings
    }

    fn check_contacts<P: Party>(&self, side: Side, parties: &[P], out: &mut Vec<ValidationWarning>) {
        for (index, party) in parties.iter().enumerate() {
            // Several addresses may share one field, comma separated.
            for address in party.contact().split([',', ';']).map(str::trim) {
                if address.is_empty() || self.looks_like_email(address) {
                    continue;
                }
                out.push(ValidationWarning::SuspiciousEmail {
                    side,
                    index,
                    nombre: party.nombre().to_string(),
                    address: address.to_string(),
                });
            }
        }
    }

    fn looks_like_email(&self, address: &str) -> bool {
        self.email.as_ref().is_none_or(|re| re.is_match(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Convocado, Convocante};

    fn validator() -> ResponseValidator {
        ResponseValidator::new(ValidationSection::default())
    }

    fn convocante(nombre: &str, email: &str) -> Convocante {
        Convocante {
            nombre: nombre.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    fn convocado(nombre: &str, mail: &str) -> Convocado {
        Convocado {
            nombre: nombre.into(),
            mail: mail.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_convocantes_warns() {
        let record = ExtractedRecord {
            convocados: vec![convocado("CARLOS SAENZ", "JUAN.PAZ.H@GMAIL.COM")],
            ..Default::default()
        };
        let warnings = validator().validate(&record);
        assert_eq!(warnings, vec![ValidationWarning::MissingConvocantes]);
        assert!(warnings[0].to_string().contains("convocantes"));
    }

    #[test]
    fn test_empty_record_warns_twice() {
        let warnings = validator().validate(&ExtractedRecord::default());
        assert_eq!(
            warnings,
            vec![
                ValidationWarning::MissingConvocantes,
                ValidationWarning::MissingConvocados
            ]
        );
    }

    #[test]
    fn test_email_checks_use_side_specific_field() {
        let record = ExtractedRecord {
            convocantes: vec![
                convocante("FELIPE PARDO", "xxxxxxxxxxxxxxxxxxx"),
                convocante("PABLO MARMOL", "IMPACTA.INC@GMAIL.COM"),
            ],
            convocados: vec![convocado("CHECO PEREZ", "agente@digitalmagia")],
            ..Default::default()
        };
        let warnings = validator().validate(&record);
        assert_eq!(warnings.len(), 2);
        assert!(matches!(
            &warnings[0],
            ValidationWarning::SuspiciousEmail { side: Side::Convocante, index: 0, .. }
        ));
        assert!(matches!(
            &warnings[1],
            ValidationWarning::SuspiciousEmail { side: Side::Convocado, index: 0, address, .. }
                if address == "agente@digitalmagia"
        ));
    }

    #[test]
    fn test_comma_joined_addresses_checked_individually() {
        let record = ExtractedRecord {
            convocantes: vec![convocante("ANA", "a@b.co, c@d.com.co")],
            convocados: vec![convocado("LUIS", "ok@x.com; nope")],
            ..Default::default()
        };
        let warnings = validator().validate(&record);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].to_string().contains("'nope'"));
    }

    #[test]
    fn test_blank_contacts_are_not_flagged() {
        let record = ExtractedRecord {
            convocantes: vec![convocante("ANA", "")],
            convocados: vec![convocado("LUIS", "  ")],
            ..Default::default()
        };
        assert!(validator().validate(&record).is_empty());
    }

    #[test]
    fn test_checks_can_be_disabled() {
        let v = ResponseValidator::new(ValidationSection {
            require_convocantes: false,
            require_convocados: false,
            validate_email_format: false,
        });
        let record = ExtractedRecord {
            convocantes: vec![convocante("ANA", "bad")],
            ..Default::default()
        };
        assert!(v.validate(&record).is_empty());
    }
}
