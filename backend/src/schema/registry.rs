use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{AppError, AppResult};
use crate::model::{Department, DocType};

use super::{FieldKind, FieldSpec, SchemaDescriptor};

macro_rules! fields {
    ($( ($name:literal, $kind:ident, $required:literal, $desc:literal) ),* $(,)?) => {
        &[ $( FieldSpec {
            name: $name,
            kind: FieldKind::$kind,
            required: $required,
            description: $desc,
        } ),* ]
    };
}

static SCHEMAS: &[SchemaDescriptor] = &[
    // Sales
    SchemaDescriptor {
        name: "TrainingModule",
        doc_type: DocType::TrainingModule,
        description: "Sales training module",
        fields: fields![
            ("title", Str, true, "Titel des Trainingsmoduls"),
            ("version", Str, true, "Versionsnummer (z.B. '1.0', '2.1')"),
            ("content", Str, true, "Hauptinhalt des Trainings"),
            ("objectives", StrList, false, "Lernziele"),
            ("target_audience", Str, false, "Zielgruppe"),
        ],
        required_fields: &["title", "version", "content"],
        primary_key_fields: &["title", "version"],
    },
    SchemaDescriptor {
        name: "Objection",
        doc_type: DocType::Objection,
        description: "Sales objection handling",
        fields: fields![
            ("id", Str, true, "Eindeutige ID des Einwands"),
            ("objection_text", Str, true, "Der Kundeneinwand"),
            ("response", Str, true, "Empfohlene Antwort"),
            ("category", Str, false, "Kategorie (z.B. 'Preis', 'Zeit')"),
            ("effectiveness_score", Float, false, "Wirksamkeitsbewertung 0-10"),
        ],
        required_fields: &["id", "objection_text", "response"],
        primary_key_fields: &["id"],
    },
    SchemaDescriptor {
        name: "Persona",
        doc_type: DocType::Persona,
        description: "Buyer persona",
        fields: fields![
            ("name", Str, true, "Name der Persona"),
            ("role", Str, true, "Rolle/Position"),
            ("pain_points", StrList, false, "Schmerzpunkte"),
            ("goals", StrList, false, "Ziele"),
            ("triggers", StrList, false, "Kaufausloeser"),
        ],
        required_fields: &["name", "role"],
        primary_key_fields: &["name"],
    },
    SchemaDescriptor {
        name: "PitchScript",
        doc_type: DocType::PitchScript,
        description: "Sales pitch script",
        fields: fields![
            ("title", Str, true, "Titel des Pitch-Scripts"),
            ("scenario", Str, true, "Anwendungsszenario"),
            ("script_text", Str, true, "Der Pitch-Text"),
            ("key_points", StrList, false, "Kernbotschaften"),
        ],
        required_fields: &["title", "scenario", "script_text"],
        primary_key_fields: &["title", "scenario"],
    },
    SchemaDescriptor {
        name: "EmailTemplate",
        doc_type: DocType::EmailTemplate,
        description: "Email template",
        fields: fields![
            ("name", Str, true, "Name des Templates"),
            ("subject", Str, true, "Betreffzeile"),
            ("body", Str, true, "E-Mail-Text"),
            ("use_case", Str, false, "Anwendungsfall"),
            ("variables", StrList, false, "Platzhalter-Variablen"),
        ],
        required_fields: &["name", "subject", "body"],
        primary_key_fields: &["name"],
    },
    // Support
    SchemaDescriptor {
        name: "FAQ",
        doc_type: DocType::Faq,
        description: "Frequently asked question",
        fields: fields![
            ("question", Str, true, "Die haeufig gestellte Frage"),
            ("answer", Str, true, "Die Antwort"),
            ("category", Str, false, "Kategorie"),
            ("related_products", StrList, false, "Betroffene Produkte"),
        ],
        required_fields: &["question", "answer"],
        primary_key_fields: &["question"],
    },
    SchemaDescriptor {
        name: "TroubleshootingGuide",
        doc_type: DocType::TroubleshootingGuide,
        description: "Troubleshooting guide",
        fields: fields![
            ("title", Str, true, "Titel des Guides"),
            ("problem", Str, true, "Problembeschreibung"),
            ("steps", StepList, false, "Fehlerbehebungsschritte"),
            ("solution", Str, true, "Loesung/Ergebnis"),
        ],
        required_fields: &["title", "problem", "solution"],
        primary_key_fields: &["title"],
    },
    SchemaDescriptor {
        name: "HowToSteps",
        doc_type: DocType::HowToSteps,
        description: "How-to guide",
        fields: fields![
            ("title", Str, true, "Titel der Anleitung"),
            ("steps", StepList, true, "Anleitungsschritte"),
        ],
        required_fields: &["title", "steps"],
        primary_key_fields: &["title"],
    },
    // Product
    SchemaDescriptor {
        name: "ProductSpec",
        doc_type: DocType::ProductSpec,
        description: "Product specification",
        fields: fields![
            ("artnr", Str, true, "Artikelnummer"),
            ("name", Str, true, "Produktname"),
            ("description", Str, false, "Produktbeschreibung"),
            ("specs", Map, false, "Technische Spezifikationen"),
            ("compatibility", StrList, false, "Kompatible Produkte/Systeme"),
        ],
        required_fields: &["artnr", "name"],
        primary_key_fields: &["artnr"],
    },
    SchemaDescriptor {
        name: "CompatibilityMatrix",
        doc_type: DocType::CompatibilityMatrix,
        description: "Product compatibility matrix",
        fields: fields![
            ("product_id", Str, true, "Produkt-ID oder Artikelnummer"),
            ("compatible_with", StrList, false, "Kompatible Produkte"),
            ("incompatible_with", StrList, false, "Inkompatible Produkte"),
            ("notes", Str, false, "Zusaetzliche Hinweise"),
        ],
        required_fields: &["product_id"],
        primary_key_fields: &["product_id"],
    },
    SchemaDescriptor {
        name: "SafetyNotes",
        doc_type: DocType::SafetyNotes,
        description: "Product safety notes",
        fields: fields![
            ("product_id", Str, true, "Produkt-ID oder Artikelnummer"),
            ("warnings", StrList, true, "Sicherheitswarnungen"),
            ("certifications", StrList, false, "Zertifizierungen"),
            ("handling_instructions", Str, false, "Handhabungshinweise"),
        ],
        required_fields: &["product_id", "warnings"],
        primary_key_fields: &["product_id"],
    },
    // Marketing
    SchemaDescriptor {
        name: "MessagingPillars",
        doc_type: DocType::MessagingPillars,
        description: "Brand messaging pillars",
        fields: fields![
            ("pillar_name", Str, true, "Name des Messaging-Pfeilers"),
            ("key_messages", StrList, true, "Kernbotschaften"),
            ("tone", Str, false, "Tonalitaet"),
            ("audience", Str, false, "Zielgruppe"),
        ],
        required_fields: &["pillar_name", "key_messages"],
        primary_key_fields: &["pillar_name"],
    },
    SchemaDescriptor {
        name: "ContentGuidelines",
        doc_type: DocType::ContentGuidelines,
        description: "Content guidelines",
        fields: fields![
            ("topic", Str, true, "Thema/Bereich"),
            ("dos", StrList, true, "Was man tun sollte"),
            ("donts", StrList, true, "Was man vermeiden sollte"),
            ("examples", StrList, false, "Beispiele"),
        ],
        required_fields: &["topic", "dos", "donts"],
        primary_key_fields: &["topic"],
    },
    // Legal
    SchemaDescriptor {
        name: "ComplianceNotes",
        doc_type: DocType::ComplianceNotes,
        description: "Compliance notes",
        fields: fields![
            ("topic", Str, true, "Compliance-Thema"),
            ("requirements", StrList, true, "Anforderungen"),
            ("effective_date", Date, false, "Gueltigkeitsdatum"),
            ("region", Str, false, "Region/Land"),
        ],
        required_fields: &["topic", "requirements"],
        primary_key_fields: &["topic", "region"],
    },
    SchemaDescriptor {
        name: "ClaimsDoDont",
        doc_type: DocType::ClaimsDoDont,
        description: "Marketing claims do's and don'ts",
        fields: fields![
            ("claim_type", Str, true, "Art der Werbeaussage"),
            ("allowed", StrList, true, "Erlaubte Aussagen"),
            ("prohibited", StrList, true, "Verbotene Aussagen"),
            ("examples", StrList, false, "Beispiele"),
        ],
        required_fields: &["claim_type", "allowed", "prohibited"],
        primary_key_fields: &["claim_type"],
    },
];

/// Process-wide read-only table of record types and the department
/// permission matrix. Immutable after startup, freely shared.
pub struct SchemaRegistry {
    by_doc_type: HashMap<DocType, &'static SchemaDescriptor>,
    by_name: HashMap<&'static str, &'static SchemaDescriptor>,
}

impl SchemaRegistry {
    pub fn global() -> &'static SchemaRegistry {
        static REGISTRY: OnceLock<SchemaRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            let by_doc_type = SCHEMAS.iter().map(|s| (s.doc_type, s)).collect();
            let by_name = SCHEMAS.iter().map(|s| (s.name, s)).collect();
            SchemaRegistry {
                by_doc_type,
                by_name,
            }
        })
    }

    pub fn schema_for(&self, doc_type: DocType) -> &'static SchemaDescriptor {
        // The doc-type enum is closed and every variant is registered above.
        self.by_doc_type[&doc_type]
    }

    pub fn schema_by_name(&self, name: &str) -> AppResult<&'static SchemaDescriptor> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| AppError::Validation(format!("no schema found with name: {name}")))
    }

    pub fn all_schemas(&self) -> &'static [SchemaDescriptor] {
        SCHEMAS
    }

    pub fn types_for(&self, department: Department) -> &'static [DocType] {
        match department {
            Department::Sales => &[
                DocType::TrainingModule,
                DocType::Objection,
                DocType::Persona,
                DocType::PitchScript,
                DocType::EmailTemplate,
            ],
            Department::Support => &[
                DocType::Faq,
                DocType::TroubleshootingGuide,
                DocType::HowToSteps,
            ],
            Department::Product => &[
                DocType::ProductSpec,
                DocType::CompatibilityMatrix,
                DocType::SafetyNotes,
            ],
            Department::Marketing => &[DocType::MessagingPillars, DocType::ContentGuidelines],
            Department::Legal => &[DocType::ComplianceNotes, DocType::ClaimsDoDont],
        }
    }

    pub fn is_permitted(&self, department: Department, doc_type: DocType) -> bool {
        self.types_for(department).contains(&doc_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_doc_type_has_a_schema() {
        let registry = SchemaRegistry::global();
        for doc_type in DocType::ALL {
            let schema = registry.schema_for(doc_type);
            assert_eq!(schema.doc_type, doc_type);
            assert!(!schema.required_fields.is_empty());
            assert!(!schema.primary_key_fields.is_empty());
        }
    }

    #[test]
    fn primary_key_fields_are_declared_fields() {
        for schema in SchemaRegistry::global().all_schemas() {
            for pk in schema.primary_key_fields {
                assert!(
                    schema.field(pk).is_some(),
                    "{}: primary key field {pk} missing from field table",
                    schema.name
                );
            }
        }
    }

    #[test]
    fn permission_matrix_covers_all_types_once() {
        let registry = SchemaRegistry::global();
        let mut seen = Vec::new();
        for dept in Department::ALL {
            seen.extend_from_slice(registry.types_for(dept));
        }
        seen.sort_by_key(|t| t.as_str());
        seen.dedup();
        assert_eq!(seen.len(), DocType::ALL.len());
    }

    #[test]
    fn permission_checks() {
        let registry = SchemaRegistry::global();
        assert!(registry.is_permitted(Department::Support, DocType::Faq));
        assert!(!registry.is_permitted(Department::Legal, DocType::Faq));
        assert!(registry.is_permitted(Department::Product, DocType::ProductSpec));
        assert!(!registry.is_permitted(Department::Sales, DocType::ProductSpec));
    }

    #[test]
    fn unknown_schema_name_is_a_domain_error() {
        let err = SchemaRegistry::global()
            .schema_by_name("NoSuchSchema")
            .unwrap_err();
        assert!(err.to_string().contains("NoSuchSchema"));
    }
}
