use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Sales,
    Support,
    Marketing,
    Product,
    Legal,
}

impl Department {
    pub const ALL: [Department; 5] = [
        Department::Sales,
        Department::Support,
        Department::Marketing,
        Department::Product,
        Department::Legal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Sales => "sales",
            Department::Support => "support",
            Department::Marketing => "marketing",
            Department::Product => "product",
            Department::Legal => "legal",
        }
    }

    pub fn parse(value: &str) -> Option<Department> {
        Department::ALL.iter().copied().find(|d| d.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    // Sales
    TrainingModule,
    Objection,
    Persona,
    PitchScript,
    EmailTemplate,
    // Support
    Faq,
    TroubleshootingGuide,
    HowToSteps,
    // Product
    ProductSpec,
    CompatibilityMatrix,
    SafetyNotes,
    // Marketing
    MessagingPillars,
    ContentGuidelines,
    // Legal
    ComplianceNotes,
    ClaimsDoDont,
}

impl DocType {
    pub const ALL: [DocType; 15] = [
        DocType::TrainingModule,
        DocType::Objection,
        DocType::Persona,
        DocType::PitchScript,
        DocType::EmailTemplate,
        DocType::Faq,
        DocType::TroubleshootingGuide,
        DocType::HowToSteps,
        DocType::ProductSpec,
        DocType::CompatibilityMatrix,
        DocType::SafetyNotes,
        DocType::MessagingPillars,
        DocType::ContentGuidelines,
        DocType::ComplianceNotes,
        DocType::ClaimsDoDont,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::TrainingModule => "training_module",
            DocType::Objection => "objection",
            DocType::Persona => "persona",
            DocType::PitchScript => "pitch_script",
            DocType::EmailTemplate => "email_template",
            DocType::Faq => "faq",
            DocType::TroubleshootingGuide => "troubleshooting_guide",
            DocType::HowToSteps => "how_to_steps",
            DocType::ProductSpec => "product_spec",
            DocType::CompatibilityMatrix => "compatibility_matrix",
            DocType::SafetyNotes => "safety_notes",
            DocType::MessagingPillars => "messaging_pillars",
            DocType::ContentGuidelines => "content_guidelines",
            DocType::ComplianceNotes => "compliance_notes",
            DocType::ClaimsDoDont => "claims_do_dont",
        }
    }

    pub fn parse(value: &str) -> Option<DocType> {
        DocType::ALL.iter().copied().find(|t| t.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Confidentiality {
    #[default]
    Internal,
    Public,
}

impl Confidentiality {
    pub fn parse(value: &str) -> Option<Confidentiality> {
        match value {
            "internal" => Some(Confidentiality::Internal),
            "public" => Some(Confidentiality::Public),
            _ => None,
        }
    }
}

/// Document ingestion state machine. Transitions are persisted before the
/// next stage begins; `PendingReview` is the pipeline's success terminal.
/// `Completed` is only entered by a moderator-driven close, never by the
/// pipeline itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploading,
    Parsing,
    Extracting,
    PendingReview,
    Completed,
    ParseFailed,
    ExtractionFailed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploading => "uploading",
            DocumentStatus::Parsing => "parsing",
            DocumentStatus::Extracting => "extracting",
            DocumentStatus::PendingReview => "pending_review",
            DocumentStatus::Completed => "completed",
            DocumentStatus::ParseFailed => "parse_failed",
            DocumentStatus::ExtractionFailed => "extraction_failed",
        }
    }

    pub fn parse(value: &str) -> Option<DocumentStatus> {
        [
            DocumentStatus::Uploading,
            DocumentStatus::Parsing,
            DocumentStatus::Extracting,
            DocumentStatus::PendingReview,
            DocumentStatus::Completed,
            DocumentStatus::ParseFailed,
            DocumentStatus::ExtractionFailed,
        ]
        .iter()
        .copied()
        .find(|s| s.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Approved,
    Rejected,
    NeedsReview,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Approved => "approved",
            RecordStatus::Rejected => "rejected",
            RecordStatus::NeedsReview => "needs_review",
        }
    }

    pub fn parse(value: &str) -> Option<RecordStatus> {
        [
            RecordStatus::Pending,
            RecordStatus::Approved,
            RecordStatus::Rejected,
            RecordStatus::NeedsReview,
        ]
        .iter()
        .copied()
        .find(|s| s.as_str() == value)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordStatus::Approved | RecordStatus::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Pending,
    Approved,
    Rejected,
}

/// One uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub department: Department,
    pub doc_type: DocType,
    pub version_date: DateTime<Utc>,
    pub owner: String,
    pub confidentiality: Confidentiality,
    pub status: DocumentStatus,
    pub blob_path: String,
    #[serde(default)]
    pub error_message: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// A bounded text window derived from a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    #[serde(default)]
    pub section_path: String,
    pub text: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub confidence: f32,
    pub start_offset: usize,
    pub end_offset: usize,
    pub chunk_index: usize,
}

/// One extracted structured entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    #[serde(default)]
    pub document_id: Option<Uuid>,
    pub department: Department,
    /// Record class name, e.g. `"Objection"`, `"ProductSpec"`.
    pub schema_type: String,
    /// Deterministic key derived from the schema's primary-key fields; unique
    /// among approved records of the same schema_type.
    pub primary_key: String,
    pub data: Value,
    pub completeness_score: f64,
    pub status: RecordStatus,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Back-link from an extracted field to the source text that justified it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: Uuid,
    pub record_id: Uuid,
    #[serde(default)]
    pub chunk_id: Option<Uuid>,
    pub field_path: String,
    pub excerpt: String,
    #[serde(default)]
    pub start_offset: Option<usize>,
    #[serde(default)]
    pub end_offset: Option<usize>,
}

/// A pending patch to an already-approved record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedUpdate {
    pub id: Uuid,
    pub record_id: Uuid,
    #[serde(default)]
    pub source_document_id: Option<Uuid>,
    pub new_data: Value,
    pub diff: Value,
    pub status: UpdateStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
}

/// A user-added file bound to a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordAttachment {
    pub id: Uuid,
    pub record_id: Uuid,
    pub filename: String,
    pub file_type: String,
    pub blob_path: String,
    pub file_size: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of core-meaningful events. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub actor: String,
    #[serde(default)]
    pub details: Option<Value>,
    pub timestamp: DateTime<Utc>,
}
