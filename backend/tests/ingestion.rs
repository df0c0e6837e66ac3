use std::sync::Arc;

use backend::extractors::StubExtractor;
use backend::model::{
    Confidentiality, Department, DocType, Document, DocumentStatus, RecordStatus, UpdateStatus,
};
use backend::pipeline::IngestionPipeline;
use backend::storage::{BlobStore, FsBlobStore, Tables};
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

struct Harness {
    _dir: TempDir,
    tables: Arc<Tables>,
    blob: Arc<dyn BlobStore>,
    pipeline: IngestionPipeline,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let tables = Arc::new(Tables::new(&dir.path().join("tables")));
    let blob: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(
        dir.path().join("blobs"),
        "documents",
        "test-secret",
    ));
    let pipeline = IngestionPipeline::new(
        tables.clone(),
        blob.clone(),
        Arc::new(StubExtractor::default()),
    );
    Harness {
        _dir: dir,
        tables,
        blob,
        pipeline,
    }
}

impl Harness {
    /// Store the bytes and insert the document row, the way the upload
    /// route does it.
    async fn upload(
        &self,
        filename: &str,
        bytes: &[u8],
        department: Department,
        doc_type: DocType,
    ) -> Uuid {
        let extension = filename.rsplit_once('.').map(|(_, e)| e).unwrap_or("bin");
        let blob_path = format!("documents/{}.{extension}", Uuid::new_v4());
        self.blob.put(&blob_path, bytes).await.unwrap();

        let document = Document {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            department,
            doc_type,
            version_date: Utc::now(),
            owner: "tester".to_string(),
            confidentiality: Confidentiality::Internal,
            status: DocumentStatus::Uploading,
            blob_path,
            error_message: None,
            uploaded_at: Utc::now(),
        };
        let id = document.id;
        self.tables.documents.insert(id, document).await;
        id
    }
}

fn product_block(title: &str, artnr: &str) -> String {
    format!(
        "Titel: {title}\n\
         Beschreibung: Ein robustes Abisolierwerkzeug fuer den taeglichen Einsatz in der \
         Elektroinstallation, mit ergonomischem Griff, gehaertetem Klingensatz und \
         Sicherheitsverschluss fuer praezise Schnitte an allen gaengigen Leitungen im \
         Schaltschrank.\n\
         Weitere Informationen: {artnr}_produktfoto.jpg\n"
    )
}

#[tokio::test]
async fn markdown_faq_reaches_pending_review_with_one_complete_record() {
    let h = harness();
    let content = "# FAQ\n## Question\nWie installiere ich X?\n## Answer\n1. Download\n2. Run setup";
    let id = h
        .upload("faq.md", content.as_bytes(), Department::Support, DocType::Faq)
        .await;

    let created = h.pipeline.process(id).await.unwrap();
    assert_eq!(created, 1);

    let document = h.tables.document(id).await.unwrap();
    assert_eq!(document.status, DocumentStatus::PendingReview);

    let records = h.tables.records_for_document(id).await;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.schema_type, "FAQ");
    assert_eq!(record.primary_key, "wie installiere ich x?");
    assert_eq!(record.status, RecordStatus::Pending);
    assert_eq!(record.completeness_score, 1.0);
    assert_eq!(record.version, 1);

    let actions: Vec<String> = h
        .tables
        .audit_logs
        .all()
        .await
        .into_iter()
        .map(|a| a.action)
        .collect();
    assert!(actions.contains(&"records_extracted".to_string()));
    assert!(actions.contains(&"ingestion_complete".to_string()));
}

#[tokio::test]
async fn chunk_indices_are_dense_and_in_parse_order() {
    let h = harness();
    let paragraphs: Vec<String> = (0..40)
        .map(|i| format!("Absatz {i} mit ausreichend vielen Woertern, um die Chunkgrenzen wirklich zu erreichen und mehrere Fenster zu erzwingen."))
        .collect();
    let content = format!("# Handbuch\n{}", paragraphs.join("\n\n"));
    let id = h
        .upload("handbuch.md", content.as_bytes(), Department::Support, DocType::Faq)
        .await;

    h.pipeline.process(id).await.unwrap();

    let chunks = h.tables.chunks_for_document(id).await;
    assert!(chunks.len() > 1);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
        assert!(chunk.start_offset <= chunk.end_offset);
        assert_eq!(chunk.embedding.len(), backend::pipeline::EMBEDDING_DIM);
        assert_eq!(chunk.confidence, 1.0);
    }
}

#[tokio::test]
async fn product_spec_with_two_titel_blocks_yields_two_records_with_evidence() {
    let h = harness();
    let content = format!(
        "{}\n{}",
        product_block("Secura No. 15", "70015"),
        product_block("Secura No. 28", "70028")
    );
    let id = h
        .upload(
            "produkte.md",
            content.as_bytes(),
            Department::Product,
            DocType::ProductSpec,
        )
        .await;

    let created = h.pipeline.process(id).await.unwrap();
    assert_eq!(created, 2);

    let records = h.tables.records_for_document(id).await;
    assert_eq!(records.len(), 2);

    let mut keys: Vec<&str> = records.iter().map(|r| r.primary_key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["70015", "70028"]);

    for record in &records {
        let evidence = h.tables.evidence_for_record(record.id).await;
        assert!(evidence.iter().any(|e| e.field_path == "title"));
        // Evidence links back to a chunk of this document.
        assert!(evidence.iter().all(|e| e.chunk_id.is_some()));
    }
}

#[tokio::test]
async fn duplicate_of_approved_record_becomes_proposed_update() {
    let h = harness();

    // First upload goes through review and gets approved.
    let first_content = format!(
        "{}\n{}",
        product_block("Secura No. 15", "70015"),
        product_block("Secura No. 28", "70028")
    );
    let first = h
        .upload(
            "erste.md",
            first_content.as_bytes(),
            Department::Product,
            DocType::ProductSpec,
        )
        .await;
    h.pipeline.process(first).await.unwrap();
    let records = h.tables.records_for_document(first).await;
    assert_eq!(records.len(), 2);
    for record in &records {
        h.tables
            .records
            .update(record.id, |r| r.status = RecordStatus::Approved)
            .await;
    }

    // Re-ingesting the same article numbers must not create new records.
    let second_content = format!(
        "{}\n{}",
        product_block("Secura No. 15 Neuauflage", "70015"),
        product_block("Secura No. 28 Neuauflage", "70028")
    );
    let second = h
        .upload(
            "zweite.md",
            second_content.as_bytes(),
            Department::Product,
            DocType::ProductSpec,
        )
        .await;
    let created = h.pipeline.process(second).await.unwrap();
    assert_eq!(created, 0);
    assert!(h.tables.records_for_document(second).await.is_empty());

    let (updates, total) = h.tables.pending_updates(1, 20).await;
    assert!(total >= 1);
    let update = &updates[0];
    assert_eq!(update.status, UpdateStatus::Pending);
    assert_eq!(update.source_document_id, Some(second));

    let diff = update.diff.as_object().unwrap();
    let non_empty = ["added", "removed", "changed"]
        .iter()
        .any(|k| !diff[*k].as_object().unwrap().is_empty());
    assert!(non_empty, "diff should not be empty: {diff:?}");
}

#[tokio::test]
async fn corrupt_docx_reaches_parse_failed_with_audit_trail() {
    let h = harness();
    let id = h
        .upload(
            "kaputt.docx",
            b"this is definitely not a word document",
            Department::Support,
            DocType::Faq,
        )
        .await;

    let err = h.pipeline.process(id).await.unwrap_err();
    assert!(!err.to_string().is_empty());

    let document = h.tables.document(id).await.unwrap();
    assert_eq!(document.status, DocumentStatus::ParseFailed);
    assert!(document.error_message.is_some());

    let failures: Vec<_> = h
        .tables
        .audit_logs
        .all()
        .await
        .into_iter()
        .filter(|a| a.action == "ingestion_failed")
        .collect();
    assert_eq!(failures.len(), 1);

    // The failed document is still retrievable afterwards.
    assert!(h.tables.document(id).await.is_ok());
}

#[tokio::test]
async fn unknown_document_fails_with_not_found() {
    let h = harness();
    let err = h.pipeline.process(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, backend::error::AppError::NotFound(_)));
}

#[tokio::test]
async fn empty_pdf_yields_pending_review_without_records() {
    let h = harness();
    // Not a real PDF: the parser degrades to an empty document instead of
    // failing, and rule-based extraction of nothing yields zero records.
    let id = h
        .upload(
            "scan.pdf",
            b"not a pdf at all",
            Department::Support,
            DocType::Faq,
        )
        .await;

    let created = h.pipeline.process(id).await.unwrap();
    assert_eq!(created, 0);
    let document = h.tables.document(id).await.unwrap();
    assert_eq!(document.status, DocumentStatus::PendingReview);
}
