use std::sync::Arc;

use backend::model::{
    Department, DocType, Document, DocumentStatus, Confidentiality, Evidence, Record, RecordStatus,
};
use backend::storage::{JsonTable, StorageManager, Table, TableConfig, Tables};
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

fn sample_document() -> Document {
    Document {
        id: Uuid::new_v4(),
        filename: "handbuch.md".to_string(),
        department: Department::Support,
        doc_type: DocType::Faq,
        version_date: Utc::now(),
        owner: "anna".to_string(),
        confidentiality: Confidentiality::Internal,
        status: DocumentStatus::Uploading,
        blob_path: "documents/x.md".to_string(),
        error_message: None,
        uploaded_at: Utc::now(),
    }
}

fn sample_record(document_id: Option<Uuid>, status: RecordStatus) -> Record {
    Record {
        id: Uuid::new_v4(),
        document_id,
        department: Department::Support,
        schema_type: "FAQ".to_string(),
        primary_key: "wie installiere ich x?".to_string(),
        data: json!({ "question": "Wie installiere ich X?", "answer": "Setup starten." }),
        completeness_score: 1.0,
        status,
        version: 1,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn table_round_trip_survives_reload() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let config = TableConfig {
        working_dir: dir.path().into(),
        namespace: "documents".to_string(),
    };

    let table: JsonTable<Document> = JsonTable::new(config.clone());
    table.initialize().await?;

    let doc = sample_document();
    let id = doc.id;
    table.insert(id, doc).await;
    table.sync_if_dirty().await?;

    let reopened: JsonTable<Document> = JsonTable::new(config);
    reopened.initialize().await?;
    let loaded = reopened.get(id).await.expect("document survives reload");
    assert_eq!(loaded.filename, "handbuch.md");
    assert_eq!(loaded.status, DocumentStatus::Uploading);

    reopened.delete(&[id]).await;
    reopened.sync_if_dirty().await?;
    assert!(reopened.get(id).await.is_none());

    Ok(())
}

#[tokio::test]
async fn update_closure_runs_under_the_write_lock() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let table: JsonTable<Record> = JsonTable::new(TableConfig {
        working_dir: dir.path().into(),
        namespace: "records".to_string(),
    });
    table.initialize().await?;

    let record = sample_record(None, RecordStatus::Pending);
    let id = record.id;
    table.insert(id, record).await;

    let version = table
        .update(id, |record| {
            record.version += 1;
            record.version
        })
        .await;
    assert_eq!(version, Some(2));
    assert!(table.update(Uuid::new_v4(), |_| ()).await.is_none());

    Ok(())
}

#[tokio::test]
async fn storage_manager_initializes_all_registered_tables() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let tables = Arc::new(Tables::new(dir.path()));

    let mut manager = StorageManager::new();
    tables.register(&mut manager);
    manager.initialize_all().await?;

    let doc = sample_document();
    let id = doc.id;
    tables.documents.insert(id, doc).await;
    manager.finalize_all().await?;

    let reopened = Tables::new(dir.path());
    let mut manager2 = StorageManager::new();
    reopened.register(&mut manager2);
    manager2.initialize_all().await?;
    assert!(reopened.documents.get(id).await.is_some());

    Ok(())
}

#[tokio::test]
async fn document_cascade_removes_children_and_nulls_chunk_refs() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let tables = Tables::new(dir.path());

    let doc = sample_document();
    let doc_id = doc.id;
    tables.documents.insert(doc_id, doc).await;

    let chunk = backend::model::Chunk {
        id: Uuid::new_v4(),
        document_id: doc_id,
        section_path: "FAQ".to_string(),
        text: "Wie installiere ich X?".to_string(),
        embedding: vec![],
        confidence: 1.0,
        start_offset: 0,
        end_offset: 22,
        chunk_index: 0,
    };
    let chunk_id = chunk.id;
    tables.chunks.insert(chunk_id, chunk).await;

    let record = sample_record(Some(doc_id), RecordStatus::Pending);
    let record_id = record.id;
    tables.records.insert(record_id, record).await;

    let evidence = Evidence {
        id: Uuid::new_v4(),
        record_id,
        chunk_id: Some(chunk_id),
        field_path: "question".to_string(),
        excerpt: "Wie installiere ich X?".to_string(),
        start_offset: Some(0),
        end_offset: Some(22),
    };
    tables.evidence.insert(evidence.id, evidence).await;

    let blob_paths = tables.delete_document_cascade(doc_id).await?;
    assert_eq!(blob_paths, vec!["documents/x.md".to_string()]);

    assert!(tables.documents.get(doc_id).await.is_none());
    assert!(tables.chunks.get(chunk_id).await.is_none());
    assert!(tables.records.get(record_id).await.is_none());
    // Evidence rows of cascaded records are gone with them.
    assert_eq!(tables.evidence.len().await, 0);

    Ok(())
}

#[tokio::test]
async fn approved_record_lookup_matches_schema_and_key() {
    let dir = TempDir::new().unwrap();
    let tables = Tables::new(dir.path());

    let approved = sample_record(None, RecordStatus::Approved);
    let pending = sample_record(None, RecordStatus::Pending);
    tables.records.insert(approved.id, approved.clone()).await;
    tables.records.insert(pending.id, pending).await;

    let hit = tables
        .find_approved_record("FAQ", "wie installiere ich x?")
        .await
        .expect("approved record is found");
    assert_eq!(hit.id, approved.id);

    assert!(
        tables
            .find_approved_record("Objection", "wie installiere ich x?")
            .await
            .is_none()
    );
}

#[tokio::test]
async fn review_queue_defaults_to_open_statuses_sorted_by_completeness() {
    let dir = TempDir::new().unwrap();
    let tables = Tables::new(dir.path());

    let mut complete = sample_record(None, RecordStatus::Pending);
    complete.completeness_score = 1.0;
    let mut sparse = sample_record(None, RecordStatus::NeedsReview);
    sparse.completeness_score = 0.3;
    let approved = sample_record(None, RecordStatus::Approved);

    tables.records.insert(complete.id, complete.clone()).await;
    tables.records.insert(sparse.id, sparse.clone()).await;
    tables.records.insert(approved.id, approved).await;

    let (records, total) = tables
        .review_queue(None, None, None, "completeness", 1, 20)
        .await;
    assert_eq!(total, 2);
    assert_eq!(records[0].id, sparse.id);
    assert_eq!(records[1].id, complete.id);
}
