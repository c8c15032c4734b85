mod common;

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::KeywordEmbedder;
use tempfile::TempDir;
use valplan_core::rag::{Chunker, Ingestor};
use valplan_core::{RagError, RagRetriever, SqliteRagIndex};

fn docs(dir: &TempDir) -> std::path::PathBuf {
    let docs = dir.path().join("docs");
    fs::create_dir_all(docs.join("nested")).unwrap();
    fs::write(
        docs.join("power.md"),
        "Modern Standby with WiFi is validated by TCID 1111111111.\n\nResume must complete within one second.",
    )
    .unwrap();
    fs::write(
        docs.join("nested/usb.txt"),
        "USB4 tunneling over Type-C is validated by TCID 3333333333.",
    )
    .unwrap();
    fs::write(docs.join("diagram.png"), [0u8, 159, 146, 150]).unwrap();
    docs
}

#[tokio::test]
async fn reingest_skips_unchanged_documents() {
    let dir = TempDir::new().unwrap();
    let docs = docs(&dir);
    let index = SqliteRagIndex::new(dir.path().join("rag_index/index.sqlite")).unwrap();
    let embedder = KeywordEmbedder::new();
    let ingestor = Ingestor::new(&index, &embedder, Chunker::new(12, 3));

    let first = ingestor.ingest_directory(&docs).await.unwrap();
    assert_eq!(first.files_scanned, 2);
    assert_eq!(first.documents_indexed, 2);
    assert!(first.chunks_written >= 2);

    let calls = embedder.calls.load(Ordering::SeqCst);
    let second = ingestor.ingest_directory(&docs).await.unwrap();
    assert_eq!(second.documents_unchanged, 2);
    assert_eq!(second.documents_indexed, 0);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), calls);

    fs::write(docs.join("power.md"), "Display brightness is covered by TCID 4444444444.").unwrap();
    let third = ingestor.ingest_directory(&docs).await.unwrap();
    assert_eq!(third.documents_indexed, 1);
    assert_eq!(third.documents_unchanged, 1);

    let stats = index.stats().unwrap();
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.embedding_model.as_deref(), Some("keyword-test"));
}

#[tokio::test]
async fn deleted_documents_leave_the_index() {
    let dir = TempDir::new().unwrap();
    let docs = docs(&dir);
    let path = dir.path().join("index.sqlite");
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = SqliteRagIndex::new(&path).unwrap();
    let ingestor = Ingestor::new(&index, embedder.as_ref(), Chunker::new(50, 5));
    ingestor.ingest_directory(&docs).await.unwrap();

    fs::remove_file(docs.join("nested/usb.txt")).unwrap();
    let report = ingestor.ingest_directory(&docs).await.unwrap();
    assert_eq!(report.documents_removed, 1);
    assert_eq!(report.documents_unchanged, 1);
    assert_eq!(index.stats().unwrap().documents, 1);

    let retriever = RagRetriever::open_if_exists(&path, embedder.clone())
        .unwrap()
        .unwrap();
    let hits = retriever.retrieve("USB4 tunneling", 5).await.unwrap();
    assert!(hits.iter().all(|hit| hit.document_path == "power.md"));
}

#[tokio::test]
async fn switching_embedding_model_is_rejected() {
    let dir = TempDir::new().unwrap();
    let docs = docs(&dir);
    let index = SqliteRagIndex::new(dir.path().join("index.sqlite")).unwrap();
    let embedder = KeywordEmbedder::new();
    Ingestor::new(&index, &embedder, Chunker::new(50, 5))
        .ingest_directory(&docs)
        .await
        .unwrap();

    let other = KeywordEmbedder::with_model("keyword-other");
    let err = Ingestor::new(&index, &other, Chunker::new(50, 5))
        .ingest_directory(&docs)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::ModelMismatch { ref actual, .. } if actual == "keyword-other"));
    assert_eq!(other.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn non_utf8_documents_are_skipped() {
    let dir = TempDir::new().unwrap();
    let docs = docs(&dir);
    fs::write(docs.join("broken.md"), [0xffu8, 0xfe, 0x00]).unwrap();
    let index = SqliteRagIndex::new(dir.path().join("index.sqlite")).unwrap();
    let embedder = KeywordEmbedder::new();

    let report = Ingestor::new(&index, &embedder, Chunker::new(50, 5))
        .ingest_directory(&docs)
        .await
        .unwrap();
    assert_eq!(report.files_scanned, 3);
    assert_eq!(report.documents_skipped, 1);
    assert_eq!(report.documents_indexed, 2);
}

#[tokio::test]
async fn context_joins_nearest_chunks() {
    let dir = TempDir::new().unwrap();
    let docs = docs(&dir);
    let path = dir.path().join("index.sqlite");
    let embedder = Arc::new(KeywordEmbedder::new());
    let index = SqliteRagIndex::new(&path).unwrap();
    Ingestor::new(&index, embedder.as_ref(), Chunker::new(50, 5))
        .ingest_directory(&docs)
        .await
        .unwrap();

    let retriever = RagRetriever::open_if_exists(&path, embedder.clone())
        .unwrap()
        .unwrap();
    let hits = retriever.retrieve("USB4 tunneling", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_path, "nested/usb.txt");

    let context = retriever.context("wifi standby", 2).await.unwrap();
    let lines: Vec<&str> = context.split('\n').collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("1111111111"));
}

#[tokio::test]
async fn missing_index_and_docs_are_reported() {
    let dir = TempDir::new().unwrap();
    let embedder = Arc::new(KeywordEmbedder::new());
    let retriever =
        RagRetriever::open_if_exists(dir.path().join("absent.sqlite"), embedder.clone()).unwrap();
    assert!(retriever.is_none());

    let index = SqliteRagIndex::new(dir.path().join("index.sqlite")).unwrap();
    let err = Ingestor::new(&index, embedder.as_ref(), Chunker::new(10, 2))
        .ingest_directory(dir.path().join("nowhere"))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::MissingDocuments(_)));
}
