use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::ExtractedInvoice;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document storage failed: {0}")]
    Storage(String),

    #[error("extraction failed: {0}")]
    Failed(String),

    /// No extractor is wired for this deployment. Callers fall back to
    /// manual entry; nothing is written.
    #[error("no invoice extractor configured")]
    Unavailable,
}

/// Durable storage for invoice/certificate scans.
///
/// The pipeline only stores bytes and forwards the returned reference; it
/// never reads scans back on the hot path.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn store(&self, bytes: Vec<u8>, path: &str) -> Result<String, ExtractionError>;
}

/// Opaque AI extraction collaborator.
///
/// Output feeds the intake validation pipeline, it is not a bypass of it.
#[async_trait]
pub trait InvoiceExtractor: Send + Sync {
    async fn extract(&self, document_url: &str) -> Result<ExtractedInvoice, ExtractionError>;
}

/// In-memory document store for tests and the default single-process runtime.
///
/// Returned references use the `mem://` scheme; storing to the same path
/// twice overwrites, like an object store would.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a stored blob back by its returned url.
    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        let blobs = self.blobs.read().ok()?;
        blobs.get(url).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn store(&self, bytes: Vec<u8>, path: &str) -> Result<String, ExtractionError> {
        if path.trim().is_empty() {
            return Err(ExtractionError::Storage(
                "document path cannot be empty".to_string(),
            ));
        }

        let url = format!("mem://{}", path.trim());
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| ExtractionError::Storage("lock poisoned".to_string()))?;
        blobs.insert(url.clone(), bytes);
        Ok(url)
    }
}

/// Extractor whose answers are scripted per document url.
///
/// Unscripted urls fail with [`ExtractionError::Unavailable`], which is also
/// the behavior of an unconfigured deployment: the caller degrades to manual
/// entry.
#[derive(Debug, Default)]
pub struct ScriptedExtractor {
    results: RwLock<HashMap<String, ExtractedInvoice>>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the answer for one document url.
    pub fn script(&self, document_url: impl Into<String>, invoice: ExtractedInvoice) {
        if let Ok(mut results) = self.results.write() {
            results.insert(document_url.into(), invoice);
        }
    }
}

#[async_trait]
impl InvoiceExtractor for ScriptedExtractor {
    async fn extract(&self, document_url: &str) -> Result<ExtractedInvoice, ExtractionError> {
        let results = self
            .results
            .read()
            .map_err(|_| ExtractionError::Failed("lock poisoned".to_string()))?;
        match results.get(document_url) {
            Some(invoice) => Ok(invoice.clone()),
            None => Err(ExtractionError::Unavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExtractedLine;

    fn sample_invoice() -> ExtractedInvoice {
        ExtractedInvoice {
            provider_name: "ACME, C.A.".to_string(),
            provider_tax_id: "J-12345678-9".to_string(),
            invoice_number: "F-001".to_string(),
            issue_date: None,
            total_amount: Some(34800),
            lines: vec![ExtractedLine {
                name: "cemento gris tipo i".to_string(),
                quantity: 50,
                unit_price: 600,
            }],
            purchase_order_ref: None,
            delivery_note_ref: None,
            vehicle_plate: None,
        }
    }

    #[tokio::test]
    async fn stored_scan_is_retrievable_by_returned_url() {
        let store = InMemoryDocumentStore::new();
        let url = store
            .store(b"scan bytes".to_vec(), "intake/f-001.jpg")
            .await
            .unwrap();

        assert_eq!(url, "mem://intake/f-001.jpg");
        assert_eq!(store.get(&url).unwrap(), b"scan bytes".to_vec());
    }

    #[tokio::test]
    async fn storing_empty_path_is_an_error() {
        let store = InMemoryDocumentStore::new();
        let err = store.store(vec![1, 2, 3], "  ").await.unwrap_err();
        assert!(matches!(err, ExtractionError::Storage(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn scripted_extractor_answers_per_url() {
        let extractor = ScriptedExtractor::new();
        extractor.script("mem://intake/f-001.jpg", sample_invoice());

        let invoice = extractor.extract("mem://intake/f-001.jpg").await.unwrap();
        assert_eq!(invoice.invoice_number, "F-001");
        assert_eq!(invoice.lines.len(), 1);

        let err = extractor.extract("mem://other.jpg").await.unwrap_err();
        assert!(matches!(err, ExtractionError::Unavailable));
    }
}
