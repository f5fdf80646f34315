//! Rate-limited document submission.

use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::document::Document;
use super::transport::{OutboundRequest, Transport};
use crate::error::{Result, TollgateError};
use crate::ratelimit::AdmissionGate;

/// Proof that the service accepted a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub doc_id: String,
    pub status: u16,
    /// When the permit for this submission was granted
    pub granted_at: Instant,
}

/// Submits documents to the remote service, one permit per request.
pub struct DocumentClient<G: AdmissionGate, T: Transport> {
    gate: G,
    transport: T,
}

impl<G: AdmissionGate, T: Transport> DocumentClient<G, T> {
    /// Create a new client sharing `gate` with any other callers.
    pub fn new(gate: G, transport: T) -> Self {
        Self { gate, transport }
    }

    /// Get the admission gate.
    pub fn gate(&self) -> &G {
        &self.gate
    }

    /// Serialize and submit a document, waiting for a permit first.
    ///
    /// The payload is serialized before a permit is taken, so a document that
    /// cannot be encoded never consumes rate budget.
    pub async fn create_document(&self, document: &Document, sign: &str) -> Result<Receipt> {
        self.create_document_until(document, sign, std::future::pending::<()>())
            .await
    }

    /// Like [`create_document`](Self::create_document), but abandons the wait
    /// for a permit when `cancel` resolves first.
    ///
    /// Fails with [`TollgateError::Cancelled`] in that case; nothing is sent and
    /// no permit is recorded. Once a permit is granted the request is sent.
    #[instrument(skip(self, document, sign, cancel), fields(doc_id = %document.doc_id))]
    pub async fn create_document_until<F>(
        &self,
        document: &Document,
        sign: &str,
        cancel: F,
    ) -> Result<Receipt>
    where
        F: Future<Output = ()>,
    {
        let body = document.to_json()?;

        let permit = tokio::select! {
            biased;
            _ = cancel => {
                debug!("Submission cancelled while waiting for a permit");
                return Err(TollgateError::Cancelled);
            }
            permit = self.gate.acquire() => permit,
        };

        let response = self
            .transport
            .send(OutboundRequest {
                body,
                bearer: sign.to_string(),
            })
            .await?;

        if !response.is_success() {
            warn!(
                status = response.status,
                body = %response.body,
                "Document creation failed"
            );
            return Err(TollgateError::Rejected {
                status: response.status,
                body: response.body,
            });
        }

        info!(status = response.status, "Document created");
        Ok(Receipt {
            doc_id: document.doc_id.clone(),
            status: response.status,
            granted_at: permit.granted_at(),
        })
    }
}
