use serde::Deserialize;
use serde_json::json;

use super::{BatchUpdate, DocumentId, DocumentService, DocumentSnapshot, Request};
use crate::error::ServiceError;

/// REST client for the Google Docs v1 API.
#[derive(Debug, Clone)]
pub struct GoogleDocsClient {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl GoogleDocsClient {
    pub fn new(endpoint: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint, access_token)
    }

    pub fn with_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            access_token: access_token.into(),
        }
    }

    /// Build a client from config, failing if no token is available.
    pub fn from_config(config: &crate::Config) -> Result<Self, ServiceError> {
        let token = config
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(ServiceError::MissingToken)?;
        Ok(Self::new(&config.docs_endpoint, token))
    }

    fn documents_url(&self) -> String {
        format!("{}/v1/documents", self.endpoint)
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ServiceError> {
        let response = request.bearer_auth(&self.access_token).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Created {
    document_id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

fn api_error(status: u16, body: &[u8]) -> ServiceError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => ServiceError::Api {
            status,
            message: envelope.error.message,
            reason: envelope.error.status,
        },
        Err(_) => ServiceError::Api {
            status,
            message: String::from_utf8_lossy(body).into_owned(),
            reason: None,
        },
    }
}

impl DocumentService for GoogleDocsClient {
    #[tracing::instrument(skip(self))]
    async fn create(&self, title: &str) -> Result<DocumentId, ServiceError> {
        let created: Created = self
            .send(self.client.post(self.documents_url()).json(&json!({ "title": title })))
            .await?;
        tracing::debug!(document = %created.document_id, "created document");
        Ok(DocumentId::new(created.document_id))
    }

    #[tracing::instrument(skip(self, requests), fields(requests = requests.len()))]
    async fn batch_update(
        &self,
        document: &DocumentId,
        requests: &[Request],
    ) -> Result<(), ServiceError> {
        let url = format!("{}/{}:batchUpdate", self.documents_url(), document);
        let _reply: serde_json::Value = self
            .send(self.client.post(url).json(&BatchUpdate { requests }))
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, document: &DocumentId) -> Result<DocumentSnapshot, ServiceError> {
        let url = format!("{}/{}", self.documents_url(), document);
        self.send(self.client.get(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_reads_google_envelope() {
        let body = br#"{"error":{"code":401,"message":"Request had invalid authentication credentials.","status":"UNAUTHENTICATED"}}"#;
        let err = api_error(401, body);
        assert!(err.is_auth_expired());
        match err {
            ServiceError::Api {
                status,
                message,
                reason,
            } => {
                assert_eq!(status, 401);
                assert!(message.starts_with("Request had invalid"));
                assert_eq!(reason.as_deref(), Some("UNAUTHENTICATED"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_api_error_falls_back_to_raw_body() {
        let err = api_error(502, b"bad gateway");
        assert!(matches!(
            err,
            ServiceError::Api { status: 502, ref message, reason: None } if message == "bad gateway"
        ));
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let config = crate::Config::default();
        assert!(matches!(
            GoogleDocsClient::from_config(&config),
            Err(ServiceError::MissingToken)
        ));
    }

    #[test]
    fn test_endpoint_trailing_slash_is_trimmed() {
        let client = GoogleDocsClient::new("https://docs.example.com/", "t");
        assert_eq!(client.documents_url(), "https://docs.example.com/v1/documents");
    }
}
