use super::{AssetKind, DiagramRenderer, ElementFormat, RenderError, RenderedElement};

/// Renders diagram source through a Kroki-compatible HTTP service.
///
/// `POST {endpoint}/{language}/png` with the source as the body; a 400 reply
/// carries the diagram syntax error.
#[derive(Debug, Clone)]
pub struct KrokiRenderer {
    client: reqwest::Client,
    endpoint: String,
}

impl KrokiRenderer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_owned(),
        }
    }

    fn url(&self, language: &str, theme: &str) -> String {
        let language = language.to_ascii_lowercase();
        if theme.is_empty() || theme == "default" {
            format!("{}/{}/png", self.endpoint, language)
        } else {
            format!("{}/{}/png?theme={}", self.endpoint, language, theme)
        }
    }
}

impl DiagramRenderer for KrokiRenderer {
    #[tracing::instrument(skip(self, source, kind), fields(kind = kind.label(), len = source.len()))]
    async fn render(
        &self,
        source: &str,
        kind: &AssetKind,
        theme: &str,
    ) -> Result<RenderedElement, RenderError> {
        let AssetKind::Diagram { language } = kind else {
            return Err(RenderError::Unsupported(kind.label().to_owned()));
        };

        let response = self
            .client
            .post(self.url(language, theme))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(source.to_owned())
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(RenderError::Syntax {
                kind: language.clone(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        if !status.is_success() {
            return Err(RenderError::Service {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(RenderedElement {
            format: ElementFormat::Png,
            bytes: response.bytes().await?,
        })
    }
}
