use url::Url;

use super::{AssetStore, RasterImage, UploadError};
use crate::config::AssetStoreConfig;

/// Content-addressed uploads to an HTTP object store.
///
/// Images are `PUT` to `{upload_base}/{blake3}.{ext}` and embedded from the
/// same name under `public_base`, so uploading identical bytes twice yields
/// the same URL.
#[derive(Debug, Clone)]
pub struct HttpAssetStore {
    client: reqwest::Client,
    upload_base: String,
    public_base: String,
    token: Option<String>,
}

impl HttpAssetStore {
    pub fn new(config: &AssetStoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_base: config.upload_base.trim_end_matches('/').to_owned(),
            public_base: config.public_base.trim_end_matches('/').to_owned(),
            token: config.upload_token.clone(),
        }
    }

    pub fn object_name(image: &RasterImage) -> String {
        format!("{}.{}", blake3::hash(&image.bytes).to_hex(), image.extension)
    }

    fn public_url(&self, name: &str) -> Result<Url, UploadError> {
        Ok(Url::parse(&format!("{}/{}", self.public_base, name))?)
    }
}

impl AssetStore for HttpAssetStore {
    #[tracing::instrument(skip(self, image), fields(bytes = image.bytes.len()))]
    async fn upload(&self, image: &RasterImage) -> Result<String, UploadError> {
        let name = Self::object_name(image);
        let public = self.public_url(&name)?;

        let mut request = self
            .client
            .put(format!("{}/{}", self.upload_base, name))
            .header(reqwest::header::CONTENT_TYPE, image.mime)
            .body(image.bytes.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        tracing::debug!(url = %public, "uploaded asset");
        Ok(public.into())
    }
}
