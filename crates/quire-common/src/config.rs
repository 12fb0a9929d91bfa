use serde::{Deserialize, Serialize};

use std::future::Future;
use std::path::Path;
use std::path::PathBuf;

use crate::error::ConfigError;

const ENV_ACCESS_TOKEN: &str = "QUIRE_ACCESS_TOKEN";
const ENV_DOCS_ENDPOINT: &str = "QUIRE_DOCS_ENDPOINT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the document service REST API.
    pub docs_endpoint: String,
    /// OAuth bearer token used for the document service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub asset_store: AssetStoreConfig,
    pub renderer: RendererConfig,
    pub export: ExportOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docs_endpoint: "https://docs.googleapis.com".to_owned(),
            access_token: None,
            asset_store: AssetStoreConfig::default(),
            renderer: RendererConfig::default(),
            export: ExportOptions::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from the provided loader.
    pub async fn load(loader: &impl Loader) -> Result<Self, ConfigError> {
        loader.load().await
    }

    /// Saves the configuration using the provided saver.
    pub async fn save(&self, saver: &impl Saver) -> Result<(), ConfigError> {
        saver.save(self).await
    }

    /// Applies `QUIRE_*` environment overrides on top of the loaded values.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(token) = lookup(ENV_ACCESS_TOKEN).filter(|t| !t.is_empty()) {
            self.access_token = Some(token);
        }
        if let Some(endpoint) = lookup(ENV_DOCS_ENDPOINT).filter(|e| !e.is_empty()) {
            self.docs_endpoint = endpoint;
        }
        self
    }
}

/// Where rasterized diagrams are uploaded and how they are read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetStoreConfig {
    /// Objects are `PUT` to `{upload_base}/{name}`.
    pub upload_base: String,
    /// Objects are embedded from `{public_base}/{name}`; must be world readable.
    pub public_base: String,
    /// Optional bearer token for the upload endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_token: Option<String>,
}

impl Default for AssetStoreConfig {
    fn default() -> Self {
        Self {
            upload_base: "http://localhost:9000/quire-assets".to_owned(),
            public_base: "http://localhost:9000/quire-assets".to_owned(),
            upload_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Diagram rendering service base URL.
    pub endpoint: String,
    /// Theme name passed to the renderer.
    pub theme: String,
    /// Background colour used when capturing the rendered element.
    pub background_color: String,
    /// Device pixel ratio used when capturing.
    pub scale: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://kroki.io".to_owned(),
            theme: "default".to_owned(),
            background_color: "#ffffff".to_owned(),
            scale: 2.0,
        }
    }
}

/// How table nodes end up in the exported document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStrategy {
    /// Real tables, built through the placeholder protocol.
    #[default]
    Native,
    /// Tables are rendered to images like diagrams.
    Image,
}

/// Inline image dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width_pt: f64,
    pub height_pt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Also apply a font size/weight approximation of each heading level.
    pub heading_text_styles: bool,
    pub table_strategy: TableStrategy,
    /// Fenced code languages that are rendered as diagrams.
    pub diagram_languages: Vec<String>,
    /// Treat table population failures as fatal instead of a warning.
    pub strict_tables: bool,
    /// Glyph inserted in front of each list item.
    pub bullet: String,
    /// Fixed size for inline images; the service picks one when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<ImageSize>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            heading_text_styles: false,
            table_strategy: TableStrategy::Native,
            diagram_languages: vec!["mermaid".to_owned()],
            strict_tables: false,
            bullet: "• ".to_owned(),
            image_size: None,
        }
    }
}

impl ExportOptions {
    pub fn is_diagram_language(&self, lang: &str) -> bool {
        self.diagram_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(lang))
    }
}

/// The trait for loading configuration data.
pub trait Loader {
    /// Loads the configuration data.
    fn load(&self) -> impl Future<Output = Result<Config, ConfigError>> + Send;
}

/// The trait for saving configuration data.
pub trait Saver {
    /// Saves the configuration data.
    fn save(&self, config: &Config) -> impl Future<Output = Result<(), ConfigError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

/// An implementation of [`Loader`] and [`Saver`] that reads and writes a configuration file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a new [`FileStore`] with the given path.
    ///
    /// [`Config`] data is serialized according to the file extension,
    /// which must be `.json` or `.toml`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> Result<Format, ConfigError> {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            _ => Err(ConfigError::UnsupportedFormat {
                path: self.path.clone(),
            }),
        }
    }

    fn io_error(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Loader for FileStore {
    async fn load(&self) -> Result<Config, ConfigError> {
        let format = self.format()?;
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        match format {
            Format::Json => Ok(serde_json::from_str(&text)?),
            Format::Toml => Ok(toml::from_str(&text)?),
        }
    }
}

impl Saver for FileStore {
    async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let text = match self.format()? {
            Format::Json => serde_json::to_string_pretty(config)?,
            Format::Toml => toml::to_string_pretty(config)?,
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| self.io_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            access_token = "abc"

            [export]
            table_strategy = "image"
            diagram_languages = ["mermaid", "plantuml"]
            "#,
        )
        .unwrap();

        assert_eq!(config.access_token.as_deref(), Some("abc"));
        assert_eq!(config.docs_endpoint, "https://docs.googleapis.com");
        assert_eq!(config.export.table_strategy, TableStrategy::Image);
        assert!(config.export.is_diagram_language("PlantUML"));
        assert_eq!(config.export.bullet, "• ");
    }

    #[test]
    fn test_env_overrides_replace_values() {
        let config = Config::default().with_overrides(|key| match key {
            ENV_ACCESS_TOKEN => Some("from-env".to_owned()),
            ENV_DOCS_ENDPOINT => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.access_token.as_deref(), Some("from-env"));
        // Empty values are ignored.
        assert_eq!(config.docs_endpoint, "https://docs.googleapis.com");
    }

    #[test]
    fn test_unsupported_extension() {
        let store = FileStore::new("/tmp/quire.yaml");
        assert!(matches!(
            store.format(),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_json_roundtrip_through_file_store() {
        let path = std::env::temp_dir().join(format!("quire-config-{}.json", std::process::id()));
        let store = FileStore::new(&path);
        let mut config = Config::default();
        config.export.strict_tables = true;

        config.save(&store).await.unwrap();
        let loaded = Config::load(&store).await.unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }
}
