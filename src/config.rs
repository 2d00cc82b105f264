use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub endpoint: EndpointConfig,
    pub optimizer: OptimizerConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

/// Connection and sampling settings for per-file inference calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub base_url: String,
    pub model: Option<String>,
    pub timeout_ms: u64,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            model: None,
            timeout_ms: 60000,
            temperature: 0.3,
            max_tokens: 4000,
        }
    }
}

impl EndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Sampling settings for instruction optimization calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub timeout_ms: u64,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            temperature: 0.5,
            max_tokens: 2000,
        }
    }
}

impl OptimizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub auto_tune: bool,
    pub score_threshold: i64,
    pub poll_interval_ms: u64,
    pub extensions: Vec<String>,
    /// Fallback markers for languages without an entry below
    pub comment_markers: Vec<String>,
    /// Comment markers keyed by lower-case instruction language
    pub language_markers: BTreeMap<String, Vec<String>>,
}

fn markers(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_language_markers() -> BTreeMap<String, Vec<String>> {
    let hash = ["python", "ruby"];
    let slash = ["rust", "javascript", "typescript", "java", "c", "c++", "cpp", "c#", "csharp", "go"];

    let mut map = BTreeMap::new();
    for language in hash {
        map.insert(language.to_string(), markers(&["#"]));
    }
    for language in slash {
        map.insert(language.to_string(), markers(&["//", "/*"]));
    }
    map.insert("php".to_string(), markers(&["#", "//", "/*"]));
    map
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auto_tune: true,
            score_threshold: 50,
            poll_interval_ms: 500,
            extensions: ["py", "js", "java", "cpp", "c", "h", "cs", "php", "rb", "go", "rs", "ts"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            comment_markers: markers(&["#", "//", "/*"]),
            language_markers: default_language_markers(),
        }
    }
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Comment markers for an instruction language, case-insensitive
    pub fn markers_for(&self, language: &str) -> &[String] {
        self.language_markers
            .get(&language.trim().to_lowercase())
            .unwrap_or(&self.comment_markers)
    }

    /// Case-insensitive check against the supported extension set
    pub fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions
                    .iter()
                    .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub instructions_dir: PathBuf,
    pub analysis_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            instructions_dir: PathBuf::from("prompts"),
            analysis_dir: PathBuf::from("evolution_data"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            endpoint: EndpointConfig::default(),
            optimizer: OptimizerConfig::default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_local_endpoint() {
        let config = Config::default();
        assert_eq!(config.endpoint.base_url, "http://localhost:1234/v1");
        assert_eq!(config.endpoint.timeout(), Duration::from_secs(60));
        assert_eq!(config.optimizer.timeout(), Duration::from_secs(30));
        assert_eq!(config.pipeline.score_threshold, 50);
        assert!(config.pipeline.auto_tune);
    }

    #[test]
    fn test_supports_known_extensions() {
        let pipeline = PipelineConfig::default();
        assert!(pipeline.supports(Path::new("src/main.rs")));
        assert!(pipeline.supports(Path::new("script.PY")));
        assert!(!pipeline.supports(Path::new("blob.bin")));
        assert!(!pipeline.supports(Path::new("Makefile")));
    }

    #[test]
    fn test_markers_follow_language() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.markers_for("Python"), ["#".to_string()]);
        assert_eq!(pipeline.markers_for("Rust"), ["//".to_string(), "/*".to_string()]);
        assert_eq!(pipeline.markers_for("COBOL"), pipeline.comment_markers.as_slice());
    }

    #[test]
    fn test_supports_dotted_entries() {
        let pipeline = PipelineConfig {
            extensions: vec![".py".to_string()],
            ..Default::default()
        };
        assert!(pipeline.supports(Path::new("a.py")));
    }

    #[test]
    fn test_load_partial_yaml_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("promptmill.yml");
        fs::write(
            &path,
            "endpoint:\n  base_url: http://127.0.0.1:8080/v1\npipeline:\n  auto_tune: false\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.endpoint.base_url, "http://127.0.0.1:8080/v1");
        assert_eq!(config.endpoint.max_tokens, 4000);
        assert!(!config.pipeline.auto_tune);
        assert_eq!(config.storage.analysis_dir, PathBuf::from("evolution_data"));
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let missing = PathBuf::from("/definitely/not/here/promptmill.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }
}
