use std::env;
use std::fs;
use std::path::PathBuf;

use crate::core::errors::ApiError;

/// Filesystem layout for persistent data.
///
/// Everything lives under one data directory: the chat database, the
/// vector database, uploaded blobs and log files.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub blob_dir: PathBuf,
    pub db_path: PathBuf,
    pub vector_db_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        Self::at(data_dir)
    }

    /// Root all paths under an explicit directory (used by tests).
    pub fn at(data_dir: PathBuf) -> Self {
        let log_dir = data_dir.join("logs");
        let blob_dir = data_dir.join("blobs");
        let db_path = data_dir.join("dossier.db");
        let vector_db_path = data_dir.join("vectors.db");

        for dir in [&data_dir, &log_dir, &blob_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            log_dir,
            blob_dir,
            db_path,
            vector_db_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("DOSSIER_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return PathBuf::from("data");
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("Dossier");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("Dossier");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    PathBuf::from(xdg).join("dossier")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Which vector backend to run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorBackend {
    /// In-process SQLite store with chunk text held inline.
    Sqlite,
    /// Remote nearest-neighbor service that returns ids only.
    Matching {
        endpoint: String,
        index_id: String,
    },
}

/// Runtime settings, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_top_k: usize,
    /// Sentinel that switches a conversation into elevated mode.
    /// Unset disables the sentinel entirely.
    pub superuser_secret: Option<String>,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub gemini_embedding_model: String,
    pub vector_backend: VectorBackend,
}

impl Settings {
    pub fn from_env() -> Result<Self, ApiError> {
        let port = env_parse("PORT", 5000u16)?;
        let chunk_size = env_parse("CHUNK_SIZE", 1000usize)?;
        let chunk_overlap = env_parse("CHUNK_OVERLAP", 200usize)?;
        let retrieval_top_k = env_parse("RETRIEVAL_TOP_K", 5usize)?;

        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(ApiError::Configuration(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                chunk_overlap, chunk_size
            )));
        }

        let superuser_secret = env::var("SUPERUSER_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let gemini_api_key = env::var("GEMINI_API_KEY").unwrap_or_default();
        let gemini_base_url = env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());
        let gemini_model =
            env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-pro".to_string());
        let gemini_embedding_model = env::var("GEMINI_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-004".to_string());

        let vector_backend = match env::var("VECTOR_BACKEND").as_deref() {
            Ok("matching") => {
                let endpoint = env::var("MATCHING_ENDPOINT").map_err(|_| {
                    ApiError::Configuration(
                        "MATCHING_ENDPOINT is required when VECTOR_BACKEND=matching".to_string(),
                    )
                })?;
                let index_id = env::var("MATCHING_INDEX_ID").map_err(|_| {
                    ApiError::Configuration(
                        "MATCHING_INDEX_ID is required when VECTOR_BACKEND=matching".to_string(),
                    )
                })?;
                VectorBackend::Matching { endpoint, index_id }
            }
            Ok("sqlite") | Err(_) => VectorBackend::Sqlite,
            Ok(other) => {
                return Err(ApiError::Configuration(format!(
                    "unknown VECTOR_BACKEND: {}",
                    other
                )))
            }
        };

        Ok(Settings {
            port,
            chunk_size,
            chunk_overlap,
            retrieval_top_k,
            superuser_secret,
            gemini_api_key,
            gemini_base_url,
            gemini_model,
            gemini_embedding_model,
            vector_backend,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ApiError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ApiError::Configuration(format!("invalid value for {}: {}", key, raw))),
        Err(_) => Ok(default),
    }
}
