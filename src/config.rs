use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::engine::EngineConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub data_dir: PathBuf,
    pub curriculum_path: PathBuf,
    pub curriculum_level: String,
    pub vocab_path: PathBuf,
    /// Target words handed to the generator per exercise
    pub vocab_per_exercise: usize,
    pub engine: EngineConfig,
    /// Forces the offline generator, judge and labeler
    pub llm_mock: bool,
    pub target_language: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let data_dir = env_string("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));
        let curriculum_path = env_string("CURRICULUM_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("curriculum.json"));
        let vocab_path = env_string("VOCAB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("vocab_data.json"));

        Self {
            host,
            port,
            log_level,
            curriculum_path,
            vocab_path,
            data_dir,
            curriculum_level: env_string("CURRICULUM_LEVEL")
                .unwrap_or_else(|| "beginner".to_string()),
            vocab_per_exercise: env_string("VOCAB_PER_EXERCISE")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(5),
            engine: EngineConfig::from_env(),
            llm_mock: env_bool("LLM_MOCK").unwrap_or(false),
            target_language: env_string("TARGET_LANGUAGE")
                .unwrap_or_else(|| "Korean".to_string()),
        }
    }

    /// Offline configuration rooted at `data_dir`, ignoring the environment.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            log_level: "info".to_string(),
            curriculum_path: data_dir.join("curriculum.json"),
            vocab_path: data_dir.join("vocab_data.json"),
            data_dir,
            curriculum_level: "beginner".to_string(),
            vocab_per_exercise: 5,
            engine: EngineConfig::default(),
            llm_mock: true,
            target_language: "Korean".to_string(),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    match env_string(key)?.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
