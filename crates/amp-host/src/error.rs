//! ホスト層のエラー型

use amp_secret::SecretError;
use amp_server::ServerError;
use thiserror::Error;

/// `config.yml` の読み書きエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config.yml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 生成タスクが途中で落ちた
    #[error("background task failed: {0}")]
    Task(String),

    #[error("failed to install log subscriber: {0}")]
    Logging(String),
}

pub type HostResult<T> = Result<T, HostError>;
