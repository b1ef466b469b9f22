//! 配布サーバーのエラー型

use amp_secret::SecretError;
use amp_transport::{ErrorCode, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// すでに起動している
    #[error("distribution server is already running")]
    AlreadyRunning,

    /// 起動していない
    #[error("distribution server is not running")]
    NotRunning,

    /// 起動設定が不正
    #[error("invalid server options: {0}")]
    InvalidOptions(String),

    /// 相手がプロトコルに従っていない
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// サーバーがエラー応答を返した
    #[error("server replied {code:?}: {message}")]
    Remote { code: ErrorCode, message: String },

    /// 証明書ファイルの読み書きや生成に失敗した
    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("certificate generation failed: {0}")]
    CertificateGeneration(#[from] rcgen::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("manifest format error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;
