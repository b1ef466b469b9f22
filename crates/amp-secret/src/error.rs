//! シークレットストアのエラー型

use thiserror::Error;

/// シークレット操作のエラー
#[derive(Debug, Error)]
pub enum SecretError {
    /// OS の乱数源からトークンを生成できなかった
    #[error("Random source unavailable: {0}")]
    RandomSource(getrandom::Error),
    /// Base64 デコードに失敗
    #[error("Invalid secret token encoding")]
    InvalidEncoding,
    /// トークン長が不正（32 バイト以外）
    #[error("Invalid secret token length: {0} bytes (expected 32)")]
    InvalidLength(usize),
    /// ストアに存在しないトークン
    #[error("Unknown secret")]
    Unknown,
    /// 有効期限切れ
    #[error("Secret expired (issued at {issued_at}, valid for {validity_secs}s)")]
    Expired { issued_at: i64, validity_secs: u64 },
    /// 永続化ファイルの読み書きに失敗
    #[error("Secret store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// 永続化ファイルのフォーマットが不正
    #[error("Secret store format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// `amp-secret` 内の Result エイリアス
pub type SecretResult<T> = Result<T, SecretError>;
