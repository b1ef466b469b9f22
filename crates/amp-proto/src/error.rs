//! amp-proto エラー型

use thiserror::Error;

/// サイドチャンネルバッファの読み書きエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    /// バッファが途中で終わっている
    #[error("Buffer too short")]
    TooShort,
    /// VarInt が 5 バイトを超えた
    #[error("VarInt too long")]
    VarIntTooLong,
    /// 文字列長が負、または上限を超えている
    #[error("String length {len} exceeds maximum {max}")]
    StringTooLong { len: i64, max: usize },
    /// UTF-8 として不正
    #[error("Invalid UTF-8 in string payload")]
    InvalidUtf8,
}
