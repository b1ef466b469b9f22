//! amp-transport エラー型

use thiserror::Error;

/// 配布プロトコルのエラー
#[derive(Debug, Error)]
pub enum TransportError {
    /// メッセージ/フレームが途中で終わっている
    #[error("Message or frame too short")]
    TooShort,
    /// デコード後に余分なバイトが残っている
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
    /// 未知のメッセージ種別
    #[error("Unknown message type 0x{0:02x}")]
    UnknownMessageType(u8),
    /// 対応していないプロトコルバージョン
    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    /// クレデンシャルが u16 に収まらない
    #[error("Credential length {0} exceeds u16")]
    CredentialTooLong(usize),
    /// ペイロードが u32 に収まらない
    #[error("Payload length {0} exceeds u32")]
    PayloadTooLong(usize),
    /// フレームが上限を超えている
    #[error("Frame length {len} exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },
    /// 登録されていない圧縮方式
    #[error("Unknown compression type 0x{0:02x}")]
    UnknownCompression(u8),
    /// 展開結果の長さがヘッダと一致しない
    #[error("Decompressed length {actual} does not match declared {declared}")]
    LengthMismatch { declared: usize, actual: usize },
    /// プリアンブルのマジックが違う
    #[error("Invalid preamble magic")]
    BadMagic,
    /// チャンクサイズがフレームに収まらない
    #[error("Chunk size {size} must be between 1 and {max}")]
    InvalidChunkSize { size: usize, max: usize },
    /// 受信ファイルが宣言サイズを超えた
    #[error("Received {received} bytes, more than the announced {expected}")]
    Overflow { expected: u64, received: u64 },
    /// 不正なエラーコード
    #[error("Unknown error code {0}")]
    UnknownErrorCode(u8),
    /// UTF-8 として不正
    #[error("Invalid UTF-8 in error message")]
    InvalidUtf8,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// amp-transport の Result 型
pub type TransportResult<T> = Result<T, TransportError>;
