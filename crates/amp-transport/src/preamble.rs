//! 接続プリアンブル
//!
//! ```text
//! client → server: [b"AMMH"][version: u8][compression: u8]
//! server → client: [b"AMOK"][version: u8][compression: u8][tls: u8 (0|1)]
//! ```
//!
//! ゲームポートを共有するモード（bind port = -1）では、ホストは受信した
//! 先頭バイトを [`is_distribution_preamble`] で見て配布サーバーに回す。

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{TransportError, TransportResult};

/// クライアント側マジック
pub const CLIENT_MAGIC: [u8; 4] = *b"AMMH";

/// サーバー側マジック
pub const SERVER_MAGIC: [u8; 4] = *b"AMOK";

pub const CLIENT_HELLO_LEN: usize = 6;
pub const SERVER_HELLO_LEN: usize = 7;

/// クライアントの挨拶
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientHello {
    pub version: u8,
    /// 希望する圧縮種別
    pub compression: u8,
}

impl ClientHello {
    pub fn to_bytes(&self) -> [u8; CLIENT_HELLO_LEN] {
        let mut out = [0u8; CLIENT_HELLO_LEN];
        out[..4].copy_from_slice(&CLIENT_MAGIC);
        out[4] = self.version;
        out[5] = self.compression;
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> TransportResult<Self> {
        if bytes.len() < CLIENT_HELLO_LEN {
            return Err(TransportError::TooShort);
        }
        if bytes[..4] != CLIENT_MAGIC {
            return Err(TransportError::BadMagic);
        }
        Ok(ClientHello {
            version: bytes[4],
            compression: bytes[5],
        })
    }

    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> TransportResult<Self> {
        let mut buf = [0u8; CLIENT_HELLO_LEN];
        reader.read_exact(&mut buf).await?;
        let hello = Self::from_bytes(&buf);
        if let Err(e) = &hello {
            debug!(error = %e, "connection did not start with a distribution preamble");
        }
        hello
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> TransportResult<()> {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// サーバーの応答
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerHello {
    pub version: u8,
    /// 実際に使う圧縮種別
    pub compression: u8,
    /// 以降を TLS に切り替えるか
    pub tls: bool,
}

impl ServerHello {
    pub fn to_bytes(&self) -> [u8; SERVER_HELLO_LEN] {
        let mut out = [0u8; SERVER_HELLO_LEN];
        out[..4].copy_from_slice(&SERVER_MAGIC);
        out[4] = self.version;
        out[5] = self.compression;
        out[6] = u8::from(self.tls);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> TransportResult<Self> {
        if bytes.len() < SERVER_HELLO_LEN {
            return Err(TransportError::TooShort);
        }
        if bytes[..4] != SERVER_MAGIC {
            return Err(TransportError::BadMagic);
        }
        Ok(ServerHello {
            version: bytes[4],
            compression: bytes[5],
            tls: bytes[6] != 0,
        })
    }

    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> TransportResult<Self> {
        let mut buf = [0u8; SERVER_HELLO_LEN];
        reader.read_exact(&mut buf).await?;
        Self::from_bytes(&buf)
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> TransportResult<()> {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// 先頭バイトが配布プロトコルのプリアンブルか（4 バイト以上必要）
pub fn is_distribution_preamble(peek: &[u8]) -> bool {
    peek.len() >= CLIENT_MAGIC.len() && peek[..CLIENT_MAGIC.len()] == CLIENT_MAGIC
}
