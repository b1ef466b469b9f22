//! フレーム
//!
//! プリアンブル以降、メッセージは 1 つずつフレームに包んで送る。
//!
//! ```text
//! [compressed_len: u32 BE][original_len: u32 BE][compressed bytes: compressed_len]
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::compression::CompressionCodec;
use crate::error::{TransportError, TransportResult};

/// フレームヘッダ長
pub const FRAME_HEADER_LEN: usize = 8;

/// 1 フレームの最大バイト数（圧縮前後とも）
pub const MAX_FRAME_SIZE: usize = 1 << 20;

/// メッセージをフレームにする
pub fn encode_frame(codec: &dyn CompressionCodec, message: &[u8]) -> TransportResult<Vec<u8>> {
    check_size(message.len())?;
    let compressed = codec.compress(message)?;
    check_size(compressed.len())?;

    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + compressed.len());
    out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    out.extend_from_slice(&(message.len() as u32).to_be_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// フレームを 1 つ読み、`(メッセージ, 消費バイト数)` を返す
///
/// # 戻り値
/// - `Ok(None)`: まだフレーム 1 つ分のバイトが揃っていない
pub fn decode_frame(
    codec: &dyn CompressionCodec,
    bytes: &[u8],
) -> TransportResult<Option<(Vec<u8>, usize)>> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let (compressed_len, original_len) = parse_header(&bytes[..FRAME_HEADER_LEN])?;
    let total = FRAME_HEADER_LEN + compressed_len;
    let Some(body) = bytes.get(FRAME_HEADER_LEN..total) else {
        return Ok(None);
    };
    let message = codec.decompress(body, original_len)?;
    Ok(Some((message, total)))
}

/// フレームを書き込む
pub async fn write_frame<W>(
    writer: &mut W,
    codec: &dyn CompressionCodec,
    message: &[u8],
) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(codec, message)?;
    writer.write_all(&frame).await?;
    Ok(())
}

/// フレームを 1 つ読む
///
/// # 戻り値
/// - `Ok(None)`: フレーム境界で相手が接続を閉じた
pub async fn read_frame<R>(
    reader: &mut R,
    codec: &dyn CompressionCodec,
) -> TransportResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let (compressed_len, original_len) = parse_header(&header)?;
    let mut body = vec![0u8; compressed_len];
    reader.read_exact(&mut body).await?;
    Ok(Some(codec.decompress(&body, original_len)?))
}

fn parse_header(header: &[u8]) -> TransportResult<(usize, usize)> {
    let compressed_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let original_len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    check_size(compressed_len)?;
    check_size(original_len)?;
    Ok((compressed_len, original_len))
}

fn check_size(len: usize) -> TransportResult<()> {
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}
