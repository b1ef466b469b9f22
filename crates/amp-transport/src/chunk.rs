//! ファイル本体の分割と再組み立て
//!
//! サーバーはファイルを `FileResponse { size }` → `Chunk`* → `EndOfTransmission`
//! の順に送る。チャンクはフレーム上限に収まる大きさに切り、ファイルは
//! 先頭から順に読みながら送るので、一度にメモリに載るのは 1 チャンク分だけ。

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

use crate::error::{TransportError, TransportResult};
use crate::frame::MAX_FRAME_SIZE;

/// デフォルトのチャンクサイズ（128 KiB）
pub const CHUNK_SIZE: usize = 128 * 1024;

/// Chunk メッセージの固定部分: version(1) + type(1) + len(4)
pub const CHUNK_OVERHEAD: usize = 6;

/// 1 フレームに収まるチャンクの最大バイト数
pub const MAX_CHUNK_SIZE: usize = MAX_FRAME_SIZE - CHUNK_OVERHEAD;

/// チャンクサイズがフレームに収まるか
///
/// # エラー
/// - `TransportError::InvalidChunkSize`: 0 または [`MAX_CHUNK_SIZE`] 超
pub fn check_chunk_size(chunk_size: usize) -> TransportResult<()> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(TransportError::InvalidChunkSize {
            size: chunk_size,
            max: MAX_CHUNK_SIZE,
        });
    }
    Ok(())
}

/// 宣言サイズ分をチャンク単位で読み出す
pub struct ChunkReader<R> {
    reader: R,
    remaining: u64,
    chunk_size: usize,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// # 引数
    /// - `size`: `FileResponse` で宣言したバイト数
    /// - `chunk_size`: 1 チャンクの最大バイト数
    pub fn new(reader: R, size: u64, chunk_size: usize) -> TransportResult<Self> {
        check_chunk_size(chunk_size)?;
        Ok(ChunkReader {
            reader,
            remaining: size,
            chunk_size,
        })
    }

    /// まだ送っていないバイト数
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// 次のチャンクを読む
    ///
    /// # 戻り値
    /// - `Ok(None)`: 宣言サイズを読み切った
    ///
    /// # エラー
    /// - `TransportError::TooShort`: 宣言サイズに届く前に読み元が終わった
    pub async fn next_chunk(&mut self) -> TransportResult<Option<Vec<u8>>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let len = self.remaining.min(self.chunk_size as u64) as usize;
        let mut chunk = vec![0u8; len];
        match self.reader.read_exact(&mut chunk).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                warn!(
                    remaining = self.remaining,
                    "file ended before its announced size"
                );
                return Err(TransportError::TooShort);
            }
            Err(e) => return Err(e.into()),
        }
        self.remaining -= len as u64;
        Ok(Some(chunk))
    }
}

/// 受信したチャンクを宣言サイズまで貯める
pub struct FileAssembly {
    expected: u64,
    received: Vec<u8>,
}

impl FileAssembly {
    /// `FileResponse` の size から作る
    pub fn new(expected: u64) -> Self {
        FileAssembly {
            expected,
            received: Vec::new(),
        }
    }

    /// チャンクを追加する
    ///
    /// # エラー
    /// - `TransportError::Overflow`: 宣言サイズを超えた
    pub fn add_chunk(&mut self, chunk: &[u8]) -> TransportResult<()> {
        let total = self.received.len() as u64 + chunk.len() as u64;
        if total > self.expected {
            return Err(TransportError::Overflow {
                expected: self.expected,
                received: total,
            });
        }
        self.received.extend_from_slice(chunk);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.received.len() as u64 == self.expected
    }

    pub fn received(&self) -> u64 {
        self.received.len() as u64
    }

    /// `EndOfTransmission` 受信時に呼ぶ。サイズが足りなければエラー
    pub fn finish(self) -> TransportResult<Vec<u8>> {
        if !self.is_complete() {
            return Err(TransportError::TooShort);
        }
        Ok(self.received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_all<R: AsyncRead + Unpin>(reader: &mut ChunkReader<R>) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn test_chunk_reader_splits() {
        let data = vec![7u8; 25];
        let mut reader = ChunkReader::new(&data[..], 25, 10).unwrap();
        let chunks = read_all(&mut reader).await;

        assert_eq!(
            chunks.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![10, 10, 5]
        );
        assert_eq!(reader.remaining(), 0);
    }

    #[tokio::test]
    async fn test_chunk_reader_stops_at_announced_size() {
        let data = vec![1u8; 100];
        let mut reader = ChunkReader::new(&data[..], 30, 64).unwrap();
        assert_eq!(read_all(&mut reader).await, vec![vec![1u8; 30]]);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let mut reader = ChunkReader::new(&[0u8; 0][..], 0, CHUNK_SIZE).unwrap();
        assert!(reader.next_chunk().await.unwrap().is_none());
        assert!(FileAssembly::new(0).finish().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chunk_reader_short_source() {
        let data = [0u8; 5];
        let mut reader = ChunkReader::new(&data[..], 8, 4).unwrap();
        assert_eq!(reader.next_chunk().await.unwrap(), Some(vec![0u8; 4]));
        assert!(matches!(
            reader.next_chunk().await,
            Err(TransportError::TooShort)
        ));
    }

    #[test]
    fn test_chunk_size_bounds() {
        assert!(check_chunk_size(1).is_ok());
        assert!(check_chunk_size(MAX_CHUNK_SIZE).is_ok());
        assert!(matches!(
            check_chunk_size(0),
            Err(TransportError::InvalidChunkSize { size: 0, .. })
        ));
        assert!(check_chunk_size(MAX_CHUNK_SIZE + 1).is_err());
        assert!(ChunkReader::new(&[0u8; 0][..], 0, 0).is_err());
    }

    #[test]
    fn test_largest_chunk_fits_in_frame() {
        use crate::compression::NoneCompression;
        use crate::frame::encode_frame;
        use crate::message::ServerMessage;

        let bytes = ServerMessage::Chunk(vec![0u8; MAX_CHUNK_SIZE])
            .encode(1)
            .unwrap();
        assert_eq!(bytes.len(), MAX_FRAME_SIZE);
        assert!(encode_frame(&NoneCompression, &bytes).is_ok());
    }

    #[tokio::test]
    async fn test_reader_assembly_roundtrip() {
        let original: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
        let mut reader = ChunkReader::new(&original[..], 1000, 64).unwrap();
        let mut assembly = FileAssembly::new(1000);
        for chunk in read_all(&mut reader).await {
            assembly.add_chunk(&chunk).unwrap();
        }
        assert_eq!(assembly.finish().unwrap(), original);
    }

    #[test]
    fn test_assembly_overflow_and_short() {
        let mut assembly = FileAssembly::new(4);
        assembly.add_chunk(b"abc").unwrap();
        assert!(!assembly.is_complete());
        assert!(matches!(
            assembly.add_chunk(b"de"),
            Err(TransportError::Overflow { expected: 4, received: 5 })
        ));
        assert_eq!(assembly.received(), 3);
        assert!(matches!(assembly.finish(), Err(TransportError::TooShort)));
    }
}
