//! 圧縮コーデック
//!
//! 接続ごとにプリアンブルで 1 バイトの圧縮種別を合意し、
//! 以降のフレームはすべてそのコーデックで変換する。

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{TransportError, TransportResult};

/// 無圧縮
pub const COMPRESSION_NONE: u8 = 0x00;

/// 圧縮コーデック
///
/// `decompress(compress(x), x.len()) == x` を満たすこと。
pub trait CompressionCodec: Send + Sync {
    fn compress(&self, input: &[u8]) -> TransportResult<Vec<u8>>;

    /// # 引数
    /// - `original_len`: 圧縮前のバイト数（フレームヘッダの値）
    fn decompress(&self, compressed: &[u8], original_len: usize) -> TransportResult<Vec<u8>>;

    /// プリアンブルで使う種別バイト
    fn codec_type(&self) -> u8;
}

/// 入力をそのまま返す
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneCompression;

impl CompressionCodec for NoneCompression {
    fn compress(&self, input: &[u8]) -> TransportResult<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn decompress(&self, compressed: &[u8], original_len: usize) -> TransportResult<Vec<u8>> {
        if compressed.len() != original_len {
            return Err(TransportError::LengthMismatch {
                declared: original_len,
                actual: compressed.len(),
            });
        }
        Ok(compressed.to_vec())
    }

    fn codec_type(&self) -> u8 {
        COMPRESSION_NONE
    }
}

/// 種別バイト → コーデック
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: BTreeMap<u8, Arc<dyn CompressionCodec>>,
}

impl CodecRegistry {
    /// 空のレジストリ
    pub fn empty() -> Self {
        CodecRegistry {
            codecs: BTreeMap::new(),
        }
    }

    /// コーデックを登録する。同じ種別があれば置き換える
    pub fn register(&mut self, codec: Arc<dyn CompressionCodec>) {
        self.codecs.insert(codec.codec_type(), codec);
    }

    /// 種別バイトからコーデックを引く
    ///
    /// # エラー
    /// - `TransportError::UnknownCompression`: 未登録の種別
    pub fn get(&self, codec_type: u8) -> TransportResult<Arc<dyn CompressionCodec>> {
        self.codecs
            .get(&codec_type)
            .cloned()
            .ok_or(TransportError::UnknownCompression(codec_type))
    }

    pub fn supports(&self, codec_type: u8) -> bool {
        self.codecs.contains_key(&codec_type)
    }

    /// 登録済みの種別（昇順）
    pub fn types(&self) -> Vec<u8> {
        self.codecs.keys().copied().collect()
    }
}

impl Default for CodecRegistry {
    /// `NoneCompression` だけを登録したレジストリ
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(NoneCompression));
        registry
    }
}
