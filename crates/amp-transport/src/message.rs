//! 配布プロトコルのメッセージ
//!
//! ## クライアント → サーバー
//! ```text
//! [version: u8][type: u8][credential_len: u16 BE][credential: credential_len]
//! type = 0x00 Echo        : [data_len: u32 BE][data]
//! type = 0x01 FileRequest : [hash_len: u32 BE][hex sha256 (ASCII)]
//! ```
//!
//! ## サーバー → クライアント
//! ```text
//! [version: u8][type: u8][body]
//! type = 0x00 Echo             : [credential_len = 0: u16][data_len: u32 BE][data]
//! type = 0x02 FileResponse     : [size: u64 BE]
//! type = 0x03 Chunk            : [len: u32 BE][bytes]
//! type = 0x04 EndOfTransmission: (なし)
//! type = 0x05 Error            : [code: u8][len: u32 BE][utf8]
//! ```

use crate::error::{TransportError, TransportResult};

pub const ECHO_TYPE: u8 = 0x00;
pub const FILE_REQUEST_TYPE: u8 = 0x01;
pub const FILE_RESPONSE_TYPE: u8 = 0x02;
pub const CHUNK_TYPE: u8 = 0x03;
pub const END_OF_TRANSMISSION_TYPE: u8 = 0x04;
pub const ERROR_TYPE: u8 = 0x05;

/// クライアントが送るリクエスト本体
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// 疎通確認。サーバーは同じデータを返す
    Echo(Vec<u8>),
    /// ファイル要求（SHA-256 の 16 進文字列）
    FileRequest(Vec<u8>),
}

impl MessageBody {
    pub fn message_type(&self) -> u8 {
        match self {
            MessageBody::Echo(_) => ECHO_TYPE,
            MessageBody::FileRequest(_) => FILE_REQUEST_TYPE,
        }
    }
}

/// クライアントが送るメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    pub version: u8,
    /// ログイン時に受け取ったトークン
    pub credential: Vec<u8>,
    pub body: MessageBody,
}

impl ProtocolMessage {
    pub fn echo(version: u8, credential: &[u8], data: Vec<u8>) -> Self {
        ProtocolMessage {
            version,
            credential: credential.to_vec(),
            body: MessageBody::Echo(data),
        }
    }

    pub fn file_request(version: u8, credential: &[u8], hash: &str) -> Self {
        ProtocolMessage {
            version,
            credential: credential.to_vec(),
            body: MessageBody::FileRequest(hash.as_bytes().to_vec()),
        }
    }

    /// バイト列にエンコードする
    ///
    /// # エラー
    /// - `TransportError::CredentialTooLong`: クレデンシャルが 65535 バイトを超える
    /// - `TransportError::PayloadTooLong`: 本体が u32 に収まらない
    pub fn encode(&self) -> TransportResult<Vec<u8>> {
        let payload = match &self.body {
            MessageBody::Echo(data) | MessageBody::FileRequest(data) => data,
        };
        let mut out = Vec::with_capacity(8 + self.credential.len() + payload.len());
        out.push(self.version);
        out.push(self.body.message_type());
        put_credential(&mut out, &self.credential)?;
        put_bytes(&mut out, payload)?;
        Ok(out)
    }

    /// バイト列からデコードする。途中切れ・余分なバイトはエラー
    pub fn decode(bytes: &[u8]) -> TransportResult<Self> {
        let mut r = Reader::new(bytes);
        let version = r.u8()?;
        let message_type = r.u8()?;
        let credential = r.credential()?;
        let body = match message_type {
            ECHO_TYPE => MessageBody::Echo(r.bytes()?),
            FILE_REQUEST_TYPE => MessageBody::FileRequest(r.bytes()?),
            other => return Err(TransportError::UnknownMessageType(other)),
        };
        r.finish()?;
        Ok(ProtocolMessage {
            version,
            credential,
            body,
        })
    }
}

/// エラー応答のコード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// クレデンシャルが未発行または期限切れ
    Unauthorized = 1,
    /// 要求されたハッシュが見つからない
    NotFound = 2,
    /// リクエストの形が不正
    BadRequest = 3,
    /// プロトコルバージョンが違う
    UnsupportedVersion = 4,
    /// サーバー内部のエラー
    Internal = 5,
    /// コンテンツ再生成中
    Busy = 6,
}

impl TryFrom<u8> for ErrorCode {
    type Error = TransportError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ErrorCode::Unauthorized),
            2 => Ok(ErrorCode::NotFound),
            3 => Ok(ErrorCode::BadRequest),
            4 => Ok(ErrorCode::UnsupportedVersion),
            5 => Ok(ErrorCode::Internal),
            6 => Ok(ErrorCode::Busy),
            other => Err(TransportError::UnknownErrorCode(other)),
        }
    }
}

/// サーバーが送るメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Echo(Vec<u8>),
    /// これから送るファイルの総バイト数
    FileResponse { size: u64 },
    Chunk(Vec<u8>),
    EndOfTransmission,
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    pub fn message_type(&self) -> u8 {
        match self {
            ServerMessage::Echo(_) => ECHO_TYPE,
            ServerMessage::FileResponse { .. } => FILE_RESPONSE_TYPE,
            ServerMessage::Chunk(_) => CHUNK_TYPE,
            ServerMessage::EndOfTransmission => END_OF_TRANSMISSION_TYPE,
            ServerMessage::Error { .. } => ERROR_TYPE,
        }
    }

    pub fn encode(&self, version: u8) -> TransportResult<Vec<u8>> {
        let mut out = Vec::with_capacity(16);
        out.push(version);
        out.push(self.message_type());
        match self {
            ServerMessage::Echo(data) => {
                put_credential(&mut out, &[])?;
                put_bytes(&mut out, data)?;
            }
            ServerMessage::FileResponse { size } => out.extend_from_slice(&size.to_be_bytes()),
            ServerMessage::Chunk(data) => put_bytes(&mut out, data)?,
            ServerMessage::EndOfTransmission => {}
            ServerMessage::Error { code, message } => {
                out.push(*code as u8);
                put_bytes(&mut out, message.as_bytes())?;
            }
        }
        Ok(out)
    }

    /// デコードして `(version, message)` を返す
    pub fn decode(bytes: &[u8]) -> TransportResult<(u8, Self)> {
        let mut r = Reader::new(bytes);
        let version = r.u8()?;
        let message = match r.u8()? {
            ECHO_TYPE => {
                // サーバー側のクレデンシャルは常に空だが、読み飛ばしておく
                let _ = r.credential()?;
                ServerMessage::Echo(r.bytes()?)
            }
            FILE_RESPONSE_TYPE => ServerMessage::FileResponse { size: r.u64()? },
            CHUNK_TYPE => ServerMessage::Chunk(r.bytes()?),
            END_OF_TRANSMISSION_TYPE => ServerMessage::EndOfTransmission,
            ERROR_TYPE => {
                let code = ErrorCode::try_from(r.u8()?)?;
                let message =
                    String::from_utf8(r.bytes()?).map_err(|_| TransportError::InvalidUtf8)?;
                ServerMessage::Error { code, message }
            }
            other => return Err(TransportError::UnknownMessageType(other)),
        };
        r.finish()?;
        Ok((version, message))
    }
}

fn put_credential(out: &mut Vec<u8>, credential: &[u8]) -> TransportResult<()> {
    let len = u16::try_from(credential.len())
        .map_err(|_| TransportError::CredentialTooLong(credential.len()))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(credential);
    Ok(())
}

fn put_bytes(out: &mut Vec<u8>, data: &[u8]) -> TransportResult<()> {
    let len = u32::try_from(data.len()).map_err(|_| TransportError::PayloadTooLong(data.len()))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(data);
    Ok(())
}

/// 境界チェック付きの読み取りカーソル
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> TransportResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(TransportError::TooShort)?;
        let slice = self.bytes.get(self.pos..end).ok_or(TransportError::TooShort)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> TransportResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> TransportResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> TransportResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> TransportResult<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(buf))
    }

    fn credential(&mut self) -> TransportResult<Vec<u8>> {
        let len = self.u16()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn bytes(&mut self) -> TransportResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(&self) -> TransportResult<()> {
        match self.bytes.len() - self.pos {
            0 => Ok(()),
            n => Err(TransportError::TrailingBytes(n)),
        }
    }
}
