//! サイドチャンネルのバッファ形式
//!
//! ホストのログインクエリパケットのペイロードは「VarInt 長 + UTF-8」の文字列一つ。
//! ホストアダプタはこの関数群でペイロードを組み立て・解析する。
//!
//! ```text
//! [byte_len: VarInt (1..=5 bytes)][utf8 bytes: byte_len]
//!
//! VarInt: 下位 7 ビットずつ、MSB = 続きありフラグ
//! ```

use crate::error::ProtoError;

/// 文字列の最大文字数
pub const MAX_STRING_CHARS: usize = 32767;

/// VarInt の最大バイト数
const VARINT_MAX_BYTES: usize = 5;

/// VarInt を書き込む
pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut v = value as u32;
    loop {
        if v & !0x7F == 0 {
            buf.push(v as u8);
            return;
        }
        buf.push(((v & 0x7F) | 0x80) as u8);
        v >>= 7;
    }
}

/// `pos` から VarInt を読み、`pos` を進める
pub fn read_varint(bytes: &[u8], pos: &mut usize) -> Result<i32, ProtoError> {
    let mut value: u32 = 0;
    for i in 0..VARINT_MAX_BYTES {
        let b = *bytes.get(*pos).ok_or(ProtoError::TooShort)?;
        *pos += 1;
        value |= ((b & 0x7F) as u32) << (7 * i);
        if b & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProtoError::VarIntTooLong)
}

/// 文字列を書き込む
///
/// # エラー
/// - `ProtoError::StringTooLong`: `MAX_STRING_CHARS` 文字を超える
pub fn write_utf(buf: &mut Vec<u8>, value: &str) -> Result<(), ProtoError> {
    let chars = value.chars().count();
    if chars > MAX_STRING_CHARS {
        return Err(ProtoError::StringTooLong {
            len: chars as i64,
            max: MAX_STRING_CHARS,
        });
    }
    write_varint(buf, value.len() as i32);
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

/// `pos` から文字列を読み、`pos` を進める
pub fn read_utf(bytes: &[u8], pos: &mut usize) -> Result<String, ProtoError> {
    let max_bytes = MAX_STRING_CHARS * 3;
    let len = read_varint(bytes, pos)?;
    if len < 0 || len as usize > max_bytes {
        return Err(ProtoError::StringTooLong {
            len: len as i64,
            max: max_bytes,
        });
    }

    let len = len as usize;
    let end = pos.checked_add(len).ok_or(ProtoError::TooShort)?;
    let slice = bytes.get(*pos..end).ok_or(ProtoError::TooShort)?;
    let s = core::str::from_utf8(slice).map_err(|_| ProtoError::InvalidUtf8)?;
    if s.chars().count() > MAX_STRING_CHARS {
        return Err(ProtoError::StringTooLong {
            len: s.chars().count() as i64,
            max: MAX_STRING_CHARS,
        });
    }
    *pos = end;
    Ok(s.to_string())
}

/// 文字列一つだけのペイロードを作る
pub fn utf_payload(value: &str) -> Result<Vec<u8>, ProtoError> {
    let mut buf = Vec::with_capacity(value.len() + VARINT_MAX_BYTES);
    write_utf(&mut buf, value)?;
    Ok(buf)
}

/// 文字列一つだけのペイロードを読む
pub fn read_utf_payload(bytes: &[u8]) -> Result<String, ProtoError> {
    let mut pos = 0;
    read_utf(bytes, &mut pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_known_encodings() {
        let cases: [(i32, &[u8]); 6] = [
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (25565, &[0xDD, 0xC7, 0x01]),
            (-1, &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        ];
        for (value, expected) in cases {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            assert_eq!(buf, expected, "value {value}");

            let mut pos = 0;
            assert_eq!(read_varint(&buf, &mut pos).unwrap(), value);
            assert_eq!(pos, buf.len());
        }
    }

    #[test]
    fn test_varint_too_long() {
        let mut pos = 0;
        let result = read_varint(&[0xFF; 6], &mut pos);
        assert_eq!(result, Err(ProtoError::VarIntTooLong));
    }

    #[test]
    fn test_read_utf_truncated() {
        // 長さ 5 と宣言して 2 バイトしかない
        let result = read_utf_payload(&[0x05, b'h', b'i']);
        assert_eq!(result, Err(ProtoError::TooShort));
    }

    #[test]
    fn test_read_utf_negative_length() {
        let result = read_utf_payload(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert!(matches!(result, Err(ProtoError::StringTooLong { len: -1, .. })));
    }

    #[test]
    fn test_utf_payload_multibyte() {
        let payload = utf_payload("モッドパック").unwrap();
        assert_eq!(payload[0] as usize, "モッドパック".len());
        assert_eq!(read_utf_payload(&payload).unwrap(), "モッドパック");
    }

    #[test]
    fn test_read_utf_invalid_utf8() {
        let result = read_utf_payload(&[0x02, 0xC3, 0x28]);
        assert_eq!(result, Err(ProtoError::InvalidUtf8));
    }

    #[test]
    fn test_write_utf_rejects_oversized() {
        let long = "a".repeat(MAX_STRING_CHARS + 1);
        let mut buf = Vec::new();
        assert!(write_utf(&mut buf, &long).is_err());
        assert!(buf.is_empty());
    }
}
