//! ワンタイムトークン生成
//!
//! ## トークン構造
//! ```text
//! 32 バイトの乱数 → Base64 (URL-safe, no padding) → 43 文字
//! ```
//!
//! トークン空間が 2^256 あるため、発行時の重複チェックは行わない。

use base64::Engine as _;

use crate::error::{SecretError, SecretResult};

/// トークンの生バイト長
pub const TOKEN_BYTES: usize = 32;

/// Base64 エンコード後のトークン文字数
pub const TOKEN_CHARS: usize = 43;

/// 新しいトークンを生成する
///
/// # エラー
/// - `SecretError::RandomSource`: OS の乱数源が使えない
pub fn generate_token() -> SecretResult<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    getrandom::getrandom(&mut bytes).map_err(SecretError::RandomSource)?;
    Ok(encode_token(&bytes))
}

/// 生バイト列をトークン文字列に変換する
pub fn encode_token(bytes: &[u8; TOKEN_BYTES]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// トークン文字列を 32 バイトに復元する
///
/// [`SecretStore::validate`](crate::SecretStore::validate) がストアを引く前の形式検査に使う。
pub fn decode_token(token: &str) -> SecretResult<[u8; TOKEN_BYTES]> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| SecretError::InvalidEncoding)?;

    if bytes.len() != TOKEN_BYTES {
        return Err(SecretError::InvalidLength(bytes.len()));
    }

    let mut out = [0u8; TOKEN_BYTES];
    out.copy_from_slice(&bytes);
    Ok(out)
}
