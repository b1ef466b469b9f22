//! # amp-secret
//!
//! 配布サーバー用ワンタイムクレデンシャルの発行と検証。
//!
//! ## フロー
//!
//! ```text
//! LoginSession ── issue(identity) ──► SecretStore ◄── validate(token) ── HostServer
//!      │                                                                    ▲
//!      └── {"secret": token, "timestamp": issued_at} ──► client ── token ───┘
//! ```
//!
//! トークンは 32 バイトの乱数を URL-safe Base64 (no padding) にしたもの。
//! 「使い捨て」は意図であって暗号的には強制しない。有効期間内なら同じトークンで
//! 何度でもリクエストできる（並列ダウンロード用）。

mod error;
mod store;
mod token;

pub use error::{SecretError, SecretResult};
pub use store::{unix_now, Secret, SecretStore, DEFAULT_VALIDITY_SECS};
pub use token::{decode_token, encode_token, generate_token, TOKEN_BYTES, TOKEN_CHARS};
