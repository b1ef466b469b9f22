//! # amp-proto
//!
//! ログイン中のサイドチャンネルでやり取りするペイロードの定義と
//! エンコード/デコードユーティリティ。
//!
//! ## やり取り
//!
//! ```text
//! server ── HANDSHAKE_QUERY_ID (-100) {"loaders",...}  ──► client
//! server ◄── {"loaders","amVersion","mcVersion"} ────────── client
//! server ── DATA_QUERY_ID (-101) {"address",...,"secret"} ► client
//! server ◄── "true" | "false" ───────────────────────────── client
//! ```
//!
//! どのペイロードも閉じた固定スキーマのテキストで、汎用 JSON ではない。
//! デコーダは途中で切れた入力や想定外の形に対して `None` を返し、
//! パニックしない。

pub mod buf;
pub mod error;
pub mod handshake;
pub mod marker;
pub mod offer;
mod text;
pub mod version;

pub use buf::{read_utf, read_utf_payload, read_varint, utf_payload, write_utf, write_varint, MAX_STRING_CHARS};
pub use error::ProtoError;
pub use handshake::{decode_handshake, encode_handshake, Handshake};
pub use marker::{parse_delivery_marker, DeliveryMarker};
pub use offer::{decode_credential_offer, encode_credential_offer, CredentialOffer};
pub use version::is_client_version_higher;

/// ハンドシェイク（プローブ）のクエリ ID
pub const HANDSHAKE_QUERY_ID: i32 = -100;

/// クレデンシャル提示のクエリ ID
pub const DATA_QUERY_ID: i32 = -101;

/// ハンドシェイクのチャンネル名
pub const HANDSHAKE_CHANNEL: &str = "automodpack:handshake";

/// クレデンシャル提示のチャンネル名
pub const DATA_CHANNEL: &str = "automodpack:data";
