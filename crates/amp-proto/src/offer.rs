//! クレデンシャル提示ペイロード
//!
//! ハンドシェイク成功後にサーバーが data チャンネルで送る。キーの順序は固定:
//!
//! ```text
//! {"address":"..","port":N,"modpackName":"..",
//!  "secret":{"secret":"..","timestamp":N},"modRequired":b,"requiresMagic":b}
//! ```

use crate::text;

/// クライアントに渡す配布サーバーの接続情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialOffer {
    /// 接続先アドレス（空ならクライアントはゲームサーバーのアドレスを使う）
    pub address: String,
    /// 接続先ポート（-1 ならゲームサーバーと同じポート）
    pub port: i32,
    pub modpack_name: String,
    /// トークン
    pub secret: String,
    /// トークン発行時刻（Unix 秒）
    pub timestamp: i64,
    /// モッドパック必須か
    pub mod_required: bool,
    /// ゲームポート共有（マジックパケット）モードか
    pub requires_magic: bool,
}

/// 提示ペイロードを文字列にする
pub fn encode_credential_offer(offer: &CredentialOffer) -> String {
    let mut out = String::from("{");
    text::push_string_field(&mut out, "address", &offer.address);
    out.push(',');
    text::push_raw_field(&mut out, "port", &offer.port.to_string());
    out.push(',');
    text::push_string_field(&mut out, "modpackName", &offer.modpack_name);
    out.push_str(",\"secret\":{");
    text::push_string_field(&mut out, "secret", &offer.secret);
    out.push(',');
    text::push_raw_field(&mut out, "timestamp", &offer.timestamp.to_string());
    out.push_str("},");
    text::push_raw_field(&mut out, "modRequired", bool_str(offer.mod_required));
    out.push(',');
    text::push_raw_field(&mut out, "requiresMagic", bool_str(offer.requires_magic));
    out.push('}');
    out
}

/// 提示ペイロードを読む（クライアント側）
pub fn decode_credential_offer(input: &str) -> Option<CredentialOffer> {
    let obj = text::as_object(input)?;
    let secret_obj = text::extract_object(obj, "secret")?;

    Some(CredentialOffer {
        address: text::extract_string(obj, "address")?,
        port: text::extract_raw(obj, "port")?.parse().ok()?,
        modpack_name: text::extract_string(obj, "modpackName")?,
        secret: text::extract_string(secret_obj, "secret")?,
        timestamp: text::extract_raw(secret_obj, "timestamp")?.parse().ok()?,
        mod_required: text::extract_bool(obj, "modRequired")?,
        requires_magic: text::extract_bool(obj, "requiresMagic")?,
    })
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
