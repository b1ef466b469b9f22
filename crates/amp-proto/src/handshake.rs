//! ハンドシェイクペイロード
//!
//! サーバーからのプローブとクライアントの応答は同じ形:
//!
//! ```text
//! {"loaders":["fabric"],"amVersion":"4.0.0","mcVersion":"1.21.1"}
//! ```

use crate::text;

/// ハンドシェイク内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// 対応ローダー（大文字小文字は区別しない）
    pub loaders: Vec<String>,
    /// AutoModpack のバージョン
    pub am_version: String,
    /// ゲームのバージョン
    pub mc_version: String,
}

impl Handshake {
    pub fn new(
        loaders: Vec<String>,
        am_version: impl Into<String>,
        mc_version: impl Into<String>,
    ) -> Self {
        Handshake {
            loaders,
            am_version: am_version.into(),
            mc_version: mc_version.into(),
        }
    }

    /// `accepted` のどれかと一致するローダーを持っているか
    ///
    /// `accepted` が空なら常に true。
    pub fn supports_any(&self, accepted: &[String]) -> bool {
        if accepted.is_empty() {
            return true;
        }
        self.loaders
            .iter()
            .any(|l| accepted.iter().any(|a| a.eq_ignore_ascii_case(l)))
    }
}

/// ハンドシェイクを文字列にする
pub fn encode_handshake(handshake: &Handshake) -> String {
    let mut out = String::from("{\"loaders\":[");
    for (i, loader) in handshake.loaders.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        out.push_str(&text::escape(loader));
        out.push('"');
    }
    out.push_str("],");
    text::push_string_field(&mut out, "amVersion", &handshake.am_version);
    out.push(',');
    text::push_string_field(&mut out, "mcVersion", &handshake.mc_version);
    out.push('}');
    out
}

/// 文字列からハンドシェイクを読む
///
/// # 戻り値
/// 3 つのキーがすべて揃っていれば `Some`。欠け・型違い・途中切れは `None`
pub fn decode_handshake(input: &str) -> Option<Handshake> {
    let obj = text::as_object(input)?;
    let loaders = text::extract_string_array(obj, "loaders")?;
    let am_version = text::extract_string(obj, "amVersion")?;
    let mc_version = text::extract_string(obj, "mcVersion")?;
    Some(Handshake {
        loaders,
        am_version,
        mc_version,
    })
}
