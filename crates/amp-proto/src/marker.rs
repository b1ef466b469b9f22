//! 配布結果マーカー
//!
//! クレデンシャル提示への応答としてクライアントが返す文字列。
//! 値の意味は「モッドパックがまだ足りないか」。

/// 配布結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMarker {
    /// `"true"`: 内容が足りない（インストール・更新が必要）
    Missing,
    /// `"false"`: 内容は揃っている
    Satisfied,
    /// それ以外: ホスト側の設定ミスを疑う
    Other(String),
}

/// マーカー文字列を解釈する（大文字小文字は区別しない、前後の空白は削らない）
pub fn parse_delivery_marker(value: &str) -> DeliveryMarker {
    if value.eq_ignore_ascii_case("true") {
        DeliveryMarker::Missing
    } else if value.eq_ignore_ascii_case("false") {
        DeliveryMarker::Satisfied
    } else {
        DeliveryMarker::Other(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers() {
        assert_eq!(parse_delivery_marker("true"), DeliveryMarker::Missing);
        assert_eq!(parse_delivery_marker("TRUE"), DeliveryMarker::Missing);
        assert_eq!(parse_delivery_marker("False"), DeliveryMarker::Satisfied);
        assert_eq!(
            parse_delivery_marker(" false"),
            DeliveryMarker::Other(" false".to_string())
        );
        assert_eq!(parse_delivery_marker(""), DeliveryMarker::Other(String::new()));
    }
}
