//! バージョン比較

/// `major.minor.patch` を数値 3 つに分解する。形が違えば `None`
fn parse_triplet(version: &str) -> Option<[u64; 3]> {
    let mut parts = version.split('.');
    let mut out = [0u64; 3];
    for slot in out.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

/// クライアントのバージョンがサーバーより新しいか
///
/// どちらかが `\d+.\d+.\d+` の形でなければ false。
pub fn is_client_version_higher(client: &str, server: &str) -> bool {
    match (parse_triplet(client), parse_triplet(server)) {
        (Some(c), Some(s)) => c > s,
        _ => false,
    }
}
