//! ホストとの境界
//!
//! セッションはホストのログイン処理の内部に直接触らず、ここの trait だけを使う。
//! ホストのバージョンごとに [`HostAdapter`] を一つ実装する。

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// 接続のログイン段階
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginPhase {
    Negotiating,
    Verifying,
    ReadyToAccept,
    /// サイドチャンネルをまだ（もう）使えない段階
    Other(String),
}

impl LoginPhase {
    /// ホストの状態名から作る（大文字小文字は区別しない）
    pub fn from_name(name: &str) -> Self {
        let upper = name.to_ascii_uppercase();
        if upper.contains("NEGOTIATING") {
            LoginPhase::Negotiating
        } else if upper.contains("VERIFYING") {
            LoginPhase::Verifying
        } else if upper.contains("READY") {
            LoginPhase::ReadyToAccept
        } else {
            LoginPhase::Other(name.to_string())
        }
    }

    /// プローブを送ってよい段階か
    pub fn is_side_channel_ready(&self) -> bool {
        !matches!(self, LoginPhase::Other(_))
    }
}

/// 接続しているプレイヤー
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// 永続的なキー（UUID 文字列）。シークレットはこれに紐付く
    pub key: String,
    pub display_name: String,
}

impl Identity {
    pub const UNKNOWN_KEY: &'static str = "00000000-0000-0000-0000-000000000000";

    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Identity {
            key: key.into(),
            display_name: display_name.into(),
        }
    }

    /// ホストがプロフィールを返せなかったとき
    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN_KEY, "unknown")
    }
}

/// サーバーから送るログインクエリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundQuery {
    pub id: i32,
    pub channel: String,
    /// VarInt 長付き UTF-8 文字列一つ（`amp_proto::utf_payload`）
    pub payload: Vec<u8>,
}

/// クライアントからのクエリ応答
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundAnswer {
    pub id: i32,
    /// `None` はクライアントがチャンネルを理解しなかったことを表す
    pub data: Option<Vec<u8>>,
}

impl InboundAnswer {
    pub fn understood(id: i32, data: Vec<u8>) -> Self {
        InboundAnswer { id, data: Some(data) }
    }

    pub fn not_understood(id: i32) -> Self {
        InboundAnswer { id, data: None }
    }
}

/// 受信パケットのフック。処理したら true（ホストはパケットを握りつぶす）
pub type Interceptor = Arc<dyn Fn(&InboundAnswer) -> bool + Send + Sync>;

/// ホストのログイン処理へのアダプタ
///
/// `send_packet` と `disconnect` は送りっぱなしでよく、tick スレッドを
/// ブロックしてはならない。
pub trait HostAdapter: Send + Sync + 'static {
    /// 接続ハンドル
    type Handle: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// 認証中の接続一覧
    fn pending_connections(&self) -> Vec<Self::Handle>;

    /// 受信フックを付ける
    ///
    /// # 戻り値
    /// 付けられた（または既に付いていた）なら true。パイプラインが
    /// 見つからないなど付けられなければ false
    fn attach_interceptor(&self, handle: &Self::Handle, interceptor: Interceptor) -> bool;

    fn send_packet(&self, handle: &Self::Handle, query: OutboundQuery);

    /// `None` は段階を読めなかったことを表す
    fn login_phase(&self, handle: &Self::Handle) -> Option<LoginPhase>;

    fn identity_of(&self, handle: &Self::Handle) -> Option<Identity>;

    fn disconnect(&self, handle: &Self::Handle, message: &str);
}

/// セッションの最終結果の通知先
///
/// セッション一つにつき、どちらか一方がちょうど一回呼ばれる。
pub trait CompletionObserver: Send + Sync {
    /// ハンドシェイクが終わった（成功・失敗）
    fn on_result(&self, identity: &Identity, success: bool);

    /// クライアントが AutoModpack を入れていない
    fn on_missing(&self, identity: &Identity);
}

/// 配布サーバーの状態
pub trait DistributionStatus: Send + Sync {
    fn is_running(&self) -> bool;

    /// コンテンツインデックスを生成中か
    fn is_generating(&self) -> bool;

    /// TLS 証明書のフィンガープリント（TLS 無効なら `None`）
    fn certificate_fingerprint(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_from_name() {
        assert_eq!(LoginPhase::from_name("NEGOTIATING"), LoginPhase::Negotiating);
        assert_eq!(LoginPhase::from_name("verifying"), LoginPhase::Verifying);
        assert_eq!(LoginPhase::from_name("READY_TO_ACCEPT"), LoginPhase::ReadyToAccept);
        assert!(LoginPhase::from_name("ReadyToAccept").is_side_channel_ready());

        let hello = LoginPhase::from_name("HELLO");
        assert_eq!(hello, LoginPhase::Other("HELLO".to_string()));
        assert!(!hello.is_side_channel_ready());
        assert!(!LoginPhase::from_name("KEY").is_side_channel_ready());
    }

    #[test]
    fn test_unknown_identity() {
        let id = Identity::unknown();
        assert_eq!(id.key, "00000000-0000-0000-0000-000000000000");
        assert_eq!(id.display_name, "unknown");
    }
}
