//! ログインブリッジの設定とメッセージ

use amp_proto::{encode_handshake, Handshake};

/// クライアントに表示する切断メッセージ
pub mod messages {
    pub const MALFORMED_HANDSHAKE: &str = "Malformed AutoModpack handshake payload.";
    pub const INVALID_HANDSHAKE: &str = "Invalid AutoModpack handshake from client.";
    pub const CLIENT_AHEAD: &str = "You are using a more recent version of AutoModpack than the server. Please contact the server administrator to update the AutoModpack mod.";
    pub const GENERATING: &str =
        "AutoModpack is still generating the modpack. Please try again shortly.";
    pub const UNAVAILABLE: &str =
        "AutoModpack host server is temporarily unavailable. Please try again shortly.";
    pub const CONTENT_MISSING: &str = "[AutoModpack] Install/Update modpack to join";
    pub const HOST_ERROR: &str = "[AutoModpack] Host server error. Please contact server administrator to check the server logs!";
}

/// 配布サーバーがゲームポートを共有することを表す bind port
pub const SHARED_PORT: i32 = -1;

/// セッションが参照する設定
///
/// セッションは作成時点の設定を `Arc` で持ち、途中で再読み込みされても変わらない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginConfig {
    /// モッドパック必須か
    pub force_mod: bool,
    /// 受け入れるローダー（空なら全部）
    pub accepted_loaders: Vec<String>,
    pub automodpack_version: String,
    pub minecraft_version: String,
    pub modpack_name: String,
    /// 配布サーバーの待ち受けポート（-1 でゲームポート共有）
    pub bind_port: i32,
    /// クライアントに伝えるアドレス
    pub address_to_send: String,
    /// クライアントに伝えるポート
    pub port_to_send: i32,
}

impl Default for LoginConfig {
    fn default() -> Self {
        LoginConfig {
            force_mod: false,
            accepted_loaders: vec!["fabric".to_string()],
            automodpack_version: "4.0.0".to_string(),
            minecraft_version: "1.21.1".to_string(),
            modpack_name: String::new(),
            bind_port: SHARED_PORT,
            address_to_send: String::new(),
            port_to_send: SHARED_PORT,
        }
    }
}

impl LoginConfig {
    /// メッセージに出すローダー名
    pub fn loader_display_name(&self) -> String {
        match self.accepted_loaders.as_slice() {
            [] => "fabric".to_string(),
            [one] => one.clone(),
            many => many.join("/"),
        }
    }

    pub fn required_mod_message(&self) -> String {
        format!(
            "AutoModpack mod for {} modloader is required to play on this server!",
            self.loader_display_name()
        )
    }

    pub fn version_mismatch_message(&self) -> String {
        format!(
            "AutoModpack version mismatch! Install {} version of AutoModpack mod for {} to play on this server!",
            self.automodpack_version,
            self.loader_display_name()
        )
    }

    /// クライアントがゲームポート共有モードで接続すべきか
    pub fn requires_magic(&self) -> bool {
        self.bind_port == SHARED_PORT
    }

    /// プローブで送るハンドシェイク。受け入れローダーが空なら `fabric`
    pub fn probe(&self) -> Handshake {
        let loaders = if self.accepted_loaders.is_empty() {
            vec!["fabric".to_string()]
        } else {
            self.accepted_loaders.clone()
        };
        Handshake::new(
            loaders,
            self.automodpack_version.clone(),
            self.minecraft_version.clone(),
        )
    }

    pub fn probe_json(&self) -> String {
        encode_handshake(&self.probe())
    }
}
