//! `config.yml` の読み込み
//!
//! キーは kebab-case。無いキーは既定値、知らないキーは無視する。
//! ファイルが無ければ既定値で書き出してから読む。
//!
//! ```yaml
//! force-mod: false
//! nag-missing-mod: true
//! accepted-loaders:
//!   - fabric
//! server-host:
//!   bind-port: -1
//!   disable-internal-tls: false
//! ```

use std::fs;
use std::path::Path;

use amp_login::{LoginConfig, SHARED_PORT};
use amp_secret::DEFAULT_VALIDITY_SECS;
use amp_server::ServerOptions;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigResult;
use crate::paths::HostPaths;

/// 受け入れローダーが空のときに使うローダー
pub const FALLBACK_LOADER: &str = "fabric";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    /// AutoModpack の無いクライアントを切断する
    pub force_mod: bool,
    /// 入ってきた未導入プレイヤーに案内を出す
    pub nag_missing_mod: bool,
    pub nag_message: String,
    pub nag_link_text: String,
    pub nag_link_url: String,
    pub accepted_loaders: Vec<String>,
    pub modpack_name: String,
    pub automodpack_version: String,
    pub minecraft_version: String,
    pub server_host: HostSettings,
}

/// 配布サーバーの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HostSettings {
    pub bind_address: String,
    /// -1 でゲームポート共有
    pub bind_port: i32,
    /// クライアントに伝えるアドレス。空ならクライアント側で決める
    pub address_to_send: String,
    pub port_to_send: i32,
    pub disable_internal_tls: bool,
    /// Mbit/s。0 は無制限
    pub bandwidth_limit: u64,
    /// 起動時にだけ反映される
    pub secret_validity_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            force_mod: false,
            nag_missing_mod: true,
            nag_message: "This server provides a dedicated modpack through AutoModpack!"
                .to_string(),
            nag_link_text: "Download AutoModpack".to_string(),
            nag_link_url: "https://modrinth.com/project/automodpack".to_string(),
            accepted_loaders: vec![FALLBACK_LOADER.to_string()],
            modpack_name: String::new(),
            automodpack_version: "4.0.0".to_string(),
            minecraft_version: "1.21.1".to_string(),
            server_host: HostSettings::default(),
        }
    }
}

impl Default for HostSettings {
    fn default() -> Self {
        HostSettings {
            bind_address: "0.0.0.0".to_string(),
            bind_port: SHARED_PORT,
            address_to_send: String::new(),
            port_to_send: SHARED_PORT,
            disable_internal_tls: false,
            bandwidth_limit: 0,
            secret_validity_secs: DEFAULT_VALIDITY_SECS,
        }
    }
}

impl Settings {
    /// 設定ファイルを読む。無ければ既定値で作る
    ///
    /// # エラー
    /// - ファイルの読み書きに失敗
    /// - YAML として読めない
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            let defaults = Settings::default();
            defaults.save(path)?;
            info!(path = %path.display(), "wrote default config.yml");
            return Ok(defaults);
        }

        let text = fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Ok(Settings::default());
        }
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// 受け入れローダー。空なら `fabric` だけ
    pub fn effective_loaders(&self) -> Vec<String> {
        if self.accepted_loaders.is_empty() {
            vec![FALLBACK_LOADER.to_string()]
        } else {
            self.accepted_loaders.clone()
        }
    }

    /// ログインセッション用の設定
    pub fn login_config(&self) -> LoginConfig {
        LoginConfig {
            force_mod: self.force_mod,
            accepted_loaders: self.effective_loaders(),
            automodpack_version: self.automodpack_version.clone(),
            minecraft_version: self.minecraft_version.clone(),
            modpack_name: self.modpack_name.clone(),
            bind_port: self.server_host.bind_port,
            address_to_send: self.server_host.address_to_send.clone(),
            port_to_send: self.server_host.port_to_send,
        }
    }

    /// 配布サーバーの起動設定
    pub fn server_options(&self, paths: &HostPaths) -> ServerOptions {
        ServerOptions {
            bind_address: self.server_host.bind_address.clone(),
            bind_port: self.server_host.bind_port,
            disable_tls: self.server_host.disable_internal_tls,
            bandwidth_limit: self.server_host.bandwidth_limit,
            cert_path: paths.cert_file.clone(),
            key_path: paths.key_file.clone(),
            ..ServerOptions::default()
        }
    }
}
