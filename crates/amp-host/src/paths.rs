//! ホストのディレクトリ構成
//!
//! ```text
//! <base>/
//!   config.yml
//!   mods/                          ← 管理者が置くモッド
//!   configs/                       ← 配布中の設定のミラー
//!   host-modpack/
//!     automodpack-content.json     ← マニフェスト
//!     main/
//!       mods/                      ← mods/ のコピー
//!       config/
//!   .private/
//!     automodpack-secrets.json
//!     cert.crt
//!     key.pem
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    pub base: PathBuf,
    pub config_file: PathBuf,
    pub mods_dir: PathBuf,
    pub configs_mirror_dir: PathBuf,
    pub host_modpack_dir: PathBuf,
    pub content_dir: PathBuf,
    pub host_mods_dir: PathBuf,
    pub host_config_dir: PathBuf,
    pub manifest_file: PathBuf,
    pub private_dir: PathBuf,
    pub secrets_file: PathBuf,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl HostPaths {
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref().to_path_buf();
        let host_modpack_dir = base.join("host-modpack");
        let content_dir = host_modpack_dir.join("main");
        let private_dir = base.join(".private");
        HostPaths {
            config_file: base.join("config.yml"),
            mods_dir: base.join("mods"),
            configs_mirror_dir: base.join("configs"),
            host_mods_dir: content_dir.join("mods"),
            host_config_dir: content_dir.join("config"),
            manifest_file: host_modpack_dir.join("automodpack-content.json"),
            secrets_file: private_dir.join("automodpack-secrets.json"),
            cert_file: private_dir.join("cert.crt"),
            key_file: private_dir.join("key.pem"),
            host_modpack_dir,
            content_dir,
            private_dir,
            base,
        }
    }

    /// 必要なディレクトリをすべて作る
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [
            &self.base,
            &self.mods_dir,
            &self.configs_mirror_dir,
            &self.host_mods_dir,
            &self.host_config_dir,
            &self.private_dir,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
