//! ホストの共有状態
//!
//! 起動時に一度だけ組み立て、サービスとコマンドから `Arc` で共有する。

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use amp_login::{DistributionStatus, LoginConfig, LoginServices};
use amp_secret::{unix_now, SecretStore};
use amp_server::{ContentIndex, DirectoryIndex, HostServer};
use tracing::{debug, info, warn};

use crate::clients::{KnownClients, NagSettings};
use crate::error::HostResult;
use crate::mirror::mirror_tree;
use crate::paths::HostPaths;
use crate::settings::Settings;

pub struct HostContext {
    pub paths: HostPaths,
    settings: RwLock<Settings>,
    pub secrets: Arc<SecretStore>,
    pub index: Arc<DirectoryIndex>,
    pub server: Arc<HostServer>,
    pub clients: Arc<KnownClients>,
}

impl HostContext {
    /// ディレクトリを用意し、設定とシークレットを読み込む
    ///
    /// # エラー
    /// - ディレクトリを作れない
    /// - `config.yml` やシークレットファイルが壊れている
    pub fn open(base: impl AsRef<Path>) -> HostResult<Self> {
        let paths = HostPaths::new(base);
        paths.ensure()?;
        let settings = Settings::load(&paths.config_file)?;
        let secrets = Arc::new(SecretStore::load(
            &paths.secrets_file,
            settings.server_host.secret_validity_secs,
        )?);
        debug!(secrets = secrets.len(), "loaded distribution secrets");

        let index = Arc::new(DirectoryIndex::new(
            &paths.content_dir,
            &paths.manifest_file,
        ));
        index.set_modpack_name(settings.modpack_name.clone());
        let server = Arc::new(HostServer::new(
            settings.server_options(&paths),
            Arc::clone(&secrets),
            Arc::clone(&index) as Arc<dyn ContentIndex>,
        ));
        let clients = Arc::new(KnownClients::new(NagSettings::from(&settings)));

        Ok(HostContext {
            paths,
            settings: RwLock::new(settings),
            secrets,
            index,
            server,
            clients,
        })
    }

    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn login_config(&self) -> LoginConfig {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .login_config()
    }

    /// 読み直した設定を各部品に配る
    ///
    /// 配布サーバーの待ち受け設定は次の起動から有効になる。
    pub fn apply_settings(&self, settings: Settings) {
        self.index.set_modpack_name(settings.modpack_name.clone());
        self.server
            .set_options(settings.server_options(&self.paths));
        self.clients.set_nag(NagSettings::from(&settings));
        if settings.server_host.secret_validity_secs != self.secrets.validity_secs() {
            warn!("secret-validity-secs changes take effect after a restart");
        }
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    pub fn status(&self) -> Arc<dyn DistributionStatus> {
        Arc::new(ServerStatus(Arc::clone(&self.server)))
    }

    pub fn login_services(&self) -> LoginServices {
        LoginServices {
            secrets: Arc::clone(&self.secrets),
            status: self.status(),
            observer: Arc::clone(&self.clients) as _,
        }
    }

    /// `mods/` を配布ツリーへ写し、インデックスを作り直し、設定ミラーを更新する
    ///
    /// ブロッキング処理。ミラーも含めて生成中フラグの下で行うので、
    /// その間の新しいセッションとファイル要求は生成中として断られる。
    ///
    /// # 戻り値
    /// 配布するファイルがあるか（別の生成が実行中なら `false`）
    pub fn refresh_content(&self) -> HostResult<bool> {
        let Some(guard) = self.index.begin_generation() else {
            info!("modpack refresh already in progress, skipping");
            return Ok(false);
        };
        let copied = mirror_tree(&self.paths.mods_dir, &self.paths.host_mods_dir)?;
        debug!(files = copied, "mirrored mods into host modpack");
        let has_content = self.index.regenerate(&guard)?;
        mirror_tree(&self.paths.host_config_dir, &self.paths.configs_mirror_dir)?;
        Ok(has_content)
    }

    /// 期限切れを捨ててシークレットを保存する
    pub fn persist_secrets(&self) -> HostResult<()> {
        let purged = self.secrets.purge_expired(unix_now());
        self.secrets.save(&self.paths.secrets_file)?;
        debug!(purged, kept = self.secrets.len(), "saved distribution secrets");
        Ok(())
    }
}

/// ログインセッションから見た配布サーバーの状態
pub struct ServerStatus(pub Arc<HostServer>);

impl DistributionStatus for ServerStatus {
    fn is_running(&self) -> bool {
        self.0.is_running()
    }

    fn is_generating(&self) -> bool {
        self.0.is_generating()
    }

    fn certificate_fingerprint(&self) -> Option<String> {
        self.0.certificate_fingerprint()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_open_creates_layout_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let context = HostContext::open(dir.path()).unwrap();

        assert!(context.paths.config_file.exists());
        assert!(context.paths.host_mods_dir.is_dir());
        assert_eq!(context.settings(), Settings::default());
        assert!(!context.status().is_running());
        assert!(context.secrets.is_empty());
    }

    #[test]
    fn test_refresh_content_mirrors_and_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let context = HostContext::open(dir.path()).unwrap();
        assert!(!context.refresh_content().unwrap());

        fs::write(context.paths.mods_dir.join("a.jar"), b"hello").unwrap();
        fs::write(context.paths.host_config_dir.join("opts.txt"), b"x").unwrap();
        assert!(context.refresh_content().unwrap());

        assert!(context.paths.host_mods_dir.join("a.jar").exists());
        assert!(context.paths.configs_mirror_dir.join("opts.txt").exists());
        assert_eq!(context.index.len(), 2);
        assert!(context.paths.manifest_file.exists());
    }

    #[test]
    fn test_refresh_skipped_while_generating() {
        let dir = tempfile::tempdir().unwrap();
        let context = HostContext::open(dir.path()).unwrap();
        fs::write(context.paths.mods_dir.join("a.jar"), b"hello").unwrap();

        let guard = context.index.begin_generation().unwrap();
        assert!(!context.refresh_content().unwrap());
        // 生成中はミラーにも手を付けない
        assert!(!context.paths.host_mods_dir.join("a.jar").exists());
        assert!(context.status().is_generating());

        drop(guard);
        assert!(context.refresh_content().unwrap());
        assert!(context.paths.host_mods_dir.join("a.jar").exists());
    }

    #[test]
    fn test_concurrent_refreshes_do_not_race() {
        let dir = tempfile::tempdir().unwrap();
        let context = Arc::new(HostContext::open(dir.path()).unwrap());
        for i in 0..300 {
            fs::write(context.paths.mods_dir.join(format!("mod-{i}.jar")), [i as u8; 64]).unwrap();
        }

        for _ in 0..10 {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let context = Arc::clone(&context);
                    std::thread::spawn(move || context.refresh_content())
                })
                .collect();
            let results: Vec<bool> = handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect();
            assert!(results.contains(&true));
            assert!(!context.index.is_generating());
            assert_eq!(context.index.len(), 300);
        }
        assert_eq!(fs::read_dir(&context.paths.host_mods_dir).unwrap().count(), 300);
    }

    #[test]
    fn test_secrets_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let context = HostContext::open(dir.path()).unwrap();
        let secret = context.secrets.issue("uuid-1").unwrap();
        context.persist_secrets().unwrap();

        let reopened = HostContext::open(dir.path()).unwrap();
        assert_eq!(
            reopened.secrets.lookup(&secret.secret),
            Some("uuid-1".to_string())
        );
    }

    #[test]
    fn test_apply_settings() {
        let dir = tempfile::tempdir().unwrap();
        let context = HostContext::open(dir.path()).unwrap();
        context.apply_settings(Settings {
            force_mod: true,
            modpack_name: "Pack".to_string(),
            ..Settings::default()
        });

        assert!(context.login_config().force_mod);
        context.refresh_content().unwrap();
        assert_eq!(context.index.manifest().modpack_name, "Pack");
    }
}
