//! ホストサービスのライフサイクル
//!
//! ```text
//! start()
//!   ├─ ディレクトリ作成・既存マニフェスト読み込み
//!   ├─ mods/ のミラーとコンテンツ生成（ブロッキングスレッド）
//!   ├─ 配布サーバー起動
//!   └─ mods/ の監視開始
//! stop()
//!   ├─ 監視停止・配布サーバー停止
//!   └─ シークレット保存
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use amp_login::{HostAdapter, LoginConfig, SessionManager};
use amp_transport::is_distribution_preamble;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info, warn};

use crate::context::HostContext;
use crate::error::{HostError, HostResult};
use crate::mirror::ModWatcher;
use crate::settings::Settings;

/// `mods/` を見に行く間隔
pub const WATCH_INTERVAL: Duration = Duration::from_secs(2);

type ReloadListener = Box<dyn Fn(&LoginConfig) + Send + Sync>;

pub struct HostService {
    context: Arc<HostContext>,
    watch_interval: Duration,
    watcher: Mutex<Option<ModWatcher>>,
    reload_listeners: Mutex<Vec<ReloadListener>>,
}

impl HostService {
    pub fn new(context: HostContext) -> Self {
        HostService {
            context: Arc::new(context),
            watch_interval: WATCH_INTERVAL,
            watcher: Mutex::new(None),
            reload_listeners: Mutex::new(Vec::new()),
        }
    }

    /// `base` 以下のファイルでサービスを組み立てる
    pub fn open(base: impl AsRef<Path>) -> HostResult<Self> {
        Ok(Self::new(HostContext::open(base)?))
    }

    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn context(&self) -> &Arc<HostContext> {
        &self.context
    }

    fn watcher(&self) -> MutexGuard<'_, Option<ModWatcher>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 起動する
    ///
    /// # 戻り値
    /// 配布サーバーの待ち受けアドレス（ゲームポート共有時は `None`）
    pub async fn start(&self) -> HostResult<Option<SocketAddr>> {
        self.context.paths.ensure()?;
        if let Err(e) = self.context.index.load() {
            warn!(error = %e, "ignoring unreadable content manifest");
        }

        if !self.regenerate().await? {
            warn!(
                mods_dir = %self.context.paths.mods_dir.display(),
                "Initial modpack generation reported no content. Check the mods directory"
            );
        }

        let addr = self.context.server.start().await?;

        let context = Arc::clone(&self.context);
        let watcher = ModWatcher::spawn(
            self.context.paths.mods_dir.clone(),
            self.watch_interval,
            move || match context.refresh_content() {
                Ok(true) => info!("modpack regenerated after mods change"),
                Ok(false) => warn!("Modpack regeneration completed without output"),
                Err(e) => error!(error = %e, "failed to regenerate modpack after mods change"),
            },
        );
        *self.watcher() = Some(watcher);

        info!(addr = ?addr, "AutoModpack host service started");
        Ok(addr)
    }

    /// 止める。シークレットの保存に失敗してもログだけ出す
    pub fn stop(&self) {
        if let Some(watcher) = self.watcher().take() {
            watcher.stop();
        }
        self.context.server.stop();
        if let Err(e) = self.context.persist_secrets() {
            error!(error = %e, "failed to save distribution secrets");
        }
        info!("AutoModpack host service stopped");
    }

    /// コンテンツを作り直す
    ///
    /// # 戻り値
    /// 配布するファイルがあるか
    pub async fn regenerate(&self) -> HostResult<bool> {
        let context = Arc::clone(&self.context);
        tokio::task::spawn_blocking(move || context.refresh_content())
            .await
            .map_err(|e| HostError::Task(e.to_string()))?
    }

    pub fn is_generating(&self) -> bool {
        self.context.server.is_generating()
    }

    pub fn is_host_running(&self) -> bool {
        self.context.server.is_running()
    }

    /// 配布サーバーだけを起動する
    ///
    /// # 戻り値
    /// - `Ok(false)`: すでに起動していた
    pub async fn start_host(&self) -> HostResult<bool> {
        if self.is_host_running() {
            return Ok(false);
        }
        self.context.server.start().await?;
        Ok(true)
    }

    /// # 戻り値
    /// 起動していたか
    pub fn stop_host(&self) -> bool {
        self.context.server.stop()
    }

    pub async fn restart_host(&self) -> HostResult<()> {
        self.context.server.stop();
        self.context.server.start().await?;
        Ok(())
    }

    pub fn connections(&self) -> HashMap<String, usize> {
        self.context.server.connections()
    }

    pub fn certificate_fingerprint(&self) -> Option<String> {
        self.context.server.certificate_fingerprint()
    }

    /// `config.yml` を読み直して各部品と登録済みマネージャに配る
    pub fn reload_config(&self) -> HostResult<LoginConfig> {
        let settings = Settings::load(&self.context.paths.config_file)?;
        self.context.apply_settings(settings);
        let login = self.context.login_config();
        for listener in self
            .reload_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            listener(&login);
        }
        info!("AutoModpack config reloaded from disk");
        Ok(login)
    }

    /// ログインブリッジを作る。設定の再読み込みは自動で反映される
    pub fn session_manager<A: HostAdapter>(&self, adapter: Arc<A>) -> Arc<SessionManager<A>> {
        let manager = Arc::new(SessionManager::new(
            adapter,
            self.context.login_config(),
            self.context.login_services(),
        ));
        let weak = Arc::downgrade(&manager);
        self.reload_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(move |config: &LoginConfig| {
                if let Some(manager) = weak.upgrade() {
                    manager.set_config(config.clone());
                }
            }));
        manager
    }

    /// ゲームポートに来た接続が配布プロトコルなら処理する
    ///
    /// `peek` は読み進めずに覗いた先頭バイト。`stream` はその位置から読める状態で渡す。
    ///
    /// # 戻り値
    /// - `Ok(false)`: 配布プロトコルではない（ホストがそのまま処理する）
    pub async fn serve_shared<S>(&self, peek: &[u8], stream: S) -> HostResult<bool>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if !is_distribution_preamble(peek) {
            return Ok(false);
        }
        self.context.server.serve_stream(stream).await?;
        Ok(true)
    }
}

impl Drop for HostService {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher().take() {
            watcher.stop();
        }
    }
}
