//! # amp-host
//!
//! ゲームサーバー側の組み込み層。設定・ディレクトリ・配布サーバー・
//! ログインブリッジをまとめて起動し、管理コマンドを提供する。
//!
//! ## 使用方法
//!
//! ```no_run
//! # async fn run(adapter: std::sync::Arc<impl amp_login::HostAdapter>) -> amp_host::HostResult<()> {
//! amp_host::init_logging(amp_host::DEFAULT_FILTER)?;
//!
//! let service = amp_host::HostService::open("plugins/AutoModpack")?;
//! service.start().await?;
//!
//! // ゲームの tick ごとに
//! let bridge = service.session_manager(adapter);
//! bridge.reconcile();
//!
//! // 管理コマンド
//! for line in amp_host::execute(&service, &["host", "connections"]).await {
//!     println!("{line}");
//! }
//!
//! service.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## 構成
//!
//! ```text
//! HostService
//!   └── HostContext
//!         ├── HostPaths      ディレクトリ構成
//!         ├── Settings       config.yml
//!         ├── SecretStore    (amp-secret)
//!         ├── DirectoryIndex (amp-server)
//!         ├── HostServer     (amp-server)
//!         └── KnownClients   ログイン結果 → 参加時の案内
//! ```

pub mod clients;
pub mod commands;
pub mod context;
pub mod error;
pub mod logging;
pub mod mirror;
pub mod paths;
pub mod service;
pub mod settings;

pub use clients::{ClientStatus, KnownClients, NagSettings};
pub use commands::execute;
pub use context::{HostContext, ServerStatus};
pub use error::{ConfigError, ConfigResult, HostError, HostResult};
pub use logging::{init_logging, DEFAULT_FILTER};
pub use mirror::{mirror_tree, ModWatcher};
pub use paths::HostPaths;
pub use service::{HostService, WATCH_INTERVAL};
pub use settings::{HostSettings, Settings};
