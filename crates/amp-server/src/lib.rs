//! # amp-server
//!
//! モッドパックの配布サーバー。ログインで渡したクレデンシャルを持つ
//! クライアントにだけ、コンテンツインデックスに載ったファイルを送る。
//!
//! ## 構成
//!
//! ```text
//! DirectoryIndex ──► HostServer ◄── SecretStore
//!   (SHA-256 索引)      │
//!                       ├─ TLS（自己署名、フィンガープリント固定）
//!                       ├─ BandwidthLimiter（全接続で共有）
//!                       └─ connections: identity → 接続数
//! ```
//!
//! ゲームポート共有モード（bind port -1）では待ち受けず、
//! ホストが見つけた接続を [`HostServer::serve_stream`] に渡す。

pub mod bandwidth;
pub mod client;
pub mod error;
pub mod index;
pub mod server;
pub mod tls;

pub use bandwidth::BandwidthLimiter;
pub use client::{DistributionClient, DistributionStream};
pub use error::{ServerError, ServerResult};
pub use index::{hash_file, ContentEntry, ContentIndex, DirectoryIndex, GenerationGuard, Manifest};
pub use server::{HostServer, ServerOptions, SHARED_PORT};
pub use tls::{fingerprint, TlsMaterial};
