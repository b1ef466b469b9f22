//! # amp-login
//!
//! ログイン中の接続ごとにサイドチャンネルでハンドシェイクを行い、
//! 条件を満たしたクライアントに配布サーバーのクレデンシャルを渡す。
//!
//! ## 構成
//!
//! ```text
//! host tick ──► SessionManager::reconcile()
//!                  ├─ 新しい接続 → LoginSession を作り受信フックを付ける
//!                  ├─ 全セッションの tick()
//!                  └─ 消えた接続のセッションを削除
//!
//! network thread ──► Interceptor ──► LoginSession::handle_answer()
//! ```
//!
//! ホスト固有の処理は [`HostAdapter`] の実装に閉じ込める。
//! 結果は [`CompletionObserver`] に一セッション一回だけ通知される。

pub mod config;
pub mod host;
pub mod manager;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::{messages, LoginConfig, SHARED_PORT};
pub use host::{
    CompletionObserver, DistributionStatus, HostAdapter, Identity, InboundAnswer, Interceptor,
    LoginPhase, OutboundQuery,
};
pub use manager::SessionManager;
pub use session::{LoginServices, LoginSession, LoginState, Rejection};
