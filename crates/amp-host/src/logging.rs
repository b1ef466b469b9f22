//! ログ初期化

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::{HostError, HostResult};

/// `RUST_LOG` が無いときのフィルタ
pub const DEFAULT_FILTER: &str = "info,amp=debug";

/// グローバルな subscriber を入れる
///
/// `RUST_LOG` があればそれを、無ければ `default_filter` を使う。
/// 二回目以降の呼び出しはエラーになる。
pub fn init_logging(default_filter: &str) -> HostResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| HostError::Logging(e.to_string()))
}
