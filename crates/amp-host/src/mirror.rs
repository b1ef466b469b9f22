//! モッドディレクトリのミラーと監視
//!
//! 管理者は `mods/` にモッドを置く。変更を見つけたら配布ツリーに丸ごと
//! コピーし直し、コンテンツを再生成する。監視は tokio のタイマーで
//! ディレクトリのスナップショットを比べるだけの単純なもの。

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// `target` の中身を消してから `source` のツリーをコピーする
///
/// # 戻り値
/// コピーしたファイル数
pub fn mirror_tree(source: &Path, target: &Path) -> io::Result<usize> {
    fs::create_dir_all(source)?;
    fs::create_dir_all(target)?;
    delete_contents(target)?;
    copy_tree(source, target)
}

fn delete_contents(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn copy_tree(source: &Path, target: &Path) -> io::Result<usize> {
    let mut copied = 0;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if from.is_dir() {
            fs::create_dir_all(&to)?;
            copied += copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// パス → (サイズ, 更新時刻)
pub type Snapshot = BTreeMap<PathBuf, (u64, Option<SystemTime>)>;

/// ディレクトリ配下のファイル一覧。ディレクトリが無ければ空
pub fn snapshot(dir: &Path) -> io::Result<Snapshot> {
    let mut out = Snapshot::new();
    if dir.is_dir() {
        collect(dir, &mut out)?;
    }
    Ok(out)
}

fn collect(dir: &Path, out: &mut Snapshot) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_dir() {
            collect(&path, out)?;
        } else {
            out.insert(path, (meta.len(), meta.modified().ok()));
        }
    }
    Ok(())
}

/// `mods/` の変更を監視するタスク
///
/// drop すると止まる。
pub struct ModWatcher {
    task: JoinHandle<()>,
}

impl ModWatcher {
    /// 監視を始める。`on_change` はブロッキングスレッドで呼ばれる
    pub fn spawn<F>(source: PathBuf, interval: Duration, on_change: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let on_change = Arc::new(on_change);
        // 基準のスナップショットは呼び出し時点
        let mut last = snapshot(&source).unwrap_or_default();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 最初の tick は即時に来る
            ticker.tick().await;
            info!(dir = %source.display(), "watching mods directory");

            loop {
                ticker.tick().await;
                let current = match snapshot(&source) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(dir = %source.display(), error = %e, "failed to scan mods directory");
                        continue;
                    }
                };
                if current == last {
                    continue;
                }
                debug!(files = current.len(), "mods directory changed");
                last = current;

                let callback = Arc::clone(&on_change);
                if let Err(e) = tokio::task::spawn_blocking(move || callback()).await {
                    warn!(error = %e, "mods change handler failed");
                }
            }
        });
        ModWatcher { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ModWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
