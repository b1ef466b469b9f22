//! コンテンツインデックス
//!
//! 配布ディレクトリ（`host-modpack/main`）を走査して SHA-256 を計算し、
//! マニフェスト JSON に書き出す。配布サーバーはハッシュでファイルを引く。
//!
//! ```text
//! generate()
//!   ├─ generating フラグを false → true（失敗したら「実行中」としてスキップ）
//!   ├─ ツリーを走査して ContentEntry を作る
//!   ├─ マニフェストを一時ファイル経由で書き出す
//!   └─ スナップショットを Arc ごと差し替える
//! ```
//!
//! 配布ツリー自体を書き換える呼び出し側は [`DirectoryIndex::begin_generation`]
//! でフラグを先に取り、書き換えと [`DirectoryIndex::regenerate`] を同じガードの下で行う。

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::ServerResult;

const HASH_BUFFER: usize = 64 * 1024;

/// 配布コンテンツの索引
pub trait ContentIndex: Send + Sync {
    /// インデックスを作り直す
    ///
    /// # 戻り値
    /// - `Ok(true)`: 配布するファイルがある
    /// - `Ok(false)`: 空、または別の生成が実行中でスキップした
    fn generate(&self) -> ServerResult<bool>;

    fn is_generating(&self) -> bool;

    /// hex の SHA-256 からエントリを引く
    fn lookup(&self, hash: &str) -> Option<ContentEntry>;
}

/// マニフェストの 1 ファイル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEntry {
    /// 配布ルートからの相対パス（`/` 区切り）
    pub file: String,
    pub size: u64,
    /// 小文字 hex
    pub sha256: String,
    /// ディスク上の実体
    #[serde(skip)]
    pub location: PathBuf,
}

/// `automodpack-content.json` の中身
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub modpack_name: String,
    pub list: Vec<ContentEntry>,
}

#[derive(Default)]
struct Snapshot {
    manifest: Manifest,
    by_hash: HashMap<String, usize>,
}

impl Snapshot {
    fn new(manifest: Manifest) -> Self {
        let by_hash = manifest
            .list
            .iter()
            .enumerate()
            .map(|(i, e)| (e.sha256.clone(), i))
            .collect();
        Snapshot { manifest, by_hash }
    }
}

/// 生成中フラグを保持するガード。drop でフラグを戻す
pub struct GenerationGuard<'a>(&'a AtomicBool);

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// ディレクトリを走査するインデックス
pub struct DirectoryIndex {
    root: PathBuf,
    manifest_path: PathBuf,
    modpack_name: Mutex<String>,
    generating: AtomicBool,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl DirectoryIndex {
    /// # 引数
    /// - `root`: 配布ルート
    /// - `manifest_path`: マニフェストの書き出し先
    pub fn new(root: impl Into<PathBuf>, manifest_path: impl Into<PathBuf>) -> Self {
        DirectoryIndex {
            root: root.into(),
            manifest_path: manifest_path.into(),
            modpack_name: Mutex::new(String::new()),
            generating: AtomicBool::new(false),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// 次の生成からマニフェストに書く名前
    pub fn set_modpack_name(&self, name: impl Into<String>) {
        *self
            .modpack_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = name.into();
    }

    /// 既存のマニフェストを読み込む
    ///
    /// # 戻り値
    /// - `Ok(false)`: マニフェストがまだ無い
    pub fn load(&self) -> ServerResult<bool> {
        let bytes = match fs::read(&self.manifest_path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let mut manifest: Manifest = serde_json::from_slice(&bytes)?;
        for entry in &mut manifest.list {
            entry.location = self.root.join(&entry.file);
        }
        debug!(files = manifest.list.len(), "loaded existing content manifest");
        self.swap(manifest);
        Ok(true)
    }

    /// 現在のマニフェスト
    pub fn manifest(&self) -> Manifest {
        self.current().manifest.clone()
    }

    pub fn len(&self) -> usize {
        self.current().manifest.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 生成中フラグを取る
    ///
    /// # 戻り値
    /// - `None`: 別の生成が実行中
    pub fn begin_generation(&self) -> Option<GenerationGuard<'_>> {
        self.generating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| GenerationGuard(&self.generating))
    }

    /// `begin_generation` で取ったガードの下で作り直す
    pub fn regenerate(&self, guard: &GenerationGuard<'_>) -> ServerResult<bool> {
        debug_assert!(std::ptr::eq(guard.0, &self.generating));
        self.rebuild()
    }

    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn swap(&self, manifest: Manifest) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(Snapshot::new(manifest));
    }

    fn rebuild(&self) -> ServerResult<bool> {
        let mut list = Vec::new();
        if self.root.is_dir() {
            self.collect(&self.root, &mut list)?;
        } else {
            warn!(root = %self.root.display(), "modpack content directory does not exist");
        }
        list.sort_by(|a, b| a.file.cmp(&b.file));

        let manifest = Manifest {
            modpack_name: self
                .modpack_name
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            list,
        };
        self.write_manifest(&manifest)?;

        let has_content = !manifest.list.is_empty();
        info!(files = manifest.list.len(), "generated modpack content");
        self.swap(manifest);
        Ok(has_content)
    }

    fn collect(&self, dir: &Path, out: &mut Vec<ContentEntry>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path == self.manifest_path {
                continue;
            }
            if path.is_dir() {
                self.collect(&path, out)?;
            } else if path.is_file() {
                out.push(self.describe(path)?);
            }
        }
        Ok(())
    }

    fn describe(&self, path: PathBuf) -> io::Result<ContentEntry> {
        let relative = path.strip_prefix(&self.root).unwrap_or(path.as_path());
        let file = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let (sha256, size) = hash_file(&path)?;
        Ok(ContentEntry {
            file,
            size,
            sha256,
            location: path,
        })
    }

    fn write_manifest(&self, manifest: &Manifest) -> ServerResult<()> {
        if let Some(parent) = self.manifest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.manifest_path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(manifest)?)?;
        fs::rename(&tmp, &self.manifest_path)?;
        Ok(())
    }
}

impl ContentIndex for DirectoryIndex {
    fn generate(&self) -> ServerResult<bool> {
        let Some(guard) = self.begin_generation() else {
            info!("modpack generation already in progress, skipping");
            return Ok(false);
        };
        self.regenerate(&guard)
    }

    fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    fn lookup(&self, hash: &str) -> Option<ContentEntry> {
        let snapshot = self.current();
        let index = *snapshot.by_hash.get(&hash.to_ascii_lowercase())?;
        snapshot.manifest.list.get(index).cloned()
    }
}

/// ファイルの `(小文字 hex SHA-256, サイズ)`
pub fn hash_file(path: &Path) -> io::Result<(String, u64)> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), size))
}
