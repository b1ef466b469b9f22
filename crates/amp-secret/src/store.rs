//! シークレットストア
//!
//! ログインセッションが発行し、配布サーバーが参照する共有ストア。
//! 内部は `Mutex<HashMap>` 一つで直列化しているので、複数スレッドからの
//! 発行・参照が同時に走っても更新が失われることはない。

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SecretError, SecretResult};
use crate::token::{decode_token, generate_token};

/// デフォルトの有効期間（秒）: 1 日
pub const DEFAULT_VALIDITY_SECS: u64 = 24 * 60 * 60;

/// 発行済みクレデンシャル
///
/// サイドチャンネルでは `{"secret": ..., "timestamp": ...}` としてクライアントに渡る。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Base64 トークン
    pub secret: String,
    /// 発行時刻（Unix 秒）
    pub timestamp: i64,
}

/// 永続化用のレコード
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SecretRecord {
    identity: String,
    #[serde(flatten)]
    secret: Secret,
}

/// スレッドセーフなシークレットストア
pub struct SecretStore {
    /// token → レコード
    entries: Mutex<HashMap<String, SecretRecord>>,
    /// 有効期間（秒）
    validity_secs: u64,
}

impl SecretStore {
    /// デフォルトの有効期間で空のストアを作る
    pub fn new() -> Self {
        Self::with_validity(DEFAULT_VALIDITY_SECS)
    }

    /// 有効期間を指定して空のストアを作る
    pub fn with_validity(validity_secs: u64) -> Self {
        SecretStore {
            entries: Mutex::new(HashMap::new()),
            validity_secs,
        }
    }

    /// 現在時刻でクレデンシャルを発行し、identity に紐付けて保存する
    pub fn issue(&self, identity: &str) -> SecretResult<Secret> {
        self.issue_at(identity, unix_now())
    }

    /// 発行時刻を指定してクレデンシャルを発行する
    ///
    /// 発行のたびに `now` 時点で期限切れのトークンを捨てる。
    pub fn issue_at(&self, identity: &str, now: i64) -> SecretResult<Secret> {
        let secret = Secret {
            secret: generate_token()?,
            timestamp: now,
        };
        let record = SecretRecord {
            identity: identity.to_string(),
            secret: secret.clone(),
        };
        let purged = {
            let mut entries = self.lock();
            let purged = retain_fresh(&mut entries, now, self.max_age());
            entries.insert(secret.secret.clone(), record);
            purged
        };
        debug!(identity, issued_at = now, purged, "issued distribution secret");
        Ok(secret)
    }

    /// 既存のクレデンシャルを登録する（永続化ファイルからの復元など）
    pub fn insert(&self, identity: &str, secret: Secret) {
        let record = SecretRecord {
            identity: identity.to_string(),
            secret,
        };
        self.lock().insert(record.secret.secret.clone(), record);
    }

    /// トークンから identity を引く
    ///
    /// 有効期限は見ない。期限付きの検証は [`SecretStore::validate`] を使う。
    pub fn lookup(&self, token: &str) -> Option<String> {
        self.lock().get(token).map(|r| r.identity.clone())
    }

    /// トークンから identity とクレデンシャルを引く
    pub fn get(&self, token: &str) -> Option<(String, Secret)> {
        self.lock()
            .get(token)
            .map(|r| (r.identity.clone(), r.secret.clone()))
    }

    /// トークンを検証し、有効なら identity を返す
    ///
    /// # エラー
    /// - `SecretError::InvalidEncoding` / `InvalidLength`: トークンの形をしていない
    /// - `SecretError::Unknown`: 未発行のトークン
    /// - `SecretError::Expired`: 有効期間を過ぎている
    pub fn validate(&self, token: &str, now: i64) -> SecretResult<String> {
        decode_token(token)?;
        let entries = self.lock();
        let record = entries.get(token).ok_or(SecretError::Unknown)?;

        let age = now.saturating_sub(record.secret.timestamp);
        if age < 0 || age as u64 > self.validity_secs {
            return Err(SecretError::Expired {
                issued_at: record.secret.timestamp,
                validity_secs: self.validity_secs,
            });
        }

        Ok(record.identity.clone())
    }

    /// トークンを削除する
    pub fn remove(&self, token: &str) -> bool {
        self.lock().remove(token).is_some()
    }

    /// 期限切れのトークンをすべて削除し、削除数を返す
    pub fn purge_expired(&self, now: i64) -> usize {
        retain_fresh(&mut self.lock(), now, self.max_age())
    }

    /// すべて削除する
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// 保持しているトークン数
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// ストアが空か
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 有効期間（秒）
    pub fn validity_secs(&self) -> u64 {
        self.validity_secs
    }

    /// JSON ファイルに書き出す
    pub fn save(&self, path: &Path) -> SecretResult<()> {
        let records: Vec<SecretRecord> = self.lock().values().cloned().collect();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&records)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// JSON ファイルから読み込む。ファイルがなければ空のストアを返す
    pub fn load(path: &Path, validity_secs: u64) -> SecretResult<Self> {
        let store = Self::with_validity(validity_secs);
        if !path.exists() {
            return Ok(store);
        }

        let bytes = fs::read(path)?;
        let records: Vec<SecretRecord> = serde_json::from_slice(&bytes)?;
        {
            let mut entries = store.lock();
            for record in records {
                entries.insert(record.secret.secret.clone(), record);
            }
        }
        Ok(store)
    }

    /// 有効期間を i64 に収める（収まらなければ無期限扱い）
    fn max_age(&self) -> i64 {
        i64::try_from(self.validity_secs).unwrap_or(i64::MAX)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SecretRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 期限内のものだけ残し、削除数を返す
fn retain_fresh(entries: &mut HashMap<String, SecretRecord>, now: i64, max_age: i64) -> usize {
    let before = entries.len();
    entries.retain(|_, r| now.saturating_sub(r.secret.timestamp) <= max_age);
    before - entries.len()
}

/// 現在の Unix 時刻（秒）
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
