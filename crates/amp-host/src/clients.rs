//! ログイン結果の記録と参加時の案内

use std::sync::{PoisonError, RwLock};

use amp_login::{CompletionObserver, Identity};
use dashmap::DashMap;
use tracing::debug;

use crate::settings::Settings;

/// ログイン時に確認できたクライアントの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// モッドパックが揃っている
    Installed,
    /// 配布に失敗した、または更新が必要
    Failed,
    /// AutoModpack が入っていない
    Missing,
}

/// 未導入プレイヤーへの案内
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NagSettings {
    pub enabled: bool,
    pub message: String,
    pub link_text: String,
    pub link_url: String,
}

impl From<&Settings> for NagSettings {
    fn from(settings: &Settings) -> Self {
        NagSettings {
            enabled: settings.nag_missing_mod,
            message: settings.nag_message.clone(),
            link_text: settings.nag_link_text.clone(),
            link_url: settings.nag_link_url.clone(),
        }
    }
}

/// identity → 状態
pub struct KnownClients {
    statuses: DashMap<String, ClientStatus>,
    nag: RwLock<NagSettings>,
}

impl KnownClients {
    pub fn new(nag: NagSettings) -> Self {
        KnownClients {
            statuses: DashMap::new(),
            nag: RwLock::new(nag),
        }
    }

    pub fn set_nag(&self, nag: NagSettings) {
        *self.nag.write().unwrap_or_else(PoisonError::into_inner) = nag;
    }

    pub fn status(&self, key: &str) -> Option<ClientStatus> {
        self.statuses.get(key).map(|s| *s)
    }

    /// 参加したプレイヤーに送る行（案内が不要なら空）
    pub fn on_join(&self, identity: &Identity) -> Vec<String> {
        if self.status(&identity.key) != Some(ClientStatus::Missing) {
            return Vec::new();
        }
        let nag = self.nag.read().unwrap_or_else(PoisonError::into_inner);
        if !nag.enabled {
            return Vec::new();
        }
        debug!(player = %identity.display_name, "sending AutoModpack nag message");
        vec![
            nag.message.clone(),
            format!("{}: {}", nag.link_text, nag.link_url),
        ]
    }

    pub fn on_quit(&self, identity: &Identity) {
        self.statuses.remove(&identity.key);
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

impl CompletionObserver for KnownClients {
    fn on_result(&self, identity: &Identity, success: bool) {
        let status = if success {
            ClientStatus::Installed
        } else {
            ClientStatus::Failed
        };
        self.statuses.insert(identity.key.clone(), status);
    }

    fn on_missing(&self, identity: &Identity) {
        self.statuses
            .insert(identity.key.clone(), ClientStatus::Missing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clients(enabled: bool) -> KnownClients {
        KnownClients::new(NagSettings {
            enabled,
            message: "Get the modpack".to_string(),
            link_text: "Download".to_string(),
            link_url: "https://example.invalid".to_string(),
        })
    }

    #[test]
    fn test_missing_client_is_nagged() {
        let clients = clients(true);
        let alex = Identity::new("uuid-1", "Alex");
        clients.on_missing(&alex);

        assert_eq!(clients.status("uuid-1"), Some(ClientStatus::Missing));
        assert_eq!(
            clients.on_join(&alex),
            vec!["Get the modpack", "Download: https://example.invalid"]
        );

        clients.on_quit(&alex);
        assert!(clients.is_empty());
        assert!(clients.on_join(&alex).is_empty());
    }

    #[test]
    fn test_installed_and_unknown_not_nagged() {
        let clients = clients(true);
        let steve = Identity::new("uuid-2", "Steve");
        assert!(clients.on_join(&steve).is_empty());

        clients.on_result(&steve, true);
        assert_eq!(clients.status("uuid-2"), Some(ClientStatus::Installed));
        assert!(clients.on_join(&steve).is_empty());

        clients.on_result(&steve, false);
        assert_eq!(clients.status("uuid-2"), Some(ClientStatus::Failed));
        assert_eq!(clients.len(), 1);
    }

    #[test]
    fn test_nag_disabled() {
        let clients = clients(false);
        let alex = Identity::new("uuid-1", "Alex");
        clients.on_missing(&alex);
        assert!(clients.on_join(&alex).is_empty());

        clients.set_nag(NagSettings::from(&Settings::default()));
        assert_eq!(clients.on_join(&alex).len(), 2);
    }
}
