//! セッションマネージャ
//!
//! ホストの tick ごとに [`SessionManager::reconcile`] を一回呼ぶ。
//! セッションの追加と削除はここでしか行わない。受信フックはマップを読むだけ。

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::config::LoginConfig;
use crate::host::{HostAdapter, InboundAnswer, Interceptor};
use crate::session::{LoginServices, LoginSession};

/// 接続ハンドル → セッション
pub struct SessionManager<A: HostAdapter> {
    adapter: Arc<A>,
    services: LoginServices,
    /// 新しいセッションに渡す設定
    config: RwLock<Arc<LoginConfig>>,
    sessions: DashMap<A::Handle, Arc<LoginSession<A>>>,
}

impl<A: HostAdapter> SessionManager<A> {
    pub fn new(adapter: Arc<A>, config: LoginConfig, services: LoginServices) -> Self {
        SessionManager {
            adapter,
            services,
            config: RwLock::new(Arc::new(config)),
            sessions: DashMap::new(),
        }
    }

    /// 認証中の接続と突き合わせてセッションを作成・tick・削除する
    pub fn reconcile(&self) {
        let pending = self.adapter.pending_connections();

        for handle in &pending {
            if !self.sessions.contains_key(handle) {
                self.track(handle);
            }
        }

        // tick 中にシャードのロックを持たないよう、先に集める
        let live: Vec<Arc<LoginSession<A>>> =
            self.sessions.iter().map(|e| Arc::clone(e.value())).collect();
        for session in live {
            session.tick();
        }

        let present: HashSet<&A::Handle> = pending.iter().collect();
        self.sessions.retain(|handle, _| {
            let keep = present.contains(handle);
            if !keep {
                debug!(handle = ?handle, "connection left login, dropping session");
            }
            keep
        });
    }

    fn track(&self, handle: &A::Handle) {
        let session = Arc::new(LoginSession::new(
            handle.clone(),
            Arc::clone(&self.adapter),
            self.config(),
            self.services.clone(),
        ));

        // 削除済みセッションをフックが生かし続けないよう Weak で持つ
        let weak = Arc::downgrade(&session);
        let interceptor: Interceptor = Arc::new(move |answer: &InboundAnswer| {
            weak.upgrade()
                .is_some_and(|session| session.handle_answer(answer))
        });

        if !self.adapter.attach_interceptor(handle, interceptor) {
            warn!(handle = ?handle, "unable to attach AutoModpack packet interceptor, will retry next tick");
            return;
        }

        debug!(handle = ?handle, "tracking new login session");
        self.sessions.insert(handle.clone(), session);
    }

    /// 以降に作るセッションの設定を差し替える
    pub fn set_config(&self, config: LoginConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }

    pub fn config(&self) -> Arc<LoginConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn session(&self, handle: &A::Handle) -> Option<Arc<LoginSession<A>>> {
        self.sessions.get(handle).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, handle: &A::Handle) -> bool {
        self.sessions.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use amp_proto::HANDSHAKE_QUERY_ID;
    use amp_secret::SecretStore;

    use super::*;
    use crate::host::LoginPhase;
    use crate::session::LoginState;
    use crate::testing::{
        handshake_answer, marker_answer, Event, MockHost, MockStatus, RecordingObserver,
    };

    fn manager() -> (Arc<MockHost>, Arc<RecordingObserver>, SessionManager<MockHost>) {
        let host = Arc::new(MockHost::default());
        let observer = Arc::new(RecordingObserver::default());
        let services = LoginServices {
            secrets: Arc::new(SecretStore::new()),
            status: Arc::new(MockStatus::new(true, false)),
            observer: observer.clone(),
        };
        let manager = SessionManager::new(host.clone(), LoginConfig::default(), services);
        (host, observer, manager)
    }

    #[test]
    fn test_reconcile_creates_and_ticks() {
        let (host, _, manager) = manager();
        host.connect(1, "Alex", LoginPhase::Negotiating);
        host.connect(2, "Steve", LoginPhase::from_name("HELLO"));

        manager.reconcile();

        assert_eq!(manager.len(), 2);
        assert_eq!(host.sent_to(1).len(), 1);
        assert!(host.sent_to(2).is_empty());
        assert_eq!(
            manager.session(&1).map(|s| s.state()),
            Some(LoginState::HandshakeSent)
        );
    }

    #[test]
    fn test_interceptor_attached_once() {
        let (host, _, manager) = manager();
        host.connect(1, "Alex", LoginPhase::Negotiating);

        for _ in 0..5 {
            manager.reconcile();
        }

        assert_eq!(host.state().attach_calls, vec![1]);
        assert_eq!(host.sent_to(1).len(), 1);
    }

    #[test]
    fn test_attach_failure_retried_next_tick() {
        let (host, _, manager) = manager();
        host.connect(1, "Alex", LoginPhase::Negotiating);
        host.state().refuse_attach.insert(1);

        manager.reconcile();
        assert!(manager.is_empty());
        assert!(host.sent_to(1).is_empty());

        host.state().refuse_attach.clear();
        manager.reconcile();
        assert!(manager.contains(&1));
        assert_eq!(host.state().attach_calls, vec![1, 1]);
    }

    #[test]
    fn test_vanished_connection_is_pruned() {
        let (host, _, manager) = manager();
        host.connect(1, "Alex", LoginPhase::from_name("HELLO"));
        manager.reconcile();
        let session = manager.session(&1).unwrap();

        host.drop_connection(1);
        manager.reconcile();
        assert!(!manager.contains(&1));

        // 以後 tick されない: 段階が整ってもプローブは出ない
        host.set_phase(1, Some(LoginPhase::Negotiating));
        let queries_before = host.state().phase_queries.len();
        manager.reconcile();
        manager.reconcile();
        assert_eq!(host.state().phase_queries.len(), queries_before);
        assert!(host.sent_to(1).is_empty());
        assert_eq!(session.state(), LoginState::New);

        // 削除後はフックも応答を処理しない
        drop(session);
        assert!(!host.answer(1, &handshake_answer(&["fabric"], "4.0.0", "1.21.1")));
    }

    #[test]
    fn test_full_flow_through_interceptor() {
        let (host, observer, manager) = manager();
        host.connect(7, "Alex", LoginPhase::ReadyToAccept);

        manager.reconcile();
        assert!(host.answer(7, &handshake_answer(&["Fabric"], "4.0.0", "1.21.1")));
        manager.reconcile();
        assert_eq!(
            manager.session(&7).map(|s| s.state()),
            Some(LoginState::AwaitingDeliveryResult)
        );

        assert!(host.answer(7, &marker_answer("false")));
        // 終了済みでも接続が残っている間はセッションを保持し、再プローブしない
        manager.reconcile();
        assert!(manager.contains(&7));
        assert_eq!(host.sent_to(7).len(), 2);
        assert_eq!(observer.events(), vec![Event::Result("uuid-7".to_string(), true)]);

        assert!(!host.answer(7, &InboundAnswer::not_understood(HANDSHAKE_QUERY_ID)));
    }

    #[test]
    fn test_config_applies_to_new_sessions() {
        let (host, _, manager) = manager();
        host.connect(1, "Alex", LoginPhase::Negotiating);
        manager.reconcile();

        manager.set_config(LoginConfig {
            force_mod: true,
            ..LoginConfig::default()
        });
        host.connect(2, "Steve", LoginPhase::Negotiating);
        manager.reconcile();

        host.answer(1, &InboundAnswer::not_understood(HANDSHAKE_QUERY_ID));
        host.answer(2, &InboundAnswer::not_understood(HANDSHAKE_QUERY_ID));

        assert!(host.disconnects_of(1).is_empty());
        assert_eq!(host.disconnects_of(2).len(), 1);
        assert!(manager.config().force_mod);
    }
}
