//! テスト用のホスト・オブザーバ・配布サーバーのモック

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use amp_proto::{encode_handshake, utf_payload, Handshake, DATA_QUERY_ID, HANDSHAKE_QUERY_ID};

use crate::host::{
    CompletionObserver, DistributionStatus, HostAdapter, Identity, InboundAnswer, Interceptor,
    LoginPhase, OutboundQuery,
};

#[derive(Default)]
pub(crate) struct MockHostState {
    pub pending: Vec<u32>,
    pub phases: HashMap<u32, LoginPhase>,
    pub identities: HashMap<u32, Identity>,
    pub interceptors: HashMap<u32, Interceptor>,
    pub attach_calls: Vec<u32>,
    pub refuse_attach: HashSet<u32>,
    pub sent: Vec<(u32, OutboundQuery)>,
    pub disconnects: Vec<(u32, String)>,
    pub phase_queries: Vec<u32>,
}

#[derive(Default)]
pub(crate) struct MockHost {
    state: Mutex<MockHostState>,
}

impl MockHost {
    pub fn state(&self) -> MutexGuard<'_, MockHostState> {
        self.state.lock().unwrap()
    }

    pub fn connect(&self, handle: u32, name: &str, phase: LoginPhase) {
        let mut s = self.state();
        s.pending.push(handle);
        s.phases.insert(handle, phase);
        s.identities
            .insert(handle, Identity::new(format!("uuid-{handle}"), name));
    }

    pub fn drop_connection(&self, handle: u32) {
        self.state().pending.retain(|h| *h != handle);
    }

    pub fn set_phase(&self, handle: u32, phase: Option<LoginPhase>) {
        let mut s = self.state();
        match phase {
            Some(p) => s.phases.insert(handle, p),
            None => s.phases.remove(&handle),
        };
    }

    pub fn forget_identity(&self, handle: u32) {
        self.state().identities.remove(&handle);
    }

    /// ネットワークスレッドからの応答を模す
    pub fn answer(&self, handle: u32, answer: &InboundAnswer) -> bool {
        let interceptor = self.state().interceptors.get(&handle).cloned();
        interceptor.is_some_and(|f| f(answer))
    }

    pub fn sent_to(&self, handle: u32) -> Vec<OutboundQuery> {
        self.state()
            .sent
            .iter()
            .filter(|(h, _)| *h == handle)
            .map(|(_, q)| q.clone())
            .collect()
    }

    pub fn disconnects_of(&self, handle: u32) -> Vec<String> {
        self.state()
            .disconnects
            .iter()
            .filter(|(h, _)| *h == handle)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl HostAdapter for MockHost {
    type Handle = u32;

    fn pending_connections(&self) -> Vec<u32> {
        self.state().pending.clone()
    }

    fn attach_interceptor(&self, handle: &u32, interceptor: Interceptor) -> bool {
        let mut s = self.state();
        s.attach_calls.push(*handle);
        if s.refuse_attach.contains(handle) {
            return false;
        }
        s.interceptors.entry(*handle).or_insert(interceptor);
        true
    }

    fn send_packet(&self, handle: &u32, query: OutboundQuery) {
        self.state().sent.push((*handle, query));
    }

    fn login_phase(&self, handle: &u32) -> Option<LoginPhase> {
        let mut s = self.state();
        s.phase_queries.push(*handle);
        s.phases.get(handle).cloned()
    }

    fn identity_of(&self, handle: &u32) -> Option<Identity> {
        self.state().identities.get(handle).cloned()
    }

    fn disconnect(&self, handle: &u32, message: &str) {
        self.state().disconnects.push((*handle, message.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Result(String, bool),
    Missing(String),
}

#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl CompletionObserver for RecordingObserver {
    fn on_result(&self, identity: &Identity, success: bool) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Result(identity.key.clone(), success));
    }

    fn on_missing(&self, identity: &Identity) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Missing(identity.key.clone()));
    }
}

pub(crate) struct MockStatus {
    running: AtomicBool,
    generating: AtomicBool,
    fingerprint: Mutex<Option<String>>,
}

impl MockStatus {
    pub fn new(running: bool, generating: bool) -> Self {
        MockStatus {
            running: AtomicBool::new(running),
            generating: AtomicBool::new(generating),
            fingerprint: Mutex::new(None),
        }
    }

    pub fn set_running(&self, value: bool) {
        self.running.store(value, Ordering::SeqCst);
    }

    pub fn set_generating(&self, value: bool) {
        self.generating.store(value, Ordering::SeqCst);
    }

    pub fn set_fingerprint(&self, value: Option<String>) {
        *self.fingerprint.lock().unwrap() = value;
    }
}

impl DistributionStatus for MockStatus {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    fn certificate_fingerprint(&self) -> Option<String> {
        self.fingerprint.lock().unwrap().clone()
    }
}

/// クライアントのハンドシェイク応答
pub(crate) fn handshake_answer(loaders: &[&str], am_version: &str, mc_version: &str) -> InboundAnswer {
    let handshake = Handshake::new(
        loaders.iter().map(|l| l.to_string()).collect(),
        am_version,
        mc_version,
    );
    InboundAnswer::understood(
        HANDSHAKE_QUERY_ID,
        utf_payload(&encode_handshake(&handshake)).unwrap(),
    )
}

/// クライアントの配布結果応答
pub(crate) fn marker_answer(marker: &str) -> InboundAnswer {
    InboundAnswer::understood(DATA_QUERY_ID, utf_payload(marker).unwrap())
}
