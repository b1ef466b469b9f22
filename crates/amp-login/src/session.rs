//! ログインセッション状態機械
//!
//! 接続一つにつき一つ。ホストの tick スレッドからは [`LoginSession::tick`]、
//! ネットワークスレッドからは [`LoginSession::handle_answer`] が呼ばれるので、
//! 状態はすべて `Mutex` の内側に置く。
//!
//! ## 状態遷移
//!
//! ```text
//! New ──(ready phase)──► HandshakeSent ──(next tick)──► AwaitingClientHandshake
//!                              │                                 │
//!                              └──────── handshake answer ───────┤
//!                                                                ├─► Rejected
//!                                                                ▼
//!                        CredentialSent ──(next tick)──► AwaitingDeliveryResult
//!                              │                                 │
//!                              └───────── delivery marker ───────┴─► Complete / Rejected
//! ```
//!
//! ホストへの送信とオブザーバ呼び出しはロックを外してから行う。アダプタが
//! 同期的に応答を返してきても再入でデッドロックしない。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use amp_proto::{
    decode_handshake, encode_credential_offer, is_client_version_higher, parse_delivery_marker,
    read_utf_payload, utf_payload, CredentialOffer, DeliveryMarker, Handshake, DATA_CHANNEL,
    DATA_QUERY_ID, HANDSHAKE_CHANNEL, HANDSHAKE_QUERY_ID,
};
use amp_secret::SecretStore;
use tracing::{debug, error, info, warn};

use crate::config::{messages, LoginConfig, SHARED_PORT};
use crate::host::{
    CompletionObserver, DistributionStatus, HostAdapter, Identity, InboundAnswer, OutboundQuery,
};

/// セッションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    New,
    /// プローブを送った tick
    HandshakeSent,
    AwaitingClientHandshake,
    /// クレデンシャルを送った tick
    CredentialSent,
    AwaitingDeliveryResult,
    Complete,
    Rejected,
}

impl LoginState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoginState::Complete | LoginState::Rejected)
    }
}

/// Rejected になった理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// クライアントがサイドチャンネルを理解しなかった。`forced` なら切断済み
    NotInstalled { forced: bool },
    /// 応答が文字列として読めなかった
    InvalidPayload,
    /// ハンドシェイクとして解釈できなかった
    Malformed,
    LoaderMismatch,
    VersionMismatch { client_ahead: bool },
    /// 配布サーバーが動いていない
    Unavailable,
    /// コンテンツインデックス生成中
    Generating,
    /// クライアントのモッドパックが古い・足りない
    ContentMissing,
    /// 配布結果が想定外（ホスト側の設定ミス）
    HostError,
    /// サーバー内部のエラー（クレデンシャル発行失敗など）
    Internal,
}

/// セッションが使う共有サービス
#[derive(Clone)]
pub struct LoginServices {
    pub secrets: Arc<SecretStore>,
    pub status: Arc<dyn DistributionStatus>,
    pub observer: Arc<dyn CompletionObserver>,
}

/// ロックを外してから実行する副作用
enum Effect {
    Send(OutboundQuery),
    Disconnect(String),
    Result(Identity, bool),
    Missing(Identity),
}

struct SessionInner {
    state: LoginState,
    handshake_sent: bool,
    credential_sent: bool,
    closed: bool,
    rejection: Option<Rejection>,
}

/// 接続一つ分のログインセッション
pub struct LoginSession<A: HostAdapter> {
    handle: A::Handle,
    adapter: Arc<A>,
    config: Arc<LoginConfig>,
    services: LoginServices,
    inner: Mutex<SessionInner>,
}

impl<A: HostAdapter> LoginSession<A> {
    pub fn new(
        handle: A::Handle,
        adapter: Arc<A>,
        config: Arc<LoginConfig>,
        services: LoginServices,
    ) -> Self {
        LoginSession {
            handle,
            adapter,
            config,
            services,
            inner: Mutex::new(SessionInner {
                state: LoginState::New,
                handshake_sent: false,
                credential_sent: false,
                closed: false,
                rejection: None,
            }),
        }
    }

    pub fn handle(&self) -> &A::Handle {
        &self.handle
    }

    pub fn state(&self) -> LoginState {
        self.lock().state
    }

    pub fn rejection(&self) -> Option<Rejection> {
        self.lock().rejection.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// ホストの tick ごとに呼ぶ
    ///
    /// 送信済みの段階を待ち状態に進め、ログイン段階が整っていればプローブを
    /// 一度だけ送る。
    pub fn tick(&self) {
        let mut fx = Vec::new();
        {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }

            match inner.state {
                LoginState::HandshakeSent => inner.state = LoginState::AwaitingClientHandshake,
                LoginState::CredentialSent => inner.state = LoginState::AwaitingDeliveryResult,
                _ => {}
            }

            if !inner.handshake_sent {
                let ready = self
                    .adapter
                    .login_phase(&self.handle)
                    .is_some_and(|phase| phase.is_side_channel_ready());
                if ready {
                    self.send_handshake(&mut inner, &mut fx);
                }
            }
        }
        self.apply(fx);
    }

    /// サイドチャンネルの応答を処理する
    ///
    /// # 戻り値
    /// このセッションが処理した（ホストに渡さない）なら true。
    /// 未知のクエリ ID と、終了済みセッションへの応答は false
    pub fn handle_answer(&self, answer: &InboundAnswer) -> bool {
        let mut fx = Vec::new();
        let handled = {
            let mut inner = self.lock();
            if inner.closed {
                return false;
            }

            match answer.id {
                HANDSHAKE_QUERY_ID => {
                    if matches!(
                        inner.state,
                        LoginState::HandshakeSent | LoginState::AwaitingClientHandshake
                    ) {
                        self.on_handshake_answer(&mut inner, &mut fx, answer.data.as_deref());
                    } else {
                        debug!(handle = ?self.handle, state = ?inner.state, "ignoring handshake answer");
                    }
                    true
                }
                DATA_QUERY_ID => {
                    if matches!(
                        inner.state,
                        LoginState::CredentialSent | LoginState::AwaitingDeliveryResult
                    ) {
                        self.on_delivery_answer(&mut inner, &mut fx, answer.data.as_deref());
                    } else {
                        debug!(handle = ?self.handle, state = ?inner.state, "ignoring delivery answer");
                    }
                    true
                }
                _ => false,
            }
        };
        self.apply(fx);
        handled
    }

    fn send_handshake(&self, inner: &mut SessionInner, fx: &mut Vec<Effect>) {
        inner.handshake_sent = true;
        match utf_payload(&self.config.probe_json()) {
            Ok(payload) => {
                inner.state = LoginState::HandshakeSent;
                debug!(handle = ?self.handle, "sent AutoModpack handshake probe");
                fx.push(Effect::Send(OutboundQuery {
                    id: HANDSHAKE_QUERY_ID,
                    channel: HANDSHAKE_CHANNEL.to_string(),
                    payload,
                }));
            }
            Err(e) => {
                error!(error = %e, "unable to create AutoModpack handshake packet");
                let identity = self.identity();
                self.reject(inner, fx, identity, Rejection::Internal, None);
            }
        }
    }

    fn on_handshake_answer(
        &self,
        inner: &mut SessionInner,
        fx: &mut Vec<Effect>,
        data: Option<&[u8]>,
    ) {
        let identity = self.identity();

        let Some(data) = data else {
            warn!(player = %identity.display_name, "client has not installed AutoModpack");
            let forced = self.config.force_mod;
            let message = forced.then(|| self.config.required_mod_message());
            self.reject(inner, fx, identity, Rejection::NotInstalled { forced }, message);
            return;
        };

        let json = match read_utf_payload(data) {
            Ok(json) => json,
            Err(e) => {
                warn!(player = %identity.display_name, error = %e, "invalid AutoModpack handshake");
                let message = Some(messages::INVALID_HANDSHAKE.to_string());
                self.reject(inner, fx, identity, Rejection::InvalidPayload, message);
                return;
            }
        };

        let Some(handshake) = decode_handshake(&json) else {
            warn!(player = %identity.display_name, "malformed AutoModpack handshake payload");
            let message = Some(messages::MALFORMED_HANDSHAKE.to_string());
            self.reject(inner, fx, identity, Rejection::Malformed, message);
            return;
        };

        if let Err((rejection, message)) = self.validate(&handshake) {
            warn!(
                player = %identity.display_name,
                reason = %message,
                "AutoModpack handshake rejected"
            );
            self.reject(inner, fx, identity, rejection, Some(message));
            return;
        }

        info!(
            player = %identity.display_name,
            am_version = %handshake.am_version,
            mc_version = %handshake.mc_version,
            "client has installed AutoModpack"
        );
        self.offer_credential(inner, fx, identity);
    }

    fn validate(&self, handshake: &Handshake) -> Result<(), (Rejection, String)> {
        if !handshake.supports_any(&self.config.accepted_loaders) {
            return Err((
                Rejection::LoaderMismatch,
                self.config.required_mod_message(),
            ));
        }

        let server_version = &self.config.automodpack_version;
        if &handshake.am_version != server_version {
            if is_client_version_higher(&handshake.am_version, server_version) {
                return Err((
                    Rejection::VersionMismatch { client_ahead: true },
                    messages::CLIENT_AHEAD.to_string(),
                ));
            }
            return Err((
                Rejection::VersionMismatch {
                    client_ahead: false,
                },
                self.config.version_mismatch_message(),
            ));
        }

        Ok(())
    }

    fn offer_credential(&self, inner: &mut SessionInner, fx: &mut Vec<Effect>, identity: Identity) {
        if inner.credential_sent {
            return;
        }
        inner.credential_sent = true;

        let status = &self.services.status;
        if !status.is_running() {
            warn!(
                player = %identity.display_name,
                "AutoModpack host server is not running, unable to deliver modpack"
            );
            let message = Some(messages::UNAVAILABLE.to_string());
            self.reject(inner, fx, identity, Rejection::Unavailable, message);
            return;
        }
        if status.is_generating() {
            info!(player = %identity.display_name, "modpack is still generating, asking client to retry");
            let message = Some(messages::GENERATING.to_string());
            self.reject(inner, fx, identity, Rejection::Generating, message);
            return;
        }

        let secret = match self.services.secrets.issue(&identity.key) {
            Ok(secret) => secret,
            Err(e) => {
                error!(player = %identity.display_name, error = %e, "failed to issue distribution secret");
                let message = Some(messages::HOST_ERROR.to_string());
                self.reject(inner, fx, identity, Rejection::Internal, message);
                return;
            }
        };

        let offer = CredentialOffer {
            address: self.config.address_to_send.clone(),
            port: self.config.port_to_send,
            modpack_name: self.config.modpack_name.clone(),
            secret: secret.secret.clone(),
            timestamp: secret.timestamp,
            mod_required: self.config.force_mod,
            requires_magic: self.config.requires_magic(),
        };

        match utf_payload(&encode_credential_offer(&offer)) {
            Ok(payload) => {
                inner.state = LoginState::CredentialSent;
                info!(player = %identity.display_name, "dispatched AutoModpack host data");
                fx.push(Effect::Send(OutboundQuery {
                    id: DATA_QUERY_ID,
                    channel: DATA_CHANNEL.to_string(),
                    payload,
                }));
            }
            Err(e) => {
                self.services.secrets.remove(&secret.secret);
                error!(player = %identity.display_name, error = %e, "failed to build AutoModpack data packet");
                let message = Some(messages::HOST_ERROR.to_string());
                self.reject(inner, fx, identity, Rejection::Internal, message);
            }
        }
    }

    fn on_delivery_answer(
        &self,
        inner: &mut SessionInner,
        fx: &mut Vec<Effect>,
        data: Option<&[u8]>,
    ) {
        // 理解されなかった・空の応答は無視して、ホスト自身のタイムアウトに任せる
        let Some(data) = data else {
            debug!(handle = ?self.handle, "data query not understood, ignoring");
            return;
        };
        let marker = match read_utf_payload(data) {
            Ok(marker) => marker,
            Err(e) => {
                debug!(handle = ?self.handle, error = %e, "unreadable delivery marker, ignoring");
                return;
            }
        };

        let identity = self.identity();
        match parse_delivery_marker(&marker) {
            DeliveryMarker::Satisfied => {
                info!(player = %identity.display_name, "client has installed whole modpack");
                inner.state = LoginState::Complete;
                inner.closed = true;
                fx.push(Effect::Result(identity, true));
            }
            DeliveryMarker::Missing => {
                let fingerprint = self
                    .services
                    .status
                    .certificate_fingerprint()
                    .unwrap_or_else(|| "unknown".to_string());
                warn!(
                    player = %identity.display_name,
                    fingerprint = %fingerprint,
                    "client has not installed modpack"
                );
                let message = Some(messages::CONTENT_MISSING.to_string());
                self.reject(inner, fx, identity, Rejection::ContentMissing, message);
            }
            DeliveryMarker::Other(value) => {
                error!(
                    player = %identity.display_name,
                    marker = %value,
                    "AutoModpack host server is down or server is not configured correctly"
                );
                let message = Some(messages::HOST_ERROR.to_string());
                self.reject(inner, fx, identity, Rejection::HostError, message);
                self.log_host_misconfiguration();
            }
        }
    }

    /// Rejected にして、必要なら切断し、オブザーバに一度だけ通知する
    fn reject(
        &self,
        inner: &mut SessionInner,
        fx: &mut Vec<Effect>,
        identity: Identity,
        rejection: Rejection,
        disconnect: Option<String>,
    ) {
        inner.state = LoginState::Rejected;
        inner.closed = true;
        if let Some(message) = disconnect {
            fx.push(Effect::Disconnect(message));
        }
        fx.push(match rejection {
            Rejection::NotInstalled { .. } => Effect::Missing(identity),
            _ => Effect::Result(identity, false),
        });
        inner.rejection = Some(rejection);
    }

    fn log_host_misconfiguration(&self) {
        let config = &self.config;
        error!(
            bind_port = config.bind_port,
            port_to_send = config.port_to_send,
            address_to_send = %config.address_to_send,
            "host server error: AutoModpack host server is down or server is not configured correctly"
        );

        if config.bind_port == SHARED_PORT {
            warn!("You are hosting AutoModpack host server on the Minecraft port.");
        } else {
            warn!(
                bind_port = config.bind_port,
                "Please check if AutoModpack host server (TCP) port is forwarded / opened correctly"
            );
        }
        warn!("Make sure that 'address-to-send' is correctly set in the config file! It can be either an IP address or a domain pointing to your modpack host server.");
        warn!("If nothing works, try changing the 'bind-port' in the config file, then forward / open it and restart server");
        warn!("Some hosting providers proxy this port internally and give you a different address and port. In that case set them as 'address-to-send' and 'port-to-send'.");

        if config.bind_port != config.port_to_send
            && config.bind_port != SHARED_PORT
            && config.port_to_send != SHARED_PORT
        {
            error!(
                bind_port = config.bind_port,
                port_to_send = config.port_to_send,
                "bind-port is different than port-to-send. If you are not using reverse proxy, match them! If you do use reverse proxy, make sure it is setup correctly."
            );
        }

        if let Some(fingerprint) = self
            .services
            .status
            .certificate_fingerprint()
            .filter(|f| !f.trim().is_empty())
        {
            warn!(fingerprint = %fingerprint, "server certificate fingerprint");
        }
    }

    fn identity(&self) -> Identity {
        self.adapter
            .identity_of(&self.handle)
            .unwrap_or_else(Identity::unknown)
    }

    fn apply(&self, fx: Vec<Effect>) {
        for effect in fx {
            match effect {
                Effect::Send(query) => self.adapter.send_packet(&self.handle, query),
                Effect::Disconnect(message) => self.adapter.disconnect(&self.handle, &message),
                Effect::Result(identity, success) => {
                    self.services.observer.on_result(&identity, success)
                }
                Effect::Missing(identity) => self.services.observer.on_missing(&identity),
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
