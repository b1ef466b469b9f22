//! 配布サーバー
//!
//! ```text
//! TCP accept（または serve_stream でゲームポートから受け取る）
//!   ├─ ClientHello / ServerHello（平文）
//!   ├─ TLS 有効なら TlsAcceptor で包む
//!   └─ フレームごとに
//!        ├─ クレデンシャルを SecretStore で検証（失敗 → Unauthorized で切断）
//!        ├─ Echo       → そのまま返す
//!        └─ FileRequest → FileResponse + Chunk... + EndOfTransmission
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use amp_secret::{unix_now, SecretStore};
use amp_transport::{
    check_chunk_size, read_frame, write_frame, ChunkReader, ClientHello, CodecRegistry,
    CompressionCodec, ErrorCode, MessageBody, ProtocolMessage, ServerHello, ServerMessage,
    CHUNK_SIZE, COMPRESSION_NONE, PROTOCOL_VERSION,
};
use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bandwidth::BandwidthLimiter;
use crate::error::{ServerError, ServerResult};
use crate::index::ContentIndex;
use crate::tls::{self, TlsMaterial};

/// ゲームポートを共有する bind port
pub const SHARED_PORT: i32 = -1;

/// 起動時に読む設定
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub bind_address: String,
    /// -1 でゲームポート共有、0 で空いているポート
    pub bind_port: i32,
    pub disable_tls: bool,
    /// Mbit/s。0 は無制限
    pub bandwidth_limit: u64,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// 1 チャンクの最大バイト数。フレームに収まること
    pub chunk_size: usize,
}

impl ServerOptions {
    /// 起動前の検査
    ///
    /// # エラー
    /// - `ServerError::InvalidOptions`: ポートが範囲外、またはチャンクがフレームに収まらない
    pub fn validate(&self) -> ServerResult<()> {
        if self.bind_port != SHARED_PORT && u16::try_from(self.bind_port).is_err() {
            return Err(ServerError::InvalidOptions(format!(
                "invalid bind port {}",
                self.bind_port
            )));
        }
        check_chunk_size(self.chunk_size)
            .map_err(|e| ServerError::InvalidOptions(e.to_string()))
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            bind_address: "0.0.0.0".to_string(),
            bind_port: SHARED_PORT,
            disable_tls: false,
            bandwidth_limit: 0,
            cert_path: PathBuf::from(".private/cert.crt"),
            key_path: PathBuf::from(".private/key.pem"),
            chunk_size: CHUNK_SIZE,
        }
    }
}

/// 接続処理が共有する状態
struct ConnectionContext {
    secrets: Arc<SecretStore>,
    index: Arc<dyn ContentIndex>,
    codecs: Arc<CodecRegistry>,
    limiter: BandwidthLimiter,
    connections: Arc<DashMap<String, usize>>,
    tls: Option<TlsMaterial>,
    chunk_size: usize,
}

struct Running {
    context: Arc<ConnectionContext>,
    shutdown: watch::Sender<bool>,
    local_addr: Option<SocketAddr>,
}

/// identity ごとの接続数を数える
struct ConnectionGuard {
    connections: Arc<DashMap<String, usize>>,
    identity: String,
}

impl ConnectionGuard {
    fn new(connections: Arc<DashMap<String, usize>>, identity: String) -> Self {
        *connections.entry(identity.clone()).or_insert(0) += 1;
        ConnectionGuard {
            connections,
            identity,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connections
            .remove_if_mut(&self.identity, |_, count| {
                *count = count.saturating_sub(1);
                *count == 0
            });
    }
}

/// 配布サーバー
pub struct HostServer {
    secrets: Arc<SecretStore>,
    index: Arc<dyn ContentIndex>,
    codecs: Arc<CodecRegistry>,
    options: Mutex<ServerOptions>,
    connections: Arc<DashMap<String, usize>>,
    running: Mutex<Option<Running>>,
}

impl HostServer {
    pub fn new(
        options: ServerOptions,
        secrets: Arc<SecretStore>,
        index: Arc<dyn ContentIndex>,
    ) -> Self {
        HostServer {
            secrets,
            index,
            codecs: Arc::new(CodecRegistry::default()),
            options: Mutex::new(options),
            connections: Arc::new(DashMap::new()),
            running: Mutex::new(None),
        }
    }

    /// 次回起動時の設定を差し替える
    pub fn set_options(&self, options: ServerOptions) {
        *self.options.lock().unwrap_or_else(PoisonError::into_inner) = options;
    }

    pub fn options(&self) -> ServerOptions {
        self.options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// サーバーを起動する
    ///
    /// bind port が -1 のときは待ち受けず、[`HostServer::serve_stream`] で
    /// ゲームポートから渡される接続だけを処理する。
    ///
    /// # 戻り値
    /// 待ち受けたアドレス（ゲームポート共有時は `None`）
    ///
    /// # エラー
    /// - `ServerError::AlreadyRunning`: 起動済み
    /// - 証明書や bind の失敗
    pub async fn start(&self) -> ServerResult<Option<SocketAddr>> {
        if self.is_running() {
            return Err(ServerError::AlreadyRunning);
        }
        let options = self.options();
        options.validate()?;

        let tls = if options.disable_tls {
            warn!("internal TLS is disabled, modpack traffic is sent in plain text");
            None
        } else {
            Some(tls::load_or_create(&options.cert_path, &options.key_path)?)
        };

        let context = Arc::new(ConnectionContext {
            secrets: Arc::clone(&self.secrets),
            index: Arc::clone(&self.index),
            codecs: Arc::clone(&self.codecs),
            limiter: BandwidthLimiter::new(options.bandwidth_limit),
            connections: Arc::clone(&self.connections),
            tls,
            chunk_size: options.chunk_size,
        });
        let (shutdown, shutdown_rx) = watch::channel(false);

        let local_addr = if options.bind_port == SHARED_PORT {
            info!("distribution server sharing the game port");
            None
        } else {
            let port = u16::try_from(options.bind_port).map_err(|_| {
                ServerError::InvalidOptions(format!("invalid bind port {}", options.bind_port))
            })?;
            let listener = TcpListener::bind((options.bind_address.as_str(), port)).await?;
            let addr = listener.local_addr()?;
            info!(%addr, tls = context.tls.is_some(), "distribution server listening");
            tokio::spawn(accept_loop(listener, Arc::clone(&context), shutdown_rx));
            Some(addr)
        };

        let mut running = self.running();
        if running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        *running = Some(Running {
            context,
            shutdown,
            local_addr,
        });
        Ok(local_addr)
    }

    /// サーバーを止める。処理中の接続も次のフレームで閉じる
    ///
    /// # 戻り値
    /// 起動していたか
    pub fn stop(&self) -> bool {
        let Some(running) = self.running().take() else {
            return false;
        };
        let _ = running.shutdown.send(true);
        info!("distribution server stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    pub fn is_generating(&self) -> bool {
        self.index.is_generating()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running().as_ref().and_then(|r| r.local_addr)
    }

    /// identity → 開いている接続数
    pub fn connections(&self) -> HashMap<String, usize> {
        self.connections
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    /// 使用中の証明書のフィンガープリント（TLS 無効または停止中は `None`）
    pub fn certificate_fingerprint(&self) -> Option<String> {
        self.running()
            .as_ref()
            .and_then(|r| r.context.tls.as_ref())
            .map(|t| t.fingerprint.clone())
    }

    /// ゲームポートで見つけた配布接続を処理する
    ///
    /// `stream` はプリアンブルを読む前の状態で渡すこと。
    pub async fn serve_stream<S>(&self, stream: S) -> ServerResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (context, shutdown) = {
            let running = self.running();
            let running = running.as_ref().ok_or(ServerError::NotRunning)?;
            (Arc::clone(&running.context), running.shutdown.subscribe())
        };
        serve_connection(context, stream, shutdown).await
    }
}

impl Drop for HostServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(
    listener: TcpListener,
    context: Arc<ConnectionContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let context = Arc::clone(&context);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(context, stream, shutdown).await {
                            debug!(%peer, error = %e, "distribution connection closed with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "failed to accept distribution connection"),
            },
        }
    }
    debug!("distribution accept loop finished");
}

async fn serve_connection<S>(
    context: Arc<ConnectionContext>,
    mut stream: S,
    shutdown: watch::Receiver<bool>,
) -> ServerResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let hello = ClientHello::read_from(&mut stream).await?;
    let compression = if context.codecs.supports(hello.compression) {
        hello.compression
    } else {
        COMPRESSION_NONE
    };
    ServerHello {
        version: PROTOCOL_VERSION,
        compression,
        tls: context.tls.is_some(),
    }
    .write_to(&mut stream)
    .await?;

    if hello.version != PROTOCOL_VERSION {
        debug!(
            client_version = hello.version,
            "closing connection with unsupported protocol version"
        );
        return Ok(());
    }
    let codec = context.codecs.get(compression)?;

    match &context.tls {
        Some(tls) => {
            let stream = tls.acceptor.accept(stream).await?;
            serve_messages(&context, stream, codec.as_ref(), shutdown).await
        }
        None => serve_messages(&context, stream, codec.as_ref(), shutdown).await,
    }
}

async fn serve_messages<S>(
    context: &ConnectionContext,
    mut stream: S,
    codec: &dyn CompressionCodec,
    mut shutdown: watch::Receiver<bool>,
) -> ServerResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut guard: Option<ConnectionGuard> = None;

    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            frame = read_frame(&mut stream, codec) => frame?,
        };
        let Some(bytes) = frame else { break };

        let message = match ProtocolMessage::decode(&bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "malformed distribution message");
                send_error(&mut stream, codec, ErrorCode::BadRequest, "Malformed message").await?;
                break;
            }
        };
        if message.version != PROTOCOL_VERSION {
            send_error(
                &mut stream,
                codec,
                ErrorCode::UnsupportedVersion,
                &format!("Unsupported protocol version {}", message.version),
            )
            .await?;
            break;
        }

        let identity = match std::str::from_utf8(&message.credential)
            .ok()
            .map(|token| context.secrets.validate(token, unix_now()))
        {
            Some(Ok(identity)) => identity,
            Some(Err(e)) => {
                warn!(error = %e, "rejecting distribution request with invalid secret");
                send_error(&mut stream, codec, ErrorCode::Unauthorized, "Unauthorized").await?;
                break;
            }
            None => {
                send_error(&mut stream, codec, ErrorCode::Unauthorized, "Unauthorized").await?;
                break;
            }
        };
        if guard.is_none() {
            debug!(identity = %identity, "distribution client authenticated");
            guard = Some(ConnectionGuard::new(
                Arc::clone(&context.connections),
                identity.clone(),
            ));
        }

        match message.body {
            MessageBody::Echo(data) => send(&mut stream, codec, &ServerMessage::Echo(data)).await?,
            MessageBody::FileRequest(hash) => {
                serve_file(context, &mut stream, codec, &identity, &hash).await?
            }
        }
        stream.flush().await?;
    }

    let _ = stream.shutdown().await;
    drop(guard);
    Ok(())
}

async fn serve_file<S>(
    context: &ConnectionContext,
    stream: &mut S,
    codec: &dyn CompressionCodec,
    identity: &str,
    hash: &[u8],
) -> ServerResult<()>
where
    S: AsyncWrite + Unpin,
{
    let Ok(hash) = std::str::from_utf8(hash) else {
        return send_error(stream, codec, ErrorCode::BadRequest, "Hash is not UTF-8").await;
    };
    if context.index.is_generating() {
        return send_error(stream, codec, ErrorCode::Busy, "Modpack is being generated").await;
    }
    let Some(entry) = context.index.lookup(hash) else {
        debug!(identity, hash, "requested file not in modpack");
        return send_error(stream, codec, ErrorCode::NotFound, "File not found").await;
    };
    let file = match tokio::fs::File::open(&entry.location).await {
        Ok(f) => f,
        Err(e) => {
            warn!(file = %entry.file, error = %e, "failed to open modpack file");
            return send_error(stream, codec, ErrorCode::Internal, "Failed to read file").await;
        }
    };
    let size = match file.metadata().await {
        Ok(m) => m.len(),
        Err(e) => {
            warn!(file = %entry.file, error = %e, "failed to stat modpack file");
            return send_error(stream, codec, ErrorCode::Internal, "Failed to read file").await;
        }
    };
    if size != entry.size {
        warn!(
            file = %entry.file,
            indexed = entry.size,
            actual = size,
            "modpack file changed since the last generation"
        );
        return send_error(stream, codec, ErrorCode::Internal, "File changed on disk").await;
    }

    debug!(identity, file = %entry.file, size, "sending modpack file");
    let mut chunks = ChunkReader::new(file, size, context.chunk_size)?;
    send(stream, codec, &ServerMessage::FileResponse { size }).await?;
    while let Some(chunk) = chunks.next_chunk().await? {
        context.limiter.acquire(chunk.len()).await;
        send(stream, codec, &ServerMessage::Chunk(chunk)).await?;
    }
    send(stream, codec, &ServerMessage::EndOfTransmission).await
}

async fn send<S>(
    stream: &mut S,
    codec: &dyn CompressionCodec,
    message: &ServerMessage,
) -> ServerResult<()>
where
    S: AsyncWrite + Unpin,
{
    let bytes = message.encode(PROTOCOL_VERSION)?;
    write_frame(stream, codec, &bytes).await?;
    Ok(())
}

async fn send_error<S>(
    stream: &mut S,
    codec: &dyn CompressionCodec,
    code: ErrorCode,
    message: &str,
) -> ServerResult<()>
where
    S: AsyncWrite + Unpin,
{
    send(
        stream,
        codec,
        &ServerMessage::Error {
            code,
            message: message.to_string(),
        },
    )
    .await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use super::*;
    use crate::client::DistributionClient;
    use crate::index::{hash_file, ContentEntry, DirectoryIndex};

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    struct Fixture {
        dir: tempfile::TempDir,
        secrets: Arc<SecretStore>,
        server: Arc<HostServer>,
    }

    fn fixture(options: ServerOptions) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("main");
        fs::create_dir_all(root.join("mods")).unwrap();
        fs::write(root.join("mods/a.jar"), b"hello").unwrap();
        let big: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        fs::write(root.join("big.bin"), big).unwrap();

        let index = Arc::new(DirectoryIndex::new(root, dir.path().join("content.json")));
        index.generate().unwrap();
        let secrets = Arc::new(SecretStore::new());
        let options = ServerOptions {
            cert_path: dir.path().join(".private/cert.crt"),
            key_path: dir.path().join(".private/key.pem"),
            ..options
        };
        let server = Arc::new(HostServer::new(options, Arc::clone(&secrets), index));
        Fixture {
            dir,
            secrets,
            server,
        }
    }

    fn plain() -> ServerOptions {
        ServerOptions {
            bind_address: "127.0.0.1".to_string(),
            bind_port: 0,
            disable_tls: true,
            ..ServerOptions::default()
        }
    }

    struct BusyIndex;

    impl ContentIndex for BusyIndex {
        fn generate(&self) -> ServerResult<bool> {
            Ok(false)
        }

        fn is_generating(&self) -> bool {
            true
        }

        fn lookup(&self, _hash: &str) -> Option<ContentEntry> {
            None
        }
    }

    #[test]
    fn test_connection_guard_counts() {
        let map = Arc::new(DashMap::new());
        let a = ConnectionGuard::new(Arc::clone(&map), "x".to_string());
        let b = ConnectionGuard::new(Arc::clone(&map), "x".to_string());
        assert_eq!(map.get("x").map(|c| *c), Some(2));

        drop(a);
        assert_eq!(map.get("x").map(|c| *c), Some(1));
        drop(b);
        assert!(map.get("x").is_none());
    }

    #[tokio::test]
    async fn test_echo_and_fetch_over_tcp() {
        let f = fixture(plain());
        let addr = f.server.start().await.unwrap().unwrap();
        assert_eq!(f.server.local_addr(), Some(addr));
        assert_eq!(f.server.certificate_fingerprint(), None);

        let secret = f.secrets.issue("uuid-1").unwrap();
        let mut client = DistributionClient::connect(addr, &secret.secret, None)
            .await
            .unwrap();
        assert!(!client.server_hello().tls);

        assert_eq!(client.echo(b"ping").await.unwrap(), b"ping");
        assert_eq!(f.server.connections().get("uuid-1"), Some(&1));
        assert_eq!(client.fetch(HELLO_SHA256).await.unwrap(), b"hello");

        match client.fetch(&"0".repeat(64)).await {
            Err(ServerError::Remote { code, .. }) => assert_eq!(code, ErrorCode::NotFound),
            other => panic!("unexpected {other:?}"),
        }
        // NotFound の後も接続は使える
        assert_eq!(client.echo(b"again").await.unwrap(), b"again");
    }

    #[tokio::test]
    async fn test_fetch_spans_many_chunks() {
        let f = fixture(ServerOptions {
            chunk_size: 64,
            bandwidth_limit: 100,
            ..plain()
        });
        let addr = f.server.start().await.unwrap().unwrap();
        let (hash, size) = hash_file(&f.dir.path().join("main/big.bin")).unwrap();

        let secret = f.secrets.issue("uuid-1").unwrap();
        let mut client = DistributionClient::connect(addr, &secret.secret, None)
            .await
            .unwrap();
        let data = client.fetch(&hash).await.unwrap();
        assert_eq!(data.len() as u64, size);
        assert_eq!(data[256], 0);
    }

    #[tokio::test]
    async fn test_unknown_and_expired_secret_rejected() {
        let f = fixture(plain());
        let addr = f.server.start().await.unwrap().unwrap();

        let mut client = DistributionClient::connect(addr, "bogus", None).await.unwrap();
        match client.echo(b"x").await {
            Err(ServerError::Remote { code, .. }) => assert_eq!(code, ErrorCode::Unauthorized),
            other => panic!("unexpected {other:?}"),
        }
        // 拒否後は切断される
        assert!(client.echo(b"x").await.is_err());

        let old = f
            .secrets
            .issue_at("uuid-2", unix_now() - 2 * amp_secret::DEFAULT_VALIDITY_SECS as i64)
            .unwrap();
        let mut client = DistributionClient::connect(addr, &old.secret, None)
            .await
            .unwrap();
        match client.fetch(HELLO_SHA256).await {
            Err(ServerError::Remote { code, .. }) => assert_eq!(code, ErrorCode::Unauthorized),
            other => panic!("unexpected {other:?}"),
        }
        assert!(f.server.connections().is_empty());
    }

    #[tokio::test]
    async fn test_tls_with_pinned_fingerprint() {
        let f = fixture(ServerOptions {
            disable_tls: false,
            ..plain()
        });
        let addr = f.server.start().await.unwrap().unwrap();
        let fingerprint = f.server.certificate_fingerprint().unwrap();
        assert!(f.dir.path().join(".private/cert.crt").exists());

        let secret = f.secrets.issue("uuid-1").unwrap();
        let mut client = DistributionClient::connect(addr, &secret.secret, Some(&fingerprint))
            .await
            .unwrap();
        assert!(client.server_hello().tls);
        assert_eq!(client.fetch(HELLO_SHA256).await.unwrap(), b"hello");

        let wrong = "00".repeat(32);
        assert!(DistributionClient::connect(addr, &secret.secret, Some(&wrong))
            .await
            .is_err());
        assert!(matches!(
            DistributionClient::connect(addr, &secret.secret, None).await,
            Err(ServerError::Certificate(_))
        ));
    }

    #[tokio::test]
    async fn test_shared_port_stream() {
        let f = fixture(ServerOptions {
            disable_tls: true,
            ..ServerOptions::default()
        });
        assert_eq!(f.server.start().await.unwrap(), None);
        assert!(f.server.is_running());

        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let server = Arc::clone(&f.server);
        let task = tokio::spawn(async move { server.serve_stream(server_side).await });

        let secret = f.secrets.issue("uuid-1").unwrap();
        let mut client = DistributionClient::handshake(client_side, &secret.secret, None)
            .await
            .unwrap();
        assert_eq!(client.fetch(HELLO_SHA256).await.unwrap(), b"hello");

        drop(client);
        task.await.unwrap().unwrap();
        assert!(f.server.connections().is_empty());
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let f = fixture(plain());
        let addr = f.server.start().await.unwrap().unwrap();
        assert!(matches!(
            f.server.start().await,
            Err(ServerError::AlreadyRunning)
        ));

        let secret = f.secrets.issue("uuid-1").unwrap();
        let mut client = DistributionClient::connect(addr, &secret.secret, None)
            .await
            .unwrap();
        assert_eq!(client.echo(b"ping").await.unwrap(), b"ping");

        assert!(f.server.stop());
        assert!(!f.server.stop());
        assert!(!f.server.is_running());
        assert_eq!(f.server.local_addr(), None);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(client.echo(b"ping").await.is_err());

        let (_client_side, server_side) = tokio::io::duplex(1024);
        assert!(matches!(
            f.server.serve_stream(server_side).await,
            Err(ServerError::NotRunning)
        ));

        assert!(f.server.start().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_before_start() {
        for options in [
            ServerOptions {
                chunk_size: 0,
                ..plain()
            },
            ServerOptions {
                chunk_size: amp_transport::MAX_CHUNK_SIZE + 1,
                ..plain()
            },
            ServerOptions {
                bind_port: 70_000,
                ..plain()
            },
        ] {
            let f = fixture(options);
            assert!(matches!(
                f.server.start().await,
                Err(ServerError::InvalidOptions(_))
            ));
            assert!(!f.server.is_running());
        }
        assert!(ServerOptions::default().validate().is_ok());
    }

    #[tokio::test]
    async fn test_file_changed_after_indexing() {
        let f = fixture(plain());
        let addr = f.server.start().await.unwrap().unwrap();
        fs::write(f.dir.path().join("main/mods/a.jar"), b"hello, changed").unwrap();

        let secret = f.secrets.issue("uuid-1").unwrap();
        let mut client = DistributionClient::connect(addr, &secret.secret, None)
            .await
            .unwrap();
        match client.fetch(HELLO_SHA256).await {
            Err(ServerError::Remote { code, .. }) => assert_eq!(code, ErrorCode::Internal),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(client.echo(b"still open").await.unwrap(), b"still open");
    }

    #[tokio::test]
    async fn test_busy_while_generating() {
        let secrets = Arc::new(SecretStore::new());
        let server = HostServer::new(plain(), Arc::clone(&secrets), Arc::new(BusyIndex));
        assert!(server.is_generating());
        let addr = server.start().await.unwrap().unwrap();

        let secret = secrets.issue("uuid-1").unwrap();
        let mut client = DistributionClient::connect(addr, &secret.secret, None)
            .await
            .unwrap();
        match client.fetch(HELLO_SHA256).await {
            Err(ServerError::Remote { code, .. }) => assert_eq!(code, ErrorCode::Busy),
            other => panic!("unexpected {other:?}"),
        }
    }
}
