//! 配布クライアント
//!
//! ログインで受け取ったクレデンシャルとフィンガープリントを使って
//! 配布サーバーからファイルを取得する。ツールとテスト用の最小実装。

use std::sync::Arc;

use amp_transport::{
    read_frame, write_frame, ClientHello, CodecRegistry, CompressionCodec, FileAssembly,
    ProtocolMessage, ServerHello, ServerMessage, TransportError, COMPRESSION_NONE,
    PROTOCOL_VERSION,
};
use rustls::pki_types::ServerName;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::{ServerError, ServerResult};
use crate::tls::{self, CERTIFICATE_NAME};

/// 平文と TLS のどちらのストリームも受ける
pub trait DistributionStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> DistributionStream for T {}

pub struct DistributionClient {
    stream: Box<dyn DistributionStream>,
    codec: Arc<dyn CompressionCodec>,
    credential: Vec<u8>,
    hello: ServerHello,
}

impl DistributionClient {
    /// TCP で接続してプリアンブルを交換する
    ///
    /// # 引数
    /// - `secret`: ログイン時に受け取ったトークン
    /// - `fingerprint`: サーバー証明書のフィンガープリント（TLS のとき必須）
    pub async fn connect(
        addr: impl ToSocketAddrs,
        secret: &str,
        fingerprint: Option<&str>,
    ) -> ServerResult<Self> {
        let tcp = TcpStream::connect(addr).await?;
        Self::handshake(tcp, secret, fingerprint).await
    }

    /// 接続済みのストリームでプリアンブルを交換する
    pub async fn handshake<S>(
        mut stream: S,
        secret: &str,
        fingerprint: Option<&str>,
    ) -> ServerResult<Self>
    where
        S: DistributionStream + 'static,
    {
        ClientHello {
            version: PROTOCOL_VERSION,
            compression: COMPRESSION_NONE,
        }
        .write_to(&mut stream)
        .await?;
        let hello = ServerHello::read_from(&mut stream).await?;
        if hello.version != PROTOCOL_VERSION {
            return Err(TransportError::UnsupportedVersion(hello.version).into());
        }
        let codec = CodecRegistry::default().get(hello.compression)?;

        let stream: Box<dyn DistributionStream> = if hello.tls {
            let fingerprint = fingerprint.ok_or_else(|| {
                ServerError::Certificate(
                    "server requires TLS but no certificate fingerprint is known".to_string(),
                )
            })?;
            let connector = tls::pinned_connector(fingerprint)?;
            let name = ServerName::try_from(CERTIFICATE_NAME)
                .map_err(|e| ServerError::Certificate(e.to_string()))?;
            Box::new(connector.connect(name, stream).await?)
        } else {
            Box::new(stream)
        };
        debug!(
            tls = hello.tls,
            compression = hello.compression,
            "connected to distribution server"
        );

        Ok(DistributionClient {
            stream,
            codec,
            credential: secret.as_bytes().to_vec(),
            hello,
        })
    }

    /// サーバーの挨拶
    pub fn server_hello(&self) -> ServerHello {
        self.hello
    }

    pub async fn echo(&mut self, data: &[u8]) -> ServerResult<Vec<u8>> {
        let request = ProtocolMessage::echo(PROTOCOL_VERSION, &self.credential, data.to_vec());
        self.send(&request).await?;
        match self.recv().await? {
            ServerMessage::Echo(data) => Ok(data),
            other => Err(unexpected(other)),
        }
    }

    /// hex SHA-256 でファイルを取得し、内容のハッシュを確かめる
    pub async fn fetch(&mut self, hash: &str) -> ServerResult<Vec<u8>> {
        let request = ProtocolMessage::file_request(PROTOCOL_VERSION, &self.credential, hash);
        self.send(&request).await?;

        let size = match self.recv().await? {
            ServerMessage::FileResponse { size } => size,
            other => return Err(unexpected(other)),
        };
        let mut assembly = FileAssembly::new(size);
        loop {
            match self.recv().await? {
                ServerMessage::Chunk(chunk) => assembly.add_chunk(&chunk)?,
                ServerMessage::EndOfTransmission => break,
                other => return Err(unexpected(other)),
            }
        }
        let data = assembly.finish()?;

        if !hex::encode(Sha256::digest(&data)).eq_ignore_ascii_case(hash) {
            return Err(ServerError::Protocol(format!(
                "received file does not match hash {hash}"
            )));
        }
        Ok(data)
    }

    async fn send(&mut self, message: &ProtocolMessage) -> ServerResult<()> {
        let bytes = message.encode()?;
        write_frame(&mut self.stream, self.codec.as_ref(), &bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> ServerResult<ServerMessage> {
        let bytes = read_frame(&mut self.stream, self.codec.as_ref())
            .await?
            .ok_or_else(|| {
                ServerError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "distribution server closed the connection",
                ))
            })?;
        let (_, message) = ServerMessage::decode(&bytes)?;
        Ok(message)
    }
}

/// エラー応答は `Remote` に、それ以外は順序違反にする
fn unexpected(message: ServerMessage) -> ServerError {
    match message {
        ServerMessage::Error { code, message } => ServerError::Remote { code, message },
        other => ServerError::Protocol(format!(
            "unexpected message type {}",
            other.message_type()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handshake_rejects_other_protocol_version() {
        let (client_side, mut server_side) = tokio::io::duplex(64);
        let server = tokio::spawn(async move {
            let hello = ClientHello::read_from(&mut server_side).await.unwrap();
            assert_eq!(hello.version, PROTOCOL_VERSION);
            ServerHello {
                version: PROTOCOL_VERSION + 1,
                compression: COMPRESSION_NONE,
                tls: false,
            }
            .write_to(&mut server_side)
            .await
            .unwrap();
        });

        let result = DistributionClient::handshake(client_side, "token", None).await;
        assert!(matches!(
            result,
            Err(ServerError::Transport(TransportError::UnsupportedVersion(v))) if v == PROTOCOL_VERSION + 1
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_requires_fingerprint_for_tls() {
        let (client_side, mut server_side) = tokio::io::duplex(64);
        let server = tokio::spawn(async move {
            ClientHello::read_from(&mut server_side).await.unwrap();
            ServerHello {
                version: PROTOCOL_VERSION,
                compression: COMPRESSION_NONE,
                tls: true,
            }
            .write_to(&mut server_side)
            .await
            .unwrap();
        });

        assert!(matches!(
            DistributionClient::handshake(client_side, "token", None).await,
            Err(ServerError::Certificate(_))
        ));
        server.await.unwrap();
    }
}
