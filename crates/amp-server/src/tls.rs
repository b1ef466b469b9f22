//! TLS 設定
//!
//! サーバーは `.private/` の自己署名証明書を使う（無ければ rcgen で作る）。
//! クライアントは CA を使わず、ログイン時に受け取ったフィンガープリントで
//! 証明書を固定する。
//!
//! フィンガープリント = DER 証明書の SHA-256 を大文字 hex にしたもの

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme};
use sha2::{Digest, Sha256};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::info;

use crate::error::{ServerError, ServerResult};

/// 証明書に入れる名前。クライアントもこの名前で接続する
pub const CERTIFICATE_NAME: &str = "localhost";

/// 読み込んだ証明書とアクセプタ
#[derive(Clone)]
pub struct TlsMaterial {
    pub acceptor: TlsAcceptor,
    pub fingerprint: String,
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// DER 証明書のフィンガープリント
pub fn fingerprint(der: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(der))
}

/// 証明書と鍵を読み込む。どちらかが無ければ作り直す
pub fn load_or_create(cert_path: &Path, key_path: &Path) -> ServerResult<TlsMaterial> {
    if !cert_path.exists() || !key_path.exists() {
        generate_certificate(cert_path, key_path)?;
    }

    let cert_pem = fs::read(cert_path)?;
    let key_pem = fs::read(key_path)?;
    let certs = CertificateDer::pem_slice_iter(&cert_pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Certificate(format!("{}: {e}", cert_path.display())))?;
    let key = PrivateKeyDer::from_pem_slice(&key_pem)
        .map_err(|e| ServerError::Certificate(format!("{}: {e}", key_path.display())))?;
    let leaf = certs.first().ok_or_else(|| {
        ServerError::Certificate(format!("{}: no certificate found", cert_path.display()))
    })?;
    let fingerprint = fingerprint(leaf.as_ref());

    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsMaterial {
        acceptor: TlsAcceptor::from(Arc::new(config)),
        fingerprint,
    })
}

fn generate_certificate(cert_path: &Path, key_path: &Path) -> ServerResult<()> {
    let certified = rcgen::generate_simple_self_signed(vec![CERTIFICATE_NAME.to_string()])?;
    for path in [cert_path, key_path] {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(cert_path, certified.cert.pem())?;
    fs::write(key_path, certified.key_pair.serialize_pem())?;
    info!(cert = %cert_path.display(), "generated self-signed distribution certificate");
    Ok(())
}

/// フィンガープリントで証明書を固定するコネクタ
pub fn pinned_connector(expected_fingerprint: &str) -> ServerResult<TlsConnector> {
    let provider = provider();
    let verifier = PinnedVerifier {
        fingerprint: normalize(expected_fingerprint),
        provider: Arc::clone(&provider),
    };
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// `AB:CD` 形式や小文字も受け付ける
fn normalize(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[derive(Debug)]
struct PinnedVerifier {
    fingerprint: String,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PinnedVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if fingerprint(end_entity.as_ref()) == self.fingerprint {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::InvalidCertificate(
                rustls::CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_format() {
        let fp = fingerprint(b"abc");
        assert_eq!(
            fp,
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
        );
    }

    #[test]
    fn test_normalize_accepts_separators() {
        assert_eq!(normalize("ab:cd:EF"), "ABCDEF");
    }

    #[test]
    fn test_certificate_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join(".private/cert.crt");
        let key = dir.path().join(".private/key.pem");

        let first = load_or_create(&cert, &key).unwrap();
        assert!(cert.exists() && key.exists());
        assert_eq!(first.fingerprint.len(), 64);

        let second = load_or_create(&cert, &key).unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
    }

    #[test]
    fn test_corrupt_certificate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.crt");
        let key = dir.path().join("key.pem");
        fs::write(&cert, "not a certificate").unwrap();
        fs::write(&key, "not a key").unwrap();

        assert!(matches!(
            load_or_create(&cert, &key),
            Err(ServerError::Certificate(_))
        ));
    }
}
