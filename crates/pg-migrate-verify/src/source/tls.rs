//! Transport security for the two PostgreSQL pools.
//!
//! Each side picks its own `ssl_mode`; [`build_pool`] turns that into a
//! deadpool pool over either a plain or a rustls transport.

use std::str::FromStr;
use std::sync::Arc;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_postgres::{Config as PgConfig, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, warn};

use crate::core::Side;
use crate::error::{Result, VerifyError};

/// `ssl_mode` values accepted in the config, named as libpq names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    #[default]
    Disable,
    /// Encrypt, but accept any server certificate.
    Require,
    /// rustls always checks the hostname, so this behaves like `VerifyFull`.
    VerifyCa,
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self> {
        let mode = match s.to_ascii_lowercase().as_str() {
            "" | "disable" => SslMode::Disable,
            "require" => SslMode::Require,
            "verify-ca" => SslMode::VerifyCa,
            "verify-full" => SslMode::VerifyFull,
            other => {
                return Err(VerifyError::Config(format!(
                    "ssl_mode '{}' is not one of disable, require, verify-ca, verify-full",
                    other
                )))
            }
        };
        Ok(mode)
    }
}

/// Transport chosen for one side.
enum Transport {
    Plain,
    Rustls(MakeRustlsConnect),
}

impl Transport {
    fn for_side(side: Side, mode: SslMode) -> Self {
        let config = match mode {
            SslMode::Disable => {
                warn!(
                    "Side {}: TLS disabled, credentials are sent in plaintext",
                    side
                );
                return Transport::Plain;
            }
            SslMode::Require => {
                warn!(
                    "Side {}: ssl_mode=require does not verify the server certificate; \
                     use verify-full outside trusted networks",
                    side
                );
                ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
                    .with_no_client_auth()
            }
            SslMode::VerifyCa | SslMode::VerifyFull => {
                let roots = RootCertStore {
                    roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
                };
                ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth()
            }
        };
        Transport::Rustls(MakeRustlsConnect::new(config))
    }

    fn is_tls(&self) -> bool {
        matches!(self, Transport::Rustls(_))
    }
}

/// Build the connection pool for one side. No connection is opened here.
pub(crate) fn build_pool(
    side: Side,
    pg_config: PgConfig,
    mode: SslMode,
    max_size: usize,
) -> Result<Pool> {
    let manager_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let transport = Transport::for_side(side, mode);
    debug!("Side {}: ssl_mode={:?}, tls={}", side, mode, transport.is_tls());
    let manager = match transport {
        Transport::Plain => Manager::from_config(pg_config, NoTls, manager_config),
        Transport::Rustls(tls) => Manager::from_config(pg_config, tls, manager_config),
    };
    Pool::builder(manager)
        .max_size(max_size)
        .build()
        .map_err(|e| VerifyError::pool(e, format!("creating pool for side {}", side)))
}

const SCHEMES: [SignatureScheme; 10] = [
    SignatureScheme::ED25519,
    SignatureScheme::ECDSA_NISTP256_SHA256,
    SignatureScheme::ECDSA_NISTP384_SHA384,
    SignatureScheme::ECDSA_NISTP521_SHA512,
    SignatureScheme::RSA_PSS_SHA256,
    SignatureScheme::RSA_PSS_SHA384,
    SignatureScheme::RSA_PSS_SHA512,
    SignatureScheme::RSA_PKCS1_SHA256,
    SignatureScheme::RSA_PKCS1_SHA384,
    SignatureScheme::RSA_PKCS1_SHA512,
];

/// Verifier behind `ssl_mode=require`.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _: &CertificateDer<'_>,
        _: &[CertificateDer<'_>],
        _: &ServerName<'_>,
        _: &[u8],
        _: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        SCHEMES.to_vec()
    }
}
