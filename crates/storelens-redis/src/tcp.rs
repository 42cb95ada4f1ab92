//! RESP over TCP, optionally wrapped in TLS
//!
//! TLS client configuration follows the connection's `SSL Mode`:
//! - `enabled`: the server is verified against the supplied CA material
//! - `insecure`: no certificate verification at all
//!
//! A client certificate and key, when both are present, enable mutual TLS.

use async_trait::async_trait;
use bytes::BytesMut;
use std::io::BufReader;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore, ServerName};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, error};

use storelens_common::ssl::{SslConfig, SslMode};
use storelens_common::{Error, Result};

use crate::client::{ConnectTarget, Connector, KvConnection};
use crate::resp::{Cmd, Reply, ReplyDecoder};

const READ_BUFFER_CAPACITY: usize = 16 * 1024;

trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// Dials RESP servers over TCP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_millis(5_000))
    }
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, target: &ConnectTarget) -> Result<TcpConnection> {
        let addr = target.addr();
        let tcp = tokio::time::timeout(self.connect_timeout, TcpStream::connect((target.host.as_str(), target.port)))
            .await
            .map_err(|_| Error::ConnectionFailed(format!("connect to {} timed out after {:?}", addr, self.connect_timeout)))?
            .map_err(|e| Error::ConnectionFailed(format!("connect to {}: {}", addr, e)))?;
        tcp.set_nodelay(true)?;

        let stream: Box<dyn Stream> = match &target.tls {
            None => Box::new(tcp),
            Some(ssl) => {
                let config = client_config(ssl)?;
                let server_name = ServerName::try_from(ssl.server_name.as_str())
                    .map_err(|e| Error::Config(format!("invalid TLS server name '{}': {}", ssl.server_name, e)))?;
                let tls = TlsConnector::from(Arc::new(config))
                    .connect(server_name, tcp)
                    .await
                    .map_err(|e| {
                        error!(addr = %addr, error = %e, "TLS handshake failed");
                        Error::ConnectionFailed(format!("TLS handshake with {}: {}", addr, e))
                    })?;
                Box::new(tls)
            }
        };

        debug!(addr = %addr, tls = target.tls.is_some(), "Connected");
        Ok(TcpConnection {
            stream,
            read_buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            write_buf: BytesMut::new(),
            decoder: ReplyDecoder::new(),
        })
    }
}

/// An open RESP connection
pub struct TcpConnection {
    stream: Box<dyn Stream>,
    read_buf: BytesMut,
    write_buf: BytesMut,
    decoder: ReplyDecoder,
}

impl TcpConnection {
    async fn send(&mut self, cmds: &[Cmd]) -> Result<()> {
        self.write_buf.clear();
        for cmd in cmds {
            cmd.encode(&mut self.write_buf);
        }
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            if let Some(reply) = self.decoder.decode(&mut self.read_buf)? {
                return Ok(reply);
            }
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionFailed("connection closed by server".to_string()));
            }
        }
    }
}

#[async_trait]
impl KvConnection for TcpConnection {
    async fn query(&mut self, cmd: &Cmd) -> Result<Reply> {
        self.send(std::slice::from_ref(cmd)).await?;
        self.read_reply().await?.into_result()
    }

    async fn pipeline(&mut self, cmds: &[Cmd]) -> Result<Vec<Reply>> {
        self.send(cmds).await?;
        let mut replies = Vec::with_capacity(cmds.len());
        for _ in cmds {
            replies.push(self.read_reply().await?);
        }
        Ok(replies)
    }
}

// ============================================================================
// TLS configuration
// ============================================================================

/// Accepts any server certificate
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// Builds the rustls client configuration for `ssl`
pub fn client_config(ssl: &SslConfig) -> Result<ClientConfig> {
    if ssl.mode == SslMode::Disabled {
        return Err(Error::Config("TLS requested with SSL mode 'disabled'".to_string()));
    }

    let client_auth = match (ssl.client_cert.load()?, ssl.client_key.load()?) {
        (Some(cert), Some(key)) => Some((certificates(&cert)?, private_key(&key)?)),
        (None, None) => None,
        _ => {
            return Err(Error::Config(
                "client certificate and key must be supplied together".to_string(),
            ))
        }
    };

    let builder = ClientConfig::builder().with_safe_defaults();
    let config = if ssl.mode == SslMode::Insecure {
        let builder = builder.with_custom_certificate_verifier(Arc::new(NoVerification));
        match client_auth {
            Some((certs, key)) => builder.with_client_auth_cert(certs, key),
            None => Ok(builder.with_no_client_auth()),
        }
    } else {
        let Some(ca) = ssl.ca_cert.load()? else {
            return Err(Error::Config("SSL mode 'enabled' requires CA certificate material".to_string()));
        };
        let mut roots = RootCertStore::empty();
        for cert in certificates(&ca)? {
            roots
                .add(&cert)
                .map_err(|e| Error::Config(format!("invalid CA certificate: {}", e)))?;
        }
        let builder = builder.with_root_certificates(roots);
        match client_auth {
            Some((certs, key)) => builder.with_client_auth_cert(certs, key),
            None => Ok(builder.with_no_client_auth()),
        }
    };

    config.map_err(|e| Error::Config(format!("invalid client certificate: {}", e)))
}

fn certificates(pem: &[u8]) -> Result<Vec<Certificate>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .map_err(|e| Error::Config(format!("failed to parse certificate PEM: {}", e)))?;
    if certs.is_empty() {
        return Err(Error::Config("no certificate found in PEM input".to_string()));
    }
    Ok(certs.into_iter().map(Certificate).collect())
}

fn private_key(pem: &[u8]) -> Result<PrivateKey> {
    let items = rustls_pemfile::read_all(&mut BufReader::new(pem))
        .map_err(|e| Error::Config(format!("failed to parse key PEM: {}", e)))?;
    items
        .into_iter()
        .find_map(|item| match item {
            rustls_pemfile::Item::PKCS8Key(key)
            | rustls_pemfile::Item::RSAKey(key)
            | rustls_pemfile::Item::ECKey(key) => Some(PrivateKey(key)),
            _ => None,
        })
        .ok_or_else(|| Error::Config("no private key found in PEM input".to_string()))
}
