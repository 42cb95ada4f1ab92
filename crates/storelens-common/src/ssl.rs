//! TLS options carried in a connection's advanced records
//!
//! Content keys are filled by interactive callers; path keys are honoured only
//! for admin-managed profiles.

use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{get_record_value_or_default, Record};

pub const KEY_SSL_MODE: &str = "SSL Mode";
pub const KEY_SSL_CA_CERT_CONTENT: &str = "SSL CA Content";
pub const KEY_SSL_CLIENT_CERT_CONTENT: &str = "SSL Client Cert Content";
pub const KEY_SSL_CLIENT_KEY_CONTENT: &str = "SSL Client Key Content";
pub const KEY_SSL_SERVER_NAME: &str = "SSL Server Name";

pub const KEY_SSL_CA_CERT_PATH: &str = "SSL CA Path";
pub const KEY_SSL_CLIENT_CERT_PATH: &str = "SSL Client Cert Path";
pub const KEY_SSL_CLIENT_KEY_PATH: &str = "SSL Client Key Path";

/// Transport security mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    /// Plain TCP
    Disabled,
    /// TLS, verifying the server against the supplied CA
    Enabled,
    /// TLS without any certificate verification
    Insecure,
}

impl SslMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "" | "disabled" => Ok(SslMode::Disabled),
            "enabled" => Ok(SslMode::Enabled),
            "insecure" => Ok(SslMode::Insecure),
            other => Err(Error::Config(format!("Unsupported SSL mode: {}", other))),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disabled => "disabled",
            SslMode::Enabled => "enabled",
            SslMode::Insecure => "insecure",
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PEM material given inline or as a file path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateInput {
    pub content: String,
    pub path: String,
}

impl CertificateInput {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.path.is_empty()
    }

    /// PEM bytes, preferring inline content over the path
    pub fn load(&self) -> Result<Option<Vec<u8>>> {
        if !self.content.is_empty() {
            return Ok(Some(self.content.as_bytes().to_vec()));
        }
        if !self.path.is_empty() {
            let bytes = std::fs::read(Path::new(&self.path)).map_err(|e| {
                Error::Config(format!("Failed to read certificate {}: {}", self.path, e))
            })?;
            return Ok(Some(bytes));
        }
        Ok(None)
    }
}

/// TLS settings of one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslConfig {
    pub mode: SslMode,
    pub ca_cert: CertificateInput,
    pub client_cert: CertificateInput,
    pub client_key: CertificateInput,
    /// Name checked against the server certificate
    pub server_name: String,
}

impl SslConfig {
    /// Extracts TLS settings from advanced records.
    ///
    /// Returns `None` when TLS is disabled. An unrecognised mode is a
    /// configuration error rather than a silent downgrade to plain TCP.
    pub fn from_advanced(advanced: &[Record], hostname: &str, is_profile: bool) -> Result<Option<Self>> {
        let mode = SslMode::parse(get_record_value_or_default(advanced, KEY_SSL_MODE, "disabled"))?;
        if mode == SslMode::Disabled {
            return Ok(None);
        }

        let input = |content_key: &str, path_key: &str| CertificateInput {
            content: get_record_value_or_default(advanced, content_key, "").to_string(),
            path: if is_profile {
                get_record_value_or_default(advanced, path_key, "").to_string()
            } else {
                String::new()
            },
        };

        Ok(Some(Self {
            mode,
            ca_cert: input(KEY_SSL_CA_CERT_CONTENT, KEY_SSL_CA_CERT_PATH),
            client_cert: input(KEY_SSL_CLIENT_CERT_CONTENT, KEY_SSL_CLIENT_CERT_PATH),
            client_key: input(KEY_SSL_CLIENT_KEY_CONTENT, KEY_SSL_CLIENT_KEY_PATH),
            server_name: get_record_value_or_default(advanced, KEY_SSL_SERVER_NAME, hostname).to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", SslMode::Disabled)]
    #[case("disabled", SslMode::Disabled)]
    #[case("enabled", SslMode::Enabled)]
    #[case("insecure", SslMode::Insecure)]
    fn test_parse_modes(#[case] raw: &str, #[case] expected: SslMode) {
        assert_eq!(SslMode::parse(raw).unwrap(), expected);
    }

    #[test]
    fn test_unknown_mode_is_config_error() {
        let advanced = vec![Record::new(KEY_SSL_MODE, "verify-full")];
        let err = SslConfig::from_advanced(&advanced, "localhost", false).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_disabled_yields_none() {
        assert!(SslConfig::from_advanced(&[], "localhost", false).unwrap().is_none());
    }

    #[test]
    fn test_paths_only_for_profiles() {
        let advanced = vec![
            Record::new(KEY_SSL_MODE, "enabled"),
            Record::new(KEY_SSL_CA_CERT_PATH, "/etc/ssl/ca.pem"),
        ];

        let interactive = SslConfig::from_advanced(&advanced, "cache.local", false).unwrap().unwrap();
        assert!(interactive.ca_cert.is_empty());
        assert_eq!(interactive.server_name, "cache.local");

        let profile = SslConfig::from_advanced(&advanced, "cache.local", true).unwrap().unwrap();
        assert_eq!(profile.ca_cert.path, "/etc/ssl/ca.pem");
    }

    #[test]
    fn test_content_preferred_over_path() {
        let input = CertificateInput {
            content: "-----BEGIN CERTIFICATE-----".into(),
            path: "/nonexistent".into(),
        };
        assert_eq!(input.load().unwrap().unwrap(), b"-----BEGIN CERTIFICATE-----".to_vec());
        assert!(CertificateInput::default().load().unwrap().is_none());
    }
}
