use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use colwire_error::ColwireResult;
use colwire_io::CompressionMethod;

use crate::revision::CLIENT_REVISION;
use crate::Settings;

/// Mints the password sent for access-key credentials.
///
/// Token formats are deployment specific, so the signer is supplied by the caller.
pub trait TokenSigner: Send + Sync {
    /// Sign a token for `access_key`, scoped to `region` and `service`.
    fn sign(
        &self,
        access_key: &str,
        secret_key: &str,
        region: &str,
        service: &str,
    ) -> ColwireResult<String>;
}

/// How the client authenticates in the handshake.
#[derive(Clone)]
pub enum Credentials {
    Password {
        user: String,
        password: String,
    },
    /// The access key is sent as the user and a signed token as the password.
    AccessKey {
        access_key: String,
        secret_key: String,
        region: String,
        service: String,
        signer: Arc<dyn TokenSigner>,
    },
}

impl Credentials {
    pub fn password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            user: user.into(),
            password: password.into(),
        }
    }

    /// The user and password sent in the handshake.
    pub fn resolve(&self) -> ColwireResult<(String, String)> {
        match self {
            Self::Password { user, password } => Ok((user.clone(), password.clone())),
            Self::AccessKey {
                access_key,
                secret_key,
                region,
                service,
                signer,
            } => {
                let token = signer.sign(access_key, secret_key, region, service)?;
                Ok((access_key.clone(), token))
            }
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::password("default", "")
    }
}

/// Secrets are left out.
impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { user, .. } => f
                .debug_struct("Password")
                .field("user", user)
                .finish_non_exhaustive(),
            Self::AccessKey {
                access_key,
                region,
                service,
                ..
            } => f
                .debug_struct("AccessKey")
                .field("access_key", access_key)
                .field("region", region)
                .field("service", service)
                .finish_non_exhaustive(),
        }
    }
}

/// Client identity, credentials and per-query settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_name: String,
    pub version_major: u64,
    pub version_minor: u64,
    pub version_patch: u64,
    pub revision: u64,
    pub database: String,
    pub credentials: Credentials,
    pub compression: Option<CompressionMethod>,
    pub settings: Settings,
    pub client_hostname: String,
    pub os_user: String,
    pub quota_key: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: "colwire".to_string(),
            version_major: 1,
            version_minor: 0,
            version_patch: 0,
            revision: CLIENT_REVISION,
            database: "default".to_string(),
            credentials: Credentials::default(),
            compression: None,
            settings: Settings::default(),
            client_hostname: "localhost".to_string(),
            os_user: String::new(),
            quota_key: String::new(),
        }
    }
}

impl ClientConfig {
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_version(mut self, major: u64, minor: u64, patch: u64) -> Self {
        self.version_major = major;
        self.version_minor = minor;
        self.version_patch = patch;
        self
    }

    /// Advertise a different protocol revision, e.g. to talk to a server as an older client.
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_compression(mut self, compression: Option<CompressionMethod>) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_client_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.client_hostname = hostname.into();
        self
    }

    pub fn with_os_user(mut self, user: impl Into<String>) -> Self {
        self.os_user = user.into();
        self
    }

    pub fn with_quota_key(mut self, quota_key: impl Into<String>) -> Self {
        self.quota_key = quota_key.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Reversed;

    impl TokenSigner for Reversed {
        fn sign(
            &self,
            access_key: &str,
            secret_key: &str,
            region: &str,
            service: &str,
        ) -> ColwireResult<String> {
            let reversed: String = secret_key.chars().rev().collect();
            Ok(format!("{service}/{region}/{reversed}/{access_key}"))
        }
    }

    #[test]
    fn access_keys_are_signed() {
        let credentials = Credentials::AccessKey {
            access_key: "AK".into(),
            secret_key: "abc".into(),
            region: "cn-north-1".into(),
            service: "olap".into(),
            signer: Arc::new(Reversed),
        };
        assert_eq!(
            credentials.resolve().unwrap(),
            ("AK".to_string(), "olap/cn-north-1/cba/AK".to_string())
        );
        assert!(!format!("{credentials:?}").contains("abc"));
    }

    #[test]
    fn builder() {
        let config = ClientConfig::default()
            .with_database("analytics")
            .with_compression(Some(CompressionMethod::Lz4))
            .with_credentials(Credentials::password("u", "p"));
        assert_eq!(config.database, "analytics");
        assert_eq!(config.credentials.resolve().unwrap(), ("u".to_string(), "p".to_string()));
        assert_eq!(config.revision, CLIENT_REVISION);
    }
}
