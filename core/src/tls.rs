//! TLS credential bundles and the authentication-challenge vocabulary.
//!
//! # Design
//! `SslCredentials` is an immutable bundle of trust anchors and client
//! keystores attached to a request at construction time. The transport does
//! not read it directly: it raises a `Challenge` for each TLS decision and a
//! `ChallengeHandler` answers with a `ChallengeDisposition`. Key material is
//! kept as PEM bytes and never printed by `Debug`.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{keys, Configuration};

/// A PEM-encoded trust anchor (one or more CA certificates).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Certificate {
    pem: Vec<u8>,
}

impl Certificate {
    pub fn from_pem(pem: impl Into<Vec<u8>>) -> Self {
        Self { pem: pem.into() }
    }

    pub fn pem(&self) -> &[u8] {
        &self.pem
    }

    /// Decode every certificate in the bundle. A bundle holding none is an
    /// error.
    pub(crate) fn decode(&self) -> Result<Vec<reqwest::Certificate>, String> {
        match reqwest::Certificate::from_pem_bundle(&self.pem) {
            Ok(certificates) if certificates.is_empty() => Err("no certificate in PEM bundle".to_owned()),
            Ok(certificates) => Ok(certificates),
            Err(e) => Err(e.to_string()),
        }
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate").field("len", &self.pem.len()).finish()
    }
}

/// A client identity: PEM certificate chain followed by its private key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClientKeyStore {
    pem: Vec<u8>,
}

impl ClientKeyStore {
    pub fn from_pem(pem: impl Into<Vec<u8>>) -> Self {
        Self { pem: pem.into() }
    }

    pub fn pem(&self) -> &[u8] {
        &self.pem
    }

    pub(crate) fn decode(&self) -> Result<reqwest::Identity, String> {
        reqwest::Identity::from_pem(&self.pem).map_err(|e| e.to_string())
    }
}

impl fmt::Debug for ClientKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientKeyStore(..)")
    }
}

/// The kind of TLS decision a challenge asks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    /// Decide whether to trust the certificate the server presented.
    ServerTrust,
    /// Present a client certificate to the server.
    ClientCertificate,
    Other(String),
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::ServerTrust => f.write_str("server-trust"),
            AuthScheme::ClientCertificate => f.write_str("client-certificate"),
            AuthScheme::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub scheme: AuthScheme,
    pub host: String,
}

impl Challenge {
    pub fn new(scheme: AuthScheme, host: impl Into<String>) -> Self {
        Self {
            scheme,
            host: host.into(),
        }
    }
}

/// Credential material answering a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    TrustAnchors(Vec<Certificate>),
    Identity(ClientKeyStore),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeDisposition {
    UseCredential(Credential),
    /// Abort the exchange.
    CancelChallenge,
    /// Let the transport apply its standard validation.
    PerformDefaultHandling,
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct CredentialBundle {
    anchors: Vec<Certificate>,
    key_stores: Vec<ClientKeyStore>,
}

/// Trust anchors and client keystores used to answer TLS challenges.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SslCredentials {
    bundle: Arc<CredentialBundle>,
}

impl SslCredentials {
    pub fn new(anchors: Vec<Certificate>, key_stores: Vec<ClientKeyStore>) -> Self {
        Self {
            bundle: Arc::new(CredentialBundle { anchors, key_stores }),
        }
    }

    /// Resolve the bundle named by configuration. Returns `None` when
    /// neither trust anchors nor a keystore can be resolved.
    pub fn from_configuration(
        config: &dyn Configuration,
        source: &dyn CredentialSource,
    ) -> Option<Self> {
        let anchors = config
            .get(keys::CA_SERVER)
            .and_then(|bundle| source.trust_anchors(&bundle));
        let key_stores = match (
            config.get(keys::CLIENT_KEY_STORE),
            config.get(keys::CLIENT_KEY_STORE_PASSWORD),
        ) {
            (Some(name), Some(password)) => source.key_stores(&name, &password),
            _ => None,
        };
        if anchors.is_none() && key_stores.is_none() {
            return None;
        }
        Some(Self::new(
            anchors.unwrap_or_default(),
            key_stores.unwrap_or_default(),
        ))
    }

    pub fn anchors(&self) -> &[Certificate] {
        &self.bundle.anchors
    }

    pub fn key_stores(&self) -> &[ClientKeyStore] {
        &self.bundle.key_stores
    }

    pub fn can_authenticate(&self, scheme: &AuthScheme) -> bool {
        match scheme {
            AuthScheme::ServerTrust => !self.bundle.anchors.is_empty(),
            AuthScheme::ClientCertificate => !self.bundle.key_stores.is_empty(),
            AuthScheme::Other(_) => false,
        }
    }

    /// The credential answering `challenge`, or `None` when the bundle has
    /// nothing usable for it. Material that does not decode is unusable.
    pub fn credentials_for(&self, challenge: &Challenge) -> Option<Credential> {
        match challenge.scheme {
            AuthScheme::ServerTrust if !self.bundle.anchors.is_empty() => {
                for anchor in &self.bundle.anchors {
                    if let Err(error) = anchor.decode() {
                        warn!(host = %challenge.host, %error, "trust anchor does not decode");
                        return None;
                    }
                }
                Some(Credential::TrustAnchors(self.bundle.anchors.clone()))
            }
            AuthScheme::ClientCertificate => {
                let key_store = self.bundle.key_stores.first()?;
                match key_store.decode() {
                    Ok(_) => Some(Credential::Identity(key_store.clone())),
                    Err(error) => {
                        warn!(host = %challenge.host, %error, "client keystore does not decode");
                        None
                    }
                }
            }
            _ => None,
        }
    }
}

/// Resolves TLS material referenced by name in the configuration.
pub trait CredentialSource: Send + Sync {
    fn trust_anchors(&self, bundle: &str) -> Option<Vec<Certificate>>;

    fn key_stores(&self, name: &str, password: &str) -> Option<Vec<ClientKeyStore>>;
}

/// Reads PEM files from a resource directory.
///
/// PEM identities are unencrypted, so the keystore password is only checked
/// for presence; sources backed by encrypted keystores use it to unlock them.
#[derive(Debug, Clone)]
pub struct FileCredentialSource {
    root: PathBuf,
}

impl FileCredentialSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_pem(&self, name: &str) -> Option<Vec<u8>> {
        let path = self.root.join(name);
        match fs::read(&path) {
            Ok(bytes) if looks_like_pem(&bytes) => Some(bytes),
            Ok(_) => {
                warn!(path = %path.display(), "TLS resource is not PEM encoded");
                None
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "TLS resource not readable");
                None
            }
        }
    }
}

impl CredentialSource for FileCredentialSource {
    fn trust_anchors(&self, bundle: &str) -> Option<Vec<Certificate>> {
        self.read_pem(bundle).map(|pem| vec![Certificate::from_pem(pem)])
    }

    fn key_stores(&self, name: &str, _password: &str) -> Option<Vec<ClientKeyStore>> {
        self.read_pem(name).map(|pem| vec![ClientKeyStore::from_pem(pem)])
    }
}

fn looks_like_pem(bytes: &[u8]) -> bool {
    bytes.windows(11).any(|window| window == b"-----BEGIN ")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::StaticConfiguration;

    const ANCHOR: &str = include_str!("../tests/fixtures/cert.pem");
    const IDENTITY: &str = include_str!("../tests/fixtures/identity.pem");
    const CORRUPT: &str = "-----BEGIN CERTIFICATE-----\n!!not base64!!\n-----END CERTIFICATE-----\n";

    struct MemorySource(HashMap<&'static str, &'static str>);

    impl CredentialSource for MemorySource {
        fn trust_anchors(&self, bundle: &str) -> Option<Vec<Certificate>> {
            self.0.get(bundle).map(|pem| vec![Certificate::from_pem(*pem)])
        }

        fn key_stores(&self, name: &str, _password: &str) -> Option<Vec<ClientKeyStore>> {
            self.0.get(name).map(|pem| vec![ClientKeyStore::from_pem(*pem)])
        }
    }

    fn source() -> MemorySource {
        MemorySource(HashMap::from([("ca.pem", ANCHOR), ("client.pem", IDENTITY)]))
    }

    #[test]
    fn capability_follows_bundle_contents() {
        let anchors_only = SslCredentials::new(vec![Certificate::from_pem(ANCHOR)], Vec::new());
        assert!(anchors_only.can_authenticate(&AuthScheme::ServerTrust));
        assert!(!anchors_only.can_authenticate(&AuthScheme::ClientCertificate));
        assert!(!anchors_only.can_authenticate(&AuthScheme::Other("ntlm".into())));

        let identity_only = SslCredentials::new(Vec::new(), vec![ClientKeyStore::from_pem(IDENTITY)]);
        assert!(identity_only.can_authenticate(&AuthScheme::ClientCertificate));
        assert!(!identity_only.can_authenticate(&AuthScheme::ServerTrust));
    }

    #[test]
    fn credentials_for_matches_scheme() {
        let credentials = SslCredentials::new(
            vec![Certificate::from_pem(ANCHOR)],
            vec![ClientKeyStore::from_pem(IDENTITY)],
        );
        let trust = credentials.credentials_for(&Challenge::new(AuthScheme::ServerTrust, "e.com"));
        assert!(matches!(trust, Some(Credential::TrustAnchors(ref a)) if a.len() == 1));
        let identity = credentials.credentials_for(&Challenge::new(AuthScheme::ClientCertificate, "e.com"));
        assert!(matches!(identity, Some(Credential::Identity(_))));
        assert!(credentials
            .credentials_for(&Challenge::new(AuthScheme::Other("basic".into()), "e.com"))
            .is_none());
    }

    #[test]
    fn undecodable_material_yields_no_credential() {
        let corrupt_anchor = SslCredentials::new(
            vec![Certificate::from_pem(ANCHOR), Certificate::from_pem(CORRUPT)],
            Vec::new(),
        );
        assert!(corrupt_anchor.can_authenticate(&AuthScheme::ServerTrust));
        assert!(corrupt_anchor
            .credentials_for(&Challenge::new(AuthScheme::ServerTrust, "e.com"))
            .is_none());

        // A certificate without its private key is not an identity.
        let keyless = SslCredentials::new(Vec::new(), vec![ClientKeyStore::from_pem(ANCHOR)]);
        assert!(keyless
            .credentials_for(&Challenge::new(AuthScheme::ClientCertificate, "e.com"))
            .is_none());
    }

    #[test]
    fn configuration_without_tls_keys_resolves_nothing() {
        assert!(SslCredentials::from_configuration(&StaticConfiguration::new(), &source()).is_none());
    }

    #[test]
    fn keystore_requires_name_and_password() {
        let config = StaticConfiguration::new().with(keys::CLIENT_KEY_STORE, "client.pem");
        assert!(SslCredentials::from_configuration(&config, &source()).is_none());

        let config = config.with(keys::CLIENT_KEY_STORE_PASSWORD, "secret");
        let credentials = SslCredentials::from_configuration(&config, &source()).unwrap();
        assert_eq!(credentials.key_stores().len(), 1);
        assert!(credentials.anchors().is_empty());
    }

    #[test]
    fn anchors_resolve_from_ca_server_key() {
        let config = StaticConfiguration::new().with(keys::CA_SERVER, "ca.pem");
        let credentials = SslCredentials::from_configuration(&config, &source()).unwrap();
        assert_eq!(credentials.anchors()[0].pem(), ANCHOR.as_bytes());
    }

    #[test]
    fn file_source_rejects_non_pem_and_missing_files() {
        let dir = std::env::temp_dir().join(format!("courier-tls-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("ca.pem"), ANCHOR).unwrap();
        fs::write(dir.join("garbage.bin"), [0u8, 1, 2]).unwrap();

        let source = FileCredentialSource::new(&dir);
        assert!(source.trust_anchors("ca.pem").is_some());
        assert!(source.trust_anchors("garbage.bin").is_none());
        assert!(source.trust_anchors("absent.pem").is_none());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn debug_output_hides_key_material() {
        let store = ClientKeyStore::from_pem(IDENTITY);
        assert_eq!(format!("{store:?}"), "ClientKeyStore(..)");
    }
}
