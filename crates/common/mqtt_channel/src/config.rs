use crate::Message;
use crate::MqttError;
use crate::TopicFilter;
use rumqttc::tokio_rustls::rustls;
use rumqttc::LastWill;
use rumqttc::TlsConfiguration;
use rumqttc::Transport;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// The URL scheme used to reach the broker, mirroring the prefixes
/// the upstream Zigbee2MQTT `mqtt_server` setting accepts.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Scheme {
    Mqtt,
    Mqtts,
    Ws,
    Wss,
    MqttUnix,
}

impl Scheme {
    pub fn is_tls(self) -> bool {
        matches!(self, Scheme::Mqtts | Scheme::Wss)
    }

    pub fn is_websocket(self) -> bool {
        matches!(self, Scheme::Ws | Scheme::Wss)
    }

    /// Split a `scheme://host[:port]` (or bare `host`) string into its scheme
    /// and remainder. Unknown schemes are logged and treated as plain `mqtt`.
    pub fn parse_host(host: &str) -> (Scheme, &str) {
        if let Some(rest) = host.strip_prefix("mqtts://") {
            (Scheme::Mqtts, rest)
        } else if let Some(rest) = host.strip_prefix("mqtt://") {
            (Scheme::Mqtt, rest)
        } else if let Some(rest) = host.strip_prefix("wss://") {
            (Scheme::Wss, rest)
        } else if let Some(rest) = host.strip_prefix("ws://") {
            (Scheme::Ws, rest)
        } else if let Some(rest) = host.strip_prefix("mqtt+unix://") {
            (Scheme::MqttUnix, rest)
        } else if let Some((prefix, rest)) = host.split_once("://") {
            tracing::warn!("unsupported protocol {prefix:?} in broker host, assuming mqtt://");
            (Scheme::Mqtt, rest)
        } else {
            (Scheme::Mqtt, host)
        }
    }
}

/// TLS material supplied out-of-band (CA file, client cert/key, verification flag).
#[derive(Debug, Clone, Default)]
pub struct TlsMaterial {
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub reject_unauthorized: bool,
}

/// Configuration of an MQTT connection
#[derive(Debug, Clone)]
pub struct Config {
    pub broker: BrokerConfig,

    /// The session name to be used on connect. If none is provided, a
    /// random one is generated and the session is clean on connect.
    pub session_name: Option<String>,

    /// The topics to subscribe to on connect.
    pub subscriptions: TopicFilter,

    /// Clean the MQTT session upon connect if set to `true`.
    pub clean_session: bool,

    /// Capacity of the internal message queues.
    pub queue_capacity: usize,

    /// Maximum size for a message payload.
    pub max_packet_size: usize,

    /// LastWill message for a mqtt client.
    pub last_will_message: Option<Message>,

    /// MQTT protocol version: 3 (3.1), 4 (3.1.1) or 5.
    pub protocol_version: u8,

    /// Keepalive interval, reflected both in the MQTT PINGREQ cadence and
    /// the adapter's own `clients/<clientId>/heartbeat` publish.
    pub keepalive: Duration,

    /// Period between reconnect attempts once the connection drops.
    pub reconnect_period: Duration,

    /// Deadline for the initial connect.
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub scheme: Scheme,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: Option<TlsMaterial>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            broker: BrokerConfig {
                host: String::from("localhost"),
                port: 1883,
                scheme: Scheme::Mqtt,
                username: None,
                password: None,
                tls: None,
            },
            session_name: None,
            subscriptions: TopicFilter::empty(),
            clean_session: true,
            queue_capacity: 1024,
            max_packet_size: 1024 * 1024,
            last_will_message: None,
            protocol_version: 4,
            keepalive: Duration::from_secs(60),
            reconnect_period: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Build a config from a `host` possibly prefixed with a scheme
    /// (`mqtt://`, `mqtts://`, `ws://`, `wss://`, `mqtt+unix://`).
    pub fn with_host(mut self, host: impl AsRef<str>) -> Self {
        let (scheme, rest) = Scheme::parse_host(host.as_ref());
        self.broker.scheme = scheme;
        self.broker.host = rest.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.broker.port = port;
        self
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.broker.username = username;
        self.broker.password = password;
        self
    }

    pub fn with_protocol_version(mut self, version: u8) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_session_name(self, name: impl Into<String>) -> Self {
        Self {
            session_name: Some(name.into()),
            ..self
        }
    }

    pub fn with_subscriptions(mut self, topics: TopicFilter) -> Self {
        self.subscriptions.add_all(topics);
        self
    }

    pub fn with_clean_session(self, flag: bool) -> Self {
        Self {
            clean_session: flag,
            ..self
        }
    }

    pub fn with_last_will_message(self, lwm: Message) -> Self {
        Self {
            last_will_message: Some(lwm),
            ..self
        }
    }

    pub fn with_keepalive(self, keepalive: Duration) -> Self {
        Self { keepalive, ..self }
    }

    pub fn with_reconnect_period(self, reconnect_period: Duration) -> Self {
        Self {
            reconnect_period,
            ..self
        }
    }

    pub fn with_connect_timeout(self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..self
        }
    }

    /// Attach TLS material. Warns (but does not fail) if supplied together
    /// with a plaintext scheme; defaults `reject_unauthorized` to `true`
    /// when no CA is given, per spec.
    pub fn with_tls_material(mut self, tls: TlsMaterial) -> Self {
        if !self.broker.scheme.is_tls() {
            tracing::warn!(
                "TLS material supplied for a non-TLS broker scheme; it will be ignored"
            );
            return self;
        }
        let mut tls = tls;
        if tls.ca.is_none() {
            tracing::warn!("no CA file supplied for a TLS connection, defaulting to rejectUnauthorized=true using the system trust store");
            tls.reject_unauthorized = true;
        }
        self.broker.tls = Some(tls);
        self
    }

    /// Generate the client id used when none was configured: `<prefix>_<16-hex>`.
    pub fn generate_client_id(prefix: &str) -> String {
        let mut suffix = String::with_capacity(16);
        for _ in 0..16 {
            suffix.push(char::from_digit(fastrand::u32(0..16), 16).unwrap());
        }
        format!("{prefix}_{suffix}")
    }

    /// Wrap this config into an internal set of options for `rumqttc`.
    pub fn rumqttc_options(&self, client_id: &str) -> Result<rumqttc::MqttOptions, MqttError> {
        let broker = &self.broker;

        if matches!(broker.scheme, Scheme::MqttUnix) {
            // rumqttc addresses a unix socket by its filesystem path in place
            // of a host, with no port appended to the connection URL.
            let mut options = rumqttc::MqttOptions::new(client_id, broker.host.clone(), 0);
            options.set_transport(Transport::Unix);
            self.finish_options(options)
        } else {
            let mut options =
                rumqttc::MqttOptions::new(client_id, broker.host.clone(), broker.port);

            if broker.scheme.is_tls() {
                let tls_config = self.tls_configuration()?;
                options.set_transport(if broker.scheme.is_websocket() {
                    Transport::Wss(tls_config)
                } else {
                    Transport::Tls(tls_config)
                });
            } else if broker.scheme.is_websocket() {
                options.set_transport(Transport::Ws);
            }

            self.finish_options(options)
        }
    }

    fn finish_options(&self, mut options: rumqttc::MqttOptions) -> Result<rumqttc::MqttOptions, MqttError> {
        options.set_clean_session(self.clean_session);
        options.set_keep_alive(self.keepalive);
        options.set_max_packet_size(self.max_packet_size, self.max_packet_size);

        if let (Some(username), Some(password)) =
            (self.broker.username.clone(), self.broker.password.clone())
        {
            options.set_credentials(username, password);
        }

        if let Some(lwp) = &self.last_will_message {
            let last_will_message = LastWill {
                topic: lwp.topic.clone().into(),
                message: lwp.payload().clone().into(),
                qos: lwp.qos,
                retain: lwp.retain,
            };
            options.set_last_will(last_will_message);
        }

        Ok(options)
    }

    fn tls_configuration(&self) -> Result<TlsConfiguration, MqttError> {
        let tls = self
            .broker
            .tls
            .clone()
            .unwrap_or_else(|| TlsMaterial {
                reject_unauthorized: true,
                ..Default::default()
            });

        let mut roots = rustls::RootCertStore::empty();
        match &tls.ca {
            Some(ca_path) => add_certs_from_path(&mut roots, ca_path)?,
            None => {
                for cert in rustls_native_certs::load_native_certs().certs {
                    let _ = roots.add(cert);
                }
            }
        }

        if !tls.reject_unauthorized {
            tracing::warn!("rejectUnauthorized=false: TLS server certificate verification is disabled");
            let verifier = Arc::new(NoCertificateVerification::new());
            let mut client_config = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(verifier)
                .with_no_client_auth();
            if let (Some(cert_path), Some(key_path)) = (&tls.cert, &tls.key) {
                let cert_chain = load_cert_chain(cert_path)?;
                let key = load_private_key(key_path)?;
                client_config = rustls::ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoCertificateVerification::new()))
                    .with_client_auth_cert(cert_chain, key)
                    .map_err(|e| MqttError::TlsIdentityError(e.to_string()))?;
            }
            return Ok(TlsConfiguration::Rustls(Arc::new(client_config)));
        }

        let builder = rustls::ClientConfig::builder().with_root_certificates(roots);

        let client_config = match (&tls.cert, &tls.key) {
            (Some(cert_path), Some(key_path)) => {
                let cert_chain = load_cert_chain(cert_path)?;
                let key = load_private_key(key_path)?;
                builder
                    .with_client_auth_cert(cert_chain, key)
                    .map_err(|e| MqttError::TlsIdentityError(e.to_string()))?
            }
            _ => builder.with_no_client_auth(),
        };

        Ok(TlsConfiguration::Rustls(Arc::new(client_config)))
    }
}

fn add_certs_from_path(
    store: &mut rustls::RootCertStore,
    path: &Path,
) -> Result<(), MqttError> {
    let pem = std::fs::read(path)
        .map_err(|e| MqttError::TlsRootsError(format!("{}: {e}", path.display())))?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<_, _>>()
        .map_err(|e| MqttError::TlsRootsError(e.to_string()))?;
    for cert in certs {
        store
            .add(cert)
            .map_err(|e| MqttError::TlsRootsError(e.to_string()))?;
    }
    Ok(())
}

fn load_cert_chain(
    path: &Path,
) -> Result<Vec<rustls_pki_types::CertificateDer<'static>>, MqttError> {
    let pem = std::fs::read(path)
        .map_err(|e| MqttError::TlsIdentityError(format!("{}: {e}", path.display())))?;
    rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<_, _>>()
        .map_err(|e| MqttError::TlsIdentityError(e.to_string()))
}

fn load_private_key(
    path: &Path,
) -> Result<rustls_pki_types::PrivateKeyDer<'static>, MqttError> {
    let pem = std::fs::read(path)
        .map_err(|e| MqttError::TlsIdentityError(format!("{}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|e| MqttError::TlsIdentityError(e.to_string()))?
        .ok_or_else(|| MqttError::TlsIdentityError(format!("no private key found in {}", path.display())))
}

impl Debug for TlsConfiguration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TlsConfiguration(..)")
    }
}

/// Accepts any server certificate. Only reachable via an explicit
/// `rejectUnauthorized=false` configuration entry.
#[derive(Debug)]
struct NoCertificateVerification(rustls::crypto::CryptoProvider);

impl NoCertificateVerification {
    fn new() -> Self {
        Self(rustls::crypto::ring::default_provider())
    }
}

impl rustls::client::danger::ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls_pki_types::CertificateDer<'_>,
        _intermediates: &[rustls_pki_types::CertificateDer<'_>],
        _server_name: &rustls_pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls_pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls_pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_prefixes() {
        assert_eq!(Scheme::parse_host("mqtt://localhost").0, Scheme::Mqtt);
        assert_eq!(Scheme::parse_host("mqtts://localhost").0, Scheme::Mqtts);
        assert_eq!(Scheme::parse_host("ws://localhost").0, Scheme::Ws);
        assert_eq!(Scheme::parse_host("wss://localhost").0, Scheme::Wss);
        assert_eq!(
            Scheme::parse_host("mqtt+unix:///var/run/mosquitto.sock").0,
            Scheme::MqttUnix
        );
        assert_eq!(Scheme::parse_host("localhost").0, Scheme::Mqtt);
    }

    #[test]
    fn strips_scheme_from_host() {
        assert_eq!(Scheme::parse_host("mqtts://broker.example:8883").1, "broker.example:8883");
    }

    #[test]
    fn client_id_has_prefix_and_16_hex_chars() {
        let id = Config::generate_client_id("zigbee2mqtt");
        let (prefix, suffix) = id.split_once('_').unwrap();
        assert_eq!(prefix, "zigbee2mqtt");
        assert_eq!(suffix.len(), 16);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tls_material_ignored_on_plaintext_scheme() {
        let config = Config::default().with_host("mqtt://localhost").with_tls_material(TlsMaterial {
            ca: Some(PathBuf::from("/tmp/ca.pem")),
            ..Default::default()
        });
        assert!(config.broker.tls.is_none());
    }
}
