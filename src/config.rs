//! Server configuration surface.
//!
//! Loading these from a file is the embedding process's concern; the core
//! only defines the shapes and their defaults.

use serde::Deserialize;

/// How much larger the egress queue is than the ingress queue.
pub const PIPELINE_BUFFER_SCALE: usize = 2;

/// Top-level configuration for the trap server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// UDP receiver settings.
    pub receiver: ReceiverConfig,
    /// Trap handler settings.
    pub handler: HandlerConfig,
    /// Ingress queue capacity; egress is `PIPELINE_BUFFER_SCALE` times this.
    pub ingress_size: usize,
}

impl ServerConfig {
    /// Egress queue capacity derived from the ingress size.
    pub fn egress_size(&self) -> usize {
        self.ingress_size * PIPELINE_BUFFER_SCALE
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            receiver: ReceiverConfig::default(),
            handler: HandlerConfig::default(),
            ingress_size: 1024,
        }
    }
}

/// UDP receiver configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// UDP port to listen on.
    pub port: u16,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self { port: 162 }
    }
}

/// Trap handler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Number of worker tasks consuming the ingress queue.
    pub worker_count: usize,
    /// Dedup lock TTL in seconds.
    ///
    /// Must exceed the end-to-end processing time of one trap so a replay
    /// during processing is suppressed; should stay short enough that a
    /// genuine retransmission after transient failure is processed.
    pub lock_timeout_seconds: u64,
    /// Reserved for a future per-packet processing deadline.
    pub processing_timeout_seconds: u64,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            lock_timeout_seconds: 30,
            processing_timeout_seconds: 0,
        }
    }
}

/// v1/v2c engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommunityEngineConfig {
    /// Whether this engine accepts traffic.
    pub enabled: bool,
    /// Read community string.
    pub read_community: String,
    /// Read/write community string.
    pub read_write_community: String,
}

/// v3 engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct V3EngineConfig {
    /// Whether this engine accepts traffic.
    pub enabled: bool,
    /// USM user name.
    pub user_name: String,
    /// Security level: NoAuthNoPriv, AuthNoPriv or AuthPriv.
    pub msg_flags: String,
    /// Authentication protocol: MD5 or SHA.
    pub auth_protocol: String,
    /// Privacy protocol: DES, AES, AES192 or AES256.
    pub priv_protocol: String,
    /// Authentication passphrase.
    pub auth_passphrase: String,
    /// Privacy passphrase.
    pub priv_passphrase: String,
}

/// Per-version engine configuration for the response manager.
///
/// At most one engine per version; `None` means the version is not served
/// at all (distinct from present-but-disabled).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineSetConfig {
    /// SNMPv1 engine.
    pub v1: Option<CommunityEngineConfig>,
    /// SNMPv2c engine.
    pub v2c: Option<CommunityEngineConfig>,
    /// SNMPv3 engine.
    pub v3: Option<V3EngineConfig>,
}

/// Lock backend address.
///
/// The backend client itself lives outside the core; these are the values
/// the core accepts and forwards to whichever client the host wires in.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockBackendConfig {
    /// Backend host.
    pub host: String,
    /// Backend port.
    pub port: u16,
    /// Backend password.
    pub password: String,
    /// Database index (or equivalent namespace selector).
    pub db: i64,
}

impl Default for LockBackendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 6379,
            password: String::new(),
            db: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.receiver.port, 162);
        assert_eq!(config.handler.worker_count, 4);
        assert_eq!(config.egress_size(), config.ingress_size * 2);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ServerConfig = serde_json::from_str(
            r#"{
                "receiver": { "port": 1162 },
                "handler": { "worker_count": 2, "lock_timeout_seconds": 10 },
                "ingress_size": 8
            }"#,
        )
        .unwrap();

        assert_eq!(config.receiver.port, 1162);
        assert_eq!(config.handler.worker_count, 2);
        assert_eq!(config.handler.lock_timeout_seconds, 10);
        assert_eq!(config.egress_size(), 16);
    }

    #[test]
    fn test_engine_set_versions_optional() {
        let config: EngineSetConfig = serde_json::from_str(
            r#"{
                "v2c": { "enabled": true, "read_community": "public", "read_write_community": "private" }
            }"#,
        )
        .unwrap();

        assert!(config.v1.is_none());
        assert!(config.v3.is_none());
        assert!(config.v2c.as_ref().unwrap().enabled);
    }
}
