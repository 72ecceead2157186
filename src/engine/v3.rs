//! USM-based response engine (SNMPv3).
//!
//! Accepts SNMPv2-Trap and InformRequest only. Authentication and privacy
//! are delegated to the USM layer (`crate::v3`) with the credentials this
//! engine was configured with; the engine itself never hashes or ciphers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;

use super::identity::generate_engine_id;
use super::{DecodedPacket, V3SecurityInfo};
use crate::config::V3EngineConfig;
use crate::error::{Error, Result};
use crate::message::{MsgFlags, MsgGlobalData, ScopedPdu, SecurityLevel, V3Message, V3MessageData};
use crate::packet::RawPacket;
use crate::pdu::PduType;
use crate::v3::auth::{authenticate_message, verify_message};
use crate::v3::{AuthProtocol, LocalizedKey, PrivKey, PrivProtocol, SaltCounter, UsmSecurityParams};
use crate::version::Version;

/// Keys localized for one authoritative engine id.
struct DerivedKeys {
    auth_key: Option<LocalizedKey>,
    priv_key: Option<PrivKey>,
}

/// SNMPv3 response engine.
pub struct V3Engine {
    enabled: bool,
    engine_id: String,
    user_name: Bytes,
    security_level: SecurityLevel,
    auth: Option<(AuthProtocol, Vec<u8>)>,
    privacy: Option<(AuthProtocol, PrivProtocol, Vec<u8>)>,
    /// Localized keys per authoritative engine id. Key derivation walks a
    /// 1MB password expansion, so it is done once per remote engine.
    key_cache: RwLock<HashMap<Bytes, Arc<DerivedKeys>>>,
    salt_counter: SaltCounter,
}

impl std::fmt::Debug for V3Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V3Engine")
            .field("enabled", &self.enabled)
            .field("engine_id", &self.engine_id)
            .field("user_name", &self.user_name)
            .field("security_level", &self.security_level)
            .field("auth", &self.auth.as_ref().map(|(proto, _)| proto))
            .field("privacy", &self.privacy.as_ref().map(|(auth_proto, priv_proto, _)| (auth_proto, priv_proto)))
            .finish_non_exhaustive()
    }
}

impl V3Engine {
    /// Build the engine from configuration.
    ///
    /// All three protocol strings are validated up front; an invalid value
    /// is a construction-time fatal error even when the security level
    /// would never exercise it.
    pub fn new(config: &V3EngineConfig) -> Result<Self> {
        let security_level: SecurityLevel = config.msg_flags.parse()?;
        let auth_protocol: AuthProtocol = config.auth_protocol.parse()?;
        let priv_protocol: PrivProtocol = config.priv_protocol.parse()?;

        let auth = security_level
            .requires_auth()
            .then(|| (auth_protocol, config.auth_passphrase.clone().into_bytes()));
        let privacy = security_level
            .requires_priv()
            .then(|| (auth_protocol, priv_protocol, config.priv_passphrase.clone().into_bytes()));

        Ok(Self {
            enabled: config.enabled,
            engine_id: generate_engine_id(Version::V3),
            user_name: Bytes::from(config.user_name.clone().into_bytes()),
            security_level,
            auth,
            privacy,
            key_cache: RwLock::new(HashMap::new()),
            salt_counter: SaltCounter::new(),
        })
    }

    /// Whether this engine accepts traffic.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Engine identity string (RFC 3411 range, hex-encoded).
    pub fn engine_id(&self) -> &str {
        &self.engine_id
    }

    /// Configured security level.
    pub fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    /// Localize the configured credentials for a remote engine id.
    fn derived_keys(&self, engine_id: &Bytes) -> Arc<DerivedKeys> {
        if let Some(keys) = self.key_cache.read().unwrap().get(engine_id) {
            return Arc::clone(keys);
        }

        let auth_key = self
            .auth
            .as_ref()
            .map(|(protocol, passphrase)| LocalizedKey::from_password(*protocol, passphrase, engine_id));
        let priv_key = self.privacy.as_ref().map(|(auth_protocol, priv_protocol, passphrase)| {
            PrivKey::from_password(*auth_protocol, *priv_protocol, passphrase, engine_id)
        });

        let keys = Arc::new(DerivedKeys { auth_key, priv_key });
        self.key_cache
            .write()
            .unwrap()
            .insert(engine_id.clone(), Arc::clone(&keys));
        keys
    }

    /// Process one datagram: decode the v3 envelope, verify USM security,
    /// acknowledge Informs, and return the decoded packet.
    pub async fn process(&self, raw: &RawPacket) -> Result<DecodedPacket> {
        let message = V3Message::decode(raw.data.clone()).map_err(|e| {
            tracing::debug!(target: "trapsink::engine", source = %raw.source, error = %e, "v3 message decode failed");
            Error::DecodeRequest
        })?;

        let usm = UsmSecurityParams::decode(message.security_params.clone()).map_err(|e| {
            tracing::debug!(target: "trapsink::engine", source = %raw.source, error = %e, "USM parameter decode failed");
            Error::DecodeRequest
        })?;

        if usm.username != self.user_name {
            tracing::warn!(
                target: "trapsink::engine",
                source = %raw.source,
                user = %String::from_utf8_lossy(&usm.username),
                "v3 message for unknown user"
            );
            return Err(Error::DecodeRequest);
        }

        let level = message.security_level();
        let keys = self.derived_keys(&usm.engine_id);

        if level.requires_auth() {
            let Some(auth_key) = keys.auth_key.as_ref() else {
                tracing::warn!(target: "trapsink::engine", source = %raw.source, "authenticated v3 message but no auth credentials configured");
                return Err(Error::DecodeRequest);
            };

            let (auth_offset, auth_len) = UsmSecurityParams::find_auth_params_offset(&raw.data)
                .ok_or_else(|| {
                    tracing::debug!(target: "trapsink::engine", source = %raw.source, "auth params not found in v3 message");
                    Error::DecodeRequest
                })?;

            if !verify_message(auth_key, &raw.data, auth_offset, auth_len) {
                tracing::warn!(
                    target: "trapsink::engine",
                    source = %raw.source,
                    user = %String::from_utf8_lossy(&usm.username),
                    "v3 authentication failed"
                );
                return Err(Error::DecodeRequest);
            }
        }

        let scoped_pdu = match &message.data {
            V3MessageData::Plaintext(scoped) => scoped.clone(),
            V3MessageData::Encrypted(ciphertext) => {
                let Some(priv_key) = keys.priv_key.as_ref() else {
                    tracing::warn!(target: "trapsink::engine", source = %raw.source, "encrypted v3 message but no privacy credentials configured");
                    return Err(Error::DecodeRequest);
                };

                let plaintext = priv_key
                    .decrypt(ciphertext, usm.engine_boots, usm.engine_time, &usm.priv_params)
                    .map_err(|e| {
                        tracing::debug!(target: "trapsink::engine", source = %raw.source, error = %e, "v3 decryption failed");
                        Error::DecodeRequest
                    })?;

                let mut decoder = crate::ber::Decoder::new(plaintext);
                ScopedPdu::decode(&mut decoder).map_err(|e| {
                    tracing::debug!(target: "trapsink::engine", source = %raw.source, error = %e, "decrypted scoped PDU decode failed");
                    Error::DecodeRequest
                })?
            }
        };

        let pdu = scoped_pdu.pdu;
        if pdu.pdu_type != PduType::TrapV2 && pdu.pdu_type != PduType::InformRequest {
            return Err(Error::UnsupportedPduType);
        }

        if pdu.pdu_type == PduType::InformRequest {
            let response = self.build_inform_response(
                &message,
                &usm,
                &keys,
                ScopedPdu::new(
                    scoped_pdu.context_engine_id.clone(),
                    scoped_pdu.context_name.clone(),
                    pdu.inform_response(),
                ),
            )?;
            raw.reply(&response).await?;
            tracing::debug!(
                target: "trapsink::engine",
                source = %raw.source,
                request_id = pdu.request_id,
                security_level = %level,
                "sent v3 Inform response"
            );
        }

        Ok(DecodedPacket {
            version: Version::V3,
            pdu_type: pdu.pdu_type,
            request_id: pdu.request_id,
            community: Bytes::new(),
            security: Some(V3SecurityInfo {
                msg_flags: message.global_data.msg_flags_byte,
                user_name: usm.username,
                engine_id: usm.engine_id,
            }),
            bindings: pdu.varbinds,
        })
    }

    /// Build the response message mirroring the request's security level,
    /// with reportable cleared.
    fn build_inform_response(
        &self,
        request: &V3Message,
        request_usm: &UsmSecurityParams,
        keys: &DerivedKeys,
        response_scoped: ScopedPdu,
    ) -> Result<Vec<u8>> {
        let level = request.security_level();
        let global = MsgGlobalData::new(
            request.global_data.msg_id,
            request.global_data.msg_max_size,
            MsgFlags::new(level, false),
        );

        let base_usm = UsmSecurityParams::new(
            request_usm.engine_id.clone(),
            request_usm.engine_boots,
            request_usm.engine_time,
            request_usm.username.clone(),
        );

        match level {
            SecurityLevel::NoAuthNoPriv => {
                let message = V3Message::new(global, base_usm.encode(), response_scoped);
                Ok(message.encode().to_vec())
            }
            SecurityLevel::AuthNoPriv => {
                let auth_key = keys.auth_key.as_ref().ok_or(Error::DecodeRequest)?;
                let usm = base_usm.with_auth_placeholder(auth_key.mac_len());
                let message = V3Message::new(global, usm.encode(), response_scoped);

                let mut bytes = message.encode().to_vec();
                let (offset, len) = UsmSecurityParams::find_auth_params_offset(&bytes)
                    .ok_or(Error::DecodeRequest)?;
                authenticate_message(auth_key, &mut bytes, offset, len);
                Ok(bytes)
            }
            SecurityLevel::AuthPriv => {
                let auth_key = keys.auth_key.as_ref().ok_or(Error::DecodeRequest)?;
                let priv_key = keys.priv_key.as_ref().ok_or(Error::DecodeRequest)?;

                let (ciphertext, priv_params) = priv_key.encrypt(
                    &response_scoped.encode_to_bytes(),
                    request_usm.engine_boots,
                    request_usm.engine_time,
                    &self.salt_counter,
                )?;

                let usm = base_usm
                    .with_auth_placeholder(auth_key.mac_len())
                    .with_priv_params(priv_params);
                let message = V3Message::new_encrypted(global, usm.encode(), ciphertext);

                let mut bytes = message.encode().to_vec();
                let (offset, len) = UsmSecurityParams::find_auth_params_offset(&bytes)
                    .ok_or(Error::DecodeRequest)?;
                authenticate_message(auth_key, &mut bytes, offset, len);
                Ok(bytes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(msg_flags: &str) -> V3EngineConfig {
        V3EngineConfig {
            enabled: true,
            user_name: "monitor".into(),
            msg_flags: msg_flags.into(),
            auth_protocol: "SHA".into(),
            priv_protocol: "AES".into(),
            auth_passphrase: "authpass123".into(),
            priv_passphrase: "privpass123".into(),
        }
    }

    #[test]
    fn test_construction_levels() {
        let engine = V3Engine::new(&config("NoAuthNoPriv")).unwrap();
        assert!(engine.auth.is_none());
        assert!(engine.privacy.is_none());

        let engine = V3Engine::new(&config("AuthNoPriv")).unwrap();
        assert!(engine.auth.is_some());
        assert!(engine.privacy.is_none());

        let engine = V3Engine::new(&config("AuthPriv")).unwrap();
        assert!(engine.auth.is_some());
        assert!(engine.privacy.is_some());
        assert_eq!(engine.security_level(), SecurityLevel::AuthPriv);
    }

    #[test]
    fn test_construction_rejects_invalid_enums() {
        let mut bad = config("AuthPriv");
        bad.msg_flags = "Sometimes".into();
        assert!(matches!(V3Engine::new(&bad).unwrap_err(), Error::Config(_)));

        let mut bad = config("AuthPriv");
        bad.auth_protocol = "SHA3".into();
        assert!(matches!(V3Engine::new(&bad).unwrap_err(), Error::Config(_)));

        let mut bad = config("AuthPriv");
        bad.priv_protocol = "RC4".into();
        assert!(matches!(V3Engine::new(&bad).unwrap_err(), Error::Config(_)));
    }

    #[test]
    fn test_invalid_enum_fatal_even_when_unused() {
        // NoAuthNoPriv never touches the privacy protocol, but the config
        // surface still refuses an unknown value.
        let mut bad = config("NoAuthNoPriv");
        bad.priv_protocol = "ROT13".into();
        assert!(V3Engine::new(&bad).is_err());
    }

    #[test]
    fn test_key_cache_reuses_derivation() {
        let engine = V3Engine::new(&config("AuthNoPriv")).unwrap();
        let engine_id = Bytes::from_static(b"remote-engine-1");

        let first = engine.derived_keys(&engine_id);
        let second = engine.derived_keys(&engine_id);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.key_cache.read().unwrap().len(), 1);
    }
}
