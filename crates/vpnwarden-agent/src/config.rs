use std::path::Path;

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, info, warn};
use vpnwarden_types::{
    AuthenticationMethod, DEFAULT_CLIENT_NAME, ParamError, PresharedKey, TunnelType,
    VpnProfileConfig, profile_name, split_tunnel_from_flag,
};

/// Raw invocation parameters, before validation. Every field is optional so
/// that a config file, the environment and flags can each supply a part.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileParams {
    pub server_address: Option<String>,
    pub tunnel_type: Option<String>,
    pub all_user_connection: Option<bool>,
    pub preshared_key: Option<PresharedKey>,
    pub authentication_method: Option<String>,
    #[serde(default, deserialize_with = "flag_literal")]
    pub split_tunnel: Option<String>,
    pub client_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid argument: missing required parameter {0}")]
    Missing(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ParamError),
}

/// Accept the split tunnel flag as either a TOML integer or a string.
fn flag_literal<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Int(i64),
        Str(String),
    }

    Ok(Option::<Flag>::deserialize(deserializer)?.map(|flag| match flag {
        Flag::Int(n) => n.to_string(),
        Flag::Str(s) => s,
    }))
}

impl ProfileParams {
    /// Layer `overrides` on top of `self`; any value set in `overrides` wins.
    pub fn overlay(self, overrides: ProfileParams) -> ProfileParams {
        ProfileParams {
            server_address: overrides.server_address.or(self.server_address),
            tunnel_type: overrides.tunnel_type.or(self.tunnel_type),
            all_user_connection: overrides.all_user_connection.or(self.all_user_connection),
            preshared_key: overrides.preshared_key.or(self.preshared_key),
            authentication_method: overrides
                .authentication_method
                .or(self.authentication_method),
            split_tunnel: overrides.split_tunnel.or(self.split_tunnel),
            client_name: overrides.client_name.or(self.client_name),
        }
    }
}

pub async fn load(path: &Path) -> Result<ProfileParams, ConfigError> {
    debug!(path = %path.display(), "loading config");

    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let params: ProfileParams = toml::from_str(&contents)?;
            info!(path = %path.display(), "loaded config");
            Ok(params)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "config file not found, using flags and environment only");
            Ok(ProfileParams::default())
        }
        Err(e) => Err(ConfigError::Read(e)),
    }
}

/// Validate raw parameters and derive the desired profile. Makes no OS calls.
pub fn normalize(params: ProfileParams) -> Result<VpnProfileConfig, ConfigError> {
    let server_address = params
        .server_address
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::Missing("ServerAddress"))?;

    let tunnel_type: TunnelType = params
        .tunnel_type
        .ok_or(ConfigError::Missing("TunnelType"))?
        .parse()?;

    let authentication_method: AuthenticationMethod = params
        .authentication_method
        .ok_or(ConfigError::Missing("AuthenticationMethod"))?
        .parse()?;

    let preshared_key = params
        .preshared_key
        .filter(|k| !k.is_empty())
        .ok_or(ConfigError::Missing("PresharedKey"))?;

    let split_tunnel = params
        .split_tunnel
        .as_deref()
        .map(split_tunnel_from_flag)
        .transpose()?
        .unwrap_or(false);

    let client_name = params
        .client_name
        .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string());
    let name = profile_name(&client_name);
    if name.trim() == "VPN" {
        warn!(client_name = %client_name, "client name is empty after sanitizing");
    }

    debug!(
        profile = %name,
        server = %server_address,
        %tunnel_type,
        %authentication_method,
        split_tunnel,
        "normalized parameters"
    );

    Ok(VpnProfileConfig {
        name,
        server_address,
        tunnel_type,
        all_user_connection: params.all_user_connection.unwrap_or(true),
        preshared_key,
        authentication_method,
        split_tunnel,
    })
}

/// Merge the optional config file under the flag/environment values and
/// validate the result.
pub async fn resolve(
    path: Option<&Path>,
    overrides: ProfileParams,
) -> Result<VpnProfileConfig, ConfigError> {
    let base = match path {
        Some(path) => load(path).await?,
        None => ProfileParams::default(),
    };
    normalize(base.overlay(overrides))
}
