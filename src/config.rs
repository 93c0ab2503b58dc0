use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub gateway: GatewayConfig,
    pub cron: CronConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

/// Payment gateway (billing-key API) credentials and redirect targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub secret_key: String,
    /// Public key embedded in the front-end payment widget payload.
    pub client_key: String,
    pub base_url: String,
    pub success_redirect_url: String,
    pub fail_redirect_url: String,
}

/// Shared secret for the externally triggered batch endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    pub secret: String,
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => {
                // Config file present: parse it, then let env vars override below.
                toml::from_str(&config_str)
                    .map_err(|e| format!("Failed to parse config file: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // No config file: build entirely from env vars and defaults.
                fn get_env(name: &str) -> Option<String> {
                    env::var(name).ok()
                }
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                let database_url = get_env("DATABASE_URL")
                    .ok_or("DATABASE_URL not set and no config.toml found")?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    jwt: JwtConfig {
                        secret: get_env("JWT_SECRET")
                            .unwrap_or_else(|| "change-me-in-production".to_string()),
                    },
                    gateway: GatewayConfig {
                        secret_key: get_env("GATEWAY_SECRET_KEY").unwrap_or_default(),
                        client_key: get_env("GATEWAY_CLIENT_KEY").unwrap_or_default(),
                        base_url: get_env("GATEWAY_BASE_URL")
                            .unwrap_or_else(|| "https://api.tosspayments.com".to_string()),
                        success_redirect_url: get_env("GATEWAY_SUCCESS_REDIRECT_URL")
                            .unwrap_or_else(|| "/subscription?billing=success".to_string()),
                        fail_redirect_url: get_env("GATEWAY_FAIL_REDIRECT_URL")
                            .unwrap_or_else(|| "/subscription?billing=failed".to_string()),
                    },
                    cron: CronConfig {
                        secret: get_env("CRON_SECRET").unwrap_or_default(),
                    },
                }
            }
            Err(e) => return Err(Box::new(e)),
        };

        // Env vars always win over file values so deployments can override
        // a baked-in config.toml.
        if let Ok(url) = env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(secret) = env::var("JWT_SECRET") {
            config.jwt.secret = secret;
        }
        if let Ok(key) = env::var("GATEWAY_SECRET_KEY") {
            config.gateway.secret_key = key;
        }
        if let Ok(key) = env::var("GATEWAY_CLIENT_KEY") {
            config.gateway.client_key = key;
        }
        if let Ok(secret) = env::var("CRON_SECRET") {
            config.cron.secret = secret;
        }

        Ok(config)
    }
}
