//! Wiring from [`HarmonyConfig`] to the runtime pieces.
//!
//! ```rust
//! use harmony::config::HarmonyConfig;
//! use harmony::core::Harmony;
//!
//! let config = HarmonyConfig::default();
//! let mut app = Harmony::new();
//! harmony::settings::install(&mut app, &config).unwrap();
//!
//! let server = harmony::settings::server(&config, app).unwrap();
//! assert_eq!(server.config().http_addr(), "0.0.0.0:8080");
//! ```

use std::time::Duration;

use harmony_config::{GzipConfigSection, HarmonyConfig, LoggerConfigSection};
use harmony_core::{Harmony, Middleware, Result};
use harmony_middleware::{gzip::compression_level, Gzip, Logger};
use harmony_server::{Server, ServerConfig};

/// Converts the `[server]` section into transport settings.
pub fn server_config(section: &harmony_config::ServerConfig) -> ServerConfig {
    ServerConfig::builder()
        .http_addr(section.http_addr.clone())
        .read_timeout(Duration::from_secs(section.read_timeout_secs))
        .write_timeout(Duration::from_secs(section.write_timeout_secs))
        .idle_timeout(Duration::from_secs(section.idle_timeout_secs))
        .shutdown_timeout(Duration::from_secs(section.shutdown_timeout_secs))
        .max_body_bytes(section.max_body_bytes)
        .build()
}

/// The access-log middleware for `[logger]`, if enabled.
pub fn logger(section: &LoggerConfigSection) -> Option<Middleware> {
    section
        .enabled
        .then(|| Logger::builder().format(section.format.clone()).build())
}

/// The gzip middleware for `[gzip]`, if enabled.
///
/// Fails if the level is outside `-1..=9`.
pub fn gzip(section: &GzipConfigSection) -> Result<Option<Middleware>> {
    if !section.enabled {
        return Ok(None);
    }
    compression_level(section.level)?;
    Ok(Some(
        Gzip::builder()
            .level(section.level)
            .min_length(section.min_length)
            .build(),
    ))
}

/// Registers the configured middleware as global middleware, logger
/// outside gzip, after any global middleware already registered.
pub fn install(app: &mut Harmony, config: &HarmonyConfig) -> Result<()> {
    let gzip = gzip(&config.gzip)?;
    if let Some(logger) = logger(&config.logger) {
        app.use_middleware(logger);
    }
    if let Some(gzip) = gzip {
        app.use_middleware(gzip);
    }
    Ok(())
}

/// Installs the configured middleware and builds a stopped server.
pub fn server(config: &HarmonyConfig, mut app: Harmony) -> Result<Server> {
    install(&mut app, config)?;
    let dispatcher = app.build()?;
    Ok(Server::new(server_config(&config.server), dispatcher))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_mapping() {
        let section = harmony_config::ServerConfig {
            http_addr: "127.0.0.1:9000".to_string(),
            write_timeout_secs: 5,
            max_body_bytes: 64,
            ..Default::default()
        };
        let config = server_config(&section);
        assert_eq!(config.http_addr(), "127.0.0.1:9000");
        assert_eq!(config.write_timeout(), Duration::from_secs(5));
        assert_eq!(config.read_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_body_bytes(), 64);
    }

    #[test]
    fn test_disabled_sections_install_nothing() {
        let section = LoggerConfigSection {
            enabled: false,
            ..Default::default()
        };
        assert!(logger(&section).is_none());
        assert!(logger(&LoggerConfigSection::default()).is_some());

        let gzip_section = GzipConfigSection {
            enabled: false,
            level: 42,
            ..Default::default()
        };
        assert!(gzip(&gzip_section).unwrap().is_none());
    }

    #[test]
    fn test_invalid_gzip_level() {
        let section = GzipConfigSection {
            level: 10,
            ..Default::default()
        };
        assert!(matches!(
            gzip(&section),
            Err(harmony_core::Error::Internal { .. })
        ));
    }
}
