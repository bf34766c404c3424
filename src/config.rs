use std::path::Path;

/// Bumped whenever a config field is renamed or its meaning changes.
/// A file whose `version` disagrees with this still loads -- we warn
/// and trust serde's defaults to fill in whatever moved -- since a
/// resolver that refuses to start over a stale config file is worse
/// than one that starts with slightly wrong defaults.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, serde::Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_version")]
    pub version: u32,
    #[serde(default)]
    pub database: crate::service::database::Config,
    #[serde(default)]
    pub dns: crate::dns::config::ServerConfig,
    #[serde(default)]
    pub resolver: crate::dns::config::ResolverConfig,
    #[serde(default)]
    pub accesslist: crate::dns::config::AccessListConfig,
    #[serde(default)]
    pub hosts: crate::dns::config::HostsConfig,
    #[serde(default)]
    pub blocklist: crate::dns::blocklist_service::Config,
    #[serde(default)]
    pub cache: crate::dns::cache::Config,
    #[serde(default)]
    pub ratelimit: crate::dns::config::RatelimitConfig,
    #[serde(default)]
    pub chaos: crate::dns::config::ChaosConfig,
    #[serde(default)]
    pub logging: crate::dns::config::LoggingConfig,
    #[serde(default)]
    pub reflex: crate::dns::config::ReflexConfig,
}

impl Config {
    fn default_version() -> u32 {
        SCHEMA_VERSION
    }

    /// Loads the configuration at `path`, writing out a fresh default
    /// file first if nothing exists there yet. Environment variables
    /// (`SECTION_FIELD`, e.g. `DNS_BIND`) override whatever the file
    /// says, same layering as the teacher's own config builder.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("no configuration file at {path:?}, writing defaults");
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(error) = std::fs::write(path, Config::default_toml()) {
                tracing::warn!("unable to write default configuration to {path:?}: {error}");
            }
        }

        let conf = ::config::Config::builder()
            .add_source(::config::File::from(path).required(true))
            .add_source(::config::Environment::default().separator("_"))
            .build()
            .expect("unable to locate configuration file");
        let config: Self = conf
            .try_deserialize()
            .expect("configuration format invalid");

        if config.version != SCHEMA_VERSION {
            tracing::warn!(
                "configuration at {path:?} declares version {} but this build expects {}, loading anyway",
                config.version,
                SCHEMA_VERSION,
            );
        }

        config
    }

    /// A minimal TOML document bootstrapped onto disk for a fresh
    /// install. Only `version` is written explicitly; every other field
    /// is left to its serde default once the file is re-read.
    fn default_toml() -> String {
        format!("version = {SCHEMA_VERSION}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstraps_a_default_file_when_missing() {
        let dir = std::env::temp_dir().join(format!("redoubt-config-test-{:?}", std::thread::current().id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("redoubt.toml");

        let config = Config::load(&path);
        assert!(path.exists());
        assert_eq!(config.version, SCHEMA_VERSION);
        assert_eq!(config.dns.bind, "0.0.0.0:53");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
