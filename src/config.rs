//! Registry configuration
//!
//! The declarative part of a registry, the alias list and the eager bean list,
//! arrives as comma-joined text. It can be given in code, in a TOML document,
//! or through environment variables prefixed with `AOP_CTX_`.

use crate::error::BeanError;
use crate::factory::DEFAULT_MAX_FACTORY_NESTING;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// prefix of environment variables overriding registry configuration
pub const CONFIG_ENV_PREFIX: &str = "AOP_CTX_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// comma separated `alias=beanName` pairs
    pub aliases: String,
    /// comma separated names of beans instantiated while the registry is built
    pub eager_beans: String,
    /// bound on nested factory unwrapping per thread
    pub max_factory_nesting: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            aliases: String::new(),
            eager_beans: String::new(),
            max_factory_nesting: DEFAULT_MAX_FACTORY_NESTING,
        }
    }
}

impl RegistryConfig {
    /// Load configuration from defaults, an optional TOML document and the environment
    ///
    /// Later sources override earlier ones.
    pub fn load(toml: Option<&str>) -> Result<Self, BeanError> {
        let mut figment = Figment::new().merge(Serialized::defaults(RegistryConfig::default()));
        if let Some(toml) = toml {
            figment = figment.merge(Toml::string(toml));
        }
        Self::extract(figment)
    }

    /// Load configuration from defaults, a TOML file and the environment
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, BeanError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BeanError::InvalidConfiguration(format!(
                "configuration file {} does not exist",
                path.display()
            )));
        }
        debug!(path = %path.display(), "loading registry configuration");
        let figment = Figment::new()
            .merge(Serialized::defaults(RegistryConfig::default()))
            .merge(Toml::file(path));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, BeanError> {
        let config: RegistryConfig = figment
            .merge(Env::prefixed(CONFIG_ENV_PREFIX))
            .extract()
            .map_err(|e| BeanError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), BeanError> {
        if self.max_factory_nesting == 0 {
            return Err(BeanError::InvalidConfiguration(
                "max_factory_nesting must be at least 1".to_string(),
            ));
        }
        parse_aliases(&self.aliases)?;
        Ok(())
    }

    pub fn alias_pairs(&self) -> Result<Vec<(String, String)>, BeanError> {
        parse_aliases(&self.aliases)
    }

    pub fn eager_bean_names(&self) -> Vec<String> {
        parse_names(&self.eager_beans)
    }
}

/// split a comma separated list, trimming tokens and skipping blank ones
pub fn parse_names(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// parse `alias=beanName` pairs out of a comma separated list
pub fn parse_aliases(text: &str) -> Result<Vec<(String, String)>, BeanError> {
    parse_names(text)
        .into_iter()
        .map(|token| {
            let (alias, bean) = token.split_once('=').ok_or_else(|| {
                BeanError::InvalidConfiguration(format!(
                    "alias \"{token}\" is not of the form alias=beanName"
                ))
            })?;
            let (alias, bean) = (alias.trim(), bean.trim());
            if alias.is_empty() || bean.is_empty() {
                return Err(BeanError::InvalidConfiguration(format!(
                    "alias \"{token}\" has an empty side"
                )));
            }
            Ok((alias.to_string(), bean.to_string()))
        })
        .collect()
}
