pub mod cache;
pub mod coff;
pub mod config;
pub mod driver;
pub mod filters;
pub mod log;
pub mod names;
pub mod plugin;
pub mod processor;
pub mod writer;

use crate::config::{Config, RuleSet};
use crate::log::Logger;
use crate::plugin::PluginFilter;

/// Everything shared by the workers for one run, constructed once by the
/// driver and passed around by read-only reference. The configuration,
/// the compiled rules, and the resolved plugin entry point are all
/// immutable after construction, so no locking is needed.
pub struct Context {
    pub config: Config,
    pub rules: RuleSet,
    pub plugin: Option<PluginFilter>,
    pub log: Logger,
}

impl Context {
    /// Compile the rules and load the plugin (when configured) for
    /// `config`. Plugin load failure is fatal, not a degraded run.
    pub fn new(config: Config, log: Logger) -> anyhow::Result<Self> {
        config::validate(&config)?;
        let rules = RuleSet::compile(&config)?;
        let plugin = match &config.plugin_path {
            Some(path) => {
                let plugin = PluginFilter::load(path)?;
                log.verbose(format!(
                    "Loaded {} as additional filter function.",
                    path.display()
                ));
                Some(plugin)
            }
            None => None,
        };
        Ok(Self {
            config,
            rules,
            plugin,
            log,
        })
    }
}
