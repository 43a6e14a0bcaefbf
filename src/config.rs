//! Run configuration: the immutable settings record and the compiled
//! filter rule set.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context as _, Result, ensure};
use regex::Regex;

/// Setting keys recognized in cache files, in serialization order.
pub const SETTING_KEYS: [&str; 5] = ["y", "n", "yo", "no", "fn"];

/// Everything a run needs to know, built once from the command line.
///
/// The four rule strings are kept verbatim (not just in compiled form)
/// because they double as the cache compatibility keys: a cache file is
/// only reused when its recorded settings match these values.
#[derive(Debug, Clone)]
pub struct Config {
    /// Emitted verbatim after `LIBRARY`.
    pub library_name: String,
    /// Scanned recursively for `.obj` files.
    pub input_dir: PathBuf,
    /// Destination `.def` path.
    pub output_path: PathBuf,
    /// Space-separated namespace include patterns (`y`).
    pub include: Option<String>,
    /// Space-separated namespace exclude patterns (`n`).
    pub exclude: Option<String>,
    /// Space-separated force-include patterns matched against the full
    /// demangled name (`yo`).
    pub force_include: Option<String>,
    /// Space-separated force-exclude patterns matched against the full
    /// demangled name (`no`).
    pub force_exclude: Option<String>,
    /// Optional filter plugin library (`fn`).
    pub plugin_path: Option<PathBuf>,
    /// Worker width for the translation-unit pool.
    pub concurrency: usize,
    /// Load and update sibling `.objcache` files.
    pub use_cache: bool,
    /// Emit dense `@N NONAME` ordinals.
    pub emit_ordinals: bool,
}

impl Config {
    /// The settings that participate in cache compatibility, keyed the way
    /// they are written to the `#SETTINGS` section. A key is present only
    /// when the corresponding flag was given.
    pub fn settings(&self) -> HashMap<&'static str, String> {
        let mut map = HashMap::new();
        let fields = [
            ("y", self.include.clone()),
            ("n", self.exclude.clone()),
            ("yo", self.force_include.clone()),
            ("no", self.force_exclude.clone()),
            (
                "fn",
                self.plugin_path
                    .as_ref()
                    .map(|p| p.display().to_string()),
            ),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                map.insert(key, value);
            }
        }
        map
    }

    /// One-line description of the active rule settings, for the startup log.
    pub fn describe_rules(&self) -> String {
        let mut out = String::new();
        let fields = [
            ("y", &self.include),
            ("n", &self.exclude),
            ("yo", &self.force_include),
            ("no", &self.force_exclude),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                out.push_str(key);
                out.push_str(" = ");
                out.push_str(value);
                out.push(' ');
            }
        }
        out
    }
}

/// The four compiled rule vectors.
///
/// Patterns are compiled with whole-string anchoring, so a rule matches a
/// candidate only when it covers it entirely (`ns` does not match `nsx`).
#[derive(Debug, Default)]
pub struct RuleSet {
    pub include: Vec<Regex>,
    pub exclude: Vec<Regex>,
    pub force_include: Vec<Regex>,
    pub force_exclude: Vec<Regex>,
}

impl RuleSet {
    /// Compile the rule strings of `config`. An unparseable pattern is a
    /// fatal configuration error naming the offending pattern.
    pub fn compile(config: &Config) -> Result<Self> {
        Ok(Self {
            include: compile_patterns(config.include.as_deref())?,
            exclude: compile_patterns(config.exclude.as_deref())?,
            force_include: compile_patterns(config.force_include.as_deref())?,
            force_exclude: compile_patterns(config.force_exclude.as_deref())?,
        })
    }
}

/// Split a space-delimited pattern list and compile each entry anchored.
fn compile_patterns(raw: Option<&str>) -> Result<Vec<Regex>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(' ')
        .filter(|pattern| !pattern.is_empty())
        .map(|pattern| {
            Regex::new(&format!("^(?:{pattern})$"))
                .with_context(|| format!("invalid filter pattern: {pattern}"))
        })
        .collect()
}

/// Validate the parts of the configuration that clap cannot express.
pub fn validate(config: &Config) -> Result<()> {
    ensure!(!config.library_name.is_empty(), "library name is empty");
    ensure!(config.concurrency > 0, "worker count must be positive");
    Ok(())
}
