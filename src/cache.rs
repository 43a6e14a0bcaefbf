//! Per-translation-unit decision cache.
//!
//! Each `.obj` gets a sibling `.objcache` text file recording the settings
//! that produced it and one include/exclude decision per symbol:
//!
//! ```text
//! #VERSION 0.0.2
//! #SETTINGS
//! y=ns other_ns
//! #SYMBOLS
//! ?foo@ns@@YAHXZ=T
//! ```
//!
//! The file is only trusted when every recorded setting matches the
//! current configuration; setting values are compared as unordered
//! space-separated token lists, so reordering rules does not invalidate
//! a cache.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result, bail};

use crate::config::{Config, SETTING_KEYS};
use crate::log::Logger;

pub const CACHE_FORMAT_VERSION: &str = "0.0.2";

enum Section {
    Preamble,
    Settings,
    Symbols,
}

/// Load the decisions cached at `path`.
///
/// A missing file yields an empty map. A file whose settings do not match
/// the current configuration also yields an empty map, with a warning; the
/// translation unit is then reprocessed from scratch. A file that exists
/// but cannot be read or parsed is a fatal error.
pub fn load(path: &Path, config: &Config, log: &Logger) -> Result<HashMap<String, bool>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            log.verbose("No cache found.");
            return Ok(HashMap::new());
        }
        Err(error) => {
            return Err(anyhow::Error::new(error)
                .context(format!("failed to read cache file {}", path.display())));
        }
    };

    let mut section = Section::Preamble;
    let mut version_seen = false;
    let mut cached_settings: HashMap<String, String> = HashMap::new();
    let mut symbols: HashMap<String, bool> = HashMap::new();

    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('#') {
            if let Some(version) = rest.strip_prefix("VERSION") {
                let version = version.trim();
                if version != CACHE_FORMAT_VERSION {
                    bail!(
                        "cache file {} has unsupported version {version:?}",
                        path.display()
                    );
                }
                version_seen = true;
            } else if rest.starts_with("SETTINGS") {
                section = Section::Settings;
            } else if rest.starts_with("SYMBOLS") {
                section = Section::Symbols;
            } else {
                bail!(
                    "cache file {} contains unknown section marker {line:?}",
                    path.display()
                );
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            bail!("incorrectly formatted cache file {}", path.display());
        };

        match section {
            Section::Preamble => {
                bail!("incorrectly formatted cache file {}", path.display());
            }
            Section::Settings => {
                cached_settings.insert(key.to_string(), value.to_string());
            }
            Section::Symbols => {
                symbols.insert(key.to_string(), value == "T");
            }
        }
    }

    if !version_seen {
        bail!("cache file {} has no version marker", path.display());
    }

    let current: HashMap<String, String> = config
        .settings()
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

    if let Some(mismatch) = incompatibility(&cached_settings, &current) {
        log.warning(format!("Cache is out of date and cannot be used. ({mismatch})"));
        return Ok(HashMap::new());
    }

    log.verbose(format!("Loaded {} symbols from cache.", symbols.len()));
    Ok(symbols)
}

/// Write the decision map for one translation unit.
///
/// The file is written next to its final path and renamed into place, so a
/// concurrent reader never observes a half-written cache.
pub fn store(path: &Path, config: &Config, symbols: &HashMap<String, bool>) -> Result<()> {
    let mut content = String::new();
    content.push_str("#VERSION ");
    content.push_str(CACHE_FORMAT_VERSION);
    content.push_str("\n#SETTINGS\n");

    let settings = config.settings();
    for key in SETTING_KEYS {
        if let Some(value) = settings.get(key) {
            content.push_str(key);
            content.push('=');
            content.push_str(value);
            content.push('\n');
        }
    }

    content.push_str("#SYMBOLS\n");
    for (name, included) in symbols {
        content.push_str(name);
        content.push('=');
        content.push(if *included { 'T' } else { 'F' });
        content.push('\n');
    }

    let temp = path.with_extension("objcache.tmp");
    fs::write(&temp, content)
        .with_context(|| format!("failed to write cache file {}", temp.display()))?;
    fs::rename(&temp, path)
        .with_context(|| format!("failed to move cache file into place at {}", path.display()))
}

/// Compare cached and current settings. Returns a description of the first
/// mismatch, or `None` when the cache may be used.
///
/// Values are unordered space-separated lists: both sides are split,
/// sorted, and compared, so `y=a b` and `y=b a` are compatible.
fn incompatibility(
    cached: &HashMap<String, String>,
    current: &HashMap<String, String>,
) -> Option<String> {
    for key in cached.keys() {
        if !current.contains_key(key) {
            return Some(format!("setting {key} is set in cache but not present currently"));
        }
    }
    for key in current.keys() {
        if !cached.contains_key(key) {
            return Some(format!("setting {key} is set currently but not present in cache"));
        }
    }

    for (key, cached_value) in cached {
        let current_value = current.get(key)?;

        let mut cached_tokens: Vec<&str> = cached_value.split(' ').collect();
        cached_tokens.sort_unstable();
        let mut current_tokens: Vec<&str> = current_value.split(' ').collect();
        current_tokens.sort_unstable();

        if cached_tokens != current_tokens {
            return Some(format!(
                "setting {key} has a different value in cache ({cached_value}) than its current value ({current_value})"
            ));
        }
    }

    None
}
