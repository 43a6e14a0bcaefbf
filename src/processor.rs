//! Per-translation-unit symbol selection.
//!
//! One processor owns everything scoped to a single `.obj`: the forked
//! logger, the decision cache map, and the list of symbols that passed.
//! Nothing here is shared between workers.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result};

use crate::coff::{ObjectFile, SymbolRecord};
use crate::names;
use crate::{Context, cache, filters};

/// Decision state a symbol moves through while the pipeline runs.
///
/// The pre-collapse distinction matters: a namespace exclude may override
/// a namespace include, but not a force include, and the built-in battery
/// and the plugin produce force states that user rules cannot reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolState {
    NotIncluded,
    Included,
    Excluded,
    ForceIncluded,
    ForceExcluded,
}

impl SymbolState {
    fn is_included(self) -> bool {
        matches!(self, Self::Included | Self::ForceIncluded)
    }
}

/// Processes one translation unit; owned by exactly one worker.
pub struct UnitProcessor<'ctx> {
    ctx: &'ctx Context,
    log: crate::log::Logger,
    cached_symbols: HashMap<String, bool>,
    included_symbols: Vec<String>,
    has_uncached_symbols: bool,
}

impl<'ctx> UnitProcessor<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        Self {
            ctx,
            log: ctx.log.clone(),
            cached_symbols: HashMap::new(),
            included_symbols: Vec::new(),
            has_uncached_symbols: false,
        }
    }

    /// Run the unit at `obj_path`: load its cache when enabled, decide
    /// every symbol, and write the cache back if anything new was seen.
    pub fn process(&mut self, obj_path: &Path) -> Result<()> {
        let name = obj_path
            .file_stem()
            .map_or_else(|| obj_path.display().to_string(), |stem| {
                stem.to_string_lossy().into_owned()
            });
        self.log = self.ctx.log.fork(&name);
        self.log.normal(format!("Processing translation unit {name}.obj"));

        let cache_path = obj_path.with_extension("objcache");
        if self.ctx.config.use_cache {
            self.cached_symbols = cache::load(&cache_path, &self.ctx.config, &self.log)?;
        }

        self.parse(obj_path)?;

        if self.ctx.config.use_cache && self.has_uncached_symbols {
            cache::store(&cache_path, &self.ctx.config, &self.cached_symbols)?;
            self.log.verbose(format!(
                "Wrote {} symbols to cache.",
                self.cached_symbols.len()
            ));
        }
        Ok(())
    }

    /// The decorated names that passed, in symbol-table order.
    pub fn into_included_symbols(self) -> Vec<String> {
        self.included_symbols
    }

    fn parse(&mut self, obj_path: &Path) -> Result<()> {
        let data = fs::read(obj_path)
            .with_context(|| format!("failed to read object file {}", obj_path.display()))?;
        let object = ObjectFile::parse(&data)
            .with_context(|| format!("failed to parse object file {}", obj_path.display()))?;
        self.log
            .verbose(format!("{} symbols found.", object.symbol_count()));

        for record in object.symbols() {
            let record = record
                .with_context(|| format!("in object file {}", obj_path.display()))?;

            if let Some(&included) = self.cached_symbols.get(record.name) {
                if included {
                    self.included_symbols.push(record.name.to_string());
                }
                continue;
            }

            let included = self.decide(&record, &object)?;
            if included {
                self.included_symbols.push(record.name.to_string());
            }
            self.cached_symbols.insert(record.name.to_string(), included);
            self.has_uncached_symbols = true;
        }

        self.log.verbose(format!(
            "Keeping {}/{} symbols.",
            self.included_symbols.len(),
            object.symbol_count()
        ));
        Ok(())
    }

    /// The layered per-symbol decision.
    fn decide(&self, record: &SymbolRecord, object: &ObjectFile) -> Result<bool> {
        let rules = &self.ctx.rules;
        let demangled = names::demangle(record.name);
        let mut state = SymbolState::NotIncluded;

        // 1. Built-in battery: these symbols are never exported, no matter
        //    what the user rules or the plugin would say.
        if let Some(reason) = filters::reject_reason(record, object, &demangled) {
            self.log
                .trace(format!("{}: rejected by {reason}", record.name));
            return Ok(false);
        }

        // 2. Force rules match the whole demangled name; force-include wins
        //    when both match.
        if rules.force_include.iter().any(|re| re.is_match(&demangled)) {
            state = SymbolState::ForceIncluded;
        } else if rules.force_exclude.iter().any(|re| re.is_match(&demangled)) {
            state = SymbolState::ForceExcluded;
        }

        // 3. Namespace rules, over every component but the symbol's own
        //    name. Includes are checked before excludes within a component,
        //    and the loop keeps going, so a later exclude overrides an
        //    earlier include.
        if state == SymbolState::NotIncluded {
            let components = names::namespace_components(&demangled);
            if let Some((_, namespaces)) = components.split_last() {
                for namespace in namespaces {
                    if state == SymbolState::NotIncluded
                        && rules.include.iter().any(|re| re.is_match(namespace))
                    {
                        state = SymbolState::Included;
                    }
                    if matches!(state, SymbolState::NotIncluded | SymbolState::Included)
                        && rules.exclude.iter().any(|re| re.is_match(namespace))
                    {
                        state = SymbolState::Excluded;
                    }
                }
            }
        }

        // 4. The plugin only sees symbols that would otherwise be exported.
        if state.is_included()
            && let Some(plugin) = &self.ctx.plugin
            && !plugin.keep(&demangled, record, object)?
        {
            state = SymbolState::ForceExcluded;
        }

        Ok(state.is_included())
    }
}
