//! Directory scan, worker pool, and global merge.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context as _, Result, anyhow};

use crate::Context;
use crate::processor::UnitProcessor;

/// Recursively collect every `.obj` file under `dir`. The extension is
/// compared case-insensitively; Windows file systems preserve but do not
/// distinguish case.
pub fn find_object_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut result = Vec::new();
    collect_object_files(dir, &mut result)?;
    result.sort();
    Ok(result)
}

fn collect_object_files(dir: &Path, result: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read input directory {}", dir.display()))?;
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read input directory {}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            collect_object_files(&path, result)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("obj"))
        {
            result.push(path);
        }
    }
    Ok(())
}

/// Process every translation unit and merge the kept symbols.
///
/// Units run in batches of `concurrency` scoped threads; each worker owns
/// its processor outright, and included lists are moved into the global
/// set only after the whole batch has joined. Any worker error (or panic)
/// aborts the run.
pub fn run(ctx: &Context, paths: &[PathBuf]) -> Result<HashSet<String>> {
    let mut merged = HashSet::new();

    for batch in paths.chunks(ctx.config.concurrency) {
        // Join every worker before reporting any failure, so one bad unit
        // cannot leave the rest of the batch unjoined.
        let results = thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|path| {
                    scope.spawn(move || {
                        let mut processor = UnitProcessor::new(ctx);
                        processor.process(path)?;
                        Ok::<_, anyhow::Error>(processor)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .map_err(|_| anyhow!("worker thread panicked"))?
                })
                .collect::<Vec<Result<_>>>()
        });

        for result in results {
            merged.extend(result?.into_included_symbols());
        }
    }

    Ok(merged)
}
