//! `.def` manifest emission.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context as _, Result, ensure};

/// The linker's ordinal space: 16 bits, with 0 unused.
const MAX_EXPORTS: usize = 65_535;

/// Write the export manifest.
///
/// Symbols are sorted before emission so that two runs over the same
/// inputs produce the same file, and in particular the same ordinals.
/// With ordinals enabled every line gets a dense `@N NONAME` suffix,
/// numbered from 1 in emission order.
pub fn write_def(
    path: &Path,
    library_name: &str,
    mut symbols: Vec<String>,
    emit_ordinals: bool,
) -> Result<usize> {
    ensure!(
        symbols.len() < MAX_EXPORTS,
        "{} symbols to export, but the ordinal space only allows {}; \
         add filters to reduce the exported set",
        symbols.len(),
        MAX_EXPORTS - 1
    );

    symbols.sort_unstable();

    let file = File::create(path)
        .with_context(|| format!("failed to create output file {}", path.display()))?;
    let mut out = BufWriter::new(file);

    write_lines(&mut out, library_name, &symbols, emit_ordinals)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(symbols.len())
}

fn write_lines(
    out: &mut impl Write,
    library_name: &str,
    symbols: &[String],
    emit_ordinals: bool,
) -> std::io::Result<()> {
    writeln!(out, "LIBRARY {library_name}")?;
    writeln!(out, "EXPORTS")?;
    for (index, symbol) in symbols.iter().enumerate() {
        if emit_ordinals {
            writeln!(out, "  {symbol} @{} NONAME", index + 1)?;
        } else {
            writeln!(out, "  {symbol}")?;
        }
    }
    out.flush()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    fn write_to_string(symbols: &[&str], emit_ordinals: bool) -> String {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.def");
        let owned: Vec<String> = symbols.iter().map(ToString::to_string).collect();
        write_def(&path, "Example", owned, emit_ordinals).unwrap();
        fs::read_to_string(&path).unwrap()
    }

    #[test]
    fn writes_header_and_indented_symbols() {
        let output = write_to_string(&["?b@@YAHXZ", "?a@@YAHXZ"], false);
        assert_eq!(output, "LIBRARY Example\nEXPORTS\n  ?a@@YAHXZ\n  ?b@@YAHXZ\n");
    }

    #[test]
    fn empty_set_still_writes_the_header() {
        let output = write_to_string(&[], false);
        assert_eq!(output, "LIBRARY Example\nEXPORTS\n");
    }

    #[test]
    fn ordinals_are_dense_from_one_and_paired_with_noname() {
        let output = write_to_string(&["?b@@YAHXZ", "?a@@YAHXZ", "?c@@YAHXZ"], true);
        assert_eq!(
            output,
            "LIBRARY Example\nEXPORTS\n  ?a@@YAHXZ @1 NONAME\n  ?b@@YAHXZ @2 NONAME\n  ?c@@YAHXZ @3 NONAME\n"
        );
    }

    #[test]
    fn emission_is_sorted_for_reproducibility() {
        let first = write_to_string(&["z", "m", "a"], true);
        let second = write_to_string(&["a", "z", "m"], true);
        assert_eq!(first, second);
    }

    #[test]
    fn overflowing_the_ordinal_space_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.def");
        let symbols: Vec<String> = (0..65_535).map(|i| format!("s{i}")).collect();
        let err = write_def(&path, "Example", symbols, false).unwrap_err();
        assert!(err.to_string().contains("add filters"));
        assert!(!path.exists());
    }

    #[test]
    fn one_below_the_limit_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.def");
        let symbols: Vec<String> = (0..65_534).map(|i| format!("s{i}")).collect();
        assert_eq!(write_def(&path, "Example", symbols, false).unwrap(), 65_534);
    }
}
