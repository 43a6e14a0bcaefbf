//! Structural filters for symbols that must never be exported, regardless
//! of the user's rules: deleting destructors, read-only constants, managed
//! code entry points, and the other shapes the Microsoft toolchain emits
//! that a `.def` file must not list. The set follows the filtering CMake
//! applies for `WINDOWS_EXPORT_ALL_SYMBOLS`, itself derived from the
//! `bindexplib` tool.

use std::sync::LazyLock;

use object::pe;
use regex::Regex;

use crate::coff::{IMAGE_FILE_MACHINE_ARM64EC, ObjectFile, SymbolRecord};

type Filter = fn(&SymbolRecord, &ObjectFile, &str) -> bool;

/// The battery, in application order. The first failing filter names the
/// rejection reason.
const FILTERS: [(Filter, &str); 7] = [
    (filter_symbol_type, "symbol-type"),
    (filter_destructors, "destructors"),
    (filter_constants, "constants"),
    (filter_rx_functions, "rx-functions"),
    (filter_dot_symbols, "dot-symbols"),
    (filter_managed_code, "managed-code"),
    (filter_arm64ec_thunks, "arm64ec-thunks"),
];

/// Apply every filter to the given symbol. Returns the name of the filter
/// that rejected it, or `None` when the symbol may be exported.
pub fn reject_reason(
    record: &SymbolRecord,
    object: &ObjectFile,
    demangled: &str,
) -> Option<&'static str> {
    FILTERS
        .iter()
        .find(|(filter, _)| !filter(record, object, demangled))
        .map(|&(_, name)| name)
}

/// The undecorated prefix of a mangled name: leading whitespace dropped,
/// any stdcall `@…` suffix truncated after a leading underscore, and one
/// extra leading underscore dropped on i386.
pub fn strip_decoration(name: &str, machine: u16) -> &str {
    let mut result = name.trim_start();

    if result.starts_with('_')
        && let Some(at) = result.find('@')
    {
        result = &result[..at];
    }

    if machine == pe::IMAGE_FILE_MACHINE_I386 {
        result = result.strip_prefix('_').unwrap_or(result);
    }

    result
}

fn filter_symbol_type(record: &SymbolRecord, _object: &ObjectFile, _demangled: &str) -> bool {
    record.is_data() || record.is_function()
}

/// Scalar (`??_G`) and vector (`??_E`) deleting destructors must not be
/// exported.
fn filter_destructors(record: &SymbolRecord, object: &ObjectFile, _demangled: &str) -> bool {
    let base = strip_decoration(record.name, object.machine());
    !base.starts_with("??_G") && !base.starts_with("??_E")
}

/// Read-only constants are typically inlined duplicates across translation
/// units; exporting them causes link collisions.
fn filter_constants(record: &SymbolRecord, object: &ObjectFile, _demangled: &str) -> bool {
    !(record.is_data() && (object.section_flags(record) & pe::IMAGE_SCN_MEM_WRITE) == 0)
}

/// Function symbols must live in a readable or executable section.
fn filter_rx_functions(record: &SymbolRecord, object: &ObjectFile, _demangled: &str) -> bool {
    !(record.is_function()
        && (object.section_flags(record)
            & (pe::IMAGE_SCN_MEM_READ | pe::IMAGE_SCN_MEM_EXECUTE))
            == 0)
}

fn filter_dot_symbols(record: &SymbolRecord, _object: &ObjectFile, _demangled: &str) -> bool {
    !record.name.contains('.')
}

fn filter_managed_code(record: &SymbolRecord, object: &ObjectFile, _demangled: &str) -> bool {
    let base = strip_decoration(record.name, object.machine());
    if base.contains("$$F") || base.contains("$$J") {
        return false;
    }
    !matches!(base, "__t2m" | "__m2mep" | "__mep")
}

fn filter_arm64ec_thunks(record: &SymbolRecord, object: &ObjectFile, _demangled: &str) -> bool {
    #[allow(clippy::unwrap_used)]
    static THUNK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\$i?(entry|exit)_thunk$").unwrap());

    if object.machine() != IMAGE_FILE_MACHINE_ARM64EC {
        return true;
    }
    !THUNK.is_match(strip_decoration(record.name, object.machine()))
}
