//! External filter plugin support.
//!
//! A plugin is a shared library exporting a C-linkage entry point:
//!
//! ```c
//! int keep_symbol(const char* demangled_name,
//!                 const void* symbol,   /* const SymbolView*  */
//!                 const void* reader);  /* const ObjectView*  */
//! ```
//!
//! Nonzero keeps the symbol, zero rejects it. The views are ABI-stable
//! snapshots of the host's parser state rather than pointers into its
//! internals, so plugins do not need to link the same COFF library.

use std::ffi::{CString, c_char, c_int, c_void};
use std::path::Path;

use anyhow::{Context as _, Result, anyhow};
use libloading::Library;

use crate::coff::{ObjectFile, SymbolRecord};

/// Per-symbol view handed to the plugin as `symbol`.
#[repr(C)]
pub struct SymbolView {
    /// Decorated name, NUL-terminated.
    pub decorated_name: *const c_char,
    /// Raw COFF type field (0x00 data, 0x20 function).
    pub symbol_type: u16,
    /// Characteristics of the owning section, 0 for sentinel sections.
    pub section_flags: u32,
}

/// Per-object view handed to the plugin as `reader`.
#[repr(C)]
pub struct ObjectView {
    /// `IMAGE_FILE_MACHINE_*` value of the object's header.
    pub machine: u16,
    /// Total symbol-table entry count, auxiliary records included.
    pub symbol_count: u32,
}

type KeepSymbolFn =
    unsafe extern "C" fn(*const c_char, *const c_void, *const c_void) -> c_int;

/// The loaded plugin. Holds the library handle for the lifetime of the
/// process so the resolved entry point stays valid; dropping this (at
/// process exit) unloads the library.
pub struct PluginFilter {
    func: KeepSymbolFn,
    _library: Library,
}

impl PluginFilter {
    /// Load `path` and resolve `keep_symbol`. Either failure is fatal for
    /// the run, so this returns an error rather than a degraded filter.
    pub fn load(path: &Path) -> Result<Self> {
        // SAFETY: loading a library runs its initializers; the plugin is
        // user-supplied and trusted, same as the original host.
        let library = unsafe { Library::new(path) }
            .with_context(|| format!("failed to load filter plugin {}", path.display()))?;

        // SAFETY: the entry point is declared with the documented C ABI.
        let func = unsafe {
            library
                .get::<KeepSymbolFn>(b"keep_symbol")
                .with_context(|| {
                    format!("plugin {} does not export keep_symbol", path.display())
                })
                .map(|symbol| *symbol)?
        };

        Ok(Self {
            func,
            _library: library,
        })
    }

    /// Ask the plugin whether an otherwise-included symbol should stay.
    pub fn keep(
        &self,
        demangled: &str,
        record: &SymbolRecord,
        object: &ObjectFile,
    ) -> Result<bool> {
        let demangled = CString::new(demangled)
            .map_err(|_| anyhow!("demangled name contains an interior NUL"))?;
        let decorated = CString::new(record.name)
            .map_err(|_| anyhow!("decorated name contains an interior NUL"))?;

        let symbol = SymbolView {
            decorated_name: decorated.as_ptr(),
            symbol_type: record.typ,
            section_flags: object.section_flags(record),
        };
        let reader = ObjectView {
            machine: object.machine(),
            symbol_count: object.symbol_count() as u32,
        };

        // SAFETY: the views and the name outlive the call; the signature
        // matches the documented plugin ABI.
        let verdict = unsafe {
            (self.func)(
                demangled.as_ptr(),
                std::ptr::from_ref(&symbol).cast::<c_void>(),
                std::ptr::from_ref(&reader).cast::<c_void>(),
            )
        };
        Ok(verdict != 0)
    }
}
