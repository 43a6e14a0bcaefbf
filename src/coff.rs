//! Byte-level view over one COFF object file.
//!
//! Only the pieces the selection engine needs are exposed: the header
//! machine field, section characteristics, and the symbol table entries
//! (decorated name, type field, section number).

use std::str;

use anyhow::{Context as _, Result};
use object::LittleEndian as LE;
use object::coff::{CoffHeader as _, ImageSymbol as _};
use object::pe;
use object::read::SectionIndex;
use object::read::coff::{SectionTable, SymbolTable};

/// The ARM64 "emulation compatible" ABI variant.
pub const IMAGE_FILE_MACHINE_ARM64EC: u16 = 0xA641;

// Microsoft tools use the symbol type field only to indicate whether or not
// the symbol is a function, so the only values seen in practice are
// 0x00 (data) and 0x20 (function).
pub const SYMBOL_TYPE_DATA: u16 = 0x00;
pub const SYMBOL_TYPE_FUNCTION: u16 = pe::IMAGE_SYM_DTYPE_FUNCTION << 4;

/// One symbol-table entry, borrowed from the object file.
#[derive(Debug, Clone, Copy)]
pub struct SymbolRecord<'data> {
    /// The decorated (mangled) name as stored in the object file.
    pub name: &'data str,
    /// Raw COFF type field.
    pub typ: u16,
    /// 1-based section number, or one of the `IMAGE_SYM_*` sentinels.
    pub section_number: i32,
}

impl SymbolRecord<'_> {
    pub fn is_data(&self) -> bool {
        self.typ == SYMBOL_TYPE_DATA
    }

    pub fn is_function(&self) -> bool {
        self.typ == SYMBOL_TYPE_FUNCTION
    }
}

/// A parsed COFF object, borrowing the file bytes.
pub struct ObjectFile<'data> {
    header: &'data pe::ImageFileHeader,
    sections: SectionTable<'data>,
    symbols: SymbolTable<'data>,
}

impl<'data> ObjectFile<'data> {
    pub fn parse(data: &'data [u8]) -> Result<Self> {
        let mut offset = 0;
        let header =
            pe::ImageFileHeader::parse(data, &mut offset).context("invalid COFF header")?;
        let sections = header
            .sections(data, offset)
            .context("invalid COFF section table")?;
        let symbols = header.symbols(data).context("invalid COFF symbol table")?;
        Ok(Self {
            header,
            sections,
            symbols,
        })
    }

    /// The header machine field (`IMAGE_FILE_MACHINE_*`).
    pub fn machine(&self) -> u16 {
        self.header.machine()
    }

    /// Number of symbol table entries, auxiliary records included.
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Iterate the symbol table in file order, skipping auxiliary records.
    pub fn symbols(&self) -> impl Iterator<Item = Result<SymbolRecord<'data>>> + '_ {
        self.symbols.iter().map(|(_, symbol)| {
            let name = symbol
                .name(self.symbols.strings())
                .context("malformed COFF symbol name")?;
            let name = str::from_utf8(name).context("COFF symbol name is not valid UTF-8")?;
            Ok(SymbolRecord {
                name,
                typ: symbol.typ(),
                section_number: symbol.section_number(),
            })
        })
    }

    /// Characteristics of the section owning `record`.
    ///
    /// The sentinel section numbers (undefined, absolute, debug) and any
    /// number outside the section table resolve to 0, all flag bits clear.
    pub fn section_flags(&self, record: &SymbolRecord) -> u32 {
        match record.section_number {
            pe::IMAGE_SYM_UNDEFINED | pe::IMAGE_SYM_ABSOLUTE | pe::IMAGE_SYM_DEBUG => 0,
            number => usize::try_from(number)
                .ok()
                .and_then(|index| self.sections.section(SectionIndex(index)).ok())
                .map_or(0, |section| section.characteristics.get(LE)),
        }
    }
}
