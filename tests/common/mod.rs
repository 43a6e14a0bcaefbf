//! Shared test support: builds genuine COFF object images and runs the
//! full selection pipeline against a scratch directory.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::{Path, PathBuf};

use defgen::config::Config;
use defgen::log::{Level, Logger};
use defgen::{Context, driver, writer};
use object::pe;

pub const READ_EXECUTE: u32 = pe::IMAGE_SCN_MEM_READ | pe::IMAGE_SCN_MEM_EXECUTE;
pub const READ_WRITE: u32 = pe::IMAGE_SCN_MEM_READ | pe::IMAGE_SCN_MEM_WRITE;

struct FixtureSymbol {
    name: String,
    typ: u16,
    section_number: i16,
}

/// Builder for a minimal COFF `.obj` image: a file header, section
/// headers with the requested characteristics, 18-byte symbol entries,
/// and a string table for names longer than eight bytes.
pub struct ObjFixture {
    machine: u16,
    section_flags: Vec<u32>,
    symbols: Vec<FixtureSymbol>,
}

impl ObjFixture {
    pub fn new() -> Self {
        Self {
            machine: pe::IMAGE_FILE_MACHINE_AMD64,
            section_flags: Vec::new(),
            symbols: Vec::new(),
        }
    }

    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    pub fn section(mut self, characteristics: u32) -> Self {
        self.section_flags.push(characteristics);
        self
    }

    pub fn symbol(mut self, name: &str, typ: u16, section_number: i16) -> Self {
        self.symbols.push(FixtureSymbol {
            name: name.to_string(),
            typ,
            section_number,
        });
        self
    }

    /// A function symbol in section 1; most tests also add a
    /// read-execute section first.
    pub fn function(self, name: &str) -> Self {
        self.symbol(name, defgen::coff::SYMBOL_TYPE_FUNCTION, 1)
    }

    pub fn build(&self) -> Vec<u8> {
        let section_count = self.section_flags.len() as u16;
        let symbol_offset = 20 + 40 * u32::from(section_count);

        let mut image = Vec::new();
        image.extend_from_slice(&self.machine.to_le_bytes());
        image.extend_from_slice(&section_count.to_le_bytes());
        image.extend_from_slice(&0u32.to_le_bytes()); // timestamp
        image.extend_from_slice(&symbol_offset.to_le_bytes());
        image.extend_from_slice(&(self.symbols.len() as u32).to_le_bytes());
        image.extend_from_slice(&0u16.to_le_bytes()); // optional header size
        image.extend_from_slice(&0u16.to_le_bytes()); // characteristics

        for (index, flags) in self.section_flags.iter().enumerate() {
            let mut name = [0u8; 8];
            let text = format!(".s{index}");
            name[..text.len()].copy_from_slice(text.as_bytes());
            image.extend_from_slice(&name);
            image.extend_from_slice(&[0u8; 24]); // sizes and offsets
            image.extend_from_slice(&[0u8; 4]); // relocation and line counts
            image.extend_from_slice(&flags.to_le_bytes());
        }

        let mut strings = Vec::new();
        for symbol in &self.symbols {
            if symbol.name.len() <= 8 {
                let mut name = [0u8; 8];
                name[..symbol.name.len()].copy_from_slice(symbol.name.as_bytes());
                image.extend_from_slice(&name);
            } else {
                let offset = 4 + strings.len() as u32;
                strings.extend_from_slice(symbol.name.as_bytes());
                strings.push(0);
                image.extend_from_slice(&0u32.to_le_bytes());
                image.extend_from_slice(&offset.to_le_bytes());
            }
            image.extend_from_slice(&0u32.to_le_bytes()); // value
            image.extend_from_slice(&symbol.section_number.to_le_bytes());
            image.extend_from_slice(&symbol.typ.to_le_bytes());
            image.push(2); // IMAGE_SYM_CLASS_EXTERNAL
            image.push(0); // no auxiliary records
        }

        image.extend_from_slice(&(4 + strings.len() as u32).to_le_bytes());
        image.extend_from_slice(&strings);
        image
    }

    pub fn write_to(&self, path: &Path) {
        fs::write(path, self.build()).unwrap();
    }
}

/// A configuration over `input` with no rules set.
pub fn base_config(input: &Path, output: &Path) -> Config {
    Config {
        library_name: "Example".to_string(),
        input_dir: input.to_path_buf(),
        output_path: output.to_path_buf(),
        include: None,
        exclude: None,
        force_include: None,
        force_exclude: None,
        plugin_path: None,
        concurrency: 2,
        use_cache: false,
        emit_ordinals: false,
    }
}

/// Run the whole pipeline for `config` and return the manifest text.
pub fn run_pipeline(config: Config) -> anyhow::Result<String> {
    let output_path = PathBuf::from(&config.output_path);
    let ctx = Context::new(config, Logger::new(Level::Error))?;
    let paths = driver::find_object_files(&ctx.config.input_dir)?;
    let symbols = driver::run(&ctx, &paths)?;
    writer::write_def(
        &output_path,
        &ctx.config.library_name,
        symbols.into_iter().collect(),
        ctx.config.emit_ordinals,
    )?;
    Ok(fs::read_to_string(&output_path)?)
}
