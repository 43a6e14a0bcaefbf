//! Symbol-name handling: undecoration and namespace splitting.

use msvc_demangler::DemangleFlags;

/// Undecorate an MSVC-mangled symbol name to its qualified C++ name
/// (name only, no return type or calling convention).
///
/// Names that are not MSVC-decorated (plain C symbols, section names)
/// come back unchanged, which is what the platform undecorator does and
/// keeps such names matchable by rules.
pub fn demangle(decorated: &str) -> String {
    msvc_demangler::demangle(decorated, DemangleFlags::NAME_ONLY)
        .unwrap_or_else(|_| decorated.to_string())
}

/// Split a demangled C++ name into its `::`-separated components, the last
/// being the symbol's own name.
///
/// A `::` only separates components outside template angle brackets and
/// outside backtick-quoted special-name regions, so names like
/// `a<b::c>::d` or a quoted "dynamic initializer for" form split on their
/// outer structure only.
///
/// Quote handling: a backtick opens a quoted region. An apostrophe closes
/// one when followed by `::`, another apostrophe, or the end of the name;
/// any other following character means the apostrophe itself opens a nested
/// quote (as in ``…::`vftable'{for `x'}``-style names).
pub fn namespace_components(name: &str) -> Vec<&str> {
    let mut components = Vec::new();
    if name.is_empty() {
        return components;
    }

    let bytes = name.as_bytes();
    let mut template_depth = 0usize;
    let mut quote_depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'<' if quote_depth == 0 => template_depth += 1,
            b'>' if quote_depth == 0 => template_depth = template_depth.saturating_sub(1),
            b'`' if template_depth == 0 => quote_depth += 1,
            b'\'' if template_depth == 0 => {
                let closes = match bytes.get(i + 1) {
                    None => true,
                    Some(b'\'') => true,
                    Some(b':') => bytes.get(i + 2) == Some(&b':'),
                    Some(_) => false,
                };
                if closes {
                    quote_depth = quote_depth.saturating_sub(1);
                } else {
                    quote_depth += 1;
                }
            }
            b':' if template_depth == 0
                && quote_depth == 0
                && bytes.get(i + 1) == Some(&b':') =>
            {
                components.push(&name[start..i]);
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    components.push(&name[start..]);
    components
}
