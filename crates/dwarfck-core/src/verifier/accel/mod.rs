//! Accelerator (name lookup) tables: the Apple hash tables and DWARF 5
//! `.debug_names`.

mod apple;
mod names;

use super::Verifier;

/// Bernstein hash used by both table families
pub(crate) fn djb_hash(bytes: &[u8]) -> u32
{
    bytes
        .iter()
        .fold(5381u32, |hash, &byte| hash.wrapping_mul(33).wrapping_add(u32::from(byte)))
}

/// [`djb_hash`] over the simple case folding of `name`
///
/// `.debug_names` hashes are computed this way so lookups can ignore case.
pub(crate) fn case_folded_djb_hash(name: &str) -> u32
{
    let mut folded = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            // Simple folding leaves U+0130 alone; lowercasing expands it
            'İ' => folded.push(ch),
            _ => folded.extend(ch.to_lowercase()),
        }
    }
    djb_hash(folded.as_bytes())
}

impl Verifier<'_>
{
    pub(crate) fn verify_accel_tables(&self)
    {
        let sections = &self.data.sections;
        let apple = [
            (".apple_names", &sections.apple_names),
            (".apple_types", &sections.apple_types),
            (".apple_namespaces", &sections.apple_namespaces),
            (".apple_objc", &sections.apple_objc),
        ];
        for (name, bytes) in apple {
            if !bytes.is_empty() {
                self.verify_apple_table(name, bytes);
            }
        }
        if !sections.debug_names.is_empty() {
            self.verify_debug_names(&sections.debug_names);
        }
    }
}
