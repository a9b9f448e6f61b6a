//! Column header normalization.
//!
//! Business users write the same column many ways ("CÓDIGO", "Codigo",
//! "código "). Every header is resolved to one canonical field name: an
//! explicit per-entity override table is consulted first, then the generic
//! flattening rule applies.

use std::collections::HashMap;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Remove diacritics via compatibility decomposition ("Educación" -> "Educacion").
pub fn strip_diacritics(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Flatten a header into a snake-style identifier.
///
/// "Número de Documento" -> "numero_de_documento", "F. Revalidación" -> "f_revalidacion".
/// Runs of spaces, periods, hyphens and underscores collapse into one `_`.
/// Idempotent: flattening an already flat name returns it unchanged.
pub fn flatten_column_name(name: &str) -> String {
    // Decompose, lowercase, decompose again: lowercasing can reintroduce
    // combining marks ('İ') and decomposition can reintroduce capitals ('ℌ').
    let folded = strip_diacritics(&strip_diacritics(name.trim()).to_lowercase());

    let mut flat = String::with_capacity(folded.len());
    for c in folded.chars() {
        if matches!(c, ' ' | '.' | '-' | '_') {
            if !flat.ends_with('_') {
                flat.push('_');
            }
        } else {
            flat.push(c);
        }
    }

    flat.trim_matches(|c: char| c == '_' || c.is_whitespace())
        .to_string()
}

/// Per-entity header overrides, matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    exact: HashMap<String, &'static str>,
    flattened: HashMap<String, &'static str>,
}

impl ColumnMap {
    pub fn new(pairs: &[(&str, &'static str)]) -> Self {
        let mut map = ColumnMap::default();
        for &(header, field) in pairs {
            map.exact.insert(header.trim().to_uppercase(), field);
            map.flattened
                .entry(flatten_column_name(header))
                .or_insert(field);
        }
        map
    }

    /// Canonical field name for a raw header.
    pub fn canonical(&self, header: &str) -> String {
        if let Some(field) = self.exact.get(&header.trim().to_uppercase()) {
            return field.to_string();
        }
        let flat = flatten_column_name(header);
        match self.flattened.get(&flat) {
            Some(field) => field.to_string(),
            None => flat,
        }
    }

    /// Canonical names for a whole header row, in order.
    pub fn canonical_headers(&self, headers: &[String]) -> Vec<String> {
        headers.iter().map(|h| self.canonical(h)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_map() -> ColumnMap {
        ColumnMap::new(&[
            ("CÓDIGO", "codigo"),
            ("CODIGO", "codigo"),
            ("NOMBRE PRODUCTO", "nombre"),
            ("PRECIO UNITARIO", "precio"),
        ])
    }

    #[test]
    fn test_flatten_basic() {
        assert_eq!(flatten_column_name("Número de Documento"), "numero_de_documento");
        assert_eq!(flatten_column_name("  NRO. DOC.  "), "nro_doc");
        assert_eq!(flatten_column_name("F. REVALIDACIÓN"), "f_revalidacion");
    }

    #[test]
    fn test_flatten_collapses_separators() {
        assert_eq!(flatten_column_name("a - b . c"), "a_b_c");
        assert_eq!(flatten_column_name("a__b"), "a_b");
        assert_eq!(flatten_column_name("__stock__"), "stock");
        assert_eq!(flatten_column_name("Stock-Inicial"), "stock_inicial");
    }

    #[test]
    fn test_flatten_empty_and_separators_only() {
        assert_eq!(flatten_column_name(""), "");
        assert_eq!(flatten_column_name(" .-_ "), "");
    }

    #[test]
    fn test_flatten_idempotent() {
        let samples = [
            "Número de Documento",
            "CATEGORÍA",
            "precio unitario",
            "_\tx",
            "ℌola Mundo",
            "İstanbul",
            "a\u{2002}b",
            "stock__inicial",
            "ÑANDÚ-Ü",
            "..",
        ];
        for sample in samples {
            let once = flatten_column_name(sample);
            assert_eq!(flatten_column_name(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_strip_diacritics() {
        assert_eq!(strip_diacritics("Educación Física"), "Educacion Fisica");
        assert_eq!(strip_diacritics("ñ"), "n");
    }

    #[test]
    fn test_override_case_insensitive() {
        let map = product_map();
        assert_eq!(map.canonical("CÓDIGO"), "codigo");
        assert_eq!(map.canonical("código"), "codigo");
        assert_eq!(map.canonical("  Codigo "), "codigo");
        assert_eq!(map.canonical("Nombre Producto"), "nombre");
    }

    #[test]
    fn test_override_matches_flattened_spelling() {
        let map = product_map();
        assert_eq!(map.canonical("Precio-Unitario"), "precio");
        assert_eq!(map.canonical("precio  unitario"), "precio");
    }

    #[test]
    fn test_fallback_to_flatten() {
        let map = product_map();
        assert_eq!(map.canonical("Descripción Larga"), "descripcion_larga");
        assert_eq!(map.canonical("stock"), "stock");
    }

    #[test]
    fn test_canonical_headers_keeps_order() {
        let map = product_map();
        let headers = vec!["CÓDIGO".to_string(), "Extra Col".to_string()];
        assert_eq!(map.canonical_headers(&headers), vec!["codigo", "extra_col"]);
    }
}
