//! Product loader.
//!
//! Rules, in this order:
//! 1. codigo: required, fits its column, not already persisted (active or
//!    inactive), not repeated in the file
//! 2. nombre: required, fits its column
//! 3. categoria: required, must name an active category
//! 4. precio: optional, number >= 0 (blank = 0)
//! 5. stock: optional, integer >= 0, fractions truncated (blank = 0)
//! 6. descripcion: optional, fits its column

use super::{EntityLoader, EntityType};
use crate::normalize::ColumnMap;
use crate::persistence::{NewProduct, NewRecord};
use crate::reference::{ReferenceIndex, SeenKeys};
use crate::table::RawRow;
use crate::validate::{
    non_negative_decimal, non_negative_integer, NumberCheck, Reasons, RowOutcome, ValidationMode,
};

pub const CODIGO: &str = "codigo";
pub const NOMBRE: &str = "nombre";
pub const DESCRIPCION: &str = "descripcion";
pub const CATEGORIA: &str = "categoria";
pub const PRECIO: &str = "precio";
pub const STOCK: &str = "stock";

/// Headers business users actually write, mapped to canonical fields.
const HEADER_OVERRIDES: &[(&str, &str)] = &[
    ("CÓDIGO", CODIGO),
    ("CODIGO", CODIGO),
    ("NOMBRE", NOMBRE),
    ("NOMBRE PRODUCTO", NOMBRE),
    ("DESCRIPCIÓN", DESCRIPCION),
    ("DESCRIPCION", DESCRIPCION),
    ("CATEGORÍA", CATEGORIA),
    ("CATEGORIA", CATEGORIA),
    ("PRECIO", PRECIO),
    ("PRECIO UNITARIO", PRECIO),
    ("STOCK", STOCK),
    ("STOCK INICIAL", STOCK),
];

#[derive(Debug, Clone)]
pub struct ProductLoader {
    columns: ColumnMap,
}

impl ProductLoader {
    pub fn new() -> Self {
        Self {
            columns: ColumnMap::new(HEADER_OVERRIDES),
        }
    }
}

impl Default for ProductLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityLoader for ProductLoader {
    fn entity(&self) -> EntityType {
        EntityType::Productos
    }

    fn noun(&self) -> &'static str {
        "products"
    }

    fn column_map(&self) -> &ColumnMap {
        &self.columns
    }

    fn validate_row(
        &self,
        row: RawRow,
        index: &ReferenceIndex,
        seen: &mut SeenKeys,
        mode: ValidationMode,
    ) -> RowOutcome {
        let mut reasons = Reasons::new(mode);

        let codigo = row.text(CODIGO).to_uppercase();
        if codigo.is_empty() {
            reasons.push("CODIGO is required.");
        } else {
            // Recorded on first sight even when the row fails later rules, so
            // a repeat further down is still reported as a duplicate.
            let first_seen = seen.insert(&codigo);
            if exceeds(&codigo, NewProduct::CODIGO_MAX) {
                reasons.push(format!(
                    "CODIGO cannot exceed {} characters.",
                    NewProduct::CODIGO_MAX
                ));
            }
            if index.key_exists(&codigo) {
                reasons.push(format!("CODIGO '{}' already exists in the database.", codigo));
            } else if index.key_retired(&codigo) {
                reasons.push(format!(
                    "CODIGO '{}' belongs to an inactive product in the database.",
                    codigo
                ));
            }
            if !first_seen {
                reasons.push(format!("CODIGO '{}' is duplicated in the file.", codigo));
            }
        }
        if reasons.done() {
            return reject(row, reasons);
        }

        let nombre = row.text(NOMBRE);
        if nombre.is_empty() {
            reasons.push("NOMBRE is required.");
        } else if exceeds(&nombre, NewProduct::NOMBRE_MAX) {
            reasons.push(format!(
                "NOMBRE cannot exceed {} characters.",
                NewProduct::NOMBRE_MAX
            ));
        }
        if reasons.done() {
            return reject(row, reasons);
        }

        let categoria = row.text(CATEGORIA).to_uppercase();
        let categoria_id = if categoria.is_empty() {
            reasons.push("CATEGORIA is required.");
            None
        } else {
            let id = index.resolve(&categoria);
            if id.is_none() {
                reasons.push(format!(
                    "CATEGORIA '{}' does not exist in the database.",
                    categoria
                ));
            }
            id
        };
        if reasons.done() {
            return reject(row, reasons);
        }

        let precio = non_negative_decimal(row.get(PRECIO));
        match precio {
            NumberCheck::Invalid => reasons.push("PRECIO must be a valid number."),
            NumberCheck::Negative => reasons.push("PRECIO cannot be negative."),
            NumberCheck::Absent | NumberCheck::Value(_) => {}
        }
        if reasons.done() {
            return reject(row, reasons);
        }

        let stock = non_negative_integer(row.get(STOCK));
        match stock {
            NumberCheck::Invalid => reasons.push("STOCK must be a valid integer."),
            NumberCheck::Negative => reasons.push("STOCK cannot be negative."),
            NumberCheck::Absent | NumberCheck::Value(_) => {}
        }
        if reasons.done() {
            return reject(row, reasons);
        }

        let descripcion = row.text(DESCRIPCION);
        if exceeds(&descripcion, NewProduct::DESCRIPCION_MAX) {
            reasons.push(format!(
                "DESCRIPCION cannot exceed {} characters.",
                NewProduct::DESCRIPCION_MAX
            ));
        }

        match (
            reasons.is_empty(),
            categoria_id,
            precio.value_or_default(),
            stock.value_or_default(),
        ) {
            (true, Some(categoria_id), Some(precio), Some(stock)) => {
                let record = NewRecord::Product(NewProduct {
                    codigo,
                    nombre,
                    descripcion: (!descripcion.is_empty()).then_some(descripcion),
                    categoria_id,
                    precio,
                    stock,
                });
                RowOutcome::Accepted { row, record }
            }
            _ => reject(row, reasons),
        }
    }
}

/// Column widths count characters, not bytes.
fn exceeds(value: &str, max: usize) -> bool {
    value.chars().count() > max
}

fn reject(row: RawRow, reasons: Reasons) -> RowOutcome {
    RowOutcome::Rejected {
        row,
        reasons: reasons.into_vec(),
    }
}
