//! Sample product files for trying out the pipeline.

use std::io::Write;

use anyhow::Result;

pub const HEADERS: [&str; 6] = ["CÓDIGO", "NOMBRE", "DESCRIPCIÓN", "CATEGORÍA", "PRECIO", "STOCK"];

type Sample = (&'static str, &'static str, &'static str, &'static str, f64, i32);

const VALID: &[Sample] = &[
    ("PROD003", "Teclado Mecánico RGB", "Teclado mecánico gaming con iluminación RGB", "ELECTRÓNICA", 450.0, 25),
    ("PROD004", "Monitor LG 27 pulgadas", "Monitor LG IPS 27'' Full HD", "ELECTRÓNICA", 1200.0, 15),
    ("PROD005", "Arroz Extra", "Arroz extra superior saco de 50kg", "ALIMENTOS", 120.0, 100),
    ("PROD006", "Aceite Vegetal", "Aceite vegetal 1L", "ALIMENTOS", 15.5, 200),
    ("PROD007", "Polo Deportivo", "Polo deportivo dry-fit talla L", "ROPA", 45.0, 80),
];

/// One valid row followed by one row per rejection kind.
const WITH_ERRORS: &[Sample] = &[
    ("PROD008", "Producto Válido", "Este producto es válido", "ELECTRÓNICA", 100.0, 10),
    ("", "Producto Sin Código", "Este producto tiene error", "ELECTRÓNICA", 200.0, 5),
    ("PROD009", "", "Este producto no tiene nombre", "ALIMENTOS", 50.0, 20),
    ("PROD010", "Producto con Categoría Inexistente", "Categoría no existe en BD", "CATEGORIA_INVALIDA", 75.0, 15),
    ("PROD008", "Producto Duplicado", "Este código está duplicado", "HOGAR", 150.0, 8),
    ("PROD011", "Producto con Precio Negativo", "Precio inválido", "DEPORTES", -50.0, 10),
];

/// Write the product template as UTF-8 CSV. Returns the number of data rows.
pub fn write_product_template<W: Write>(out: W, with_errors: bool) -> Result<usize> {
    let rows = if with_errors { WITH_ERRORS } else { VALID };
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(HEADERS)?;
    for &(codigo, nombre, descripcion, categoria, precio, stock) in rows {
        writer.write_record([
            codigo.to_string(),
            nombre.to_string(),
            descripcion.to_string(),
            categoria.to_string(),
            format!("{:.2}", precio),
            stock.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(rows.len())
}
