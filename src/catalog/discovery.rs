//! Schema introspection: turns database metadata into candidate layers.
//!
//! One listing query is the only fatal point; everything after it is a
//! per-layer probe whose failure downgrades to a skip. Probes never scan
//! whole tables: geometry type and SRID come from a single sampled row,
//! and result schemas come from `DESCRIBE` over a NULL-bound invocation.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::domain::{Bounds, Column, Layer, LayerKind};
use crate::infra::db::{Connection, ConnectionError, Row};

use super::filter::FilterPolicy;

pub(crate) const DEFAULT_SCHEMA: &str = "main";
pub(crate) const DEFAULT_SRID: i32 = 4326;

const GEOMETRY_COLUMNS_SQL: &str = "SELECT table_schema, table_name, column_name \
     FROM information_schema.columns \
     WHERE data_type = 'GEOMETRY' \
       AND table_schema NOT IN ('information_schema', 'pg_catalog') \
     ORDER BY table_schema, table_name, ordinal_position";

/// Public layer name: bare object name in the default schema, otherwise
/// schema-qualified.
pub(crate) fn public_name(schema: &str, object: &str) -> String {
    if schema == DEFAULT_SCHEMA {
        object.to_string()
    } else {
        format!("{schema}.{object}")
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    value.replace('\'', "''")
}

fn text(row: &Row, idx: usize) -> Option<&str> {
    row.get(idx).and_then(|value| value.as_deref())
}

fn parse_f64(row: &Row, idx: usize) -> Option<f64> {
    text(row, idx)?.parse().ok()
}

/// Runs the full introspection pass. Tables come first so they win any
/// later name collision with a function layer.
pub(crate) fn discover(
    conn: &dyn Connection,
    policy: &FilterPolicy,
) -> Result<Vec<Layer>, ConnectionError> {
    let mut layers = Vec::new();
    let mut seen_tables = HashSet::new();

    for row in &conn.query(GEOMETRY_COLUMNS_SQL)? {
        let (Some(schema), Some(table), Some(column)) = (text(row, 0), text(row, 1), text(row, 2))
        else {
            continue;
        };
        if !seen_tables.insert((schema.to_string(), table.to_string())) {
            debug!(schema, table, column, "additional geometry column ignored");
            continue;
        }
        let name = public_name(schema, table);
        if !policy.admits_table(&name) {
            debug!(layer = %name, "table filtered out by policy");
            continue;
        }
        match table_layer(conn, schema, table, column) {
            Ok(layer) => layers.push(layer),
            Err(err) => warn!(layer = %name, error = %err, "skipping table layer"),
        }
    }

    for schema in policy.function_schemas() {
        match discover_functions(conn, schema) {
            Ok(mut found) => layers.append(&mut found),
            Err(err) => {
                warn!(schema = %schema, error = %err, "skipping function discovery for schema");
            }
        }
    }

    Ok(layers)
}

fn table_layer(
    conn: &dyn Connection,
    schema: &str,
    table: &str,
    geometry_column: &str,
) -> Result<Layer, ConnectionError> {
    let properties = table_properties(conn, schema, table, geometry_column)?;
    let (geometry_type, srid) = geometry_probe(conn, schema, table, geometry_column)?;
    let description = table_comment(conn, schema, table);
    Ok(Layer {
        name: public_name(schema, table),
        kind: LayerKind::Table,
        schema: schema.to_string(),
        object_name: table.to_string(),
        description,
        geometry_column: geometry_column.to_string(),
        geometry_type,
        srid,
        bounds: None,
        properties,
    })
}

fn table_properties(
    conn: &dyn Connection,
    schema: &str,
    table: &str,
    geometry_column: &str,
) -> Result<Vec<Column>, ConnectionError> {
    let sql = format!(
        "SELECT column_name, data_type FROM information_schema.columns \
         WHERE table_schema = '{}' AND table_name = '{}' \
         ORDER BY ordinal_position",
        quote_literal(schema),
        quote_literal(table)
    );
    let rows = conn.query(&sql)?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            let name = text(row, 0)?;
            let data_type = text(row, 1)?;
            if name == geometry_column || data_type.starts_with("GEOMETRY") {
                return None;
            }
            Some(Column::new(name, data_type))
        })
        .collect())
}

/// Samples one row for the concrete geometry type and SRID. An empty
/// table keeps the generic defaults; SRID 0 normalizes to 4326.
fn geometry_probe(
    conn: &dyn Connection,
    schema: &str,
    table: &str,
    column: &str,
) -> Result<(String, i32), ConnectionError> {
    let src = format!("{}.{}", quote_ident(schema), quote_ident(table));
    let sql = format!(
        "SELECT CAST(ST_GeometryType({col}) AS VARCHAR), CAST(ST_SRID({col}) AS VARCHAR) \
         FROM {src} WHERE {col} IS NOT NULL LIMIT 1",
        col = quote_ident(column),
    );
    match conn.query_row(&sql)? {
        Some(row) => {
            let geometry_type = text(&row, 0).unwrap_or("GEOMETRY").to_string();
            let srid = text(&row, 1)
                .and_then(|s| s.parse::<i32>().ok())
                .unwrap_or(0);
            Ok((geometry_type, normalize_srid(srid)))
        }
        None => Ok(("GEOMETRY".to_string(), DEFAULT_SRID)),
    }
}

fn normalize_srid(srid: i32) -> i32 {
    if srid <= 0 { DEFAULT_SRID } else { srid }
}

fn table_comment(conn: &dyn Connection, schema: &str, table: &str) -> String {
    let sql = format!(
        "SELECT comment FROM duckdb_tables() WHERE schema_name = '{}' AND table_name = '{}'",
        quote_literal(schema),
        quote_literal(table)
    );
    match conn.query_row(&sql) {
        Ok(Some(row)) => text(&row, 0).unwrap_or_default().to_string(),
        Ok(None) => String::new(),
        Err(err) => {
            debug!(schema, table, error = %err, "table comment unavailable");
            String::new()
        }
    }
}

fn discover_functions(
    conn: &dyn Connection,
    schema: &str,
) -> Result<Vec<Layer>, ConnectionError> {
    let sql = format!(
        "SELECT DISTINCT function_name, COALESCE(description, ''), COALESCE(len(parameters), 0) \
         FROM duckdb_functions() \
         WHERE function_type IN ('table', 'table_macro') AND schema_name = '{}' \
         ORDER BY function_name, 3",
        quote_literal(schema)
    );
    let rows = conn.query(&sql)?;

    let mut layers = Vec::new();
    let mut seen = HashSet::new();
    for row in &rows {
        let Some(name) = text(row, 0) else { continue };
        // overloads: keep the lowest arity per name
        if !seen.insert(name.to_string()) {
            continue;
        }
        let description = text(row, 1).unwrap_or_default().to_string();
        let arity = text(row, 2)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        match function_layer(conn, schema, name, description, arity) {
            Ok(Some(layer)) => layers.push(layer),
            Ok(None) => debug!(schema = %schema, function = name, "no geometry result column"),
            Err(err) => {
                warn!(schema = %schema, function = name, error = %err, "skipping function layer");
            }
        }
    }
    Ok(layers)
}

fn function_layer(
    conn: &dyn Connection,
    schema: &str,
    name: &str,
    description: String,
    arity: usize,
) -> Result<Option<Layer>, ConnectionError> {
    let args = vec!["NULL"; arity].join(", ");
    let sql = format!(
        "DESCRIBE SELECT * FROM {}.{}({})",
        quote_ident(schema),
        quote_ident(name),
        args
    );
    let rows = conn.query(&sql)?;

    let mut geometry_column = None;
    let mut properties = Vec::new();
    for row in &rows {
        let (Some(column), Some(data_type)) = (text(row, 0), text(row, 1)) else {
            continue;
        };
        if data_type.starts_with("GEOMETRY") {
            if geometry_column.is_none() {
                geometry_column = Some(column.to_string());
            }
            continue;
        }
        properties.push(Column::new(column, data_type));
    }

    let Some(geometry_column) = geometry_column else {
        return Ok(None);
    };
    Ok(Some(Layer {
        name: public_name(schema, name),
        kind: LayerKind::Function,
        schema: schema.to_string(),
        object_name: name.to_string(),
        description,
        geometry_column,
        geometry_type: "GEOMETRY".to_string(),
        srid: DEFAULT_SRID,
        bounds: None,
        properties,
    }))
}

/// Resolves a layer's extent. Table layers aggregate per-geometry bounds
/// in the database; function layers answer the world extent since running
/// the function just to measure it is not worth the cost.
pub(crate) fn layer_bounds(conn: &dyn Connection, layer: &Layer) -> Option<Bounds> {
    if layer.kind == LayerKind::Function {
        return Some(Bounds::WORLD);
    }
    let sql = format!(
        "SELECT CAST(MIN(ST_XMin({col})) AS VARCHAR), CAST(MIN(ST_YMin({col})) AS VARCHAR), \
                CAST(MAX(ST_XMax({col})) AS VARCHAR), CAST(MAX(ST_YMax({col})) AS VARCHAR) \
         FROM {src} WHERE {col} IS NOT NULL",
        col = quote_ident(&layer.geometry_column),
        src = layer.qualified_source(),
    );
    match conn.query_row(&sql) {
        Ok(Some(row)) => {
            match (
                parse_f64(&row, 0),
                parse_f64(&row, 1),
                parse_f64(&row, 2),
                parse_f64(&row, 3),
            ) {
                (Some(xmin), Some(ymin), Some(xmax), Some(ymax)) => {
                    let bounds = Bounds {
                        xmin,
                        ymin,
                        xmax,
                        ymax,
                    };
                    if bounds.is_valid() {
                        Some(bounds)
                    } else {
                        warn!(layer = %layer.name, "bounds probe returned an invalid extent");
                        None
                    }
                }
                // aggregate over zero rows: NULLs, treat as empty layer
                _ => Some(Bounds::WORLD),
            }
        }
        Ok(None) => Some(Bounds::WORLD),
        Err(err) => {
            warn!(layer = %layer.name, error = %err, "bounds probe failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_names_qualify_outside_the_default_schema() {
        assert_eq!(public_name("main", "roads"), "roads");
        assert_eq!(public_name("archive", "roads"), "archive.roads");
    }

    #[test]
    fn identifier_quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "it''s");
    }

    #[test]
    fn srid_normalization() {
        assert_eq!(normalize_srid(0), 4326);
        assert_eq!(normalize_srid(-1), 4326);
        assert_eq!(normalize_srid(3857), 3857);
    }
}
