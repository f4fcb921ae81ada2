//! Core value types describing servable spatial layers.

use serde::{Deserialize, Serialize};

/// Where a layer's rows come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Table,
    Function,
}

impl LayerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerKind::Table => "table",
            LayerKind::Function => "function",
        }
    }
}

/// Axis-aligned extent in layer coordinates, `[xmin, ymin] .. [xmax, ymax]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Bounds {
    pub const WORLD: Bounds = Bounds {
        xmin: -180.0,
        ymin: -90.0,
        xmax: 180.0,
        ymax: 90.0,
    };

    pub fn is_valid(&self) -> bool {
        self.xmin.is_finite()
            && self.ymin.is_finite()
            && self.xmax.is_finite()
            && self.ymax.is_finite()
            && self.xmin <= self.xmax
            && self.ymin <= self.ymax
    }
}

/// One non-geometry attribute column exposed by a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A servable spatial layer discovered from the database.
///
/// `name` is the unique public identifier: the bare object name when the
/// object lives in the default schema, otherwise `schema.name`. `bounds`
/// starts empty and is filled in lazily by the catalog on first detail
/// access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub kind: LayerKind,
    pub schema: String,
    pub object_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub geometry_column: String,
    pub geometry_type: String,
    pub srid: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    pub properties: Vec<Column>,
}

impl Layer {
    /// Schema-qualified, quoted identifier for use in probe SQL.
    pub fn qualified_source(&self) -> String {
        format!(
            "\"{}\".\"{}\"",
            self.schema.replace('"', "\"\""),
            self.object_name.replace('"', "\"\"")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_kind_serializes_lowercase() {
        let json = serde_json::to_string(&LayerKind::Function).unwrap();
        assert_eq!(json, "\"function\"");
    }

    #[test]
    fn bounds_validity() {
        assert!(Bounds::WORLD.is_valid());
        let inverted = Bounds {
            xmin: 10.0,
            ymin: 0.0,
            xmax: -10.0,
            ymax: 1.0,
        };
        assert!(!inverted.is_valid());
        let nan = Bounds {
            xmin: f64::NAN,
            ymin: 0.0,
            xmax: 0.0,
            ymax: 0.0,
        };
        assert!(!nan.is_valid());
    }

    #[test]
    fn qualified_source_escapes_quotes() {
        let layer = Layer {
            name: "odd.name".into(),
            kind: LayerKind::Table,
            schema: "odd".into(),
            object_name: "na\"me".into(),
            description: String::new(),
            geometry_column: "geom".into(),
            geometry_type: "GEOMETRY".into(),
            srid: 4326,
            bounds: None,
            properties: vec![],
        };
        assert_eq!(layer.qualified_source(), "\"odd\".\"na\"\"me\"");
    }

    #[test]
    fn bounds_omitted_from_json_until_computed() {
        let layer = Layer {
            name: "roads".into(),
            kind: LayerKind::Table,
            schema: "main".into(),
            object_name: "roads".into(),
            description: String::new(),
            geometry_column: "geom".into(),
            geometry_type: "LINESTRING".into(),
            srid: 4326,
            bounds: None,
            properties: vec![Column::new("id", "BIGINT")],
        };
        let json = serde_json::to_value(&layer).unwrap();
        assert!(json.get("bounds").is_none());
        assert_eq!(json["kind"], "table");
        assert_eq!(json["properties"][0]["type"], "BIGINT");
    }
}
