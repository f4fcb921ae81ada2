use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use metrics_util::debugging::DebuggingRecorder;
use strato::cache::{CacheConfig, CacheKey, OutputFormat, TileCache};
use strato::catalog::{Catalog, FilterPolicy};
use strato::infra::db::{Connection, ConnectionError, Row};

/// Answers each statement with the rows of the first contained needle.
struct CannedConnection {
    scripts: Vec<(&'static str, Vec<Row>)>,
}

impl Connection for CannedConnection {
    fn query(&self, sql: &str) -> Result<Vec<Row>, ConnectionError> {
        for (needle, rows) in &self.scripts {
            if sql.contains(needle) {
                return Ok(rows.clone());
            }
        }
        Ok(Vec::new())
    }
}

fn row(values: &[Option<&str>]) -> Row {
    values.iter().map(|v| v.map(str::to_string)).collect()
}

fn tile(layer: &str, z: u8, x: u32, y: u32) -> CacheKey {
    CacheKey::tile(layer, z, x, y, OutputFormat::Mvt)
}

#[test]
fn cache_and_catalog_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Store hit/miss/evict
    let cache = TileCache::new(CacheConfig {
        enabled: true,
        max_items: 1,
        max_memory_mb: 1,
    });
    assert!(cache.get(&tile("roads", 1, 0, 0)).is_none());
    cache
        .put(tile("roads", 1, 0, 0), Bytes::from_static(b"tile"))
        .expect("put should succeed");
    assert!(cache.get(&tile("roads", 1, 0, 0)).is_some());
    cache
        .put(tile("roads", 1, 0, 1), Bytes::from_static(b"tile"))
        .expect("put should evict the older entry");

    // Registry size gauge through a catalog build
    let conn = Arc::new(CannedConnection {
        scripts: vec![
            (
                "data_type = 'GEOMETRY'",
                vec![row(&[Some("main"), Some("roads"), Some("geom")])],
            ),
            ("duckdb_tables", vec![row(&[None])]),
            (
                "table_name = 'roads'",
                vec![row(&[Some("geom"), Some("GEOMETRY")])],
            ),
            (
                "ST_GeometryType",
                vec![row(&[Some("LINESTRING"), Some("4326")])],
            ),
        ],
    });
    Catalog::build(
        conn as Arc<dyn Connection>,
        FilterPolicy::new(vec![], vec![], vec![]),
    )
    .expect("catalog should build from scripted metadata");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "strato_cache_hit_total",
        "strato_cache_miss_total",
        "strato_cache_evict_total",
        "strato_catalog_layers",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
