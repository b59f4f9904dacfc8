// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic catalog-search usage example.
//!
//! Demonstrates:
//! 1. Connecting an engine over a throwaway SQLite catalog
//! 2. Loading a handful of materials
//! 3. Hybrid, single-strategy and cached searches
//! 4. SKU resolution with unit and color matching
//! 5. Health report and captured metrics
//!
//! No Docker needed. Set `REDIS_URL` to add the shared L2 tier.
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Instant;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

use catalog_search::sku::SkuRequest;
use catalog_search::{
    HybridSearchConfig, HybridSearchEngine, MaterialRecord, Registry, SearchMode, SearchQuery,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures everything the engine emits)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           catalog-search: Basic Usage Example                 ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and connect
    // ─────────────────────────────────────────────────────────────────────────
    let dir = tempfile::tempdir()?;
    let config = HybridSearchConfig {
        sql_url: Some(format!("sqlite://{}?mode=rwc", dir.path().join("catalog.db").display())),
        redis_url: std::env::var("REDIS_URL").ok(),
        redis_prefix: Some("catalog-demo:".into()),
        ..Default::default()
    };
    let redis = if config.redis_url.is_some() { " + Redis" } else { "" };
    println!("📦 Connecting (SQL + in-process vector store{redis})...");

    let registry = Arc::new(Registry::new(&config));
    let engine = HybridSearchEngine::connect(config, registry).await?;
    println!("   ✅ Engine ready: {:?}", engine.active_backends());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Load materials
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Loading materials...");
    let materials = [
        MaterialRecord::new("cem-500", "Portland cement M500").with_unit("kg").with_sku("CEM500"),
        MaterialRecord::new("cem-400", "Portland cement M400").with_unit("bag").with_sku("CEM400"),
        MaterialRecord::new("brick-red", "Ceramic brick")
            .with_unit("pcs")
            .with_color("red")
            .with_sku("BRK-R"),
        MaterialRecord::new("brick-white", "Ceramic brick")
            .with_unit("pcs")
            .with_color("white")
            .with_sku("BRK-W"),
        MaterialRecord::new("sand", "River sand").with_unit("t").with_sku("SAND-R"),
    ];
    for record in materials {
        let report = engine.upsert_material(record).await?;
        println!(
            "   └─ {} (vector: {}, sql: {})",
            report.record_id, report.vector, report.relational
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Search
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔍 Hybrid search: 'portland cement'");
    for attempt in ["live", "again"] {
        let start = Instant::now();
        let response = engine.search(SearchQuery::new("portland cement").limit(5)).await?;
        println!(
            "   ⏱️  {attempt}: {} results from {:?} in {:?}",
            response.total,
            response.source,
            start.elapsed()
        );
        for candidate in &response.candidates {
            println!(
                "   └─ {:<12} {:.3}  via {:?}",
                candidate.record_id, candidate.score, candidate.strategies
            );
        }
    }

    println!("\n🔍 Fuzzy search with a typo: 'cemment'");
    let fuzzy = engine.search(SearchQuery::new("cemment").mode(SearchMode::Fuzzy)).await?;
    for candidate in &fuzzy.candidates {
        println!("   └─ {:<12} {:.3}", candidate.record_id, candidate.score);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. SKU resolution
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🏷️  Resolving SKUs...");
    let requests = [
        SkuRequest::new("Portland cement M500", "кг"),
        SkuRequest::new("Ceramic brick", "шт").with_color("white"),
        SkuRequest::new("River sand", "m3"),
    ];
    for request in &requests {
        let resolution = engine.resolve_sku(request).await?;
        println!(
            "   └─ {} [{}] → {} ({}, {}/{} matched)",
            request.name,
            request.unit,
            resolution.sku.as_deref().unwrap_or("-"),
            resolution.status.as_str(),
            resolution.matched,
            resolution.evaluated
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Health and metrics
    // ─────────────────────────────────────────────────────────────────────────
    let report = engine.health_report().await;
    println!("\n🩺 Health: {}", report.overall);
    for backend in &report.backends {
        println!("   └─ {}: {:?}", backend.backend, backend.status);
    }

    let l1 = engine.l1_stats();
    println!("\n📊 L1 cache: {} entries, hit rate {:.0}%", l1.entries, l1.hit_rate * 100.0);

    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");
    Ok(())
}

/// Dump captured metrics, sorted by name
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> =
                key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let labels = if labels.is_empty() {
                String::new()
            } else {
                format!("{{{}}}", labels.join(","))
            };
            let rendered = match value {
                DebugValue::Counter(v) => v.to_string(),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => {
                    let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                    format!("count={} sum={:.4}", samples.len(), sum)
                }
            };
            format!("{}{} = {}", key.name(), labels, rendered)
        })
        .collect();
    lines.sort();
    for line in lines {
        println!("   └─ {line}");
    }
}
