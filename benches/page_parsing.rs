//! Performance benchmarks for the parser and the library
//!
//! - Parsing a large multi-part model
//! - Writing it back as canonical source
//! - Building the library index over a generated parts folder
//! - Resolving a model against a warm cache
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ldraw_core::{
    codec::{no_progress, DocumentParser, PageWriter},
    config::LibraryConfig,
    library::{LibraryIndex, SearchPath},
    service::LibraryService,
};
use std::path::PathBuf;
use tempfile::TempDir;

/// A model of `parts` sub-models, each with a header, a few steps and `bricks` references.
fn generate_model(parts: usize, bricks: usize) -> String {
    let mut source = String::new();
    source.push_str("0 FILE main.ldr\n0 Generated model\n0 Name: main.ldr\n0 !LDRAW_ORG Model\n");
    for i in 0..parts {
        source.push_str(&format!("1 {} {} 0 0 1 0 0 0 1 0 0 0 1 sub{i}.ldr\n", i % 16, i * 20));
    }
    for i in 0..parts {
        source.push_str(&format!("0 FILE sub{i}.ldr\n0 Sub-model {i}\n0 BFC CERTIFY CCW\n"));
        for j in 0..bricks {
            if j % 8 == 7 {
                source.push_str("0 STEP\n");
            }
            source.push_str(&format!(
                "1 4 {} -24 {} 0 0 1 0 1 0 -1 0 0 300{}.dat\n",
                j * 20,
                j * 10,
                j % 4
            ));
            source.push_str("2 24 0 0 0 20 0 0\n3 16 0 0 0 1 0 0 0 1 0\n");
        }
    }
    source
}

fn setup_library(files: usize) -> Result<(TempDir, PathBuf), Box<dyn std::error::Error>> {
    let tempdir = TempDir::new()?;
    let root = tempdir.path().join("ldraw");
    std::fs::create_dir_all(root.join("parts/s"))?;
    std::fs::create_dir_all(root.join("p"))?;
    for i in 0..files {
        std::fs::write(
            root.join(format!("parts/{i}.dat")),
            format!("0 Brick {i}\n0 Name: {i}.dat\n0 !LDRAW_ORG Part\n1 16 0 0 0 1 0 0 0 1 0 0 0 1 box.dat\n"),
        )?;
    }
    std::fs::write(root.join("p/box.dat"), "0 Box\n0 !LDRAW_ORG Primitive\n4 16 1 1 1 -1 1 1 -1 1 -1 1 1 -1\n")?;
    Ok((tempdir, root))
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_model");
    for (parts, bricks) in [(4, 50), (32, 200)] {
        let source = generate_model(parts, bricks);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{parts}x{bricks}")),
            &source,
            |b, source| {
                b.iter(|| {
                    let document = DocumentParser::parse(source, None, &mut no_progress).unwrap();
                    document.pages().len()
                });
            },
        );
    }
    group.finish();
}

fn bench_write(c: &mut Criterion) {
    let document =
        DocumentParser::parse(&generate_model(32, 200), None, &mut no_progress).unwrap();
    c.bench_function("write_model", |b| {
        b.iter(|| PageWriter::write_document(&document).len());
    });
}

fn bench_index_build(c: &mut Criterion) {
    let (_tempdir, root) = setup_library(500).unwrap();
    c.bench_function("index_build_500", |b| {
        b.iter(|| LibraryIndex::build(SearchPath::new(vec![root.clone()])).unwrap().len());
    });
}

fn bench_resolve_warm(c: &mut Criterion) {
    let (tempdir, root) = setup_library(64).unwrap();
    let mut source = String::from("0 Model\n");
    for i in 0..64 {
        source.push_str(&format!("1 16 0 0 0 1 0 0 0 1 0 0 0 1 {i}.dat\n"));
    }
    let model = tempdir.path().join("model.ldr");
    std::fs::write(&model, source).unwrap();
    let service = LibraryService::new(LibraryConfig::new(vec![root])).unwrap();
    // Keep one document alive so every library part stays cached.
    let _warm = service.open(&model, &mut no_progress).unwrap();

    c.bench_function("resolve_warm_64", |b| {
        b.iter(|| {
            let document = service.open(&model, &mut no_progress).unwrap();
            service.resolver().resolve_all(&document).resolved
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(std::time::Duration::from_secs(10));
    targets =
        bench_parse,
        bench_write,
        bench_index_build,
        bench_resolve_warm
}

criterion_main!(benches);
