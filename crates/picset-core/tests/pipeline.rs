//! End-to-end tests of `ImageGen::read_image` against real directories.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{Rgb, RgbImage};
use picset_core::pipeline::{EncodeParams, Hasher, ImageStats};
use picset_core::{
    GenOptions, ImageEngine, ImageGen, PicsetError, PipelineError, PipelineEvent, PipelineResult,
    VariantDefinition, VariantFormat,
};
use tempfile::TempDir;

/// Engine that fabricates output and records how it was used.
#[derive(Default)]
struct MockEngine {
    stat_calls: AtomicU32,
    renders: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    fail_format: Option<VariantFormat>,
    delay: Option<Duration>,
    stat_delay: Option<Duration>,
}

impl MockEngine {
    /// Track how many stat or render calls overlap.
    fn occupied<T>(&self, delay: Option<Duration>, work: impl FnOnce() -> T) -> T {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let result = work();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl ImageEngine for MockEngine {
    fn stat(&self, _source: &Path) -> PipelineResult<ImageStats> {
        self.stat_calls.fetch_add(1, Ordering::SeqCst);
        self.occupied(self.stat_delay, || {
            Ok(ImageStats {
                width: 1024,
                height: 768,
                channel_means: vec![100.0, 110.0, 120.0],
            })
        })
    }

    fn render(
        &self,
        source: &Path,
        definition: VariantDefinition,
        params: &EncodeParams,
    ) -> PipelineResult<Vec<u8>> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        self.occupied(self.delay, || ());

        if self.fail_format == Some(definition.format) {
            return Err(PipelineError::Encode {
                path: source.to_path_buf(),
                format: definition.format.to_string(),
                width: definition.width,
                message: "forced failure".to_string(),
            });
        }
        Ok(format!("{}@{}q{}", definition.format, definition.width, params.quality).into_bytes())
    }
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn out(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn cache(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    fn options(&self, widths: Vec<u32>, formats: Vec<VariantFormat>) -> GenOptions {
        GenOptions::new(self.out(), self.cache(), widths)
            .with_formats(formats)
            .with_rate_limit(10_000, Duration::from_millis(1))
    }

    /// Write a small PNG with a two-tone pattern.
    fn png(&self, name: &str, width: u32, height: u32) -> PathBuf {
        let path = self.dir.path().join(name);
        RgbImage::from_fn(width, height, |x, _| {
            if x % 2 == 0 {
                Rgb([200, 100, 0])
            } else {
                Rgb([0, 100, 200])
            }
        })
        .save(&path)
        .unwrap();
        path
    }

    fn output_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.out())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concrete_scenario_with_real_engine() {
    let fx = Fixture::new();
    let source = fx.png("cat.png", 400, 300);
    let options = fx.options(vec![100, 200], vec![VariantFormat::Jpeg]);
    let gen = ImageGen::new(options).unwrap();

    let record = gen.read_image(&source).await.unwrap();
    let key = Hasher::content_identity(&source).await.unwrap();

    assert_eq!(record.key, key);
    assert_eq!(record.filename, "cat.png");
    assert_eq!(record.metadata.width, 400);
    assert_eq!(record.metadata.height, 300);
    assert!((record.metadata.lightness - 100.0).abs() < 1e-9);

    let token1 = Hasher::options_token("w100:qjpeg:f80");
    let token2 = Hasher::options_token("w200:qjpeg:f80");
    assert_ne!(token1, token2);
    let name1 = format!("{key}.{token1}.w100.q80.jpeg");
    let name2 = format!("{key}.{token2}.w200.q80.jpeg");

    assert_eq!(record.matrix.len(), 2);
    assert_eq!(record.matrix[0].src, format!("/{name1}"));
    assert_eq!(record.matrix[1].src, format!("/{name2}"));

    let mut expected = vec![name1.clone(), name2];
    expected.sort();
    assert_eq!(fx.output_files(), expected);

    let small = image::open(fx.out().join(&name1)).unwrap();
    assert_eq!((small.width(), small.height()), (100, 75));

    let info = fx.cache().join(key.as_str()).join("info.json");
    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(info).unwrap()).unwrap();
    assert_eq!(stored["width"], 400);
    assert_eq!(stored["height"], 300);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_matrix_has_one_variant_per_cell() {
    let fx = Fixture::new();
    let source = fx.png("a.png", 8, 8);
    let engine = Arc::new(MockEngine::default());
    let formats = vec![VariantFormat::Jpeg, VariantFormat::Webp, VariantFormat::Avif];
    let gen = ImageGen::with_engine(fx.options(vec![320, 640, 1280], formats), engine.clone())
        .unwrap();

    let record = gen.read_image(&source).await.unwrap();

    let cells: Vec<(u32, VariantFormat)> =
        record.matrix.iter().map(|v| (v.width, v.format)).collect();
    let mut expected = Vec::new();
    for width in [320, 640, 1280] {
        for format in [VariantFormat::Jpeg, VariantFormat::Webp, VariantFormat::Avif] {
            expected.push((width, format));
        }
    }
    assert_eq!(cells, expected);
    assert_eq!(fx.output_files().len(), 9);
    assert_eq!(engine.renders.load(Ordering::SeqCst), 9);

    for variant in &record.matrix {
        let suffix = format!(".w{}.q80.{}", variant.width, variant.format);
        assert!(variant.src.starts_with(&format!("/{}.", record.key)));
        assert!(variant.src.ends_with(&suffix), "{} !~ {}", variant.src, suffix);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_read_is_fully_cached() {
    let fx = Fixture::new();
    let source = fx.png("a.png", 8, 8);
    let engine = Arc::new(MockEngine::default());
    let options = fx.options(vec![100, 200], vec![VariantFormat::Jpeg, VariantFormat::Webp]);
    let gen = ImageGen::with_engine(options, engine.clone()).unwrap();

    let first = gen.read_image(&source).await.unwrap();
    let snapshot: Vec<Vec<u8>> = fx
        .output_files()
        .iter()
        .map(|name| std::fs::read(fx.out().join(name)).unwrap())
        .collect();
    assert_eq!(engine.renders.load(Ordering::SeqCst), 4);

    let mut rx = gen.subscribe();
    let second = gen.read_image(&source).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(engine.renders.load(Ordering::SeqCst), 4);
    assert_eq!(engine.stat_calls.load(Ordering::SeqCst), 1);

    let after: Vec<Vec<u8>> = fx
        .output_files()
        .iter()
        .map(|name| std::fs::read(fx.out().join(name)).unwrap())
        .collect();
    assert_eq!(snapshot, after);

    let cached: Vec<bool> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::Transform { cached, .. } => Some(cached),
            _ => None,
        })
        .collect();
    assert_eq!(cached, vec![true; 4]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cache_survives_new_instance() {
    let fx = Fixture::new();
    let source = fx.png("a.png", 8, 8);
    let options = fx.options(vec![50], vec![VariantFormat::Jpeg]);

    let first_engine = Arc::new(MockEngine::default());
    let first = ImageGen::with_engine(options.clone(), first_engine.clone()).unwrap();
    let record = first.read_image(&source).await.unwrap();
    drop(first);

    let second_engine = Arc::new(MockEngine::default());
    let second = ImageGen::with_engine(options, second_engine.clone()).unwrap();
    assert_eq!(second.read_image(&source).await.unwrap(), record);

    assert_eq!(second_engine.stat_calls.load(Ordering::SeqCst), 0);
    assert_eq!(second_engine.renders.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_metadata_computed_once_per_content() {
    let fx = Fixture::new();
    let a = fx.png("a.png", 16, 16);
    let b = fx.dir.path().join("copy-of-a.png");
    std::fs::copy(&a, &b).unwrap();

    let engine = Arc::new(MockEngine::default());
    let gen = ImageGen::with_engine(fx.options(vec![64], vec![VariantFormat::Webp]), engine.clone())
        .unwrap();

    let first = gen.read_image(&a).await.unwrap();
    let second = gen.read_image(&b).await.unwrap();
    let third = gen.read_image(&a).await.unwrap();

    assert_eq!(first.key, second.key);
    assert_eq!(second.filename, "copy-of-a.png");
    assert_eq!(first.metadata, third.metadata);
    assert_eq!(engine.stat_calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.renders.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_first_reads_then_cached() {
    let fx = Fixture::new();
    let source = fx.png("a.png", 16, 16);
    let engine = Arc::new(MockEngine {
        delay: Some(Duration::from_millis(30)),
        ..MockEngine::default()
    });
    let options = fx.options(vec![100, 200], vec![VariantFormat::Jpeg]);
    let gen = ImageGen::with_engine(options, engine.clone()).unwrap();

    let (a, b) = tokio::join!(gen.read_image(&source), gen.read_image(&source));
    assert_eq!(a.unwrap(), b.unwrap());

    // Both first reads may compute metadata; duplicate encodes are collapsed.
    let stats_after_race = engine.stat_calls.load(Ordering::SeqCst);
    assert!((1..=2).contains(&stats_after_race));
    assert_eq!(engine.renders.load(Ordering::SeqCst), 2);

    gen.read_image(&source).await.unwrap();
    assert_eq!(engine.stat_calls.load(Ordering::SeqCst), stats_after_race);
    assert_eq!(engine.renders.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrency_ceiling_holds_across_variants() {
    let fx = Fixture::new();
    let source = fx.png("a.png", 8, 8);
    let engine = Arc::new(MockEngine {
        delay: Some(Duration::from_millis(20)),
        ..MockEngine::default()
    });
    let widths: Vec<u32> = (1..=9).map(|i| i * 100).collect();
    let options = fx
        .options(widths, vec![VariantFormat::Jpeg])
        .with_concurrency(3);
    let gen = ImageGen::with_engine(options, engine.clone()).unwrap();

    let record = gen.read_image(&source).await.unwrap();

    assert_eq!(record.matrix.len(), 9);
    let max = engine.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 3, "ceiling violated: {max} renders in flight");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_metadata_shares_the_concurrency_ceiling() {
    let fx = Fixture::new();
    let source = fx.png("a.png", 8, 8);
    let engine = Arc::new(MockEngine {
        delay: Some(Duration::from_millis(30)),
        stat_delay: Some(Duration::from_millis(30)),
        ..MockEngine::default()
    });
    let options = fx
        .options(vec![100, 200], vec![VariantFormat::Jpeg])
        .with_concurrency(1);
    let gen = ImageGen::with_engine(options, engine.clone()).unwrap();

    let record = gen.read_image(&source).await.unwrap();

    assert_eq!(record.matrix.len(), 2);
    assert_eq!(engine.stat_calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.renders.load(Ordering::SeqCst), 2);
    assert_eq!(
        engine.max_in_flight.load(Ordering::SeqCst),
        1,
        "metadata overlapped a render despite concurrency 1"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_one_failing_variant_fails_the_read() {
    let fx = Fixture::new();
    let source = fx.png("a.png", 8, 8);
    let engine = Arc::new(MockEngine {
        fail_format: Some(VariantFormat::Webp),
        ..MockEngine::default()
    });
    let options = fx.options(vec![100, 200], vec![VariantFormat::Jpeg, VariantFormat::Webp]);
    let gen = ImageGen::with_engine(options, engine.clone()).unwrap();

    let err = gen.read_image(&source).await.unwrap_err();
    match err {
        PicsetError::Pipeline(PipelineError::Encode { format, .. }) => assert_eq!(format, "webp"),
        other => panic!("expected encode failure, got {other}"),
    }

    // Give in-flight siblings time to land, then check they are intact.
    tokio::time::sleep(Duration::from_millis(100)).await;
    for name in fx.output_files() {
        assert!(name.ends_with(".jpeg"), "unexpected output {name}");
        let bytes = std::fs::read(fx.out().join(&name)).unwrap();
        assert!(bytes.starts_with(b"jpeg@"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_events_follow_matrix_order() {
    let fx = Fixture::new();
    let source = fx.png("a.png", 8, 8);
    let engine = Arc::new(MockEngine::default());
    let options = fx.options(vec![100, 200], vec![VariantFormat::Jpeg, VariantFormat::Webp]);
    let gen = ImageGen::with_engine(options, engine).unwrap();
    let mut rx = gen.subscribe();

    gen.read_image(&source).await.unwrap();
    let events = drain(&mut rx);

    assert_eq!(events[0], PipelineEvent::Initialized);
    assert!(matches!(&events[1], PipelineEvent::Read { filename } if filename.ends_with("a.png")));
    let transforms: Vec<(u32, VariantFormat, bool)> = events[2..]
        .iter()
        .map(|event| match event {
            PipelineEvent::Transform {
                width,
                format,
                cached,
                ..
            } => (*width, *format, *cached),
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(
        transforms,
        vec![
            (100, VariantFormat::Jpeg, false),
            (100, VariantFormat::Webp, false),
            (200, VariantFormat::Jpeg, false),
            (200, VariantFormat::Webp, false),
        ]
    );
}

#[tokio::test]
async fn test_missing_source_propagates_not_found() {
    let fx = Fixture::new();
    let gen = ImageGen::with_engine(
        fx.options(vec![100], vec![VariantFormat::Jpeg]),
        Arc::new(MockEngine::default()),
    )
    .unwrap();

    let err = gen
        .read_image(fx.dir.path().join("nope.png"))
        .await
        .unwrap_err();
    match err {
        PicsetError::Pipeline(e) => assert!(e.is_not_found()),
        other => panic!("expected pipeline error, got {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_custom_url_formatter() {
    let fx = Fixture::new();
    let source = fx.png("a.png", 8, 8);
    let options = fx
        .options(vec![100], vec![VariantFormat::Jpeg])
        .with_quality(65)
        .with_url(|name| format!("https://cdn.example.com/{name}"));
    let gen = ImageGen::with_engine(options, Arc::new(MockEngine::default())).unwrap();

    let record = gen.read_image(&source).await.unwrap();
    let src = &record.matrix[0].src;
    assert!(src.starts_with("https://cdn.example.com/"));
    assert!(src.ends_with(".w100.q65.jpeg"));
}
