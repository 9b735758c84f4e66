//! The `picset generate` command: read images into srcset records.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use picset_core::{
    srcset, Config, DiscoveredFile, FileDiscovery, GenOptions, ImageGen, ImageMetadata,
    ImageRecord, OutputFormat as CoreOutputFormat, PipelineEvent, RecordWriter, SrcSet,
    VariantFormat,
};

/// Reads started ahead of the one currently being reported. Actual work is
/// still bounded by the pipeline's scheduler.
const READ_AHEAD: usize = 64;

/// Supported output formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON array
    Json,
    /// One JSON object per line (newline-delimited)
    Jsonl,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

/// Arguments for the `generate` command.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Image files or directories to read
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory variants are written to
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Directory for the metadata cache
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Target widths, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub widths: Option<Vec<u32>>,

    /// Target formats, comma-separated (jpeg, webp, avif)
    #[arg(long, value_delimiter = ',')]
    pub formats: Option<Vec<VariantFormat>>,

    /// Encode quality (0-100)
    #[arg(short, long)]
    pub quality: Option<u8>,

    /// Maximum encode jobs in flight
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Prefix prepended to variant filenames in `src`
    #[arg(long, env = "PICSET_URL_PREFIX")]
    pub url_prefix: Option<String>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Emit `src`/`srcSet` attribute values per format instead of full records
    #[arg(long)]
    pub srcset: bool,
}

impl GenerateArgs {
    /// Layer command-line values over the loaded configuration.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(out) = &self.out {
            config.output.dir = out.clone();
        }
        if let Some(cache) = &self.cache {
            config.cache.dir = cache.clone();
        }
        if let Some(widths) = &self.widths {
            config.variants.widths = widths.clone();
        }
        if let Some(formats) = &self.formats {
            config.variants.formats = formats.clone();
        }
        if let Some(quality) = self.quality {
            config.variants.quality = quality;
        }
        if let Some(concurrency) = self.concurrency {
            config.scheduler.concurrency = concurrency;
        }
        if let Some(prefix) = &self.url_prefix {
            config.output.url_prefix = prefix.clone();
        }
        if let Some(format) = self.format {
            config.output.format = format.to_string();
        }
        if self.pretty {
            config.output.pretty = true;
        }
    }
}

/// `src`/`srcSet` pairs for every format of one image.
#[derive(Debug, Serialize)]
struct SrcSetEntry<'a> {
    filename: &'a str,
    key: &'a str,
    #[serde(flatten)]
    metadata: &'a ImageMetadata,
    #[serde(flatten)]
    formats: BTreeMap<&'static str, SrcSet>,
}

impl<'a> SrcSetEntry<'a> {
    fn new(record: &'a ImageRecord, formats: &[VariantFormat]) -> Self {
        let formats = formats
            .iter()
            .filter_map(|&format| srcset(format, record).map(|set| (format.as_str(), set)))
            .collect();
        Self {
            filename: &record.filename,
            key: record.key.as_str(),
            metadata: &record.metadata,
            formats,
        }
    }
}

/// Variant counts gathered from the event stream.
#[derive(Default)]
struct VariantTally {
    encoded: AtomicU64,
    reused: AtomicU64,
    /// Events dropped because the listener fell behind
    missed: AtomicU64,
}

impl VariantTally {
    /// Record one receive result. Returns false once the stream is closed.
    fn observe(&self, received: Result<PipelineEvent, RecvError>) -> bool {
        match received {
            Ok(PipelineEvent::Transform { cached: true, .. }) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
            }
            Ok(PipelineEvent::Transform { cached: false, .. }) => {
                self.encoded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => {
                self.missed.fetch_add(missed, Ordering::Relaxed);
                tracing::warn!("Event listener lagged, {} event(s) not counted", missed);
            }
            Err(RecvError::Closed) => return false,
        }
        true
    }
}

/// Execute the generate command.
pub async fn execute(args: GenerateArgs, mut config: Config) -> anyhow::Result<()> {
    for input in &args.inputs {
        if !input.exists() {
            anyhow::bail!(
                "Input path does not exist: {:?}\n\n  Hint: Check the file path and try again.",
                input
            );
        }
    }

    args.apply_overrides(&mut config);
    let output_format = CoreOutputFormat::parse(&config.output.format).ok_or_else(|| {
        anyhow::anyhow!("Unsupported output format: {:?}", config.output.format)
    })?;

    let discovery = FileDiscovery::new(config.discovery.clone());
    let files: Vec<DiscoveredFile> = args
        .inputs
        .iter()
        .flat_map(|input| discovery.discover(input))
        .collect();

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = RecordWriter::new(sink, output_format, config.output.pretty);

    if files.is_empty() {
        tracing::warn!("No supported image files found in {:?}", args.inputs);
        writer.write_all::<ImageRecord>(&[])?;
        writer.finish()?;
        return Ok(());
    }
    tracing::info!("Found {} image(s) to read", files.len());

    let options = GenOptions::from_config(&config);
    tracing::debug!("Generation options: {:?}", options);
    let formats = options.formats.clone();
    let gen = ImageGen::new(options)?;

    let tally = Arc::new(VariantTally::default());
    let listener = spawn_tally(&gen, tally.clone());

    let progress = create_progress_bar(files.len() as u64)?;
    let start = Instant::now();
    let mut records: Vec<ImageRecord> = Vec::with_capacity(files.len());
    let mut failed: u64 = 0;
    let mut total_bytes: u64 = 0;

    let mut reads = stream::iter(&files)
        .map(|file| {
            let gen = &gen;
            async move { (file, gen.read_image(&file.path).await) }
        })
        .buffered(READ_AHEAD);

    while let Some((file, result)) = reads.next().await {
        match result {
            Ok(record) => {
                total_bytes += file.size;
                // JSONL streams as it goes; a JSON array needs every record first.
                match (output_format, args.srcset) {
                    (CoreOutputFormat::JsonLines, false) => writer.write(&record)?,
                    (CoreOutputFormat::JsonLines, true) => {
                        writer.write(&SrcSetEntry::new(&record, &formats))?
                    }
                    (CoreOutputFormat::Json, _) => records.push(record),
                }
            }
            Err(e) => {
                failed += 1;
                tracing::error!("Failed: {:?} - {}", file.path, e);
            }
        }

        progress.inc(1);
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            progress.set_message(format!("{:.1} img/sec", progress.position() as f64 / elapsed));
        }
    }
    drop(reads);

    if output_format == CoreOutputFormat::Json {
        if args.srcset {
            let entries: Vec<SrcSetEntry> = records
                .iter()
                .map(|record| SrcSetEntry::new(record, &formats))
                .collect();
            writer.write_all(&entries)?;
        } else {
            writer.write_all(&records)?;
        }
    }
    writer.finish()?;
    if let Some(path) = &args.output {
        tracing::info!("Output written to {:?}", path);
    }

    // Closing the pipeline ends the event stream once in-flight variants land.
    drop(gen);
    if listener.await.is_err() {
        tracing::debug!("Event listener ended abnormally");
    }
    progress.finish_and_clear();

    let summary = Summary {
        succeeded: files.len() as u64 - failed,
        failed,
        encoded: tally.encoded.load(Ordering::Relaxed),
        reused: tally.reused.load(Ordering::Relaxed),
        missed_events: tally.missed.load(Ordering::Relaxed),
        total_bytes,
        elapsed: start.elapsed(),
    };
    summary.print();

    if failed > 0 {
        anyhow::bail!("{} of {} image(s) failed", failed, files.len());
    }
    Ok(())
}

/// Count encoded and reused variants from the pipeline's transform events.
fn spawn_tally(gen: &ImageGen, tally: Arc<VariantTally>) -> tokio::task::JoinHandle<()> {
    let mut events = gen.subscribe();
    tokio::spawn(async move { while tally.observe(events.recv().await) {} })
}

/// Create a progress bar for a batch of reads.
fn create_progress_bar(total: u64) -> anyhow::Result<indicatif::ProgressBar> {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            )?
            .progress_chars("##-"),
    );
    pb.set_message("starting...");
    Ok(pb)
}

struct Summary {
    succeeded: u64,
    failed: u64,
    encoded: u64,
    reused: u64,
    missed_events: u64,
    total_bytes: u64,
    elapsed: Duration,
}

impl Summary {
    fn print(&self) {
        let secs = self.elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            self.succeeded as f64 / secs
        } else {
            0.0
        };
        let mb_read = self.total_bytes as f64 / 1_000_000.0;

        eprintln!();
        eprintln!("  ====================================");
        eprintln!("               Summary");
        eprintln!("  ====================================");
        eprintln!("    Succeeded:    {:>8}", self.succeeded);
        if self.failed > 0 {
            eprintln!("    Failed:       {:>8}", self.failed);
        }
        eprintln!("    Encoded:      {:>8}", self.encoded);
        eprintln!("    Reused:       {:>8}", self.reused);
        if self.missed_events > 0 {
            eprintln!("    Uncounted:    {:>8}", self.missed_events);
        }
        eprintln!("  ------------------------------------");
        eprintln!("    Source data:  {:>7.1} MB", mb_read);
        eprintln!("    Duration:     {:>7.1}s", secs);
        eprintln!("    Rate:         {:>7.1} img/sec", rate);
        eprintln!("  ====================================");
    }
}
