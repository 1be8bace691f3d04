//! pagepair CLI — pair overlay page images onto original page images.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use pagepair::homography::matrix3_to_array;
use pagepair::{
    AlignmentOracle, DirectorySink, EventLog, FeatureAligner, IngestOptions, JobOrder, OrderSpec,
    PageClass, PageImages, PairingConfig, PairingEngine, PairingJob, Preprocessor, RawPage,
    ReadingDirection,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "pagepair")]
#[command(about = "Warp translated/annotated pages onto the original pages they depict")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pair a directory of overlay pages onto a directory of original pages.
    Pair(CliPairArgs),

    /// Align a single overlay image onto a single original image.
    Align(CliAlignArgs),

    /// Classify an image and show how it would be normalized.
    Classify {
        /// Path to the input image.
        #[arg(long)]
        image: PathBuf,

        /// Do not split spreads.
        #[arg(long)]
        no_split: bool,

        /// Do not crop uniform borders.
        #[arg(long)]
        no_crop: bool,

        /// Append the left half of a split spread first.
        #[arg(long)]
        left_to_right: bool,
    },
}

#[derive(Debug, Clone, Args)]
struct CliPairArgs {
    /// Directory of original page images.
    #[arg(long)]
    originals: PathBuf,

    /// Directory of overlay page images.
    #[arg(long)]
    overlays: PathBuf,

    /// Output directory (receives out_orig/ and out_transl/).
    #[arg(long)]
    out: PathBuf,

    /// Pairing configuration (JSON). Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target pixel count per page for downscaling (0 disables).
    #[arg(long)]
    resize: Option<u64>,

    /// Do not split spreads.
    #[arg(long)]
    no_split: bool,

    /// Do not crop uniform borders.
    #[arg(long)]
    no_crop: bool,

    /// Append the left half of a split spread first.
    #[arg(long)]
    left_to_right: bool,

    /// Maximum features per image handed to the aligner.
    #[arg(long)]
    feature_budget: Option<usize>,

    /// Originals tried per overlay, from the front of the buffer.
    #[arg(long)]
    search_range: Option<usize>,

    /// Regex ordering originals by named groups int0/string0, int1/string1, ...
    #[arg(long)]
    order_originals: Option<String>,

    /// Regex ordering overlays by named groups int0/string0, int1/string1, ...
    #[arg(long)]
    order_overlays: Option<String>,

    /// Path to write the job report (JSON).
    #[arg(long)]
    report: Option<PathBuf>,

    /// Path to write every engine event (JSON).
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct CliAlignArgs {
    /// Overlay image.
    #[arg(long)]
    overlay: PathBuf,

    /// Original image.
    #[arg(long)]
    original: PathBuf,

    /// Path to write the warped overlay (PNG).
    #[arg(long)]
    out: PathBuf,

    /// Maximum features per image.
    #[arg(long, default_value_t = pagepair::DEFAULT_FEATURE_BUDGET)]
    feature_budget: usize,

    /// Pairing configuration (JSON); only the aligner section is used.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn apply_ingest_flags(options: &mut IngestOptions, args: &CliPairArgs) {
    if let Some(resize) = args.resize {
        options.resize_target = resize;
    }
    if args.no_split {
        options.split = false;
    }
    if args.no_crop {
        options.crop = false;
    }
    if args.left_to_right {
        options.reading_direction = ReadingDirection::LeftToRight;
    }
}

impl CliPairArgs {
    fn to_config(&self) -> CliResult<PairingConfig> {
        let mut config = load_config(self.config.as_deref())?;
        apply_ingest_flags(&mut config.original, self);
        apply_ingest_flags(&mut config.overlay, self);
        if let Some(budget) = self.feature_budget {
            config.feature_budget = budget;
        }
        if let Some(range) = self.search_range {
            if range == 0 {
                return Err("--search-range must be at least 1".into());
            }
            config.search_range = range;
        }
        Ok(config)
    }

    fn to_order(&self) -> JobOrder {
        let spec = |pattern: &Option<String>| match pattern {
            Some(p) => OrderSpec::Regex(p.clone()),
            None => OrderSpec::Lexicographic,
        };
        JobOrder {
            originals: spec(&self.order_originals),
            overlays: spec(&self.order_overlays),
        }
    }
}

fn load_config(path: Option<&Path>) -> CliResult<PairingConfig> {
    match path {
        Some(path) => {
            tracing::info!("Loading config: {}", path.display());
            Ok(PairingConfig::from_json_file(path)?)
        }
        None => Ok(PairingConfig::default()),
    }
}

fn open_rgba(path: &Path) -> CliResult<image::RgbaImage> {
    let img = image::open(path).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", path.display(), e).into()
    })?;
    Ok(img.to_rgba8())
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Pair(args) => run_pair(&args),
        Commands::Align(args) => run_align(&args),
        Commands::Classify {
            image,
            no_split,
            no_crop,
            left_to_right,
        } => run_classify(&image, !no_split, !no_crop, left_to_right),
    }
}

// ── pair ───────────────────────────────────────────────────────────────

fn run_pair(args: &CliPairArgs) -> CliResult<()> {
    let job = PairingJob {
        originals_dir: args.originals.clone(),
        overlays_dir: args.overlays.clone(),
        output_dir: args.out.clone(),
        config: args.to_config()?,
        order: args.to_order(),
    };

    let sink = DirectorySink::create(&job.output_dir)?;
    let events = EventLog::new();
    let mut engine = PairingEngine::from_config(&job.config, sink);
    if args.events.is_some() {
        engine = engine.with_observer(events.clone());
    }

    let report = job.run_with(&mut engine)?;
    tracing::info!(
        "{} original page(s), {} overlay page(s), {} written, {} unresolved",
        report.original_pages,
        report.overlay_pages,
        report.pages_written,
        report.unresolved_overlays()
    );

    if let Some(path) = &args.report {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!("Report written to {}", path.display());
    }
    if let Some(path) = &args.events {
        std::fs::write(path, serde_json::to_string_pretty(&events.events())?)?;
        tracing::info!("{} event(s) written to {}", events.len(), path.display());
    }

    Ok(())
}

// ── align ──────────────────────────────────────────────────────────────

fn run_align(args: &CliAlignArgs) -> CliResult<()> {
    let config = load_config(args.config.as_deref())?;
    let overlay = PageImages::from_color(open_rgba(&args.overlay)?);
    let original = PageImages::from_color(open_rgba(&args.original)?);
    tracing::info!(
        "Aligning {:?} {}x{} onto {:?} {}x{}",
        overlay.class(),
        overlay.dimensions().0,
        overlay.dimensions().1,
        original.class(),
        original.dimensions().0,
        original.dimensions().1
    );

    let aligner = FeatureAligner::new(config.aligner);
    let alignment = aligner
        .align(&overlay, &original, args.feature_budget)
        .map_err(|e| -> CliError { format!("alignment rejected: {}", e).into() })?;

    println!("inliers:     {}", alignment.n_inliers);
    println!("area ratio:  {:.4}", alignment.area_ratio);
    println!(
        "homography:  {}",
        serde_json::to_string(&matrix3_to_array(&alignment.homography))?
    );

    alignment.warped.save(&args.out)?;
    tracing::info!("Warped overlay written to {}", args.out.display());
    Ok(())
}

// ── classify ───────────────────────────────────────────────────────────

fn run_classify(image: &Path, split: bool, crop: bool, left_to_right: bool) -> CliResult<()> {
    let rgba = open_rgba(image)?;
    let (w, h) = rgba.dimensions();
    let options = IngestOptions {
        resize_target: 0,
        split,
        crop,
        reading_direction: if left_to_right {
            ReadingDirection::LeftToRight
        } else {
            ReadingDirection::RightToLeft
        },
    };
    let pages = Preprocessor.normalize(RawPage::from_image(&rgba), &options)?;

    let label = |c: PageClass| match c {
        PageClass::Single => "single",
        PageClass::Double => "double",
    };
    println!(
        "{}: {}x{} {}",
        image.display(),
        w,
        h,
        label(PageClass::of_dimensions(w, h))
    );
    for (i, page) in pages.iter().enumerate() {
        let (pw, ph) = page.dimensions();
        println!("  page {}: {}x{} {}", i, pw, ph, label(page.class()));
    }
    Ok(())
}
