//! wadforge CLI
//!
//! Command-line interface for format detection, archive listing, extraction
//! and repacking, and image conversion.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};

use wadforge_formats::compression::Level;
use wadforge_formats::logging::{self, TracingConfig};
use wadforge_formats::{
    classify_archive, Archive, ConvertOptions, OpenOptions, Palette, TransparencyMode, TreeNode, WriteOptions,
    BUILTIN,
};

/// wadforge - legacy game data toolkit
#[derive(Parser)]
#[command(name = "wadforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format for structured data
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {s}")),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Identify the format of a file
    Detect(DetectArgs),

    /// List the entries of an archive
    List(ListArgs),

    /// Extract entries from an archive
    Extract(ExtractArgs),

    /// Rewrite an archive in its own format
    Repack(RepackArgs),

    /// Show the header information of an image
    ImageInfo(ImageInfoArgs),

    /// Convert an image to another image format
    Convert(ConvertArgs),

    /// List every registered format
    Formats,
}

#[derive(Args)]
struct DetectArgs {
    /// File to inspect
    path: PathBuf,

    /// Show every matching format, not just the best
    #[arg(long)]
    all: bool,
}

#[derive(Args)]
struct ListArgs {
    /// Path to the archive
    archive: PathBuf,

    /// Filter by path pattern (`*` wildcards)
    #[arg(short, long)]
    pattern: Option<String>,

    /// Detect the format of every entry
    #[arg(short, long)]
    classify: bool,
}

#[derive(Args)]
struct ExtractArgs {
    /// Path to the archive
    archive: PathBuf,

    /// Output directory
    #[arg(short, long)]
    output: PathBuf,

    /// Filter by path pattern (`*` wildcards)
    #[arg(short, long)]
    pattern: Option<String>,

    /// Overwrite existing files
    #[arg(long)]
    overwrite: bool,

    /// Show what would be extracted
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct RepackArgs {
    /// Path to the archive
    archive: PathBuf,

    /// Output file
    #[arg(short, long)]
    output: PathBuf,

    /// Compression level for recompressed entries (0-9)
    #[arg(long, default_value = "6")]
    level: u8,
}

#[derive(Args)]
struct ImageInfoArgs {
    /// Image file
    path: PathBuf,
}

#[derive(Args)]
struct ConvertArgs {
    /// Source image
    input: PathBuf,

    /// Target codec id (see `formats`)
    #[arg(long)]
    to: String,

    /// Output file
    #[arg(short, long)]
    output: PathBuf,

    /// PLAYPAL or raw 768-byte palette used for paletted targets
    #[arg(long)]
    palette: Option<PathBuf>,

    /// Alpha below this is transparent when reducing to a palette
    #[arg(long, default_value = "128")]
    alpha_threshold: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_with_config(TracingConfig::for_verbosity(cli.verbose));

    match cli.command {
        Commands::Detect(args) => cmd_detect(args, cli.format),
        Commands::List(args) => cmd_list(args, cli.format),
        Commands::Extract(args) => cmd_extract(args),
        Commands::Repack(args) => cmd_repack(args),
        Commands::ImageInfo(args) => cmd_image_info(args, cli.format),
        Commands::Convert(args) => cmd_convert(args),
        Commands::Formats => cmd_formats(cli.format),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn open_archive(path: &Path) -> Result<Archive> {
    info!("Opening archive: {:?}", path);
    let data = read_file(path)?;
    let mut options = OpenOptions::default();
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        options = options.with_name_hint(name);
    }
    BUILTIN
        .archives
        .open(data, options, None)
        .with_context(|| format!("Failed to open archive {}", path.display()))
}

fn cmd_detect(args: DetectArgs, format: OutputFormat) -> Result<()> {
    let data = read_file(&args.path)?;
    let matches: Vec<_> = if args.all {
        BUILTIN.formats.detect_all(&data)
    } else {
        let best = BUILTIN.formats.detect_with_confidence(&data);
        vec![(best.descriptor, best.confidence)]
    };

    match format {
        OutputFormat::Json => {
            let json: Vec<_> = matches
                .iter()
                .map(|(descriptor, confidence)| {
                    serde_json::json!({
                        "id": descriptor.id,
                        "name": descriptor.name,
                        "category": descriptor.category,
                        "confidence": confidence,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            if matches.is_empty() {
                println!("{}: unknown", args.path.display());
            }
            for (descriptor, confidence) in &matches {
                println!(
                    "{}: {} ({}, {}) [{}]",
                    args.path.display(),
                    descriptor.id,
                    descriptor.name,
                    descriptor.category,
                    confidence
                );
            }
        }
    }
    Ok(())
}

fn cmd_list(args: ListArgs, format: OutputFormat) -> Result<()> {
    let mut archive = open_archive(&args.archive)?;
    if args.classify {
        let recognised = classify_archive(&mut archive)?;
        debug!(recognised, "classified entries");
    }

    let entries: Vec<_> = match args.pattern {
        Some(ref pattern) => archive.find(pattern),
        None => archive
            .walk()
            .into_iter()
            .filter_map(|node| match node {
                TreeNode::File { path, entry, .. } => Some((path, entry)),
                TreeNode::Folder { .. } => None,
            })
            .collect(),
    };

    match format {
        OutputFormat::Json => {
            let json: Vec<_> = entries
                .iter()
                .map(|(path, entry)| {
                    serde_json::json!({
                        "path": path,
                        "size": entry.size(),
                        "size_on_disk": entry.size_on_disk,
                        "offset": entry.offset_on_disk,
                        "format": entry.format_id,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("{:<12} {:<12} {:<12} Path", "Size", "Stored", "Type");
            println!("{:-<12} {:-<12} {:-<12} {:-<40}", "", "", "", "");
            for (path, entry) in &entries {
                println!(
                    "{:<12} {:<12} {:<12} {}",
                    format_size(entry.size()),
                    format_size(entry.size_on_disk),
                    entry.format_id.as_deref().unwrap_or("-"),
                    path
                );
            }
            let stats = archive.statistics();
            println!(
                "\nTotal: {} entries ({} markers), {} in {} directories",
                stats.total_entries,
                stats.marker_count,
                format_size(stats.total_size),
                stats.directory_count
            );
        }
    }
    Ok(())
}

/// Join an archive path under `root`, refusing anything that escapes it
fn output_path(root: &Path, entry_path: &str) -> Result<PathBuf> {
    let relative = Path::new(entry_path);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        bail!("Refusing to extract unsafe path: {entry_path}");
    }
    Ok(root.join(relative))
}

fn cmd_extract(args: ExtractArgs) -> Result<()> {
    let archive = open_archive(&args.archive)?;

    let selected: Vec<_> = match args.pattern {
        Some(ref pattern) => archive.find(pattern),
        None => archive
            .walk()
            .into_iter()
            .filter_map(|node| match node {
                TreeNode::File { path, entry, .. } => Some((path, entry)),
                TreeNode::Folder { .. } => None,
            })
            .collect(),
    };
    info!("Found {} entries to extract", selected.len());

    // WADs repeat lump names; later copies get a numeric suffix
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut targets = Vec::with_capacity(selected.len());
    for (path, entry) in selected {
        let count = seen.entry(path.to_lowercase()).or_insert(0);
        let unique = if *count == 0 { path.clone() } else { format!("{path}.{count}") };
        *count += 1;
        targets.push((unique, entry));
    }

    if args.dry_run {
        println!("Dry run - would extract {} entries:", targets.len());
        for (path, _) in &targets {
            println!("  {path}");
        }
        return Ok(());
    }

    fs::create_dir_all(&args.output).context("Failed to create output directory")?;

    let (mut extracted, mut skipped, mut errors) = (0usize, 0usize, 0usize);
    for (path, entry) in targets {
        let destination = output_path(&args.output, &path)?;
        if destination.exists() && !args.overwrite {
            debug!("Skipping existing file: {:?}", destination);
            skipped += 1;
            continue;
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        match archive.payload(entry) {
            Ok(data) => {
                fs::write(&destination, &data)
                    .with_context(|| format!("Failed to write {}", destination.display()))?;
                extracted += 1;
                debug!("Extracted: {}", path);
            }
            Err(e) => {
                warn!("Failed to extract {}: {}", path, e);
                errors += 1;
            }
        }
    }

    println!("Extraction complete:");
    println!("  Extracted: {extracted}");
    println!("  Skipped:   {skipped}");
    println!("  Errors:    {errors}");
    Ok(())
}

fn cmd_repack(args: RepackArgs) -> Result<()> {
    let archive = open_archive(&args.archive)?;
    let options = WriteOptions {
        compression_level: Level::new(args.level),
    };
    let bytes = archive
        .write(&options)
        .with_context(|| format!("Failed to write {} archive", archive.format().id()))?;
    fs::write(&args.output, &bytes).with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!(
        "Wrote {} entries to {} ({})",
        archive.entry_count(),
        args.output.display(),
        format_size(bytes.len() as u64)
    );
    Ok(())
}

fn cmd_image_info(args: ImageInfoArgs, format: OutputFormat) -> Result<()> {
    let data = read_file(&args.path)?;
    let Some((codec, confidence)) = BUILTIN.images.detect(&data) else {
        bail!("{} is not a recognised image", args.path.display());
    };
    let info = codec
        .info(&data)
        .with_context(|| format!("Failed to read {} header", codec.name()))?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "codec": codec.id(),
                "name": codec.name(),
                "confidence": confidence,
                "info": info,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("{}: {} [{}]", args.path.display(), codec.name(), confidence);
            println!("  Size:    {}x{}", info.width, info.height);
            println!("  Format:  {}", info.format);
            println!("  Offsets: {}, {}", info.offset_x, info.offset_y);
        }
    }
    Ok(())
}

fn load_palette(path: &Path) -> Result<Palette> {
    let data = read_file(path)?;
    Palette::from_playpal(&data).with_context(|| format!("Failed to read palette {}", path.display()))
}

fn cmd_convert(args: ConvertArgs) -> Result<()> {
    let data = read_file(&args.input)?;
    let image = BUILTIN
        .images
        .decode(&data)
        .with_context(|| format!("Failed to decode {}", args.input.display()))?;
    let target = BUILTIN
        .images
        .get(&args.to)
        .with_context(|| format!("No image codec named '{}'", args.to))?;

    let palette = args.palette.as_deref().map(load_palette).transpose()?.map(Arc::new);
    let mut options = ConvertOptions::default().with_transparency(TransparencyMode::AlphaThreshold(args.alpha_threshold));
    if let Some(ref palette) = palette {
        options = options.with_palette(Arc::clone(palette));
    }

    let writable = target
        .convert_writable(&image, &options)
        .with_context(|| format!("Cannot convert to {}", target.name()))?;
    let bytes = target.encode(&writable, palette.as_deref())?;
    fs::write(&args.output, &bytes).with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!(
        "Converted {}x{} {} image to {} ({})",
        image.width(),
        image.height(),
        image.format(),
        target.name(),
        format_size(bytes.len() as u64)
    );
    Ok(())
}

fn cmd_formats(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json: Vec<_> = BUILTIN
                .formats
                .list()
                .map(|d| {
                    serde_json::json!({
                        "id": d.id,
                        "name": d.name,
                        "category": d.category,
                        "reliability": d.reliability,
                        "extensions": d.extensions,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("{:<14} {:<10} {:>4}  Name", "Id", "Category", "Rel");
            println!("{:-<14} {:-<10} {:->4}  {:-<30}", "", "", "", "");
            for d in BUILTIN.formats.list() {
                println!("{:<14} {:<10} {:>4}  {}", d.id, d.category.to_string(), d.reliability, d.name);
            }
        }
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
