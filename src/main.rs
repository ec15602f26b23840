use clap::{ArgAction, Parser, Subcommand};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use szar::archive::{Archive, PackOptions};
use szar::codec::{method_name, CodecId};
use szar::header::{MetadataParser, ParsedHeader, StandardParser};
use szar::locator::locate;
use szar::signature::{SignatureHeader, LOCATOR_OFFSET};

#[derive(Parser)]
#[command(name = "szar", version, about = "Self-indexing archive CLI")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack one or more files into an archive
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// Codec: zstd (default), lzma, lz4, brotli, copy
        #[arg(short, long, default_value = "zstd")]
        codec: String,
        /// Compression level (zstd 1-19; brotli 0-11; ignored otherwise)
        #[arg(short, long, default_value = "3")]
        level: i32,
        /// Combine all inputs into a single solid folder
        #[arg(short, long)]
        solid: bool,
        /// Store the header blob uncompressed
        #[arg(long)]
        plain_header: bool,
        /// Codec used to pack the header blob
        #[arg(long, default_value = "lzma")]
        header_codec: String,
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// Unpack an archive
    Unpack {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// List archive contents
    List {
        input: PathBuf,
    },
    /// Show signature header and locator details
    Info {
        input: PathBuf,
    },
    /// Decode every folder and verify every entry checksum
    Test {
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let default_filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    match cli.command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, codec, level, solid, plain_header, header_codec, input } => {
            let codec_id = parse_codec(&codec);
            let opts = PackOptions {
                default_codec: codec_id,
                level,
                header_codec:  if plain_header { None } else { Some(parse_codec(&header_codec)) },
                ..PackOptions::default()
            };
            let mut ar = Archive::create_path(&output, opts)?;
            let mut pack = ar.compressor()?;
            if solid { pack.begin_solid(codec_id)?; }
            for path in &input {
                let data = std::fs::read(path)?;
                pack.add_file(&entry_name(path), &data)?;
                println!("  packed  {}", path.display());
            }
            pack.finalize()?;
            println!("Created: {}", output.display());
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir } => {
            let mut ar = Archive::open_path(&input)?;
            ar.extractor()?.extract_all(&output_dir)?;
            println!("Unpacked to: {}", output_dir.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input } => {
            let ar = Archive::open_path(&input)?;
            let index = ar.index().ok_or("archive has no index")?;
            println!("Archive: {}", input.display());
            println!("{:<32} {:>12} {:>7} {:>10}", "Name", "Size", "Folder", "CRC");
            for e in &index.entries {
                let folder = e.folder.map(|f| f.to_string()).unwrap_or_else(|| "-".into());
                let crc = e.crc.map(|c| format!("{c:08x}")).unwrap_or_else(|| "-".into());
                println!("{:<32} {:>12} {:>7} {:>10}", e.name, e.size, folder, crc);
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            // Read the signature header and blob directly for low-level fields.
            let mut f = File::open(&input)?;
            let sb = SignatureHeader::read(&mut f)?;
            let blob = locate(&mut f, &sb)?;
            let encoding = match StandardParser.parse(&blob)? {
                ParsedHeader::Structured(_) => "plain".to_owned(),
                ParsedHeader::Encoded(coding) => coding.folders.first()
                    .map(|folder| {
                        let chain: Vec<String> = folder.coders.iter().map(|c| method_name(c.method)).collect();
                        format!("encoded ({}, {} -> {} B)", chain.join("+"), folder.pack_size, folder.unpack_size)
                    })
                    .unwrap_or_else(|| "encoded (no folder)".into()),
            };
            f.seek(SeekFrom::Start(0))?;
            let ar = {
                let mut ar = Archive::new(f);
                ar.open()?;
                ar
            };
            let index = ar.index().ok_or("archive has no index")?;

            println!("── Archive ─────────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Format version {}.{}", sb.version_major, sb.version_minor);
            println!("  Locator        {}", hex::encode(&sb.to_bytes()[LOCATOR_OFFSET..]));
            println!("  Locator CRC    {:08x}", sb.locator_crc);
            println!("  Header offset  {} B (+32)", sb.locator.blob_offset);
            println!("  Header size    {} B", sb.locator.blob_size);
            println!("  Header CRC     {:08x}", sb.locator.blob_crc);
            println!("  Header         {}", encoding);
            println!("  Folders        {}", index.folders.len());
            println!("  Entries        {}", index.entries.len());
        }

        // ── Test ─────────────────────────────────────────────────────────────
        Commands::Test { input } => {
            let mut ar = Archive::open_path(&input)?;
            let checked = ar.extractor()?.test()?;
            println!("OK: {} entr(ies) verified", checked);
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn parse_codec(s: &str) -> CodecId {
    CodecId::from_name(s).unwrap_or_else(|| {
        log::warn!("Unknown codec '{}', defaulting to zstd", s);
        CodecId::Zstd
    })
}
