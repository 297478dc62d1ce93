use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use compat_bsp::layout::lump_kind_at;
use compat_bsp::overlay::{write_lump_file, LumpFileHeader};
use compat_bsp::visibility::row_bit;
use compat_bsp::{detect_with_key, Bsp, ReaderOptions};
use tracing_subscriber::EnvFilter;

const EXIT_SUCCESS: i32 = 0;
const EXIT_USAGE: i32 = 2;
const EXIT_CONFIG: i32 = 10;
const EXIT_READ: i32 = 11;
const EXIT_LUMP: i32 = 12;
const EXIT_WRITE: i32 = 13;

#[derive(Parser)]
#[command(name = "bsptool", version, about = "Inspect and rewrite BSP map files")]
struct Cli {
    /// Reader options file (TOML).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Raise log output; repeat for more.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the detected variant of each file.
    Detect {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the lump directory.
    Info { file: PathBuf },
    /// Copy one lump's bytes out of a map.
    Extract {
        file: PathBuf,
        #[arg(long, value_name = "N")]
        lump: usize,
        #[arg(long, value_name = "PATH")]
        out: PathBuf,
        /// Wrap the bytes in a lump file header.
        #[arg(long)]
        lmp: bool,
    },
    /// Read a map and write it back out.
    Rewrite {
        input: PathBuf,
        output: PathBuf,
        /// Decode and re-encode every typed lump instead of copying bytes.
        #[arg(long)]
        decode_all: bool,
    },
    /// Summarise the visibility lump.
    Vis { file: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let options = match load_options(cli.config.as_deref()) {
        Ok(options) => options,
        Err(code) => std::process::exit(code),
    };
    let exit_code = match cli.command {
        Commands::Detect { files } => run_detect(&files),
        Commands::Info { file } => run_info(&file, &options),
        Commands::Extract {
            file,
            lump,
            out,
            lmp,
        } => run_extract(&file, &options, lump, &out, lmp),
        Commands::Rewrite {
            input,
            output,
            decode_all,
        } => run_rewrite(&input, &output, &options, decode_all),
        Commands::Vis { file } => run_vis(&file, &options),
    };
    std::process::exit(exit_code);
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_options(path: Option<&Path>) -> Result<ReaderOptions, i32> {
    let Some(path) = path else {
        return Ok(ReaderOptions::default());
    };
    ReaderOptions::load(path).map_err(|err| {
        eprintln!("config {}: {}", path.display(), err);
        EXIT_CONFIG
    })
}

fn open(path: &Path, options: &ReaderOptions) -> Result<Bsp, i32> {
    Bsp::open_with(path, options).map_err(|err| {
        eprintln!("{}: {}", path.display(), err);
        EXIT_READ
    })
}

fn run_detect(files: &[PathBuf]) -> i32 {
    let mut code = EXIT_SUCCESS;
    for path in files {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(err) => {
                eprintln!("{}: {}", path.display(), err);
                code = EXIT_READ;
                continue;
            }
        };
        let (tag, key) = detect_with_key(&data);
        let suffix = if key.is_some() { " (encrypted)" } else { "" };
        println!("{}: {}{}", path.display(), tag, suffix);
    }
    code
}

fn run_info(path: &Path, options: &ReaderOptions) -> i32 {
    let bsp = match open(path, options) {
        Ok(bsp) => bsp,
        Err(code) => return code,
    };
    let header = bsp.header_layout();
    println!("map: {}", path.display());
    println!("type: {}", bsp.map_type());
    println!("header: {} bytes, {} lumps", header.size(), bsp.lump_count());
    if bsp.encryption_key().is_some() {
        println!("encrypted: yes");
    }
    for (slot, info) in bsp.lump_infos().iter().enumerate() {
        if info.is_empty() {
            continue;
        }
        let kind = lump_kind_at(slot, bsp.map_type())
            .map(|kind| kind.name())
            .unwrap_or("-");
        print!(
            "{:>4} {:<14} {:>10} {:>10} v{}",
            slot, kind, info.offset, info.length, info.version
        );
        match &info.override_file {
            Some(file) => println!(" <- {}", file.display()),
            None => println!(),
        }
    }
    EXIT_SUCCESS
}

fn run_extract(
    path: &Path,
    options: &ReaderOptions,
    slot: usize,
    out: &Path,
    lmp: bool,
) -> i32 {
    let bsp = match open(path, options) {
        Ok(bsp) => bsp,
        Err(code) => return code,
    };
    let data = match bsp.raw_lump(slot) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("lump {}: {}", slot, err);
            return EXIT_LUMP;
        }
    };
    let written = if lmp {
        let header = LumpFileHeader {
            lump_index: i32::try_from(slot).unwrap_or(i32::MAX),
            version: bsp.lump_info(slot).map(|info| info.version).unwrap_or(0),
            ..LumpFileHeader::default()
        };
        write_lump_file(out, header, &data).map_err(|err| err.to_string())
    } else {
        std::fs::write(out, &data).map_err(|err| err.to_string())
    };
    if let Err(err) = written {
        eprintln!("write {}: {}", out.display(), err);
        return EXIT_WRITE;
    }
    println!("extracted lump {} ({} bytes) to {}", slot, data.len(), out.display());
    EXIT_SUCCESS
}

fn run_rewrite(input: &Path, output: &Path, options: &ReaderOptions, decode_all: bool) -> i32 {
    if input == output {
        eprintln!("refusing to rewrite a map over itself");
        return EXIT_USAGE;
    }
    let bsp = match open(input, options) {
        Ok(bsp) => bsp,
        Err(code) => return code,
    };
    tracing::info!(input = %input.display(), map_type = %bsp.map_type(), decode_all, "rewriting");
    if decode_all {
        if let Err(err) = bsp.load_all() {
            eprintln!("decode failed: {}", err);
            return EXIT_LUMP;
        }
    }
    if let Err(err) = bsp.write_to(output) {
        eprintln!("write {}: {}", output.display(), err);
        return EXIT_WRITE;
    }
    println!("wrote {} as {}", output.display(), bsp.map_type());
    EXIT_SUCCESS
}

fn run_vis(path: &Path, options: &ReaderOptions) -> i32 {
    let bsp = match open(path, options) {
        Ok(bsp) => bsp,
        Err(code) => return code,
    };
    let vis = match bsp.visibility() {
        Ok(vis) => vis,
        Err(err) => {
            eprintln!("visibility: {}", err);
            return EXIT_LUMP;
        }
    };
    let clusters = vis.cluster_count();
    println!("clusters: {}", clusters);
    for cluster in 0..clusters {
        let row = match vis.pvs(cluster) {
            Ok(row) => row,
            Err(err) => {
                eprintln!("cluster {}: {}", cluster, err);
                return EXIT_LUMP;
            }
        };
        let visible = (0..clusters).filter(|other| row_bit(&row, *other)).count();
        println!("{:>6} sees {}", cluster, visible);
    }
    EXIT_SUCCESS
}
