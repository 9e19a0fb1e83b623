use anyhow::{Context, Result};
use bundle_abi::unbundle::Bundle;
use bundler::BundleEncoder;
use clap::{Args, Parser, Subcommand};
use log::info;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bundler", version, about = "Build and inspect INIT.BND init bundles")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pack the entries of a JSON manifest into a bundle
    Pack(PackArgs),
    /// Print the entry table of an existing bundle
    List(ListArgs),
}

#[derive(Args)]
struct PackArgs {
    /// Path to the manifest JSON
    #[arg(short, long)]
    manifest: PathBuf,

    /// Path of the bundle to write
    #[arg(short, long)]
    output: PathBuf,

    /// Base directory for relative entry paths
    #[arg(short, long, default_value = ".")]
    base: PathBuf,
}

#[derive(Args)]
struct ListArgs {
    /// Bundle file to inspect
    bundle: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().cmd {
        Command::Pack(args) => pack(&args),
        Command::List(args) => list(&args),
    }
}

fn pack(args: &PackArgs) -> Result<()> {
    let entries = bundler::load_entries(&args.manifest, &args.base)
        .with_context(|| format!("invalid manifest {}", args.manifest.display()))?;

    // Lay everything out before touching the output file.
    let encoder = BundleEncoder::new(&entries).context("cannot build bundle")?;
    let layout = encoder.layout();
    info!(
        "{} entries, payloads from {:#x}, {} bytes total",
        entries.len(),
        layout.payload_start(),
        layout.total_size()
    );

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    encoder
        .write_file(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    println!(
        "INIT.BND written to {} ({} entries)",
        args.output.display(),
        entries.len()
    );
    Ok(())
}

fn list(args: &ListArgs) -> Result<()> {
    let blob = fs::read(&args.bundle)
        .with_context(|| format!("failed to read {}", args.bundle.display()))?;
    let bundle = Bundle::parse(&blob)
        .with_context(|| format!("{} is not a valid bundle", args.bundle.display()))?;

    for entry in bundle.entries() {
        let e = entry.with_context(|| format!("corrupt entry table in {}", args.bundle.display()))?;
        println!(
            "{:>3}  {:<31}  {:<7}  {:<8}  {:#010x}  {}",
            e.index,
            e.name,
            e.entry_type,
            if e.required() { "required" } else { "optional" },
            e.offset,
            e.payload.len()
        );
    }

    Ok(())
}
