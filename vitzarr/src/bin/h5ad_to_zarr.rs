//! Convert an h5ad file into a Vitessce-ready `{stem}_anndata.zarr` store.
//!
//! ```sh
//! h5ad-to-zarr --file pbmc3k.h5ad --stem out/pbmc3k --compute-embeddings -v
//! ```
//!
//! `RUST_LOG` overrides the level chosen with `-v`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;

use vitzarr::{convert, ConvertOptions, Source};

#[derive(Parser, Debug)]
#[command(version, about = "Convert an h5ad dataset into an AnnData zarr store for Vitessce")]
struct Args {
    /// Input h5ad file.
    #[arg(long)]
    file: PathBuf,

    /// Output prefix; the store is written to `<stem>_anndata.zarr`.
    #[arg(long, default_value = "")]
    stem: String,

    /// Compute X_pca and X_umap when the dataset lacks them.
    #[arg(long, default_value_t = false)]
    compute_embeddings: bool,

    /// Variables per X chunk (each chunk spans all observations).
    #[arg(long, default_value_t = vitzarr::options::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// `var` column to use as the variable index.
    #[arg(long)]
    var_index: Option<String>,

    /// Increase verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(level(args.verbose))
        .parse_default_env()
        .init();
    // Whatever RUST_LOG enabled must also pass the converter's ceiling.
    let verbosity = log::max_level();

    let options = ConvertOptions {
        compute_embeddings: args.compute_embeddings,
        chunk_size: args.chunk_size,
        var_index: args.var_index,
        verbosity,
        ..ConvertOptions::default()
    };
    let path = convert(Source::Path(args.file.clone()), &args.stem, &options)
        .with_context(|| format!("failed to convert {}", args.file.display()))?;
    println!("{}", path.display());
    Ok(())
}
