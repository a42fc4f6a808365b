//! `kestrel` — command-line interface for the K1 mapping engine.
//!
//! ```text
//! USAGE:
//!   kestrel geometry                 Print derived widths for the K1 geometry
//!   kestrel map-demo [--dump FILE]   Map a demo network, report totals
//! ```

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kestrel_chip::ChipGeometry;
use kestrel_map::{dump, map, Core, Network, WeightMatrix};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kestrel", about = "Kestrel K1 mapping engine CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the K1 geometry and every derived width.
    Geometry,
    /// Map a small demo network and report allocation totals.
    MapDemo {
        /// Write the pipe-delimited memory dump to this file (default: stdout).
        #[arg(long)]
        dump: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Geometry => cmd_geometry(),
        Cmd::MapDemo { dump } => cmd_map_demo(dump)?,
    }

    Ok(())
}

fn cmd_geometry() {
    let g = ChipGeometry::K1;
    println!("Kestrel K1 geometry");
    println!("  Neuron array : {}×{} ({} neurons, {} pools of {})",
        1 << g.nrn_y_bits, 1 << g.nrn_x_bits, g.nrn_count(), g.nrn_pools(), g.pool_size());
    println!("  Main Memory  : {}×{} ({}-bit weights)", g.mm_height(), g.mm_width(), g.weight_bits);
    println!("  Accumulator  : {} entries ({}-bit words)", g.am_size(), g.am_word_bits());
    println!("  Tag-Action   : 2×{} entries ({}-bit words)", g.tat_size(), g.tat_word_bits());
    println!("  Pool-Address : {} entries ({}-bit words)", g.nrn_pools(), g.pat_word_bits());
    println!();
    println!("  TAT payloads : acc={} nrn={} fanout={}",
        g.tat_acc_payload_bits(), g.tat_nrn_payload_bits(), g.tat_fanout_payload_bits());
    println!("  Global tag   : {} bits (ext base {:#x})", g.global_tag_bits(), g.ext_tag_base());
}

/// Demo: a decoded pool feeding buckets that fan out to a transform stage
/// and the host.
fn cmd_map_demo(dump_path: Option<PathBuf>) -> Result<()> {
    let mut net = Network::new();
    let nrn = net.add_neurons(64);
    let decode = net.add_weights(WeightMatrix::constant(2, 64, 0.05));
    let acc = net.add_buckets(2);
    let transform = net.add_weights(WeightMatrix::constant(2, 2, 0.25));
    let acc2 = net.add_buckets(2);
    let out = net.add_sink(2);
    let out2 = net.add_sink(2);
    net.connect(nrn, decode)?;
    net.connect(decode, acc)?;
    net.connect(acc, transform)?;
    net.connect(acc, out)?;
    net.connect(transform, acc2)?;
    net.connect(acc2, out2)?;

    let mut core = Core::new(ChipGeometry::K1);
    let report = map(&mut net, &mut core)?;

    println!("Mapped {} resources", report.resources);
    println!("  Pools     : {}", report.pools);
    println!("  MM cells  : {}", report.mm_cells);
    println!("  AM entries: {}", report.am_entries);
    println!("  TAT0/TAT1 : {}/{}", report.tat0_entries, report.tat1_entries);
    println!("  Ext tags  : {}", report.ext_tags);

    let total: usize = core.programming_streams()?.iter().map(kestrel_map::ProgrammingStream::len).sum();
    println!("  Stream    : {total} words");

    match dump_path {
        Some(path) => {
            let mut file = File::create(&path)?;
            dump::write_dump(&core, &mut file)?;
            println!("  Dump      : {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            writeln!(lock)?;
            dump::write_dump(&core, &mut lock)?;
        }
    }

    Ok(())
}
