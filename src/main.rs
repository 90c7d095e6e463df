use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use jtag_trace::{
    CoreKind, Engine, JtagConfig, JtagWatcher, TapState, Timescale, VcdReader, VcdWriter,
};

/// Decode a JTAG capture in VCD format into an annotated VCD trace.
#[derive(clap::Parser)]
#[clap(name = "jtag-trace", version)]
struct Cli {
    /// Path of the VCD capture to read.
    infile: PathBuf,

    /// Path of the annotated VCD trace to write.
    outfile: PathBuf,

    /// Name of the TCK signal in the capture.
    #[clap(long, default_value = "tck")]
    tck: String,

    /// Name of the TMS signal in the capture.
    #[clap(long, default_value = "tms")]
    tms: String,

    /// Name of the TDI signal in the capture.
    #[clap(long, default_value = "tdi")]
    tdi: String,

    /// Name of the TDO signal in the capture.
    #[clap(long, default_value = "tdo")]
    tdo: String,

    /// Initial TAP controller state.
    #[clap(short = 's', long, value_enum, default_value_t = TapState::TestLogicReset)]
    initstate: TapState,

    /// Timescale that must match the capture's declaration.
    #[clap(short = 't', long, default_value = "1 ns")]
    timescale: Timescale,

    /// Scope containing the JTAG signals.
    #[clap(long, default_value = "capture")]
    inscope: String,

    /// Scope receiving the decoded variables.
    #[clap(long, default_value = "parsed")]
    outscope: String,

    /// Core decoder giving IR/DR scans their semantics.
    #[clap(long, value_enum, default_value_t = CoreKind::Simple)]
    core: CoreKind,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let infile = File::open(&cli.infile)
        .with_context(|| format!("could not open capture {}", cli.infile.display()))?;
    let outfile = File::create(&cli.outfile)
        .with_context(|| format!("could not create trace {}", cli.outfile.display()))?;

    let reader = VcdReader::new(BufReader::new(infile));
    let writer = VcdWriter::new(Box::new(BufWriter::new(outfile)), cli.timescale);

    let watcher = JtagWatcher::new(
        JtagConfig {
            inscope: cli.inscope,
            outscope: cli.outscope,
            tck: cli.tck,
            tms: cli.tms,
            tdi: cli.tdi,
            tdo: cli.tdo,
            initstate: cli.initstate,
            timescale: cli.timescale,
        },
        writer,
        cli.core,
    );

    let mut engine = Engine::new();
    engine.register_watcher(Box::new(watcher));
    engine
        .run(reader)
        .with_context(|| format!("decoding {} failed", cli.infile.display()))?;

    Ok(())
}
