//! Example: simulated acquisition ring
//!
//! Runs an N-node ring entirely in-process: a synthetic ADC stands in for
//! the converter, a free-running generator delivers trigger edges, and each
//! node's transport streams into a collector thread that persists completed
//! blocks as flat little-endian files.
//!
//! Usage:
//!   cargo run --release --bin chain_demo -- \
//!       --nodes 3 --capacity 256 --threshold 192 \
//!       --blocks 4 --rate-hz 2000 --out-dir blocks

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use crossbeam_channel::bounded;
use tracing::info;

use adcring::{
    AcqNode, AdcPeripheral, BlockAssembler, BlockWriter, ChainScheduler, ChannelLink, NodeConfig,
    TransportKind, handoff,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of nodes in the ring
    #[arg(short, long, default_value = "2")]
    nodes: usize,

    /// Buffer capacity in samples per node
    #[arg(short, long, default_value = "64")]
    capacity: usize,

    /// Early-handoff threshold (defaults to 3/4 of capacity)
    #[arg(short, long)]
    threshold: Option<usize>,

    /// Blocks to collect per node before shutting down
    #[arg(short, long, default_value = "4")]
    blocks: usize,

    /// Trigger edge rate in Hz
    #[arg(short, long, default_value = "1000")]
    rate_hz: u64,

    /// Directory for collected block files
    #[arg(short, long, default_value = "blocks")]
    out_dir: String,

    /// Transport used by every node
    #[arg(long, value_enum, default_value = "spi")]
    transport: TransportArg,

    /// Record timestamps alongside samples
    #[arg(long)]
    timestamps: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TransportArg {
    Spi,
    Uart,
    I2c,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Spi => TransportKind::Spi,
            TransportArg::Uart => TransportKind::Uart,
            TransportArg::I2c => TransportKind::I2c,
        }
    }
}

/// Deterministic stand-in for the converter: a wrapping 12-bit ramp.
struct SyntheticAdc {
    next: u16,
}

impl AdcPeripheral for SyntheticAdc {
    fn read(&mut self) -> u16 {
        let value = self.next;
        self.next = (self.next + 1) % 4096;
        value
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let threshold = args.threshold.unwrap_or(args.capacity * 3 / 4);
    let transport = TransportKind::from(args.transport);
    info!(
        "ring of {} nodes, capacity {}, threshold {}, {} transport",
        args.nodes, args.capacity, threshold, transport
    );

    // One handoff line per node; node i pulses the line node i+1 listens on.
    let mut listeners = Vec::new();
    let mut pulsers = Vec::new();
    for _ in 0..args.nodes {
        let (out, input) = handoff::line(Duration::from_millis(1));
        pulsers.push(Some(out));
        listeners.push(Some(input));
    }

    let mut scheduler = ChainScheduler::new();
    let mut triggers = Vec::new();
    let mut collectors = Vec::new();

    for position in 0..args.nodes {
        let (chunk_tx, chunk_rx) = bounded::<Vec<u8>>(64);
        let config = NodeConfig::new(position, args.nodes, args.capacity, threshold)
            .with_transport(transport)
            .with_timestamps(args.timestamps);
        let upstream = listeners[position].take().expect("line wired once");
        let downstream = pulsers[(position + 1) % args.nodes]
            .take()
            .expect("line wired once");

        let node = AcqNode::new(
            config,
            Box::new(SyntheticAdc { next: 0 }),
            Box::new(ChannelLink::new(transport, chunk_tx)),
            upstream,
            downstream,
        )?;
        triggers.push(node.trigger());

        // Collector thread: reassemble the byte stream and persist blocks.
        let writer = BlockWriter::new(&args.out_dir, node.name())?;
        let mut assembler = BlockAssembler::new(writer, args.capacity);
        let wanted = args.blocks;
        collectors.push(thread::spawn(move || -> std::io::Result<usize> {
            let mut written = 0;
            while written < wanted {
                let Ok(chunk) = chunk_rx.recv() else { break };
                written += assembler.push_chunk(&chunk)?.len();
            }
            Ok(written)
        }));

        scheduler.start_node(node);
    }

    // Free-running trigger generator: every node's trigger pin sees the
    // pulse train, only the enabled producer consumes it.
    let running = Arc::new(AtomicBool::new(true));
    let generator = {
        let running = Arc::clone(&running);
        let period = Duration::from_micros(1_000_000 / args.rate_hz.max(1));
        thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                for trigger in &triggers {
                    trigger.edge();
                }
                thread::sleep(period);
            }
        })
    };

    let mut total_blocks = 0;
    for collector in collectors {
        match collector.join() {
            Ok(Ok(written)) => total_blocks += written,
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => return Err("collector thread panicked".into()),
        }
    }
    info!("collected {} blocks into {}/", total_blocks, args.out_dir);

    running.store(false, Ordering::Relaxed);
    scheduler.stop();
    scheduler.wait();
    let _ = generator.join();
    Ok(())
}
