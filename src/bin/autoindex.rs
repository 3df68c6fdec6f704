// Copyright 2025 Stoolap Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! autoindex CLI - inspect and maintain a frequency store
//!

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use tracing_subscriber::EnvFilter;

use autoindex::common::version::version_info;
use autoindex::{
    auto_index_name, AdvisorConfig, AttributeId, AutoIndexer, CostAdvisor, Error, FrequencyStore,
    MemoryCatalog, Observation, RelationId, RelationStats, RequestOutcome, Result, ScanFilter,
    ThreadSpawner,
};

/// Workload-driven index advisor CLI
#[derive(Parser, Debug)]
#[command(name = "autoindex")]
#[command(author = "Stoolap Contributors")]
#[command(version)]
#[command(about = "Inspect and maintain an automatic index advisor store")]
#[command(
    long_about = "Inspect and maintain the frequency store of a workload-driven index advisor.\n\n\
DSN PARAMETERS:\n\
  file:///path/to/dir?param=value&param2=value2\n\n\
  sync=none|normal|full       Counter log sync mode (default: normal).\n\
                              none buffers records in process: a crash loses up\n\
                              to sync_batch acknowledged increments\n\
  sync_batch=COUNT            Records between fsyncs in normal mode, or between\n\
                              writes to the OS in none mode (default: 64)\n\
  compact_after=COUNT         Log records before compaction, 0 disables (default: 65536)\n\
  compact_on_close=BOOL       Compact when the store closes (default: true)\n\
  divisor=F                   Build when frequency > rows / F (default: 3)\n\
  cpu_tuple_cost=F            Sequential scan cost per row (default: 0.01)\n\
  cpu_index_tuple_cost=F      Index scan cost per entry (default: 0.005)\n\
  mode=async|sync             Where builds run (default: async)\n\
  max_workers=COUNT           Concurrent build workers (default: 8)\n\n\
EXAMPLES:\n\
  autoindex -d file:///var/lib/advisor show\n\
  autoindex -d file:///var/lib/advisor explain --rows 300 16384 2\n\
  autoindex -d file:///var/lib/advisor import-legacy seq_attr.txt\n\
  autoindex simulate --rows 300 --scans 150 --threads 4 16384 2"
)]
struct Args {
    /// Store DSN (file://<path> or memory://)
    #[arg(short = 'd', long = "db", default_value = "memory://")]
    dsn: String,

    /// Suppress informational output
    #[arg(short = 'q', long = "quiet", default_value = "false")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every counter
    Show {
        /// Only show this relation
        #[arg(short = 'r', long = "relation")]
        relation: Option<RelationId>,
    },
    /// Print one counter
    Get {
        relation: RelationId,
        attribute: AttributeId,
    },
    /// Show the build decision for a counter
    Explain {
        relation: RelationId,
        attribute: AttributeId,
        /// Row estimate of the relation
        #[arg(long = "rows")]
        rows: u64,
        /// Use this frequency instead of the stored one
        #[arg(long = "frequency")]
        frequency: Option<u64>,
    },
    /// Merge a legacy `attributeId relationId counter` file into the store
    ImportLegacy { file: String },
    /// Write all counters in the legacy line format
    ExportLegacy { file: String },
    /// Compact the counter log into the snapshot
    Checkpoint,
    /// Drive the full advisor loop against an in-memory catalog
    Simulate {
        relation: RelationId,
        attribute: AttributeId,
        /// Row estimate of the simulated relation
        #[arg(long = "rows", default_value = "300")]
        rows: u64,
        /// Scans per thread
        #[arg(long = "scans", default_value = "150")]
        scans: u64,
        /// Concurrent scanning threads
        #[arg(long = "threads", default_value = "1")]
        threads: usize,
    },
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        // 2 when the store itself is locked or unreadable
        std::process::exit(if e.is_store_failure() { 2 } else { 1 });
    }
}

fn run(args: &Args) -> Result<()> {
    let config = AdvisorConfig::from_dsn(&args.dsn)?;
    if !args.quiet {
        eprintln!("{}", version_info());
        eprintln!("Store: {}", args.dsn);
    }

    if let Command::Simulate {
        relation,
        attribute,
        rows,
        scans,
        threads,
    } = args.command
    {
        return simulate(config, relation, attribute, rows, scans, threads, args.quiet);
    }

    let store = FrequencyStore::open(&config.store)?;
    let result = match &args.command {
        Command::Show { relation } => {
            show(&store, *relation);
            Ok(())
        }
        Command::Get {
            relation,
            attribute,
        } => store
            .get(*relation, *attribute)
            .map(|counter| println!("{}", counter)),
        Command::Explain {
            relation,
            attribute,
            rows,
            frequency,
        } => explain(&store, &config, *relation, *attribute, *rows, *frequency),
        Command::ImportLegacy { file } => store
            .import_legacy(file)
            .map(|changed| println!("imported {} counters from {}", changed, file)),
        Command::ExportLegacy { file } => store
            .export_legacy(file)
            .map(|written| println!("exported {} counters to {}", written, file)),
        Command::Checkpoint => store
            .checkpoint()
            .map(|written| println!("compacted {} counters", written)),
        Command::Simulate { .. } => Ok(()),
    };

    store.close()?;
    result
}

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header.iter().map(Cell::new));
    table
}

fn show(store: &FrequencyStore, relation: Option<RelationId>) {
    let mut table = new_table(&["relation", "attribute", "counter", "index name"]);
    let mut shown = 0;
    for entry in store
        .entries()
        .into_iter()
        .filter(|e| relation.map_or(true, |r| r == e.relation_id))
    {
        table.add_row(vec![
            Cell::new(entry.relation_id),
            Cell::new(entry.attribute_id),
            Cell::new(entry.counter),
            Cell::new(auto_index_name(entry.relation_id, entry.attribute_id)),
        ]);
        shown += 1;
    }
    println!("{}", table);

    let stats = store.stats();
    println!(
        "{} counters ({} pending log records, durable: {})",
        shown, stats.pending_records, stats.durable
    );
}

fn explain(
    store: &FrequencyStore,
    config: &AdvisorConfig,
    relation: RelationId,
    attribute: AttributeId,
    rows: u64,
    frequency: Option<u64>,
) -> Result<()> {
    let frequency = match frequency {
        Some(frequency) => frequency,
        None => store.get(relation, attribute)?,
    };
    let advisor = CostAdvisor::with_constants(config.cost);
    let estimate = advisor.estimate(&RelationStats::new(relation, rows, 0), frequency);

    let mut table = new_table(&["metric", "value"]);
    table.add_row(vec![Cell::new("rows"), Cell::new(estimate.rows)]);
    table.add_row(vec![Cell::new("frequency"), Cell::new(estimate.frequency)]);
    table.add_row(vec![
        Cell::new("seq scan cost"),
        Cell::new(format!("{:.3}", estimate.seq_scan_cost)),
    ]);
    table.add_row(vec![
        Cell::new("index scan cost"),
        Cell::new(format!("{:.3}", estimate.index_scan_cost)),
    ]);
    table.add_row(vec![
        Cell::new("index build cost"),
        Cell::new(format!("{:.3}", estimate.index_build_cost)),
    ]);
    table.add_row(vec![
        Cell::new("threshold"),
        Cell::new(format!("{:.3}", estimate.threshold)),
    ]);
    table.add_row(vec![
        Cell::new("decision"),
        Cell::new(if estimate.should_build {
            format!("build {}", auto_index_name(relation, attribute))
        } else {
            "wait".to_string()
        }),
    ]);
    println!("{}", table);
    Ok(())
}

fn simulate(
    config: AdvisorConfig,
    relation: RelationId,
    attribute: AttributeId,
    rows: u64,
    scans: u64,
    threads: usize,
    quiet: bool,
) -> Result<()> {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.add_relation(relation, [attribute], rows, rows / 100 + 1);

    let spawner = Arc::new(ThreadSpawner::new(config.dispatch.max_workers));
    let advisor = Arc::new(AutoIndexer::new(config, catalog.clone(), spawner)?);

    let start = Instant::now();
    let handles: Vec<_> = (0..threads.max(1))
        .map(|_| {
            let advisor = Arc::clone(&advisor);
            thread::spawn(move || {
                let filter = ScanFilter::new(relation, [attribute]);
                let mut triggered = 0u64;
                let mut deduplicated = 0u64;
                for _ in 0..scans {
                    match advisor.observe_scan(&filter) {
                        observation if observation.triggered_build() => triggered += 1,
                        Observation::Dispatched(RequestOutcome::AlreadyInFlight) => {
                            deduplicated += 1
                        }
                        _ => {}
                    }
                }
                (triggered, deduplicated)
            })
        })
        .collect();

    let mut triggered = 0;
    let mut deduplicated = 0;
    for handle in handles {
        let (t, d) = handle
            .join()
            .map_err(|_| Error::internal("simulation thread panicked"))?;
        triggered += t;
        deduplicated += d;
    }
    let idle = advisor.dispatcher().wait_idle(Duration::from_secs(30));
    let elapsed = start.elapsed();

    let stats = advisor.dispatcher().stats();
    let mut table = new_table(&["metric", "value"]);
    table.add_row(vec![
        Cell::new("observations"),
        Cell::new(scans * threads.max(1) as u64),
    ]);
    table.add_row(vec![
        Cell::new("final frequency"),
        Cell::new(advisor.frequency(relation, attribute)?),
    ]);
    table.add_row(vec![Cell::new("builds triggered"), Cell::new(triggered)]);
    table.add_row(vec![Cell::new("deduplicated"), Cell::new(deduplicated)]);
    table.add_row(vec![Cell::new("builds completed"), Cell::new(stats.completed)]);
    table.add_row(vec![Cell::new("builds failed"), Cell::new(stats.failed)]);
    table.add_row(vec![
        Cell::new("indexes"),
        Cell::new(
            catalog
                .indexes()
                .iter()
                .map(|index| index.name.clone())
                .collect::<Vec<_>>()
                .join(", "),
        ),
    ]);
    println!("{}", table);

    if !quiet {
        eprintln!("ran in {:.3}s", elapsed.as_secs_f64());
    }
    if !idle {
        eprintln!("warning: builds still running after 30s");
    }
    advisor.close()
}
