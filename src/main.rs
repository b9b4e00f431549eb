//! TREK: Traversal Engine Kit
//!
//! Usage: trek <COMMAND> [OPTIONS]

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use trek_genomics::config::{
    DownsamplingMethod, FilterSpec, PartitionStrategy, TraversalConfig, DEFAULT_SEED,
    DEFAULT_SHARD_CAP,
};
use trek_genomics::error::Result;
use trek_genomics::genome::ContigOrder;
use trek_genomics::interval::GenomicInterval;
use trek_genomics::io::{read_intervals, RecordIter, RecordReader, TextRecord};
use trek_genomics::parallel::{traverse_partitions_with, traverse_shards_with};
use trek_genomics::partition::partition;
use trek_genomics::set_ops::{combine, sort_and_merge, subtract_all, MergingRule, SetRule};
use trek_genomics::shard::ShardBalancer;
use trek_genomics::streaming::{CheckedSource, ErrorSlot, IntervalScoped, MergingIterator, TsvWriter};
use trek_genomics::traversal::{traverse, traverse_intervals, CollectingWalker, ShardResult, Walker};
use trek_genomics::TraversalError;

#[derive(Parser)]
#[command(name = "trek")]
#[command(version)]
#[command(about = "TREK: Traversal Engine Kit - sharded, downsampled traversal of sorted genomic records", long_about = None)]
struct Cli {
    /// Number of threads to use (default: number of CPUs)
    #[arg(long, short = 't', global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sort an interval list and merge overlapping intervals
    Merge {
        /// Interval list (BED or contig:start-stop lines)
        #[arg(short, long)]
        input: PathBuf,

        /// Genome file or sequence dictionary giving the contig order
        #[arg(short = 'g', long)]
        genome: PathBuf,

        /// Keep abutting intervals separate
        #[arg(long)]
        overlapping_only: bool,

        /// Write 0-based BED instead of contig:start-stop
        #[arg(long)]
        bed: bool,
    },

    /// Union or intersect two interval lists
    Combine {
        #[arg(short = 'a', long)]
        file_a: PathBuf,

        #[arg(short = 'b', long)]
        file_b: PathBuf,

        #[arg(short = 'g', long)]
        genome: PathBuf,

        /// Set rule: union or intersection
        #[arg(long, default_value = "union")]
        rule: String,

        /// Keep abutting intervals separate
        #[arg(long)]
        overlapping_only: bool,
    },

    /// Remove the bases of B from A
    Subtract {
        #[arg(short = 'a', long)]
        file_a: PathBuf,

        #[arg(short = 'b', long)]
        file_b: PathBuf,

        #[arg(short = 'g', long)]
        genome: PathBuf,
    },

    /// Split an interval list into parts for parallel processing
    Scatter {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short = 'g', long)]
        genome: PathBuf,

        /// Partitioning: count:N, bases:N, target:BP or contig:N
        #[arg(short = 'p', long)]
        partitioning: PartitionStrategy,
    },

    /// Cut sorted record files into size-capped shards and report them
    Shard {
        /// Sorted record files (contig, position, group[, payload])
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        #[arg(short = 'g', long)]
        genome: PathBuf,

        /// Soft cap on records per shard
        #[arg(long, default_value_t = DEFAULT_SHARD_CAP)]
        cap: usize,
    },

    /// Merge, downsample and filter sorted record files
    Traverse {
        /// Sorted record files (contig, position, group[, payload])
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        #[arg(short = 'g', long)]
        genome: PathBuf,

        /// Restrict to these regions (interval strings or interval list files)
        #[arg(short = 'L', long = "intervals")]
        intervals: Vec<String>,

        /// none, fraction:P, positional:T, per-group:T or reservoir:N
        #[arg(long, default_value = "none")]
        downsample: DownsamplingMethod,

        /// Random seed for downsampling
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// Drop unmapped records
        #[arg(long)]
        exclude_unmapped: bool,

        /// Drop records from this group (repeatable)
        #[arg(long)]
        exclude_group: Vec<String>,

        /// Traverse interval partitions in parallel (count:N, bases:N, target:BP, contig:N)
        #[arg(short = 'p', long)]
        partitioning: Option<PartitionStrategy>,

        /// Traverse record shards of about this many records in parallel
        #[arg(long)]
        shard_cap: Option<usize>,
    },
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    // Configure thread pool if --threads specified
    if let Some(n) = cli.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(n).build_global() {
            eprintln!("Error: failed to initialize thread pool: {}", e);
            process::exit(1);
        }
    }

    let result = match cli.command {
        Commands::Merge {
            input,
            genome,
            overlapping_only,
            bed,
        } => run_merge(input, genome, overlapping_only, bed),

        Commands::Combine {
            file_a,
            file_b,
            genome,
            rule,
            overlapping_only,
        } => run_combine(file_a, file_b, genome, &rule, overlapping_only),

        Commands::Subtract {
            file_a,
            file_b,
            genome,
        } => run_subtract(file_a, file_b, genome),

        Commands::Scatter {
            input,
            genome,
            partitioning,
        } => run_scatter(input, genome, partitioning),

        Commands::Shard { input, genome, cap } => run_shard(input, genome, cap),

        Commands::Traverse {
            input,
            genome,
            intervals,
            downsample,
            seed,
            exclude_unmapped,
            exclude_group,
            partitioning,
            shard_cap,
        } => {
            let mut config = TraversalConfig::new()
                .with_downsampling(downsample)
                .with_seed(seed)
                .with_threads(cli.threads.unwrap_or(0));
            if exclude_unmapped {
                config = config.with_filter(FilterSpec::ExcludeUnmapped);
            }
            if !exclude_group.is_empty() {
                config = config.with_filter(FilterSpec::ExcludeGroups(exclude_group));
            }
            if let Some(strategy) = partitioning {
                config = config.with_partitioning(strategy);
            }
            if let Some(cap) = shard_cap {
                config = config.with_shard_cap(cap);
            }
            run_traverse(input, genome, intervals, config, shard_cap.is_some())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn merging_rule(overlapping_only: bool) -> MergingRule {
    if overlapping_only {
        MergingRule::OverlappingOnly
    } else {
        MergingRule::All
    }
}

fn run_merge(input: PathBuf, genome: PathBuf, overlapping_only: bool, bed: bool) -> Result<()> {
    let order = ContigOrder::from_file(&genome)?;
    let intervals = read_intervals(&input, &order)?;
    let count = intervals.len();
    let merged = sort_and_merge(intervals, merging_rule(overlapping_only))?;

    let stdout = io::stdout();
    let mut output = TsvWriter::new(stdout.lock(), &order);
    for interval in &merged {
        if bed {
            output.write_interval_bed(interval)?;
        } else {
            output.write_interval(interval)?;
        }
    }
    output.flush()?;
    info!("Merged {} intervals into {}", count, merged.len());
    Ok(())
}

fn run_combine(
    file_a: PathBuf,
    file_b: PathBuf,
    genome: PathBuf,
    rule: &str,
    overlapping_only: bool,
) -> Result<()> {
    let set_rule = SetRule::parse(rule).ok_or_else(|| {
        TraversalError::Config(format!(
            "Unknown set rule '{}'. Use union or intersection",
            rule
        ))
    })?;
    let order = ContigOrder::from_file(&genome)?;
    let merging = merging_rule(overlapping_only);
    let a = sort_and_merge(read_intervals(&file_a, &order)?, merging)?;
    let b = sort_and_merge(read_intervals(&file_b, &order)?, merging)?;
    let combined = combine(a, b, set_rule, merging)?;
    write_intervals(&combined, &order)
}

fn run_subtract(file_a: PathBuf, file_b: PathBuf, genome: PathBuf) -> Result<()> {
    let order = ContigOrder::from_file(&genome)?;
    let a = sort_and_merge(read_intervals(&file_a, &order)?, MergingRule::All)?;
    let b = sort_and_merge(read_intervals(&file_b, &order)?, MergingRule::All)?;
    let remaining = subtract_all(&a, &b)?;
    write_intervals(&remaining, &order)
}

fn write_intervals(intervals: &[GenomicInterval], order: &ContigOrder) -> Result<()> {
    let stdout = io::stdout();
    let mut output = TsvWriter::new(stdout.lock(), order);
    for interval in intervals {
        output.write_interval(interval)?;
    }
    output.flush()
}

fn run_scatter(input: PathBuf, genome: PathBuf, strategy: PartitionStrategy) -> Result<()> {
    let order = ContigOrder::from_file(&genome)?;
    let intervals = sort_and_merge(read_intervals(&input, &order)?, MergingRule::All)?;
    let parts = partition(&intervals, strategy)?;

    let stdout = io::stdout();
    let mut output = TsvWriter::new(stdout.lock(), &order);
    for part in &parts {
        for interval in part.intervals() {
            output.write_int(part.id())?;
            output.write_bytes(b"\t")?;
            output.write_interval(interval)?;
        }
    }
    output.flush()
}

type FileRecords<'g> = CheckedSource<RecordIter<'g, File>>;

/// Open every record file as a plain iterator reporting into `slot`.
fn open_records<'g>(
    paths: &[PathBuf],
    order: &'g ContigOrder,
    slot: &ErrorSlot,
) -> Result<Vec<FileRecords<'g>>> {
    paths
        .iter()
        .map(|path| {
            let reader = RecordReader::from_path(path, order)?;
            Ok(CheckedSource::new(reader.records(), slot.clone()))
        })
        .collect()
}

fn run_shard(input: Vec<PathBuf>, genome: PathBuf, cap: usize) -> Result<()> {
    let order = ContigOrder::from_file(&genome)?;
    let slot = ErrorSlot::new();
    let sources = open_records(&input, &order, &slot)?;
    let mut balancer = ShardBalancer::new(MergingIterator::new(sources), cap)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for shard in balancer.by_ref() {
        let shard = shard?;
        let span = match shard.span() {
            Some(span) => order.display(&span).to_string(),
            None => "unmapped".to_string(),
        };
        writeln!(out, "{}\t{}\t{}", shard.id(), shard.len(), span)?;
    }
    slot.check()?;
    info!(
        "Cut {} shards (largest {} records, cap {})",
        balancer.shards_emitted(),
        balancer.largest_shard(),
        balancer.cap()
    );
    Ok(())
}

/// Region list from `-L` values: each is an interval list file or an interval string.
fn load_regions(specs: &[String], order: &ContigOrder) -> Result<Vec<GenomicInterval>> {
    let mut intervals = Vec::new();
    for spec in specs {
        if Path::new(spec).is_file() {
            intervals.extend(read_intervals(spec, order)?);
        } else {
            intervals.push(order.parse_interval(spec)?);
        }
    }
    sort_and_merge(intervals, MergingRule::All)
}

/// Writes each visited record straight to the output.
struct WritingWalker<'g, W: Write> {
    output: TsvWriter<'g, W>,
    error: Option<TraversalError>,
}

impl<W: Write> Walker<TextRecord> for WritingWalker<'_, W> {
    type Summary = Result<()>;

    fn visit(&mut self, record: TextRecord) {
        if self.error.is_none() {
            if let Err(e) = self.output.write_record(&record) {
                self.error = Some(e);
            }
        }
    }

    fn finish(mut self) -> Result<()> {
        match self.error.take() {
            Some(e) => Err(e),
            None => self.output.flush(),
        }
    }
}

fn run_traverse(
    input: Vec<PathBuf>,
    genome: PathBuf,
    intervals: Vec<String>,
    config: TraversalConfig,
    sharded: bool,
) -> Result<()> {
    config.validate()?;
    let order = ContigOrder::from_file(&genome)?;
    let regions = load_regions(&intervals, &order)?;
    let slot = ErrorSlot::new();
    let stdout = io::stdout();

    if let Some(strategy) = config.partitioning {
        let regions = if regions.is_empty() {
            order.everything()?
        } else {
            regions
        };
        let parts = partition(&regions, strategy)?;
        let mut output = TsvWriter::new(stdout.lock(), &order);
        let stats = traverse_partitions_with(
            parts,
            |_| open_records(&input, &order, &slot),
            &config,
            CollectingWalker::new,
            None,
            |result| write_records(&mut output, &result.summary),
        )?;
        slot.check()?;
        output.flush()?;
        info!("Traversal complete: {}", stats);
        return Ok(());
    }

    let sources = open_records(&input, &order, &slot)?;

    if sharded {
        let merged = MergingIterator::new(sources);
        let mut output = TsvWriter::new(stdout.lock(), &order);
        let write = |result: ShardResult<Vec<TextRecord>>| write_records(&mut output, &result.summary);
        let stats = if regions.is_empty() {
            traverse_shards_with(
                ShardBalancer::new(merged, config.shard_cap)?,
                &config,
                CollectingWalker::new,
                write,
            )?
        } else {
            let scoped = CheckedSource::new(IntervalScoped::verified(merged, regions), slot.clone());
            traverse_shards_with(
                ShardBalancer::new(scoped, config.shard_cap)?,
                &config,
                CollectingWalker::new,
                write,
            )?
        };
        slot.check()?;
        output.flush()?;
        info!("Traversal complete: {}", stats);
        return Ok(());
    }

    let walker = WritingWalker {
        output: TsvWriter::new(stdout.lock(), &order),
        error: None,
    };
    let (written, stats) = if regions.is_empty() {
        traverse(sources, &config, walker)?
    } else {
        traverse_intervals(sources, &regions, &config, walker)?
    };
    slot.check()?;
    written?;
    info!("Traversal complete: {}", stats);
    info!("Filters: {}", stats.filter_counts);
    Ok(())
}

fn write_records<W: Write>(output: &mut TsvWriter<'_, W>, records: &[TextRecord]) -> Result<()> {
    for record in records {
        output.write_record(record)?;
    }
    Ok(())
}
