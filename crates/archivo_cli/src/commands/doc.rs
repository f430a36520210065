//! Inventory subcommands.

use super::{CliError, Runtime};
use archivo_core::{Conservation, DocumentDraft, DocumentFilter, Page};
use clap::{Args, Subcommand};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum DocCommand {
    /// Catalogue a new document
    Add(AddArgs),
    /// Filtered listing ordered by code
    List(ListArgs),
    /// Totals and filter options for the filtered set
    Stats(FilterArgs),
    /// Write the filtered inventory as CSV
    Export(ExportArgs),
    /// Bulk import a CSV file; all rows or none
    Import(ImportArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(long)]
    pub code: String,
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub series: Option<String>,
    #[arg(long)]
    pub unit: Option<String>,
    #[arg(long = "box")]
    pub box_number: Option<i64>,
    #[arg(long = "volume")]
    pub volume_number: Option<i64>,
    #[arg(long)]
    pub folio_start: Option<i64>,
    #[arg(long)]
    pub folio_end: Option<i64>,
    /// YYYY-MM-DD
    #[arg(long)]
    pub record_date: Option<String>,
    #[arg(long)]
    pub shelf: Option<String>,
    #[arg(long)]
    pub body: Option<String>,
    #[arg(long)]
    pub tray: Option<String>,
    /// papel | digital | mixto | microfilm
    #[arg(long, default_value = "papel")]
    pub conservation: String,
    #[arg(long)]
    pub missing_volume: bool,
}

#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Substring over code, title and series
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub unit: Option<String>,
    #[arg(long)]
    pub series: Option<String>,
    #[arg(long)]
    pub record_date: Option<String>,
    #[arg(long = "box")]
    pub box_number: Option<i64>,
    #[arg(long)]
    pub conservation: Option<String>,
    #[arg(long)]
    pub missing_only: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
    #[arg(long)]
    pub limit: Option<u32>,
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Output file; stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    pub file: PathBuf,
}

pub fn run(runtime: &Runtime, command: DocCommand) -> Result<(), CliError> {
    match command {
        DocCommand::Add(args) => add(runtime, args),
        DocCommand::List(args) => list(runtime, args),
        DocCommand::Stats(args) => stats(runtime, args),
        DocCommand::Export(args) => export(runtime, args),
        DocCommand::Import(args) => import(runtime, args),
    }
}

fn add(runtime: &Runtime, args: AddArgs) -> Result<(), CliError> {
    let session = runtime.session()?;
    let mut draft = DocumentDraft::new(args.code, args.title);
    draft.series = args.series;
    draft.unit = args.unit;
    draft.box_number = args.box_number;
    draft.volume_number = args.volume_number;
    draft.folio_start = args.folio_start;
    draft.folio_end = args.folio_end;
    draft.record_date = args.record_date;
    draft.shelf = args.shelf;
    draft.body = args.body;
    draft.tray = args.tray;
    draft.conservation = parse_conservation(&args.conservation)?;
    draft.missing_volume = args.missing_volume;

    let document = runtime.ctx().inventory().create_document(session, draft)?;
    println!("created {} ({})", document.code, document.id);
    Ok(())
}

fn list(runtime: &Runtime, args: ListArgs) -> Result<(), CliError> {
    runtime.session()?;
    let page = Page {
        limit: args.limit,
        offset: args.offset,
    };
    let result = runtime
        .ctx()
        .inventory()
        .list_documents(to_filter(args.filter)?, page)?;

    for document in &result.rows {
        println!(
            "{:<16} {:<40} {:<10} {}",
            document.code,
            document.title,
            document.conservation.as_str(),
            document.location_label().unwrap_or_default()
        );
    }
    println!(
        "{} of {} (offset {}, limit {}){}",
        result.rows.len(),
        result.total,
        result.offset,
        result.applied_limit,
        if result.has_more() { ", more available" } else { "" }
    );
    Ok(())
}

fn stats(runtime: &Runtime, args: FilterArgs) -> Result<(), CliError> {
    runtime.session()?;
    let stats = runtime
        .ctx()
        .inventory()
        .inventory_stats(to_filter(args)?)?;
    println!("documents: {}", stats.total_documents);
    println!("missing volumes: {}", stats.missing_volumes);
    println!("on loan: {}", stats.documents_on_loan);
    for (conservation, count) in &stats.by_conservation {
        println!("  {:<10} {count}", conservation.as_str());
    }
    println!("units: {}", stats.units.join(", "));
    println!("series: {}", stats.series.join(", "));
    println!(
        "boxes: {}",
        stats
            .box_numbers
            .iter()
            .map(|number| number.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

fn export(runtime: &Runtime, args: ExportArgs) -> Result<(), CliError> {
    let session = runtime.session()?;
    let filter = to_filter(args.filter)?;
    let batch_size = runtime.ctx().config().interchange.export_batch_size;
    let inventory = runtime.ctx().inventory();

    let summary = match &args.output {
        Some(path) => {
            let writer = BufWriter::new(File::create(path)?);
            inventory.export_csv(session, filter, writer, batch_size)?
        }
        None => {
            let stdout = io::stdout();
            let summary = inventory.export_csv(session, filter, stdout.lock(), batch_size)?;
            io::stdout().flush()?;
            summary
        }
    };
    eprintln!("exported {} rows", summary.rows);
    Ok(())
}

fn import(runtime: &Runtime, args: ImportArgs) -> Result<(), CliError> {
    let session = runtime.session()?;
    let reader = BufReader::new(File::open(&args.file)?);
    let summary = runtime.ctx().inventory().import_csv(session, reader)?;
    println!("imported {} documents", summary.inserted);
    Ok(())
}

fn to_filter(args: FilterArgs) -> Result<DocumentFilter, CliError> {
    Ok(DocumentFilter {
        search: args.search,
        unit: args.unit,
        series: args.series,
        record_date: args.record_date,
        box_number: args.box_number,
        conservation: args
            .conservation
            .as_deref()
            .map(parse_conservation)
            .transpose()?,
        missing_only: args.missing_only,
    })
}

fn parse_conservation(value: &str) -> Result<Conservation, CliError> {
    Conservation::parse(value)
        .ok_or_else(|| CliError::Usage(format!("unknown conservation `{value}`")))
}
