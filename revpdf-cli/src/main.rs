use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use revpdf::parser::{PdfDictionary, PdfObject, PdfString};
use revpdf::writer::write_object_value;
use revpdf::{WriterConfig, XRefStyle, XRefWriter, XRefWriterOptions};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "revpdf",
    about = "Inspect, extract and incrementally update PDF revisions",
    version,
    author
)]
struct Cli {
    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the revisions of a PDF file, newest first
    Revisions {
        /// Input PDF file
        input: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the trailer dictionary of a revision
    Trailer {
        /// Input PDF file
        input: PathBuf,

        /// Revision index (0 is the newest)
        #[arg(short, long, default_value = "0")]
        revision: usize,
    },

    /// Write one revision as a standalone PDF file
    Extract {
        /// Input PDF file
        input: PathBuf,

        /// Revision index (0 is the newest)
        #[arg(short, long)]
        revision: usize,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Set a document information entry and append it as a new revision
    SetInfo {
        /// PDF file to update in place
        input: PathBuf,

        /// Info dictionary key (e.g. Title, Author)
        key: String,

        /// New value
        value: String,

        /// Write a cross-reference stream instead of a classic table
        #[arg(long)]
        xref_stream: bool,
    },
}

#[derive(Serialize)]
struct RevisionReport {
    index: usize,
    xref_offset: u64,
    /// `None` when the section does not lie after the previous one
    size: Option<u64>,
}

#[derive(Serialize)]
struct DocumentReport {
    file: String,
    linearized: bool,
    objects: u32,
    /// Why the revision scan stopped, when it did not end at the first revision
    damaged_chain: Option<String>,
    revisions: Vec<RevisionReport>,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn open(input: &Path) -> Result<XRefWriter<File>> {
    XRefWriter::open(input).with_context(|| format!("Failed to open {}", input.display()))
}

fn render(object: &PdfObject) -> Result<String> {
    let mut buf = Vec::new();
    write_object_value(&mut buf, object)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn document_report(input: &Path) -> Result<DocumentReport> {
    let mut xrw = open(input)?;
    let mut revisions = Vec::with_capacity(xrw.revision_count());
    for (index, &xref_offset) in xrw.revisions().to_vec().iter().enumerate() {
        revisions.push(RevisionReport {
            index,
            xref_offset,
            size: Some(xrw.revision_size(index, true)?).filter(|&size| size > 0),
        });
    }

    Ok(DocumentReport {
        file: input.display().to_string(),
        linearized: xrw.is_linearized(),
        objects: xrw.num_objects(),
        damaged_chain: xrw
            .revision_scan_end()
            .filter(|end| end.is_corruption())
            .map(|end| format!("{end:?}")),
        revisions,
    })
}

fn print_revisions(input: &Path, json: bool) -> Result<()> {
    let report = document_report(input)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Revisions of: {}", report.file);
    println!("==========================================");
    if report.linearized {
        println!("Linearized: yes (revisions are not browsable)");
    }
    println!("Objects: {}", report.objects);
    for rev in &report.revisions {
        match rev.size {
            Some(size) => println!(
                "Revision {}: xref at {}, {size} bytes",
                rev.index, rev.xref_offset
            ),
            None => println!(
                "Revision {}: xref at {}, size unknown (section out of order)",
                rev.index, rev.xref_offset
            ),
        }
    }
    if let Some(reason) = &report.damaged_chain {
        println!("Warning: revision chain is damaged ({reason})");
    }
    Ok(())
}

fn print_trailer(input: &Path, revision: usize) -> Result<()> {
    let mut xrw = open(input)?;
    if revision != 0 {
        xrw.change_revision(revision)?;
    }

    println!("Trailer of revision {revision}:");
    for (key, value) in xrw.trailer().iter() {
        println!("  /{} {}", key.as_str(), render(value)?);
    }
    Ok(())
}

fn extract_revision(input: &Path, revision: usize, output: &Path) -> Result<()> {
    let mut xrw = open(input)?;
    xrw.change_revision(revision)?;

    let mut out = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    xrw.clone_revision(&mut out)?;

    println!("✓ Revision {revision} written to: {}", output.display());
    Ok(())
}

fn set_info(input: &Path, key: &str, value: &str, xref_stream: bool) -> Result<()> {
    if key.is_empty() {
        bail!("Info key must not be empty");
    }

    let mut options = XRefWriterOptions::default();
    if xref_stream {
        options = options.with_writer(WriterConfig {
            xref_style: XRefStyle::Stream,
            ..WriterConfig::default()
        });
    }
    let file = revpdf::io::open_file(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let mut xrw = XRefWriter::with_options(file, options)?;

    let existing = xrw.trailer().get("Info").and_then(PdfObject::as_reference);
    let (info_ref, mut info) = match existing {
        Some(reference) => {
            let dict = match xrw.fetch(reference)? {
                PdfObject::Dictionary(dict) => dict,
                other => bail!("Info {reference} is a {}, not a dictionary", other.kind()),
            };
            (reference, dict)
        }
        None => (xrw.reserve_ref()?, PdfDictionary::new()),
    };

    info.insert(key, PdfObject::String(PdfString::from(value)));
    xrw.change_object(info_ref, PdfObject::Dictionary(info))?;
    if existing.is_none() {
        xrw.change_trailer("Info", PdfObject::Reference(info_ref))?;
    }
    xrw.save_changes(true)?;

    info!("Info {info_ref} updated in {}", input.display());
    println!(
        "✓ /{key} set, {} now has {} revision(s)",
        input.display(),
        xrw.revision_count()
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Revisions { input, json } => print_revisions(&input, json)?,
        Commands::Trailer { input, revision } => print_trailer(&input, revision)?,
        Commands::Extract {
            input,
            revision,
            output,
        } => extract_revision(&input, revision, &output)?,
        Commands::SetInfo {
            input,
            key,
            value,
            xref_stream,
        } => set_info(&input, &key, &value, xref_stream)?,
    }

    Ok(())
}
