//! hexweave binary.
//!
//! Opens a ROM image with its metadata and lists, prints, checks or grows the
//! runs the metadata describes.

mod cli;

use anyhow::{Context, bail};
use clap::Parser;
use cli::{Cli, Command};
use hexweave_primitives::{Notification, format_address};
use hexweave_runs::edit::append_elements;
use hexweave_runs::{DataModel, Metadata, Model, Run, Token};
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	setup_tracing(cli.verbose);

	let bytes = std::fs::read(&cli.rom).with_context(|| format!("reading {}", cli.rom.display()))?;
	let mut model = Model::new(bytes);
	let mut token = Token::new();
	let mut failures = Vec::new();
	if let Some(path) = cli.metadata_path() {
		let metadata = Metadata::load(&path).with_context(|| format!("loading metadata {}", path.display()))?;
		failures = metadata.apply(&mut model, &mut token);
		info!(path = %path.display(), anchors = metadata.named_anchors.len(), "metadata applied");
	}
	for (anchor, err) in &failures {
		warn!(name = %anchor.name, address = %format_address(anchor.address), %err, "anchor skipped");
	}

	match cli.command {
		Command::List => list(&model),
		Command::Show { name } => show(&model, &name)?,
		Command::Check => {
			let problems = check(&model) + failures.len();
			if problems > 0 {
				bail!("{problems} problem(s) found");
			}
			println!("ok");
		}
		Command::Append { name, count, output } => {
			let start = model
				.address_of_anchor(&name)
				.with_context(|| format!("no anchor named {name}"))?;
			let mut edit = Token::new();
			let notifications = append_elements(&mut model, &mut edit, start, count)?;
			for notification in &notifications {
				if let Notification::DataMoved { from, to, length } = notification {
					println!("moved {length} bytes from {} to {}", format_address(*from), format_address(*to));
				}
			}
			std::fs::write(&output, model.bytes()).with_context(|| format!("writing {}", output.display()))?;
			info!(name = %name, count, output = %output.display(), "records appended");
		}
	}
	Ok(())
}

fn list(model: &Model) {
	for run in model.runs() {
		let name = model.anchor_at(run.start()).unwrap_or("");
		println!(
			"{} {:>6} {:<16} {}",
			format_address(run.start()),
			run.length(),
			name,
			run.format()
		);
	}
}

fn show(model: &Model, name: &str) -> anyhow::Result<()> {
	let start = model
		.address_of_anchor(name)
		.with_context(|| format!("no anchor named {name}"))?;
	let run = model
		.run_at(start)
		.with_context(|| format!("{name} has no run"))?;
	match run {
		Run::Table(table) => println!("{}", table.serialize(model)),
		other => println!("{} {} ({} bytes)", format_address(start), other.format(), other.length()),
	}
	Ok(())
}

/// Prints the first invalid record of every table and returns how many tables had one.
fn check(model: &Model) -> usize {
	let mut problems = 0;
	for run in model.runs() {
		let Run::Table(table) = run else {
			continue;
		};
		let bad = (0..table.element_count()).find(|&element| !table.element_matches(model, element));
		if let Some(element) = bad {
			let name = model.anchor_at(table.start()).unwrap_or("");
			println!(
				"{} {name}: element {element} does not match {}",
				format_address(table.start()),
				table.format()
			);
			problems += 1;
		}
	}
	problems
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("hexweave=debug,hexweave_runs=debug,info")
		} else {
			EnvFilter::new("warn")
		}
	});
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}
