use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use loupe_storage::{
	db::Db,
	query::{self, Dimension},
};

#[derive(Debug, Parser)]
#[command(rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Aggregate stats across all recorded runs.
	Summary,
	/// Recent completed runs for one classification tag.
	Recent {
		#[arg(long)]
		intent: Option<String>,
		#[arg(long)]
		domain: Option<String>,
		#[arg(long)]
		project: Option<String>,
		#[arg(long, default_value_t = 20)]
		limit: i64,
	},
	/// Completed runs that failed the quality gate.
	Failures {
		#[arg(long, default_value_t = 10)]
		limit: i64,
	},
	/// Completed runs where one category scored below a threshold.
	LowScoring {
		category: String,
		#[arg(long, default_value_t = 2.0)]
		threshold: f64,
		#[arg(long, default_value_t = 50)]
		limit: i64,
	},
	/// Runs flagged for calibration review.
	Flagged {
		#[arg(long, default_value_t = 20)]
		limit: i64,
	},
	/// Categories that recur as gaps across completed runs.
	Patterns {
		#[arg(long, default_value_t = 3)]
		min_occurrences: i64,
	},
	/// Compare two runs side-by-side.
	Compare { trace_id_a: String, trace_id_b: String },
	/// The full stored document for one run.
	Show { trace_id: String },
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = loupe_config::load(&args.config)?;

	init_tracing(&config);

	let db = Db::connect(&config.storage.postgres).await?;

	match args.command {
		Command::Summary => print_json(&query::summary(&db).await?)?,
		Command::Recent { intent, domain, project, limit } => {
			let (dimension, value) = match (intent, domain, project) {
				(Some(value), None, None) => (Dimension::Intent, value),
				(None, Some(value), None) => (Dimension::Domain, value),
				(None, None, Some(value)) => (Dimension::Project, value),
				_ => {
					return Err(eyre::eyre!(
						"Pass exactly one of --intent, --domain, or --project."
					));
				},
			};

			print_json(&query::by_dimension(&db, dimension, &value, limit).await?)?;
		},
		Command::Failures { limit } => print_json(&query::quality_gate_failures(&db, limit).await?)?,
		Command::LowScoring { category, threshold, limit } =>
			print_json(&query::low_scoring(&db, &category, threshold, limit).await?)?,
		Command::Flagged { limit } => print_json(&query::flagged_for_review(&db, limit).await?)?,
		Command::Patterns { min_occurrences } =>
			print_json(&query::category_patterns(&db, min_occurrences).await?)?,
		Command::Compare { trace_id_a, trace_id_b } =>
			print_json(&query::compare(&db, &trace_id_a, &trace_id_b).await?)?,
		Command::Show { trace_id } => match query::full_document(&db, &trace_id).await? {
			Some(document) => print_json(&document)?,
			None => eprintln!("Trace {trace_id} not found or artifact unreadable."),
		},
	}

	Ok(())
}

fn init_tracing(config: &loupe_config::Config) {
	let filter = EnvFilter::try_new(&config.service.log_level)
		.unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_json<T>(value: &T) -> color_eyre::Result<()>
where
	T: Serialize,
{
	println!("{}", serde_json::to_string_pretty(value)?);

	Ok(())
}
