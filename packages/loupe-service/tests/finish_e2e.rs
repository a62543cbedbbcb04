use serde_json::{Map, Value, json};

use loupe_config::{Calibration, Config, Postgres, Service, Storage, Tracing};
use loupe_service::RunContext;
use loupe_storage::{
	db::Db,
	query::{self, Dimension},
	writer,
};
use loupe_testkit::TestDatabase;
use loupe_trace::{DecisionData, RunMetadata, Trace, model::stages};

fn map(value: Value) -> Map<String, Value> {
	value.as_object().cloned().unwrap_or_default()
}

async fn setup(
	test_name: &str,
	archive_root: &std::path::Path,
) -> Option<(TestDatabase, RunContext)> {
	let Some(base_dsn) = loupe_testkit::env_dsn() else {
		eprintln!("Skipping {test_name}; set LOUPE_PG_DSN to run this test.");

		return None;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Config {
		service: Service::default(),
		storage: Storage {
			postgres: Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 },
			archive_root: archive_root.to_path_buf(),
		},
		tracing: Tracing { enabled: true },
		calibration: Calibration::default(),
	};
	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	Some((test_db, RunContext::new(cfg, db)))
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LOUPE_PG_DSN to run."]
async fn finish_persists_both_sinks_and_round_trips() {
	let root = tempfile::tempdir().unwrap();
	let Some((test_db, ctx)) =
		setup("finish_persists_both_sinks_and_round_trips", root.path()).await
	else {
		return;
	};

	RunContext::scope(async {
		let handle = ctx.start(RunMetadata {
			project_name: Some("edtech".to_string()),
			intent: Some("validating".to_string()),
			domain: Some("edtech".to_string()),
			query: Some("Do spaced-repetition apps improve retention?".to_string()),
			..Default::default()
		});

		handle.start_stage(stages::INTAKE);
		handle.record(
			stages::INTAKE,
			"classified_intent",
			DecisionData {
				value: json!("validating"),
				rationale: "User has an existing hypothesis.".to_string(),
				confidence: Some(0.85),
				..Default::default()
			},
		);
		handle.end_stage(stages::INTAKE, None, None);
		handle.start_stage(stages::QUALITY_GATE);
		handle.end_stage(
			stages::QUALITY_GATE,
			Some(map(json!({
				"passed": true,
				"overall_score": 2.7,
				"category_scores": {"META-1": 3, "META-2": 2.5},
			}))),
			None,
		);
		handle.mark_complete();

		let outcome = ctx.finish(handle).await;

		assert!(outcome.saved);
		assert!(outcome.row_saved);
		assert!(outcome.row_error.is_none());

		let artifact_path = outcome.artifact_path.expect("Expected an artifact path.");
		let trace_id = outcome.trace_id.expect("Expected a trace id.");

		assert!(artifact_path.exists());

		// The row points back at the artifact and the document reads back
		// with every recorded field.
		let rows = query::by_dimension(&ctx.db, Dimension::Intent, "validating", 10)
			.await
			.expect("Failed to query by intent.");

		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].trace_id, trace_id);
		assert_eq!(
			rows[0].trace_file_path.as_deref(),
			Some(artifact_path.display().to_string().as_str()),
		);

		let document = query::full_document(&ctx.db, &trace_id)
			.await
			.expect("Failed to load document.")
			.expect("Expected a stored document.");

		assert_eq!(document["run"]["status"], json!("complete"));
		assert_eq!(
			document["stages"]["intake"]["decisions"][0]["category"],
			json!("classified_intent"),
		);
	})
	.await;
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LOUPE_PG_DSN to run."]
async fn firing_flags_flip_the_review_bit_and_append_the_alert_file() {
	let root = tempfile::tempdir().unwrap();
	let Some((test_db, ctx)) =
		setup("firing_flags_flip_the_review_bit_and_append_the_alert_file", root.path()).await
	else {
		return;
	};

	// History: the same category has already gapped three times this week.
	for _ in 0..3 {
		let mut seeded = Trace::begin(
			loupe_trace::id::generate(time::OffsetDateTime::now_utc()),
			RunMetadata { project_name: Some("edtech".to_string()), ..Default::default() },
		);

		seeded.start_stage(stages::QUALITY_GATE);
		seeded.end_stage(
			stages::QUALITY_GATE,
			Some(map(json!({"passed": false, "gap_categories": ["META-12"]}))),
			None,
		);
		seeded.mark_complete();
		writer::write_row(&ctx.db, &seeded).await.expect("Failed to seed trace row.");
	}

	RunContext::scope(async {
		let handle = ctx.start(RunMetadata {
			project_name: Some("edtech".to_string()),
			..Default::default()
		});

		handle.start_stage(stages::QUALITY_GATE);
		handle.end_stage(
			stages::QUALITY_GATE,
			Some(map(json!({"passed": false, "gap_categories": ["META-12"]}))),
			None,
		);
		handle.mark_complete();

		let outcome = ctx.finish(handle).await;

		assert_eq!(outcome.calibration_flags.len(), 1);
		assert!(outcome.calibration_flags[0].contains("META-12"));
		assert!(outcome.flagged_for_review);

		let flagged =
			query::flagged_for_review(&ctx.db, 10).await.expect("Failed to query flagged.");

		assert_eq!(flagged.len(), 1);
		assert_eq!(flagged[0].trace_id.as_str(), outcome.trace_id.as_deref().unwrap());
	})
	.await;

	let alert_file = root.path().join("projects/edtech/_calibration_alerts.md");
	let rendered = std::fs::read_to_string(alert_file).expect("Expected an alert file.");

	assert!(rendered.starts_with("# Calibration Alerts"));
	assert!(rendered.contains("META-12"));
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
