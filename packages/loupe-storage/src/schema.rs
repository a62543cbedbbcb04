/// Row-store schema: one denormalized row per run, indexed for every
/// classification tag, the pass flag, the review flag, and (via GIN) the
/// per-category score map. Reporting views ride along.
pub fn render_schema() -> &'static str {
	SCHEMA
}

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS traces (
	id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
	trace_id VARCHAR(100) UNIQUE NOT NULL,
	project_id UUID,
	project_name TEXT,

	query TEXT,
	intent VARCHAR(50),
	domain VARCHAR(100),
	report_type VARCHAR(100),
	research_type VARCHAR(100),

	status VARCHAR(20) NOT NULL DEFAULT 'in_progress',
	quality_gate_passed BOOLEAN,
	overall_quality_score DOUBLE PRECISION,

	started_at TIMESTAMPTZ NOT NULL,
	completed_at TIMESTAMPTZ,
	duration_seconds DOUBLE PRECISION,

	intake_duration DOUBLE PRECISION,
	rubric_duration DOUBLE PRECISION,
	collection_duration DOUBLE PRECISION,
	synthesis_duration DOUBLE PRECISION,
	quality_gate_duration DOUBLE PRECISION,

	evidence_collected INT,
	evidence_passed INT,
	evidence_filtered INT,

	synthesis_model VARCHAR(100),
	synthesis_input_tokens INT,
	synthesis_output_tokens INT,
	synthesis_cost_usd DOUBLE PRECISION,

	category_scores JSONB NOT NULL DEFAULT '{}',
	gap_categories TEXT[],
	strength_categories TEXT[],

	iteration_count INT NOT NULL DEFAULT 0,
	failure_count INT NOT NULL DEFAULT 0,

	trace_file_path VARCHAR(500),
	report_file_path VARCHAR(500),
	output_file_paths TEXT[],

	flagged_for_review BOOLEAN NOT NULL DEFAULT FALSE,
	review_notes TEXT,

	tier_config TEXT,
	rubric_scores JSONB,
	category_breakdown JSONB,
	qg_iteration_count INT,
	retrieval_method TEXT,
	evidence_retrieved INT,
	evidence_used INT,
	retrieval_tokens INT,
	retrieval_cost_usd DOUBLE PRECISION,

	created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_traces_intent ON traces(intent);
CREATE INDEX IF NOT EXISTS idx_traces_domain ON traces(domain);
CREATE INDEX IF NOT EXISTS idx_traces_report_type ON traces(report_type);
CREATE INDEX IF NOT EXISTS idx_traces_project_name ON traces(project_name);
CREATE INDEX IF NOT EXISTS idx_traces_status ON traces(status);
CREATE INDEX IF NOT EXISTS idx_traces_quality_gate ON traces(quality_gate_passed);
CREATE INDEX IF NOT EXISTS idx_traces_project ON traces(project_id);
CREATE INDEX IF NOT EXISTS idx_traces_started ON traces(started_at DESC);
CREATE INDEX IF NOT EXISTS idx_traces_flagged ON traces(flagged_for_review) WHERE flagged_for_review = TRUE;

CREATE INDEX IF NOT EXISTS idx_traces_category_scores ON traces USING GIN (category_scores);
CREATE INDEX IF NOT EXISTS idx_traces_rubric_scores ON traces USING GIN (rubric_scores);

CREATE OR REPLACE VIEW trace_quality_gaps AS
SELECT
	trace_id,
	project_id,
	project_name,
	intent,
	domain,
	report_type,
	overall_quality_score,
	quality_gate_passed,
	gap_categories,
	category_scores,
	started_at
FROM traces
WHERE status = 'complete'
	AND array_length(gap_categories, 1) > 0
ORDER BY started_at DESC;

CREATE OR REPLACE VIEW trace_intent_summary AS
SELECT
	intent,
	COUNT(*) AS total_runs,
	COUNT(*) FILTER (WHERE quality_gate_passed = TRUE) AS passed,
	COUNT(*) FILTER (WHERE quality_gate_passed = FALSE) AS failed,
	AVG(overall_quality_score) AS avg_quality,
	AVG(duration_seconds) AS avg_duration,
	AVG(synthesis_cost_usd) AS avg_cost
FROM traces
WHERE status = 'complete'
GROUP BY intent
ORDER BY total_runs DESC;
";
