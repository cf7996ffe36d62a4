/// Inline SQL migrations for the agent status database schema.
///
/// We use simple inline migrations rather than sqlx migration files
/// because the schema is small and self-contained. Versions are 1-based
/// positions in this slice; never reorder or edit an applied entry.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: jobs table
    r#"
CREATE TABLE IF NOT EXISTS jobs (
    id         TEXT PRIMARY KEY,
    title      TEXT NOT NULL DEFAULT '',
    metadata   TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);
"#,
    // Migration 2: updates table. The id is the global update sequence.
    // No foreign key on job_id: job existence is checked at the API layer.
    r#"
CREATE TABLE IF NOT EXISTS updates (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id   TEXT NOT NULL,
    status   TEXT NOT NULL,
    stage    TEXT,
    progress INTEGER CHECK (progress IS NULL OR (progress BETWEEN 0 AND 100)),
    payload  TEXT NOT NULL DEFAULT '{}',
    ts       TEXT NOT NULL
);
"#,
    // Migration 3: per-job range reads (WHERE job_id = ? AND id > ? ORDER BY id)
    r#"
CREATE INDEX IF NOT EXISTS idx_updates_job_id_id ON updates(job_id, id);
"#,
];
