//! Brand collection DDL and declared version transitions.

/// Schema version expected by this build, tracked via `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 3;

/// DDL for the current collection shape. Records are keyed by UUID string;
/// the secondary indexes are non-unique.
pub const CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS brands (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    owner TEXT NOT NULL,
    lang TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_brands_name ON brands(name);
CREATE INDEX IF NOT EXISTS idx_brands_status ON brands(status);
CREATE INDEX IF NOT EXISTS idx_brands_owner ON brands(owner);
CREATE INDEX IF NOT EXISTS idx_brands_lang ON brands(lang);
CREATE INDEX IF NOT EXISTS idx_brands_created ON brands(created_at);
"#;

/// How a single version upgrade treats existing rows.
pub enum Transition {
  /// Breaking change: drop and recreate the collection.
  Recreate,
  /// Additive change: apply the DDL, keep rows.
  #[allow(dead_code)]
  Additive(&'static str),
}

/// Declared upgrade steps, keyed by target version. Opening a store whose
/// stored version is below `SCHEMA_VERSION` walks every step above it, in
/// order. The declaration is the single source of truth for whether an
/// upgrade clears or preserves the collection.
pub const TRANSITIONS: &[(i64, Transition)] = &[
  // v2 dropped rows written before timestamps were mandatory.
  (2, Transition::Recreate),
  // v3 changed record identity from numeric rowids to UUID strings.
  (3, Transition::Recreate),
];
