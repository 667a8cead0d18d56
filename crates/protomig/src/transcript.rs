//! Migration transcripts: a SQL file recording what was attempted.

use camino::{Utf8Path, Utf8PathBuf};
use jiff::Zoned;
use std::fmt;

/// The statements planned for one source file, ready to be written out.
#[derive(Debug, Clone)]
pub struct Transcript {
    /// Source file stem, e.g. `widget` for `widget.proto`.
    pub source_name: String,
    pub generated_at: Zoned,
    pub statements: Vec<String>,
}

impl Transcript {
    /// A transcript stamped with the current local time.
    pub fn now(source_name: impl Into<String>, statements: Vec<String>) -> Self {
        Self {
            source_name: source_name.into(),
            generated_at: Zoned::now(),
            statements,
        }
    }

    /// `<YYYYMMDD_HHMMSS>_<source>_migration.sql`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_migration.sql",
            self.generated_at.strftime("%Y%m%d_%H%M%S"),
            self.source_name
        )
    }

    /// Write the transcript into `dir` (created if missing) and return the
    /// file's path.
    pub fn write_to(&self, dir: &Utf8Path) -> std::io::Result<Utf8PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, self.to_string())?;
        Ok(path)
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-- Auto-generated migration from protobuf")?;
        writeln!(f, "-- Proto: {}", self.source_name)?;
        writeln!(
            f,
            "-- Generated at: {}",
            self.generated_at.strftime("%Y-%m-%dT%H:%M:%S%:z")
        )?;
        writeln!(f)?;
        writeln!(f, "BEGIN;")?;
        writeln!(f)?;
        for statement in &self.statements {
            writeln!(f, "{}", statement)?;
        }
        writeln!(f)?;
        writeln!(f, "COMMIT;")
    }
}
