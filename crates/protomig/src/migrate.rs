//! The per-source pipeline: read, parse, translate, reconcile, apply.

use crate::{
    Database, Error, Result, SchemaDiff, Transcript, check_plan, reconcile, table_base_name,
    translate,
};
use camino::{Utf8Path, Utf8PathBuf};
use protomig_schema::Schema;

/// Options for [`migrate_source`].
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Where transcripts go. `None` skips writing them.
    pub sql_dir: Option<Utf8PathBuf>,
    /// Treat unparseable lines as errors instead of warnings.
    pub strict: bool,
    /// Compute the plan without writing or executing anything.
    pub dry_run: bool,
}

/// What happened to one source file.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The database already matches the declarations.
    UpToDate,
    /// Dry run: the plan that would have been applied.
    Planned(SchemaDiff),
    /// The plan was executed.
    Applied {
        /// Transcript path, when a transcript directory was given.
        transcript: Option<Utf8PathBuf>,
        statements: Vec<String>,
    },
}

/// Read and translate one source file into its declared schema.
///
/// Unparseable lines are logged as warnings, or returned as
/// [`Error::Parse`] in strict mode.
pub fn load_declared(path: &Utf8Path, strict: bool) -> Result<Schema> {
    let source = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    let source_name = source_name(path);

    let file = protomig_proto::parse(&source);
    if !file.skipped.is_empty() {
        if strict {
            return Err(Error::Parse {
                source_name,
                skipped: file.skipped,
            });
        }
        for skipped in &file.skipped {
            tracing::warn!(
                file = %path,
                line = skipped.line,
                text = %skipped.text,
                reason = %skipped.reason,
                "skipping unparseable line"
            );
        }
    }

    Ok(translate(&table_base_name(path), &file)?)
}

/// Bring the database in line with one source file.
///
/// The live schema is introspected fresh on every call. The plan is checked
/// against it before anything runs, and the transcript (if any) is written
/// before execution.
pub async fn migrate_source<D: Database>(
    db: &mut D,
    path: &Utf8Path,
    options: &MigrateOptions,
) -> Result<Outcome> {
    let declared = load_declared(path, options.strict)?;
    let current = db.introspect().await?;

    let diff = reconcile(&declared, &current);
    if diff.is_empty() {
        tracing::info!(file = %path, "no schema changes");
        return Ok(Outcome::UpToDate);
    }

    check_plan(&current, &diff)?;

    if options.dry_run {
        return Ok(Outcome::Planned(diff));
    }

    let statements = diff.statements();
    let transcript = match &options.sql_dir {
        Some(dir) => {
            let transcript = Transcript::now(source_name(path), statements.clone());
            let written = transcript.write_to(dir).map_err(|source| Error::Io {
                path: dir.join(transcript.file_name()),
                source,
            })?;
            tracing::info!(file = %path, transcript = %written, "wrote migration transcript");
            Some(written)
        }
        None => None,
    };

    db.execute(&statements).await?;
    tracing::info!(
        file = %path,
        statements = statements.len(),
        "applied schema changes"
    );

    Ok(Outcome::Applied {
        transcript,
        statements,
    })
}

/// The file stem as written, used to label transcripts and errors.
fn source_name(path: &Utf8Path) -> String {
    path.file_stem().unwrap_or(path.as_str()).to_string()
}
