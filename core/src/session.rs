use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::catalog::{Catalog, FixRef};
use crate::query::{self, Category};

// ---------------------------------------------------------------------------
// Operator-facing text
// ---------------------------------------------------------------------------

const QUERY_MENU: &str = "Type a query to add the corresponding fixes to the playbook. Type 'q' to quit.\n\
Alternatively, type --list to see all catalog entries, --lang for a query language description, \
or --categories to see the available categories.";

const LANG_HELP: &str = "Begin your query with CATEGORY, CAT_RATING, or GROUP_ID.\n\
Then use the = operator to specify exact input, followed by a requested value. \
CAT_RATING queries may also use <, <=, >, >=.\n\
Example queries: CATEGORY = SSH | CAT_RATING < 3 | GROUP_ID = 258145 (without pipes.)";

// ---------------------------------------------------------------------------
// Selection set
// ---------------------------------------------------------------------------

/// Group ids already appended to this session's output document. Grows
/// monotonically and never shrinks; its lifetime is the session's, not the
/// process's.
#[derive(Debug, Default)]
pub struct SelectionSet {
    seen: HashSet<i64>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter `candidates` down to those not yet admitted, recording them.
    /// Per-call order is preserved; a group id that was admitted by any
    /// earlier call (or earlier in this one) is dropped.
    pub fn admit(&mut self, candidates: Vec<FixRef>) -> Vec<FixRef> {
        candidates
            .into_iter()
            .filter(|fix| self.seen.insert(fix.group_id))
            .collect()
    }

    pub fn contains(&self, group_id: i64) -> bool {
        self.seen.contains(&group_id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Assembly errors
// ---------------------------------------------------------------------------

/// Fatal assembly failures. Both variants end the session: once admission has
/// happened the document may be partially extended, so callers must not
/// continue as if the query merely failed.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// A catalog entry points at content that cannot be read. The entry was
    /// validated at insertion, so this is data corruption, not operator error.
    #[error("fix {group_id} references unreadable content at {path}")]
    MissingContent {
        group_id: i64,
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed writing to output document {path}")]
    DocumentWrite {
        path: String,
        #[source]
        source: io::Error,
    },
}

// ---------------------------------------------------------------------------
// Output document
// ---------------------------------------------------------------------------

/// Append-only playbook file, seeded from the template before the first
/// query is accepted. Never truncated; final when the session ends.
pub struct OutputDocument {
    path: PathBuf,
    file: File,
}

impl OutputDocument {
    /// Create `path`, refusing to overwrite an existing file, and seed it
    /// byte-for-byte from `template`.
    pub fn create(path: &Path, template: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("failed to create output document {}", path.display()))?;
        let mut template_file = File::open(template)
            .with_context(|| format!("failed to open template {}", template.display()))?;
        io::copy(&mut template_file, &mut file)
            .with_context(|| format!("failed to seed {} from template", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append each fix's content verbatim, in the given order, no delimiters.
    ///
    /// Per fix this is all-or-nothing: content is read fully before any byte
    /// is written. A failure on a later fix leaves earlier fixes appended —
    /// the error is fatal, so nothing resumes writing after it.
    pub fn append_fixes(&mut self, fixes: &[FixRef]) -> Result<(), AssembleError> {
        for fix in fixes {
            let mut content = Vec::new();
            File::open(&fix.content_path)
                .and_then(|mut f| f.read_to_end(&mut content))
                .map_err(|source| AssembleError::MissingContent {
                    group_id: fix.group_id,
                    path: fix.content_path.clone(),
                    source,
                })?;
            self.file
                .write_all(&content)
                .map_err(|source| AssembleError::DocumentWrite {
                    path: self.path.display().to_string(),
                    source,
                })?;
            tracing::debug!(group_id = fix.group_id, bytes = content.len(), "appended fix");
        }
        self.file
            .flush()
            .map_err(|source| AssembleError::DocumentWrite {
                path: self.path.display().to_string(),
                source,
            })
    }
}

// ---------------------------------------------------------------------------
// Session controller
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error("session i/o failed")]
    Io(#[from] io::Error),
}

/// Drives the parse → execute → admit → append loop for one output document.
///
/// Constructed only after the document exists, so the loop starts in its
/// awaiting-query state with the template already written. Generic over the
/// input/output streams so tests can script a whole session.
pub struct Session<'a> {
    catalog: &'a Catalog,
    selected: SelectionSet,
    document: OutputDocument,
}

impl<'a> Session<'a> {
    pub fn new(catalog: &'a Catalog, document: OutputDocument) -> Self {
        Self {
            catalog,
            selected: SelectionSet::new(),
            document,
        }
    }

    pub fn selected(&self) -> &SelectionSet {
        &self.selected
    }

    /// Run the interactive loop until 'q' or end of input. One query fully
    /// completes before the next line is read; info commands display and
    /// return to the prompt. Recoverable errors (bad queries, store failures)
    /// are reported and the loop continues; assembly errors end the session.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        out: &mut W,
    ) -> Result<(), SessionError> {
        writeln!(out, "\n{QUERY_MENU}")?;
        let mut line = String::new();
        loop {
            write!(out, "\nquery> ")?;
            out.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                break; // EOF terminates like 'q'
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match trimmed.to_ascii_lowercase().as_str() {
                "q" => {
                    writeln!(out, "\nExiting generator...")?;
                    break;
                }
                "--lang" => writeln!(out, "\n{LANG_HELP}")?,
                "--categories" => {
                    let names: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
                    writeln!(out, "\nCategories: {}", names.join(" "))?;
                }
                "--list" => self.list_fixes(out)?,
                _ => self.dispatch(trimmed, out)?,
            }
        }
        tracing::info!(
            fixes = self.selected.len(),
            document = %self.document.path().display(),
            "session terminated"
        );
        Ok(())
    }

    fn list_fixes<W: Write>(&self, out: &mut W) -> Result<(), SessionError> {
        match self.catalog.all_fixes() {
            Ok(fixes) => {
                writeln!(out)?;
                for fix in fixes {
                    writeln!(
                        out,
                        "{}  {}  CAT {}  {}",
                        fix.group_id, fix.category, fix.cat_rating, fix.content_path
                    )?;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to list catalog");
                writeln!(out, "\nCould not list the catalog: {e:#}")?;
            }
        }
        Ok(())
    }

    /// One query, start to finish. Parse and store failures are reported and
    /// discarded with no admission and no writes; assembly failures propagate.
    fn dispatch<W: Write>(&mut self, raw: &str, out: &mut W) -> Result<(), SessionError> {
        let parsed = match query::parse(raw) {
            Ok(q) => q,
            Err(e) => {
                writeln!(out, "\nInvalid query: {e}")?;
                return Ok(());
            }
        };

        let candidates = match self.catalog.select_fixes(&parsed) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(query = %parsed, error = %e, "catalog lookup failed");
                writeln!(out, "\nQuery failed, nothing was added: {e:#}")?;
                return Ok(());
            }
        };

        let admitted = self.selected.admit(candidates);
        if admitted.is_empty() {
            writeln!(out, "\nNo new fixes matched {parsed} (duplicates are excluded).")?;
            return Ok(());
        }

        writeln!(out, "\nValid query! Loading results, excluding duplicates...")?;
        for fix in &admitted {
            writeln!(out, "{}", fix.content_path)?;
        }
        self.document.append_fixes(&admitted)?;
        writeln!(
            out,
            "\nAdded {} fix(es) to {}.",
            admitted.len(),
            self.document.path().display()
        )?;
        Ok(())
    }
}
