//! Parser dispatch: detect, select a backend, probe, parse
//!
//! The throwing entry points return [`grove_core::Result`]; the `_safe`
//! variants fold every fatal error into a [`SafeResult`] message.

use std::path::{Path, PathBuf};

use grove_core::{
    CancellationFlag, CodeGraphSchema, GraphError, Language, ParseOptions, Result, SafeResult,
};

use crate::backend::{Availability, ParserBackend};
use crate::detect;
use crate::languages::{PhpRuntime, RubyRuntime};
use crate::managed::TypeScriptBackend;
use crate::subprocess::SubprocessBackend;

/// The closed set of backends.
pub enum Backend {
    Managed(TypeScriptBackend),
    Php(SubprocessBackend<PhpRuntime>),
    Ruby(SubprocessBackend<RubyRuntime>),
}

impl Backend {
    /// Select the backend for `language`. `mixed` has none.
    pub fn for_language(language: Language, options: &ParseOptions, root: &Path) -> Result<Self> {
        match language {
            Language::TypeScript | Language::JavaScript => {
                Ok(Backend::Managed(TypeScriptBackend::new(language)))
            }
            Language::Php => Ok(Backend::Php(SubprocessBackend::new(PhpRuntime::new(options, root)))),
            Language::Ruby => Ok(Backend::Ruby(SubprocessBackend::new(RubyRuntime::new(options)))),
            Language::Mixed => Err(GraphError::LanguageUnsupported(language)),
        }
    }

    fn inner(&self) -> &dyn ParserBackend {
        match self {
            Backend::Managed(backend) => backend,
            Backend::Php(backend) => backend,
            Backend::Ruby(backend) => backend,
        }
    }

    /// Fail with `RuntimeUnavailable` unless the backend can run.
    pub fn ensure_available(&self) -> Result<()> {
        match self {
            Backend::Managed(_) => Ok(()),
            Backend::Php(backend) => backend.ensure_available(),
            Backend::Ruby(backend) => backend.ensure_available(),
        }
    }
}

impl ParserBackend for Backend {
    fn language(&self) -> Language {
        self.inner().language()
    }

    fn probe(&self) -> Availability {
        self.inner().probe()
    }

    fn parse(&self, root: &Path, options: &ParseOptions, cancel: &CancellationFlag) -> Result<CodeGraphSchema> {
        self.inner().parse(root, options, cancel)
    }
}

fn canonical_root(repo: &Path) -> Result<PathBuf> {
    let root = std::fs::canonicalize(repo)
        .map_err(|e| GraphError::malformed(repo, format!("cannot resolve path: {e}")))?;
    if !root.is_dir() {
        return Err(GraphError::malformed(repo, "not a directory"));
    }
    Ok(root)
}

/// Detect the repository language.
pub fn detect_language(repo: &Path) -> Result<Language> {
    detect::detect_language(repo)
}

pub fn detect_language_safe(repo: &Path) -> SafeResult<Language> {
    detect_language(repo).into()
}

pub fn parse_code_graph(repo: &Path, options: &ParseOptions) -> Result<CodeGraphSchema> {
    parse_code_graph_with_cancel(repo, options, &CancellationFlag::new())
}

/// Parse with a cancellation flag. Subprocess backends kill their running
/// interpreters; the managed backend stops between files.
pub fn parse_code_graph_with_cancel(
    repo: &Path,
    options: &ParseOptions,
    cancel: &CancellationFlag,
) -> Result<CodeGraphSchema> {
    let root = canonical_root(repo)?;
    let language = match options.language {
        Some(language) => language,
        None => detect::detect_language(&root)?,
    };
    tracing::debug!("Dispatching {} to the {} backend", root.display(), language);

    let backend = Backend::for_language(language, options, &root)?;
    backend.ensure_available()?;

    if cancel.is_cancelled() {
        return Err(GraphError::Cancelled);
    }
    backend.parse(&root, options, cancel)
}

/// Run a parse on the blocking thread pool.
pub async fn parse_code_graph_async(
    repo: PathBuf,
    options: ParseOptions,
    cancel: CancellationFlag,
) -> Result<CodeGraphSchema> {
    let task = tokio::task::spawn_blocking(move || parse_code_graph_with_cancel(&repo, &options, &cancel));
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(GraphError::Cancelled),
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}

pub fn parse_code_graph_safe(repo: &Path, options: &ParseOptions) -> SafeResult<CodeGraphSchema> {
    parse_code_graph(repo, options).into()
}
