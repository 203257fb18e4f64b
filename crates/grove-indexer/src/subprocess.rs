//! Shared driver for backends that run an external interpreter per file
//!
//! The interpreter prints one JSON document of facts per file. Files whose
//! process fails, times out or prints something undecodable are skipped and
//! reported in `skippedFiles`; the rest are assembled into the schema.

use std::path::Path;

use grove_core::{
    CancellationFlag, CodeGraphSchema, FileProcessingError, GraphBuilder, GraphError, Language,
    ParseOptions, Result,
};
use serde::de::DeserializeOwned;

use crate::backend::{Availability, ParserBackend};
use crate::process_pool::{Invocation, ProcessError, ProcessPool};
use crate::walk::{SourceFile, SourceProfile, discover};

/// One interpreter-backed language.
pub trait ScriptRuntime: Send + Sync {
    /// Facts printed by the extractor script for one file.
    type Facts: DeserializeOwned;

    /// Runtime name used in errors (`php`, `ruby`).
    fn name(&self) -> &'static str;

    fn language(&self) -> Language;

    fn profile(&self) -> &'static SourceProfile;

    /// Interpreter and parser library checks.
    fn probe(&self) -> Availability;

    /// Shown when the probe fails.
    fn install_hint(&self) -> &'static str;

    fn invocation(&self, root: &Path, file: &SourceFile) -> Invocation;

    /// Turn the decoded facts of every processed file into nodes and relations.
    fn assemble(&self, builder: &mut GraphBuilder, files: &[(SourceFile, Self::Facts)]);
}

pub struct SubprocessBackend<R> {
    runtime: R,
}

impl<R: ScriptRuntime> SubprocessBackend<R> {
    pub fn new(runtime: R) -> Self {
        SubprocessBackend { runtime }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Probe, failing with an installation hint when the runtime is missing.
    pub fn ensure_available(&self) -> Result<()> {
        match self.runtime.probe() {
            Availability::Available => Ok(()),
            Availability::Unavailable { reason } => {
                tracing::warn!("{} runtime unavailable: {}", self.runtime.name(), reason);
                Err(GraphError::RuntimeUnavailable {
                    runtime: self.runtime.name().to_string(),
                    reason,
                    hint: self.runtime.install_hint().to_string(),
                })
            }
        }
    }

    fn file_error(&self, file: &SourceFile, invocation: &Invocation, error: ProcessError) -> FileProcessingError {
        let path = file.relative.clone();
        match error {
            ProcessError::Spawn(source) => FileProcessingError::Spawn {
                path,
                program: invocation.program.display().to_string(),
                source,
            },
            ProcessError::Timeout(timeout) => FileProcessingError::Timeout {
                path,
                seconds: timeout.as_secs(),
            },
            ProcessError::Failed { status, stderr } => FileProcessingError::Interpreter {
                path,
                status: status.to_string(),
                stderr,
            },
            ProcessError::Cancelled => FileProcessingError::Cancelled { path },
            ProcessError::WorkerLost => FileProcessingError::Interpreter {
                path,
                status: "unknown".to_string(),
                stderr: ProcessError::WorkerLost.to_string(),
            },
        }
    }
}

impl<R: ScriptRuntime> ParserBackend for SubprocessBackend<R> {
    fn language(&self) -> Language {
        self.runtime.language()
    }

    fn probe(&self) -> Availability {
        self.runtime.probe()
    }

    fn parse(&self, root: &Path, options: &ParseOptions, cancel: &CancellationFlag) -> Result<CodeGraphSchema> {
        let files = discover(root, options, self.runtime.profile())?;
        let workers = options.jobs().min(files.len()).max(1);
        tracing::info!(
            "Parsing {} {} files in {} with {} workers",
            files.len(),
            self.runtime.name(),
            root.display(),
            workers
        );

        let invocations: Vec<Invocation> = files
            .iter()
            .map(|file| self.runtime.invocation(root, file))
            .collect();
        let outputs = {
            let pool = ProcessPool::new(workers, options.timeout(), cancel.clone());
            pool.run_all(invocations.clone())
        };

        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }

        let mut builder = GraphBuilder::new(self.runtime.language(), root.display().to_string());
        let mut parsed = Vec::with_capacity(files.len());
        for ((file, invocation), output) in files.into_iter().zip(&invocations).zip(outputs) {
            let facts = output
                .map_err(|e| self.file_error(&file, invocation, e))
                .and_then(|stdout| {
                    serde_json::from_slice::<R::Facts>(&stdout).map_err(|source| FileProcessingError::Decode {
                        path: file.relative.clone(),
                        source,
                    })
                });
            match facts {
                Ok(facts) => parsed.push((file, facts)),
                Err(e) => builder.skip(&e),
            }
        }

        self.runtime.assemble(&mut builder, &parsed);

        let schema = builder.finish();
        tracing::info!(
            "Built graph: {} nodes, {} edges, {} skipped",
            schema.nodes.len(),
            schema.edges.len(),
            schema.skipped_files.len()
        );
        Ok(schema)
    }
}
