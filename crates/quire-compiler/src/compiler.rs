//! The export run: parse, resolve assets, emit, commit, then tables.

use std::fmt;

use quire_common::assets::{AssetStore, DiagramRenderer, Rasterizer};
use quire_common::docs::{DocumentId, DocumentService, Request};
use quire_common::ExportOptions;

use crate::ast::Document;
use crate::emitter::compile;
use crate::error::{ExportError, ParseError, TableError};
use crate::parse::parse;
use crate::resolver::{AssetMap, AssetResolver};
use crate::tables::{TableOutcome, TablePlan, place_skeletons, populate_tables};

/// Where an export run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    ResolvingAssets,
    Emitting,
    CommittingStructure,
    MaterializingTables,
    PopulatingTables,
    Done,
    Failed,
}

impl ExportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExportState::Done | ExportState::Failed)
    }

    /// Human readable status for display.
    pub fn status(self) -> &'static str {
        match self {
            ExportState::Idle => "idle",
            ExportState::ResolvingAssets => "rendering diagrams",
            ExportState::Emitting => "building document",
            ExportState::CommittingStructure => "writing document",
            ExportState::MaterializingTables => "inserting tables",
            ExportState::PopulatingTables => "filling tables",
            ExportState::Done => "done",
            ExportState::Failed => "failed",
        }
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status())
    }
}

/// Receives every state transition of a run.
pub trait ProgressSink {
    fn report(&self, state: ExportState);
}

impl ProgressSink for () {
    fn report(&self, _state: ExportState) {}
}

impl<P: ProgressSink + ?Sized> ProgressSink for &P {
    fn report(&self, state: ExportState) {
        (**self).report(state)
    }
}

/// Logs each transition at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, state: ExportState) {
        tracing::info!(state = ?state, "{state}");
    }
}

/// What a finished export produced.
#[derive(Debug)]
pub struct ExportReport {
    pub document_id: DocumentId,
    /// Elements that were left out or only partly written.
    pub degraded: usize,
    pub warnings: Vec<String>,
    pub tables: TableOutcome,
}

impl ExportReport {
    pub fn is_degraded(&self) -> bool {
        self.degraded > 0
    }
}

/// Phase-1 output of a run that never touches the service.
#[derive(Debug, Clone, PartialEq)]
pub struct DryRun {
    pub requests: Vec<Request>,
    pub tables: usize,
    pub end_index: usize,
}

/// Parse and emit `markdown` without resolving assets or contacting the service.
pub fn dry_run(markdown: &str, options: &ExportOptions) -> Result<DryRun, ParseError> {
    let document = parse(markdown)?;
    let assets = AssetMap::default();
    let compiled = compile(&document, &assets, options);
    Ok(DryRun {
        tables: compiled.tables.len(),
        end_index: compiled.end_index,
        requests: compiled.requests,
    })
}

struct Run<'p, P: ?Sized> {
    state: ExportState,
    sink: &'p P,
}

impl<P: ProgressSink + ?Sized> Run<'_, P> {
    fn enter(&mut self, state: ExportState) {
        tracing::debug!(from = ?self.state, to = ?state, "export state");
        self.state = state;
        self.sink.report(state);
    }
}

pub struct DocumentCompiler<D, R, C, S, P = ()> {
    service: D,
    resolver: AssetResolver<R, C, S>,
    options: ExportOptions,
    progress: P,
}

impl<D, R, C, S> DocumentCompiler<D, R, C, S>
where
    D: DocumentService,
    R: DiagramRenderer,
    C: Rasterizer,
    S: AssetStore,
{
    pub fn new(service: D, resolver: AssetResolver<R, C, S>, options: ExportOptions) -> Self {
        Self {
            service,
            resolver,
            options,
            progress: (),
        }
    }
}

impl<D, R, C, S, P> DocumentCompiler<D, R, C, S, P>
where
    D: DocumentService,
    R: DiagramRenderer,
    C: Rasterizer,
    S: AssetStore,
    P: ProgressSink,
{
    pub fn with_progress<Q: ProgressSink>(self, progress: Q) -> DocumentCompiler<D, R, C, S, Q> {
        DocumentCompiler {
            service: self.service,
            resolver: self.resolver,
            options: self.options,
            progress,
        }
    }

    /// Export `markdown` into a new remote document named `title`.
    #[tracing::instrument(skip(self, markdown), fields(bytes = markdown.len()))]
    pub async fn compile_and_export(
        &self,
        markdown: &str,
        title: &str,
    ) -> Result<ExportReport, ExportError> {
        let mut run = Run {
            state: ExportState::Idle,
            sink: &self.progress,
        };
        let result = self.export(&mut run, markdown, title).await;
        match &result {
            Ok(report) => {
                run.enter(ExportState::Done);
                tracing::info!(
                    document = %report.document_id,
                    degraded = report.degraded,
                    "export finished"
                );
            }
            Err(err) => {
                run.enter(ExportState::Failed);
                tracing::error!(error = %err, "export failed");
            }
        }
        result
    }

    async fn export(
        &self,
        run: &mut Run<'_, P>,
        markdown: &str,
        title: &str,
    ) -> Result<ExportReport, ExportError> {
        let document: Document = parse(markdown)?;

        run.enter(ExportState::ResolvingAssets);
        let resolved = self.resolver.resolve(&document, &self.options).await;
        let mut warnings: Vec<String> = resolved
            .failures
            .iter()
            .map(|f| format!("{} {} omitted: {}", f.kind.label(), f.node, f.error))
            .collect();
        let mut degraded = resolved.failures.len();

        run.enter(ExportState::Emitting);
        let compiled = compile(&document, &resolved.map, &self.options);

        run.enter(ExportState::CommittingStructure);
        let document_id = self
            .service
            .create(title)
            .await
            .map_err(ExportError::create_document)?;
        if !compiled.requests.is_empty() {
            self.service
                .batch_update(&document_id, &compiled.requests)
                .await
                .map_err(|e| ExportError::commit_structure(document_id.clone(), e))?;
        }

        let tables = if compiled.tables.is_empty() {
            TableOutcome::None
        } else {
            self.materialize(run, &document_id, document.fingerprint(), &compiled.tables)
                .await?
        };
        if let TableOutcome::Partial {
            expected,
            completed,
            problems,
        } = &tables
        {
            degraded += expected - completed;
            warnings.extend(problems.iter().map(ToString::to_string));
        }

        Ok(ExportReport {
            document_id,
            degraded,
            warnings,
            tables,
        })
    }

    async fn materialize(
        &self,
        run: &mut Run<'_, P>,
        document: &DocumentId,
        fingerprint: &str,
        plans: &[TablePlan<'_>],
    ) -> Result<TableOutcome, ExportError> {
        let expected = plans.len();
        let mut problems = Vec::new();

        run.enter(ExportState::MaterializingTables);
        let placement = match place_skeletons(&self.service, document, fingerprint, plans).await {
            Ok(placement) => placement,
            Err(err) => return self.table_failure(document, expected, 0, vec![err]),
        };
        if !placement.missing.is_empty() {
            problems.push(TableError::PlaceholderMissing {
                expected,
                missing: placement.missing.len(),
            });
        }
        if !placement.nested.is_empty() {
            problems.push(TableError::NestedUnsupported {
                ordinals: placement.nested.clone(),
            });
        }
        if !placement.ambiguous.is_empty() {
            problems.push(TableError::AmbiguousPlaceholder {
                ordinals: placement.ambiguous.clone(),
            });
        }

        run.enter(ExportState::PopulatingTables);
        let completed = if placement.placed.is_empty() {
            0
        } else {
            match populate_tables(&self.service, document, plans, &placement.placed).await {
                Ok(population) => {
                    tracing::debug!(
                        tables = population.tables,
                        requests = population.requests,
                        "cells populated"
                    );
                    population.tables
                }
                Err(err) => {
                    problems.push(err);
                    0
                }
            }
        };

        if problems.is_empty() {
            Ok(TableOutcome::Complete { tables: completed })
        } else {
            self.table_failure(document, expected, completed, problems)
        }
    }

    fn table_failure(
        &self,
        document: &DocumentId,
        expected: usize,
        completed: usize,
        mut problems: Vec<TableError>,
    ) -> Result<TableOutcome, ExportError> {
        for problem in &problems {
            tracing::warn!(document = %document, error = %problem, "tables incomplete");
        }
        if self.options.strict_tables && !problems.is_empty() {
            return Err(ExportError::Tables {
                document: document.clone(),
                source: problems.swap_remove(0),
            });
        }
        Ok(TableOutcome::Partial {
            expected,
            completed,
            problems,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_reports_tables() {
        let run = dry_run("# t\n\n| a |\n|---|", &ExportOptions::default()).unwrap();
        assert_eq!(run.tables, 1);
        // Heading, then a 30 unit marker and its newline.
        assert_eq!(run.end_index, 1 + 2 + 31);
        let mut settings = insta::Settings::clone_current();
        settings.add_filter(r"QUIRE_TABLE_[0-9a-f]{12}_", "QUIRE_TABLE_[key]_");
        let _scope = settings.bind_to_scope();
        insta::assert_json_snapshot!(run.requests, @r#"
        [
          {
            "insertText": {
              "location": {
                "index": 1
              },
              "text": "t"
            }
          },
          {
            "insertText": {
              "location": {
                "index": 2
              },
              "text": "\n"
            }
          },
          {
            "updateParagraphStyle": {
              "range": {
                "startIndex": 1,
                "endIndex": 3
              },
              "paragraphStyle": {
                "namedStyleType": "HEADING_1"
              },
              "fields": "namedStyleType"
            }
          },
          {
            "insertText": {
              "location": {
                "index": 3
              },
              "text": "[[QUIRE_TABLE_[key]_0]]"
            }
          },
          {
            "insertText": {
              "location": {
                "index": 33
              },
              "text": "\n"
            }
          }
        ]
        "#);
    }

    #[test]
    fn test_states_have_status_text() {
        assert_eq!(ExportState::PopulatingTables.to_string(), "filling tables");
        assert!(ExportState::Failed.is_terminal());
        assert!(!ExportState::Emitting.is_terminal());
    }
}
