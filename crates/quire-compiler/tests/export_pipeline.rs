use std::cell::RefCell;
use std::collections::VecDeque;

use bytes::Bytes;
use quire_common::ExportOptions;
use quire_common::ServiceError;
use quire_common::assets::{
    AssetKind, AssetStore, DiagramRenderer, ElementFormat, RasterImage, RenderError,
    RenderedElement, SnapshotRasterizer, UploadError,
};
use quire_common::docs::{
    DocumentId, DocumentService, DocumentSnapshot, NamedStyleType, Range, Request, TextStyle,
};
use quire_common::utf16_len;
use quire_compiler::ast::fingerprint;
use quire_compiler::tables::placeholder;
use quire_compiler::{
    AssetResolver, DocumentCompiler, ExportError, ExportState, ProgressSink, TableError,
    TableOutcome,
};
use serde_json::json;

/// In-memory document service: records batches, serves queued snapshots.
#[derive(Default)]
struct FakeDocs {
    snapshots: RefCell<VecDeque<DocumentSnapshot>>,
    batches: RefCell<Vec<Vec<Request>>>,
    fail_create: Option<u16>,
    fail_batch: Option<u16>,
}

impl FakeDocs {
    fn with_snapshots(snapshots: impl IntoIterator<Item = serde_json::Value>) -> Self {
        let snapshots = snapshots
            .into_iter()
            .map(|value| serde_json::from_value(value).unwrap())
            .collect();
        Self {
            snapshots: RefCell::new(snapshots),
            ..Default::default()
        }
    }

    fn batches(&self) -> Vec<Vec<Request>> {
        self.batches.borrow().clone()
    }
}

fn api_error(status: u16) -> ServiceError {
    ServiceError::Api {
        status,
        message: format!("status {status}"),
        reason: (status == 401).then(|| "UNAUTHENTICATED".to_owned()),
    }
}

impl DocumentService for FakeDocs {
    async fn create(&self, _title: &str) -> Result<DocumentId, ServiceError> {
        match self.fail_create {
            Some(status) => Err(api_error(status)),
            None => Ok(DocumentId::new("doc-1")),
        }
    }

    async fn batch_update(
        &self,
        _document: &DocumentId,
        requests: &[Request],
    ) -> Result<(), ServiceError> {
        if let Some(status) = self.fail_batch {
            return Err(api_error(status));
        }
        self.batches.borrow_mut().push(requests.to_vec());
        Ok(())
    }

    async fn get(&self, _document: &DocumentId) -> Result<DocumentSnapshot, ServiceError> {
        self.snapshots
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| api_error(404))
    }
}

struct EchoRenderer;

impl DiagramRenderer for EchoRenderer {
    async fn render(
        &self,
        source: &str,
        _kind: &AssetKind,
        _theme: &str,
    ) -> Result<RenderedElement, RenderError> {
        Ok(RenderedElement {
            format: ElementFormat::Png,
            bytes: Bytes::from(source.to_owned()),
        })
    }
}

struct Store {
    reject: bool,
}

impl AssetStore for Store {
    async fn upload(&self, _image: &RasterImage) -> Result<String, UploadError> {
        if self.reject {
            Err(UploadError::Rejected {
                status: 403,
                message: "bucket is read-only".into(),
            })
        } else {
            Ok("https://cdn.test/diagram.png".into())
        }
    }
}

#[derive(Default)]
struct Recorder(RefCell<Vec<ExportState>>);

impl ProgressSink for Recorder {
    fn report(&self, state: ExportState) {
        self.0.borrow_mut().push(state);
    }
}

fn compiler<'a>(
    docs: &'a FakeDocs,
    reject_uploads: bool,
    options: ExportOptions,
    progress: &'a Recorder,
) -> DocumentCompiler<&'a FakeDocs, EchoRenderer, SnapshotRasterizer, Store, &'a Recorder> {
    let resolver = AssetResolver::new(
        EchoRenderer,
        SnapshotRasterizer,
        Store {
            reject: reject_uploads,
        },
    );
    DocumentCompiler::new(docs, resolver, options).with_progress(progress)
}

/// Document after the first batch of a one table export.
/// Document holding one paragraph per entry of `lines`, laid out from 1.
fn text_snapshot(lines: &[String]) -> serde_json::Value {
    let mut content = vec![json!({ "endIndex": 1, "sectionBreak": {} })];
    let mut start = 1;
    for line in lines {
        let end = start + utf16_len(line);
        content.push(json!({ "startIndex": start, "endIndex": end, "paragraph": { "elements": [
            { "startIndex": start, "endIndex": end, "textRun": { "content": line } }
        ] } }));
        start = end;
    }
    json!({ "documentId": "doc-1", "body": { "content": content } })
}

/// Committed structure of `markdown` when it is a single table.
fn marker_snapshot(markdown: &str) -> serde_json::Value {
    let marker = placeholder(&fingerprint(markdown), 0);
    text_snapshot(&[format!("{marker}\n"), "\n".to_owned()])
}

/// Document after the skeleton for a 1x1 table was inserted; `cell` is the
/// text already in its only cell.
fn skeleton_snapshot(cell: &str) -> serde_json::Value {
    let text = format!("{cell}\n");
    let end = 5 + text.len();
    json!({
        "documentId": "doc-1",
        "body": { "content": [
            { "endIndex": 1, "sectionBreak": {} },
            { "startIndex": 1, "endIndex": 2, "paragraph": { "elements": [
                { "startIndex": 1, "endIndex": 2, "textRun": { "content": "\n" } }
            ] } },
            { "startIndex": 2, "endIndex": end + 2, "table": {
                "rows": 1, "columns": 1,
                "tableRows": [ { "startIndex": 3, "endIndex": end + 1, "tableCells": [
                    { "startIndex": 3, "endIndex": end, "content": [
                        { "startIndex": 4, "endIndex": end, "paragraph": { "elements": [
                            { "startIndex": 4, "endIndex": end, "textRun": { "content": text } }
                        ] } }
                    ] }
                ] } ]
            } }
        ] }
    })
}

#[tokio::test]
async fn test_heading_and_bold_in_one_batch() {
    let docs = FakeDocs::default();
    let progress = Recorder::default();
    let report = compiler(&docs, false, ExportOptions::default(), &progress)
        .compile_and_export("# Title\n\nHello **world**", "Notes")
        .await
        .unwrap();

    assert_eq!(report.document_id.as_str(), "doc-1");
    assert!(!report.is_degraded());
    assert!(matches!(report.tables, TableOutcome::None));
    assert_eq!(
        docs.batches(),
        vec![vec![
            Request::insert_text(1, "Title"),
            Request::insert_text(6, "\n"),
            Request::paragraph_style(Range::new(1, 7), NamedStyleType::Heading1),
            Request::insert_text(7, "Hello "),
            Request::insert_text(13, "world"),
            Request::text_style(Range::new(13, 18), TextStyle::bold()),
            Request::insert_text(18, "\n"),
        ]]
    );
    assert_eq!(
        *progress.0.borrow(),
        vec![
            ExportState::ResolvingAssets,
            ExportState::Emitting,
            ExportState::CommittingStructure,
            ExportState::Done,
        ]
    );
}

#[tokio::test]
async fn test_single_table_runs_all_three_phases() {
    let markdown = "| A |\n|---|";
    let marker = placeholder(&fingerprint(markdown), 0);
    let docs = FakeDocs::with_snapshots([marker_snapshot(markdown), skeleton_snapshot("")]);
    let progress = Recorder::default();
    let report = compiler(&docs, false, ExportOptions::default(), &progress)
        .compile_and_export(markdown, "Table")
        .await
        .unwrap();

    assert!(matches!(report.tables, TableOutcome::Complete { tables: 1 }));
    assert_eq!(report.degraded, 0);
    assert_eq!(
        docs.batches(),
        vec![
            vec![
                Request::insert_text(1, marker.as_str()),
                Request::insert_text(31, "\n"),
            ],
            vec![
                Request::delete(Range::new(1, 31)),
                Request::insert_table(1, 1, 1),
            ],
            vec![Request::insert_text(4, "A")],
        ]
    );
    assert_eq!(
        progress.0.borrow()[3..],
        [
            ExportState::MaterializingTables,
            ExportState::PopulatingTables,
            ExportState::Done,
        ]
    );
}

#[tokio::test]
async fn test_rejected_upload_omits_only_the_diagram() {
    let docs = FakeDocs::default();
    let progress = Recorder::default();
    let report = compiler(&docs, true, ExportOptions::default(), &progress)
        .compile_and_export("Intro\n\n```mermaid\ngraph TD\n```\n\nOutro", "Diagram")
        .await
        .unwrap();

    assert_eq!(report.degraded, 1);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("mermaid"));
    assert_eq!(
        docs.batches(),
        vec![vec![
            Request::insert_text(1, "Intro"),
            Request::insert_text(6, "\n"),
            Request::insert_text(7, "Outro"),
            Request::insert_text(12, "\n"),
        ]]
    );
}

#[tokio::test]
async fn test_hosted_diagram_is_embedded() {
    let docs = FakeDocs::default();
    let progress = Recorder::default();
    let report = compiler(&docs, false, ExportOptions::default(), &progress)
        .compile_and_export("```mermaid\ngraph TD\n```", "Diagram")
        .await
        .unwrap();

    assert_eq!(report.degraded, 0);
    assert_eq!(
        docs.batches()[0],
        vec![
            Request::inline_image(1, "https://cdn.test/diagram.png", None),
            Request::insert_text(2, "\n"),
        ]
    );
}

#[tokio::test]
async fn test_commit_failure_is_fatal_with_reauth_advice() {
    let docs = FakeDocs {
        fail_batch: Some(401),
        ..Default::default()
    };
    let progress = Recorder::default();
    let err = compiler(&docs, false, ExportOptions::default(), &progress)
        .compile_and_export("text", "Doc")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExportError::CommitStructure {
            advice: Some(_),
            ..
        }
    ));
    assert_eq!(err.document().map(DocumentId::as_str), Some("doc-1"));
    assert_eq!(progress.0.borrow().last(), Some(&ExportState::Failed));
}

#[tokio::test]
async fn test_create_failure_is_fatal() {
    let docs = FakeDocs {
        fail_create: Some(500),
        ..Default::default()
    };
    let progress = Recorder::default();
    let err = compiler(&docs, false, ExportOptions::default(), &progress)
        .compile_and_export("text", "Doc")
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::CreateDocument { advice: None, .. }));
    assert!(docs.batches().is_empty());
}

#[tokio::test]
async fn test_table_count_mismatch_degrades() {
    // The skeleton never appears in the second snapshot.
    let markdown = "before\n\n| A |\n|---|";
    let docs = FakeDocs::with_snapshots([marker_snapshot(markdown), marker_snapshot(markdown)]);
    let progress = Recorder::default();
    let report = compiler(&docs, false, ExportOptions::default(), &progress)
        .compile_and_export(markdown, "Doc")
        .await
        .unwrap();

    let TableOutcome::Partial {
        expected,
        completed,
        problems,
    } = &report.tables
    else {
        panic!("expected partial tables, got {:?}", report.tables);
    };
    assert_eq!((*expected, *completed), (1, 0));
    assert!(matches!(
        problems[0],
        TableError::CountMismatch {
            expected: 1,
            found: 0
        }
    ));
    assert_eq!(report.degraded, 1);
    assert_eq!(docs.batches().len(), 2);
}

#[tokio::test]
async fn test_strict_tables_make_mismatch_fatal() {
    let markdown = "| A |\n|---|";
    let docs = FakeDocs::with_snapshots([marker_snapshot(markdown), marker_snapshot(markdown)]);
    let progress = Recorder::default();
    let options = ExportOptions {
        strict_tables: true,
        ..Default::default()
    };
    let err = compiler(&docs, false, options, &progress)
        .compile_and_export(markdown, "Doc")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExportError::Tables {
            source: TableError::CountMismatch { .. },
            ..
        }
    ));
    assert_eq!(progress.0.borrow().last(), Some(&ExportState::Failed));
}

#[tokio::test]
async fn test_missing_placeholder_degrades_without_skeletons() {
    let plain = json!({
        "documentId": "doc-1",
        "body": { "content": [
            { "startIndex": 1, "endIndex": 2, "paragraph": { "elements": [
                { "startIndex": 1, "endIndex": 2, "textRun": { "content": "\n" } }
            ] } }
        ] }
    });
    let docs = FakeDocs::with_snapshots([plain]);
    let progress = Recorder::default();
    let report = compiler(&docs, false, ExportOptions::default(), &progress)
        .compile_and_export("| A |\n|---|", "Doc")
        .await
        .unwrap();

    assert!(matches!(
        &report.tables,
        TableOutcome::Partial { problems, .. }
            if matches!(problems[0], TableError::PlaceholderMissing { missing: 1, .. })
    ));
    // Only the structure batch was sent.
    assert_eq!(docs.batches().len(), 1);
}

#[tokio::test]
async fn test_marker_text_in_prose_does_not_move_the_table() {
    let markdown = "See [[QUIRE_TABLE_0]] now\n\n| A |\n|---|";
    let marker = placeholder(&fingerprint(markdown), 0);
    let committed = text_snapshot(&[
        "See [[QUIRE_TABLE_0]] now\n".to_owned(),
        format!("{marker}\n"),
        "\n".to_owned(),
    ]);
    let docs = FakeDocs::with_snapshots([committed, skeleton_snapshot("")]);
    let progress = Recorder::default();
    let report = compiler(&docs, false, ExportOptions::default(), &progress)
        .compile_and_export(markdown, "Doc")
        .await
        .unwrap();

    assert!(matches!(report.tables, TableOutcome::Complete { tables: 1 }));
    let batches = docs.batches();
    assert_eq!(batches[0][0], Request::insert_text(1, "See [[QUIRE_TABLE_0]] now"));
    assert_eq!(batches[0][2], Request::insert_text(27, marker.as_str()));
    assert_eq!(
        batches[1],
        vec![
            Request::delete(Range::new(27, 57)),
            Request::insert_table(27, 1, 1),
        ]
    );
}

#[tokio::test]
async fn test_duplicated_marker_is_not_replaced() {
    let markdown = "| A |\n|---|";
    let line = format!("{}\n", placeholder(&fingerprint(markdown), 0));
    let docs = FakeDocs::with_snapshots([text_snapshot(&[line.clone(), line])]);
    let progress = Recorder::default();
    let report = compiler(&docs, false, ExportOptions::default(), &progress)
        .compile_and_export(markdown, "Doc")
        .await
        .unwrap();

    let TableOutcome::Partial { problems, .. } = &report.tables else {
        panic!("expected partial tables, got {:?}", report.tables);
    };
    assert!(matches!(
        &problems[0],
        TableError::AmbiguousPlaceholder { ordinals } if *ordinals == [0]
    ));
    assert_eq!(report.degraded, 1);
    assert_eq!(docs.batches().len(), 1);
}

#[tokio::test]
async fn test_rerun_on_populated_tables_sends_nothing() {
    // Skeleton and content are both already present.
    let docs = FakeDocs::with_snapshots([skeleton_snapshot("A"), skeleton_snapshot("A")]);
    let progress = Recorder::default();
    let report = compiler(&docs, false, ExportOptions::default(), &progress)
        .compile_and_export("| A |\n|---|", "Doc")
        .await
        .unwrap();

    assert!(matches!(report.tables, TableOutcome::Complete { tables: 1 }));
    assert_eq!(docs.batches().len(), 1);
}
