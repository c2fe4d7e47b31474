//! LSP Backend implementation for Livecode
//!
//! Every open document is checked after a typing pause and, when it parses,
//! executed incrementally. Engine events are forwarded to the client from a
//! background task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use livecode_core::script::Value;
use livecode_core::{EngineConfig, EngineEvent, LiveEngine, ScriptFrontEnd};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, warn};

use crate::protocol::{self, ExecutionSettled, ExecutionSettledParams};

/// Document state stored for each open file
#[derive(Debug, Clone)]
pub struct DocumentState {
    pub content: String,
    pub version: i32,
    /// Bumped on every edit; a pending check only fires if it is still current
    pub generation: u64,
}

type Documents = Arc<RwLock<HashMap<Url, DocumentState>>>;

/// The Livecode Language Server backend
pub struct LivecodeBackend {
    client: Client,
    engine: Arc<LiveEngine<ScriptFrontEnd>>,
    documents: Documents,
    check_delay: Duration,
    auto_execute: bool,
}

impl LivecodeBackend {
    pub fn new(client: Client, config: EngineConfig) -> Self {
        let check_delay = Duration::from_millis(config.check_delay_ms);
        let auto_execute = config.auto_execute;
        let frontend = Arc::new(ScriptFrontEnd::new(&config.script));
        let (engine, events) = LiveEngine::with_channel(frontend, config);

        tokio::spawn(forward_events(client.clone(), events));

        Self {
            client,
            engine: Arc::new(engine),
            documents: Arc::new(RwLock::new(HashMap::new())),
            check_delay,
            auto_execute,
        }
    }

    /// Store new content and schedule a check once typing pauses
    async fn update(&self, uri: Url, content: String, version: i32) {
        let generation = {
            let mut docs = self.documents.write().await;
            let doc = docs.entry(uri.clone()).or_insert_with(|| DocumentState {
                content: String::new(),
                version,
                generation: 0,
            });
            doc.content = content;
            doc.version = version;
            doc.generation += 1;
            doc.generation
        };

        let documents = Arc::clone(&self.documents);
        let engine = Arc::clone(&self.engine);
        let delay = self.check_delay;
        let run_after_check = self.auto_execute;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let docs = documents.read().await;
            let Some(doc) = docs.get(&uri).filter(|d| d.generation == generation) else {
                debug!(%uri, "superseded edit, skipping check");
                return;
            };
            if let Err(e) = engine.submit_check(doc.content.clone(), Some(uri.as_str()), run_after_check) {
                warn!(error = %e, "check not submitted");
            }
        });
    }

    async fn run_from_start(&self, uri: &Url) -> Result<()> {
        let content = {
            let docs = self.documents.read().await;
            let Some(doc) = docs.get(uri) else {
                return Err(Error::invalid_params(format!("unknown document {}", uri)));
            };
            doc.content.clone()
        };
        self.engine
            .run_from_start(content, Some(uri.as_str()))
            .map_err(|e| Error::invalid_params(e.to_string()))
    }
}

/// Relay engine events to the client until the engine goes away
async fn forward_events(client: Client, mut events: UnboundedReceiver<EngineEvent<Value>>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::CheckEnded { source_id, errors } => {
                let Ok(uri) = Url::parse(&source_id) else {
                    debug!(source_id, "check result for a non-document source");
                    continue;
                };
                let diagnostics = errors.iter().map(protocol::to_diagnostic).collect();
                client.publish_diagnostics(uri, diagnostics, None).await;
            }
            EngineEvent::ExecutionSettled(report) => {
                let params = ExecutionSettledParams::from(&report);
                client
                    .log_message(MessageType::INFO, protocol::summarize(&params))
                    .await;
                client.send_notification::<ExecutionSettled>(params).await;
            }
            other => debug!(?other, "engine event"),
        }
    }
}

fn uri_argument(arguments: &[JsonValue]) -> Result<Url> {
    let raw = arguments
        .first()
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::invalid_params("expected a document URI argument"))?;
    Url::parse(raw).map_err(|e| Error::invalid_params(e.to_string()))
}

#[tower_lsp::async_trait]
impl LanguageServer for LivecodeBackend {
    async fn initialize(&self, _: InitializeParams) -> Result<InitializeResult> {
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        will_save: None,
                        will_save_wait_until: None,
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(true),
                        })),
                    },
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![protocol::RUN_FROM_START.to_string(), protocol::STOP.to_string()],
                    work_done_progress_options: Default::default(),
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "livecode-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "Livecode language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.engine.shutdown();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        self.update(doc.uri, doc.text, doc.version).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;

        // We use FULL sync, so there's only one change with the full content
        if let Some(change) = params.content_changes.into_iter().next() {
            self.update(uri, change.text, version).await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let Some(text) = params.text else {
            return;
        };
        let uri = params.text_document.uri;
        let version = self
            .documents
            .read()
            .await
            .get(&uri)
            .map_or(0, |doc| doc.version);
        self.update(uri, text, version).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.write().await.remove(&uri);
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<JsonValue>> {
        match params.command.as_str() {
            protocol::RUN_FROM_START => {
                let uri = uri_argument(&params.arguments)?;
                self.run_from_start(&uri).await?;
            }
            protocol::STOP => {
                self.engine
                    .stop_execution()
                    .map_err(|e| Error::invalid_params(e.to_string()))?;
            }
            other => {
                return Err(Error::invalid_params(format!("unknown command {}", other)));
            }
        }
        Ok(None)
    }
}
