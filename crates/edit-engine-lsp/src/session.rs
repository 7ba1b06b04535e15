//! Language-server session lifecycle and scheduling.
//!
//! [`LanguageServerSession`] owns one [`RpcClient`] and layers on top of it:
//! the `initialize` handshake with capability negotiation, full-text document
//! synchronization with per-document versions, request correlation with
//! warn-and-drop for unmatched responses, capability gating for every feature
//! request, and trailing-edge debounce for the auxiliary refreshes that follow
//! each document change.
//!
//! The session never blocks the caller's mutation path. Document lifecycle
//! methods are fire-and-forget notifications; asynchronous results surface as
//! [`SessionEvent`]s from [`LanguageServerSession::poll`], which the host is
//! expected to call from its idle loop. Only the explicit feature wrappers
//! (completion, hover, and friends) wait for their response.

use crate::client::{Inbound, RpcClient};
use crate::completion::{parse_completion_items, CompletionItem};
use crate::error::SessionError;
use crate::semantic::{
    decode_semantic_tokens, decode_symbol_highlight, DecodedToken, LineStartTable,
    SemanticTokensLegend,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Tunable delays and filters for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Pause between a successful handshake and the first `didOpen`, for
    /// servers with asynchronous startup.
    pub settle_delay: Duration,
    /// Debounce window for semantic-token refetch after a change.
    pub semantic_tokens_debounce: Duration,
    /// Debounce window for folding-range refetch after a change.
    pub folding_debounce: Duration,
    /// Debounce window for document-color refetch after a change.
    pub colors_debounce: Duration,
    /// Debounce window for the code-action fetch that follows diagnostics.
    pub code_actions_debounce: Duration,
    /// Diagnostic severities dropped before storage and code-action ranges.
    pub suppressed_severities: Vec<u64>,
    /// How long feature wrappers wait for their response.
    pub request_timeout: Duration,
    /// How long the `initialize` exchange may take.
    pub handshake_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(200),
            semantic_tokens_debounce: Duration::from_millis(150),
            folding_debounce: Duration::from_millis(300),
            colors_debounce: Duration::from_millis(500),
            code_actions_debounce: Duration::from_millis(200),
            suppressed_severities: Vec::new(),
            request_timeout: Duration::from_secs(15),
            handshake_timeout: Duration::from_secs(30),
        }
    }
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No handshake attempted, or the last attempt failed.
    Uninitialized,
    /// `initialize` sent, waiting for the server's answer.
    Initializing,
    /// Handshake complete; documents may be opened.
    Ready,
    /// `shutdown` sent.
    ShuttingDown,
    /// `exit` sent or the session was disposed.
    Closed,
}

/// The auxiliary refreshes that run on a debounce after document changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    /// `textDocument/semanticTokens/full`.
    SemanticTokens,
    /// `textDocument/foldingRange`.
    FoldingRanges,
    /// `textDocument/documentColor`.
    DocumentColors,
    /// `textDocument/codeAction` over the diagnostics union range.
    CodeActions,
}

impl RefreshKind {
    fn slot(self) -> usize {
        match self {
            RefreshKind::SemanticTokens => 0,
            RefreshKind::FoldingRanges => 1,
            RefreshKind::DocumentColors => 2,
            RefreshKind::CodeActions => 3,
        }
    }
}

/// Feature flags negotiated at initialize time.
///
/// Each flag is true when the server advertised the provider, either as a
/// bare `true` or as an options object.
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct ServerCapabilities {
    pub completion: bool,
    pub hover: bool,
    pub signature_help: bool,
    pub semantic_tokens: bool,
    pub code_actions: bool,
    pub document_color: bool,
    pub folding_range: bool,
    pub document_highlight: bool,
    pub rename: bool,
    pub definition: bool,
    pub declaration: bool,
    pub type_definition: bool,
    pub implementation: bool,
    pub document_symbol: bool,
    pub workspace_symbol: bool,
    pub formatting: bool,
    pub range_formatting: bool,
    pub document_link: bool,
    pub call_hierarchy: bool,
    pub type_hierarchy: bool,
    pub references: bool,
    pub inlay_hint: bool,
    pub execute_command: bool,
}

impl ServerCapabilities {
    fn from_initialize_result(result: &Value) -> Self {
        let caps = result.get("capabilities").cloned().unwrap_or(Value::Null);
        let on = |key: &str| {
            matches!(
                caps.get(key),
                Some(value) if value.as_bool() != Some(false) && !value.is_null()
            )
        };
        Self {
            completion: on("completionProvider"),
            hover: on("hoverProvider"),
            signature_help: on("signatureHelpProvider"),
            semantic_tokens: on("semanticTokensProvider"),
            code_actions: on("codeActionProvider"),
            document_color: on("colorProvider"),
            folding_range: on("foldingRangeProvider"),
            document_highlight: on("documentHighlightProvider"),
            rename: on("renameProvider"),
            definition: on("definitionProvider"),
            declaration: on("declarationProvider"),
            type_definition: on("typeDefinitionProvider"),
            implementation: on("implementationProvider"),
            document_symbol: on("documentSymbolProvider"),
            workspace_symbol: on("workspaceSymbolProvider"),
            formatting: on("documentFormattingProvider"),
            range_formatting: on("documentRangeFormattingProvider"),
            document_link: on("documentLinkProvider"),
            call_hierarchy: on("callHierarchyProvider"),
            type_hierarchy: on("typeHierarchyProvider"),
            references: on("referencesProvider"),
            inlay_hint: on("inlayHintProvider"),
            execute_command: on("executeCommandProvider"),
        }
    }
}

/// An asynchronous result delivered by [`LanguageServerSession::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Server-pushed diagnostics, already filtered by suppressed severities.
    Diagnostics {
        /// Document the diagnostics belong to.
        uri: String,
        /// The surviving diagnostic values.
        diagnostics: Vec<Value>,
    },
    /// Decoded semantic tokens from a completed refresh.
    SemanticTokens {
        /// Document the tokens belong to.
        uri: String,
        /// Tokens in absolute coordinates.
        tokens: Vec<DecodedToken>,
    },
    /// Folding ranges from a completed refresh, as `(start_line, end_line)`.
    FoldingRanges {
        /// Document the ranges belong to.
        uri: String,
        /// Line spans, start before end.
        ranges: Vec<(usize, usize)>,
    },
    /// Raw document-color result from a completed refresh.
    DocumentColors {
        /// Document the colors belong to.
        uri: String,
        /// The server's `ColorInformation` array.
        colors: Value,
    },
    /// Code actions fetched over the diagnostics union range.
    CodeActions {
        /// Document the actions apply to.
        uri: String,
        /// The server's action/command array.
        actions: Value,
    },
    /// Decoded symbols from the push-based highlight source.
    SymbolHighlights {
        /// Document the symbols belong to.
        uri: String,
        /// Symbols in absolute coordinates.
        tokens: Vec<DecodedToken>,
    },
}

#[derive(Debug)]
struct PendingRequest {
    method: &'static str,
    uri: String,
    issued_at: Instant,
}

#[derive(Debug)]
struct QueuedOpen {
    uri: String,
    language_id: String,
    text: String,
}

/// One connection to an external analysis service.
pub struct LanguageServerSession {
    client: RpcClient,
    config: SessionConfig,
    state: SessionState,
    capabilities: ServerCapabilities,
    legend: SemanticTokensLegend,
    versions: HashMap<String, i64>,
    texts: HashMap<String, String>,
    diagnostics: HashMap<String, Vec<Value>>,
    pending: HashMap<u64, PendingRequest>,
    refresh_due: [Option<(Instant, String)>; 4],
    symbol_highlight_docs: HashSet<String>,
    queued_opens: Vec<QueuedOpen>,
    settle_until: Option<Instant>,
    backlog: Vec<Value>,
    disposed: bool,
}

impl LanguageServerSession {
    /// Spawn `cmd` as the analysis-service process and wrap it in a session.
    pub fn spawn(cmd: Command, config: SessionConfig) -> Result<Self, SessionError> {
        Ok(Self::over(RpcClient::spawn(cmd)?, config))
    }

    /// Build a session over an already-connected client.
    pub fn over(client: RpcClient, config: SessionConfig) -> Self {
        Self {
            client,
            config,
            state: SessionState::Uninitialized,
            capabilities: ServerCapabilities::default(),
            legend: SemanticTokensLegend::default(),
            versions: HashMap::new(),
            texts: HashMap::new(),
            diagnostics: HashMap::new(),
            pending: HashMap::new(),
            refresh_due: [None, None, None, None],
            symbol_highlight_docs: HashSet::new(),
            queued_opens: Vec::new(),
            settle_until: None,
            backlog: Vec::new(),
            disposed: false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Capabilities negotiated at initialize time.
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// The semantic-token legend negotiated at initialize time.
    pub fn legend(&self) -> &SemanticTokensLegend {
        &self.legend
    }

    /// Tracked version of an open document, if open.
    pub fn document_version(&self, uri: &str) -> Option<i64> {
        self.versions.get(uri).copied()
    }

    /// Run the `initialize`/`initialized` handshake.
    ///
    /// On success the session becomes `Ready`, though the first `didOpen` is
    /// held back until the settle delay elapses. On failure the session drops
    /// back to `Uninitialized` and stays usable for a retry.
    pub fn initialize(&mut self, root_uri: Option<&str>) -> Result<(), SessionError> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        if self.state != SessionState::Uninitialized {
            return Err(SessionError::Precondition("session already initialized"));
        }
        self.state = SessionState::Initializing;
        let params = json!({
            "processId": std::process::id(),
            "rootUri": root_uri,
            "capabilities": {
                "textDocument": {
                    "synchronization": { "didSave": true },
                    "publishDiagnostics": {},
                    "completion": { "completionItem": { "snippetSupport": false } },
                    "semanticTokens": {
                        "requests": { "full": true },
                        "formats": ["relative"],
                    },
                    "foldingRange": { "lineFoldingOnly": true },
                },
            },
        });
        let response = self
            .client
            .request("initialize", params)
            .and_then(|id| {
                self.client
                    .wait_for_response(id, self.config.handshake_timeout, &mut self.backlog)
            })
            .map_err(|err| {
                self.state = SessionState::Uninitialized;
                SessionError::HandshakeFailed(err.to_string())
            })?;
        if let Some(error) = response.get("error") {
            self.state = SessionState::Uninitialized;
            return Err(SessionError::HandshakeFailed(error.to_string()));
        }

        let result = response.get("result").cloned().unwrap_or(Value::Null);
        self.capabilities = ServerCapabilities::from_initialize_result(&result);
        self.legend = result
            .get("capabilities")
            .and_then(|caps| caps.get("semanticTokensProvider"))
            .and_then(SemanticTokensLegend::from_capability)
            .unwrap_or_default();
        self.client.notify("initialized", json!({}))?;
        self.settle_until = Some(Instant::now() + self.config.settle_delay);
        self.state = SessionState::Ready;
        debug!("session ready");
        Ok(())
    }

    // Document lifecycle. All of these are fire-and-forget notifications.

    /// Open a document with version 1 and its full text.
    pub fn open_document(
        &mut self,
        uri: &str,
        language_id: &str,
        text: &str,
    ) -> Result<(), SessionError> {
        self.ensure_ready()?;
        self.versions.insert(uri.to_string(), 1);
        self.texts.insert(uri.to_string(), text.to_string());
        if self.settling() {
            self.queued_opens.push(QueuedOpen {
                uri: uri.to_string(),
                language_id: language_id.to_string(),
                text: text.to_string(),
            });
            return Ok(());
        }
        self.send_did_open(uri, language_id, text, 1)
    }

    /// Report a change by full-text replacement and schedule the auxiliary
    /// refreshes.
    pub fn change_document(&mut self, uri: &str, text: &str) -> Result<(), SessionError> {
        self.ensure_ready()?;
        let version = self
            .versions
            .get_mut(uri)
            .ok_or(SessionError::Precondition("document not open"))?;
        *version += 1;
        let version = *version;
        self.texts.insert(uri.to_string(), text.to_string());
        if let Some(queued) = self.queued_opens.iter_mut().find(|queued| queued.uri == uri) {
            // The server has not seen this document yet; the deferred open
            // will carry the latest text and version when it flushes.
            queued.text = text.to_string();
        } else {
            self.client.notify(
                "textDocument/didChange",
                json!({
                    "textDocument": { "uri": uri, "version": version },
                    "contentChanges": [{ "text": text }],
                }),
            )?;
        }
        if !self.symbol_highlight_docs.contains(uri) {
            self.schedule_refresh(RefreshKind::SemanticTokens, uri);
        }
        self.schedule_refresh(RefreshKind::FoldingRanges, uri);
        self.schedule_refresh(RefreshKind::DocumentColors, uri);
        Ok(())
    }

    /// Notify the server that a document was saved.
    pub fn save_document(&mut self, uri: &str) -> Result<(), SessionError> {
        self.ensure_ready()?;
        if !self.versions.contains_key(uri) {
            return Err(SessionError::Precondition("document not open"));
        }
        self.client.notify(
            "textDocument/didSave",
            json!({ "textDocument": { "uri": uri } }),
        )
    }

    /// Close a document and drop all per-document bookkeeping.
    pub fn close_document(&mut self, uri: &str) -> Result<(), SessionError> {
        self.ensure_ready()?;
        if self.versions.remove(uri).is_none() {
            return Err(SessionError::Precondition("document not open"));
        }
        self.texts.remove(uri);
        self.diagnostics.remove(uri);
        self.symbol_highlight_docs.remove(uri);
        self.queued_opens.retain(|queued| queued.uri != uri);
        for slot in &mut self.refresh_due {
            if slot.as_ref().is_some_and(|(_, slot_uri)| slot_uri == uri) {
                *slot = None;
            }
        }
        self.client.notify(
            "textDocument/didClose",
            json!({ "textDocument": { "uri": uri } }),
        )
    }

    // Feature requests. Each returns an empty default without touching the
    // wire when the capability was not negotiated.

    /// Request completions at a position, normalized at the boundary.
    pub fn completion(
        &mut self,
        uri: &str,
        line: usize,
        character: usize,
    ) -> Result<Vec<CompletionItem>, SessionError> {
        let result = self.gated_request(
            self.capabilities.completion,
            "textDocument/completion",
            position_params(uri, line, character),
        )?;
        Ok(result.as_ref().map(parse_completion_items).unwrap_or_default())
    }

    /// Request hover content at a position.
    pub fn hover(
        &mut self,
        uri: &str,
        line: usize,
        character: usize,
    ) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.hover,
            "textDocument/hover",
            position_params(uri, line, character),
        )
    }

    /// Request signature help at a position.
    pub fn signature_help(
        &mut self,
        uri: &str,
        line: usize,
        character: usize,
    ) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.signature_help,
            "textDocument/signatureHelp",
            position_params(uri, line, character),
        )
    }

    /// Request highlights of the symbol at a position.
    pub fn document_highlight(
        &mut self,
        uri: &str,
        line: usize,
        character: usize,
    ) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.document_highlight,
            "textDocument/documentHighlight",
            position_params(uri, line, character),
        )
    }

    /// Request definition locations for the symbol at a position.
    pub fn definition(
        &mut self,
        uri: &str,
        line: usize,
        character: usize,
    ) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.definition,
            "textDocument/definition",
            position_params(uri, line, character),
        )
    }

    /// Request declaration locations for the symbol at a position.
    pub fn declaration(
        &mut self,
        uri: &str,
        line: usize,
        character: usize,
    ) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.declaration,
            "textDocument/declaration",
            position_params(uri, line, character),
        )
    }

    /// Request type-definition locations for the symbol at a position.
    pub fn type_definition(
        &mut self,
        uri: &str,
        line: usize,
        character: usize,
    ) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.type_definition,
            "textDocument/typeDefinition",
            position_params(uri, line, character),
        )
    }

    /// Request implementation locations for the symbol at a position.
    pub fn implementation(
        &mut self,
        uri: &str,
        line: usize,
        character: usize,
    ) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.implementation,
            "textDocument/implementation",
            position_params(uri, line, character),
        )
    }

    /// Request references to the symbol at a position.
    pub fn references(
        &mut self,
        uri: &str,
        line: usize,
        character: usize,
    ) -> Result<Option<Value>, SessionError> {
        let mut params = position_params(uri, line, character);
        params["context"] = json!({ "includeDeclaration": true });
        self.gated_request(
            self.capabilities.references,
            "textDocument/references",
            params,
        )
    }

    /// Request the document's symbol outline.
    pub fn document_symbols(&mut self, uri: &str) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.document_symbol,
            "textDocument/documentSymbol",
            json!({ "textDocument": { "uri": uri } }),
        )
    }

    /// Search workspace symbols by name.
    pub fn workspace_symbols(&mut self, query: &str) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.workspace_symbol,
            "workspace/symbol",
            json!({ "query": query }),
        )
    }

    /// Request whole-document formatting edits.
    pub fn formatting(
        &mut self,
        uri: &str,
        tab_size: usize,
        insert_spaces: bool,
    ) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.formatting,
            "textDocument/formatting",
            json!({
                "textDocument": { "uri": uri },
                "options": { "tabSize": tab_size, "insertSpaces": insert_spaces },
            }),
        )
    }

    /// Request formatting edits for a line/character range.
    pub fn range_formatting(
        &mut self,
        uri: &str,
        range: Value,
        tab_size: usize,
        insert_spaces: bool,
    ) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.range_formatting,
            "textDocument/rangeFormatting",
            json!({
                "textDocument": { "uri": uri },
                "range": range,
                "options": { "tabSize": tab_size, "insertSpaces": insert_spaces },
            }),
        )
    }

    /// Ask whether the symbol at a position can be renamed.
    pub fn prepare_rename(
        &mut self,
        uri: &str,
        line: usize,
        character: usize,
    ) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.rename,
            "textDocument/prepareRename",
            position_params(uri, line, character),
        )
    }

    /// Request a workspace edit renaming the symbol at a position.
    pub fn rename(
        &mut self,
        uri: &str,
        line: usize,
        character: usize,
        new_name: &str,
    ) -> Result<Option<Value>, SessionError> {
        let mut params = position_params(uri, line, character);
        params["newName"] = json!(new_name);
        self.gated_request(self.capabilities.rename, "textDocument/rename", params)
    }

    /// Request inlay hints for a line/character range.
    pub fn inlay_hints(&mut self, uri: &str, range: Value) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.inlay_hint,
            "textDocument/inlayHint",
            json!({ "textDocument": { "uri": uri }, "range": range }),
        )
    }

    /// Request the document's links.
    pub fn document_links(&mut self, uri: &str) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.document_link,
            "textDocument/documentLink",
            json!({ "textDocument": { "uri": uri } }),
        )
    }

    /// Request presentations for a picked color value.
    pub fn color_presentations(
        &mut self,
        uri: &str,
        color: Value,
        range: Value,
    ) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.document_color,
            "textDocument/colorPresentation",
            json!({ "textDocument": { "uri": uri }, "color": color, "range": range }),
        )
    }

    /// Prepare call-hierarchy items at a position.
    pub fn prepare_call_hierarchy(
        &mut self,
        uri: &str,
        line: usize,
        character: usize,
    ) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.call_hierarchy,
            "textDocument/prepareCallHierarchy",
            position_params(uri, line, character),
        )
    }

    /// Incoming calls for a prepared call-hierarchy item.
    pub fn call_hierarchy_incoming(&mut self, item: Value) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.call_hierarchy,
            "callHierarchy/incomingCalls",
            json!({ "item": item }),
        )
    }

    /// Outgoing calls for a prepared call-hierarchy item.
    pub fn call_hierarchy_outgoing(&mut self, item: Value) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.call_hierarchy,
            "callHierarchy/outgoingCalls",
            json!({ "item": item }),
        )
    }

    /// Prepare type-hierarchy items at a position.
    pub fn prepare_type_hierarchy(
        &mut self,
        uri: &str,
        line: usize,
        character: usize,
    ) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.type_hierarchy,
            "textDocument/prepareTypeHierarchy",
            position_params(uri, line, character),
        )
    }

    /// Supertypes for a prepared type-hierarchy item.
    pub fn type_hierarchy_supertypes(&mut self, item: Value) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.type_hierarchy,
            "typeHierarchy/supertypes",
            json!({ "item": item }),
        )
    }

    /// Subtypes for a prepared type-hierarchy item.
    pub fn type_hierarchy_subtypes(&mut self, item: Value) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.type_hierarchy,
            "typeHierarchy/subtypes",
            json!({ "item": item }),
        )
    }

    /// Ask the server to execute a command it owns.
    pub fn execute_command(
        &mut self,
        command: &str,
        arguments: Value,
    ) -> Result<Option<Value>, SessionError> {
        self.gated_request(
            self.capabilities.execute_command,
            "workspace/executeCommand",
            json!({ "command": command, "arguments": arguments }),
        )
    }

    /// Process inbound traffic and elapsed debounce deadlines.
    ///
    /// Returns the asynchronous results that became available. A disposed
    /// session drains its channel and returns nothing.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        if self.disposed {
            while self.client.try_recv().is_some() {}
            return Vec::new();
        }

        let mut events = Vec::new();
        self.flush_queued_opens();

        for message in std::mem::take(&mut self.backlog) {
            self.handle_message(message, &mut events);
        }
        while let Some(inbound) = self.client.try_recv() {
            match inbound {
                Inbound::Message(message) => self.handle_message(message, &mut events),
                Inbound::Io(err) => warn!(%err, "transport failed"),
            }
        }

        self.fire_elapsed_refreshes();
        events
    }

    /// Perform the orderly `shutdown`/`exit` exchange.
    pub fn shutdown(&mut self) -> Result<(), SessionError> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        if self.state != SessionState::Ready {
            return Err(SessionError::Precondition("session not ready"));
        }
        self.state = SessionState::ShuttingDown;
        let id = self.client.request("shutdown", Value::Null)?;
        // A misbehaving server must not wedge teardown.
        if let Err(err) =
            self.client
                .wait_for_response(id, self.config.request_timeout, &mut self.backlog)
        {
            warn!(%err, "shutdown response missing");
        }
        self.client.notify("exit", Value::Null)?;
        self.state = SessionState::Closed;
        Ok(())
    }

    /// Drop the session. All further inbound traffic is discarded and no
    /// further events are delivered.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.state = SessionState::Closed;
        self.pending.clear();
        self.refresh_due = [None, None, None, None];
        self.queued_opens.clear();
        self.versions.clear();
        self.texts.clear();
        self.diagnostics.clear();
        self.symbol_highlight_docs.clear();
        self.backlog.clear();
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        if self.state != SessionState::Ready {
            return Err(SessionError::Precondition("session not ready"));
        }
        Ok(())
    }

    fn settling(&self) -> bool {
        self.settle_until
            .is_some_and(|until| Instant::now() < until)
    }

    fn flush_queued_opens(&mut self) {
        if self.state != SessionState::Ready || self.settling() {
            return;
        }
        self.settle_until = None;
        for queued in std::mem::take(&mut self.queued_opens) {
            let version = self.versions.get(&queued.uri).copied().unwrap_or(1);
            if let Err(err) =
                self.send_did_open(&queued.uri, &queued.language_id, &queued.text, version)
            {
                warn!(uri = %queued.uri, %err, "deferred open failed");
            }
        }
    }

    fn send_did_open(
        &mut self,
        uri: &str,
        language_id: &str,
        text: &str,
        version: i64,
    ) -> Result<(), SessionError> {
        self.client.notify(
            "textDocument/didOpen",
            json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": language_id,
                    "version": version,
                    "text": text,
                },
            }),
        )
    }

    fn gated_request(
        &mut self,
        enabled: bool,
        method: &'static str,
        params: Value,
    ) -> Result<Option<Value>, SessionError> {
        self.ensure_ready()?;
        if !enabled {
            debug!(method, "capability off, returning default");
            return Ok(None);
        }
        let id = self.client.request(method, params)?;
        let response =
            self.client
                .wait_for_response(id, self.config.request_timeout, &mut self.backlog)?;
        if let Some(error) = response.get("error") {
            return Err(SessionError::Protocol {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown server error")
                    .to_string(),
            });
        }
        Ok(Some(response.get("result").cloned().unwrap_or(Value::Null)))
    }

    fn schedule_refresh(&mut self, kind: RefreshKind, uri: &str) {
        let delay = match kind {
            RefreshKind::SemanticTokens => self.config.semantic_tokens_debounce,
            RefreshKind::FoldingRanges => self.config.folding_debounce,
            RefreshKind::DocumentColors => self.config.colors_debounce,
            RefreshKind::CodeActions => self.config.code_actions_debounce,
        };
        // Trailing-edge debounce: overwrite any pending deadline.
        self.refresh_due[kind.slot()] = Some((Instant::now() + delay, uri.to_string()));
    }

    fn fire_elapsed_refreshes(&mut self) {
        let now = Instant::now();
        for kind in [
            RefreshKind::SemanticTokens,
            RefreshKind::FoldingRanges,
            RefreshKind::DocumentColors,
            RefreshKind::CodeActions,
        ] {
            let due = match &self.refresh_due[kind.slot()] {
                Some((deadline, _)) if *deadline <= now => true,
                _ => false,
            };
            if !due {
                continue;
            }
            let Some((_, uri)) = self.refresh_due[kind.slot()].take() else {
                continue;
            };
            if let Err(err) = self.fire_refresh(kind, &uri) {
                warn!(?kind, uri, %err, "refresh request failed");
            }
        }
    }

    fn fire_refresh(&mut self, kind: RefreshKind, uri: &str) -> Result<(), SessionError> {
        let (enabled, method, params) = match kind {
            RefreshKind::SemanticTokens => (
                self.capabilities.semantic_tokens && !self.symbol_highlight_docs.contains(uri),
                "textDocument/semanticTokens/full",
                json!({ "textDocument": { "uri": uri } }),
            ),
            RefreshKind::FoldingRanges => (
                self.capabilities.folding_range,
                "textDocument/foldingRange",
                json!({ "textDocument": { "uri": uri } }),
            ),
            RefreshKind::DocumentColors => (
                self.capabilities.document_color,
                "textDocument/documentColor",
                json!({ "textDocument": { "uri": uri } }),
            ),
            RefreshKind::CodeActions => {
                let Some(range) = self.diagnostics_union_range(uri) else {
                    return Ok(());
                };
                let diagnostics = self.diagnostics.get(uri).cloned().unwrap_or_default();
                (
                    self.capabilities.code_actions,
                    "textDocument/codeAction",
                    json!({
                        "textDocument": { "uri": uri },
                        "range": range,
                        "context": { "diagnostics": diagnostics },
                    }),
                )
            }
        };
        if !enabled {
            return Ok(());
        }
        let id = self.client.request(method, params)?;
        self.pending.insert(
            id,
            PendingRequest {
                method,
                uri: uri.to_string(),
                issued_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Union range over the stored diagnostics for `uri`: min start, max end.
    fn diagnostics_union_range(&self, uri: &str) -> Option<Value> {
        let diagnostics = self.diagnostics.get(uri)?;
        let mut start: Option<(u64, u64)> = None;
        let mut end: Option<(u64, u64)> = None;
        // A diagnostic without a well-formed range does not spoil the union.
        let spans = diagnostics.iter().filter_map(|diagnostic| {
            let range = diagnostic.get("range")?;
            Some((
                position_pair(range.get("start")?)?,
                position_pair(range.get("end")?)?,
            ))
        });
        for (s, e) in spans {
            start = Some(start.map_or(s, |cur| cur.min(s)));
            end = Some(end.map_or(e, |cur| cur.max(e)));
        }
        let (start, end) = (start?, end?);
        Some(json!({
            "start": { "line": start.0, "character": start.1 },
            "end": { "line": end.0, "character": end.1 },
        }))
    }

    fn handle_message(&mut self, message: Value, events: &mut Vec<SessionEvent>) {
        let has_id = message.get("id").is_some();
        let has_method = message.get("method").is_some();
        match (has_id, has_method) {
            // Server-to-client request.
            (true, true) => {
                if let Err(err) = self.client.answer_server_request(&message) {
                    warn!(%err, "failed to answer server request");
                }
            }
            // Notification.
            (false, true) => self.handle_notification(&message, events),
            // Response to one of our requests.
            (true, _) => self.handle_response(&message, events),
            (false, false) => warn!("dropping malformed message"),
        }
    }

    fn handle_notification(&mut self, message: &Value, events: &mut Vec<SessionEvent>) {
        let method = message.get("method").and_then(Value::as_str).unwrap_or("");
        let params = message.get("params").cloned().unwrap_or(Value::Null);
        match method {
            "textDocument/publishDiagnostics" => self.handle_diagnostics(&params, events),
            "$/symbolHighlight" => self.handle_symbol_highlight(&params, events),
            other => debug!(method = other, "ignoring notification"),
        }
    }

    fn handle_diagnostics(&mut self, params: &Value, events: &mut Vec<SessionEvent>) {
        let Some(uri) = params.get("uri").and_then(Value::as_str) else {
            return;
        };
        if !self.versions.contains_key(uri) {
            debug!(uri, "diagnostics for closed document dropped");
            return;
        }
        let diagnostics: Vec<Value> = params
            .get("diagnostics")
            .and_then(Value::as_array)
            .map(|all| {
                all.iter()
                    .filter(|diagnostic| {
                        let severity = diagnostic
                            .get("severity")
                            .and_then(Value::as_u64)
                            .unwrap_or(0);
                        !self.config.suppressed_severities.contains(&severity)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let has_any = !diagnostics.is_empty();
        self.diagnostics.insert(uri.to_string(), diagnostics.clone());
        events.push(SessionEvent::Diagnostics {
            uri: uri.to_string(),
            diagnostics,
        });
        if has_any && self.capabilities.code_actions {
            self.schedule_refresh(RefreshKind::CodeActions, uri);
        }
    }

    fn handle_symbol_highlight(&mut self, params: &Value, events: &mut Vec<SessionEvent>) {
        let Some(uri) = params.get("uri").and_then(Value::as_str) else {
            return;
        };
        let Some(text) = self.texts.get(uri) else {
            debug!(uri, "symbol highlights for closed document dropped");
            return;
        };
        // First sighting switches this document to the push source and
        // suppresses the stream-based token fetch for it.
        if self.symbol_highlight_docs.insert(uri.to_string())
            && self.refresh_due[RefreshKind::SemanticTokens.slot()]
                .as_ref()
                .is_some_and(|(_, slot_uri)| slot_uri == uri)
        {
            self.refresh_due[RefreshKind::SemanticTokens.slot()] = None;
        }
        let table = LineStartTable::new(text);
        let tokens: Vec<DecodedToken> = params
            .get("symbols")
            .and_then(Value::as_array)
            .map(|symbols| {
                symbols
                    .iter()
                    .filter_map(|symbol| decode_symbol_highlight(symbol, &table))
                    .collect()
            })
            .unwrap_or_default();
        events.push(SessionEvent::SymbolHighlights {
            uri: uri.to_string(),
            tokens,
        });
    }

    fn handle_response(&mut self, message: &Value, events: &mut Vec<SessionEvent>) {
        let Some(id) = message.get("id").and_then(Value::as_u64) else {
            warn!("dropping response with non-integer id");
            return;
        };
        let Some(pending) = self.pending.remove(&id) else {
            warn!(id, "dropping unmatched response");
            return;
        };
        debug!(
            id,
            method = pending.method,
            elapsed_ms = pending.issued_at.elapsed().as_millis() as u64,
            "refresh response"
        );
        if let Some(error) = message.get("error") {
            warn!(id, method = pending.method, %error, "refresh answered with error");
            return;
        }
        let result = message.get("result").cloned().unwrap_or(Value::Null);
        match pending.method {
            "textDocument/semanticTokens/full" => {
                if self.symbol_highlight_docs.contains(&pending.uri) {
                    debug!(uri = %pending.uri, "token stream superseded by symbol push");
                    return;
                }
                let data: Vec<u32> = result
                    .get("data")
                    .and_then(Value::as_array)
                    .map(|raw| {
                        raw.iter()
                            .filter_map(Value::as_u64)
                            .map(|n| n as u32)
                            .collect()
                    })
                    .unwrap_or_default();
                events.push(SessionEvent::SemanticTokens {
                    uri: pending.uri,
                    tokens: decode_semantic_tokens(&data),
                });
            }
            "textDocument/foldingRange" => {
                let ranges: Vec<(usize, usize)> = result
                    .as_array()
                    .map(|raw| {
                        raw.iter()
                            .filter_map(|range| {
                                let start = range.get("startLine").and_then(Value::as_u64)?;
                                let end = range.get("endLine").and_then(Value::as_u64)?;
                                (end > start).then_some((start as usize, end as usize))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                events.push(SessionEvent::FoldingRanges {
                    uri: pending.uri,
                    ranges,
                });
            }
            "textDocument/documentColor" => {
                events.push(SessionEvent::DocumentColors {
                    uri: pending.uri,
                    colors: result,
                });
            }
            "textDocument/codeAction" => {
                events.push(SessionEvent::CodeActions {
                    uri: pending.uri,
                    actions: result,
                });
            }
            other => debug!(method = other, "refresh response with no consumer"),
        }
    }
}

fn position_params(uri: &str, line: usize, character: usize) -> Value {
    json!({
        "textDocument": { "uri": uri },
        "position": { "line": line, "character": character },
    })
}

fn position_pair(position: &Value) -> Option<(u64, u64)> {
    Some((
        position.get("line").and_then(Value::as_u64)?,
        position.get("character").and_then(Value::as_u64)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_parse_accepts_bool_and_object_forms() {
        let caps = ServerCapabilities::from_initialize_result(&json!({
            "capabilities": {
                "hoverProvider": true,
                "completionProvider": { "triggerCharacters": ["."] },
                "renameProvider": false,
            }
        }));
        assert!(caps.hover);
        assert!(caps.completion);
        assert!(!caps.rename);
        assert!(!caps.folding_range);
    }

    #[test]
    fn test_refresh_slots_are_distinct() {
        let kinds = [
            RefreshKind::SemanticTokens,
            RefreshKind::FoldingRanges,
            RefreshKind::DocumentColors,
            RefreshKind::CodeActions,
        ];
        let mut seen = HashSet::new();
        for kind in kinds {
            assert!(seen.insert(kind.slot()));
        }
    }
}
