//! Session lifecycle state machine.
//!
//! States: Uninitialized -> Initializing -> Ready -> ShuttingDown ->
//! Terminated. All query and lifecycle operations serialize through one
//! session; indexing runs on the blocking pool so the dispatcher stays
//! responsive.
//!
//! Protocol-level failures (unknown method, bad params) become JSON-RPC
//! errors; method-level failures come back as `result.success = false`
//! with a message, and the session stays alive.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::binding::BindingRegistry;
use crate::config::Settings;
use crate::error::StateError;
use crate::indexing::IndexUpdate;
use crate::registry::PackageRegistry;
use crate::store::SymbolStore;

use super::wire::{Request, Response, RpcError, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
    Terminated,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Initializing => "Initializing",
            Self::Ready => "Ready",
            Self::ShuttingDown => "ShuttingDown",
            Self::Terminated => "Terminated",
        }
    }
}

struct ActiveProject {
    language_id: String,
    registry: PackageRegistry,
    store: SymbolStore,
    updates: broadcast::Receiver<IndexUpdate>,
    dirty: bool,
}

pub struct Session {
    settings: Arc<Settings>,
    bindings: BindingRegistry,
    state: SessionState,
    project: Option<ActiveProject>,
}

#[derive(Deserialize)]
struct InitializeParams {
    #[serde(rename = "rootPath")]
    root_path: PathBuf,
    #[serde(rename = "languageId")]
    language_id: String,
}

#[derive(Deserialize)]
struct SqlParams {
    query: String,
    #[serde(default)]
    parameters: Vec<Value>,
    #[serde(default)]
    format: Option<String>,
}

#[derive(Deserialize)]
struct DidChangeParams {
    path: PathBuf,
}

impl Session {
    pub fn new(settings: Arc<Settings>, bindings: BindingRegistry) -> Self {
        Self {
            settings,
            bindings,
            state: SessionState::Uninitialized,
            project: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    /// Route one request. Returns None for notifications.
    pub async fn dispatch(&mut self, request: Request) -> Option<Response> {
        let id = request.id;
        if !request.jsonrpc.is_empty() && request.jsonrpc != "2.0" {
            return id.map(|id| {
                Response::error(
                    Some(id),
                    super::wire::INVALID_REQUEST,
                    format!("unsupported jsonrpc version '{}'", request.jsonrpc),
                )
            });
        }

        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(request.params).await,
            "sql" => self.sql(request.params),
            "status" => Ok(self.status()),
            "shutdown" => self.shutdown(),
            "loadDependencies" => self.load_dependencies().await,
            "file/didChange" => {
                // Notification by contract: no response either way.
                self.did_change(request.params);
                return None;
            }
            other => Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            )),
        };

        match (id, outcome) {
            (None, _) => None,
            (Some(id), Ok(result)) => Some(Response::result(id, result)),
            (Some(id), Err(e)) => Some(Response::error(Some(id), e.code, e.message)),
        }
    }

    async fn initialize(&mut self, params: Value) -> Result<Value, RpcError> {
        let params: InitializeParams = parse_params("initialize", params)?;

        if self.state != SessionState::Uninitialized {
            return Ok(failure(StateError::InvalidTransition {
                operation: "initialize",
                state: self.state.name(),
            }));
        }

        self.state = SessionState::Initializing;
        crate::log_event!("session", "initializing", "{}", params.root_path.display());

        match self.bring_up(&params.root_path, &params.language_id).await {
            Ok(project) => {
                let result = json!({
                    "success": true,
                    "projectName": project.registry.project_name(),
                    "fileCount": project.registry.file_count(),
                    "symbolCount": project.registry.symbol_count(),
                });
                self.project = Some(project);
                self.state = SessionState::Ready;
                Ok(result)
            }
            Err(message) => {
                self.state = SessionState::Uninitialized;
                crate::log_event!("session", "initialize failed", "{message}");
                Ok(json!({"success": false, "message": message}))
            }
        }
    }

    async fn bring_up(
        &mut self,
        root_path: &Path,
        language_id: &str,
    ) -> Result<ActiveProject, String> {
        let binding = self
            .bindings
            .get(language_id)
            .ok_or_else(|| format!("no binding registered for language '{language_id}'"))?;

        let registry = PackageRegistry::open(root_path, binding, self.settings.clone())
            .map_err(|e| e.to_string())?;
        let updates = registry.subscribe();

        let registry = tokio::task::spawn_blocking(move || {
            registry.initial_index_all(None);
            registry
        })
        .await
        .map_err(|e| format!("indexing task failed: {e}"))?;

        let mut registry = registry;
        registry.start_watching().map_err(|e| e.to_string())?;

        let store =
            SymbolStore::in_memory(&self.settings.store).map_err(|e| e.to_string())?;
        registry.rebuild_store(&store).map_err(|e| e.to_string())?;

        let mut project = ActiveProject {
            language_id: language_id.to_string(),
            registry,
            store,
            updates,
            dirty: false,
        };
        // The initial-index updates are already reflected in the store.
        drain_updates(&mut project);
        project.dirty = false;
        Ok(project)
    }

    fn sql(&mut self, params: Value) -> Result<Value, RpcError> {
        if self.state != SessionState::Ready {
            return Ok(json!({"success": false, "error": StateError::NotInitialized.to_string()}));
        }
        let params: SqlParams = parse_params("sql", params)?;

        let project = self
            .project
            .as_mut()
            .ok_or_else(|| RpcError::new(INTERNAL_ERROR, "no active project"))?;

        // Store rebuilds are batched: catch up on pending index updates
        // here rather than per change event.
        if drain_updates(project) {
            match project.registry.rebuild_store(&project.store) {
                Ok(_) => project.dirty = false,
                Err(e) => tracing::warn!("[session] rebuild failed: {e}"),
            }
        }

        match project.store.query(&params.query, &params.parameters) {
            Ok(result) => {
                let row_count = result.row_count();
                match params.format.as_deref() {
                    Some("text") => Ok(json!({
                        "success": true,
                        "format": "text",
                        "result": result.to_text(),
                        "rowCount": row_count,
                    })),
                    _ => Ok(json!({
                        "success": true,
                        "format": "json",
                        "columns": result.columns,
                        "result": result.to_json(),
                        "rowCount": row_count,
                    })),
                }
            }
            Err(e) => Ok(json!({"success": false, "error": e.to_string()})),
        }
    }

    fn status(&self) -> Value {
        match (&self.state, &self.project) {
            (SessionState::Ready, Some(project)) => json!({
                "initialized": true,
                "languageId": project.language_id,
                "fileCount": project.registry.file_count(),
                "symbolCount": project.registry.symbol_count(),
            }),
            _ => json!({"initialized": false}),
        }
    }

    fn did_change(&mut self, params: Value) {
        if self.state != SessionState::Ready {
            // Change events after shutdown (or before init) are dropped.
            crate::debug_event!("session", "didChange dropped", "state {}", self.state.name());
            return;
        }
        let Ok(params) = serde_json::from_value::<DidChangeParams>(params) else {
            tracing::warn!("[session] malformed file/didChange params");
            return;
        };
        if let Some(project) = &self.project {
            project.registry.refresh(&params.path);
        }
    }

    async fn load_dependencies(&mut self) -> Result<Value, RpcError> {
        if self.state != SessionState::Ready {
            return Ok(json!({"success": false, "error": StateError::NotInitialized.to_string()}));
        }
        let Some(mut project) = self.project.take() else {
            return Err(RpcError::new(INTERNAL_ERROR, "no active project"));
        };

        let joined = tokio::task::spawn_blocking(move || {
            let loaded = project.registry.load_dependencies();
            let rebuild = project.registry.rebuild_store(&project.store);
            (project, loaded, rebuild)
        })
        .await;

        match joined {
            Ok((project, loaded, rebuild)) => {
                self.project = Some(project);
                match rebuild {
                    Ok(_) => Ok(json!({"success": true, "loaded": loaded})),
                    Err(e) => Ok(json!({"success": false, "error": e.to_string()})),
                }
            }
            Err(e) => {
                // The project was lost with the panicked task.
                self.state = SessionState::Uninitialized;
                Err(RpcError::new(
                    INTERNAL_ERROR,
                    format!("dependency load failed: {e}"),
                ))
            }
        }
    }

    fn shutdown(&mut self) -> Result<Value, RpcError> {
        if self.state != SessionState::Ready {
            return Ok(failure(StateError::InvalidTransition {
                operation: "shutdown",
                state: self.state.name(),
            }));
        }
        self.state = SessionState::ShuttingDown;
        if let Some(mut project) = self.project.take() {
            project.registry.stop();
            // Store, cache handles, and watcher threads release here.
            drop(project);
        }
        self.state = SessionState::Terminated;
        crate::log_event!("session", "terminated");
        Ok(json!({"success": true}))
    }
}

/// Drain pending updates; true when the store projection is stale.
fn drain_updates(project: &mut ActiveProject) -> bool {
    loop {
        match project.updates.try_recv() {
            Ok(update) => {
                if update.dirties_store() {
                    project.dirty = true;
                }
            }
            Err(broadcast::error::TryRecvError::Lagged(_)) => {
                project.dirty = true;
            }
            Err(broadcast::error::TryRecvError::Empty)
            | Err(broadcast::error::TryRecvError::Closed) => break,
        }
    }
    project.dirty
}

fn parse_params<T: serde::de::DeserializeOwned>(
    method: &str,
    params: Value,
) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| {
        let error = crate::error::ProtocolError::InvalidParams {
            method: method.to_string(),
            reason: e.to_string(),
        };
        RpcError::new(INVALID_PARAMS, error.to_string())
    })
}

fn failure(error: StateError) -> Value {
    json!({"success": false, "message": error.to_string()})
}
