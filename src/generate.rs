//! Streamed structured generation: adventure hooks and NPCs
//!
//! Generation grounds itself in the campaign index via hybrid search, then
//! streams model tokens through an incremental parser that emits each
//! complete item as its own event. The event sequence is monotonic:
//! `status* -> (hook|npc)* -> complete|error`.

use crate::context::ContextBuilder;
use crate::embedding::EmbeddingClient;
use crate::error::{LoreError, Result};
use crate::llm::{system_message, user_message, ChatOptions, LlmProvider, TokenUsage};
use crate::models::ContextSource;
use crate::search::{HybridSearch, SearchFilters};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// What kind of items a generation run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Hooks,
    Npcs,
}

impl GenerationKind {
    pub fn item_label(&self) -> &'static str {
        match self {
            GenerationKind::Hooks => "adventure hooks",
            GenerationKind::Npcs => "NPCs",
        }
    }
}

/// User-supplied generation parameters
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub party_level: Option<u8>,
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    3
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            tone: None,
            theme: None,
            party_level: None,
            count: default_count(),
        }
    }
}

/// A generated adventure hook
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdventureHook {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub involved_npcs: Vec<String>,
}

/// A generated non-player character
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GeneratedNpc {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appearance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// One server-sent generation event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GenerationEvent {
    Status {
        message: String,
    },
    Hook {
        hook: AdventureHook,
    },
    Npc {
        npc: GeneratedNpc,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        sources: Vec<ContextSource>,
        chunks_used: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        status_code: u16,
        error: String,
        message: String,
    },
}

/// Aggregate result for non-streaming callers
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub items: Vec<serde_json::Value>,
    pub sources: Vec<ContextSource>,
    pub chunks_used: usize,
    pub usage: Option<TokenUsage>,
}

/// Streams structured items generated from the campaign index
#[derive(Clone)]
pub struct GenerationStreamer {
    provider: Arc<dyn LlmProvider>,
    search: Arc<HybridSearch>,
    embeddings: Arc<EmbeddingClient>,
    context_builder: Arc<ContextBuilder>,
}

impl GenerationStreamer {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        search: Arc<HybridSearch>,
        embeddings: Arc<EmbeddingClient>,
        context_builder: Arc<ContextBuilder>,
    ) -> Self {
        Self {
            provider,
            search,
            embeddings,
            context_builder,
        }
    }

    /// Start a generation run, returning its event stream
    pub fn stream(
        &self,
        campaign_id: Uuid,
        kind: GenerationKind,
        params: GenerationParams,
        cancel: CancellationToken,
    ) -> ReceiverStream<GenerationEvent> {
        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let streamer = self.clone();

        tokio::spawn(async move {
            if let Err(e) = streamer.run(campaign_id, kind, &params, cancel, &tx).await {
                warn!("Generation failed: {}", e);
                let _ = tx
                    .send(GenerationEvent::Error {
                        status_code: error_status(&e),
                        error: e.category().to_string(),
                        message: public_message(&e),
                    })
                    .await;
            }
        });

        ReceiverStream::new(rx)
    }

    /// Run a generation to completion, collecting the aggregate result
    pub async fn generate(
        &self,
        campaign_id: Uuid,
        kind: GenerationKind,
        params: GenerationParams,
        cancel: CancellationToken,
    ) -> Result<GenerationOutcome> {
        let mut events = self.stream(campaign_id, kind, params, cancel);
        let mut outcome = GenerationOutcome {
            items: Vec::new(),
            sources: Vec::new(),
            chunks_used: 0,
            usage: None,
        };

        while let Some(event) = events.next().await {
            match event {
                GenerationEvent::Hook { hook } => outcome.items.push(serde_json::to_value(hook)?),
                GenerationEvent::Npc { npc } => outcome.items.push(serde_json::to_value(npc)?),
                GenerationEvent::Complete {
                    sources,
                    chunks_used,
                    usage,
                } => {
                    outcome.sources = sources;
                    outcome.chunks_used = chunks_used;
                    outcome.usage = usage;
                }
                GenerationEvent::Error { message, .. } => {
                    return Err(LoreError::Generic(anyhow::anyhow!(message)));
                }
                GenerationEvent::Status { .. } => {}
            }
        }

        Ok(outcome)
    }

    /// Regenerate a single item for index-targeted replacement
    ///
    /// Reuses the run's parameters with `count = 1`; the caller replaces
    /// the item at the requested position client-side.
    pub async fn regenerate_item(
        &self,
        campaign_id: Uuid,
        kind: GenerationKind,
        mut params: GenerationParams,
        cancel: CancellationToken,
    ) -> Result<GenerationOutcome> {
        params.count = 1;
        self.generate(campaign_id, kind, params, cancel).await
    }

    async fn run(
        &self,
        campaign_id: Uuid,
        kind: GenerationKind,
        params: &GenerationParams,
        cancel: CancellationToken,
        tx: &tokio::sync::mpsc::Sender<GenerationEvent>,
    ) -> Result<()> {
        let _ = tx
            .send(GenerationEvent::Status {
                message: "Gathering campaign lore".to_string(),
            })
            .await;

        // Grounding: search the campaign with a framing query
        let framing = framing_query(kind, params);
        let query_embedding = self.embeddings.embed_one(&framing, &cancel).await?;
        let results = self
            .search
            .search(
                &framing,
                &query_embedding,
                campaign_id,
                &SearchFilters::default(),
                None,
            )
            .await?;
        let context = self.context_builder.build(&results);

        let _ = tx
            .send(GenerationEvent::Status {
                message: format!("Generating {}", kind.item_label()),
            })
            .await;

        let messages = vec![
            system_message(schema_prompt(kind)),
            user_message(generation_prompt(kind, params, &context.context_text)),
        ];

        let mut stream = self
            .provider
            .chat_stream(&messages, &ChatOptions::default(), cancel.clone())
            .await?;

        let mut scanner = ItemScanner::new();
        let mut emitted = 0usize;

        while let Some(delta) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(LoreError::Cancelled);
            }

            for item in scanner.push(&delta?) {
                if emitted >= params.count {
                    break;
                }
                match typed_event(kind, item) {
                    Some(event) => {
                        emitted += 1;
                        if tx.send(event).await.is_err() {
                            // Consumer went away; stop generating
                            return Ok(());
                        }
                    }
                    None => warn!("Discarding malformed generated item"),
                }
            }
        }

        debug!("Generation emitted {} items", emitted);

        let _ = tx
            .send(GenerationEvent::Complete {
                sources: context.sources,
                chunks_used: context.chunks_used,
                usage: None,
            })
            .await;

        Ok(())
    }
}

fn typed_event(kind: GenerationKind, item: serde_json::Value) -> Option<GenerationEvent> {
    match kind {
        GenerationKind::Hooks => {
            let hook: AdventureHook = serde_json::from_value(item).ok()?;
            (!hook.title.trim().is_empty() && !hook.description.trim().is_empty())
                .then_some(GenerationEvent::Hook { hook })
        }
        GenerationKind::Npcs => {
            let npc: GeneratedNpc = serde_json::from_value(item).ok()?;
            (!npc.name.trim().is_empty() && !npc.description.trim().is_empty())
                .then_some(GenerationEvent::Npc { npc })
        }
    }
}

/// Search query framing the generation's grounding retrieval
fn framing_query(kind: GenerationKind, params: &GenerationParams) -> String {
    let mut terms: Vec<&str> = Vec::new();
    if let Some(tone) = &params.tone {
        terms.push(tone);
    }
    if let Some(theme) = &params.theme {
        terms.push(theme);
    }
    terms.push(match kind {
        GenerationKind::Hooks => "adventure plot conflict locations factions",
        GenerationKind::Npcs => "characters names factions personalities places",
    });
    terms.join(" ")
}

fn schema_prompt(kind: GenerationKind) -> String {
    let item_schema = match kind {
        GenerationKind::Hooks => {
            r#"{"title": string, "description": string, "location": string?, "involvedNpcs": [string]}"#
        }
        GenerationKind::Npcs => {
            r#"{"name": string, "description": string, "role": string?, "appearance": string?, "secret": string?}"#
        }
    };

    format!(
        "You create {} grounded in the supplied campaign lore. Respond with JSON only, no \
         prose, in the envelope {{\"items\": [...]}} where each item is {}",
        match kind {
            GenerationKind::Hooks => "adventure hooks",
            GenerationKind::Npcs => "non-player characters",
        },
        item_schema
    )
}

fn generation_prompt(kind: GenerationKind, params: &GenerationParams, context: &str) -> String {
    let mut prompt = String::new();

    if context.is_empty() {
        prompt.push_str("No campaign lore was found; invent fitting material.\n\n");
    } else {
        prompt.push_str("Campaign lore:\n");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }

    prompt.push_str(&format!("Generate {} {}.", params.count, kind.item_label()));
    if let Some(tone) = &params.tone {
        prompt.push_str(&format!(" Tone: {}.", tone));
    }
    if let Some(theme) = &params.theme {
        prompt.push_str(&format!(" Theme: {}.", theme));
    }
    if let Some(level) = params.party_level {
        prompt.push_str(&format!(" The party is level {}.", level));
    }

    prompt
}

/// HTTP-style status for an SSE error event
pub fn error_status(error: &LoreError) -> u16 {
    match error {
        LoreError::InvalidQuery(_) => 400,
        LoreError::NotFound(_) => 404,
        _ => 500,
    }
}

/// User-visible message, free of internal diagnostics
pub fn public_message(error: &LoreError) -> String {
    match error {
        LoreError::InvalidQuery(message) => message.clone(),
        LoreError::NotFound(message) => message.clone(),
        LoreError::Cancelled => "Generation cancelled".to_string(),
        _ => "Generation failed".to_string(),
    }
}

/// Incremental recogniser for complete top-level items
///
/// Consumes text deltas of a JSON envelope `{"items": [{...}, {...}]}` and
/// yields each balanced object as soon as its closing brace arrives.
pub struct ItemScanner {
    buffer: String,
    consumed: usize,
    in_items: bool,
    in_string: bool,
    escaped: bool,
    item_depth: i32,
    item_start: Option<usize>,
}

impl ItemScanner {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            consumed: 0,
            in_items: false,
            in_string: false,
            escaped: false,
            item_depth: 0,
            item_start: None,
        }
    }

    /// Feed a delta, returning any newly completed items
    pub fn push(&mut self, delta: &str) -> Vec<serde_json::Value> {
        self.buffer.push_str(delta);
        let mut items = Vec::new();

        let bytes = self.buffer.as_bytes();
        let mut i = self.consumed;

        while i < bytes.len() {
            let b = bytes[i];

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                i += 1;
                continue;
            }

            match b {
                b'"' => self.in_string = true,
                b'[' if !self.in_items && self.item_depth == 0 => self.in_items = true,
                b'{' if self.in_items => {
                    if self.item_depth == 0 {
                        self.item_start = Some(i);
                    }
                    self.item_depth += 1;
                }
                b'}' if self.in_items && self.item_depth > 0 => {
                    self.item_depth -= 1;
                    if self.item_depth == 0 {
                        if let Some(start) = self.item_start.take() {
                            let raw = &self.buffer[start..=i];
                            match serde_json::from_str(raw) {
                                Ok(value) => items.push(value),
                                Err(e) => warn!("Skipping unparseable item: {}", e),
                            }
                        }
                    }
                }
                b']' if self.in_items && self.item_depth == 0 => self.in_items = false,
                _ => {}
            }

            i += 1;
        }

        self.consumed = bytes.len();
        items
    }
}

impl Default for ItemScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner_whole_envelope_at_once() {
        let mut scanner = ItemScanner::new();
        let items = scanner.push(
            r#"{"items": [{"title": "The Sunken Crypt", "description": "Something stirs."},
                          {"title": "Ash Roads", "description": "Caravans vanish."}]}"#,
        );
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["title"], "The Sunken Crypt");
    }

    #[test]
    fn test_scanner_items_split_across_deltas() {
        let mut scanner = ItemScanner::new();
        assert!(scanner.push(r#"{"items": [{"title": "The Su"#).is_empty());
        assert!(scanner.push(r#"nken Crypt", "descri"#).is_empty());

        let first = scanner.push(r#"ption": "Something stirs."}, {"title":"#);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0]["title"], "The Sunken Crypt");

        let second = scanner.push(r#" "Ash Roads", "description": "Caravans vanish."}]}"#);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0]["title"], "Ash Roads");
    }

    #[test]
    fn test_scanner_handles_braces_inside_strings() {
        let mut scanner = ItemScanner::new();
        let items = scanner.push(
            r#"{"items": [{"title": "Brace } in { text", "description": "Escaped \" quote."}]}"#,
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["title"], "Brace } in { text");
    }

    #[test]
    fn test_scanner_nested_objects_stay_in_one_item() {
        let mut scanner = ItemScanner::new();
        let items = scanner.push(
            r#"{"items": [{"name": "Vess", "description": "A spy.", "stats": {"cunning": 9}}]}"#,
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["stats"]["cunning"], 9);
    }

    #[test]
    fn test_typed_event_rejects_empty_fields() {
        let missing = serde_json::json!({"title": "", "description": "x"});
        assert!(typed_event(GenerationKind::Hooks, missing).is_none());

        let valid = serde_json::json!({"title": "The Pale Road", "description": "x"});
        assert!(matches!(
            typed_event(GenerationKind::Hooks, valid),
            Some(GenerationEvent::Hook { .. })
        ));
    }

    #[test]
    fn test_framing_query_includes_tone_and_theme() {
        let params = GenerationParams {
            tone: Some("dark".to_string()),
            theme: Some("undead uprising".to_string()),
            ..GenerationParams::default()
        };
        let query = framing_query(GenerationKind::Hooks, &params);
        assert!(query.contains("dark"));
        assert!(query.contains("undead uprising"));
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = GenerationEvent::Error {
            status_code: 500,
            error: "llm_error".to_string(),
            message: "Generation failed".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["statusCode"], 500);

        let status = GenerationEvent::Status {
            message: "working".to_string(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["type"], "status");
    }
}
