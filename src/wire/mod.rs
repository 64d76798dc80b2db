use serde::{Deserialize, Serialize};

/// ========================================
/// Chat-completions wire protocol
/// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Prompt history sent to the model, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn single_user(prompt: impl Into<String>) -> Self {
        Self { messages: vec![ChatMessage::user(prompt)] }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Grows the history by exactly two entries: the partial answer and the
    /// instruction to resume it.
    pub fn push_continuation(&mut self, partial: &str, instruction: &str) {
        self.messages.push(ChatMessage::assistant(partial));
        self.messages.push(ChatMessage::user(instruction));
    }

    /// Drops all history in favour of one user message.
    pub fn replace_with(&mut self, prompt: impl Into<String>) {
        self.messages.clear();
        self.messages.push(ChatMessage::user(prompt));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

impl ChatRequest {
    pub fn streaming(model: &str, conversation: &Conversation, max_tokens: u32, temperature: f32) -> Self {
        Self {
            model: model.to_string(),
            messages: conversation.messages().to_vec(),
            max_tokens,
            temperature,
            stream: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    #[default]
    None,
}

impl FinishReason {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::None => "none",
        }
    }
}

/// One `data:` frame of the event stream.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamFrame {
    #[serde(default)]
    pub choices: Vec<FrameChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameChoice {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Incremental piece of model output plus its terminal tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub text: String,
    pub finish_reason: FinishReason,
}

/// Result of one complete streaming round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub content: String,
    pub finish_reason: FinishReason,
}
