use async_trait::async_trait;

use crate::config::Config;
use crate::errors::TransportError;
use crate::wire::{Completion, Conversation};

pub mod openui;

/// One streaming round-trip: send the conversation, return the whole
/// accumulated answer or a transport failure.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn stream_completion(&self, conversation: &Conversation) -> Result<Completion, TransportError>;
}

pub type DynProvider = Box<dyn Provider + Send + Sync>;

pub fn make_provider(cfg: &Config, echo: bool) -> Result<DynProvider, TransportError> {
    Ok(Box::new(openui::OpenUiProvider::from_config(cfg, echo)?))
}
