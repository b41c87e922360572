use crate::reactions::ReactionStrategy;
use domain::protocol::PREVIEW_CHARS;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WidgetSettings {
    pub reaction_strategy: ReactionStrategy,
    /// Plain-text characters shown before "show more".
    pub preview_chars: usize,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            reaction_strategy: ReactionStrategy::default(),
            preview_chars: PREVIEW_CHARS,
        }
    }
}
