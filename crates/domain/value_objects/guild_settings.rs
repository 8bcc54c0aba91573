use serde::{Deserialize, Serialize};

pub const MAX_BOT_NAME_CHARS: usize = 32;

/// Cosmetic overrides for a guild's shared bot. A guild with any override set is "branded".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildBotSettings {
    pub bot_name: Option<String>,
    pub bot_avatar: Option<String>,
    pub embed_color: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl GuildBotSettings {
    /// Trims every field, drops blanks and cuts the name to the Discord display limit.
    pub fn normalized(self) -> Self {
        Self {
            bot_name: non_blank(self.bot_name)
                .map(|name| name.chars().take(MAX_BOT_NAME_CHARS).collect()),
            bot_avatar: non_blank(self.bot_avatar),
            embed_color: non_blank(self.embed_color),
        }
    }

    pub fn is_branded(&self) -> bool {
        [&self.bot_name, &self.bot_avatar, &self.embed_color]
            .into_iter()
            .any(|value| value.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }

    /// Accepts `#RGB` and `#RRGGBB`.
    pub fn embed_color_is_valid(&self) -> bool {
        match self.embed_color.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(color) => {
                (color.len() == 4 || color.len() == 7)
                    && color.starts_with('#')
                    && color[1..].chars().all(|c| c.is_ascii_hexdigit())
            }
        }
    }
}
