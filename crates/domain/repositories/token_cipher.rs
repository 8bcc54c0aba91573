use anyhow::Result;
use mockall::automock;

use crate::domain::value_objects::bot_instances::BotToken;

/// Bot tokens are stored sealed; only the launch path ever sees them in the clear.
#[automock]
pub trait TokenCipher {
    fn reveal(&self, sealed: &BotToken) -> Result<BotToken>;
}
