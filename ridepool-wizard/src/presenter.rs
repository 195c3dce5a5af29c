use crate::command::UserEvent;
use crate::prompt::Reply;
use crate::wizard::{Wizard, WizardError};
use async_trait::async_trait;

/// The chat or UI layer. Shows a reply and waits for the user's answer;
/// `None` means the user went away.
#[async_trait]
pub trait Presenter: Send + Sync {
    async fn prompt(&self, user_key: &str, reply: &Reply) -> Option<UserEvent>;
}

/// Drives a started wizard to completion through `presenter`.
///
/// Stops on the first finished reply. If the presenter gives up, the
/// session is abandoned and the last reply is returned unchanged.
pub async fn run_conversation(
    wizard: &Wizard,
    presenter: &dyn Presenter,
    user_key: &str,
    start: Reply,
) -> Result<Reply, WizardError> {
    let mut reply = start;
    while !reply.is_finished() {
        let Some(event) = presenter.prompt(user_key, &reply).await else {
            wizard.abandon(user_key).await?;
            return Ok(reply);
        };
        reply = wizard.advance(user_key, reply.seq, event).await?;
    }
    let _ = presenter.prompt(user_key, &reply).await;
    Ok(reply)
}
