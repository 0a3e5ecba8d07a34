use crate::chat::ChatError;

/// Events posted to the main loop by background tasks.
#[derive(Debug)]
pub enum AppEvent {
    /// Outcome of a chat request.
    ChatReply(Result<String, ChatError>),
    /// The controlling terminal changed size.
    Resize,
}
