use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Future returned by interactive collaborators (prompts, file pickers).
pub type PromptFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Save,
    Discard,
    Cancel,
}

/// Asks the user what to do with unsaved changes in `active_scene`.
pub trait DiscardPrompt {
    fn ask<'a>(&'a self, active_scene: &'a str) -> PromptFuture<'a, Decision>;
}

/// Prompt with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompt(pub Decision);

impl DiscardPrompt for FixedPrompt {
    fn ask<'a>(&'a self, _active_scene: &'a str) -> PromptFuture<'a, Decision> {
        let decision = self.0;
        Box::pin(async move { decision })
    }
}

pub struct UnsavedChangesGate {
    prompt: Box<dyn DiscardPrompt>,
}

impl UnsavedChangesGate {
    pub fn new(prompt: Box<dyn DiscardPrompt>) -> Self {
        Self { prompt }
    }

    /// Suspends on the prompt. `Save` runs `save` to completion before returning; a failed save
    /// turns into `Cancel`.
    pub async fn confirm_discard<F, Fut, E>(&self, active_scene: &str, save: F) -> Decision
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        match self.prompt.ask(active_scene).await {
            Decision::Save => match save().await {
                Ok(()) => Decision::Save,
                Err(err) => {
                    log::warn!("[gate] save before discard failed: {err}");
                    Decision::Cancel
                }
            },
            other => other,
        }
    }
}
