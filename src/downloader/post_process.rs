//! Post-processing pipeline entry point.

use crate::post_processing::PostProcessOutcome;
use crate::types::Task;

use super::RomDownloader;

impl RomDownloader {
    /// Run post-processing for a task that just reached `completed`
    ///
    /// The task stays completed whatever happens here; a failure only attaches
    /// its message to the task (the failure event is emitted by the pipeline).
    pub(crate) async fn run_post_processing(&self, task: &Task) -> PostProcessOutcome {
        let outcome = self.processing.process(task).await;

        if let Some(message) = outcome.error_message() {
            let mut registry = self.queue_state.registry.lock().await;
            if let Some(entry) = registry.tasks.get_mut(&task.id) {
                entry.error_message = Some(message.to_string());
            }
        }

        tracing::debug!(task_id = %task.id, ?outcome, "post-processing finished");
        outcome
    }
}
