//! Console Progress Rendering
//!
//! Follows one generation's [`ProgressEvent`] stream and redraws a single
//! status line until the run reaches a terminal state.

use std::sync::Arc;
use std::time::Instant;

use console::style;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::progress::{GenerationProgress, GenerationStatus, ProgressEvent, ProgressTracker};
use crate::types::GenerationId;

const BAR_WIDTH: usize = 30;
const SPINNER: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

pub struct ConsoleRenderer {
    tracker: Arc<ProgressTracker>,
    id: GenerationId,
    show_spinner: bool,
}

impl ConsoleRenderer {
    pub fn new(tracker: Arc<ProgressTracker>, id: GenerationId) -> Self {
        Self {
            tracker,
            id,
            show_spinner: true,
        }
    }

    pub fn with_spinner(mut self, show: bool) -> Self {
        self.show_spinner = show;
        self
    }

    /// Render one progress snapshot as a status line
    pub fn render(&self, progress: &GenerationProgress, elapsed_secs: u64, tick: usize) -> String {
        let spinner = if self.show_spinner && !progress.status.is_terminal() {
            format!("{} ", SPINNER[tick % SPINNER.len()])
        } else {
            String::new()
        };

        let bar = render_progress_bar(progress.percentage, BAR_WIDTH);
        let bar = match progress.status {
            GenerationStatus::Completed => style(bar).green().to_string(),
            GenerationStatus::Failed => style(bar).red().to_string(),
            _ => style(bar).cyan().to_string(),
        };

        format!(
            "{}{} {:>3}% {} ({})",
            spinner,
            bar,
            progress.percentage,
            style(&progress.step).dim(),
            format_duration(elapsed_secs)
        )
    }

    /// Start rendering (non-blocking). The task returns the final snapshot.
    pub fn start_render_loop(self) -> JoinHandle<Option<GenerationProgress>> {
        let mut events = self.tracker.subscribe();

        tokio::spawn(async move {
            let started = Instant::now();
            let mut last: Option<GenerationProgress> = self.tracker.get_progress(&self.id);
            let mut tick = 0usize;

            loop {
                match events.recv().await {
                    Ok(ProgressEvent::Updated(progress)) if progress.id == self.id => {
                        tick += 1;
                        let line = self.render(&progress, started.elapsed().as_secs(), tick);
                        print!("\r\x1B[K{}", line);
                        let finished = progress.status.is_terminal();
                        last = Some(progress);
                        if finished {
                            break;
                        }
                    }
                    Ok(ProgressEvent::Cleared(id) | ProgressEvent::Expired(id)) if id == self.id => {
                        break;
                    }
                    Ok(_) => {}
                    // Skipped events are superseded by later snapshots
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }

            println!();
            last
        })
    }
}

/// Render a simple progress bar for a 0-100 percentage
fn render_progress_bar(percentage: u8, width: usize) -> String {
    let progress = (f32::from(percentage.min(100)) / 100.0).min(1.0);
    let filled = (progress * width as f32) as usize;
    let empty = width.saturating_sub(filled);

    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format duration as human-readable string
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressUpdate;

    #[test]
    fn test_progress_bar() {
        assert_eq!(render_progress_bar(0, 4), "[░░░░]");
        assert_eq!(render_progress_bar(50, 4), "[██░░]");
        assert_eq!(render_progress_bar(100, 4), "[████]");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(3725), "1h 2m");
    }

    #[tokio::test]
    async fn test_render_loop_stops_on_terminal_state() {
        let tracker = Arc::new(ProgressTracker::new());
        let id = GenerationId::new("render");
        let handle = ConsoleRenderer::new(Arc::clone(&tracker), id.clone())
            .with_spinner(false)
            .start_render_loop();

        // The renderer subscribes before spawning, so nothing is missed
        tracker.update_progress(&GenerationId::new("other"), ProgressUpdate::running("x", 10));
        tracker.update_progress(&id, ProgressUpdate::running("generating_plan", 15));
        tracker.update_progress(&id, ProgressUpdate::completed());

        let last = handle.await.unwrap().unwrap();
        assert_eq!(last.status, GenerationStatus::Completed);
        assert_eq!(last.percentage, 100);
    }
}
