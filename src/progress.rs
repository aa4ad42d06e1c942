use indicatif::ProgressStyle;
use strum::EnumCount;
use tracing::{info_span, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::watcher::{Step, WatcherState};

const TEMPLATE: &str = "{spinner} [{bar:40}] {pos}/{len} {wide_msg}";

pub const FAILED_MESSAGE: &str =
    "Deployment failed. You can cancel or retry the deployment.";

/// What the progress bar shows for a given state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub position: u64,
    pub message: String,
}

impl Frame {
    pub fn of(state: &WatcherState) -> Self {
        let message = if state.is_errored {
            FAILED_MESSAGE.to_string()
        } else {
            match state.step.instruction() {
                Some(instruction) => {
                    format!("{} ({instruction})", state.step.status())
                }
                None => state.step.status().to_string(),
            }
        };

        Self {
            position: position(state.step),
            message,
        }
    }
}

/// Terminal rendering of a watcher's state.
///
/// The bar belongs to a span handled by the `IndicatifLayer`, so log lines
/// written through the layer's writer are printed above it. Without that
/// layer every call is a no-op.
#[derive(Clone, Debug)]
pub struct ProgressView {
    span: Span,
}

impl ProgressView {
    pub fn new() -> Self {
        let span = info_span!("deployment");

        if let Ok(style) = ProgressStyle::with_template(TEMPLATE) {
            span.pb_set_style(&style.progress_chars("=> "));
        }
        span.pb_set_length(Step::COUNT as u64);
        span.pb_start();

        let view = Self { span };
        view.reset();
        view
    }

    pub fn render(&self, state: &WatcherState) {
        let frame = Frame::of(state);

        self.span.pb_set_position(frame.position);
        self.span.pb_set_message(&frame.message);
    }

    /// Restarts the bar after a retry.
    pub fn reset(&self) {
        self.render(&WatcherState::default());
    }
}

impl Default for ProgressView {
    fn default() -> Self {
        Self::new()
    }
}

/// Completed milestones out of `Step::COUNT`, the idle step counts as one.
pub fn position(step: Step) -> u64 {
    step.index() as u64 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_follows_the_step() {
        assert_eq!(Frame::of(&WatcherState::default()).position, 1);

        let frame = Frame::of(&WatcherState {
            step: Step::Mined,
            is_polling: true,
            ..Default::default()
        });
        assert_eq!(frame.position, 5);

        let frame = Frame::of(&WatcherState {
            step: Step::Deployed,
            ..Default::default()
        });
        assert_eq!(frame.position, Step::COUNT as u64);
        assert_eq!(frame.message, Step::Deployed.status());
    }

    #[test]
    fn failure_replaces_the_status() {
        let frame = Frame::of(&WatcherState {
            step: Step::Validating,
            is_errored: true,
            ..Default::default()
        });

        assert_eq!(frame.position, 4);
        assert_eq!(frame.message, FAILED_MESSAGE);
    }

    #[test]
    fn view_without_indicatif_layer_is_inert() {
        let view = ProgressView::new();

        view.render(&WatcherState {
            step: Step::Confirming,
            ..Default::default()
        });
        view.reset();
    }
}
