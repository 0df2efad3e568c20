#![forbid(unsafe_code)]

//! Overlay composition.
//!
//! [`compose`] turns the machine state, the located target and the viewport
//! into one [`OverlayFrame`]: backdrop, spotlight, tooltip, progress dots,
//! and the control bar. The frame is plain data; the host paints it.
//!
//! A target that was never found yields a frame with no spotlight and no
//! tooltip, but the backdrop and the control bar are always present, so the
//! tour stays navigable as a plain text walkthrough.

use std::fmt;

use nostour_core::geometry::{Placement, Rect, Viewport};
use nostour_runtime::machine::TourMachine;

use crate::placement::{self, Backdrop, OverlayConfig};

/// State of one progress dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DotState {
    Done,
    Current,
    Upcoming,
}

/// One progress dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressDot {
    pub index: usize,
    pub state: DotState,
    /// Whether clicking the dot would jump there.
    pub clickable: bool,
}

/// Label of the primary button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextLabel {
    Next,
    Finish,
    /// Disabled while the step waits for an action.
    Waiting,
}

impl NextLabel {
    pub const fn as_str(self) -> &'static str {
        match self {
            NextLabel::Next => "Next",
            NextLabel::Finish => "Finish",
            NextLabel::Waiting => "Waiting…",
        }
    }
}

/// The fixed control bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controls {
    /// The step these controls were rendered for; clicks carry it back.
    pub step: usize,
    pub total: usize,
    pub can_go_back: bool,
    pub next_label: NextLabel,
    pub next_enabled: bool,
    pub show_skip: bool,
}

impl Controls {
    /// "2 / 5" style counter.
    pub fn counter(&self) -> String {
        format!("{} / {}", self.step + 1, self.total)
    }
}

/// The positioned tooltip card.
#[derive(Debug, Clone, PartialEq)]
pub struct TooltipView {
    pub title: String,
    pub content: String,
    pub placement: Placement,
    /// Viewport coordinates.
    pub rect: Rect,
    /// Action the step is waiting for, shown as a hint.
    pub waiting_for: Option<String>,
}

/// Everything the host needs to paint one overlay frame.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayFrame {
    pub backdrop: Backdrop,
    /// Document coordinates.
    pub spotlight: Option<Rect>,
    pub tooltip: Option<TooltipView>,
    pub dots: Vec<ProgressDot>,
    pub controls: Controls,
}

impl OverlayFrame {
    /// Dots as text, `●` done, `◉` current, `○` upcoming.
    pub fn dots_text(&self) -> String {
        self.dots
            .iter()
            .map(|d| match d.state {
                DotState::Done => '●',
                DotState::Current => '◉',
                DotState::Upcoming => '○',
            })
            .collect()
    }
}

impl fmt::Display for OverlayFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.controls.counter(), self.dots_text())?;
        match &self.tooltip {
            Some(tip) => {
                write!(f, " {}", tip.title)?;
                if let Some(action) = &tip.waiting_for {
                    write!(f, " (waiting for {action})")?;
                }
            }
            None => f.write_str(" <no target>")?,
        }
        write!(f, " | {}", self.controls.next_label.as_str())
    }
}

/// Build the frame for the machine's current step.
///
/// `target` is the located element's rectangle in viewport coordinates.
/// Returns `None` when no tour is active.
pub fn compose(
    machine: &TourMachine,
    target: Option<Rect>,
    viewport: &Viewport,
    config: &OverlayConfig,
) -> Option<OverlayFrame> {
    let step = machine.current_step()?;
    let state = machine.state();
    let current = state.current_step;
    let total = state.total_steps;

    let geometry = target.map(|rect| {
        placement::layout(rect, step.placement, step.spotlight_padding, viewport, config)
    });
    if geometry.is_none() {
        tracing::trace!(step = current, target = %step.target, "no target rect; controls only");
    }
    let spotlight = geometry.map(|g| g.spotlight);
    let tooltip = geometry.map(|g| TooltipView {
        title: step.title.clone(),
        content: step.content.clone(),
        placement: step.placement,
        rect: g.tooltip,
        waiting_for: state.expected_action.clone(),
    });

    let dots = (0..total)
        .map(|index| ProgressDot {
            index,
            state: match index.cmp(&current) {
                std::cmp::Ordering::Less => DotState::Done,
                std::cmp::Ordering::Equal => DotState::Current,
                std::cmp::Ordering::Greater => DotState::Upcoming,
            },
            clickable: index != current && machine.can_jump_to(index),
        })
        .collect();

    let next_label = if state.waiting_for_action {
        NextLabel::Waiting
    } else if current + 1 == total {
        NextLabel::Finish
    } else {
        NextLabel::Next
    };

    Some(OverlayFrame {
        backdrop: Backdrop::for_viewport(viewport, spotlight),
        spotlight,
        tooltip,
        dots,
        controls: Controls {
            step: current,
            total,
            can_go_back: current > 0,
            next_label,
            next_enabled: !state.waiting_for_action,
            show_skip: true,
        },
    })
}
