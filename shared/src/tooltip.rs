//! Single-instance tooltip with a generation-checked auto-hide timer.
//!
//! `show` hands back a [`TimerTicket`]; the host schedules it and reports back
//! through [`Tooltip::expire`]. Replacing or hiding the tooltip bumps the
//! generation, so a late timer from an older tooltip is ignored.

use crate::entity::{Chunk, Question};

const PREVIEW_CHARS: usize = 150;
/// Offset of the tooltip box from the pointer.
pub const ANCHOR_OFFSET: (f64, f64) = (10.0, -10.0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TooltipContent {
    pub title: String,
    pub body: String,
}

impl TooltipContent {
    pub fn question(question: &Question) -> Self {
        Self {
            title: format!("Question #{}", question.id),
            body: preview(&question.display_text(), false),
        }
    }

    pub fn chunk(chunk: &Chunk) -> Self {
        Self {
            title: "Chunk".to_string(),
            body: preview(&chunk.text, true),
        }
    }

    pub fn to_html(&self) -> String {
        format!(
            r#"<div class="tooltip-title">{}</div><div class="tooltip-body">{}</div>"#,
            escape_html(&self.title),
            escape_html(&self.body)
        )
    }
}

fn preview(text: &str, ellipsis: bool) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if ellipsis && chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// A pending auto-hide the host must schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTicket {
    pub generation: u64,
    pub delay_ms: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveTooltip {
    pub content: TooltipContent,
    /// Page position of the tooltip box.
    pub anchor: (f64, f64),
    /// Client pointer position captured at creation.
    pub origin: (f64, f64),
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TooltipState {
    Hidden,
    Visible(ActiveTooltip),
}

#[derive(Debug, Clone)]
pub struct Tooltip {
    state: TooltipState,
    generation: u64,
    dismiss_distance: f64,
}

impl Tooltip {
    pub fn new(dismiss_distance: f64) -> Self {
        Self {
            state: TooltipState::Hidden,
            generation: 0,
            dismiss_distance,
        }
    }

    pub fn state(&self) -> &TooltipState {
        &self.state
    }

    pub fn active(&self) -> Option<&ActiveTooltip> {
        match &self.state {
            TooltipState::Visible(active) => Some(active),
            TooltipState::Hidden => None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.active().is_some()
    }

    /// Replace whatever is showing. `client` is the pointer in viewport
    /// coordinates (used for the dismiss distance), `page` in document
    /// coordinates (used for placement).
    pub fn show(
        &mut self,
        content: TooltipContent,
        client: (f64, f64),
        page: (f64, f64),
        timeout_ms: u32,
    ) -> TimerTicket {
        self.generation += 1;
        self.state = TooltipState::Visible(ActiveTooltip {
            content,
            anchor: (page.0 + ANCHOR_OFFSET.0, page.1 + ANCHOR_OFFSET.1),
            origin: client,
            generation: self.generation,
        });
        TimerTicket {
            generation: self.generation,
            delay_ms: timeout_ms,
        }
    }

    /// Timer callback. Returns `true` if this hid the tooltip.
    pub fn expire(&mut self, generation: u64) -> bool {
        match &self.state {
            TooltipState::Visible(active) if active.generation == generation => self.hide(),
            _ => false,
        }
    }

    /// Pointer tracking while visible. Returns `true` if the pointer strayed
    /// far enough to dismiss.
    pub fn pointer_moved(&mut self, client_x: f64, client_y: f64) -> bool {
        let Some(active) = self.active() else {
            return false;
        };
        let dx = client_x - active.origin.0;
        let dy = client_y - active.origin.1;
        if (dx * dx + dy * dy).sqrt() > self.dismiss_distance {
            self.hide()
        } else {
            false
        }
    }

    /// Returns `true` if a tooltip was showing.
    pub fn hide(&mut self) -> bool {
        if matches!(self.state, TooltipState::Hidden) {
            return false;
        }
        self.generation += 1;
        self.state = TooltipState::Hidden;
        true
    }
}
