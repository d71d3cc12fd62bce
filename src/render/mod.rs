//! The render engine: a pure mapping from cached status, pending state
//! and display preferences to a card body plus the set of actions the
//! surface may offer. No I/O lives here; the only internal state is a
//! bounded memo cache for box-drawing lines, which affects latency only.

use crate::config::{ContainerSpec, Presentation};
use crate::status::{CacheEntry, GenerationSnapshot, PendingAction};
use crate::types::{ContainerAction, ContainerId};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

pub mod format;

use format::format_clock;

const BOX_CACHE_CAP: usize = 64;
const BOX_CACHE_EVICT: usize = 16;

/// Per-render inputs that come from the surface, not the container.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderContext {
    /// Detailed view requested (already collapsed by policy if need be).
    pub expanded: bool,
    /// The surface may show control buttons.
    pub allow_controls: bool,
    /// The surface may offer the expand/collapse toggle.
    pub allow_toggle: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    Status,
    Pending,
    Loading,
    Error,
    Overview,
}

/// One rendered card: what to display and what the surface may offer.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusCard {
    pub kind: CardKind,
    pub body: String,
    pub actions: Vec<ContainerAction>,
    pub toggle_available: bool,
    pub running: bool,
}

impl StatusCard {
    fn plain(kind: CardKind, body: String) -> Self {
        Self {
            kind,
            body,
            actions: Vec::new(),
            toggle_available: false,
            running: false,
        }
    }
}

/// Renders status cards. Owns the box-art memo cache so nothing here is
/// ambient global state.
pub struct RenderEngine {
    tz: Option<Tz>,
    box_width: usize,
    boxart: BoxArtCache,
}

impl RenderEngine {
    pub fn new(presentation: &Presentation) -> Self {
        Self {
            tz: presentation.tz(),
            box_width: presentation.box_width(),
            boxart: BoxArtCache::new(),
        }
    }

    /// Render the card for one container.
    ///
    /// Precedence: pending (while inside its window) beats the cache;
    /// an absent cache entry renders as loading; a container the config
    /// does not know renders as a configuration error.
    pub fn render(
        &self,
        spec: Option<&ContainerSpec>,
        entry: Option<&CacheEntry>,
        pending: Option<&PendingAction>,
        ctx: &RenderContext,
        now: DateTime<Utc>,
    ) -> StatusCard {
        let Some(spec) = spec else {
            return self.error_card(
                "unknown",
                "Configuration for this container is missing.",
            );
        };

        if let Some(pending) = pending {
            if !pending.timed_out(now) {
                return self.pending_card(&spec.name);
            }
        }

        let Some(entry) = entry else {
            return self.loading_card(&spec.name);
        };

        self.status_card(spec, entry, ctx)
    }

    /// The one-message fleet overview, driven by a generation snapshot.
    pub fn render_overview(
        &self,
        order: &[&ContainerSpec],
        generation: &GenerationSnapshot,
        pending_ids: &HashSet<ContainerId>,
    ) -> StatusCard {
        let width = self.box_width.max(24);
        let mut lines = Vec::with_capacity(order.len() + 3);

        lines.push(format!(
            "Last update: {}",
            format_clock(generation.published_at, self.tz)
        ));
        let header_text = "── Status ";
        lines.push(format!(
            "┌{header_text}{}",
            "─".repeat(width.saturating_sub(1 + header_text.chars().count()))
        ));

        for spec in order {
            let id = spec.id();
            let (emoji, text) = if pending_ids.contains(&id) {
                ("🟡", "Pending")
            } else {
                match generation.get(&id) {
                    Some(entry) if entry.snapshot.running => ("🟢", "Online"),
                    Some(_) => ("🔴", "Offline"),
                    None => ("⚠️", "Unknown"),
                }
            };
            lines.push(format!("│ {emoji} {text:<8} {}", spec.name));
        }

        lines.push(format!("└{}", "─".repeat(width - 1)));

        StatusCard::plain(CardKind::Overview, lines.join("\n"))
    }

    /// Card announcing that a dispatched action failed outright.
    pub fn failure_notice(&self, id: &ContainerId, action: ContainerAction, reason: &str) -> StatusCard {
        let (header, footer) = self.boxart.lines(id.as_str(), self.box_width);
        let body = format!("{header}\n│ ❌ {action} failed\n│ {reason}\n{footer}");
        StatusCard::plain(CardKind::Error, body)
    }

    fn status_card(&self, spec: &ContainerSpec, entry: &CacheEntry, ctx: &RenderContext) -> StatusCard {
        let snapshot = &entry.snapshot;
        let (header, footer) = self.boxart.lines(&spec.name, self.box_width);

        // The displayed timestamp is the fetch time, never the render
        // time: the card must not imply freshness it does not have.
        let mut lines = vec![
            format!("Last update: {}", format_clock(entry.fetched_at, self.tz)),
            header,
        ];

        if snapshot.running {
            lines.push("│ 🟢 Online".to_string());
            if ctx.expanded {
                if snapshot.details_allowed {
                    lines.push(format!("│ CPU: {}", snapshot.cpu));
                    lines.push(format!("│ RAM: {}", snapshot.memory));
                    lines.push(format!(
                        "│ Uptime: {}",
                        snapshot.uptime.as_deref().unwrap_or("N/A")
                    ));
                } else {
                    lines.push("│ ⚠️ Detailed status not allowed.".to_string());
                    lines.push(format!(
                        "│ Uptime: {}",
                        snapshot.uptime.as_deref().unwrap_or("N/A")
                    ));
                }
            }
        } else {
            lines.push("│ 🔴 Offline".to_string());
        }

        lines.push(footer);

        let actions = available_actions(spec, snapshot.running, ctx);
        let toggle_available = snapshot.running && snapshot.details_allowed && ctx.allow_toggle;

        StatusCard {
            kind: CardKind::Status,
            body: lines.join("\n"),
            actions,
            toggle_available,
            running: snapshot.running,
        }
    }

    fn pending_card(&self, name: &str) -> StatusCard {
        let (header, footer) = self.boxart.lines(name, self.box_width);
        let body = format!("{header}\n│ 🟡 Pending\n│ ⏳ Action in progress...\n{footer}");
        StatusCard::plain(CardKind::Pending, body)
    }

    fn loading_card(&self, name: &str) -> StatusCard {
        let (header, footer) = self.boxart.lines(name, self.box_width);
        let body = format!("{header}\n│ 🔄 Refreshing container data...\n{footer}");
        StatusCard::plain(CardKind::Loading, body)
    }

    fn error_card(&self, name: &str, message: &str) -> StatusCard {
        let (header, footer) = self.boxart.lines(name, self.box_width);
        let body = format!("{header}\n│ ⚠️ {message}\n{footer}");
        StatusCard::plain(CardKind::Error, body)
    }
}

/// Control actions the surface may offer for this render.
fn available_actions(spec: &ContainerSpec, running: bool, ctx: &RenderContext) -> Vec<ContainerAction> {
    if !ctx.allow_controls {
        return Vec::new();
    }

    if running {
        // Stop/restart only show on the expanded view.
        if !ctx.expanded {
            return Vec::new();
        }
        [ContainerAction::Stop, ContainerAction::Restart]
            .into_iter()
            .filter(|a| spec.allows(*a))
            .collect()
    } else if spec.allows(ContainerAction::Start) {
        vec![ContainerAction::Start]
    } else {
        Vec::new()
    }
}

/// Bounded memo cache for box header/footer lines, keyed by
/// (name, width). Purely a latency optimization: it may be cleared at
/// any time without affecting output.
struct BoxArtCache {
    inner: Mutex<BoxArtInner>,
}

struct BoxArtInner {
    lines: HashMap<(String, usize), (String, String)>,
    order: VecDeque<(String, usize)>,
}

impl BoxArtCache {
    fn new() -> Self {
        Self {
            inner: Mutex::new(BoxArtInner {
                lines: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    fn lines(&self, name: &str, width: usize) -> (String, String) {
        let key = (name.to_string(), width);
        let mut inner = self.inner.lock().expect("boxart cache lock poisoned");

        if let Some(cached) = inner.lines.get(&key) {
            return cached.clone();
        }

        let computed = build_box_lines(name, width);

        if inner.lines.len() >= BOX_CACHE_CAP {
            for _ in 0..BOX_CACHE_EVICT {
                if let Some(old) = inner.order.pop_front() {
                    inner.lines.remove(&old);
                }
            }
        }
        inner.order.push_back(key.clone());
        inner.lines.insert(key, computed.clone());

        computed
    }
}

fn build_box_lines(name: &str, width: usize) -> (String, String) {
    let width = width.max(12);
    let mut header_text = format!("── {name} ");
    let max_name_len = width - 4;
    if header_text.chars().count() > max_name_len {
        header_text = header_text.chars().take(max_name_len - 1).collect();
        header_text.push_str("… ");
    }
    let padding = width.saturating_sub(1 + header_text.chars().count()).max(1);

    let header = format!("┌{header_text}{}", "─".repeat(padding));
    let footer = format!("└{}", "─".repeat(width - 1));
    (header, footer)
}
