/*!
 * Steadfast CLI Style System
 *
 * Tables, icons and themed text for the human-readable CLI output.
 */

use crate::authority::StatusReport;
use crate::liveness::{AgentHealth, AgentReport};
use crate::notify::format_secs;
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};
use steadfast_core_lock::{Capability, LockSummary, ProtectionLevel};

// ============================================================================
// THEME COLORS
// ============================================================================

pub struct Theme;

impl Theme {
    /// Primary accent color (cyan)
    pub fn primary<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan()
    }

    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red()
    }

    /// Muted/secondary text (dim)
    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }

    /// Header style (bold cyan)
    pub fn header<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan().bold()
    }
}

// ============================================================================
// ICONS
// ============================================================================

pub struct Icons;

impl Icons {
    pub const SUCCESS: &'static str = "✓";
    pub const ERROR: &'static str = "✗";
    pub const WARNING: &'static str = "⚠";
    pub const INFO: &'static str = "ℹ";
    pub const LOCK: &'static str = "🔒";
    pub const UNLOCK: &'static str = "🔓";
    pub const SHIELD: &'static str = "🛡";
    pub const ARROW_RIGHT: &'static str = "→";
}

// ============================================================================
// TABLES
// ============================================================================

/// Create a styled data table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Create a minimal table (no outer borders)
pub fn create_minimal_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_NO_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header_cell(text: &str) -> Cell {
    Cell::new(text).fg(Color::Cyan).add_attribute(Attribute::Bold)
}

/// One-line description of the lock
pub fn describe_lock(lock: &LockSummary) -> String {
    if !lock.is_locked {
        return format!("{} unlocked", Icons::UNLOCK);
    }
    match lock.remaining_secs {
        Some(secs) if secs > 0 => {
            format!("{} {} ({} left)", Icons::LOCK, lock.lock_type, format_secs(secs))
        }
        Some(_) => format!("{} {} (ready to unlock)", Icons::LOCK, lock.lock_type),
        None => format!("{} {}", Icons::LOCK, lock.lock_type),
    }
}

/// Key-value summary of the authority state
pub fn status_table(status: &StatusReport) -> Table {
    let mut table = create_minimal_table();
    let blocking = if status.is_blocking {
        Cell::new(format!("{} on", Icons::SUCCESS)).fg(Color::Green)
    } else {
        Cell::new(format!("{} off", Icons::WARNING)).fg(Color::Yellow)
    };
    let version = status
        .version
        .map_or_else(|| "unpublished".to_string(), |v| v.to_string());
    let exceptions = status
        .url_exceptions
        .iter()
        .map(|e| format!("{} {}", e.domain, e.allowed_paths.join(" ")))
        .collect::<Vec<_>>();

    let rows = vec![
        ("Blocking", blocking),
        ("Lock", Cell::new(describe_lock(&status.lock))),
        (
            "Protection",
            Cell::new(format!("{} {}", Icons::SHIELD, status.protection_level)),
        ),
        ("Domains", Cell::new(list_or_none(&status.blocked_domains))),
        ("Apps", Cell::new(list_or_none(&status.blocked_apps))),
        ("Exceptions", Cell::new(list_or_none(&exceptions))),
        ("Agents", Cell::new(status.agents.len())),
        ("Version", Cell::new(version)),
        ("Authority", Cell::new(format!("pid {}", status.authority_pid))),
    ];
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key).fg(Color::Cyan), value]);
    }
    table
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join("\n")
    }
}

/// Enforcement agents and their health
pub fn agents_table(agents: &[AgentReport]) -> Table {
    let mut table = create_table();
    table.set_header(vec![
        header_cell("Agent"),
        header_cell("Profile"),
        header_cell("Seq"),
        header_cell("Epoch"),
        header_cell("Last seen"),
        header_cell("Windows"),
        header_cell("Private"),
        header_cell("Health"),
    ]);

    for agent in agents {
        let health = match agent.health {
            AgentHealth::Alive => Cell::new(format!("{} alive", Icons::SUCCESS)).fg(Color::Green),
            AgentHealth::Stale => Cell::new(format!("{} stale", Icons::ERROR)).fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(&agent.agent_kind),
            Cell::new(&agent.profile_id).fg(Color::DarkGrey),
            Cell::new(agent.sequence),
            Cell::new(agent.epoch),
            Cell::new(format!("{} ago", format_secs(agent.age_secs))),
            Cell::new(agent.window_count),
            Cell::new(if agent.incognito_allowed { "yes" } else { "no" }),
            health,
        ]);
    }
    table
}

/// Which anti-tamper capabilities a level enables
pub fn capability_table(level: ProtectionLevel) -> Table {
    let mut table = create_table();
    table.set_header(vec![
        header_cell("Capability"),
        header_cell("Status"),
        header_cell("Minimum level"),
    ]);

    for capability in Capability::ALL {
        let status = if level.enables(capability) {
            Cell::new(format!("{} Enabled", Icons::SUCCESS)).fg(Color::Green)
        } else {
            Cell::new(format!("{} Disabled", Icons::ERROR)).fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(format!("{:?}", capability)),
            status,
            Cell::new(capability.min_level()).fg(Color::DarkGrey),
        ]);
    }
    table
}

// ============================================================================
// MESSAGES
// ============================================================================

pub fn print_error(message: &str, suggestion: Option<&str>) {
    eprintln!("{} {}", Theme::error(format!("{} Error:", Icons::ERROR)), message);
    if let Some(hint) = suggestion {
        eprintln!("  {} {}", Theme::muted(Icons::ARROW_RIGHT), Theme::muted(hint));
    }
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", Theme::warning(Icons::WARNING), Theme::warning(message));
}

pub fn print_success(message: &str) {
    println!("{} {}", Theme::success(Icons::SUCCESS), Theme::success(message));
}

pub fn print_info(message: &str) {
    println!("{} {}", Theme::primary(Icons::INFO), message);
}
