//! The action catalog.
//!
//! Each action turns an abstract policy choice into concrete input
//! against the target, and reports its *own* success or failure; when
//! an action has a fallback (crawl-and-activate degrading to a random
//! click) the fallback still runs but never rescues the report, since
//! the penalty must reflect what the policy actually asked for.

use crate::knowledge::KnowledgeBase;
use crate::policy::ExplorationState;
use crate::ui::atspi::{self, AtspiElement};
use crate::ui::{crawl, input, Candidate, CrawlLimits, UiElement};
use fp_config::HotkeyAction;
use rand::prelude::IndexedRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Fixed catalog names, in prior order.
pub const FIXED_ACTIONS: &[&str] = &[
    "dialog_handler",
    "menu_exploration",
    "ui_crawl",
    "ui_input",
    "nav_tab",
    "nav_escape",
    "random_click",
];

/// Text payloads typed into entries. The odd ones probe how the target
/// persists hostile-looking input.
const INPUT_PAYLOADS: &[&str] = &[
    "test",
    "admin",
    "1234",
    "file:///etc/passwd",
    "javascript:alert(1)",
];

/// Button names that accept/confirm a dialog.
const POSITIVE_BUTTON_WORDS: &[&str] =
    &["ok", "yes", "save", "open", "accept", "apply", "continue", "allow"];

/// Hotkeys that typically raise a dialog needing confirmation.
const DIALOG_RAISING_WORDS: &[&str] = &["save", "print", "delete", "export", "clear"];

/// Pause between the two confirmation presses after a hotkey.
const HOTKEY_CONFIRM_GAP: Duration = Duration::from_millis(700);

/// Everything an action needs to run.
pub struct ActionContext<'a> {
    pub app_root: &'a AtspiElement,
    pub kb: &'a KnowledgeBase,
    pub display: (i32, i32),
    pub limits: CrawlLimits,
    pub hotkeys: &'a BTreeMap<String, HotkeyAction>,
}

/// Full catalog for this session: fixed actions plus the profile's
/// named hotkeys.
pub fn catalog(hotkeys: &BTreeMap<String, HotkeyAction>) -> Vec<String> {
    let mut names: Vec<String> = FIXED_ACTIONS.iter().map(|n| n.to_string()).collect();
    names.extend(hotkeys.keys().cloned());
    names
}

/// Execute one action by name. Returns the action's own success.
pub fn execute<R: Rng + ?Sized>(
    action: &str,
    ctx: &ActionContext<'_>,
    policy: &mut ExplorationState,
    rng: &mut R,
) -> bool {
    let outcome = match action {
        "dialog_handler" => dialog_handler(ctx, rng),
        "menu_exploration" => menu_exploration(ctx, policy, rng),
        "ui_crawl" => ui_crawl(ctx, policy, rng),
        "ui_input" => ui_input(ctx, policy, rng),
        "nav_tab" => nav_tab(rng),
        "nav_escape" => input::press_key("Escape").is_ok(),
        "random_click" => random_click(ctx, rng),
        name => match ctx.hotkeys.get(name) {
            Some(hotkey) => run_hotkey(name, hotkey),
            None => {
                warn!(action = name, "unknown action");
                false
            }
        },
    };
    debug!(action, success = outcome, "action executed");
    outcome
}

/// Crawl from the transient window when one is up, otherwise the app
/// root, so a modal never hides the interesting widgets.
fn crawl_candidates(ctx: &ActionContext<'_>, policy: &ExplorationState) -> Vec<Candidate> {
    let start = atspi::find_transient(ctx.app_root);
    let root: &dyn UiElement = match &start {
        Some(transient) => transient,
        None => ctx.app_root,
    };
    let seen = |identity: &str| policy.already_interacted(identity);
    let (candidates, _) = crawl(root, ctx.limits, ctx.kb, ctx.display, &seen);
    candidates
}

/// Activate the best-scored element; on failure fall back to a random
/// click but still report the crawl's own failure.
fn ui_crawl<R: Rng + ?Sized>(
    ctx: &ActionContext<'_>,
    policy: &mut ExplorationState,
    rng: &mut R,
) -> bool {
    let candidates = crawl_candidates(ctx, policy);
    let Some(best) = candidates.first() else {
        trace!("no candidates, falling back to random click");
        let _ = random_click(ctx, rng);
        return false;
    };
    policy.mark_interacted(&best.identity);
    match best.element.activate() {
        Ok(()) => {
            info!(element = %best.identity, score = best.score, "element activated");
            true
        }
        Err(e) => {
            debug!(element = %best.identity, error = %e, "activation failed");
            let _ = random_click(ctx, rng);
            false
        }
    }
}

/// Focus a text entry and type a payload.
fn ui_input<R: Rng + ?Sized>(
    ctx: &ActionContext<'_>,
    policy: &mut ExplorationState,
    rng: &mut R,
) -> bool {
    let candidates = crawl_candidates(ctx, policy);
    let Some(entry) = candidates.iter().find(|c| is_text_role(&c.role)) else {
        return false;
    };
    policy.mark_interacted(&entry.identity);
    if entry.element.focus().is_err() {
        let (x, y) = entry.bounds.center();
        if input::click_at(x, y).is_err() {
            return false;
        }
    }
    let payload = INPUT_PAYLOADS.choose(rng).expect("payloads are non-empty");
    trace!(payload = %payload, field = %entry.identity, "typing payload");
    input::type_text(payload).is_ok()
}

fn is_text_role(role: &str) -> bool {
    matches!(role, "entry" | "text" | "password text")
}

/// Open a menu and descend a few random items.
fn menu_exploration<R: Rng + ?Sized>(
    ctx: &ActionContext<'_>,
    policy: &mut ExplorationState,
    rng: &mut R,
) -> bool {
    let candidates = crawl_candidates(ctx, policy);
    let menus: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.role == "menu" || c.role == "menu item")
        .collect();
    let Some(menu) = menus.choose(rng) else {
        return false;
    };
    policy.mark_interacted(&menu.identity);
    if menu.element.activate().is_err() {
        return false;
    }
    // Walk down a random distance before committing
    let depth = rng.random_range(1..=3);
    for _ in 0..depth {
        std::thread::sleep(Duration::from_millis(200));
        if input::press_key("Down").is_err() {
            return false;
        }
    }
    input::press_key("Return").is_ok()
}

/// Detect and resolve a modal dialog: fill any text field, press the
/// first positively-worded button, else Enter.
fn dialog_handler<R: Rng + ?Sized>(ctx: &ActionContext<'_>, rng: &mut R) -> bool {
    let Some(dialog) = atspi::find_transient(ctx.app_root) else {
        return false;
    };
    let seen = |_: &str| false;
    let (candidates, _) = crawl(&dialog, ctx.limits, ctx.kb, ctx.display, &seen);

    if let Some(entry) = candidates.iter().find(|c| is_text_role(&c.role)) {
        if entry.element.focus().is_ok() {
            let payload = INPUT_PAYLOADS.choose(rng).expect("payloads are non-empty");
            let _ = input::type_text(payload);
        }
    }

    let positive = candidates.iter().find(|c| {
        let lowered = c.name.to_lowercase();
        c.role.contains("button")
            && POSITIVE_BUTTON_WORDS
                .iter()
                .any(|word| lowered.contains(word))
    });
    match positive {
        Some(button) => {
            info!(button = %button.name, "resolving dialog");
            let _ = button.element.activate();
        }
        None => {
            let _ = input::press_key("Return");
        }
    }
    true
}

fn nav_tab<R: Rng + ?Sized>(rng: &mut R) -> bool {
    let key = ["Tab", "Down", "Right"].choose(rng).expect("non-empty");
    input::press_key(key).is_ok()
}

/// Unfocused click somewhere plausible; margins keep it off window
/// decorations.
fn random_click<R: Rng + ?Sized>(ctx: &ActionContext<'_>, rng: &mut R) -> bool {
    let (width, height) = ctx.display;
    let x = rng.random_range(50..width.max(51) - 50);
    let y = rng.random_range(50..height.max(51) - 50);
    input::click_at(x, y).is_ok()
}

/// Inject a named hotkey; dialog-raising combos get two spaced Enter
/// presses to accept whatever came up.
fn run_hotkey(name: &str, hotkey: &HotkeyAction) -> bool {
    let combo = hotkey.combo();
    if input::press_key(&combo).is_err() {
        return false;
    }
    let text = format!("{} {}", name, hotkey.description()).to_lowercase();
    if DIALOG_RAISING_WORDS.iter().any(|w| text.contains(w)) {
        std::thread::sleep(HOTKEY_CONFIRM_GAP);
        let _ = input::press_key("Return");
        std::thread::sleep(HOTKEY_CONFIRM_GAP);
        let _ = input::press_key("Return");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_includes_hotkeys() {
        let mut hotkeys = BTreeMap::new();
        hotkeys.insert(
            "hotkey_save".to_string(),
            HotkeyAction(
                vec!["ctrl".to_string(), "s".to_string()],
                "save document".to_string(),
            ),
        );
        let names = catalog(&hotkeys);
        assert!(names.contains(&"dialog_handler".to_string()));
        assert!(names.contains(&"hotkey_save".to_string()));
        assert_eq!(names.len(), FIXED_ACTIONS.len() + 1);
    }

    #[test]
    fn test_text_roles() {
        assert!(is_text_role("entry"));
        assert!(is_text_role("password text"));
        assert!(!is_text_role("push button"));
    }

    #[test]
    fn test_positive_words_cover_common_dialogs() {
        for name in ["OK", "Save", "Yes", "Open"] {
            let lowered = name.to_lowercase();
            assert!(POSITIVE_BUTTON_WORDS.iter().any(|w| lowered.contains(w)));
        }
        assert!(!POSITIVE_BUTTON_WORDS.iter().any(|w| "cancel".contains(w)));
    }

    #[test]
    fn test_dialog_raising_detection() {
        let text = "hotkey_print print current page".to_lowercase();
        assert!(DIALOG_RAISING_WORDS.iter().any(|w| text.contains(w)));
        let text = "hotkey_zoom zoom in".to_lowercase();
        assert!(!DIALOG_RAISING_WORDS.iter().any(|w| text.contains(w)));
    }
}
