//! Raw input injection via `xdotool`.
//!
//! The last-resort path when the accessibility tree cannot express an
//! interaction: synthetic key presses, typed text, and pointer clicks
//! against whatever window currently has focus on `$DISPLAY`.

use super::UiError;
use std::process::Command;
use tracing::trace;

/// Delay between typed characters; instant typing outruns some
/// toolkits' input handling.
const TYPE_DELAY_MS: u32 = 50;

fn xdotool(args: &[&str]) -> Result<String, UiError> {
    trace!(?args, "xdotool");
    let output = Command::new("xdotool")
        .args(args)
        .output()
        .map_err(|e| UiError::Input(format!("xdotool spawn: {}", e)))?;
    if !output.status.success() {
        return Err(UiError::Input(format!(
            "xdotool {} failed: {}",
            args.first().unwrap_or(&"?"),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Press a single key or a `+`-joined combo (`Return`, `ctrl+s`).
pub fn press_key(key: &str) -> Result<(), UiError> {
    xdotool(&["key", key]).map(|_| ())
}

/// Type literal text into the focused widget.
pub fn type_text(text: &str) -> Result<(), UiError> {
    let delay = TYPE_DELAY_MS.to_string();
    xdotool(&["type", "--delay", &delay, "--", text]).map(|_| ())
}

/// Move the pointer and left-click.
pub fn click_at(x: i32, y: i32) -> Result<(), UiError> {
    let (x, y) = (x.to_string(), y.to_string());
    xdotool(&["mousemove", &x, &y, "click", "1"]).map(|_| ())
}

/// Title of the currently active window; empty when no window has
/// focus yet.
pub fn active_window_title() -> String {
    xdotool(&["getactivewindow", "getwindowname"])
        .map(|out| out.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Real injection needs a display; these cover the failure path.

    #[test]
    fn test_press_key_without_display_fails_cleanly() {
        // Force xdotool (if installed) to fail, or exercise the spawn
        // error if it is not
        std::env::set_var("DISPLAY", ":254");
        let result = press_key("Return");
        if let Err(e) = result {
            assert!(matches!(e, UiError::Input(_)));
        }
    }

    #[test]
    fn test_active_window_title_never_panics() {
        std::env::set_var("DISPLAY", ":254");
        let _ = active_window_title();
    }
}
