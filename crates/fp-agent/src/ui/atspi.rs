//! AT-SPI accessibility bridge over `gdbus`.
//!
//! Widgets are addressed as `(destination, object_path)` pairs on the
//! accessibility session bus. Calls shell out to `gdbus call` and parse
//! the GVariant text replies with anchored regexes; the tree mutates
//! underneath us, so a failed call is an error on that node, never a
//! crash of the crawl.

use super::{input, Bounds, UiElement, UiError};
use regex::Regex;
use std::process::Command;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

const REGISTRY_DEST: &str = "org.a11y.atspi.Registry";
const ROOT_PATH: &str = "/org/a11y/atspi/accessible/root";
const IFACE_ACCESSIBLE: &str = "org.a11y.atspi.Accessible";
const IFACE_COMPONENT: &str = "org.a11y.atspi.Component";

/// `ATSPI_STATE_SHOWING` bit in the first state-set word.
const STATE_SHOWING_BIT: u32 = 25;

/// `ATSPI_COORD_TYPE_SCREEN` for GetExtents.
const COORD_TYPE_SCREEN: &str = "0";

/// How long to keep retrying application-root discovery; targets can
/// take many seconds to register on the accessibility bus.
const ROOT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);
const ROOT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(2);

fn ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\(\s*'([^']+)'\s*,\s*(?:objectpath\s+)?'(/[^']*)'\s*\)")
            .expect("ref regex compiles")
    })
}

fn quoted_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'([^']*)'").expect("quoted regex compiles"))
}

fn integer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+").expect("integer regex compiles"))
}

/// One accessible object on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtspiElement {
    destination: String,
    object_path: String,
}

impl AtspiElement {
    pub fn new(destination: impl Into<String>, object_path: impl Into<String>) -> Self {
        AtspiElement {
            destination: destination.into(),
            object_path: object_path.into(),
        }
    }

    /// The desktop root every application hangs off.
    pub fn registry_root() -> Self {
        AtspiElement::new(REGISTRY_DEST, ROOT_PATH)
    }

    fn call(&self, method: &str, args: &[&str]) -> Result<String, UiError> {
        gdbus_call(&self.destination, &self.object_path, method, args)
    }

    fn accessible(&self, method: &str) -> String {
        format!("{}.{}", IFACE_ACCESSIBLE, method)
    }

    fn component(&self, method: &str) -> String {
        format!("{}.{}", IFACE_COMPONENT, method)
    }

    /// Raw child refs, for callers that need `AtspiElement` rather than
    /// the trait object.
    pub fn child_refs(&self) -> Result<Vec<AtspiElement>, UiError> {
        let raw = self.call(&self.accessible("GetChildren"), &[])?;
        Ok(parse_refs(&raw))
    }
}

impl UiElement for AtspiElement {
    fn role(&self) -> Result<String, UiError> {
        let raw = self.call(&self.accessible("GetRoleName"), &[])?;
        parse_first_quoted(&raw)
            .ok_or_else(|| UiError::Parse(format!("no role in reply: {}", raw.trim())))
    }

    fn name(&self) -> Result<String, UiError> {
        let raw = self.call(&self.accessible("GetName"), &[])?;
        parse_first_quoted(&raw)
            .ok_or_else(|| UiError::Parse(format!("no name in reply: {}", raw.trim())))
    }

    fn bounds(&self) -> Result<Bounds, UiError> {
        let raw = self.call(&self.component("GetExtents"), &[COORD_TYPE_SCREEN])?;
        parse_bounds(&raw)
            .ok_or_else(|| UiError::Parse(format!("no extents in reply: {}", raw.trim())))
    }

    fn showing(&self) -> Result<bool, UiError> {
        let raw = self.call(&self.accessible("GetState"), &[])?;
        let words: Vec<u32> = integer_regex()
            .find_iter(&raw)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        match words.first() {
            Some(word) => Ok(word & (1 << STATE_SHOWING_BIT) != 0),
            None => Err(UiError::Parse(format!("no state in reply: {}", raw.trim()))),
        }
    }

    fn focus(&self) -> Result<(), UiError> {
        let raw = self.call(&self.component("GrabFocus"), &[])?;
        if raw.contains("true") {
            Ok(())
        } else {
            Err(UiError::Bus("GrabFocus refused".to_string()))
        }
    }

    /// Focus-then-confirm, falling back to a synthetic click at the
    /// element centre. Remote focus is not instantaneous, hence the
    /// pause before the activation key.
    fn activate(&self) -> Result<(), UiError> {
        if self.focus().is_ok() {
            std::thread::sleep(Duration::from_millis(300));
            input::press_key("Return")?;
            return Ok(());
        }
        let bounds = self.bounds()?;
        let (x, y) = bounds.center();
        trace!(x, y, "activation falling back to click");
        input::click_at(x, y)
    }

    fn children(&self) -> Result<Vec<Box<dyn UiElement>>, UiError> {
        Ok(self
            .child_refs()?
            .into_iter()
            .map(|child| Box::new(child) as Box<dyn UiElement>)
            .collect())
    }
}

/// Find the target application's root by substring match over the
/// registry root's children, retrying while the target registers.
///
/// `needles` are matched lower-cased against each application's
/// accessible name (binary name, package name, window title stem).
pub fn find_app_root(needles: &[String]) -> Result<AtspiElement, UiError> {
    let lowered: Vec<String> = needles.iter().map(|n| n.to_lowercase()).collect();
    let root = AtspiElement::registry_root();
    let deadline = Instant::now() + ROOT_DISCOVERY_TIMEOUT;

    loop {
        match root.child_refs() {
            Ok(apps) => {
                for app in apps {
                    let name = match app.name() {
                        Ok(name) => name.to_lowercase(),
                        Err(_) => continue,
                    };
                    if lowered.iter().any(|needle| name.contains(needle.as_str())) {
                        debug!(app = %name, "application root found");
                        return Ok(app);
                    }
                }
            }
            Err(e) => warn!(error = %e, "registry enumeration failed"),
        }
        if Instant::now() >= deadline {
            return Err(UiError::RootNotFound(needles.join(", ")));
        }
        std::thread::sleep(ROOT_DISCOVERY_INTERVAL);
    }
}

/// Roles that mark a transient window worth crawling first.
const TRANSIENT_ROLES: &[&str] = &["dialog", "alert", "file chooser"];

/// The currently-showing modal/transient child of the application, if
/// any. Crawling from here avoids spending the scan budget on content
/// hidden behind the dialog.
pub fn find_transient(app_root: &AtspiElement) -> Option<AtspiElement> {
    let windows = app_root.child_refs().ok()?;
    for window in windows {
        let role = match window.role() {
            Ok(role) => role,
            Err(_) => continue,
        };
        if TRANSIENT_ROLES.contains(&role.as_str()) && window.showing().unwrap_or(false) {
            debug!(%role, "transient window active");
            return Some(window);
        }
    }
    None
}

fn gdbus_call(
    destination: &str,
    object_path: &str,
    method: &str,
    method_args: &[&str],
) -> Result<String, UiError> {
    let mut args = vec![
        "call",
        "--session",
        "--dest",
        destination,
        "--object-path",
        object_path,
        "--method",
        method,
    ];
    args.extend_from_slice(method_args);

    let output = Command::new("gdbus")
        .args(&args)
        .output()
        .map_err(|e| UiError::Bus(format!("gdbus spawn: {}", e)))?;
    if !output.status.success() {
        return Err(UiError::Bus(format!(
            "{} on {} failed: {}",
            method,
            object_path,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn parse_refs(raw: &str) -> Vec<AtspiElement> {
    ref_regex()
        .captures_iter(raw)
        .filter_map(|caps| {
            let destination = caps.get(1)?.as_str();
            let object_path = caps.get(2)?.as_str();
            // The null object marks a missing child
            if object_path.ends_with("/null") {
                return None;
            }
            Some(AtspiElement::new(destination, object_path))
        })
        .collect()
}

fn parse_first_quoted(raw: &str) -> Option<String> {
    quoted_regex()
        .captures(raw)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
}

fn parse_bounds(raw: &str) -> Option<Bounds> {
    let values: Vec<i32> = integer_regex()
        .find_iter(raw)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    if values.len() < 4 {
        return None;
    }
    Some(Bounds {
        x: values[0],
        y: values[1],
        width: values[2],
        height: values[3],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_refs() {
        let raw = "([(':1.23', objectpath '/org/a11y/atspi/accessible/5'), \
                    (':1.24', '/org/a11y/atspi/accessible/6')],)";
        let refs = parse_refs(raw);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0], AtspiElement::new(":1.23", "/org/a11y/atspi/accessible/5"));
        assert_eq!(refs[1].object_path, "/org/a11y/atspi/accessible/6");
    }

    #[test]
    fn test_parse_refs_skips_null_object() {
        let raw = "([(':1.23', objectpath '/org/a11y/atspi/null')],)";
        assert!(parse_refs(raw).is_empty());
    }

    #[test]
    fn test_parse_first_quoted() {
        assert_eq!(parse_first_quoted("('push button',)").as_deref(), Some("push button"));
        assert_eq!(parse_first_quoted("(42,)"), None);
    }

    #[test]
    fn test_parse_bounds() {
        let bounds = parse_bounds("((10, 20, 300, 40),)").expect("bounds");
        assert_eq!(bounds, Bounds { x: 10, y: 20, width: 300, height: 40 });
        assert!(parse_bounds("((1, 2),)").is_none());
    }

    #[test]
    fn test_showing_bit() {
        // Word with only the SHOWING bit set
        let word = 1u32 << STATE_SHOWING_BIT;
        assert_ne!(word & (1 << STATE_SHOWING_BIT), 0);
    }
}
