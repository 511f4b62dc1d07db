//! UI element abstraction and the bounded tree crawler.
//!
//! [`UiElement`] is the seam between the crawler and whatever exposes
//! the live widget tree; the shipped implementation talks AT-SPI over
//! `gdbus` ([`atspi`]). Every element operation can fail (the remote
//! tree mutates while we walk it), so traversal counts errors per node
//! and keeps going instead of aborting the scan.

pub mod atspi;
pub mod input;

use crate::knowledge::KnowledgeBase;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum UiError {
    #[error("accessibility bus call failed: {0}")]
    Bus(String),

    #[error("malformed reply: {0}")]
    Parse(String),

    #[error("input injection failed: {0}")]
    Input(String),

    #[error("no application root matching '{0}'")]
    RootNotFound(String),
}

/// On-screen bounding box in root-window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    /// Zero or negative extent, or clearly off-screen.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0 || self.x < 0 || self.y < 0
    }

    /// Fully inside a display of the given resolution.
    pub fn within(&self, display_width: i32, display_height: i32) -> bool {
        !self.is_degenerate()
            && self.x + self.width <= display_width
            && self.y + self.height <= display_height
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// One node of the live accessibility tree.
///
/// Handles are not stable across tree mutations; identity for visited
/// tracking comes from [`identity_key`], never the handle itself.
pub trait UiElement {
    fn role(&self) -> Result<String, UiError>;
    fn name(&self) -> Result<String, UiError>;
    fn bounds(&self) -> Result<Bounds, UiError>;
    fn showing(&self) -> Result<bool, UiError>;
    fn focus(&self) -> Result<(), UiError>;
    fn activate(&self) -> Result<(), UiError>;
    fn children(&self) -> Result<Vec<Box<dyn UiElement>>, UiError>;
}

/// Stable per-node identity: name, role, and position.
pub fn identity_key(name: &str, role: &str, bounds: &Bounds) -> String {
    format!("{}_{}_({},{})", name, role, bounds.x, bounds.y)
}

/// Roles worth interacting with.
const ROLE_ALLOW_LIST: &[&str] = &[
    "push button",
    "button",
    "toggle button",
    "radio button",
    "check box",
    "menu",
    "menu item",
    "check menu item",
    "entry",
    "text",
    "password text",
    "page tab",
    "link",
    "combo box",
    "spin button",
];

pub fn role_is_interactive(role: &str) -> bool {
    ROLE_ALLOW_LIST.contains(&role)
}

/// Traversal bounds. Trees in modern toolkits can be very deep and
/// remote access is slow, so both limits are small and hard.
#[derive(Debug, Clone, Copy)]
pub struct CrawlLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        CrawlLimits {
            max_depth: 3,
            max_nodes: 200,
        }
    }
}

/// An interactive element found by the crawl, scored for selection.
pub struct Candidate {
    pub element: Box<dyn UiElement>,
    pub identity: String,
    pub role: String,
    pub name: String,
    pub bounds: Bounds,
    pub score: f64,
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("identity", &self.identity)
            .field("score", &self.score)
            .finish()
    }
}

/// What the crawl saw, for the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrawlStats {
    pub nodes_visited: usize,
    pub node_errors: usize,
    pub candidates: usize,
}

/// Base score of any allowed candidate.
const BASE_SCORE: f64 = 1.0;

/// Bonus when the element name hits the knowledge base.
const KEYWORD_BONUS: f64 = 10.0;

/// Penalty when the element was already interacted with this session.
const INTERACTED_PENALTY: f64 = 5.0;

/// Breadth-first crawl of the tree under `root`.
///
/// `display` is the known resolution; candidates outside it are stale
/// coordinates from a closed window and are skipped. `already_seen`
/// reports whether an identity was interacted with before, feeding the
/// score penalty.
pub fn crawl(
    root: &dyn UiElement,
    limits: CrawlLimits,
    kb: &KnowledgeBase,
    display: (i32, i32),
    already_seen: &dyn Fn(&str) -> bool,
) -> (Vec<Candidate>, CrawlStats) {
    let mut stats = CrawlStats::default();
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(Box<dyn UiElement>, usize)> = VecDeque::new();

    match root.children() {
        Ok(children) => {
            for child in children {
                queue.push_back((child, 1));
            }
        }
        Err(e) => {
            debug!(error = %e, "root children unavailable");
            stats.node_errors += 1;
            return (candidates, stats);
        }
    }

    while let Some((node, depth)) = queue.pop_front() {
        if stats.nodes_visited >= limits.max_nodes {
            debug!(limit = limits.max_nodes, "node budget exhausted");
            break;
        }
        stats.nodes_visited += 1;

        let (role, name, bounds) = match inspect(node.as_ref()) {
            Ok(fields) => fields,
            Err(e) => {
                trace!(error = %e, "node inspection failed");
                stats.node_errors += 1;
                continue;
            }
        };

        let identity = identity_key(&name, &role, &bounds);
        if !visited.insert(identity.clone()) {
            continue;
        }

        if role_is_interactive(role.as_str())
            && bounds.within(display.0, display.1)
            && node.showing().unwrap_or(false)
        {
            let mut score = BASE_SCORE;
            if kb.matches(&name) {
                score += KEYWORD_BONUS;
            }
            if already_seen(&identity) {
                score -= INTERACTED_PENALTY;
            }
            trace!(%identity, score, "candidate");
            candidates.push(Candidate {
                identity,
                role,
                name,
                bounds,
                score,
                element: node,
            });
            stats.candidates += 1;
            continue;
        }

        if depth < limits.max_depth {
            match node.children() {
                Ok(children) => {
                    for child in children {
                        queue.push_back((child, depth + 1));
                    }
                }
                Err(e) => {
                    trace!(error = %e, "children fetch failed");
                    stats.node_errors += 1;
                }
            }
        }
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).expect("scores are finite"));
    debug!(
        visited = stats.nodes_visited,
        errors = stats.node_errors,
        candidates = candidates.len(),
        "crawl finished"
    );
    (candidates, stats)
}

fn inspect(node: &dyn UiElement) -> Result<(String, String, Bounds), UiError> {
    Ok((node.role()?, node.name()?, node.bounds()?))
}
