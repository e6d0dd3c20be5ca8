//! Route navigation. Maps a location to a route name and back.
//!
//! Two addressing modes are supported, fixed when the [`Navigator`] is built:
//!
//! | Mode   | Location             | Route   |
//! |--------|----------------------|---------|
//! | `hash` | `#todo`              | `todo`  |
//! | `path` | `/app/todo` (base `/app`) | `todo` |
//!
//! Route names are sanitized: lowercased, and only `[a-z0-9_-]` is accepted.
//! Anything else resolves to the configured default route.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod controller;

pub use controller::{RouteController, View};

/// Lowercases `input` and returns it if it consists solely of ASCII
/// alphanumerics, `-` and `_`; otherwise returns an empty string.
///
/// # Examples
///
/// ```
/// use routeload::navigation::sanitize;
///
/// assert_eq!(sanitize("Todo_List-2"), "todo_list-2");
/// assert_eq!(sanitize("../etc"), "");
/// assert_eq!(sanitize(""), "");
/// ```
pub fn sanitize(input: &str) -> String {
    let lowered = input.to_lowercase();
    let valid = !lowered.is_empty()
        && lowered
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
    if valid { lowered } else { String::new() }
}

/// How routes are encoded in the location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterMode {
    /// Route lives in the fragment: `#todo`.
    #[default]
    Hash,
    /// Route is the path segment after `base_path`: `/app/todo`.
    Path,
}

impl fmt::Display for RouterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hash => "hash",
            Self::Path => "path",
        })
    }
}

/// Navigation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub mode: RouterMode,
    /// Path prefix stripped in [`RouterMode::Path`]; ignored in hash mode.
    pub base_path: String,
    /// Whether clicks on `data-route` links are turned into navigations.
    pub intercept_links: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mode: RouterMode::Hash,
            base_path: String::new(),
            intercept_links: true,
        }
    }
}

/// The parts of a browser location the router reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub pathname: String,
    /// Fragment including the leading `#`, or empty.
    pub hash: String,
}

impl Location {
    pub fn new(pathname: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            hash: hash.into(),
        }
    }
}

/// The event a host environment should dispatch after a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    /// The fragment changed (hash mode).
    HashChange { route: String },
    /// A history entry was pushed (path mode).
    PopState { route: String },
}

impl NavigationEvent {
    pub fn route(&self) -> &str {
        match self {
            Self::HashChange { route } | Self::PopState { route } => route,
        }
    }
}

/// Translates between locations and route names.
#[derive(Debug, Clone)]
pub struct Navigator {
    config: RouterConfig,
    default_route: String,
}

impl Navigator {
    pub fn new(config: RouterConfig, default_route: impl Into<String>) -> Self {
        Self {
            config,
            default_route: default_route.into(),
        }
    }

    pub fn mode(&self) -> RouterMode {
        self.config.mode
    }

    pub fn default_route(&self) -> &str {
        &self.default_route
    }

    /// The route named by `location`, or the default route.
    ///
    /// In path mode the base path and leading slashes are stripped, and a
    /// single trailing slash is ignored so `/app/todo/` reads as `todo`.
    pub fn current_route(&self, location: &Location) -> String {
        let raw = match self.config.mode {
            RouterMode::Path => {
                let path = location.pathname.as_str();
                let base = self.config.base_path.as_str();
                let path = if !base.is_empty() {
                    path.strip_prefix(base).unwrap_or(path)
                } else {
                    path
                };
                let path = path.trim_start_matches('/');
                path.strip_suffix('/').unwrap_or(path)
            }
            RouterMode::Hash => location
                .hash
                .strip_prefix('#')
                .unwrap_or(&location.hash),
        };

        match sanitize(raw) {
            route if route.is_empty() => self.default_route.clone(),
            route => route,
        }
    }

    /// The location string that addresses `route` (`#todo` or `/app/todo`).
    pub fn href(&self, route: &str) -> String {
        let route = match sanitize(route) {
            r if r.is_empty() => self.default_route.clone(),
            r => r,
        };
        match self.config.mode {
            RouterMode::Hash => format!("#{route}"),
            RouterMode::Path => {
                format!("{}/{route}", self.config.base_path.trim_end_matches('/'))
            }
        }
    }

    /// Points `location` at `route`.
    ///
    /// Returns the event to dispatch, or `None` when `location` already
    /// addresses that route, so repeated navigation never fires twice.
    pub fn navigate(&self, location: &mut Location, route: &str) -> Option<NavigationEvent> {
        let next = self.href(route);
        let slot = match self.config.mode {
            RouterMode::Hash => &mut location.hash,
            RouterMode::Path => &mut location.pathname,
        };
        if *slot == next {
            debug!(location = %next, "already at target; no navigation");
            return None;
        }
        *slot = next;

        let route = self.current_route(location);
        debug!(route = %route, mode = %self.config.mode, "navigated");
        Some(match self.config.mode {
            RouterMode::Hash => NavigationEvent::HashChange { route },
            RouterMode::Path => NavigationEvent::PopState { route },
        })
    }

    /// Handles a click on a link carrying `data-route`.
    ///
    /// Returns `None` without touching `location` when link interception is
    /// disabled.
    pub fn follow_link(
        &self,
        location: &mut Location,
        data_route: Option<&str>,
    ) -> Option<NavigationEvent> {
        if !self.config.intercept_links {
            return None;
        }
        self.navigate(location, data_route.unwrap_or(""))
    }
}
