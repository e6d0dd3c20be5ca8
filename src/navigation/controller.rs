//! Ties navigation to loading: resolve the location, load the route, hand
//! back something to render.

use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{Location, NavigationEvent, Navigator};
use crate::loader::{Loader, SharedUnit};

/// What the host should render for a location.
#[derive(Debug, Clone)]
pub enum View<A> {
    /// The route loaded.
    Unit(SharedUnit<A>),
    /// The route failed to load; render an error notice instead.
    Fallback { route: String, message: String },
}

impl<A> View<A> {
    pub fn route(&self) -> &str {
        match self {
            Self::Unit(unit) => &unit.route,
            Self::Fallback { route, .. } => route,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Renders routes for a host environment.
#[derive(Debug, Clone)]
pub struct RouteController<A> {
    loader: Loader<A>,
    navigator: Navigator,
}

impl<A: Send + Sync + 'static> RouteController<A> {
    /// Builds a controller whose navigator follows the loader's router
    /// settings and default route.
    pub fn new(loader: Loader<A>) -> Self {
        let config = loader.config();
        let navigator = Navigator::new(config.router.clone(), config.default_route.clone());
        Self { loader, navigator }
    }

    pub fn loader(&self) -> &Loader<A> {
        &self.loader
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// Loads the route `location` addresses. Load failures become
    /// [`View::Fallback`] and are logged; they never propagate.
    pub async fn render(&self, location: &Location) -> View<A> {
        let route = self.navigator.current_route(location);
        match self.loader.load_route(&route).await {
            Ok(unit) => {
                debug!(route = %route, "rendering route");
                View::Unit(unit)
            }
            Err(e) => {
                error!(route = %route, error = %e, "route failed to load");
                View::Fallback {
                    route,
                    message: e.to_string(),
                }
            }
        }
    }

    /// Moves `location` to `route` and renders it.
    ///
    /// Returns `None` when `location` already addresses the route.
    pub async fn navigate(&self, location: &mut Location, route: &str) -> Option<View<A>> {
        self.dispatch(location, |nav, loc| nav.navigate(loc, route))
            .await
    }

    /// Handles a click on a `data-route` link.
    pub async fn follow_link(
        &self,
        location: &mut Location,
        data_route: Option<&str>,
    ) -> Option<View<A>> {
        self.dispatch(location, |nav, loc| nav.follow_link(loc, data_route))
            .await
    }

    /// Renders the initial location and, when routes are configured for
    /// prefetching, starts loading them in the background.
    pub async fn start(&self, location: &Location) -> (View<A>, Option<JoinHandle<()>>) {
        let view = self.render(location).await;

        let routes = self.loader.config().prefetch_routes.clone();
        let prefetch = (!routes.is_empty()).then(|| {
            let loader = self.loader.clone();
            debug!(count = routes.len(), "scheduling route prefetch");
            tokio::spawn(async move { loader.prefetch_all(routes).await })
        });

        (view, prefetch)
    }

    async fn dispatch<F>(&self, location: &mut Location, step: F) -> Option<View<A>>
    where
        F: FnOnce(&Navigator, &mut Location) -> Option<NavigationEvent>,
    {
        let event = step(&self.navigator, location)?;
        debug!(route = event.route(), "navigation event");
        Some(self.render(location).await)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::fetch::{FetchError, FetchedText};
    use crate::http::StatusCode;
    use crate::loader::{CompileError, CompiledRoute, LoaderConfig, RouteSources};
    use crate::navigation::{RouterConfig, RouterMode};

    // Serves every resource except those of the "broken" route.
    fn controller(config: LoaderConfig, fetches: Arc<AtomicU32>) -> RouteController<String> {
        let loader = Loader::builder(config)
            .fetcher(move |resource: String| {
                fetches.fetch_add(1, Ordering::SeqCst);
                async move {
                    if resource.contains("/broken.") {
                        return Err(FetchError::Status {
                            resource,
                            status: StatusCode::NOT_FOUND,
                        });
                    }
                    Ok(FetchedText::new(resource, "\"e\""))
                }
            })
            .compiler(|src: RouteSources| async move {
                Ok::<_, CompileError>(CompiledRoute {
                    composed: src.route.clone(),
                    view: src.view,
                    logic: src.logic,
                })
            })
            .build()
            .unwrap();
        RouteController::new(loader)
    }

    #[tokio::test(start_paused = true)]
    async fn renders_route_from_hash() {
        let ctl = controller(LoaderConfig::default(), Arc::default());
        let view = ctl.render(&Location::new("/", "#Todo")).await;
        match view {
            View::Unit(unit) => assert_eq!(unit.composed, "todo"),
            other => panic!("expected unit, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_location_renders_default_route() {
        let ctl = controller(LoaderConfig::default(), Arc::default());
        let view = ctl.render(&Location::default()).await;
        assert_eq!(view.route(), "index");
        assert!(!view.is_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn load_failure_renders_fallback() {
        let ctl = controller(LoaderConfig::default(), Arc::default());
        let view = ctl.render(&Location::new("/", "#broken")).await;
        match view {
            View::Fallback { route, message } => {
                assert_eq!(route, "broken");
                assert!(message.contains("broken"));
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn navigate_renders_once_per_change() {
        let fetches = Arc::new(AtomicU32::new(0));
        let ctl = controller(LoaderConfig::default(), fetches.clone());
        let mut loc = Location::default();

        let view = ctl.navigate(&mut loc, "about").await.unwrap();
        assert_eq!(view.route(), "about");
        assert_eq!(loc.hash, "#about");
        assert_eq!(fetches.load(Ordering::SeqCst), 3);

        assert!(ctl.navigate(&mut loc, "about").await.is_none());
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn path_mode_follows_links() {
        let mut config = LoaderConfig::default();
        config.router = RouterConfig {
            mode: RouterMode::Path,
            base_path: "/app".to_owned(),
            intercept_links: true,
        };
        let ctl = controller(config, Arc::default());
        let mut loc = Location::new("/app/index", "");

        let view = ctl.follow_link(&mut loc, Some("todo")).await.unwrap();
        assert_eq!(view.route(), "todo");
        assert_eq!(loc.pathname, "/app/todo");
    }

    #[tokio::test(start_paused = true)]
    async fn start_prefetches_configured_routes() {
        let fetches = Arc::new(AtomicU32::new(0));
        let mut config = LoaderConfig::default();
        config.prefetch_routes = vec!["about".to_owned(), "Todo".to_owned()];
        let ctl = controller(config, fetches.clone());

        let (view, prefetch) = ctl.start(&Location::new("/", "#index")).await;
        assert_eq!(view.route(), "index");
        assert_eq!(fetches.load(Ordering::SeqCst), 3);

        prefetch.unwrap().await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 9);
        assert_eq!(ctl.loader().stats().size, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn start_without_prefetch_routes_spawns_nothing() {
        let ctl = controller(LoaderConfig::default(), Arc::default());
        let (_, prefetch) = ctl.start(&Location::default()).await;
        assert!(prefetch.is_none());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ctl.loader().stats().size, Some(1));
    }
}
