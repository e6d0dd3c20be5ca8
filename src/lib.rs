//! # routeload
//!
//! Loads route-scoped view, logic and style resources, compiles them through
//! a pluggable compiler and caches the result in an LRU cache with TTL and
//! weight limits. Concurrent loads of the same route share one fetch and one
//! compile.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use routeload::fetch::HttpFetcher;
//! use routeload::loader::{CompileError, CompiledRoute, Loader, LoaderConfig, RouteSources};
//! use routeload::navigation::{Location, RouteController, View};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LoaderConfig::from_path("routeload.json")?;
//!     let loader = Loader::builder(config)
//!         .fetcher(HttpFetcher::new("127.0.0.1:8080"))
//!         .compiler(|src: RouteSources| async move {
//!             Ok::<_, CompileError>(CompiledRoute {
//!                 composed: format!("{}\n{}", src.logic, src.view),
//!                 view: src.view,
//!                 logic: src.logic,
//!             })
//!         })
//!         .build()?;
//!
//!     let controller = RouteController::new(loader);
//!     let (view, _prefetch) = controller.start(&Location::new("/", "#todo")).await;
//!     if let View::Unit(unit) = view {
//!         println!("{}", unit.composed);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod fetch;
pub mod http;
pub mod inflight;
pub mod loader;
pub mod navigation;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheOptions, CacheStore, LruCache};
pub use fetch::{FetchError, FetchedText, Fetcher, HttpFetcher};
pub use loader::{LoadError, Loader, LoaderConfig, RouteUnit};
pub use navigation::{Location, Navigator, RouteController, View};
