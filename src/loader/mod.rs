//! Route load orchestration.
//!
//! [`Loader::load_route`] turns a route name into a cached, compiled
//! [`RouteUnit`]:
//!
//! 1. Derive the three resource identifiers (view, logic, style).
//! 2. Join the in-flight load for `(route, version)` if one is running.
//! 3. Otherwise fetch the three resources concurrently. View and logic get
//!    two attempts each and their failure fails the load; style gets one
//!    attempt and falls back to an empty stylesheet.
//! 4. Derive the cache key from the version label and, in ETag mode, the
//!    three identity tokens.
//! 5. Return the cached unit on a hit; otherwise compile, store and return.
//!
//! Compile failures are never cached.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, LruCache, Weigher};
use crate::fetch::{FetchError, FetchedText, Fetcher, RetryPolicy, fetch_text};
use crate::inflight::InFlight;
use crate::navigation::{RouterMode, sanitize};

pub mod compile;
pub mod config;

pub use compile::{CompileError, CompiledRoute, Compiler, RouteSources};
pub use config::{ConfigError, LoaderConfig};

/// Attempts for the view and logic resources.
const REQUIRED_ATTEMPTS: u32 = 2;

/// Attempts for the optional stylesheet.
const STYLE_ATTEMPTS: u32 = 1;

// `encodeURIComponent` leaves these unescaped.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A compiled route, as stored in the cache.
#[derive(Debug, PartialEq, Eq)]
pub struct RouteUnit<A> {
    pub view: A,
    pub logic: A,
    pub composed: A,
    /// Stylesheet text; empty when the stylesheet was unavailable.
    pub style: String,
    pub route: String,
    /// The version part of the cache key (`v1|v:..|l:..|s:..` in ETag mode).
    pub version_key: String,
}

/// A shared, cacheable route unit.
pub type SharedUnit<A> = Arc<RouteUnit<A>>;

/// A cache the loader can store units in.
pub type DynCache<A> = Arc<dyn CacheStore<SharedUnit<A>>>;

/// Errors surfaced by [`Loader::load_route`].
///
/// Every waiter on a shared load receives the same error.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("route {route} could not be fetched: {source}")]
    Fetch {
        route: String,
        #[source]
        source: FetchError,
    },

    #[error("route {route} failed to compile: {source}")]
    Compile {
        route: String,
        #[source]
        source: CompileError,
    },

    #[error("stopped waiting for route {route}")]
    Cancelled { route: String },

    #[error("route load aborted: {reason}")]
    Aborted { reason: String },
}

impl From<JoinError> for LoadError {
    fn from(err: JoinError) -> Self {
        Self::Aborted {
            reason: err.to_string(),
        }
    }
}

/// The three resource identifiers of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIds {
    pub view: String,
    pub logic: String,
    pub style: String,
}

impl ResourceIds {
    /// `<base>/view/<route>.jsx`, `<base>/logic/<route>.jsx` and
    /// `<base>/style/<route>.css`, each suffixed with `?v=<version>` when the
    /// version label is non-empty.
    pub fn new(base_path: &str, route: &str, version: &str) -> Self {
        let base = base_path.trim_end_matches('/');
        let query = if version.is_empty() {
            String::new()
        } else {
            format!("?v={}", utf8_percent_encode(version, COMPONENT))
        };
        Self {
            view: format!("{base}/view/{route}.jsx{query}"),
            logic: format!("{base}/logic/{route}.jsx{query}"),
            style: format!("{base}/style/{route}.css{query}"),
        }
    }
}

/// Identity tokens of the three fetched resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTokens {
    pub view: String,
    pub logic: String,
    pub style: String,
}

/// The version part of a cache key.
///
/// Tokens are embedded unescaped, so a token containing `|s:` and the like
/// can in principle collide with another token set.
pub fn version_key(version: &str, tokens: Option<&ContentTokens>) -> String {
    match tokens {
        Some(t) => format!("{version}|v:{}|l:{}|s:{}", t.view, t.logic, t.style),
        None => version.to_owned(),
    }
}

/// The full cache key: `<route>::<version key>`.
///
/// # Examples
///
/// ```
/// use routeload::loader::{cache_key, version_key, ContentTokens};
///
/// let tokens = ContentTokens { view: "abc".into(), logic: "def".into(), style: "ghi".into() };
/// assert_eq!(cache_key("todo", &version_key("v1", Some(&tokens))), "todo::v1|v:abc|l:def|s:ghi");
/// assert_eq!(cache_key("todo", &version_key("v1", None)), "todo::v1");
/// ```
pub fn cache_key(route: &str, version_key: &str) -> String {
    format!("{route}::{version_key}")
}

/// Point-in-time view of the loader, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoaderStats {
    pub size: Option<usize>,
    pub weight: Option<f64>,
    pub options: StatsOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsOptions {
    pub version: String,
    pub use_etag_version: bool,
    pub router_mode: RouterMode,
    pub router_base_path: String,
    pub source_base_path: String,
}

struct Inner<A> {
    config: LoaderConfig,
    fetcher: Arc<dyn Fetcher>,
    compiler: Arc<dyn Compiler<A>>,
    cache: RwLock<DynCache<A>>,
    inflight: InFlight<SharedUnit<A>, LoadError>,
    shutdown: Mutex<CancellationToken>,
}

/// Loads, compiles and caches routes.
///
/// Cheap to clone; clones share the cache and the in-flight registry.
///
/// # Examples
///
/// ```
/// use routeload::fetch::{FetchError, FetchedText};
/// use routeload::loader::{CompileError, CompiledRoute, Loader, LoaderConfig, RouteSources};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let loader = Loader::builder(LoaderConfig::default().version("v1"))
///     .fetcher(|resource: String| async move {
///         Ok::<_, FetchError>(FetchedText::new(format!("// {resource}"), "\"1\""))
///     })
///     .compiler(|src: RouteSources| async move {
///         Ok::<_, CompileError>(CompiledRoute {
///             composed: format!("{}\n{}", src.logic, src.view),
///             view: src.view,
///             logic: src.logic,
///         })
///     })
///     .build()
///     .unwrap();
///
/// let unit = loader.load_route("todo").await.unwrap();
/// assert_eq!(unit.version_key, "v1|v:\"1\"|l:\"1\"|s:\"1\"");
/// assert_eq!(loader.stats().size, Some(1));
/// # }
/// ```
pub struct Loader<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for Loader<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Loader<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<A: Send + Sync + 'static> Loader<A> {
    pub fn builder(config: LoaderConfig) -> LoaderBuilder<A> {
        LoaderBuilder {
            config,
            fetcher: None,
            compiler: None,
            cache: None,
            weigher: None,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// Resource identifiers for `route` under this loader's base path and version.
    pub fn resource_ids(&self, route: &str) -> ResourceIds {
        ResourceIds::new(&self.inner.config.base_path, route, &self.inner.config.version)
    }

    /// Loads `route`, sharing any load already running for it.
    ///
    /// # Errors
    ///
    /// - [`LoadError::Fetch`]: the view or logic resource could not be
    ///   fetched after retries. A missing stylesheet is not an error.
    /// - [`LoadError::Compile`]: the compiler rejected the sources.
    /// - [`LoadError::Aborted`]: the load task panicked.
    pub async fn load_route(&self, route: &str) -> Result<SharedUnit<A>, LoadError> {
        self.join_or_start(route).await
    }

    /// Like [`load_route`](Self::load_route), but stops waiting when `cancel`
    /// fires.
    ///
    /// Cancellation only detaches this caller; the shared load keeps running
    /// for other waiters and still fills the cache.
    pub async fn load_route_with_cancel(
        &self,
        route: &str,
        cancel: &CancellationToken,
    ) -> Result<SharedUnit<A>, LoadError> {
        let load = self.join_or_start(route);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(route, "caller stopped waiting for load");
                Err(LoadError::Cancelled { route: route.to_owned() })
            }
            result = load => result,
        }
    }

    /// Loads a sanitized `route` and discards the result. Failures are logged,
    /// never returned.
    pub async fn prefetch(&self, route: &str) {
        let name = sanitize(route);
        if name.is_empty() {
            warn!(route, "skipping prefetch of invalid route name");
            return;
        }
        match self.load_route(&name).await {
            Ok(_) => debug!(route = %name, "prefetched"),
            Err(e) => warn!(route = %name, error = %e, "prefetch failed"),
        }
    }

    /// Waits for the configured prefetch delay, then prefetches `routes` in
    /// order.
    pub async fn prefetch_all<I, S>(&self, routes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokio::time::sleep(self.inner.config.prefetch_delay()).await;
        for route in routes {
            self.prefetch(route.as_ref()).await;
        }
    }

    /// Removes every cache entry whose key starts with `<route>::<version>`.
    ///
    /// Returns the number of entries removed. A cache that cannot enumerate
    /// its keys is left untouched.
    pub fn clear_route_cache(&self, route: &str, version: &str) -> usize {
        let prefix = cache_key(route, version);
        let cache = self.cache();
        let Some(keys) = cache.keys() else {
            warn!(route, version, "active cache cannot enumerate keys; nothing cleared");
            return 0;
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| k.starts_with(&prefix)) {
            cache.delete(key);
            removed += 1;
        }
        debug!(prefix = %prefix, removed, "cleared route cache");
        removed
    }

    /// Empties the active cache.
    pub fn clear_all_cache(&self) {
        self.cache().clear();
        debug!("cleared all cached routes");
    }

    pub fn stats(&self) -> LoaderStats {
        let cache = self.cache();
        let config = &self.inner.config;
        LoaderStats {
            size: cache.size(),
            weight: cache.weight(),
            options: StatsOptions {
                version: config.version.clone(),
                use_etag_version: config.use_etag_version,
                router_mode: config.router.mode,
                router_base_path: config.router.base_path.clone(),
                source_base_path: config.base_path.clone(),
            },
        }
    }

    /// Replaces the active cache. Entries of the old cache are not migrated.
    pub fn swap_cache(&self, cache: DynCache<A>) {
        *self
            .inner
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner) = cache;
        info!("route cache swapped");
    }

    /// Number of loads currently running.
    pub fn pending_loads(&self) -> usize {
        self.inner.inflight.len()
    }

    /// Cancels every running fetch and empties the cache.
    ///
    /// Loads interrupted this way fail with a cancelled [`FetchError`]. The
    /// loader stays usable: loads started afterwards fetch normally.
    pub fn dispose(&self) {
        let previous = std::mem::replace(
            &mut *self
                .inner
                .shutdown
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            CancellationToken::new(),
        );
        previous.cancel();
        self.clear_all_cache();
        info!("loader disposed");
    }

    fn cache(&self) -> DynCache<A> {
        Arc::clone(&self.inner.cache.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn join_or_start(&self, route: &str) -> crate::inflight::SharedLoad<SharedUnit<A>, LoadError> {
        let key = format!("load:{route}:{}", self.inner.config.version);
        let (load, started) = self.inner.inflight.join_or_start(&key, || {
            let loader = self.clone();
            let route = route.to_owned();
            async move { loader.load_uncached(route).await }
        });
        if !started {
            debug!(route, "joined in-flight load");
        }
        load
    }

    async fn load_uncached(self, route: String) -> Result<SharedUnit<A>, LoadError> {
        let config = &self.inner.config;
        let ids = self.resource_ids(&route);
        let fetcher = self.inner.fetcher.as_ref();
        let cancel = self
            .inner
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token();
        let required = RetryPolicy {
            attempts: REQUIRED_ATTEMPTS,
            base_delay: config.retry_delay(),
        };
        let optional = RetryPolicy {
            attempts: STYLE_ATTEMPTS,
            ..required
        };

        let (view, logic, style) = tokio::join!(
            fetch_text(fetcher, &ids.view, required, &cancel),
            fetch_text(fetcher, &ids.logic, required, &cancel),
            fetch_text(fetcher, &ids.style, optional, &cancel),
        );

        let fetch_failed = |source: FetchError| LoadError::Fetch {
            route: route.clone(),
            source,
        };
        let view = view.map_err(fetch_failed)?;
        let logic = logic.map_err(fetch_failed)?;
        let style = style.unwrap_or_else(|e| {
            warn!(route = %route, error = %e, "stylesheet unavailable; using empty style");
            FetchedText::default()
        });

        let tokens = config.use_etag_version.then(|| ContentTokens {
            view: view.etag,
            logic: logic.etag,
            style: style.etag,
        });
        let version_key = version_key(&config.version, tokens.as_ref());
        let key = cache_key(&route, &version_key);

        let cache = self.cache();
        if let Some(hit) = cache.get(&key) {
            debug!(route = %route, key = %key, "cache hit");
            return Ok(hit);
        }
        debug!(route = %route, key = %key, "cache miss; compiling");

        let sources = RouteSources {
            route: route.clone(),
            view: view.text,
            logic: logic.text,
            style: style.text.clone(),
        };
        let compiled = self
            .inner
            .compiler
            .compile(sources)
            .await
            .map_err(|source| LoadError::Compile {
                route: route.clone(),
                source,
            })?;

        let unit = Arc::new(RouteUnit {
            view: compiled.view,
            logic: compiled.logic,
            composed: compiled.composed,
            style: style.text,
            route,
            version_key,
        });
        cache.set(&key, Arc::clone(&unit));
        info!(route = %unit.route, key = %key, "route compiled and cached");

        Ok(unit)
    }
}

/// Assembles a [`Loader`] from config and capabilities.
pub struct LoaderBuilder<A> {
    config: LoaderConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    compiler: Option<Arc<dyn Compiler<A>>>,
    cache: Option<DynCache<A>>,
    weigher: Option<Weigher<SharedUnit<A>>>,
}

impl<A: Send + Sync + 'static> LoaderBuilder<A> {
    /// Sets the resource fetcher. Required.
    #[must_use]
    pub fn fetcher(mut self, fetcher: impl Fetcher) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Sets the compile/compose capability. Required.
    #[must_use]
    pub fn compiler(mut self, compiler: impl Compiler<A>) -> Self {
        self.compiler = Some(Arc::new(compiler));
        self
    }

    /// Injects a cache instance. Takes precedence over `config.cache`.
    #[must_use]
    pub fn cache(mut self, cache: DynCache<A>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Weighs units stored in the built-in cache. Ignored when a cache is
    /// injected.
    #[must_use]
    pub fn weigher(mut self, weigher: Weigher<SharedUnit<A>>) -> Self {
        self.weigher = Some(weigher);
        self
    }

    /// # Errors
    ///
    /// [`ConfigError::Missing`] when no fetcher or compiler was supplied.
    pub fn build(self) -> Result<Loader<A>, ConfigError> {
        let fetcher = self.fetcher.ok_or(ConfigError::Missing { what: "fetcher" })?;
        let compiler = self.compiler.ok_or(ConfigError::Missing { what: "compiler" })?;

        let cache: DynCache<A> = match (self.cache, self.weigher) {
            (Some(cache), _) => cache,
            (None, Some(weigher)) => Arc::new(LruCache::with_weigher(self.config.cache, weigher)),
            (None, None) => Arc::new(LruCache::new(self.config.cache)),
        };

        Ok(Loader {
            inner: Arc::new(Inner {
                config: self.config,
                fetcher,
                compiler,
                cache: RwLock::new(cache),
                inflight: InFlight::new(),
                shutdown: Mutex::new(CancellationToken::new()),
            }),
        })
    }
}
