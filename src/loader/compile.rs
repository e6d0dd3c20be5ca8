//! The compile/compose capability the loader delegates to.
//!
//! The loader never knows how source text becomes something executable. It
//! hands the three raw sources to a [`Compiler`] and caches whatever comes
//! back. Compilation must be pure with respect to its inputs: the same
//! sources must produce an equivalent unit, or caching would be unsound.

use std::future::Future;

use futures::future::BoxFuture;
use thiserror::Error;

/// Raw sources of one route, as fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSources {
    pub route: String,
    pub view: String,
    pub logic: String,
    /// Empty when the stylesheet could not be fetched.
    pub style: String,
}

/// Output of a successful compile: the compiled view, the compiled logic and
/// the renderable composition of both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRoute<A> {
    pub view: A,
    pub logic: A,
    pub composed: A,
}

/// The compiler rejected the sources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileError {
    message: String,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Turns route sources into executable artifacts of type `A`.
///
/// Implemented for any
/// `Fn(RouteSources) -> impl Future<Output = Result<CompiledRoute<A>, CompileError>>`.
///
/// # Examples
///
/// ```
/// use routeload::loader::{CompileError, CompiledRoute, Compiler, RouteSources};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let compiler = |src: RouteSources| async move {
///     if src.view.is_empty() {
///         return Err(CompileError::new("empty view"));
///     }
///     Ok(CompiledRoute {
///         composed: format!("{}{}", src.logic, src.view),
///         view: src.view,
///         logic: src.logic,
///     })
/// };
///
/// let sources = RouteSources { view: "<p/>".into(), logic: "x".into(), ..Default::default() };
/// let compiled = compiler.compile(sources).await.unwrap();
/// assert_eq!(compiled.composed, "x<p/>");
/// # }
/// ```
pub trait Compiler<A>: Send + Sync + 'static {
    fn compile(&self, sources: RouteSources) -> BoxFuture<'static, Result<CompiledRoute<A>, CompileError>>;
}

impl<T, F, A> Compiler<A> for T
where
    T: Fn(RouteSources) -> F + Send + Sync + 'static,
    F: Future<Output = Result<CompiledRoute<A>, CompileError>> + Send + 'static,
{
    fn compile(&self, sources: RouteSources) -> BoxFuture<'static, Result<CompiledRoute<A>, CompileError>> {
        Box::pin((self)(sources))
    }
}
