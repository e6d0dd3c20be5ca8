//! Load routes from a local origin over HTTP.
//!
//! Starts a tiny origin on an ephemeral port serving `index` and `todo`
//! (without a stylesheet for `todo`), then renders both routes and shows the
//! cache state.
//!
//! ```sh
//! RUST_LOG=routeload=debug cargo run --example load_route
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use routeload::fetch::HttpFetcher;
use routeload::loader::{CompileError, CompiledRoute, Loader, LoaderConfig, RouteSources};
use routeload::navigation::{Location, RouteController, View};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn site() -> HashMap<&'static str, (&'static str, &'static str)> {
    HashMap::from([
        ("/src/view/index.jsx", ("<h1>Home</h1>", "\"i-v1\"")),
        ("/src/logic/index.jsx", ("const title = 'Home';", "\"i-l1\"")),
        ("/src/style/index.css", ("h1 { margin: 0 }", "\"i-s1\"")),
        ("/src/view/todo.jsx", ("<ul>{items}</ul>", "\"t-v1\"")),
        ("/src/logic/todo.jsx", ("const items = [];", "\"t-l1\"")),
    ])
}

async fn serve(listener: TcpListener) {
    let site = Arc::new(site());
    loop {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        let site = Arc::clone(&site);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            let Ok(n) = stream.read(&mut buf).await else {
                return;
            };
            let head = String::from_utf8_lossy(&buf[..n]);
            let target = head
                .split_whitespace()
                .nth(1)
                .unwrap_or("/")
                .split('?')
                .next()
                .unwrap_or("/");

            let reply = match site.get(target) {
                Some((body, etag)) => format!(
                    "HTTP/1.1 200 OK\r\nETag: {etag}\r\nContent-Length: {}\r\n\r\n{body}",
                    body.len()
                ),
                None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_owned(),
            };
            let _ = stream.write_all(reply.as_bytes()).await;
        });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("routeload=info")),
        )
        .with_target(false)
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let origin = listener.local_addr()?;
    tokio::spawn(serve(listener));

    let config = LoaderConfig::from_json(
        r#"{ "version": "2025-08-13", "prefetch_routes": ["todo"], "prefetch_delay_ms": 50 }"#,
    )?;
    let loader = Loader::builder(config)
        .fetcher(HttpFetcher::new(origin.to_string()))
        .compiler(|src: RouteSources| async move {
            Ok::<_, CompileError>(CompiledRoute {
                composed: format!("{}\n{}", src.logic, src.view),
                view: src.view,
                logic: src.logic,
            })
        })
        .build()?;
    let controller = RouteController::new(loader);

    let mut location = Location::new("/", "");
    let (view, prefetch) = controller.start(&location).await;
    print_view(&view);
    if let Some(prefetch) = prefetch {
        prefetch.await?;
    }

    if let Some(view) = controller.navigate(&mut location, "todo").await {
        print_view(&view);
    }

    let stats = controller.loader().stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn print_view(view: &View<String>) {
    match view {
        View::Unit(unit) => println!(
            "── {} [{}]\n{}\nstyle: {:?}\n",
            unit.route, unit.version_key, unit.composed, unit.style
        ),
        View::Fallback { route, message } => println!("── {route} failed: {message}\n"),
    }
}
