use gatekeeper::{gateway::Environ, Endpoint, Fault};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Fault> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatekeeper=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let endpoint = Endpoint::new("/hello/:name")?.get(|req, resp| {
        resp.header("Content-Type", "application/json").set_body(format!(
            r#"{{"greeting": "Hello, {}!", "from": {:?}}}"#,
            req.arg("name").unwrap_or("stranger"),
            req.ip().unwrap_or("unknown"),
        ));
        Ok(())
    });

    for path in ["/hello/world", "/hello/rust", "/goodbye/world"] {
        let environ = Environ::new()
            .var("REQUEST_METHOD", "GET")
            .var("PATH_INFO", path)
            .var("SERVER_NAME", "localhost")
            .var("SERVER_PORT", "8080")
            .var("REMOTE_ADDR", "127.0.0.1");

        let body = endpoint.call(environ, |status, headers| {
            println!("GET {path} -> {status}");
            for (name, value) in headers {
                println!("  {name}: {value}");
            }
        })?;

        for chunk in &body {
            println!("  {}", String::from_utf8_lossy(&chunk?));
        }
    }

    Ok(())
}
