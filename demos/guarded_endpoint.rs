use gatekeeper::{gateway::Environ, Endpoint, Halt, Request, Response, StatusCode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, thiserror::Error)]
#[error("account {0} is locked")]
struct Locked(String);

fn require_token(req: &mut Request, _: &mut Response) -> Result<(), Halt> {
    if req.header("authorization") == Some("Bearer secret") {
        return Ok(());
    }

    let mut denied = Response::default();
    denied.status = StatusCode::Unauthorized;
    denied.set_body("missing or invalid token");
    Err(Halt::Respond(denied))
}

fn show_account(req: &mut Request, resp: &mut Response) -> Result<(), Halt> {
    let id = req.arg("id").unwrap_or_default().to_owned();
    if id == "13" {
        return Err(Locked(id).into());
    }

    resp.set_body("account ").write(id.as_str());
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatekeeper=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let endpoint = Endpoint::new("/accounts/:id")?
        .before_request(require_token)
        .get(show_account)
        .after_request(|_, resp| {
            resp.header("Cache-Control", "no-store");
            Ok(())
        })
        .on_exception(|req, fault| {
            tracing::error!(path = req.path(), %fault, "account lookup failed");
        });

    let cases = [
        ("/accounts/7", Some("Bearer secret")),
        ("/accounts/7", None),
        ("/accounts/13", Some("Bearer secret")),
    ];

    for (path, token) in cases {
        let mut environ = Environ::new()
            .var("REQUEST_METHOD", "GET")
            .var("PATH_INFO", path);
        if let Some(token) = token {
            environ.insert("HTTP_AUTHORIZATION", token);
        }

        let mut request = Request::new(environ);
        match endpoint.handle_request(&mut request) {
            Ok(response) => println!(
                "{path} -> {} {:?} {}",
                response.status_line(),
                response.headers.get("Cache-Control"),
                String::from_utf8_lossy(&response.body),
            ),
            Err(fault) => println!("{path} -> fault: {fault}"),
        }
    }

    Ok(())
}
