use gatekeeper::{gateway::Environ, Endpoint, Fault, Request};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Fault> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatekeeper=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let endpoint = Endpoint::new("/profile")?
        .post(|_, resp| {
            resp.flash("notice", "Profile saved").redirect("/profile");
            Ok(())
        })
        .get(|req, resp| {
            let messages = req.messages()?;
            match messages.get("notice") {
                Some(notice) => resp.set_body(format!("[{notice}] ")),
                None => resp.set_body(""),
            };
            resp.write("Your profile");
            Ok(())
        });

    // The form post answers with a redirect carrying the message cookie
    let mut post = Request::new(
        Environ::new()
            .var("REQUEST_METHOD", "POST")
            .var("PATH_INFO", "/profile"),
    );
    let response = endpoint.handle_request(&mut post)?;
    println!("POST /profile -> {}", response.status_line());

    let mut cookie = String::new();
    for (name, value) in response.wsgi_headers() {
        println!("  {name}: {value}");
        if name == "Set-Cookie" {
            cookie = value.split(';').next().unwrap_or_default().to_owned();
        }
    }

    // The browser follows the redirect and sends the cookie back once
    for round in 1..=2 {
        let mut environ = Environ::new()
            .var("REQUEST_METHOD", "GET")
            .var("PATH_INFO", "/profile");
        if round == 1 {
            environ.insert("HTTP_COOKIE", cookie.as_str());
        }

        let mut get = Request::new(environ);
        let response = endpoint.handle_request(&mut get)?;
        println!(
            "GET /profile #{round} -> {}",
            String::from_utf8_lossy(&response.body)
        );
        for cookie in response.cookies() {
            println!("  Set-Cookie: {cookie}");
        }
    }

    Ok(())
}
