use crate::{
    endpoint::path::PathPattern,
    gateway::{Body, Environ},
    limits::{ReqLimits, RespLimits},
    template::{Context, TemplateRenderer},
    Error, Fault, Halt, Method, Outcome, Request, Response, StatusCode,
};
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::{debug, trace, warn};

/// Handler or before/after hook.
pub type Handler = Box<dyn Fn(&mut Request, &mut Response) -> Outcome + Send + Sync>;

/// Observer of faults raised while handling a request.
pub type ExceptionHook = Box<dyn Fn(&Request, &Fault) + Send + Sync>;

/// A routable handler bound to a path pattern and a set of methods.
///
/// Each request runs through three phases: `before_request`, the handler
/// registered for the request method, then `after_request`. Any phase may
/// end early by returning a [`Halt`]:
///
/// | Returned in     | [`Halt::Finish`] / [`Halt::Respond`]       | [`Halt::Fault`]            |
/// |-----------------|--------------------------------------------|----------------------------|
/// | `before_request`| done, handler and `after_request` skipped  | `on_exception`, then error |
/// | handler         | `after_request` still runs                 | `on_exception`, then error |
/// | `after_request` | done                                       | `on_exception`, then error |
///
/// [`Halt::Finish`] keeps the in-flight response while [`Halt::Respond`]
/// replaces it.
///
/// # Examples
/// ```
/// use gatekeeper::{gateway::Environ, Endpoint, Halt, Request, Response, StatusCode};
///
/// let endpoint = Endpoint::new("/users/:id")
///     .unwrap()
///     .before_request(|req, _| {
///         if req.header("authorization").is_none() {
///             let mut denied = Response::default();
///             denied.status = StatusCode::Unauthorized;
///             return Err(Halt::Respond(denied));
///         }
///         Ok(())
///     })
///     .get(|req, resp| {
///         resp.set_body(format!("user {}", req.arg("id").unwrap_or_default()));
///         Ok(())
///     });
///
/// let environ = Environ::new()
///     .var("REQUEST_METHOD", "GET")
///     .var("PATH_INFO", "/users/9")
///     .var("HTTP_AUTHORIZATION", "Bearer abc");
/// let mut request = Request::new(environ);
///
/// assert!(endpoint.match_request(&mut request));
/// let response = endpoint.handle_request(&mut request).unwrap();
/// assert_eq!(response.body, b"user 9");
/// ```
pub struct Endpoint {
    pattern: PathPattern,
    handlers: HashMap<Method, Handler>,

    before_request: Option<Handler>,
    after_request: Option<Handler>,
    on_exception: Option<ExceptionHook>,

    template_renderer: Option<Arc<dyn TemplateRenderer>>,
    req_limits: ReqLimits,
    resp_limits: RespLimits,
}

macro_rules! method_handlers {
    ($($name:ident => $method:ident),+ $(,)?) => {$(
        #[doc = concat!("Registers the `", stringify!($method), "` handler.")]
        #[inline]
        pub fn $name<F>(self, handler: F) -> Self
        where
            F: Fn(&mut Request, &mut Response) -> Outcome + Send + Sync + 'static,
        {
            self.handler(Method::$method, handler)
        }
    )+};
}

/// Building
impl Endpoint {
    /// Creates an endpoint without handlers.
    ///
    /// See [`PathPattern`] for the accepted path forms.
    pub fn new(path: &str) -> Result<Self, Error> {
        Ok(Self {
            pattern: PathPattern::compile(path)?,
            handlers: HashMap::new(),
            before_request: None,
            after_request: None,
            on_exception: None,
            template_renderer: None,
            req_limits: ReqLimits::default(),
            resp_limits: RespLimits::default(),
        })
    }

    /// Registers the handler for `method`, replacing any previous one.
    pub fn handler<F>(mut self, method: Method, handler: F) -> Self
    where
        F: Fn(&mut Request, &mut Response) -> Outcome + Send + Sync + 'static,
    {
        self.handlers.insert(method, Box::new(handler));
        self
    }

    method_handlers! {
        get => Get,
        post => Post,
        put => Put,
        patch => Patch,
        delete => Delete,
        head => Head,
        options => Options,
    }

    /// Runs before the method handler.
    pub fn before_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Request, &mut Response) -> Outcome + Send + Sync + 'static,
    {
        self.before_request = Some(Box::new(hook));
        self
    }

    /// Runs after the method handler, also when it returned a response early.
    pub fn after_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Request, &mut Response) -> Outcome + Send + Sync + 'static,
    {
        self.after_request = Some(Box::new(hook));
        self
    }

    /// Observes a fault once before it is returned to the caller.
    pub fn on_exception<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Request, &Fault) + Send + Sync + 'static,
    {
        self.on_exception = Some(Box::new(hook));
        self
    }

    /// Shared renderer handed to every response this endpoint creates.
    pub fn template_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.template_renderer = Some(renderer);
        self
    }

    /// Limits for the responses this endpoint creates.
    pub fn limits(mut self, limits: RespLimits) -> Self {
        self.resp_limits = limits;
        self
    }

    /// Limits for requests built by [`call`](Endpoint::call).
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.req_limits = limits;
        self
    }
}

/// Inspection
impl Endpoint {
    /// The declared path.
    #[inline]
    pub fn path(&self) -> &str {
        self.pattern.source()
    }

    #[inline]
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Methods with a registered handler, in declaration order of [`Method`].
    pub fn methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.handlers.keys().copied().collect();
        methods.sort();
        methods
    }

    /// Renders a template with the endpoint's renderer.
    ///
    /// Fails with [`Error::TemplateRendererNotSet`] when none is set.
    pub fn render(&self, name: &str, context: &Context) -> Result<String, Error> {
        self.template_renderer
            .as_ref()
            .ok_or(Error::TemplateRendererNotSet)?
            .render(name, context)
    }
}

/// Handling
impl Endpoint {
    /// Whether the endpoint accepts the request.
    ///
    /// The method must be one of [`Method::ALL`] with a registered handler
    /// and the whole path must match. On success the path arguments are
    /// stored in [`Request::args`].
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::{gateway::Environ, Endpoint, Request};
    ///
    /// let endpoint = Endpoint::new("/users/:id").unwrap().get(|_, _| Ok(()));
    /// let request = |method: &str, path: &str| {
    ///     Request::new(Environ::new().var("REQUEST_METHOD", method).var("PATH_INFO", path))
    /// };
    ///
    /// assert!(endpoint.match_request(&mut request("GET", "/users/9")));
    /// assert!(endpoint.match_request(&mut request("get", "/users/9")));
    /// assert!(!endpoint.match_request(&mut request("POST", "/users/9")));
    /// assert!(!endpoint.match_request(&mut request("GET", "/users/9/edit")));
    /// ```
    pub fn match_request(&self, request: &mut Request) -> bool {
        let Some(method) = request.method_kind() else {
            return false;
        };
        if !self.handlers.contains_key(&method) {
            return false;
        }

        match self.pattern.captures(request.path()) {
            Some(args) => {
                request.set_args(args);
                true
            }
            None => false,
        }
    }

    /// Runs the request through all phases and returns the final response.
    ///
    /// Path arguments are filled in first, left empty when the path does
    /// not match. A request whose method has no handler runs only the hooks. Faults are passed
    /// to `on_exception` once and returned unchanged.
    pub fn handle_request(&self, request: &mut Request) -> Result<Response, Fault> {
        let args = self.pattern.captures(request.path()).unwrap_or_default();
        request.set_args(args);

        let mut response = Response::new(&self.resp_limits);
        response.set_template_renderer(self.template_renderer.clone());
        request.set_response(&response);

        self.run(request, response).map_err(|fault| {
            warn!(
                method = request.method(),
                path = request.path(),
                error = %fault,
                "request handling failed"
            );
            if let Some(hook) = &self.on_exception {
                hook(request, &fault);
            }
            fault
        })
    }

    fn run(&self, request: &mut Request, response: Response) -> Result<Response, Fault> {
        let response = match &self.before_request {
            Some(hook) => match Phase::Before.run(hook, request, response)? {
                Step::Continue(response) => response,
                Step::ShortCircuit(response) => return Ok(response),
            },
            None => response,
        };

        let handler = request
            .method_kind()
            .and_then(|method| self.handlers.get(&method));
        let response = match handler {
            Some(handler) => Phase::Main.run(handler, request, response)?.into_response(),
            None => response,
        };

        match &self.after_request {
            Some(hook) => Ok(Phase::After.run(hook, request, response)?.into_response()),
            None => Ok(response),
        }
    }

    /// Serves one gateway call: builds the request, handles it and reports
    /// the response through `start_response`.
    ///
    /// A request the endpoint does not match gets `404 Not Found` without
    /// running any phase.
    ///
    /// # Examples
    /// ```
    /// use gatekeeper::{gateway::Environ, Endpoint};
    ///
    /// let endpoint = Endpoint::new("/hello/:name").unwrap().get(|req, resp| {
    ///     resp.set_body("Hello, ").write(req.arg("name").unwrap_or_default());
    ///     Ok(())
    /// });
    ///
    /// let environ = Environ::new()
    ///     .var("REQUEST_METHOD", "GET")
    ///     .var("PATH_INFO", "/hello/world");
    ///
    /// let mut status = String::new();
    /// let body = endpoint
    ///     .call(environ, |line, _| status = line.to_owned())
    ///     .unwrap();
    ///
    /// assert_eq!(status, "200 OK");
    /// assert_eq!(body.read_all().unwrap(), b"Hello, world");
    /// ```
    pub fn call<F>(&self, environ: Environ, start_response: F) -> Result<Body, Fault>
    where
        F: FnOnce(&str, &[(String, String)]),
    {
        let mut request = Request::with_limits(environ, &self.req_limits);

        if !self.match_request(&mut request) {
            debug!(
                method = request.method(),
                path = request.path(),
                "request not matched"
            );
            let mut response = Response::new(&self.resp_limits);
            response.status = StatusCode::NotFound;
            response.set_body(StatusCode::NotFound.reason());
            return Ok(response.wsgi(start_response));
        }

        let response = self.handle_request(&mut request)?;
        Ok(response.wsgi(start_response))
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("path", &self.path())
            .field("methods", &self.methods())
            .field("before_request", &self.before_request.is_some())
            .field("after_request", &self.after_request.is_some())
            .field("on_exception", &self.on_exception.is_some())
            .field("template_renderer", &self.template_renderer.is_some())
            .finish()
    }
}

// PHASES

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Before,
    Main,
    After,
}

/// Result of a phase that did not fault.
enum Step {
    Continue(Response),
    ShortCircuit(Response),
}

impl Step {
    #[inline]
    fn into_response(self) -> Response {
        match self {
            Step::Continue(response) | Step::ShortCircuit(response) => response,
        }
    }
}

impl Phase {
    const fn as_str(&self) -> &'static str {
        match self {
            Phase::Before => "before_request",
            Phase::Main => "handler",
            Phase::After => "after_request",
        }
    }

    fn run(
        self,
        hook: &Handler,
        request: &mut Request,
        mut response: Response,
    ) -> Result<Step, Fault> {
        trace!(phase = self.as_str(), "entering phase");

        match hook(request, &mut response) {
            Ok(()) => Ok(Step::Continue(response)),
            Err(Halt::Finish) => {
                debug!(phase = self.as_str(), "phase finished early");
                Ok(Step::ShortCircuit(response))
            }
            Err(Halt::Respond(replacement)) => {
                debug!(
                    phase = self.as_str(),
                    status = replacement.status.as_u16(),
                    "response replaced"
                );
                request.set_response(&replacement);
                Ok(Step::ShortCircuit(replacement))
            }
            Err(Halt::Fault(fault)) => Err(fault),
        }
    }
}




#[cfg(test)]
mod render_tests {
    use super::*;
    use crate::{template::test_renderer::Fixed, tools::*};

    #[test]
    fn with_renderer() {
        let endpoint = Endpoint::new("/")
            .unwrap()
            .template_renderer(Arc::new(Fixed::simple()));

        assert_eq!(
            endpoint.render("simple.html", &Context::new()).unwrap(),
            "<h1>Simple</h1>"
        );

        let context = Context::from([("name".to_owned(), "John".to_owned())]);
        assert_eq!(
            endpoint.render("with_context.html", &context).unwrap(),
            "<h1>Hello John</h1>"
        );
    }

    #[test]
    fn without_renderer() {
        let endpoint = Endpoint::new("/").unwrap();
        assert!(matches!(
            endpoint.render("simple.html", &Context::new()),
            Err(Error::TemplateRendererNotSet)
        ));
    }

    #[test]
    fn responses_inherit_renderer() {
        let renderer: Arc<dyn TemplateRenderer> = Arc::new(Fixed::simple());
        let endpoint = Endpoint::new("/users")
            .unwrap()
            .template_renderer(renderer.clone())
            .get(|_, resp| {
                resp.render("simple.html", &Context::new())?;
                Ok(())
            });

        let response = endpoint
            .handle_request(&mut request("GET", "/users"))
            .unwrap();

        assert!(Arc::ptr_eq(response.template_renderer().unwrap(), &renderer));
        assert_eq!(response.body, b"<h1>Simple</h1>");
    }
}

#[cfg(test)]
mod call_tests {
    use super::*;
    use crate::tools::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn serves_matched_request() {
        let endpoint = Endpoint::new("/users/:id").unwrap().post(|req, resp| {
            let name = req.text()?.to_owned();
            resp.status = StatusCode::Created;
            resp.header("Content-Type", "application/json")
                .set_body(format!(r#"{{"id": {}, "name": "{name}"}}"#, req.arg("id").unwrap_or("0")));
            Ok(())
        });

        let environ = mock_env()
            .var("REQUEST_METHOD", "POST")
            .var("PATH_INFO", "/users/7")
            .input(&b"john"[..]);

        let mut reported = Vec::new();
        let body = endpoint
            .call(environ, |status, headers| {
                reported.push((status.to_owned(), headers.to_vec()))
            })
            .unwrap();

        assert_eq!(
            reported,
            [(
                "201 Created".to_owned(),
                vec![("Content-Type".to_owned(), "application/json".to_owned())]
            )]
        );
        assert_eq!(body.read_all().unwrap(), br#"{"id": 7, "name": "john"}"#);
    }

    #[test]
    fn not_matched() {
        let endpoint = Endpoint::new("/users").unwrap().get(|_, _| Ok(()));

        let mut status = String::new();
        let body = endpoint
            .call(mock_env().var("PATH_INFO", "/other"), |line, _| {
                status = line.to_owned()
            })
            .unwrap();

        assert_eq!(status, "404 Not Found");
        assert_eq!(body.read_all().unwrap(), b"Not Found");
    }

    #[test]
    fn fault_is_returned() {
        let endpoint = Endpoint::new("/")
            .unwrap()
            .get(|_, _| Err(Halt::fault("broken")));

        let mut called = false;
        let result = endpoint.call(mock_env().var("PATH_INFO", "/"), |_, _| called = true);

        assert!(result.is_err());
        assert!(!called);
    }

    #[test]
    fn streams_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();
        let path = file.path().to_owned();

        let endpoint = Endpoint::new(r"^/static/(?P<path>.+)$")
            .unwrap()
            .limits(RespLimits { file_chunk_size: 5 })
            .get(move |_, resp| {
                resp.file = Some(path.clone());
                Ok(())
            });

        let body = endpoint
            .call(mock_env().var("PATH_INFO", "/static/hello.txt"), |_, _| {})
            .unwrap();

        let chunks: Vec<_> = body.iter().map(Result::unwrap).collect();
        assert_eq!(chunks, [b"hello".to_vec(), b" worl".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn request_limits_apply() {
        let endpoint = Endpoint::new("/")
            .unwrap()
            .request_limits(ReqLimits {
                body_size: 2,
                ..ReqLimits::default()
            })
            .post(|req, _| {
                req.body()?;
                Ok(())
            });

        let environ = mock_env()
            .var("REQUEST_METHOD", "POST")
            .var("PATH_INFO", "/")
            .input(&b"too long"[..]);

        let fault = endpoint.call(environ, |_, _| {}).unwrap_err();
        assert!(matches!(
            fault.downcast_ref::<Error>(),
            Some(Error::BodyTooLarge { limit: 2, .. })
        ));
    }
}
