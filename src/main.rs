mod filters;
mod forms;
mod model;
mod months;
mod normalize;
mod pages;
mod scanner;
mod sections;
mod stats;
mod status;
mod store;
mod util;


use std::collections::HashMap;
use std::convert::Infallible;
use std::env;
use std::ffi::OsString;
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;

use askama::Template;
use chrono::Utc;
use http::header::{ALLOW, CONTENT_TYPE, LOCATION};
use hyper::{Body, Method, Request, Response, Server};
use hyper::service::{make_service_fn, service_fn};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::forms::FormError;
use crate::model::Config;
use crate::pages::SectionPage;
use crate::store::{DocumentStore, JsonFileStore};
use crate::util::FormFields;


static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();
static STORE: OnceCell<JsonFileStore> = OnceCell::new();


fn respond_500() -> Result<Response<Body>, Infallible> {
    let resp_body = Body::from("500 Something Went Wrong On The Server");
    let resp = Response::builder()
        .status(500)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(resp_body)
        .expect("failed to build body");
    Ok(resp)
}

fn respond_text(status: u16, text: String) -> Result<Response<Body>, Infallible> {
    let resp_res = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(text));
    match resp_res {
        Ok(resp) => Ok(resp),
        Err(e) => {
            error!("failed to assemble {} response body: {}", status, e);
            respond_500()
        },
    }
}

fn respond_400(message: &str) -> Result<Response<Body>, Infallible> {
    respond_text(400, format!("400 Bad Request: {}", message))
}

fn respond_403() -> Result<Response<Body>, Infallible> {
    respond_text(403, "403 Forbidden; token missing or invalid".to_owned())
}

fn respond_404() -> Result<Response<Body>, Infallible> {
    respond_text(404, "404 Not Found; no such page".to_owned())
}

fn respond_405(allowed: &str) -> Result<Response<Body>, Infallible> {
    let resp_body = Body::from(format!("405 Wrong Method; try one of: {}", allowed));
    let resp_res = Response::builder()
        .status(405)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(ALLOW, allowed)
        .body(resp_body);
    match resp_res {
        Ok(resp) => Ok(resp),
        Err(e) => {
            error!("failed to assemble 405 response body: {}", e);
            respond_500()
        },
    }
}

/// Redirects to `target` (relative to `base_url`), carrying the query string along.
fn respond_redirect(base_url: &str, target: &str, query: Option<&str>) -> Result<Response<Body>, Infallible> {
    let base: Url = match base_url.parse() {
        Ok(bu) => bu,
        Err(e) => {
            error!("failed to parse base URL {:?}: {}", base_url, e);
            return respond_500();
        },
    };

    let relative = match query {
        Some(q) => format!("{}?{}", target, q),
        None => target.to_owned(),
    };
    let location = match base.join(&relative) {
        Ok(u) => u,
        Err(e) => {
            error!("failed to join {:?} onto base URL: {}", relative, e);
            return respond_500();
        },
    };
    debug!("redirecting to {}", location);

    let response_res = Response::builder()
        .status(302)
        .header(LOCATION, location.to_string())
        .body(Body::empty());
    match response_res {
        Ok(r) => Ok(r),
        Err(e) => {
            error!("failed to assemble redirect response: {}", e);
            respond_500()
        },
    }
}

/// Answers with `data` as JSON, or with the rendered `page`.
fn respond_view<T: Serialize>(data: &T, page: SectionPage, as_json: bool) -> Result<Response<Body>, Infallible> {
    let (content_type, body_str) = if as_json {
        match serde_json::to_string(data) {
            Ok(s) => ("application/json", s),
            Err(e) => {
                error!("failed to serialize {} view: {}", page.title, e);
                return respond_500();
            },
        }
    } else {
        match page.render() {
            Ok(s) => ("text/html; charset=utf-8", s),
            Err(e) => {
                error!("error rendering template: {:?}", e);
                return respond_500();
            },
        }
    };

    let resp_res = Response::builder()
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(body_str));
    match resp_res {
        Ok(r) => Ok(r),
        Err(e) => {
            error!("failed to assemble response body: {}", e);
            respond_500()
        },
    }
}

fn handle_view(
    config: &Config,
    store: &dyn DocumentStore,
    path: &str,
    query_kv: &HashMap<String, String>,
) -> Result<Response<Body>, Infallible> {
    let as_json = query_kv.get("format").map_or(false, |f| f == "json");
    let token = query_kv.get("token").map(|t| t.as_str()).unwrap_or("");
    let thresholds = &config.thresholds;
    let now = Utc::now();

    macro_rules! section_view {
        ($title:expr, $section:expr) => {{
            let section = $section;
            respond_view(&section, SectionPage::new($title, token, &section), as_json)
        }};
    }

    match path {
        "/dashboard" => section_view!("Dashboard", sections::or_else(
            "dashboard",
            sections::dashboard(store, now, thresholds),
            || sections::empty_dashboard(now),
        )),
        "/inventory" => section_view!("Inventory", sections::or_default(
            "inventory", sections::inventory(store, thresholds),
        )),
        "/medicines" => section_view!("Medicines", sections::or_default(
            "medicines", sections::medicines(store, now, thresholds),
        )),
        "/orders" => section_view!("Orders", sections::or_default(
            "orders", sections::orders(store, now, thresholds),
        )),
        "/suppliers" => section_view!("Suppliers", sections::or_default(
            "suppliers", sections::suppliers(store, now),
        )),
        "/reports" => section_view!("Reports", sections::or_default(
            "reports", sections::reports(store, thresholds),
        )),
        "/reports/create" => section_view!("New report", sections::or_default(
            "report candidates", sections::report_candidates(store, now, thresholds),
        )),
        "/orders/create" => {
            let choices = sections::or_default("order choices", sections::order_choices(store));
            respond_view(&choices, SectionPage::order_choices("New order", token, &choices), as_json)
        },
        _ => respond_404(),
    }
}

async fn handle_form(
    config: &Config,
    store: &dyn DocumentStore,
    request: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let (head, body) = request.into_parts();
    let body_bytes = match hyper::body::to_bytes(body).await {
        Ok(bb) => bb,
        Err(e) => {
            error!("failed to read request body: {}", e);
            return respond_500();
        },
    };
    let form = FormFields::parse(&body_bytes);
    let now = Utc::now();

    let (result, listing) = match head.uri.path() {
        "/medicines/add" => (forms::add_medicine(store, &form), "medicines"),
        "/orders/create" => (forms::create_order(store, &form, now), "orders"),
        "/suppliers/add" => (forms::add_supplier(store, &form, now), "suppliers"),
        "/reports/create" => (forms::create_report(store, &form, now), "reports"),
        _ => return respond_404(),
    };

    match result {
        Ok(id) => {
            info!("added document {:?} to {}", id, listing);
            respond_redirect(&config.base_url, listing, head.uri.query())
        },
        Err(FormError::Invalid(field)) => respond_400(&format!("invalid value for {:?}", field)),
        Err(FormError::Store(e)) => {
            error!("failed to store submission to {}: {}", head.uri.path(), e);
            respond_500()
        },
    }
}

async fn route(
    config: &Config,
    store: &dyn DocumentStore,
    request: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let uri_path = request.uri().path().to_owned();

    // unauthenticated endpoints first
    if uri_path == "/" {
        return respond_redirect(&config.base_url, "dashboard", request.uri().query());
    }

    // authentication starts here

    // check for token
    let query_str = match request.uri().query() {
        None => return respond_403(),
        Some(q) => q,
    };
    let query_kv: HashMap<String, String> = form_urlencoded::parse(query_str.as_bytes())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let token_matches = match query_kv.get("token") {
        None => false,
        Some(tv) => config.auth_tokens.iter().any(|t| t == tv),
    };
    if !token_matches {
        return respond_403();
    }

    // authenticated-only endpoints beyond this line

    match uri_path.as_str() {
        "/dashboard" | "/inventory" | "/medicines" | "/orders" | "/suppliers" | "/reports" => {
            if request.method() == Method::GET {
                handle_view(config, store, &uri_path, &query_kv)
            } else {
                respond_405("GET")
            }
        },
        "/orders/create" | "/reports/create" => {
            if request.method() == Method::GET {
                handle_view(config, store, &uri_path, &query_kv)
            } else if request.method() == Method::POST {
                handle_form(config, store, request).await
            } else {
                respond_405("GET, POST")
            }
        },
        "/medicines/add" | "/suppliers/add" => {
            if request.method() == Method::POST {
                handle_form(config, store, request).await
            } else {
                respond_405("POST")
            }
        },
        _ => respond_404(),
    }
}

async fn handle_request(request: Request<Body>) -> Result<Response<Body>, Infallible> {
    let config = CONFIG
        .get().expect("config is not set")
        .read().await
        .clone();
    let store = STORE.get().expect("store is not set");
    route(&config, store, request).await
}


fn load_config(config_path: &PathBuf) -> Result<Config, String> {
    let mut config_file = File::open(config_path)
        .map_err(|e| format!("failed to open config file {:?}: {}", config_path, e))?;
    let mut config_string = String::new();
    config_file.read_to_string(&mut config_string)
        .map_err(|e| format!("failed to read config file {:?}: {}", config_path, e))?;
    toml::from_str(&config_string)
        .map_err(|e| format!("failed to parse config file {:?}: {}", config_path, e))
}

/// Logs to stderr, or to a daily file under `log_dir`. Keep the guard alive to keep file logging.
fn init_logging(log_dir: Option<&str>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "pharmstats.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        },
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
            None
        },
    }
}

async fn perform() -> i32 {
    let args: Vec<OsString> = env::args_os().collect();
    if args.len() > 2 {
        eprintln!("Usage: {:?} [CONFIGPATH.toml]", args[0]);
        return 1;
    }
    let config_path: PathBuf = if args.len() > 1 {
        args[1].clone().into()
    } else {
        "config.toml".into()
    };

    // load config
    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(message) => {
            eprintln!("{}", message);
            return 1;
        },
    };

    let _log_guard = init_logging(config.log_dir.as_deref());

    let addr: SocketAddr = match config.listen_addr.parse() {
        Ok(a) => a,
        Err(e) => {
            error!("failed to parse listen address and port {:?}: {}", config.listen_addr, e);
            return 1;
        },
    };

    if let Err(_) = STORE.set(JsonFileStore::new(&config.data_path)) {
        error!("failed to set up the document store");
        return 1;
    }
    info!("serving documents from {:?}", config.data_path);

    if let Err(_) = CONFIG.set(RwLock::new(config)) {
        error!("failed to set initial config");
        return 1;
    }

    let make_service = make_service_fn(|_conn| async {
        Ok::<_, Infallible>(service_fn(handle_request))
    });
    let server = Server::bind(&addr).serve(make_service);
    info!("listening on {}", addr);
    if let Err(e) = server.await {
        error!("server error: {}", e);
    }

    0
}


#[tokio::main]
async fn main() {
    std::process::exit(perform().await)
}
