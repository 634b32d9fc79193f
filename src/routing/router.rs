//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Apply the dispatch order: malformed → body limit → route match →
//!   method check → redirect → CGI → upload → delete → static → 501
//! - Return either a finished response or a deferred CGI job
//!
//! # Design Decisions
//! - Pure decision over (request, resolved host); no I/O before a handler runs
//! - CGI is the only deferred action: the connection task awaits the gateway
//! - Every error status consults the host's error_pages overrides

use std::sync::Arc;

use crate::config::{Route, VirtualHost};
use crate::handlers;
use crate::http::response::{error_response, redirect_response, Response};
use crate::http::Request;
use crate::routing::matcher;

/// Outcome of routing a request.
pub enum Dispatch {
    /// Response ready to write.
    Reply(Response),
    /// The CGI gateway must run; the connection awaits its future.
    Cgi(Route),
}

/// Route a parsed request against its resolved virtual host.
pub fn dispatch(request: &Request, host: &Arc<VirtualHost>) -> Dispatch {
    if request.method.is_empty() || request.path.is_empty() {
        return Dispatch::Reply(error_response(400, "invalid HTTP request", Some(host)));
    }

    // The parser enforced this while reading, but a route-level recheck keeps
    // the limit authoritative even for bodies spooled by earlier middleware.
    if request.body_len > host.client_max_body_size {
        return Dispatch::Reply(error_response(413, "request body too large", Some(host)));
    }

    let path = matcher::strip_query(&request.path);

    let route = match matcher::match_route(&host.routes, path) {
        Some(route) => route,
        None => {
            return Dispatch::Reply(error_response(404, "no matching route", Some(host)));
        }
    };

    if !route.allows_method(&request.method) {
        return Dispatch::Reply(error_response(
            405,
            "method not allowed for this route",
            Some(host),
        ));
    }

    if let Some(redirect) = &route.redirect {
        return Dispatch::Reply(redirect_response(redirect.code, &redirect.location));
    }

    if route.cgi.is_some() {
        return Dispatch::Cgi(route.clone());
    }

    if request.method == "POST" && route.upload_dir.is_some() {
        return Dispatch::Reply(handlers::upload::handle(request, route, host));
    }

    if request.method == "DELETE" {
        return Dispatch::Reply(handlers::delete::handle(request, route, host));
    }

    if request.method == "GET" && route.root.is_some() {
        return Dispatch::Reply(handlers::static_files::handle(request, route, host));
    }

    Dispatch::Reply(error_response(501, "no handler for this request", Some(host)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Redirect;
    use std::collections::HashMap;

    fn request(method: &str, path: &str) -> Request {
        Request {
            method: method.to_string(),
            path: path.to_string(),
            version: "HTTP/1.1".to_string(),
            headers: HashMap::new(),
            host: None,
            body: None,
            body_len: 0,
            chunked: false,
        }
    }

    fn host_with_routes(routes: Vec<Route>) -> Arc<VirtualHost> {
        Arc::new(VirtualHost {
            name: "test.local".to_string(),
            host: "127.0.0.1".to_string(),
            ports: vec![8080],
            default_server: true,
            client_max_body_size: 1024,
            error_pages: Default::default(),
            routes,
        })
    }

    fn route(path: &str) -> Route {
        Route {
            path: path.to_string(),
            root: None,
            methods: None,
            index: None,
            directory_listing: false,
            upload_dir: None,
            cgi: None,
            redirect: None,
        }
    }

    fn status_of(dispatch: Dispatch) -> u16 {
        match dispatch {
            Dispatch::Reply(r) => r.status(),
            Dispatch::Cgi(_) => panic!("expected a reply"),
        }
    }

    #[test]
    fn no_route_is_404() {
        let host = host_with_routes(vec![route("/only")]);
        assert_eq!(status_of(dispatch(&request("GET", "/other"), &host)), 404);
    }

    #[test]
    fn method_restriction_is_405() {
        let mut r = route("/api");
        r.methods = Some(vec!["GET".to_string()]);
        let host = host_with_routes(vec![r]);
        assert_eq!(status_of(dispatch(&request("POST", "/api/x"), &host)), 405);
    }

    #[test]
    fn redirect_takes_priority() {
        let mut r = route("/old");
        r.redirect = Some(Redirect {
            code: 301,
            location: "/new".to_string(),
        });
        // Redirect wins even though the route also has CGI configured.
        r.cgi = Some(crate::config::CgiConfig {
            extension: ".py".to_string(),
            interpreter: "python3".to_string(),
        });
        let host = host_with_routes(vec![r]);
        match dispatch(&request("GET", "/old"), &host) {
            Dispatch::Reply(res) => {
                assert_eq!(res.status(), 301);
                assert_eq!(res.header("Location"), Some("/new"));
            }
            Dispatch::Cgi(_) => panic!("redirect must win over CGI"),
        }
    }

    #[test]
    fn cgi_route_is_deferred() {
        let mut r = route("/cgi-bin");
        r.root = Some("/site".to_string());
        r.cgi = Some(crate::config::CgiConfig {
            extension: ".py".to_string(),
            interpreter: "python3".to_string(),
        });
        let host = host_with_routes(vec![r]);
        assert!(matches!(
            dispatch(&request("GET", "/cgi-bin/t.py?x=1"), &host),
            Dispatch::Cgi(_)
        ));
    }

    #[test]
    fn oversized_body_is_413() {
        let host = host_with_routes(vec![route("/")]);
        let mut req = request("POST", "/");
        req.body_len = 4096;
        assert_eq!(status_of(dispatch(&req, &host)), 413);
    }

    #[test]
    fn query_string_ignored_for_matching() {
        let host = host_with_routes(vec![route("/only")]);
        // Would be 404 if the query string were part of the match.
        let d = dispatch(&request("GET", "/only?x=1"), &host);
        assert_ne!(status_of(d), 404);
    }

    #[test]
    fn unhandled_combination_is_501() {
        let host = host_with_routes(vec![route("/")]);
        assert_eq!(status_of(dispatch(&request("PATCH", "/x"), &host)), 501);
    }
}
