//! Status codes and error-page construction

use std::fs;

use vhostd_core::config::ServerConfig;
use vhostd_core::log_warn;

use crate::response::Response;

/// Reason phrase for a status code.
pub fn reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        505 => "HTTP Version Not Supported",
        _ => "Unknown Status",
    }
}

/// Build the response for a status code, honoring any `error_page`
/// directive. An unreadable configured page falls back to the built-in
/// body rather than failing the response.
pub fn build_response(config: &ServerConfig, code: u16) -> Response {
    if let Some(page) = config.error_pages.get(&code) {
        let path = if page.is_absolute() {
            page.clone()
        } else {
            let rel = page.strip_prefix("/").unwrap_or(page.as_path());
            config.root.join(rel)
        };
        match fs::read(&path) {
            Ok(body) => return Response::with_body(code, "text/html", body),
            Err(_) => {
                log_warn!("error page {} for status {} unreadable, using built-in", path.display(), code);
            }
        }
    }
    Response::with_body(code, "text/html", builtin_page(code).into_bytes())
}

fn builtin_page(code: u16) -> String {
    let reason = reason(code);
    format!(
        "<html>\r\n<head><title>{code} {reason}</title></head>\r\n\
         <body>\r\n<center><h1>{code} {reason}</h1></center>\r\n\
         <hr><center>vhostd</center>\r\n</body>\r\n</html>\r\n"
    )
}
