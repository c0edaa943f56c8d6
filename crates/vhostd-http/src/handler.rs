//! Static request dispatch
//!
//! Turns one parsed request plus the owning virtual host's configuration
//! into a response, synchronously. Resolution order: location match,
//! configured redirect, method gate, traversal check, then the
//! filesystem. Every error status goes through [`status::build_response`]
//! so configured error pages apply uniformly.

use std::fs;
use std::io;
use std::path::Path;

use vhostd_core::config::{LocationConfig, ServerConfig};

use crate::request::Request;
use crate::response::Response;
use crate::status;

/// Handle a complete request.
pub fn handle(req: &Request, config: &ServerConfig) -> Response {
    let location = config
        .location_for(&req.path)
        .map(|loc| loc.effective(config))
        .unwrap_or_else(|| LocationConfig::root_fallback(config));

    // Configured redirect wins before anything touches the filesystem.
    if let Some((&code, target)) = location.redirects.iter().next() {
        let mut resp = Response::new(code);
        resp.set_header("Location", target);
        return resp;
    }

    if !location.allowed_methods.is_empty()
        && !location.allowed_methods.iter().any(|m| m == &req.method)
    {
        let mut resp = status::build_response(config, 405);
        resp.set_header("Allow", &location.allowed_methods.join(", "));
        return resp;
    }

    if req.path.split('/').any(|segment| segment == "..") {
        return status::build_response(config, 403);
    }

    let root = location.root.clone().unwrap_or_else(|| config.root.clone());
    let target = root.join(req.path.trim_start_matches('/'));

    match req.method.as_str() {
        "GET" | "POST" => serve_target(req, config, &location, &target),
        "DELETE" => delete_target(config, &target),
        _ => status::build_response(config, 405),
    }
}

fn serve_target(
    req: &Request,
    config: &ServerConfig,
    location: &LocationConfig,
    target: &Path,
) -> Response {
    match fs::metadata(target) {
        Ok(meta) if meta.is_dir() => serve_directory(req, config, location, target),
        Ok(_) => serve_file(config, target),
        Err(e) => status::build_response(config, status_for_io(&e)),
    }
}

fn serve_directory(
    req: &Request,
    config: &ServerConfig,
    location: &LocationConfig,
    dir: &Path,
) -> Response {
    for index in &location.indexes {
        let candidate = dir.join(index);
        if candidate.is_file() {
            return serve_file(config, &candidate);
        }
    }
    if location.autoindex {
        return autoindex_page(config, dir, &req.path);
    }
    status::build_response(config, 403)
}

fn serve_file(config: &ServerConfig, path: &Path) -> Response {
    match fs::read(path) {
        Ok(body) => Response::with_body(200, content_type_for(path), body),
        Err(e) => status::build_response(config, status_for_io(&e)),
    }
}

fn delete_target(config: &ServerConfig, target: &Path) -> Response {
    match fs::metadata(target) {
        Err(e) => status::build_response(config, status_for_io(&e)),
        Ok(meta) if meta.is_dir() => status::build_response(config, 403),
        Ok(_) => match fs::remove_file(target) {
            Ok(()) => Response::new(204),
            Err(_) => status::build_response(config, 403),
        },
    }
}

/// Generated directory listing, sorted by name.
fn autoindex_page(config: &ServerConfig, dir: &Path, uri: &str) -> Response {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => return status::build_response(config, status_for_io(&e)),
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| {
            let mut name = e.file_name().to_string_lossy().into_owned();
            if e.path().is_dir() {
                name.push('/');
            }
            name
        })
        .collect();
    names.sort();

    let base = uri.trim_end_matches('/');
    let mut body = format!(
        "<html>\r\n<head><title>Index of {uri}</title></head>\r\n\
         <body>\r\n<h1>Index of {uri}</h1>\r\n<hr><ul>\r\n"
    );
    for name in &names {
        body.push_str(&format!("<li><a href=\"{base}/{name}\">{name}</a></li>\r\n"));
    }
    body.push_str("</ul><hr>\r\n</body>\r\n</html>\r\n");

    Response::with_body(200, "text/html", body.into_bytes())
}

fn status_for_io(e: &io::Error) -> u16 {
    match e.kind() {
        io::ErrorKind::NotFound => 404,
        io::ErrorKind::PermissionDenied => 403,
        _ => 500,
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn site_root(tag: &str) -> PathBuf {
        let seq = DIR_SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "vhostd-handler-{}-{}-{}",
            tag,
            std::process::id(),
            seq
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config_with_root(root: &Path) -> ServerConfig {
        ServerConfig { root: root.to_path_buf(), ..ServerConfig::default() }
    }

    fn get(path: &str) -> Request {
        Request::new(format!("GET {} HTTP/1.1\r\n\r\n", path).as_bytes())
    }

    #[test]
    fn serves_existing_file_with_content_type() {
        let root = site_root("file");
        fs::write(root.join("page.html"), "<p>hi</p>").unwrap();
        let config = config_with_root(&root);

        let resp = handle(&get("/page.html"), &config);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"<p>hi</p>");
        assert!(resp.headers.iter().any(|(n, v)| n == "Content-Type" && v == "text/html"));

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn missing_file_is_404() {
        let root = site_root("missing");
        let config = config_with_root(&root);
        assert_eq!(handle(&get("/absent.txt"), &config).status, 404);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn directory_uses_index_file() {
        let root = site_root("index");
        fs::write(root.join("index.html"), "home").unwrap();
        let config = config_with_root(&root);

        let resp = handle(&get("/"), &config);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"home");
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn directory_without_index_or_autoindex_is_403() {
        let root = site_root("noindex");
        let config = config_with_root(&root);
        assert_eq!(handle(&get("/"), &config).status, 403);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn autoindex_lists_entries() {
        let root = site_root("listing");
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();
        let mut config = config_with_root(&root);
        let mut loc = LocationConfig::new("/");
        loc.autoindex = true;
        loc.indexes = vec!["nonexistent.html".to_string()];
        config.locations.push(loc);

        let resp = handle(&get("/"), &config);
        assert_eq!(resp.status, 200);
        let body = String::from_utf8_lossy(&resp.body).into_owned();
        assert!(body.contains("a.txt"));
        assert!(body.contains("b.txt"));
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn method_gate_returns_405_with_allow() {
        let root = site_root("gate");
        let mut config = config_with_root(&root);
        let mut loc = LocationConfig::new("/");
        loc.allowed_methods = vec!["GET".to_string()];
        config.locations.push(loc);

        let req = Request::new(b"POST / HTTP/1.1\r\n\r\n");
        let resp = handle(&req, &config);
        assert_eq!(resp.status, 405);
        assert!(resp.headers.iter().any(|(n, v)| n == "Allow" && v == "GET"));
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn traversal_rejected() {
        let root = site_root("traversal");
        let config = config_with_root(&root);
        assert_eq!(handle(&get("/../etc/passwd"), &config).status, 403);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn redirect_wins_over_filesystem() {
        let root = site_root("redirect");
        let mut config = config_with_root(&root);
        let mut loc = LocationConfig::new("/old");
        loc.redirects.insert(301, "/new".to_string());
        config.locations.push(loc);

        let resp = handle(&get("/old/page"), &config);
        assert_eq!(resp.status, 301);
        assert!(resp.headers.iter().any(|(n, v)| n == "Location" && v == "/new"));
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn delete_removes_file() {
        let root = site_root("delete");
        let victim = root.join("victim.txt");
        fs::write(&victim, "bye").unwrap();
        let config = config_with_root(&root);

        let req = Request::new(b"DELETE /victim.txt HTTP/1.1\r\n\r\n");
        assert_eq!(handle(&req, &config).status, 204);
        assert!(!victim.exists());

        // Gone now, so a second delete is 404
        assert_eq!(handle(&req, &config).status, 404);

        // Directories are refused
        let req = Request::new(b"DELETE / HTTP/1.1\r\n\r\n");
        assert_eq!(handle(&req, &config).status, 403);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn unknown_method_is_405() {
        let root = site_root("unknown");
        let config = config_with_root(&root);
        let req = Request::new(b"PATCH / HTTP/1.1\r\n\r\n");
        assert_eq!(handle(&req, &config).status, 405);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn location_root_overrides_server_root() {
        let server_root = site_root("sroot");
        let loc_root = site_root("lroot");

        let mut config = config_with_root(&server_root);
        let mut loc = LocationConfig::new("/api");
        loc.root = Some(loc_root.clone());
        config.locations.push(loc);

        // Path resolution keeps the full URI below the location root
        fs::create_dir_all(loc_root.join("api")).unwrap();
        fs::write(loc_root.join("api/data.json"), "{\"ok\":true}").unwrap();
        let resp = handle(&get("/api/data.json"), &config);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"{\"ok\":true}");

        fs::remove_dir_all(&server_root).ok();
        fs::remove_dir_all(&loc_root).ok();
    }
}
