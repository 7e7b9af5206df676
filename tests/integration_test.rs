//! Tests de integración para el servidor HTTP
//! tests/integration_test.rs
//!
//! Cada test levanta su propio reactor en un puerto efímero con una raíz de
//! documentos temporal y habla con él por TCP.

use redunix_httpd::config::Config;
use redunix_httpd::server::Reactor;
use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Servidor corriendo en background sobre una raíz temporal
struct TestServer {
    addr: SocketAddr,
    root: tempfile::TempDir,
}

impl TestServer {
    fn start() -> Self {
        Self::start_with(|_| {})
    }

    fn start_with(tweak: impl FnOnce(&mut Config)) -> Self {
        let root = tempfile::tempdir().unwrap();
        populate(root.path());

        let mut config = Config {
            port: 0,
            document_root: root.path().to_path_buf(),
            host: "127.0.0.1".to_string(),
            workers: 4,
            request_timeout_secs: 3,
            cgi_budget_ms: 500,
            ..Config::default()
        };
        tweak(&mut config);

        let mut reactor = Reactor::bind(&config).unwrap();
        let addr = reactor.local_addr().unwrap();
        thread::spawn(move || reactor.run());

        Self { addr, root }
    }

    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream
    }
}

fn populate(root: &Path) {
    fs::write(root.join("index.html"), "<h1>home</h1>").unwrap();
    fs::write(root.join("notes.txt"), "some notes\n").unwrap();
    let binary: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(root.join("image.png"), binary).unwrap();

    fs::create_dir(root.join("docs")).unwrap();
    fs::write(root.join("docs/index.html"), "<h1>docs</h1>").unwrap();

    script(root, "echo.cgi", "cat");
    script(root, "upper.cgi", "tr a-z A-Z");
    script(root, "hang.cgi", "exec sleep 30");
    script(root, "slow.cgi", "sleep 2\necho ok");
}

fn script(root: &Path, name: &str, body: &str) {
    let path = root.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Lee una respuesta completa usando `Content-length`
fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "connection closed before headers");
        raw.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8(raw[..head_end].to_vec()).unwrap();
    let len: usize = head
        .lines()
        .find_map(|l| l.strip_prefix("Content-length: "))
        .unwrap()
        .parse()
        .unwrap();

    let mut body = raw[head_end..].to_vec();
    while body.len() < len {
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "connection closed before body");
        body.extend_from_slice(&buf[..n]);
    }
    (head, body)
}

/// Un request que cierra la conexión: devuelve todo lo recibido
fn exchange(server: &TestServer, request: &[u8]) -> String {
    let mut stream = server.connect();
    stream.write_all(request).unwrap();
    let mut out = Vec::new();
    let _ = stream.read_to_end(&mut out);
    String::from_utf8_lossy(&out).into_owned()
}

/// El servidor cerró la conexión sin enviar nada
fn assert_closed_silently(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    match stream.read(&mut buf) {
        Ok(n) => assert_eq!(n, 0, "unexpected response"),
        Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
    }
}

#[test]
fn test_get_static_file() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream.write_all(b"GET /image.png HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
    let (head, body) = read_response(&mut stream);

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "got: {}", head);
    assert!(head.contains("Content-type: image/png\r\n"));
    assert!(head.contains("Server: RedUnix/1.1\r\n"));
    assert_eq!(body, fs::read(server.root.path().join("image.png")).unwrap());
}

#[test]
fn test_head_has_no_body() {
    let server = TestServer::start();
    let response = exchange(&server, b"HEAD /notes.txt HTTP/1.0\r\n\r\n");

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-length: 11\r\n"));
    assert!(response.contains("Connection: Close\r\n"));
    assert!(response.ends_with("\r\n\r\n"));
}

#[test]
fn test_directory_index() {
    let server = TestServer::start();

    let response = exchange(&server, b"GET / HTTP/1.0\r\n\r\n");
    assert!(response.ends_with("<h1>home</h1>"), "got: {}", response);

    let response = exchange(&server, b"GET /docs?page=2 HTTP/1.0\r\n\r\n");
    assert!(response.contains("Content-type: text/html\r\n"));
    assert!(response.ends_with("<h1>docs</h1>"));
}

#[test]
fn test_traversal_is_not_found() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream.write_all(b"GET /../../../../etc/passwd HTTP/1.0\r\n\r\n").unwrap();
    let (head, body) = read_response(&mut stream);
    let body = String::from_utf8(body).unwrap();

    assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"), "got: {}", head);
    assert!(body.contains("<title>404 Not Found</title>"));
    assert!(!body.contains("root:"));
}

#[test]
fn test_error_statuses() {
    let server = TestServer::start();

    let cases: [(&[u8], &str); 4] = [
        (b"PUT /notes.txt HTTP/1.0\r\n\r\n", "501 Not Implemented"),
        (b"GET /notes.txt HTTP/0.9\r\n\r\n", "505 HTTP Version Not Supported"),
        (b"GET /missing.txt HTTP/1.0\r\n\r\n", "404 Not Found"),
        (b"GET /notes.txt HTTP/1.0\r\nbroken header\r\n\r\n", "400 Bad Request"),
    ];

    for (request, status) in cases {
        let mut stream = server.connect();
        stream.write_all(request).unwrap();
        let (head, body) = read_response(&mut stream);
        assert!(head.starts_with(&format!("HTTP/1.1 {}\r\n", status)), "got: {}", head);
        assert!(String::from_utf8(body).unwrap().contains(status));
    }
}

#[test]
fn test_post_without_length() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream.write_all(b"POST /echo.cgi HTTP/1.1\r\n\r\n").unwrap();
    let (head, _) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 411 Length Required\r\n"));
}

#[test]
fn test_request_split_across_writes() {
    let server = TestServer::start();
    let mut stream = server.connect();

    for piece in [&b"GET /note"[..], b"s.txt HTTP/1.1\r\nHo", b"st: x\r\n", b"\r\n"] {
        stream.write_all(piece).unwrap();
        thread::sleep(Duration::from_millis(30));
    }

    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"some notes\n");
}

#[test]
fn test_keep_alive_pipelined_requests() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"GET /notes.txt HTTP/1.1\r\n\r\nGET /index.html HTTP/1.1\r\n\r\n")
        .unwrap();

    let (head, body) = read_response(&mut stream);
    assert!(head.contains("Connection: Keep-Alive\r\n"));
    assert!(head.contains("Keep-Alive: timeout=3, max="));
    assert_eq!(body, b"some notes\n");

    let (_, body) = read_response(&mut stream);
    assert_eq!(body, b"<h1>home</h1>");

    // La conexión sigue abierta para un tercer request
    stream.write_all(b"GET /notes.txt HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
    let (head, _) = read_response(&mut stream);
    assert!(head.contains("Connection: Close\r\n"));
    assert_closed_silently(&mut stream);
}

#[test]
fn test_cgi_echo() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"POST /upper.cgi HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello world")
        .unwrap();
    let (head, body) = read_response(&mut stream);

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "got: {}", head);
    assert!(head.contains("Content-type: text/plain\r\n"));
    assert_eq!(body, b"HELLO WORLD");
}

#[test]
fn test_cgi_timeout_is_internal_error() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"POST /hang.cgi HTTP/1.1\r\nContent-Length: 0\r\n\r\n")
        .unwrap();
    let (head, _) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "got: {}", head);
}

#[test]
fn test_no_idle_timeout_while_processing() {
    let server = TestServer::start_with(|config| {
        config.request_timeout_secs = 1;
        config.cgi_budget_ms = 3000;
    });
    let mut stream = server.connect();

    // El CGI tarda más que el timeout de inactividad
    stream
        .write_all(b"POST /slow.cgi HTTP/1.1\r\nContent-Length: 0\r\n\r\n")
        .unwrap();
    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "got: {}", head);
    assert_eq!(body, b"ok\n");

    // La conexión sigue viva para el próximo request
    stream.write_all(b"GET /notes.txt HTTP/1.1\r\n\r\n").unwrap();
    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"some notes\n");
}

#[test]
fn test_cgi_large_body_round_trip() {
    let server = TestServer::start_with(|config| {
        config.cgi_budget_ms = 5000;
        // El body llega en muchas lecturas parciales
        config.max_again = 10_000;
    });
    let mut stream = server.connect();
    let body: Vec<u8> = (0..300_000u32).map(|i| b'a' + (i % 26) as u8).collect();

    let head = format!("POST /echo.cgi HTTP/1.1\r\nContent-Length: {}\r\n\r\n", body.len());
    stream.write_all(head.as_bytes()).unwrap();
    stream.write_all(&body).unwrap();

    let (head, echoed) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "got: {}", head);
    assert!(echoed == body);
}

#[test]
fn test_incomplete_body_exhausts_retries() {
    let server = TestServer::start_with(|config| config.max_again = 3);
    let mut stream = server.connect();

    stream
        .write_all(b"POST /echo.cgi HTTP/1.1\r\nContent-Length: 100\r\n\r\n")
        .unwrap();
    for _ in 0..3 {
        thread::sleep(Duration::from_millis(50));
        stream.write_all(b"x").unwrap();
    }

    assert_closed_silently(&mut stream);
}

#[test]
fn test_idle_timeout_closes_connection() {
    let server = TestServer::start_with(|config| config.request_timeout_secs = 1);
    let mut stream = server.connect();

    stream.write_all(b"GET /notes.txt HTTP/1.1\r\n").unwrap();
    assert_closed_silently(&mut stream);
}

#[test]
fn test_concurrent_clients() {
    let server = TestServer::start();
    let addr = server.addr;

    let handles: Vec<_> = (0..16)
        .map(|_| {
            thread::spawn(move || {
                let mut stream = TcpStream::connect(addr).unwrap();
                stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
                stream.write_all(b"GET /notes.txt HTTP/1.1\r\n\r\n").unwrap();
                read_response(&mut stream).1
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), b"some notes\n");
    }
}
