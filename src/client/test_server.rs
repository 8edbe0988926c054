//! Loopback WHOIS servers for exercising the client in tests

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Server that answers one query with a fixed reply and then closes
pub(crate) struct Responder {
    pub port: u16,
    handle: JoinHandle<Vec<u8>>,
}

impl Responder {
    /// Bytes the client sent, once the exchange is over
    pub fn request(self) -> Vec<u8> {
        self.handle.join().unwrap()
    }
}

/// Server that accepts one connection, optionally writes a prefix, then holds
/// the connection open without closing it until dropped
pub(crate) struct Staller {
    pub port: u16,
    _release: mpsc::Sender<()>,
}

pub(crate) fn spawn_responder(reply: &'static [u8]) -> Responder {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        stream.write_all(reply).unwrap();
        request
    });

    Responder { port, handle }
}

/// Responder that only starts listening after `delay`, so earlier connect
/// attempts are refused
pub(crate) fn spawn_late_responder(delay: Duration, reply: &'static [u8]) -> Responder {
    let port = refused_port();

    let handle = thread::spawn(move || {
        thread::sleep(delay);
        let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        stream.write_all(reply).unwrap();
        request
    });

    Responder { port, handle }
}

pub(crate) fn spawn_staller(prefix: &'static [u8]) -> Staller {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (release, wait) = mpsc::channel::<()>();

    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        read_request(&mut stream);
        if !prefix.is_empty() {
            let _ = stream.write_all(prefix);
        }
        // Returns once the sender is dropped
        let _ = wait.recv();
    });

    Staller {
        port,
        _release: release,
    }
}

/// A port nothing is listening on
pub(crate) fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let mut request = Vec::new();
    let mut buffer = [0u8; 256];
    loop {
        match stream.read(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                request.extend_from_slice(&buffer[..n]);
                if request.ends_with(b"\r\n") {
                    break;
                }
            }
        }
    }
    request
}
