//! Test-only collaborators for driving the gateway and sequencer offline.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use crate::error::ServiceError;
use crate::gateway::{BackoffPolicy, CompletionGateway, CompletionSettings, Sleeper};
use crate::io::completion::{
    CompletionChoice, CompletionRequest, CompletionResponse, CompletionService,
};

/// Completion service that replays queued results and captures every request.
///
/// Once the script runs out, further calls fail with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedService {
    script: RefCell<VecDeque<Result<String, ServiceError>>>,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedService {
    pub fn new(script: Vec<Result<String, ServiceError>>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Script of successful completions only.
    pub fn texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(texts.into_iter().map(|text| Ok(text.to_string())).collect())
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.prompt.clone())
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.script.borrow().len()
    }
}

impl CompletionService for ScriptedService {
    fn create(&self, request: &CompletionRequest) -> Result<CompletionResponse, ServiceError> {
        self.requests.borrow_mut().push(request.clone());
        let next = self
            .script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::Transport("script exhausted".to_string())));
        next.map(|text| CompletionResponse {
            choices: vec![CompletionChoice { text }],
        })
    }
}

/// Sleeper that records requested delays instead of blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.borrow_mut().push(duration);
    }
}

/// Gateway over a scripted service with default settings and a recording sleeper.
pub fn scripted_gateway(
    service: ScriptedService,
) -> CompletionGateway<ScriptedService, RecordingSleeper> {
    CompletionGateway::with_sleeper(
        service,
        CompletionSettings::default(),
        BackoffPolicy::default(),
        RecordingSleeper::default(),
    )
}

/// One canned HTTP reply, e.g. `("429 Too Many Requests", body)`.
pub type CannedReply = (&'static str, String);

/// Loopback HTTP server answering a fixed sequence of requests, one per
/// connection, in order.
pub struct LoopbackServer {
    base_url: String,
    handle: thread::JoinHandle<Vec<String>>,
}

impl LoopbackServer {
    pub fn serve(replies: Vec<CannedReply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("loopback addr");
        let handle = thread::spawn(move || {
            replies
                .into_iter()
                .map(|(status_line, body)| {
                    let (stream, _) = listener.accept().expect("accept");
                    answer(stream, status_line, &body)
                })
                .collect()
        });
        Self {
            base_url: format!("http://{addr}/v1/"),
            handle,
        }
    }

    /// API root to put in `base_url`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Wait until every reply was served; returns the request bodies.
    pub fn finish(self) -> Vec<String> {
        self.handle.join().expect("loopback server")
    }
}

/// JSON body of a successful completion with a single choice.
pub fn completion_body(text: &str) -> String {
    serde_json::json!({ "choices": [{ "text": text }] }).to_string()
}

fn answer(stream: std::net::TcpStream, status_line: &str, body: &str) -> String {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read header");
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().expect("content length");
            }
        }
    }
    let mut request_body = vec![0u8; content_length];
    reader.read_exact(&mut request_body).expect("read body");

    let mut stream = stream;
    let response = format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).expect("write response");
    String::from_utf8(request_body).expect("utf8 body")
}
