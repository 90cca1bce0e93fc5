//! Incoming request parsing and route classification

use std::collections::HashMap;
use std::io::{self, BufRead};

use crate::error::RequestError;

/// Form field carrying the submitted script
pub const CODE_FIELD: &str = "code";

/// Upper bound on the request line plus all header lines, terminators included
pub const MAX_HEAD_BYTES: usize = 16 * 1024;

/// The three things a request can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `/exit`: acknowledge, then stop listening
    Exit,
    /// `/healthz`: acknowledge only
    Health,
    /// Anything else: echo and execute the submitted script
    Submit,
}

impl Route {
    /// Exact, case-sensitive match on the full request target (path plus query).
    /// There is no 404: every unrecognised target is a submission.
    pub fn classify(target: &str) -> Self {
        match target {
            "/exit" => Route::Exit,
            "/healthz" => Route::Health,
            _ => Route::Submit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Exit => "exit",
            Route::Health => "healthz",
            Route::Submit => "submit",
        }
    }
}

/// One parsed HTTP request, alive only while its connection is being handled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingRequest {
    pub method: String,
    /// Request target as sent, query string included
    pub path: String,
    /// Header names are lowercased
    pub headers: HashMap<String, String>,
    /// Decoded `application/x-www-form-urlencoded` body. First occurrence of a name wins.
    pub form_fields: HashMap<String, String>,
}

impl IncomingRequest {
    /// Read the request line, headers and (if `Content-Length` says so) the body.
    pub fn read_from<R: BufRead>(reader: &mut R, max_body_bytes: usize) -> Result<Self, RequestError> {
        let mut head_budget = MAX_HEAD_BYTES;

        let request_line = read_head_line(reader, &mut head_budget)?;
        let request_line = request_line.trim();

        let mut parts = request_line.split_whitespace();
        let (method, path) = match (parts.next(), parts.next()) {
            (Some(method), Some(path)) => (method.to_string(), path.to_string()),
            _ => return Err(RequestError::MalformedRequestLine(request_line.to_string())),
        };

        let mut headers = HashMap::new();
        loop {
            let line = read_head_line(reader, &mut head_budget)?;
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                headers.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }

        let content_length = match headers.get("content-length") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| RequestError::InvalidContentLength(raw.clone()))?,
            None => 0,
        };
        if content_length > max_body_bytes {
            return Err(RequestError::BodyTooLarge {
                length: content_length,
                limit: max_body_bytes,
            });
        }

        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body)?;

        Ok(Self {
            method,
            path,
            headers,
            form_fields: parse_form(&body),
        })
    }

    pub fn route(&self) -> Route {
        Route::classify(&self.path)
    }

    pub fn form_field(&self, name: &str) -> Option<&str> {
        self.form_fields.get(name).map(String::as_str)
    }

    /// The submitted script, or an empty string when there is none
    pub fn code(&self) -> String {
        self.form_field(CODE_FIELD).unwrap_or_default().to_string()
    }
}

/// Read one head line, charging it against what is left of [`MAX_HEAD_BYTES`].
/// Returns an empty string at end of input.
fn read_head_line<R: BufRead>(reader: &mut R, budget: &mut usize) -> Result<String, RequestError> {
    let too_large = RequestError::HeadTooLarge {
        limit: MAX_HEAD_BYTES,
    };
    if *budget == 0 {
        return Err(too_large);
    }

    let mut line = String::new();
    let read = io::Read::take(&mut *reader, *budget as u64).read_line(&mut line)?;
    *budget -= read;
    if *budget == 0 && !line.ends_with('\n') {
        return Err(too_large);
    }
    Ok(line)
}

/// Decode a form-urlencoded body (`+` is a space, invalid UTF-8 is replaced)
pub fn parse_form(body: &[u8]) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for (name, value) in url::form_urlencoded::parse(body) {
        fields
            .entry(name.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    fields
}
