//! Response building
//!
//! Two fixed response shapes go back to the browser:
//! - the status envelope used by `/exit` and `/healthz`
//! - the HTML confirmation page served for every submitted script
//!
//! Neither performs any escaping. Calling scripts rely on the byte-exact envelope,
//! so a `msg` or `data` containing `"` produces text that is not valid JSON, and a
//! submitted script containing `</textarea>` is embedded as-is.

use std::fmt;
use std::io::Write;

/// Placeholder replaced with the listening port
pub const PORT_PLACEHOLDER: &str = "{{PORT}}";

/// Placeholder replaced with the submitted source text
pub const REQUEST_PLACEHOLDER: &str = "{{REQUEST}}";

/// The page sent back after every script submission.
pub const CONFIRMATION_PAGE_TEMPLATE: &str = r#"
<!DOCTYPE HTML PUBLIC "-//W3C//DTD HTML 4.0 Transitional//EN">
<html>
	<head>
		<title>Script Web Server</title>
	</head>
	<body>
    <h1>Welcome to the script web server</h1>
    <p>Type in your script here:</p>
    <form action="http://localhost:{{PORT}}/" method="post">
        <textarea rows="4" cols="50" name="code">
-- Some sample script
sphere radius:5 pos:[0, 0, 0]
sphere radius:5 pos:[10, 20, 0]
sphere radius:5 pos:[20, 0, 0]
sphere radius:5 pos:[10, 10, 20]
        </textarea>
        <input type="submit" value="Submit">
    </form>
    <form action="http://localhost:{{PORT}}/exit">
        <input type="submit" value="Kill web server">
    </form>
    <p>Your previous request was:</p>
    <p>
        <textarea rows="4" cols="50">
{{REQUEST}}
        </textarea>
    </p>
	</body>
</html>"#;

/// Status text sent by `/exit`
pub const SHUTDOWN_MESSAGE: &str = "Shutting down!";

/// Status text sent by `/healthz`
pub const HEALTHY_MESSAGE: &str = "The service is healthy";

/// The `{errcode, msg, data: {res}}` status envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub errcode: i32,
    pub msg: String,
    pub res: String,
}

impl ResponseEnvelope {
    pub fn new(errcode: i32, msg: impl Into<String>, res: impl Into<String>) -> Self {
        Self {
            errcode,
            msg: msg.into(),
            res: res.into(),
        }
    }

    /// Successful envelope carrying `res`
    pub fn success(res: impl Into<String>) -> Self {
        Self::new(0, "success", res)
    }
}

impl fmt::Display for ResponseEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"{{"errcode":{},"msg":"{}","data":{{"res":"{}"}}}}"#,
            self.errcode, self.msg, self.res
        )
    }
}

/// Render the status envelope as text. Fields are interpolated verbatim.
pub fn build_status(code: i32, msg: &str, data: &str) -> String {
    ResponseEnvelope::new(code, msg, data).to_string()
}

/// Fill the confirmation page with the port and the submitted source.
///
/// The port goes in first, so a `{{PORT}}` inside the submitted source survives untouched.
pub fn build_confirmation_page(port: &str, source_text: &str) -> String {
    CONFIRMATION_PAGE_TEMPLATE
        .replace(PORT_PLACEHOLDER, port)
        .replace(REQUEST_PLACEHOLDER, source_text)
}

/// Minimal HTTP/1.1 response: status line, content headers, body, then close
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpResponse {
    pub fn envelope(envelope: &ResponseEnvelope) -> Self {
        Self {
            status: 200,
            reason: "OK",
            content_type: "application/json; charset=utf-8",
            body: envelope.to_string(),
        }
    }

    pub fn html(body: String) -> Self {
        Self {
            status: 200,
            reason: "OK",
            content_type: "text/html; charset=utf-8",
            body,
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self {
            status: 400,
            reason: "Bad Request",
            content_type: "text/plain; charset=utf-8",
            body: message.to_string(),
        }
    }

    /// Serialize to wire bytes. `Content-Length` is the UTF-8 byte length of the body.
    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {}",
            self.status,
            self.reason,
            self.content_type,
            self.body.len(),
            self.body
        )
        .into_bytes()
    }
}

/// Write a response and flush it. The caller closes the connection afterwards.
pub fn write_response<W: Write>(stream: &mut W, response: &HttpResponse) -> std::io::Result<()> {
    stream.write_all(&response.to_bytes())?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_status_exact_bytes() {
        assert_eq!(
            build_status(0, "success", "healthy"),
            r#"{"errcode":0,"msg":"success","data":{"res":"healthy"}}"#
        );
    }

    #[test]
    fn test_build_status_negative_code() {
        assert_eq!(
            build_status(-1, "error", "boom"),
            r#"{"errcode":-1,"msg":"error","data":{"res":"boom"}}"#
        );
    }

    // Quotes are interpolated unescaped, so this output is deliberately not valid JSON.
    #[test]
    fn test_build_status_does_not_escape_quotes() {
        let text = build_status(0, "say \"hi\"", "a\"b");
        assert_eq!(
            text,
            r#"{"errcode":0,"msg":"say "hi"","data":{"res":"a"b"}}"#
        );
        assert!(serde_json::from_str::<serde_json::Value>(&text).is_err());
    }

    #[test]
    fn test_envelope_success_matches_build_status() {
        let envelope = ResponseEnvelope::success(HEALTHY_MESSAGE);
        assert_eq!(
            envelope.to_string(),
            build_status(0, "success", "The service is healthy")
        );
    }

    #[test]
    fn test_confirmation_page_embeds_port_and_source() {
        let page = build_confirmation_page("9123", "sphere radius:5");
        assert!(page.contains("http://localhost:9123/\""));
        assert!(page.contains("http://localhost:9123/exit"));
        assert!(page.contains("\nsphere radius:5\n"));
        assert!(!page.contains(PORT_PLACEHOLDER));
        assert!(!page.contains(REQUEST_PLACEHOLDER));
    }

    #[test]
    fn test_confirmation_page_keeps_port_placeholder_in_source() {
        let page = build_confirmation_page("8080", "print \"{{PORT}}\"");
        assert!(page.contains("print \"{{PORT}}\""));
    }

    #[test]
    fn test_confirmation_page_embeds_closing_tag_verbatim() {
        let page = build_confirmation_page("8080", "</textarea><b>x</b>");
        assert!(page.contains("</textarea><b>x</b>"));
    }

    #[test]
    fn test_http_response_content_length_counts_bytes() {
        let response = HttpResponse::html("héllo".to_string());
        let wire = String::from_utf8(response.to_bytes()).unwrap();
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("Content-Length: 6\r\n"));
        assert!(wire.contains("Connection: close\r\n"));
        assert!(wire.ends_with("\r\n\r\nhéllo"));
    }

    #[test]
    fn test_write_response_writes_whole_message() {
        let mut out = Vec::new();
        let response = HttpResponse::envelope(&ResponseEnvelope::success(SHUTDOWN_MESSAGE));
        write_response(&mut out, &response).unwrap();
        let wire = String::from_utf8(out).unwrap();
        assert!(wire.contains("application/json"));
        assert!(wire.ends_with(r#"{"errcode":0,"msg":"success","data":{"res":"Shutting down!"}}"#));
    }
}
