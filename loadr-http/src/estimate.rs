use super::util::{has_header, host_header_value, parse_http_url};
use super::{Error, HttpRequest, Result};

// Bytes for ": " plus the trailing CRLF of a header line.
const HEADER_FRAMING: u64 = 4;

/// Best-effort HTTP/1.1 wire size of a request: request line, headers, blank line and body.
///
/// `Host` and `Content-Length` are counted even when the caller did not set them, since the
/// client always adds them.
pub fn estimate_http_request_bytes(req: &HttpRequest) -> Result<u64> {
    estimate_request_parts(&req.method, &req.url, &req.headers, req.body.len() as u64)
}

pub(super) fn estimate_request_parts(
    method: &http::Method,
    url: &str,
    headers: &[(String, String)],
    body_len: u64,
) -> Result<u64> {
    let parsed = parse_http_url(url)?;
    let uri: http::Uri = url
        .parse()
        .map_err(|_| Error::InvalidUrl(url.to_string()))?;

    let target = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    // "METHOD SP target SP HTTP/1.1 CRLF"
    let mut total = (method.as_str().len() + target.len() + "HTTP/1.1".len() + 4) as u64;

    total = headers.iter().fold(total, |acc, (k, v)| {
        acc.saturating_add(header_line(k.len(), v.len()))
    });

    if !has_header(headers, "host")
        && let Some(host) = host_header_value(&parsed)
    {
        total = total.saturating_add(header_line("host".len(), host.len()));
    }
    if body_len != 0 && !has_header(headers, "content-length") {
        let digits = body_len.to_string().len();
        total = total.saturating_add(header_line("content-length".len(), digits));
    }

    Ok(total.saturating_add(2).saturating_add(body_len))
}

pub(super) fn estimate_response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let version_len = match version {
        http::Version::HTTP_2 | http::Version::HTTP_3 => 6,
        _ => 8,
    };
    // "HTTP/1.1 SP 200 CRLF", reason phrase not counted.
    let status_line = (version_len + 1 + status.as_str().len() + 2) as u64;

    headers
        .iter()
        .fold(status_line, |acc, (name, value)| {
            acc.saturating_add(header_line(name.as_str().len(), value.len()))
        })
        .saturating_add(2)
}

fn header_line(name_len: usize, value_len: usize) -> u64 {
    (name_len as u64)
        .saturating_add(value_len as u64)
        .saturating_add(HEADER_FRAMING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn get_counts_request_line_and_host() {
        let req = HttpRequest::get("http://localhost:8080/health");
        let bytes = estimate_http_request_bytes(&req).unwrap_or_else(|e| panic!("{e}"));
        // "GET /health HTTP/1.1\r\n" + "host: localhost:8080\r\n" + "\r\n"
        assert_eq!(bytes, 22 + 22 + 2);
    }

    #[test]
    fn body_adds_content_length() {
        let req = HttpRequest::post("http://h/api/users", Bytes::from_static(b"{}"));
        let bytes = estimate_http_request_bytes(&req).unwrap_or_else(|e| panic!("{e}"));
        // "POST /api/users HTTP/1.1\r\n" + "host: h\r\n" + "content-length: 2\r\n" + "\r\n" + body
        assert_eq!(bytes, 26 + 9 + 19 + 2 + 2);
    }
}
