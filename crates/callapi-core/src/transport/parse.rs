//! Parse raw response header lines into a header multi-map.

use super::HeaderMap;

/// Parse collected header lines into a lowercase-keyed multi-map.
///
/// libcurl reports every header block it sees (interim 1xx responses and
/// redirect hops included); a status line starts a new block, so only the
/// final response's headers survive.
pub fn parse_header_lines(lines: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            headers.clear();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            headers
                .entry(name.to_ascii_lowercase())
                .or_default()
                .push(value.trim().to_string());
        }
    }
    headers
}
